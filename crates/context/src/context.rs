//! The scope context handle and the task-local that carries it.
//!
//! Entering a scope pushes a [`Ctx`] into a task-local for the duration of
//! the scope body; spawned tasks and scoped streams push a copy bound to
//! their own cancellation token. Code that prefers explicit passing can
//! hold a [`Ctx`] directly.

use std::future::Future;

use futures::Stream;
use keel_state::{Record, Schema};
use keel_worker::{BoxError, CancelToken, TaskGroup, TaskHandle};
use uuid::Uuid;

use crate::error::ContextError;
use crate::events::{EventBus, Subscription};
use crate::identifier::ScopeIdentifier;
use crate::observability::{Attributes, Level, Session};
use crate::state::StateTable;
use crate::stream::ScopedStream;

tokio::task_local! {
	pub(crate) static CURRENT: Ctx;
}

/// Everything code running inside a scope can reach.
///
/// Cloning is cheap. Clones share the scope's state table, task group,
/// event bus, and observability session.
#[derive(Clone)]
pub struct Ctx {
	pub(crate) scope: ScopeIdentifier,
	pub(crate) state: StateTable,
	pub(crate) group: TaskGroup,
	pub(crate) bus: EventBus,
	pub(crate) session: Session,
	/// Token of the unit of work this handle belongs to.
	pub(crate) token: CancelToken,
}

impl Ctx {
	fn with_token(&self, token: CancelToken) -> Self {
		Self { token, ..self.clone() }
	}

	pub fn scope(&self) -> &ScopeIdentifier {
		&self.scope
	}

	pub fn scope_name(&self) -> &str {
		self.scope.name()
	}

	pub fn trace_id(&self) -> Uuid {
		self.scope.trace_id()
	}

	/// The state table visible from this scope.
	pub fn state_table(&self) -> &StateTable {
		&self.state
	}

	/// The scope's task group.
	pub fn group(&self) -> &TaskGroup {
		&self.group
	}

	pub fn bus(&self) -> &EventBus {
		&self.bus
	}

	pub fn token(&self) -> &CancelToken {
		&self.token
	}

	/// Resolves `schema` through the priority chain, synthesizing a default
	/// instance when nothing is stored and the schema allows it.
	pub fn state(&self, schema: &Schema) -> Result<Record, ContextError> {
		self.state.resolve(schema, &self.scope.path())
	}

	/// Whether [`Self::state`] would find a stored record, or with
	/// `allow_default` could synthesize one.
	pub fn check_state(&self, schema: &Schema, allow_default: bool) -> bool {
		self.state.contains(schema, allow_default)
	}

	/// Spawns `fut` into the scope's task group. The task sees this scope's
	/// context bound to its own cancellation token.
	///
	/// # Panics
	///
	/// Panics if the scope is already exiting.
	pub fn spawn<F>(&self, fut: F) -> TaskHandle<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		self.group.spawn_with(|token| CURRENT.scope(self.with_token(token), fut))
	}

	/// Like [`Self::spawn`] for fallible work. An `Err` is reported when the
	/// scope exits.
	///
	/// # Panics
	///
	/// Panics if the scope is already exiting.
	pub fn spawn_try<F, T, E>(&self, fut: F) -> TaskHandle<T>
	where
		F: Future<Output = Result<T, E>> + Send + 'static,
		T: Send + 'static,
		E: Into<BoxError>,
	{
		self.group.spawn_try(|token| CURRENT.scope(self.with_token(token), fut))
	}

	/// Polls `inner` under this scope's context, ending it when the current
	/// unit of work is cancelled.
	pub fn stream<S: Stream>(&self, inner: S) -> ScopedStream<S> {
		ScopedStream::new(self.clone(), inner)
	}

	/// Publishes `event` on the root bus; returns the number of subscribers
	/// that received it.
	pub fn send(&self, event: Record) -> usize {
		self.bus.send(event)
	}

	/// Subscribes to events of exactly `schema`. The subscription ends when
	/// the current unit of work is cancelled.
	pub fn subscribe(&self, schema: &Schema) -> Subscription {
		self.bus.subscribe(schema, Some(self.token.clone()))
	}

	pub fn log(&self, level: Level, message: &str, attributes: Attributes<'_>) {
		self.session.sink().log(&self.scope, level, message, attributes);
	}

	pub fn log_debug(&self, message: &str) {
		self.log(Level::Debug, message, &[]);
	}

	pub fn log_info(&self, message: &str) {
		self.log(Level::Info, message, &[]);
	}

	pub fn log_warning(&self, message: &str) {
		self.log(Level::Warning, message, &[]);
	}

	pub fn log_error(&self, message: &str) {
		self.log(Level::Error, message, &[]);
	}

	pub fn record_metric(&self, name: &str, value: f64, unit: Option<&str>, attributes: Attributes<'_>) {
		self.session.sink().metric(&self.scope, name, value, unit, attributes);
	}

	pub fn record_event(&self, name: &str, attributes: Attributes<'_>) {
		self.session.sink().event(&self.scope, name, attributes);
	}

	pub fn record_attributes(&self, attributes: Attributes<'_>) {
		self.session.sink().attributes(&self.scope, attributes);
	}

	/// Fails with [`ContextError::Cancelled`] once the current unit of work
	/// has been cancelled.
	pub fn check_cancellation(&self) -> Result<(), ContextError> {
		if self.token.is_cancelled() {
			return Err(ContextError::Cancelled { scope: self.scope.path() });
		}
		Ok(())
	}

	/// Requests cancellation of the current unit of work. Inside a scope
	/// body that is the whole scope; inside a spawned task, the task.
	pub fn cancel(&self) {
		tracing::debug!(scope = %self.scope, owner = self.token.owner(), "scope.cancel");
		self.token.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}

	/// Runs `fut` as a cancellable suspension point.
	pub async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
		self.token
			.run_until_cancelled(fut)
			.await
			.ok_or_else(|| ContextError::Cancelled { scope: self.scope.path() })
	}

	/// Runs `fut` with this context installed as the ambient one.
	pub async fn scoped<F: Future>(&self, fut: F) -> F::Output {
		CURRENT.scope(self.clone(), fut).await
	}
}

impl std::fmt::Debug for Ctx {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Ctx")
			.field("scope", &self.scope)
			.field("state", &self.state)
			.field("group", &self.group)
			.field("cancelled", &self.token.is_cancelled())
			.finish_non_exhaustive()
	}
}

/// Ambient operations on the innermost active scope of the current task.
pub mod ctx {
	use super::*;

	/// The innermost active scope.
	pub fn current() -> Result<Ctx, ContextError> {
		try_current().ok_or(ContextError::MissingContext)
	}

	pub fn try_current() -> Option<Ctx> {
		CURRENT.try_with(Ctx::clone).ok()
	}

	pub fn scope_name() -> Result<String, ContextError> {
		CURRENT.try_with(|ctx| ctx.scope_name().to_string()).map_err(|_| ContextError::MissingContext)
	}

	pub fn trace_id() -> Result<Uuid, ContextError> {
		CURRENT.try_with(Ctx::trace_id).map_err(|_| ContextError::MissingContext)
	}

	/// See [`Ctx::state`].
	pub fn state(schema: &Schema) -> Result<Record, ContextError> {
		CURRENT.try_with(|ctx| ctx.state(schema)).map_err(|_| ContextError::MissingContext)?
	}

	/// See [`Ctx::check_state`].
	pub fn check_state(schema: &Schema, allow_default: bool) -> Result<bool, ContextError> {
		CURRENT.try_with(|ctx| ctx.check_state(schema, allow_default)).map_err(|_| ContextError::MissingContext)
	}

	/// Spawns into the current scope, or detached when there is none.
	pub fn spawn<F>(fut: F) -> TaskHandle<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		match try_current() {
			Some(ctx) => ctx.spawn(fut),
			None => keel_worker::spawn_detached(fut),
		}
	}

	/// See [`Ctx::stream`].
	pub fn stream<S: Stream>(inner: S) -> Result<ScopedStream<S>, ContextError> {
		Ok(current()?.stream(inner))
	}

	/// See [`Ctx::send`].
	pub fn send(event: Record) -> Result<usize, ContextError> {
		CURRENT.try_with(|ctx| ctx.send(event)).map_err(|_| ContextError::MissingContext)
	}

	/// See [`Ctx::subscribe`].
	pub fn subscribe(schema: &Schema) -> Result<Subscription, ContextError> {
		CURRENT.try_with(|ctx| ctx.subscribe(schema)).map_err(|_| ContextError::MissingContext)
	}

	/// Logs through the scope's sink, or straight to `tracing` outside any
	/// scope.
	pub fn log(level: Level, message: &str, attributes: Attributes<'_>) {
		if CURRENT.try_with(|ctx| ctx.log(level, message, attributes)).is_err() {
			match level {
				Level::Debug => tracing::debug!(?attributes, "{message}"),
				Level::Info => tracing::info!(?attributes, "{message}"),
				Level::Warning => tracing::warn!(?attributes, "{message}"),
				Level::Error => tracing::error!(?attributes, "{message}"),
			}
		}
	}

	pub fn log_debug(message: &str) {
		log(Level::Debug, message, &[]);
	}

	pub fn log_info(message: &str) {
		log(Level::Info, message, &[]);
	}

	pub fn log_warning(message: &str) {
		log(Level::Warning, message, &[]);
	}

	pub fn log_error(message: &str) {
		log(Level::Error, message, &[]);
	}

	pub fn record_metric(name: &str, value: f64, unit: Option<&str>, attributes: Attributes<'_>) {
		if CURRENT.try_with(|ctx| ctx.record_metric(name, value, unit, attributes)).is_err() {
			tracing::info!(metric = name, value, unit, ?attributes, "metric");
		}
	}

	pub fn record_event(name: &str, attributes: Attributes<'_>) {
		if CURRENT.try_with(|ctx| ctx.record_event(name, attributes)).is_err() {
			tracing::info!(event = name, ?attributes, "event");
		}
	}

	pub fn record_attributes(attributes: Attributes<'_>) {
		if CURRENT.try_with(|ctx| ctx.record_attributes(attributes)).is_err() {
			tracing::debug!(?attributes, "attributes");
		}
	}

	/// Outside any scope there is nothing to cancel, so this succeeds.
	pub fn check_cancellation() -> Result<(), ContextError> {
		CURRENT.try_with(Ctx::check_cancellation).unwrap_or(Ok(()))
	}

	/// See [`Ctx::cancel`].
	pub fn cancel() -> Result<(), ContextError> {
		CURRENT.try_with(Ctx::cancel).map_err(|_| ContextError::MissingContext)
	}

	/// See [`Ctx::cancellable`]. Outside any scope `fut` simply runs.
	pub async fn cancellable<F: Future>(fut: F) -> Result<F::Output, ContextError> {
		match try_current() {
			Some(ctx) => ctx.cancellable(fut).await,
			None => Ok(fut.await),
		}
	}
}
