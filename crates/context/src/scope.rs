//! Scope construction, entry, and exit.
//!
//! A scope moves through `NEW -> ENTERING -> ACTIVE -> EXITING -> CLOSED`.
//! Entry opens the observability session, enters every disposable
//! concurrently, layers a new state table over the parent's, and opens a
//! task group. Exit shuts the task group down, tears down the disposables
//! concurrently, then closes the session. Every failure along the way is
//! collected into one [`FailureGroup`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::FutureExt;
use keel_state::Record;
use keel_worker::panic::panic_message;
use keel_worker::{BoxError, TaskGroup};
use tracing::Instrument;

use crate::context::{CURRENT, Ctx, ctx};
use crate::disposable::{Disposable, enter_all, exit_all};
use crate::error::{ContextError, Failure, FailureGroup, ScopeError};
use crate::events::{DEFAULT_EVENT_CAPACITY, EventBus};
use crate::identifier::ScopeIdentifier;
use crate::observability::{ObservabilitySink, Session};
use crate::preset::Preset;
use crate::state::{StateTable, StateTier};

const NEW: u8 = 0;
const ENTERING: u8 = 1;
const ACTIVE: u8 = 2;
const EXITING: u8 = 3;
const CLOSED: u8 = 4;

/// Lifecycle phase of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	New,
	Entering,
	Active,
	Exiting,
	Closed,
}

impl Phase {
	fn from_raw(raw: u8) -> Self {
		match raw {
			NEW => Self::New,
			ENTERING => Self::Entering,
			ACTIVE => Self::Active,
			EXITING => Self::Exiting,
			_ => Self::Closed,
		}
	}
}

/// Declaration of a scope to enter.
///
/// ```ignore
/// let guard = Scope::new("request").state(user).disposable(Db::connect(url)).enter().await?;
/// ```
pub struct Scope {
	name: Arc<str>,
	root: bool,
	state: Vec<Record>,
	disposables: Vec<Arc<dyn Disposable>>,
	presets: Vec<Preset>,
	sink: Option<Arc<dyn ObservabilitySink>>,
	isolated: bool,
	event_capacity: usize,
	phase: Arc<AtomicU8>,
}

impl Scope {
	/// A scope nested under the current one, or a root when no scope is
	/// active.
	pub fn new(name: impl AsRef<str>) -> Self {
		Self {
			name: Arc::from(name.as_ref()),
			root: false,
			state: Vec::new(),
			disposables: Vec::new(),
			presets: Vec::new(),
			sink: None,
			isolated: false,
			event_capacity: DEFAULT_EVENT_CAPACITY,
			phase: Arc::new(AtomicU8::new(NEW)),
		}
	}

	/// A new root scope with its own trace id and event bus, even when
	/// entered inside another scope.
	pub fn root(name: impl AsRef<str>) -> Self {
		Self { root: true, ..Self::new(name) }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn phase(&self) -> Phase {
		Phase::from_raw(self.phase.load(Ordering::Acquire))
	}

	/// Adds an explicit record, the highest-priority tier.
	#[must_use]
	pub fn state(mut self, record: Record) -> Self {
		self.state.push(record);
		self
	}

	#[must_use]
	pub fn disposable(mut self, disposable: impl Disposable + 'static) -> Self {
		self.disposables.push(Arc::new(disposable));
		self
	}

	#[must_use]
	pub fn shared_disposable(mut self, disposable: Arc<dyn Disposable>) -> Self {
		self.disposables.push(disposable);
		self
	}

	#[must_use]
	pub fn preset(mut self, preset: Preset) -> Self {
		self.presets.push(preset);
		self
	}

	/// Replaces the inherited observability sink for this scope and its
	/// descendants. At most one scope per chain may do so; the default
	/// sink a root starts with does not count.
	#[must_use]
	pub fn observability(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
		self.sink = Some(sink);
		self
	}

	/// Gives the scope's task group a cancellation token independent of the
	/// enclosing unit of work. State, bus, and observability are still
	/// inherited.
	#[must_use]
	pub fn isolated(mut self) -> Self {
		self.isolated = true;
		self
	}

	/// Per-subscriber queue capacity of the event bus this scope creates.
	/// Ignored by nested scopes, which share their root's bus.
	#[must_use]
	pub fn event_capacity(mut self, capacity: usize) -> Self {
		self.event_capacity = capacity;
		self
	}

	/// Enters the scope.
	///
	/// When a disposable fails to enter, the ones already entered are
	/// exited and [`ScopeError::Enter`] is returned; the scope is then
	/// closed.
	///
	/// # Panics
	///
	/// Panics if the scope was entered before, or if it overrides an
	/// observability sink an enclosing scope already overrode.
	pub async fn enter(&self) -> Result<ScopeGuard, ScopeError> {
		let claimed = self.phase.compare_exchange(NEW, ENTERING, Ordering::AcqRel, Ordering::Acquire);
		assert!(claimed.is_ok(), "scope `{}` entered more than once", self.name);

		let parent = if self.root { None } else { ctx::try_current() };
		let identifier = match &parent {
			Some(parent) => parent.scope.child(&*self.name),
			None => ScopeIdentifier::root(&*self.name),
		};
		let path = identifier.path();
		let session = Session::open(&identifier, parent.as_ref().map(|p| &p.session), self.sink.clone());

		let own = self.disposables.len();
		let mut disposables = self.disposables.clone();
		disposables.extend(self.presets.iter().flat_map(|preset| preset.disposables().iter().cloned()));
		let entered = match enter_all(&path, &disposables).await {
			Ok(entered) => entered,
			Err(failures) => {
				let reason: &(dyn std::error::Error + Send + Sync) = &failures;
				session.close(&identifier, Some(reason));
				self.phase.store(CLOSED, Ordering::Release);
				tracing::warn!(scope = %identifier, failed = failures.len(), "scope.enter_failed");
				return Err(ScopeError::Enter(failures));
			}
		};

		let mut table = StateTable::builder(parent.as_ref().map(|p| &p.state));
		for preset in &self.presets {
			table.extend(StateTier::Preset, preset.state().iter().cloned());
		}
		let mut produced = entered.records.into_iter();
		for records in produced.by_ref().take(own) {
			table.extend(StateTier::Disposable, records);
		}
		for records in produced {
			table.extend(StateTier::Preset, records);
		}
		table.extend(StateTier::Explicit, self.state.iter().cloned());
		let state = table.build();

		let parent_token = parent.as_ref().filter(|_| !self.isolated).map(|p| &p.token);
		let group = TaskGroup::new(&path, parent_token);
		let bus = match &parent {
			Some(parent) => parent.bus.clone(),
			None => EventBus::new(self.event_capacity),
		};
		let ctx = Ctx {
			scope: identifier,
			state,
			token: group.token().clone(),
			group,
			bus,
			session,
		};
		self.phase.store(ACTIVE, Ordering::Release);
		tracing::debug!(
			scope = %ctx.scope,
			path = %path,
			trace_id = %ctx.scope.trace_id(),
			records = ctx.state.len(),
			disposables = entered.disposables.len(),
			isolated = self.isolated,
			"scope.enter"
		);
		Ok(ScopeGuard {
			ctx,
			phase: Arc::clone(&self.phase),
			disposables: entered.disposables,
		})
	}

	/// Enters the scope, runs `body` with the scope installed as the
	/// ambient context, and exits, reporting every failure together.
	///
	/// A panicking body still tears the scope down, with the panic message
	/// as the failure handed to each disposable, before the panic resumes.
	/// Dropping the returned future mid-body hands teardown to a detached
	/// task, as dropping a [`ScopeGuard`] does.
	///
	/// # Panics
	///
	/// See [`Self::enter`]. Panics raised by `body` are propagated.
	pub async fn run<F, T, E>(self, body: F) -> Result<T, ScopeError>
	where
		F: Future<Output = Result<T, E>>,
		E: Into<BoxError>,
	{
		let span = tracing::info_span!("scope", name = %self.name);
		async move {
			let mut guard = self.enter().await?;
			let outcome = AssertUnwindSafe(guard.scoped(body)).catch_unwind().await;
			match outcome {
				Ok(Ok(value)) => guard.exit(None).await.map(|()| value),
				Ok(Err(err)) => Err(ScopeError::Failed(guard.close(Some(err.into())).await)),
				Err(payload) => {
					let message = panic_message(payload.as_ref());
					tracing::error!(scope = %guard.ctx.scope, panic = %message, "scope.body_panicked");
					guard.close(Some(format!("scope body panicked: {message}").into())).await;
					std::panic::resume_unwind(payload)
				}
			}
		}
		.instrument(span)
		.await
	}
}

impl std::fmt::Debug for Scope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Scope")
			.field("name", &self.name)
			.field("root", &self.root)
			.field("state", &self.state.len())
			.field("disposables", &self.disposables.len())
			.field("presets", &self.presets)
			.field("isolated", &self.isolated)
			.field("phase", &self.phase())
			.finish()
	}
}

/// An active scope. Call [`Self::exit`] to leave it.
///
/// Dropping the guard without exiting cancels the scope's tasks at once and
/// runs the rest of the teardown on a detached task, with a cancellation
/// as the failure handed to each disposable.
pub struct ScopeGuard {
	ctx: Ctx,
	phase: Arc<AtomicU8>,
	disposables: Vec<Arc<dyn Disposable>>,
}

impl ScopeGuard {
	pub fn ctx(&self) -> &Ctx {
		&self.ctx
	}

	pub fn phase(&self) -> Phase {
		Phase::from_raw(self.phase.load(Ordering::Acquire))
	}

	/// Runs `fut` with this scope installed as the ambient context.
	pub async fn scoped<F: Future>(&self, fut: F) -> F::Output {
		CURRENT.scope(self.ctx.clone(), fut).await
	}

	/// Leaves the scope. `failure` is the body's own error, if any; it is
	/// passed to every disposable's exit and reported first.
	pub async fn exit(mut self, failure: Option<BoxError>) -> Result<(), ScopeError> {
		let failures = self.close(failure).await;
		if failures.is_empty() { Ok(()) } else { Err(ScopeError::Failed(failures)) }
	}

	async fn close(&mut self, failure: Option<BoxError>) -> FailureGroup {
		teardown(&self.ctx, &self.phase, &mut self.disposables, failure).await
	}
}

/// Shuts the task group down, exits the disposables, and closes the
/// observability session.
///
/// Disposables are taken only once every task has settled, so an
/// interrupted teardown can be resumed without exiting any of them twice.
async fn teardown(
	ctx: &Ctx,
	phase: &AtomicU8,
	disposables: &mut Vec<Arc<dyn Disposable>>,
	failure: Option<BoxError>,
) -> FailureGroup {
	phase.store(EXITING, Ordering::Release);
	let scope = &ctx.scope;
	let tasks = ctx.group.shutdown().await;
	let disposables = std::mem::take(disposables);
	let exits = exit_all(&disposables, failure.as_deref()).await;

	let mut failures = FailureGroup::new(scope.path());
	if let Some(body) = failure {
		failures.push(Failure::Body(body));
	}
	if let Err(tasks) = tasks {
		failures.extend_tasks(tasks);
	}
	for exit in exits {
		failures.push(exit);
	}

	let reported: Option<&(dyn std::error::Error + Send + Sync)> = if failures.is_empty() { None } else { Some(&failures) };
	ctx.session.close(scope, reported);
	phase.store(CLOSED, Ordering::Release);
	if failures.is_empty() {
		tracing::debug!(scope = %scope, "scope.exit");
	} else {
		tracing::warn!(scope = %scope, failed = failures.len(), "scope.exit");
	}
	failures
}

impl Drop for ScopeGuard {
	fn drop(&mut self) {
		if self.phase.load(Ordering::Acquire) == CLOSED {
			return;
		}
		self.ctx.group.token().cancel();
		tracing::warn!(
			scope = %self.ctx.scope,
			disposables = self.disposables.len(),
			"scope.dropped_without_exit"
		);
		let ctx = self.ctx.clone();
		let phase = Arc::clone(&self.phase);
		let mut disposables = std::mem::take(&mut self.disposables);
		let reason: BoxError = Box::new(ContextError::Cancelled {
			scope: ctx.scope.path(),
		});
		keel_worker::spawn_detached(async move {
			teardown(&ctx, &phase, &mut disposables, Some(reason)).await;
		});
	}
}

impl std::fmt::Debug for ScopeGuard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ScopeGuard")
			.field("ctx", &self.ctx)
			.field("phase", &self.phase())
			.finish_non_exhaustive()
	}
}
