//! Hierarchical execution scopes.
//!
//! A [`Scope`] layers state over its parent's, owns a [`TaskGroup`] for the
//! work spawned inside it, shares its root's [`EventBus`], and reports to
//! an [`ObservabilitySink`]. Inside a scope, [`ctx`] reaches all of it
//! without passing a handle around:
//!
//! ```ignore
//! Scope::new("request").state(user).run(async {
//! 	let user = ctx::state(&user_schema)?;
//! 	ctx::spawn(audit(user));
//! 	Ok::<_, BoxError>(())
//! }).await?;
//! ```
//!
//! [`TaskGroup`]: keel_worker::TaskGroup

/// Runtime configuration.
pub mod config;
/// Scope context handle and ambient accessors.
pub mod context;
/// Disposable resources.
pub mod disposable;
/// Error types.
pub mod error;
/// Root-scoped event bus.
pub mod events;
/// Scope identity.
pub mod identifier;
/// Observability sinks.
pub mod observability;
/// State and disposable bundles.
pub mod preset;
/// Blocking runtime entry point.
pub mod runtime;
/// Scope lifecycle.
pub mod scope;
/// Layered state tables.
pub mod state;
/// Scoped streams.
pub mod stream;
/// Logging bootstrap.
pub mod telemetry;

pub use config::{LogConfig, LogFormat, RuntimeConfig};
pub use context::{Ctx, ctx};
pub use disposable::Disposable;
pub use error::{ConfigError, ContextError, Failure, FailureGroup, RuntimeError, ScopeError, TelemetryError};
pub use events::{EventBus, Subscription};
pub use identifier::{ScopeId, ScopeIdentifier};
pub use keel_worker::{BoxError, CancelToken, TaskError, TaskHandle};
pub use observability::{Attributes, Level, ObservabilitySink, TracingSink};
pub use preset::Preset;
pub use runtime::block_on;
pub use scope::{Phase, Scope, ScopeGuard};
pub use state::{StateTable, StateTier};
pub use stream::ScopedStream;
