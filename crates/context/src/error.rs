//! Context, scope, and configuration errors.

use std::fmt;
use std::path::PathBuf;

use keel_state::ValidationError;
use keel_worker::{BoxError, TaskError, TaskFailures};

/// Failure of an operation issued through a scope context.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContextError {
	/// No scope is active on the current task.
	#[error("no active scope")]
	MissingContext,
	/// The schema is absent from the state chain and has required fields.
	#[error("no `{schema}` state available in scope `{scope}`")]
	MissingState { schema: String, scope: String },
	/// The schema is default-constructible but its defaults did not validate.
	#[error("default `{schema}` state could not be built in scope `{scope}`: {source}")]
	InvalidDefault {
		schema: String,
		scope: String,
		#[source]
		source: ValidationError,
	},
	/// The current unit of work was cancelled.
	#[error("cancelled in scope `{scope}`")]
	Cancelled { scope: String },
}

impl ContextError {
	pub fn is_missing_state(&self) -> bool {
		matches!(self, Self::MissingState { .. })
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled { .. })
	}
}

/// One failure collected while a scope was set up or torn down.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
	#[error("scope body failed: {0}")]
	Body(BoxError),
	#[error(transparent)]
	Task(#[from] TaskError),
	#[error("disposable `{name}` failed to enter: {source}")]
	Enter {
		name: String,
		#[source]
		source: BoxError,
	},
	#[error("disposable `{name}` failed to exit: {source}")]
	Exit {
		name: String,
		#[source]
		source: BoxError,
	},
}

/// All failures raised concurrently in one scope, surfaced together.
#[derive(Debug)]
pub struct FailureGroup {
	pub scope: String,
	pub failures: Vec<Failure>,
}

impl FailureGroup {
	pub(crate) fn new(scope: impl Into<String>) -> Self {
		Self {
			scope: scope.into(),
			failures: Vec::new(),
		}
	}

	pub(crate) fn push(&mut self, failure: Failure) {
		self.failures.push(failure);
	}

	pub(crate) fn extend_tasks(&mut self, tasks: TaskFailures) {
		self.failures.extend(tasks.failures.into_iter().map(Failure::Task));
	}

	pub fn len(&self) -> usize {
		self.failures.len()
	}

	pub fn is_empty(&self) -> bool {
		self.failures.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Failure> {
		self.failures.iter()
	}

	/// The scope body's own error, if it failed.
	pub fn body(&self) -> Option<&BoxError> {
		self.failures.iter().find_map(|failure| match failure {
			Failure::Body(err) => Some(err),
			_ => None,
		})
	}
}

impl fmt::Display for FailureGroup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "scope `{}` failed with {} error(s)", self.scope, self.failures.len())?;
		for failure in &self.failures {
			write!(f, "\n  - {failure}")?;
		}
		Ok(())
	}
}

impl std::error::Error for FailureGroup {}

/// Failure to enter or leave a scope.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
	/// Disposable setup failed; the scope never became active.
	#[error("failed to enter {0}")]
	Enter(FailureGroup),
	/// The body, a task, or a disposable teardown failed.
	#[error(transparent)]
	Failed(FailureGroup),
}

impl ScopeError {
	pub fn failures(&self) -> &FailureGroup {
		match self {
			Self::Enter(group) | Self::Failed(group) => group,
		}
	}
}

/// Failure loading [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid config: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("invalid value for {var}: {value:?}")]
	InvalidEnv { var: &'static str, value: String },
}

/// Failure bootstrapping logging.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
	#[error("invalid log filter: {0}")]
	Filter(#[from] tracing_subscriber::filter::ParseError),
	#[error("failed to install subscriber: {0}")]
	Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Failure of [`block_on`](crate::runtime::block_on).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
	#[error("failed to build runtime: {0}")]
	Build(#[from] std::io::Error),
	#[error(transparent)]
	Scope(#[from] ScopeError),
}
