//! Observability sinks and per-scope sessions.
//!
//! A scope inherits its parent's sink unless it installs an override. Only
//! one override may be active along a scope chain.

use std::fmt;
use std::sync::Arc;

use keel_state::Value;

use crate::identifier::ScopeIdentifier;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
	Debug,
	Info,
	Warning,
	Error,
}

impl Level {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Debug => "debug",
			Self::Info => "info",
			Self::Warning => "warning",
			Self::Error => "error",
		}
	}
}

impl fmt::Display for Level {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Key-value pairs attached to observability records.
pub type Attributes<'a> = &'a [(&'a str, Value)];

/// Receiver of logs, metrics, events, and scope lifecycle notifications.
pub trait ObservabilitySink: Send + Sync {
	fn scope_entering(&self, scope: &ScopeIdentifier) {
		let _ = scope;
	}

	/// Called once when `scope` closes, with the failure that ended it.
	fn scope_exiting(&self, scope: &ScopeIdentifier, failure: Option<&(dyn std::error::Error + Send + Sync)>) {
		let _ = (scope, failure);
	}

	fn log(&self, scope: &ScopeIdentifier, level: Level, message: &str, attributes: Attributes<'_>);

	fn metric(&self, scope: &ScopeIdentifier, name: &str, value: f64, unit: Option<&str>, attributes: Attributes<'_>);

	fn event(&self, scope: &ScopeIdentifier, name: &str, attributes: Attributes<'_>);

	/// Attaches attributes to the scope itself.
	fn attributes(&self, scope: &ScopeIdentifier, attributes: Attributes<'_>);
}

/// Default sink forwarding everything to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
	fn scope_entering(&self, scope: &ScopeIdentifier) {
		tracing::debug!(scope = %scope, path = %scope.path(), trace_id = %scope.trace_id(), "scope.entering");
	}

	fn scope_exiting(&self, scope: &ScopeIdentifier, failure: Option<&(dyn std::error::Error + Send + Sync)>) {
		match failure {
			Some(err) => tracing::warn!(scope = %scope, trace_id = %scope.trace_id(), error = %err, "scope.exiting"),
			None => tracing::debug!(scope = %scope, trace_id = %scope.trace_id(), "scope.exiting"),
		}
	}

	fn log(&self, scope: &ScopeIdentifier, level: Level, message: &str, attributes: Attributes<'_>) {
		let trace_id = scope.trace_id();
		match level {
			Level::Debug => tracing::debug!(scope = %scope, %trace_id, ?attributes, "{message}"),
			Level::Info => tracing::info!(scope = %scope, %trace_id, ?attributes, "{message}"),
			Level::Warning => tracing::warn!(scope = %scope, %trace_id, ?attributes, "{message}"),
			Level::Error => tracing::error!(scope = %scope, %trace_id, ?attributes, "{message}"),
		}
	}

	fn metric(&self, scope: &ScopeIdentifier, name: &str, value: f64, unit: Option<&str>, attributes: Attributes<'_>) {
		tracing::info!(scope = %scope, trace_id = %scope.trace_id(), metric = name, value, unit, ?attributes, "scope.metric");
	}

	fn event(&self, scope: &ScopeIdentifier, name: &str, attributes: Attributes<'_>) {
		tracing::info!(scope = %scope, trace_id = %scope.trace_id(), event = name, ?attributes, "scope.event");
	}

	fn attributes(&self, scope: &ScopeIdentifier, attributes: Attributes<'_>) {
		tracing::debug!(scope = %scope, trace_id = %scope.trace_id(), ?attributes, "scope.attributes");
	}
}

/// Sink binding for one scope.
#[derive(Clone)]
pub(crate) struct Session {
	sink: Arc<dyn ObservabilitySink>,
	/// Scope that installed the active override, if any.
	overridden_in: Option<ScopeIdentifier>,
}

impl Session {
	/// Opens the session for `scope`.
	///
	/// Only one override may be installed along a scope chain. The default
	/// [`TracingSink`] a chain starts with is not an override, so the first
	/// override may come from any depth.
	///
	/// # Panics
	///
	/// Panics if `sink` overrides an override already installed by an
	/// enclosing scope.
	pub(crate) fn open(scope: &ScopeIdentifier, parent: Option<&Session>, sink: Option<Arc<dyn ObservabilitySink>>) -> Self {
		let inherited = parent.and_then(|p| p.overridden_in.as_ref());
		let session = match sink {
			Some(sink) => {
				if let Some(owner) = inherited {
					panic!("scope `{}` overrides observability already overridden by scope `{}`", scope.path(), owner.path());
				}
				Self {
					sink,
					overridden_in: Some(scope.clone()),
				}
			}
			None => match parent {
				Some(parent) => parent.clone(),
				None => Self {
					sink: Arc::new(TracingSink),
					overridden_in: None,
				},
			},
		};
		session.sink.scope_entering(scope);
		session
	}

	pub(crate) fn close(&self, scope: &ScopeIdentifier, failure: Option<&(dyn std::error::Error + Send + Sync)>) {
		self.sink.scope_exiting(scope, failure);
	}

	pub(crate) fn sink(&self) -> &dyn ObservabilitySink {
		self.sink.as_ref()
	}
}

#[cfg(test)]
mod tests {
	use parking_lot::Mutex;

	use super::*;

	#[derive(Default)]
	struct Recorder {
		lines: Mutex<Vec<String>>,
	}

	impl ObservabilitySink for Recorder {
		fn scope_entering(&self, scope: &ScopeIdentifier) {
			self.lines.lock().push(format!("enter {}", scope.name()));
		}

		fn log(&self, scope: &ScopeIdentifier, level: Level, message: &str, _: Attributes<'_>) {
			self.lines.lock().push(format!("{level} {} {message}", scope.name()));
		}

		fn metric(&self, _: &ScopeIdentifier, name: &str, value: f64, _: Option<&str>, _: Attributes<'_>) {
			self.lines.lock().push(format!("metric {name}={value}"));
		}

		fn event(&self, _: &ScopeIdentifier, name: &str, _: Attributes<'_>) {
			self.lines.lock().push(format!("event {name}"));
		}

		fn attributes(&self, _: &ScopeIdentifier, attributes: Attributes<'_>) {
			self.lines.lock().push(format!("attributes {}", attributes.len()));
		}
	}

	#[test]
	fn children_inherit_the_override() {
		let recorder = Arc::new(Recorder::default());
		let root = ScopeIdentifier::root("root");
		let child = root.child("child");
		let outer = Session::open(&root, None, Some(recorder.clone()));
		let inner = Session::open(&child, Some(&outer), None);
		inner.sink().log(&child, Level::Info, "hello", &[]);
		assert_eq!(*recorder.lines.lock(), vec!["enter root", "enter child", "info child hello"]);
	}

	#[test]
	#[should_panic(expected = "already overridden by scope `root`")]
	fn nested_overrides_are_rejected() {
		let root = ScopeIdentifier::root("root");
		let child = root.child("child");
		let outer = Session::open(&root, None, Some(Arc::new(Recorder::default())));
		Session::open(&child, Some(&outer), Some(Arc::new(Recorder::default())));
	}

	#[test]
	fn first_override_may_come_below_the_default_sink() {
		let recorder = Arc::new(Recorder::default());
		let root = ScopeIdentifier::root("root");
		let child = root.child("child");
		let grandchild = child.child("grandchild");
		let outer = Session::open(&root, None, None);
		let inner = Session::open(&child, Some(&outer), Some(recorder.clone()));
		let innermost = Session::open(&grandchild, Some(&inner), None);
		innermost.sink().log(&grandchild, Level::Info, "hi", &[]);
		assert_eq!(*recorder.lines.lock(), vec!["enter child", "enter grandchild", "info grandchild hi"]);
	}

	#[test]
	#[should_panic(expected = "already overridden by scope `root/child`")]
	fn overrides_below_a_late_override_are_rejected() {
		let root = ScopeIdentifier::root("root");
		let child = root.child("child");
		let outer = Session::open(&root, None, None);
		let inner = Session::open(&child, Some(&outer), Some(Arc::new(Recorder::default())));
		Session::open(&child.child("grandchild"), Some(&inner), Some(Arc::new(Recorder::default())));
	}

	#[test]
	fn tracing_sink_accepts_every_record() {
		let root = ScopeIdentifier::root("root");
		let session = Session::open(&root, None, None);
		let attrs = [("user", Value::from("ada"))];
		session.sink().log(&root, Level::Warning, "careful", &attrs);
		session.sink().metric(&root, "latency", 1.5, Some("ms"), &attrs);
		session.sink().event(&root, "login", &attrs);
		session.sink().attributes(&root, &attrs);
		session.close(&root, None);
	}
}
