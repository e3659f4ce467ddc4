//! Reusable bundles of state and disposables.

use std::fmt;
use std::sync::Arc;

use keel_state::Record;

use crate::disposable::Disposable;

/// Named bundle applied to a scope below its explicit and
/// disposable-produced state.
///
/// Records produced by a preset's own disposables land in the preset tier
/// too. When several presets supply the same schema, the one added to the
/// scope last wins.
#[derive(Clone)]
pub struct Preset {
	name: Arc<str>,
	state: Vec<Record>,
	disposables: Vec<Arc<dyn Disposable>>,
}

impl Preset {
	pub fn new(name: impl AsRef<str>) -> Self {
		Self {
			name: Arc::from(name.as_ref()),
			state: Vec::new(),
			disposables: Vec::new(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn with_state(mut self, record: Record) -> Self {
		self.state.push(record);
		self
	}

	#[must_use]
	pub fn with_disposable(mut self, disposable: impl Disposable + 'static) -> Self {
		self.disposables.push(Arc::new(disposable));
		self
	}

	/// Appends everything from `other`; its records override this preset's.
	#[must_use]
	pub fn merged(mut self, other: Preset) -> Self {
		self.state.extend(other.state);
		self.disposables.extend(other.disposables);
		self
	}

	pub fn state(&self) -> &[Record] {
		&self.state
	}

	pub fn disposables(&self) -> &[Arc<dyn Disposable>] {
		&self.disposables
	}
}

impl fmt::Debug for Preset {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Preset")
			.field("name", &self.name)
			.field("state", &self.state.iter().map(|r| r.schema().name()).collect::<Vec<_>>())
			.field("disposables", &self.disposables.iter().map(|d| d.name()).collect::<Vec<_>>())
			.finish()
	}
}
