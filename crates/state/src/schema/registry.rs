use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::Schema;
use crate::error::SchemaError;
use crate::validator::Synthesizer;

#[derive(Default)]
struct RegistryInner {
	schemas: RwLock<HashMap<Arc<str>, Schema>>,
	synthesizer: Synthesizer,
}

/// Name-keyed store of compiled schemas plus the validator memo they share.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
	inner: Arc<RegistryInner>,
}

impl SchemaRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Process-wide registry used by [`SchemaBuilder::build`](super::SchemaBuilder::build).
	pub fn global() -> &'static SchemaRegistry {
		static GLOBAL: OnceLock<SchemaRegistry> = OnceLock::new();
		GLOBAL.get_or_init(SchemaRegistry::new)
	}

	pub fn get(&self, name: &str) -> Option<Schema> {
		self.inner.schemas.read().get(name).cloned()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.inner.schemas.read().contains_key(name)
	}

	/// Returns registered schema names sorted alphabetically.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.inner.schemas.read().keys().map(ToString::to_string).collect();
		names.sort();
		names
	}

	pub fn synthesizer(&self) -> &Synthesizer {
		&self.inner.synthesizer
	}

	pub(super) fn register(&self, schema: &Schema) -> Result<(), SchemaError> {
		let mut schemas = self.inner.schemas.write();
		if schemas.contains_key(schema.name()) {
			return Err(SchemaError::DuplicateSchema {
				name: schema.name().to_string(),
			});
		}
		schemas.insert(Arc::from(schema.name()), schema.clone());
		Ok(())
	}
}

impl fmt::Debug for SchemaRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SchemaRegistry")
			.field("schemas", &self.names())
			.field("synthesizer", &self.inner.synthesizer)
			.finish()
	}
}
