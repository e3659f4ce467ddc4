//! Scope state tables.
//!
//! Each scope layers one table over its parent's. A table holds three
//! tiers of records keyed by schema identity; a lookup checks the tiers of
//! the nearest table in priority order before moving to the parent.
//! Tables are never mutated after construction.

use std::collections::HashMap;
use std::sync::Arc;

use keel_state::{Record, Schema, SchemaId};

use crate::error::ContextError;

/// Where a record in a table came from, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateTier {
	/// Passed directly to the scope.
	Explicit,
	/// Produced by a disposable entered with the scope.
	Disposable,
	/// Supplied by a preset, including records its disposables produced.
	Preset,
}

const TIERS: [StateTier; 3] = [StateTier::Explicit, StateTier::Disposable, StateTier::Preset];

#[derive(Default)]
struct TableInner {
	tiers: [HashMap<SchemaId, Record>; 3],
	parent: Option<StateTable>,
}

/// Immutable, layered map from schema identity to record.
#[derive(Clone, Default)]
pub struct StateTable {
	inner: Arc<TableInner>,
}

impl StateTable {
	/// An empty table with no parent.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Starts a table layered over `parent`.
	pub fn builder(parent: Option<&StateTable>) -> StateTableBuilder {
		StateTableBuilder {
			tiers: Default::default(),
			parent: parent.cloned(),
		}
	}

	pub fn parent(&self) -> Option<&StateTable> {
		self.inner.parent.as_ref()
	}

	/// Finds the highest-priority record for `schema` in the chain.
	pub fn get(&self, schema: &Schema) -> Option<&Record> {
		self.lookup(schema).map(|(record, _, _)| record)
	}

	/// Like [`Self::get`], also reporting the tier and how many tables up
	/// the record was found.
	pub fn lookup(&self, schema: &Schema) -> Option<(&Record, StateTier, usize)> {
		let id = schema.id();
		let mut table = Some(self);
		let mut depth = 0;
		while let Some(current) = table {
			for (idx, tier) in TIERS.iter().enumerate() {
				if let Some(record) = current.inner.tiers[idx].get(&id) {
					return Some((record, *tier, depth));
				}
			}
			table = current.parent();
			depth += 1;
		}
		None
	}

	/// Returns the record for `schema`, synthesizing a default instance
	/// when the chain has none and every field has a default.
	///
	/// Synthesized defaults are not stored in any table.
	pub fn resolve(&self, schema: &Schema, scope: &str) -> Result<Record, ContextError> {
		if let Some(record) = self.get(schema) {
			return Ok(record.clone());
		}
		if !schema.is_default_constructible() {
			return Err(ContextError::MissingState {
				schema: schema.name().to_string(),
				scope: scope.to_string(),
			});
		}
		tracing::trace!(schema = %schema.name(), scope, "state.default");
		schema.default_instance().map_err(|source| ContextError::InvalidDefault {
			schema: schema.name().to_string(),
			scope: scope.to_string(),
			source,
		})
	}

	/// Checks for a record without building one, unless `allow_default` and
	/// the schema is default-constructible.
	pub fn contains(&self, schema: &Schema, allow_default: bool) -> bool {
		self.get(schema).is_some() || (allow_default && schema.is_default_constructible())
	}

	/// Returns a table layering `records` as explicit state over this one.
	pub fn updated(&self, records: impl IntoIterator<Item = Record>) -> Self {
		let mut builder = Self::builder(Some(self));
		for record in records {
			builder.insert(StateTier::Explicit, record);
		}
		builder.build()
	}

	/// Number of records held directly by this table.
	pub fn len(&self) -> usize {
		self.inner.tiers.iter().map(HashMap::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl std::fmt::Debug for StateTable {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut out = f.debug_struct("StateTable");
		for (tier, records) in TIERS.iter().zip(&self.inner.tiers) {
			let mut names: Vec<&str> = records.values().map(|r| r.schema().name()).collect();
			names.sort_unstable();
			out.field(&format!("{tier:?}"), &names);
		}
		out.field("has_parent", &self.inner.parent.is_some()).finish()
	}
}

/// Collects records for a new [`StateTable`]. Within one tier, a later
/// record for the same schema replaces an earlier one.
#[derive(Default)]
pub struct StateTableBuilder {
	tiers: [HashMap<SchemaId, Record>; 3],
	parent: Option<StateTable>,
}

impl StateTableBuilder {
	pub fn insert(&mut self, tier: StateTier, record: Record) -> &mut Self {
		let idx = tier as usize;
		self.tiers[idx].insert(record.schema().id(), record);
		self
	}

	pub fn extend(&mut self, tier: StateTier, records: impl IntoIterator<Item = Record>) -> &mut Self {
		for record in records {
			self.insert(tier, record);
		}
		self
	}

	pub fn build(self) -> StateTable {
		StateTable {
			inner: Arc::new(TableInner {
				tiers: self.tiers,
				parent: self.parent,
			}),
		}
	}
}
