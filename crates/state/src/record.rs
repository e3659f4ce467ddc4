//! Immutable record instances.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{PathError, ValidationError};
use crate::path::{AttributePath, PathStep};
use crate::schema::Schema;
use crate::validator::Coercion;
use crate::value::Value;

struct RecordInner {
	schema: Schema,
	values: Box<[Value]>,
}

/// A frozen, validated instance of a [`Schema`].
///
/// There are no setters. Every update returns a new record that shares
/// all unchanged field values with the original.
#[derive(Clone)]
pub struct Record {
	inner: Arc<RecordInner>,
}

impl Record {
	pub(crate) fn from_parts(schema: Schema, values: Vec<Value>) -> Self {
		debug_assert_eq!(schema.len(), values.len());
		Self {
			inner: Arc::new(RecordInner {
				schema,
				values: values.into_boxed_slice(),
			}),
		}
	}

	pub fn schema(&self) -> &Schema {
		&self.inner.schema
	}

	/// Returns a field value by name or alias.
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.inner.schema.index_of(name).map(|idx| &self.inner.values[idx])
	}

	pub(crate) fn value_at(&self, idx: usize) -> &Value {
		&self.inner.values[idx]
	}

	/// Iterates `(field name, value)` pairs in declaration order.
	pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.inner.schema.attributes().map(|attr| attr.name()).zip(self.inner.values.iter())
	}

	pub fn values(&self) -> &[Value] {
		&self.inner.values
	}

	/// Returns `true` if both handles point at the same instance.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	pub fn is_instance_of(&self, schema: &Schema) -> bool {
		schema.accepts(self)
	}

	/// Replaces one field without validation; callers validated the value.
	pub(crate) fn replace_unchecked(&self, idx: usize, value: Value) -> Self {
		let mut values = self.inner.values.to_vec();
		values[idx] = value;
		Self::from_parts(self.inner.schema.clone(), values)
	}

	/// Returns a copy with several fields replaced at once.
	///
	/// Only the replaced fields are validated. Fails without producing a
	/// record if any of them is rejected.
	pub fn with_fields<K, V>(&self, updates: impl IntoIterator<Item = (K, V)>) -> Result<Self, ValidationError>
	where
		K: AsRef<str>,
		V: Into<Value>,
	{
		let schema = &self.inner.schema;
		let mut values = self.inner.values.to_vec();
		for (key, value) in updates {
			let key = key.as_ref();
			let idx = schema.index_of(key).ok_or_else(|| ValidationError::unexpected(key).in_schema(schema.name()))?;
			let attr = schema.attribute_at(idx);
			values[idx] = attr
				.validator()
				.validate_with(&value.into(), Coercion::Lenient)
				.map_err(|e| e.at(PathStep::field(attr.name())).in_schema(schema.name()))?;
		}
		Ok(Self::from_parts(schema.clone(), values))
	}

	/// Returns a copy with the value at `path` replaced.
	pub fn updating(&self, path: &AttributePath, value: impl Into<Value>) -> Result<Self, PathError> {
		path.update(self, value)
	}

	/// Reads the value at `path`.
	pub fn read(&self, path: &AttributePath) -> Result<Value, PathError> {
		path.read(self)
	}

	/// Exports the record as a string-keyed map.
	///
	/// With `recursive`, nested records (including those inside lists and
	/// maps) are exported as maps too.
	pub fn to_mapping(&self, recursive: bool) -> Value {
		Value::map(self.fields().map(|(name, value)| {
			let value = if recursive { export(value) } else { value.clone() };
			(Value::str(name), value)
		}))
	}
}

fn export(value: &Value) -> Value {
	match value {
		Value::Record(record) => record.to_mapping(true),
		Value::List(items) => Value::list(items.iter().map(export)),
		Value::Map(entries) => Value::map(entries.iter().map(|(k, v)| (k.clone(), export(v)))),
		other => other.clone(),
	}
}

impl PartialEq for Record {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for Record {}

impl PartialOrd for Record {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Record {
	/// Records of one schema family compare by field values.
	fn cmp(&self, other: &Self) -> Ordering {
		if self.ptr_eq(other) {
			return Ordering::Equal;
		}
		self.schema()
			.family()
			.cmp(&other.schema().family())
			.then_with(|| self.inner.values.iter().cmp(other.inner.values.iter()))
	}
}

impl Hash for Record {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.schema().family().hash(state);
		self.inner.values.hash(state);
	}
}

impl fmt::Debug for Record {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut out = f.debug_struct(self.schema().name());
		for (name, value) in self.fields() {
			out.field(name, value);
		}
		out.finish()
	}
}
