//! Record schemas.
//!
//! A [`Schema`] is compiled once per declaration by [`SchemaBuilder`] and
//! stored in a [`SchemaRegistry`] under its name. Generic schemas keep a
//! specialization table from type-argument tuples to concrete schemas;
//! entries are held weakly and rebuilt on demand once reclaimed.

mod builder;
mod registry;
mod resolve;


use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

pub use builder::SchemaBuilder;
pub use registry::SchemaRegistry;

use crate::defaults::DefaultValue;
use crate::descriptor::TypeDescriptor;
use crate::error::{SchemaError, ValidationError};
use crate::expr::TypeExpr;
use crate::path::PathStep;
use crate::record::Record;
use crate::validator::{Coercion, Validator};
use crate::value::Value;

/// Process-unique schema identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaId(u64);

impl SchemaId {
	fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for SchemaId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// One declared field of a schema.
#[derive(Debug, Clone)]
pub struct Attribute {
	name: Arc<str>,
	alias: Option<Arc<str>>,
	descriptor: TypeDescriptor,
	default: Option<DefaultValue>,
	validator: Validator,
}

impl Attribute {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn alias(&self) -> Option<&str> {
		self.alias.as_deref()
	}

	pub fn descriptor(&self) -> &TypeDescriptor {
		&self.descriptor
	}

	pub fn default(&self) -> Option<&DefaultValue> {
		self.default.as_ref()
	}

	pub fn validator(&self) -> &Validator {
		&self.validator
	}

	/// Returns `true` when the field may be omitted at construction.
	///
	/// Optional fields without an explicit default fall back to `none`.
	pub fn has_default(&self) -> bool {
		self.default.is_some() || self.descriptor.is_optional()
	}

	fn produce_default(&self) -> Result<Value, ValidationError> {
		match &self.default {
			Some(default) => default.produce(&self.descriptor),
			None if self.descriptor.is_optional() => Ok(Value::None),
			None => Err(ValidationError::new(crate::error::ValidationErrorKind::MissingField)),
		}
	}
}

/// Declaration retained for re-resolution under type-argument bindings.
#[derive(Debug)]
pub(crate) struct FieldDecl {
	pub(crate) name: Arc<str>,
	pub(crate) expr: TypeExpr,
	pub(crate) default: Option<DefaultValue>,
}

#[derive(Debug)]
pub(crate) struct RecordDecl {
	pub(crate) name: Arc<str>,
	pub(crate) params: Vec<Arc<str>>,
	pub(crate) base: Option<Schema>,
	pub(crate) fields: Vec<FieldDecl>,
}

/// Generic origin of a specialized schema.
#[derive(Debug)]
struct Specialization {
	origin: Schema,
	arguments: Vec<TypeDescriptor>,
}

pub(crate) struct SchemaInner {
	id: SchemaId,
	name: Arc<str>,
	attributes: IndexMap<Arc<str>, Attribute>,
	aliases: HashMap<Arc<str>, usize>,
	decl: Arc<RecordDecl>,
	specialization: Option<Specialization>,
	specializations: Mutex<HashMap<Vec<TypeDescriptor>, Weak<SchemaInner>>>,
	registry: SchemaRegistry,
}

/// Compiled description of a record type.
///
/// Cloning is cheap; equality is identity.
#[derive(Clone)]
pub struct Schema {
	inner: Arc<SchemaInner>,
}

impl Schema {
	/// Starts declaring a schema named `name`.
	pub fn builder(name: impl AsRef<str>) -> SchemaBuilder {
		SchemaBuilder::new(name)
	}

	pub fn id(&self) -> SchemaId {
		self.inner.id
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn registry(&self) -> &SchemaRegistry {
		&self.inner.registry
	}

	pub fn attributes(&self) -> impl ExactSizeIterator<Item = &Attribute> {
		self.inner.attributes.values()
	}

	pub fn attribute(&self, name: &str) -> Option<&Attribute> {
		self.index_of(name).and_then(|idx| self.inner.attributes.get_index(idx)).map(|(_, attr)| attr)
	}

	/// Resolves a field name or alias to its position.
	pub fn index_of(&self, name: &str) -> Option<usize> {
		self.inner.attributes.get_index_of(name).or_else(|| self.inner.aliases.get(name).copied())
	}

	pub(crate) fn attribute_at(&self, idx: usize) -> &Attribute {
		&self.inner.attributes[idx]
	}

	pub fn len(&self) -> usize {
		self.inner.attributes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.attributes.is_empty()
	}

	/// Declared type parameters; empty for concrete schemas.
	pub fn type_parameters(&self) -> &[Arc<str>] {
		&self.inner.decl.params
	}

	/// Returns `true` for an unspecialized generic schema.
	pub fn is_generic(&self) -> bool {
		!self.inner.decl.params.is_empty() && self.inner.specialization.is_none()
	}

	/// Type arguments of a specialization.
	pub fn type_arguments(&self) -> Option<&[TypeDescriptor]> {
		self.inner.specialization.as_ref().map(|s| s.arguments.as_slice())
	}

	/// The generic schema this one specializes, if any.
	pub fn generic_origin(&self) -> Option<&Schema> {
		self.inner.specialization.as_ref().map(|s| &s.origin)
	}

	/// Identity shared by a generic schema and all its specializations.
	pub fn family(&self) -> SchemaId {
		self.generic_origin().map_or(self.id(), Schema::id)
	}

	pub fn base(&self) -> Option<&Schema> {
		self.inner.decl.base.as_ref()
	}

	/// Checks whether `record` is an instance of this schema.
	///
	/// An unspecialized generic schema accepts instances of any of its
	/// specializations; a specialization accepts only its own instances.
	pub fn accepts(&self, record: &Record) -> bool {
		let other = record.schema();
		other.id() == self.id() || (self.is_generic() && other.family() == self.id())
	}

	pub(crate) fn as_ref_handle(&self) -> SchemaRef {
		SchemaRef::Resolved(self.clone())
	}

	/// Returns the specialization for `args`, building it on first request.
	///
	/// Repeated calls with equal arguments return the same schema while it
	/// is alive.
	pub fn specialize(&self, args: impl IntoIterator<Item = TypeExpr>) -> Result<Schema, SchemaError> {
		let args: Vec<TypeExpr> = args.into_iter().collect();
		let mut guard = resolve::ResolutionGuard::default();
		let resolved = args
			.iter()
			.map(|arg| resolve::Resolver::detached(self.registry(), self.name(), &mut guard).resolve(arg))
			.collect::<Result<Vec<_>, _>>()?;
		self.specialize_resolved(resolved, &mut guard)
	}

	pub(crate) fn specialize_resolved(&self, args: Vec<TypeDescriptor>, guard: &mut resolve::ResolutionGuard) -> Result<Schema, SchemaError> {
		let origin = self.generic_origin().unwrap_or(self);
		let expected = origin.inner.decl.params.len();
		if expected == 0 || args.len() != expected || self.inner.specialization.is_some() {
			return Err(SchemaError::GenericArity {
				schema: self.name().to_string(),
				expected: if self.inner.specialization.is_some() { 0 } else { expected },
				got: args.len(),
			});
		}
		if let Some(found) = self.inner.specializations.lock().get(&args).and_then(Weak::upgrade) {
			return Ok(Schema { inner: found });
		}
		let schema = builder::compile(
			self.registry(),
			Arc::clone(&self.inner.decl),
			Some((self.clone(), args.clone())),
			guard,
		)?;
		let mut table = self.inner.specializations.lock();
		table.retain(|_, weak| weak.strong_count() > 0);
		// Another caller may have won the race; keep the first entry.
		if let Some(found) = table.get(&args).and_then(Weak::upgrade) {
			return Ok(Schema { inner: found });
		}
		table.insert(args, Arc::downgrade(&schema.inner));
		tracing::debug!(schema = %schema.name(), "schema.specialized");
		Ok(schema)
	}

	/// Returns `true` if every field can be omitted.
	pub fn is_default_constructible(&self) -> bool {
		self.attributes().all(Attribute::has_default)
	}

	/// Builds an instance using only defaults.
	pub fn default_instance(&self) -> Result<Record, ValidationError> {
		self.construct(std::iter::empty::<(&str, Value)>())
	}

	/// Validates `fields` and builds a frozen instance.
	///
	/// Omitted fields use their default providers. Either every field
	/// validates or construction fails; partial instances never escape.
	pub fn construct<K, V>(&self, fields: impl IntoIterator<Item = (K, V)>) -> Result<Record, ValidationError>
	where
		K: AsRef<str>,
		V: Into<Value>,
	{
		self.construct_with(fields.into_iter().map(|(k, v)| (k, v.into())), Coercion::Lenient)
	}

	pub(crate) fn construct_with<K: AsRef<str>>(
		&self,
		fields: impl IntoIterator<Item = (K, Value)>,
		mode: Coercion,
	) -> Result<Record, ValidationError> {
		let mut supplied: Vec<Option<Value>> = vec![None; self.len()];
		for (key, value) in fields {
			let key = key.as_ref();
			let idx = self.index_of(key).ok_or_else(|| ValidationError::unexpected(key).in_schema(self.name()))?;
			supplied[idx] = Some(value);
		}
		let mut values = Vec::with_capacity(self.len());
		for (attr, slot) in self.attributes().zip(supplied) {
			let step = || PathStep::Field(Arc::clone(&attr.name));
			let raw = match slot {
				Some(value) => value,
				None => attr.produce_default().map_err(|e| e.at(step()).in_schema(self.name()))?,
			};
			let value = attr.validator.validate_with(&raw, mode).map_err(|e| e.at(step()).in_schema(self.name()))?;
			values.push(value);
		}
		Ok(Record::from_parts(self.clone(), values))
	}

	/// Builds an instance from a string-keyed mapping, coercing nested
	/// mappings into records where the schema expects them.
	pub fn from_mapping(&self, mapping: &Value) -> Result<Record, ValidationError> {
		let Value::Map(entries) = mapping else {
			return Err(ValidationError::mismatch(&TypeDescriptor::record(self.as_ref_handle()), mapping).in_schema(self.name()));
		};
		let mut fields = Vec::with_capacity(entries.len());
		for (key, value) in entries.iter() {
			let Some(name) = key.as_str() else {
				return Err(ValidationError::mismatch(&TypeDescriptor::string(), key)
					.at(PathStep::Key(key.clone()))
					.in_schema(self.name()));
			};
			fields.push((name, value.clone()));
		}
		self.construct_with(fields, Coercion::Lenient)
	}
}

impl PartialEq for Schema {
	fn eq(&self, other: &Self) -> bool {
		self.id() == other.id()
	}
}

impl Eq for Schema {}

impl Hash for Schema {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id().hash(state);
	}
}

impl fmt::Debug for Schema {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Schema")
			.field("name", &self.inner.name)
			.field("id", &self.inner.id)
			.field("fields", &self.inner.attributes.keys().collect::<Vec<_>>())
			.finish()
	}
}

impl fmt::Display for Schema {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Placeholder for a schema whose construction is still in progress.
pub struct ForwardRef {
	name: Arc<str>,
	slot: OnceLock<Weak<SchemaInner>>,
}

impl ForwardRef {
	pub(crate) fn new(name: Arc<str>) -> Arc<Self> {
		Arc::new(Self {
			name,
			slot: OnceLock::new(),
		})
	}

	pub(crate) fn fill(&self, schema: &Schema) {
		let _ = self.slot.set(Arc::downgrade(&schema.inner));
	}
}

impl fmt::Debug for ForwardRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ForwardRef({}, filled={})", self.name, self.slot.get().is_some())
	}
}

/// Schema reference held by descriptors.
///
/// Self-referential declarations point at a [`ForwardRef`]; it is filled
/// once the schema is complete and dereferenced lazily at validation time.
#[derive(Debug, Clone)]
pub enum SchemaRef {
	Resolved(Schema),
	Forward(Arc<ForwardRef>),
}

impl SchemaRef {
	pub fn name(&self) -> &str {
		match self {
			Self::Resolved(schema) => schema.name(),
			Self::Forward(forward) => &forward.name,
		}
	}

	/// Returns the referenced schema, or `None` if a forward reference was
	/// never completed or its schema has been dropped.
	pub fn resolve(&self) -> Option<Schema> {
		match self {
			Self::Resolved(schema) => Some(schema.clone()),
			Self::Forward(forward) => forward.slot.get().and_then(Weak::upgrade).map(|inner| Schema { inner }),
		}
	}
}

impl PartialEq for SchemaRef {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Resolved(a), Self::Resolved(b)) => a == b,
			(Self::Forward(a), Self::Forward(b)) => Arc::ptr_eq(a, b),
			_ => false,
		}
	}
}

impl Eq for SchemaRef {}

impl Hash for SchemaRef {
	fn hash<H: Hasher>(&self, state: &mut H) {
		match self {
			Self::Resolved(schema) => {
				0u8.hash(state);
				schema.hash(state);
			}
			Self::Forward(forward) => {
				1u8.hash(state);
				(Arc::as_ptr(forward) as usize).hash(state);
			}
		}
	}
}
