//! Attribute paths: reusable lenses through nested records.
//!
//! An [`AttributePath`] is built against a root schema and checked step by
//! step against the declared descriptors. Reading never allocates new
//! containers. Writing rebuilds exactly the containers on the path and
//! shares every sibling with the original value.

use std::fmt;
use std::sync::Arc;

use crate::descriptor::{Origin, TypeDescriptor};
use crate::error::{PathError, ValidationError};
use crate::record::Record;
use crate::schema::Schema;
use crate::validator::Validator;
use crate::value::Value;

/// One traversal step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
	/// Record field by name.
	Field(Arc<str>),
	/// Sequence or tuple position.
	Index(usize),
	/// Mapping key.
	Key(Value),
}

impl PathStep {
	pub fn field(name: &str) -> Self {
		Self::Field(Arc::from(name))
	}
}

impl fmt::Display for PathStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Field(name) => write!(f, ".{name}"),
			Self::Index(idx) => write!(f, "[{idx}]"),
			Self::Key(key @ (Value::Str(_) | Value::Int(_) | Value::Bool(_) | Value::None)) => write!(f, "[{key:?}]"),
			Self::Key(key) => write!(f, "[<{}>]", key.shape()),
		}
	}
}

/// A checked traversal from a root schema to a target attribute.
#[derive(Clone)]
pub struct AttributePath {
	root: Schema,
	steps: Vec<PathStep>,
	target: TypeDescriptor,
	validator: Validator,
}

impl AttributePath {
	/// Starts an empty path at `root`; its target is the whole record.
	pub fn root(root: &Schema) -> Self {
		let target = TypeDescriptor::record(root.as_ref_handle());
		let validator = root.registry().synthesizer().compile(&target);
		Self {
			root: root.clone(),
			steps: Vec::new(),
			target,
			validator,
		}
	}

	/// Parses a dotted path such as `address.lines[0]` against `root`.
	///
	/// Only field names and integer indices are supported in this form;
	/// use [`Self::key`] for mapping keys.
	pub fn parse(root: &Schema, text: &str) -> Result<Self, PathError> {
		let mut path = Self::root(root);
		for segment in text.split('.').filter(|s| !s.is_empty()) {
			let (name, mut rest) = match segment.find('[') {
				Some(pos) => (&segment[..pos], &segment[pos..]),
				None => (segment, ""),
			};
			if !name.is_empty() {
				path = path.field(name)?;
			}
			while let Some(stripped) = rest.strip_prefix('[') {
				let Some(end) = stripped.find(']') else {
					return Err(PathError::NotTraversable {
						step: rest.to_string(),
						descriptor: path.target.to_string(),
					});
				};
				let index = stripped[..end].trim().parse::<usize>().map_err(|_| PathError::NotTraversable {
					step: format!("[{}]", &stripped[..end]),
					descriptor: path.target.to_string(),
				})?;
				path = path.index(index)?;
				rest = &stripped[end + 1..];
			}
		}
		Ok(path)
	}

	pub fn field(self, name: &str) -> Result<Self, PathError> {
		let step = PathStep::field(name);
		let next = match self.target.origin() {
			Origin::Any => TypeDescriptor::any(),
			Origin::Record(schema_ref) => {
				let schema = schema_ref.resolve().ok_or_else(|| self.not_traversable(&step))?;
				schema
					.attribute(name)
					.map(|attr| attr.descriptor().clone())
					.ok_or_else(|| PathError::UnknownField {
						schema: schema.name().to_string(),
						field: name.to_string(),
					})?
			}
			_ => return Err(self.not_traversable(&step)),
		};
		Ok(self.push(step, next))
	}

	pub fn index(self, index: usize) -> Result<Self, PathError> {
		let step = PathStep::Index(index);
		let next = match self.target.origin() {
			Origin::Any => TypeDescriptor::any(),
			Origin::List => self.target.arguments()[0].clone(),
			Origin::Tuple => match self.target.arguments().get(index) {
				Some(item) => item.clone(),
				None => {
					return Err(PathError::IndexOutOfRange {
						index,
						len: self.target.arguments().len(),
					});
				}
			},
			_ => return Err(self.not_traversable(&step)),
		};
		Ok(self.push(step, next))
	}

	/// Steps into a mapping entry. The key is validated, and normalized,
	/// against the mapping's key type.
	pub fn key(self, key: impl Into<Value>) -> Result<Self, PathError> {
		let key = key.into();
		let (key, next) = match self.target.origin() {
			Origin::Any => (key, TypeDescriptor::any()),
			Origin::Map => {
				let checked = self
					.root
					.registry()
					.synthesizer()
					.compile(&self.target.arguments()[0])
					.validate(&key)
					.map_err(|err| self.locate(err.at(PathStep::Key(key.clone()))))?;
				(checked, self.target.arguments()[1].clone())
			}
			_ => return Err(self.not_traversable(&PathStep::Key(key))),
		};
		Ok(self.push(PathStep::Key(key), next))
	}

	fn push(mut self, step: PathStep, target: TypeDescriptor) -> Self {
		self.validator = self.root.registry().synthesizer().compile(&target);
		self.steps.push(step);
		self.target = target;
		self
	}

	fn not_traversable(&self, step: &PathStep) -> PathError {
		PathError::NotTraversable {
			step: step.to_string(),
			descriptor: self.target.to_string(),
		}
	}

	pub fn root_schema(&self) -> &Schema {
		&self.root
	}

	pub fn steps(&self) -> &[PathStep] {
		&self.steps
	}

	/// Descriptor of the value this path points at.
	pub fn target(&self) -> &TypeDescriptor {
		&self.target
	}

	fn check_root(&self, record: &Record) -> Result<(), PathError> {
		if self.root.accepts(record) {
			Ok(())
		} else {
			Err(PathError::WrongRoot {
				expected: self.root.name().to_string(),
				received: record.schema().name().to_string(),
			})
		}
	}

	/// Reads the value at this path.
	pub fn read(&self, record: &Record) -> Result<Value, PathError> {
		self.check_root(record)?;
		let mut current = Value::Record(record.clone());
		for (depth, step) in self.steps.iter().enumerate() {
			current = child(&current, step, || self.location(depth))?.clone();
		}
		Ok(current)
	}

	/// Returns a copy of `record` with the value at this path replaced.
	///
	/// Only the new leaf is validated. Every container from the leaf up to
	/// the root is rebuilt; everything else is shared with `record`.
	///
	/// A path built on a generic schema is re-checked against the record's
	/// own specialization, so the leaf satisfies the bound type arguments.
	pub fn update(&self, record: &Record, value: impl Into<Value>) -> Result<Record, PathError> {
		self.check_root(record)?;
		if record.schema() != &self.root {
			return self.rebind(record.schema())?.update(record, value);
		}
		let leaf = self.validator.validate(&value.into()).map_err(|err| self.locate(err))?;
		match self.rebuild(&Value::Record(record.clone()), 0, leaf)? {
			Value::Record(updated) => Ok(updated),
			other => Err(PathError::UnexpectedShape {
				location: self.root.name().to_string(),
				expected: "record".into(),
				received: other.shape(),
			}),
		}
	}

	/// Replays the steps of this path from `schema`.
	fn rebind(&self, schema: &Schema) -> Result<Self, PathError> {
		self.steps.iter().try_fold(Self::root(schema), |path, step| match step {
			PathStep::Field(name) => path.field(name),
			PathStep::Index(index) => path.index(*index),
			PathStep::Key(key) => path.key(key.clone()),
		})
	}

	fn locate(&self, mut err: ValidationError) -> PathError {
		for step in self.steps.iter().rev() {
			err = err.at(step.clone());
		}
		PathError::Validation(err.in_schema(self.root.name()))
	}

	fn rebuild(&self, current: &Value, depth: usize, leaf: Value) -> Result<Value, PathError> {
		let Some(step) = self.steps.get(depth) else {
			return Ok(leaf);
		};
		let last = depth + 1 == self.steps.len();
		match (step, current) {
			(PathStep::Field(name), Value::Record(record)) => {
				let idx = record.schema().index_of(name).ok_or_else(|| PathError::UnknownField {
					schema: record.schema().name().to_string(),
					field: name.to_string(),
				})?;
				let updated = self.rebuild(record.value_at(idx), depth + 1, leaf)?;
				Ok(Value::Record(record.replace_unchecked(idx, updated)))
			}
			(PathStep::Index(idx), Value::List(items)) => {
				let existing = items.get(*idx).ok_or(PathError::IndexOutOfRange {
					index: *idx,
					len: items.len(),
				})?;
				let updated = self.rebuild(existing, depth + 1, leaf)?;
				let mut copy = Vec::clone(items);
				copy[*idx] = updated;
				Ok(Value::List(Arc::new(copy)))
			}
			(PathStep::Key(key), Value::Map(entries)) => {
				let updated = match entries.get(key) {
					Some(existing) => self.rebuild(existing, depth + 1, leaf)?,
					None if last => leaf,
					None => return Err(PathError::MissingKey { key: step.to_string() }),
				};
				let mut copy = (**entries).clone();
				copy.insert(key.clone(), updated);
				Ok(Value::Map(Arc::new(copy)))
			}
			(_, Value::None) => Err(PathError::NoneOnPath {
				location: self.location(depth),
			}),
			(step, other) => Err(PathError::UnexpectedShape {
				location: self.location(depth),
				expected: step_shape(step).into(),
				received: other.shape(),
			}),
		}
	}

	fn location(&self, depth: usize) -> String {
		let mut out = self.root.name().to_string();
		for step in &self.steps[..depth] {
			out.push_str(&step.to_string());
		}
		out
	}
}

impl fmt::Debug for AttributePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "AttributePath({self})")
	}
}

impl fmt::Display for AttributePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.location(self.steps.len()))
	}
}

fn step_shape(step: &PathStep) -> &'static str {
	match step {
		PathStep::Field(_) => "record",
		PathStep::Index(_) => "list",
		PathStep::Key(_) => "map",
	}
}

fn child<'a>(current: &'a Value, step: &PathStep, location: impl Fn() -> String) -> Result<&'a Value, PathError> {
	match (step, current) {
		(PathStep::Field(name), Value::Record(record)) => record.get(name).ok_or_else(|| PathError::UnknownField {
			schema: record.schema().name().to_string(),
			field: name.to_string(),
		}),
		(PathStep::Index(idx), Value::List(items)) => items.get(*idx).ok_or(PathError::IndexOutOfRange {
			index: *idx,
			len: items.len(),
		}),
		(PathStep::Key(key), Value::Map(entries)) => entries.get(key).ok_or_else(|| PathError::MissingKey { key: step.to_string() }),
		(_, Value::None) => Err(PathError::NoneOnPath { location: location() }),
		(step, other) => Err(PathError::UnexpectedShape {
			location: location(),
			expected: step_shape(step).into(),
			received: other.shape(),
		}),
	}
}
