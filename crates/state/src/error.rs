//! Error types for schema declaration, validation, and path traversal.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::descriptor::TypeDescriptor;
use crate::path::PathStep;
use crate::value::Value;

/// Schema declaration failure. Raised while building a schema, never while
/// constructing instances.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
	#[error("schema `{schema}` field `{field}`: unsupported type shape: {shape}")]
	UnsupportedType { schema: String, field: String, shape: String },
	#[error("schema `{schema}` declares field `{field}` more than once")]
	DuplicateField { schema: String, field: String },
	#[error("schema `{schema}` expects {expected} type argument(s), got {got}")]
	GenericArity { schema: String, expected: usize, got: usize },
	#[error("schema `{schema}` field `{field}`: unknown type `{name}`")]
	UnknownType { schema: String, field: String, name: String },
	#[error("schema `{schema}` field `{field}`: unbound type parameter `{name}`")]
	UnboundParameter { schema: String, field: String, name: String },
	#[error("schema `{schema}` may extend only one base schema")]
	MultipleBases { schema: String },
	#[error("schema `{schema}` declares type parameter `{name}` more than once")]
	DuplicateParameter { schema: String, name: String },
	#[error("schema `{name}` is already registered")]
	DuplicateSchema { name: String },
	#[error("schema `{schema}` field `{field}` has an invalid default: {source}")]
	InvalidDefault {
		schema: String,
		field: String,
		#[source]
		source: ValidationError,
	},
}

/// Location of a validation failure inside a value.
pub type FieldPath = SmallVec<[PathStep; 4]>;

/// What went wrong during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
	/// The value's shape does not satisfy the descriptor.
	Mismatch { expected: String, received: String },
	/// A required field was neither supplied nor defaulted.
	MissingField,
	/// A supplied field is not declared by the schema.
	UnexpectedField,
	/// A tuple received the wrong number of elements.
	Length { expected: usize, received: usize },
	/// The value could not be produced, e.g. an unparsable environment default.
	Invalid { reason: String },
}

/// A value failed to conform to a descriptor.
///
/// Carries the path to the failing element along with the expected
/// descriptor and the offending value's shape; never the value itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
	schema: Option<Arc<str>>,
	path: FieldPath,
	kind: ValidationErrorKind,
}

impl ValidationError {
	pub fn new(kind: ValidationErrorKind) -> Self {
		Self {
			schema: None,
			path: SmallVec::new(),
			kind,
		}
	}

	pub fn mismatch(expected: &TypeDescriptor, received: &Value) -> Self {
		Self::new(ValidationErrorKind::Mismatch {
			expected: expected.to_string(),
			received: received.shape(),
		})
	}

	pub fn missing(field: &str) -> Self {
		Self::new(ValidationErrorKind::MissingField).at(PathStep::field(field))
	}

	pub fn unexpected(field: &str) -> Self {
		Self::new(ValidationErrorKind::UnexpectedField).at(PathStep::field(field))
	}

	pub fn invalid(reason: impl Into<String>) -> Self {
		Self::new(ValidationErrorKind::Invalid { reason: reason.into() })
	}

	/// Prepends one path step; called while unwinding out of nested validators.
	#[must_use]
	pub fn at(mut self, step: PathStep) -> Self {
		self.path.insert(0, step);
		self
	}

	/// Records the schema the path is rooted in. Outer schemas overwrite
	/// inner ones as the error unwinds.
	#[must_use]
	pub fn in_schema(mut self, schema: &str) -> Self {
		self.schema = Some(Arc::from(schema));
		self
	}

	pub fn schema(&self) -> Option<&str> {
		self.schema.as_deref()
	}

	pub fn path(&self) -> &[PathStep] {
		&self.path
	}

	pub fn kind(&self) -> &ValidationErrorKind {
		&self.kind
	}

	/// Renders the location as `Schema.field[0]["key"]`.
	pub fn location(&self) -> String {
		let mut out = self.schema.as_deref().unwrap_or("$").to_string();
		for step in &self.path {
			out.push_str(&step.to_string());
		}
		out
	}
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "validation failed at `{}`: ", self.location())?;
		match &self.kind {
			ValidationErrorKind::Mismatch { expected, received } => write!(f, "expected {expected}, got {received}"),
			ValidationErrorKind::MissingField => f.write_str("missing required field"),
			ValidationErrorKind::UnexpectedField => f.write_str("unexpected field"),
			ValidationErrorKind::Length { expected, received } => {
				write!(f, "expected {expected} element(s), got {received}")
			}
			ValidationErrorKind::Invalid { reason } => f.write_str(reason),
		}
	}
}

impl std::error::Error for ValidationError {}

/// Failure while building or applying an attribute path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
	#[error("`{schema}` has no field `{field}`")]
	UnknownField { schema: String, field: String },
	#[error("cannot apply `{step}` to a value of type {descriptor}")]
	NotTraversable { step: String, descriptor: String },
	#[error("path rooted at `{expected}` applied to a `{received}` record")]
	WrongRoot { expected: String, received: String },
	#[error("index {index} out of range for sequence of length {len}")]
	IndexOutOfRange { index: usize, len: usize },
	#[error("key `{key}` not present in mapping")]
	MissingKey { key: String },
	#[error("encountered none at `{location}`")]
	NoneOnPath { location: String },
	#[error("expected {expected} at `{location}`, found {received}")]
	UnexpectedShape { location: String, expected: String, received: String },
	#[error(transparent)]
	Validation(#[from] ValidationError),
}
