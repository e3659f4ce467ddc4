//! Immutable, schema-validated records.
//!
//! Schemas are declared explicitly through [`SchemaBuilder`], which
//! resolves each field's [`TypeExpr`] into a [`TypeDescriptor`] and
//! compiles a [`Validator`] for it. Instances are frozen [`Record`]s;
//! updates go through [`Record::with_fields`] or an [`AttributePath`] and
//! always produce a new record sharing unchanged data with the old one.

/// Callable values and structural call interfaces.
pub mod callable;
/// Default providers for omitted fields.
pub mod defaults;
/// Resolved type descriptors.
pub mod descriptor;
/// Schema, validation, and path errors.
pub mod error;
/// Declared type annotations.
pub mod expr;
/// Reusable read/update lenses.
pub mod path;
/// Frozen record instances.
pub mod record;
/// Schema compilation, registry, and generic specialization.
pub mod schema;
/// Validator synthesis.
pub mod validator;
/// Dynamic values.
pub mod value;

pub use callable::{CallError, Callable, InterfaceDescriptor, Parameter, Signature};
pub use defaults::DefaultValue;
pub use descriptor::{Enumeration, Metadata, Origin, TypeDescriptor};
pub use error::{PathError, SchemaError, ValidationError, ValidationErrorKind};
pub use expr::{CallableInterface, TypeExpr};
pub use path::{AttributePath, PathStep};
pub use record::Record;
pub use schema::{Attribute, Schema, SchemaBuilder, SchemaId, SchemaRef, SchemaRegistry};
pub use validator::{Coercion, Synthesizer, Validator};
pub use value::Value;
