//! Declared type annotations.
//!
//! [`TypeExpr`] is what a schema declaration states about a field. It may
//! mention type parameters and refer to schemas by name; the schema builder
//! resolves it into a [`TypeDescriptor`](crate::descriptor::TypeDescriptor).

use std::sync::Arc;

use crate::descriptor::{Enumeration, Metadata};
use crate::schema::Schema;
use crate::value::Value;

/// A declared field type.
#[derive(Debug, Clone)]
pub enum TypeExpr {
	Any,
	None,
	Bool,
	Int,
	Float,
	Str,
	Bytes,
	Literal(Vec<Value>),
	Enumeration(Arc<Enumeration>),
	List(Box<TypeExpr>),
	Set(Box<TypeExpr>),
	Map(Box<TypeExpr>, Box<TypeExpr>),
	Tuple(Vec<TypeExpr>),
	Union(Vec<TypeExpr>),
	Optional(Box<TypeExpr>),
	/// Direct reference to a compiled schema.
	Record(Schema),
	/// Compiled generic schema specialized with the given arguments.
	Specialized(Schema, Vec<TypeExpr>),
	/// Reference to a schema by registered name; resolves forward references.
	Named(Arc<str>),
	/// Named generic schema specialized with the given arguments.
	Generic(Arc<str>, Vec<TypeExpr>),
	/// Type parameter of the enclosing schema.
	Param(Arc<str>),
	Callable(Arc<CallableInterface>),
	Annotated(Box<TypeExpr>, Metadata),
}

/// Declared call contract for dependency injection points.
#[derive(Debug, Clone)]
pub struct CallableInterface {
	pub name: Arc<str>,
	pub params: Vec<TypeExpr>,
	pub returns: TypeExpr,
}

impl CallableInterface {
	pub fn new(name: impl AsRef<str>, params: Vec<TypeExpr>, returns: TypeExpr) -> Self {
		Self {
			name: Arc::from(name.as_ref()),
			params,
			returns,
		}
	}
}

impl TypeExpr {
	pub fn list(element: TypeExpr) -> Self {
		Self::List(Box::new(element))
	}

	pub fn set(element: TypeExpr) -> Self {
		Self::Set(Box::new(element))
	}

	pub fn map(key: TypeExpr, value: TypeExpr) -> Self {
		Self::Map(Box::new(key), Box::new(value))
	}

	pub fn tuple(items: impl IntoIterator<Item = TypeExpr>) -> Self {
		Self::Tuple(items.into_iter().collect())
	}

	pub fn union(alternatives: impl IntoIterator<Item = TypeExpr>) -> Self {
		Self::Union(alternatives.into_iter().collect())
	}

	pub fn optional(inner: TypeExpr) -> Self {
		Self::Optional(Box::new(inner))
	}

	pub fn literal<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
		Self::Literal(values.into_iter().map(Into::into).collect())
	}

	pub fn enumeration(enumeration: Enumeration) -> Self {
		Self::Enumeration(Arc::new(enumeration))
	}

	pub fn record(schema: &Schema) -> Self {
		Self::Record(schema.clone())
	}

	pub fn specialized(schema: &Schema, args: impl IntoIterator<Item = TypeExpr>) -> Self {
		Self::Specialized(schema.clone(), args.into_iter().collect())
	}

	pub fn named(name: impl AsRef<str>) -> Self {
		Self::Named(Arc::from(name.as_ref()))
	}

	pub fn generic(name: impl AsRef<str>, args: impl IntoIterator<Item = TypeExpr>) -> Self {
		Self::Generic(Arc::from(name.as_ref()), args.into_iter().collect())
	}

	pub fn param(name: impl AsRef<str>) -> Self {
		Self::Param(Arc::from(name.as_ref()))
	}

	pub fn callable(interface: CallableInterface) -> Self {
		Self::Callable(Arc::new(interface))
	}

	/// Attaches a human readable description.
	pub fn with_description(self, description: impl AsRef<str>) -> Self {
		let (inner, mut metadata) = self.split_metadata();
		metadata.description = Some(Arc::from(description.as_ref()));
		Self::Annotated(Box::new(inner), metadata)
	}

	/// Attaches an alternative key used by mapping import/export.
	pub fn with_alias(self, alias: impl AsRef<str>) -> Self {
		let (inner, mut metadata) = self.split_metadata();
		metadata.alias = Some(Arc::from(alias.as_ref()));
		Self::Annotated(Box::new(inner), metadata)
	}

	fn split_metadata(self) -> (TypeExpr, Metadata) {
		match self {
			Self::Annotated(inner, metadata) => (*inner, metadata),
			other => (other, Metadata::default()),
		}
	}
}
