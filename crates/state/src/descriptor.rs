//! Resolved type descriptors.
//!
//! A [`TypeDescriptor`] is the normalized form of a declared annotation:
//! type parameters are substituted, named references are bound to schemas
//! (or forward references while a schema is still being built), and
//! `none` members of unions are folded into the `optional` flag.
//!
//! Equality and hashing are structural and ignore [`Metadata`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::callable::InterfaceDescriptor;
use crate::schema::SchemaRef;
use crate::value::Value;

/// Closed set of named values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Enumeration {
	pub name: Arc<str>,
	pub members: Vec<(Arc<str>, Value)>,
}

impl Enumeration {
	pub fn new<N, V>(name: impl AsRef<str>, members: impl IntoIterator<Item = (N, V)>) -> Self
	where
		N: AsRef<str>,
		V: Into<Value>,
	{
		Self {
			name: Arc::from(name.as_ref()),
			members: members.into_iter().map(|(n, v)| (Arc::from(n.as_ref()), v.into())).collect(),
		}
	}

	/// Returns the member value registered under `name`.
	pub fn member(&self, name: &str) -> Option<&Value> {
		self.members.iter().find(|(n, _)| n.as_ref() == name).map(|(_, v)| v)
	}

	pub fn contains(&self, value: &Value) -> bool {
		self.members.iter().any(|(_, v)| v == value)
	}
}

/// Descriptor head: what kind of value is described.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
	Any,
	None,
	Bool,
	Int,
	Float,
	Str,
	Bytes,
	Literal(Arc<[Value]>),
	Enumeration(Arc<Enumeration>),
	/// Ordered sequence; one argument.
	List,
	/// Unordered collection; one argument.
	Set,
	/// Key-value mapping; key and value arguments.
	Map,
	/// Fixed-length heterogeneous sequence; one argument per position.
	Tuple,
	/// Alternatives tried in declaration order.
	Union,
	Record(SchemaRef),
	Callable(Arc<InterfaceDescriptor>),
}

/// Non-structural annotations attached to a descriptor.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
	pub description: Option<Arc<str>>,
	pub alias: Option<Arc<str>>,
}

/// Normalized description of one attribute's declared type.
#[derive(Clone)]
pub struct TypeDescriptor {
	origin: Origin,
	arguments: Arc<[TypeDescriptor]>,
	optional: bool,
	metadata: Metadata,
}

impl TypeDescriptor {
	pub(crate) fn new(origin: Origin, arguments: Vec<TypeDescriptor>) -> Self {
		Self {
			origin,
			arguments: arguments.into(),
			optional: false,
			metadata: Metadata::default(),
		}
	}

	fn leaf(origin: Origin) -> Self {
		Self::new(origin, Vec::new())
	}

	pub fn any() -> Self {
		Self::leaf(Origin::Any)
	}

	pub fn none() -> Self {
		Self::leaf(Origin::None)
	}

	pub fn bool() -> Self {
		Self::leaf(Origin::Bool)
	}

	pub fn int() -> Self {
		Self::leaf(Origin::Int)
	}

	pub fn float() -> Self {
		Self::leaf(Origin::Float)
	}

	pub fn string() -> Self {
		Self::leaf(Origin::Str)
	}

	pub fn bytes() -> Self {
		Self::leaf(Origin::Bytes)
	}

	pub fn list(element: TypeDescriptor) -> Self {
		Self::new(Origin::List, vec![element])
	}

	pub fn set(element: TypeDescriptor) -> Self {
		Self::new(Origin::Set, vec![element])
	}

	pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
		Self::new(Origin::Map, vec![key, value])
	}

	pub fn tuple(items: Vec<TypeDescriptor>) -> Self {
		Self::new(Origin::Tuple, items)
	}

	pub fn record(schema: SchemaRef) -> Self {
		Self::leaf(Origin::Record(schema))
	}

	pub fn callable(interface: InterfaceDescriptor) -> Self {
		Self::leaf(Origin::Callable(Arc::new(interface)))
	}

	/// Builds a union, folding `none` alternatives into the optional flag
	/// and flattening nested unions.
	///
	/// A union left with a single alternative collapses into it.
	pub fn union(alternatives: Vec<TypeDescriptor>) -> Self {
		let mut optional = false;
		let mut flat: Vec<TypeDescriptor> = Vec::with_capacity(alternatives.len());
		for alt in alternatives {
			optional |= alt.optional;
			let alt = alt.required();
			match alt.origin {
				Origin::None => optional = true,
				Origin::Union => {
					for inner in alt.arguments.iter() {
						if !flat.contains(inner) {
							flat.push(inner.clone());
						}
					}
				}
				_ => {
					if !flat.contains(&alt) {
						flat.push(alt);
					}
				}
			}
		}
		let base = match flat.len() {
			0 => Self::none(),
			1 => flat.pop().unwrap_or_else(Self::none),
			_ => Self::new(Origin::Union, flat),
		};
		if optional && base.origin != Origin::None { base.into_optional() } else { base }
	}

	/// Marks the descriptor as also accepting `none`.
	pub fn into_optional(mut self) -> Self {
		if self.origin != Origin::None && self.origin != Origin::Any {
			self.optional = true;
		}
		self
	}

	/// Returns the descriptor without its optional flag.
	pub fn required(&self) -> Self {
		let mut this = self.clone();
		this.optional = false;
		this
	}

	pub fn with_metadata(mut self, metadata: Metadata) -> Self {
		self.metadata = metadata;
		self
	}

	pub fn origin(&self) -> &Origin {
		&self.origin
	}

	pub fn arguments(&self) -> &[TypeDescriptor] {
		&self.arguments
	}

	pub fn is_optional(&self) -> bool {
		self.optional
	}

	pub fn metadata(&self) -> &Metadata {
		&self.metadata
	}

	/// Returns `true` when a value matching `other` always matches `self`.
	pub fn is_assignable_from(&self, other: &TypeDescriptor) -> bool {
		if self.origin == Origin::Any || self == other {
			return true;
		}
		if other.origin == Origin::None {
			return self.optional;
		}
		if other.optional && !self.optional {
			return false;
		}
		if other.origin == Origin::Union {
			return other.arguments.iter().all(|alt| self.is_assignable_from(alt));
		}
		if self.origin == Origin::Union {
			return self.arguments.iter().any(|alt| alt.is_assignable_from(&other.required()));
		}
		self.origin == other.origin
			&& self.arguments.len() == other.arguments.len()
			&& self.arguments.iter().zip(other.arguments.iter()).all(|(a, b)| a.is_assignable_from(b))
	}
}

impl PartialEq for TypeDescriptor {
	fn eq(&self, other: &Self) -> bool {
		self.optional == other.optional && self.origin == other.origin && self.arguments == other.arguments
	}
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.origin.hash(state);
		self.arguments.hash(state);
		self.optional.hash(state);
	}
}

impl fmt::Debug for TypeDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "TypeDescriptor({self})")
	}
}

impl fmt::Display for TypeDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.optional {
			f.write_str("optional[")?;
		}
		let args = &self.arguments;
		match &self.origin {
			Origin::Any => f.write_str("any")?,
			Origin::None => f.write_str("none")?,
			Origin::Bool => f.write_str("bool")?,
			Origin::Int => f.write_str("int")?,
			Origin::Float => f.write_str("float")?,
			Origin::Str => f.write_str("str")?,
			Origin::Bytes => f.write_str("bytes")?,
			Origin::Literal(values) => {
				f.write_str("literal[")?;
				for (idx, value) in values.iter().enumerate() {
					if idx > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{value:?}")?;
				}
				f.write_str("]")?;
			}
			Origin::Enumeration(enumeration) => write!(f, "enum {}", enumeration.name)?,
			Origin::List => write_generic(f, "list", args)?,
			Origin::Set => write_generic(f, "set", args)?,
			Origin::Map => write_generic(f, "map", args)?,
			Origin::Tuple => write_generic(f, "tuple", args)?,
			Origin::Union => {
				for (idx, alt) in args.iter().enumerate() {
					if idx > 0 {
						f.write_str(" | ")?;
					}
					write!(f, "{alt}")?;
				}
			}
			Origin::Record(schema) => f.write_str(schema.name())?,
			Origin::Callable(interface) => write!(f, "callable {interface}")?,
		}
		if self.optional {
			f.write_str("]")?;
		}
		Ok(())
	}
}

fn write_generic(f: &mut fmt::Formatter<'_>, head: &str, args: &[TypeDescriptor]) -> fmt::Result {
	write!(f, "{head}[")?;
	for (idx, arg) in args.iter().enumerate() {
		if idx > 0 {
			f.write_str(", ")?;
		}
		write!(f, "{arg}")?;
	}
	f.write_str("]")
}
