//! Annotation to descriptor resolution.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ForwardRef, SchemaRef, SchemaRegistry};
use crate::callable::InterfaceDescriptor;
use crate::descriptor::{Origin, TypeDescriptor};
use crate::error::SchemaError;
use crate::expr::TypeExpr;
use crate::value::Value;

/// Schemas whose construction is in progress, keyed by stable name
/// (`Node` for a declaration, `Node[int]` for a specialization).
#[derive(Debug, Default)]
pub(crate) struct ResolutionGuard {
	pending: HashMap<Arc<str>, Arc<ForwardRef>>,
}

impl ResolutionGuard {
	pub(crate) fn enter(&mut self, key: Arc<str>) -> Arc<ForwardRef> {
		let forward = ForwardRef::new(Arc::clone(&key));
		self.pending.insert(key, Arc::clone(&forward));
		forward
	}

	pub(crate) fn leave(&mut self, key: &str) {
		self.pending.remove(key);
	}

	fn get(&self, key: &str) -> Option<Arc<ForwardRef>> {
		self.pending.get(key).cloned()
	}
}

/// Stable display name of a specialization, e.g. `Pair[str, list[int]]`.
pub(crate) fn specialization_name(origin: &str, args: &[TypeDescriptor]) -> Arc<str> {
	let args: Vec<String> = args.iter().map(ToString::to_string).collect();
	Arc::from(format!("{origin}[{}]", args.join(", ")))
}

pub(crate) struct Resolver<'a> {
	registry: &'a SchemaRegistry,
	schema: &'a str,
	field: &'a str,
	params: &'a [Arc<str>],
	bindings: Option<&'a [TypeDescriptor]>,
	guard: &'a mut ResolutionGuard,
}

impl<'a> Resolver<'a> {
	pub(crate) fn new(
		registry: &'a SchemaRegistry,
		schema: &'a str,
		field: &'a str,
		params: &'a [Arc<str>],
		bindings: Option<&'a [TypeDescriptor]>,
		guard: &'a mut ResolutionGuard,
	) -> Self {
		Self {
			registry,
			schema,
			field,
			params,
			bindings,
			guard,
		}
	}

	/// Resolver for type arguments supplied outside any declaration.
	pub(crate) fn detached(registry: &'a SchemaRegistry, schema: &'a str, guard: &'a mut ResolutionGuard) -> Self {
		Self::new(registry, schema, "<type argument>", &[], None, guard)
	}

	fn unsupported(&self, shape: impl Into<String>) -> SchemaError {
		SchemaError::UnsupportedType {
			schema: self.schema.to_string(),
			field: self.field.to_string(),
			shape: shape.into(),
		}
	}

	pub(crate) fn resolve(&mut self, expr: &TypeExpr) -> Result<TypeDescriptor, SchemaError> {
		Ok(match expr {
			TypeExpr::Any => TypeDescriptor::any(),
			TypeExpr::None => TypeDescriptor::none(),
			TypeExpr::Bool => TypeDescriptor::bool(),
			TypeExpr::Int => TypeDescriptor::int(),
			TypeExpr::Float => TypeDescriptor::float(),
			TypeExpr::Str => TypeDescriptor::string(),
			TypeExpr::Bytes => TypeDescriptor::bytes(),
			TypeExpr::Literal(values) => {
				if values.is_empty() {
					return Err(self.unsupported("literal without members"));
				}
				if let Some(bad) = values.iter().find(|v| !is_scalar(v)) {
					return Err(self.unsupported(format!("literal member of shape {}", bad.shape())));
				}
				let mut members: Vec<Value> = Vec::with_capacity(values.len());
				for value in values {
					if !members.contains(value) {
						members.push(value.clone());
					}
				}
				TypeDescriptor::new(Origin::Literal(members.into()), Vec::new())
			}
			TypeExpr::Enumeration(enumeration) => {
				if enumeration.members.is_empty() {
					return Err(self.unsupported(format!("enum {} without members", enumeration.name)));
				}
				TypeDescriptor::new(Origin::Enumeration(Arc::clone(enumeration)), Vec::new())
			}
			TypeExpr::List(element) => TypeDescriptor::list(self.resolve(element)?),
			TypeExpr::Set(element) => {
				let element = self.resolve(element)?;
				if !is_hashable(&element) {
					return Err(self.unsupported(format!("set of unhashable {element}")));
				}
				TypeDescriptor::set(element)
			}
			TypeExpr::Map(key, value) => {
				let key = self.resolve(key)?;
				if !is_hashable(&key) {
					return Err(self.unsupported(format!("map keyed by unhashable {key}")));
				}
				TypeDescriptor::map(key, self.resolve(value)?)
			}
			TypeExpr::Tuple(items) => TypeDescriptor::tuple(items.iter().map(|item| self.resolve(item)).collect::<Result<_, _>>()?),
			TypeExpr::Union(alternatives) => {
				if alternatives.is_empty() {
					return Err(self.unsupported("union without alternatives"));
				}
				TypeDescriptor::union(alternatives.iter().map(|alt| self.resolve(alt)).collect::<Result<_, _>>()?)
			}
			TypeExpr::Optional(inner) => self.resolve(inner)?.into_optional(),
			TypeExpr::Record(schema) => TypeDescriptor::record(SchemaRef::Resolved(schema.clone())),
			TypeExpr::Specialized(schema, args) => {
				let args = self.resolve_all(args)?;
				let key = specialization_name(schema.name(), &args);
				if let Some(forward) = self.guard.get(&key) {
					return Ok(TypeDescriptor::record(SchemaRef::Forward(forward)));
				}
				TypeDescriptor::record(SchemaRef::Resolved(schema.specialize_resolved(args, self.guard)?))
			}
			TypeExpr::Named(name) => {
				if let Some(forward) = self.guard.get(name) {
					TypeDescriptor::record(SchemaRef::Forward(forward))
				} else if let Some(schema) = self.registry.get(name) {
					TypeDescriptor::record(SchemaRef::Resolved(schema))
				} else {
					return Err(SchemaError::UnknownType {
						schema: self.schema.to_string(),
						field: self.field.to_string(),
						name: name.to_string(),
					});
				}
			}
			TypeExpr::Generic(name, args) => self.resolve_generic(name, args)?,
			TypeExpr::Param(name) => match self.params.iter().position(|p| p == name) {
				Some(idx) => self
					.bindings
					.and_then(|bound| bound.get(idx).cloned())
					.unwrap_or_else(TypeDescriptor::any),
				None => {
					return Err(SchemaError::UnboundParameter {
						schema: self.schema.to_string(),
						field: self.field.to_string(),
						name: name.to_string(),
					});
				}
			},
			TypeExpr::Callable(interface) => TypeDescriptor::callable(InterfaceDescriptor {
				name: Arc::clone(&interface.name),
				params: self.resolve_all(&interface.params)?,
				returns: self.resolve(&interface.returns)?,
			}),
			TypeExpr::Annotated(inner, metadata) => self.resolve(inner)?.with_metadata(metadata.clone()),
		})
	}

	fn resolve_all(&mut self, exprs: &[TypeExpr]) -> Result<Vec<TypeDescriptor>, SchemaError> {
		exprs.iter().map(|expr| self.resolve(expr)).collect()
	}

	fn resolve_generic(&mut self, name: &str, args: &[TypeExpr]) -> Result<TypeDescriptor, SchemaError> {
		let args = self.resolve_all(args)?;
		let key = specialization_name(name, &args);
		if let Some(forward) = self.guard.get(&key) {
			return Ok(TypeDescriptor::record(SchemaRef::Forward(forward)));
		}
		if let Some(forward) = self.guard.get(name) {
			// The unspecialized declaration binds its parameters to `any`,
			// so only that instantiation can refer back to it.
			if args.iter().all(|arg| arg.origin() == &Origin::Any) {
				return Ok(TypeDescriptor::record(SchemaRef::Forward(forward)));
			}
			return Err(self.unsupported(format!("specialization {key} inside the declaration of {name}")));
		}
		match self.registry.get(name) {
			Some(schema) => Ok(TypeDescriptor::record(SchemaRef::Resolved(schema.specialize_resolved(args, self.guard)?))),
			None => Err(SchemaError::UnknownType {
				schema: self.schema.to_string(),
				field: self.field.to_string(),
				name: name.to_string(),
			}),
		}
	}
}

fn is_scalar(value: &Value) -> bool {
	matches!(value, Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) | Value::Bytes(_))
}

/// Shapes allowed as set elements and mapping keys.
pub(crate) fn is_hashable(descriptor: &TypeDescriptor) -> bool {
	match descriptor.origin() {
		Origin::Any
		| Origin::None
		| Origin::Bool
		| Origin::Int
		| Origin::Float
		| Origin::Str
		| Origin::Bytes
		| Origin::Literal(_)
		| Origin::Enumeration(_) => true,
		Origin::Tuple | Origin::Union => descriptor.arguments().iter().all(is_hashable),
		Origin::List | Origin::Set | Origin::Map | Origin::Record(_) | Origin::Callable(_) => false,
	}
}
