//! Explicit schema declaration.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::resolve::{ResolutionGuard, Resolver, specialization_name};
use super::{Attribute, FieldDecl, RecordDecl, Schema, SchemaInner, SchemaRegistry, Specialization};
use crate::defaults::DefaultValue;
use crate::descriptor::TypeDescriptor;
use crate::error::SchemaError;
use crate::expr::TypeExpr;

/// Builder for a record schema.
///
/// # Example
///
/// ```
/// use keel_state::{DefaultValue, Schema, SchemaRegistry, TypeExpr, Value};
///
/// let registry = SchemaRegistry::new();
/// let user = Schema::builder("User")
/// 	.field("id", TypeExpr::Str)
/// 	.field("name", TypeExpr::Str)
/// 	.field_with("tags", TypeExpr::set(TypeExpr::Str), DefaultValue::value(Value::empty_set()))
/// 	.build_in(&registry)
/// 	.unwrap();
///
/// let ada = user.construct([("id", Value::from("1")), ("name", Value::from("Ada"))]).unwrap();
/// assert_eq!(ada.get("name"), Some(&Value::from("Ada")));
/// ```
#[derive(Debug)]
pub struct SchemaBuilder {
	name: Arc<str>,
	params: Vec<Arc<str>>,
	base: Option<Schema>,
	fields: Vec<FieldDecl>,
	error: Option<SchemaError>,
}

impl SchemaBuilder {
	pub(super) fn new(name: impl AsRef<str>) -> Self {
		Self {
			name: Arc::from(name.as_ref()),
			params: Vec::new(),
			base: None,
			fields: Vec::new(),
			error: None,
		}
	}

	fn fail(&mut self, error: SchemaError) {
		self.error.get_or_insert(error);
	}

	/// Declares a type parameter usable as [`TypeExpr::Param`].
	#[must_use]
	pub fn param(mut self, name: impl AsRef<str>) -> Self {
		let name: Arc<str> = Arc::from(name.as_ref());
		if self.params.contains(&name) {
			self.fail(SchemaError::DuplicateParameter {
				schema: self.name.to_string(),
				name: name.to_string(),
			});
		}
		self.params.push(name);
		self
	}

	/// Inherits all fields of `base`, which come first in field order.
	#[must_use]
	pub fn extends(mut self, base: &Schema) -> Self {
		if self.base.is_some() {
			self.fail(SchemaError::MultipleBases { schema: self.name.to_string() });
		}
		self.base = Some(base.clone());
		self
	}

	/// Declares a field without a default. Optional fields default to `none`.
	#[must_use]
	pub fn field(self, name: impl AsRef<str>, expr: TypeExpr) -> Self {
		self.push_field(name, expr, None)
	}

	#[must_use]
	pub fn field_with(self, name: impl AsRef<str>, expr: TypeExpr, default: DefaultValue) -> Self {
		self.push_field(name, expr, Some(default))
	}

	fn push_field(mut self, name: impl AsRef<str>, expr: TypeExpr, default: Option<DefaultValue>) -> Self {
		self.fields.push(FieldDecl {
			name: Arc::from(name.as_ref()),
			expr,
			default,
		});
		self
	}

	/// Compiles and registers the schema in the process-wide registry.
	pub fn build(self) -> Result<Schema, SchemaError> {
		self.build_in(SchemaRegistry::global())
	}

	/// Compiles and registers the schema in `registry`.
	pub fn build_in(self, registry: &SchemaRegistry) -> Result<Schema, SchemaError> {
		if let Some(error) = self.error {
			return Err(error);
		}
		if registry.contains(&self.name) {
			return Err(SchemaError::DuplicateSchema { name: self.name.to_string() });
		}
		let decl = Arc::new(RecordDecl {
			name: self.name,
			params: self.params,
			base: self.base,
			fields: self.fields,
		});
		let mut guard = ResolutionGuard::default();
		let schema = compile(registry, decl, None, &mut guard)?;
		registry.register(&schema)?;
		tracing::debug!(schema = %schema.name(), fields = schema.len(), generic = schema.is_generic(), "schema.declared");
		Ok(schema)
	}
}

/// Resolves and compiles a declaration, optionally under type-argument bindings.
pub(super) fn compile(
	registry: &SchemaRegistry,
	decl: Arc<RecordDecl>,
	specialization: Option<(Schema, Vec<TypeDescriptor>)>,
	guard: &mut ResolutionGuard,
) -> Result<Schema, SchemaError> {
	let name = match &specialization {
		Some((origin, args)) => specialization_name(origin.name(), args),
		None => Arc::clone(&decl.name),
	};
	let forward = guard.enter(Arc::clone(&name));
	let result = compile_attributes(registry, &decl, &name, specialization.as_ref().map(|(_, args)| args.as_slice()), guard);
	guard.leave(&name);
	let (attributes, aliases) = result?;

	let schema = Schema {
		inner: Arc::new(SchemaInner {
			id: super::SchemaId::next(),
			name,
			attributes,
			aliases,
			decl,
			specialization: specialization.map(|(origin, arguments)| Specialization { origin, arguments }),
			specializations: Mutex::new(HashMap::new()),
			registry: registry.clone(),
		}),
	};
	forward.fill(&schema);
	Ok(schema)
}

type Compiled = (IndexMap<Arc<str>, Attribute>, HashMap<Arc<str>, usize>);

fn compile_attributes(
	registry: &SchemaRegistry,
	decl: &RecordDecl,
	name: &str,
	bindings: Option<&[TypeDescriptor]>,
	guard: &mut ResolutionGuard,
) -> Result<Compiled, SchemaError> {
	let mut attributes: IndexMap<Arc<str>, Attribute> = IndexMap::new();
	if let Some(base) = &decl.base {
		for attr in base.attributes() {
			attributes.insert(Arc::clone(&attr.name), attr.clone());
		}
	}

	for field in &decl.fields {
		if attributes.contains_key(&field.name) {
			return Err(SchemaError::DuplicateField {
				schema: name.to_string(),
				field: field.name.to_string(),
			});
		}
		let descriptor = Resolver::new(registry, name, &field.name, &decl.params, bindings, guard).resolve(&field.expr)?;
		let validator = registry.synthesizer().compile(&descriptor);
		let default = match &field.default {
			Some(DefaultValue::Value(value)) => {
				let normalized = validator.validate(value).map_err(|source| SchemaError::InvalidDefault {
					schema: name.to_string(),
					field: field.name.to_string(),
					source,
				})?;
				Some(DefaultValue::Value(normalized))
			}
			other => other.clone(),
		};
		attributes.insert(
			Arc::clone(&field.name),
			Attribute {
				name: Arc::clone(&field.name),
				alias: descriptor.metadata().alias.clone(),
				descriptor,
				default,
				validator,
			},
		);
	}

	let mut aliases = HashMap::new();
	for (idx, attr) in attributes.values().enumerate() {
		if let Some(alias) = &attr.alias {
			if attributes.contains_key(alias) || aliases.insert(Arc::clone(alias), idx).is_some() {
				return Err(SchemaError::DuplicateField {
					schema: name.to_string(),
					field: alias.to_string(),
				});
			}
		}
	}
	Ok((attributes, aliases))
}
