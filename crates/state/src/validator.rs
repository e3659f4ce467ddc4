//! Validator synthesis.
//!
//! [`Synthesizer::compile`] turns a [`TypeDescriptor`] into a [`Validator`]
//! closure tree. Compiled validators are memoized by descriptor structure,
//! so shared sub-shapes compile once per registry.
//!
//! Validators run in one of two [`Coercion`] modes. Unions first try every
//! alternative exactly and only then retry with coercions enabled, which
//! keeps the chosen alternative independent of declaration order whenever
//! an exact match exists.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::descriptor::{Origin, TypeDescriptor};
use crate::error::{ValidationError, ValidationErrorKind};
use crate::path::PathStep;
use crate::schema::SchemaRef;
use crate::value::Value;

/// Whether a validator may reshape its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
	/// Only canonical representations are accepted.
	Exact,
	/// Numeric widening, container reshaping, enum names, and mapping to
	/// record conversion are allowed.
	Lenient,
}

type ValidateFn = dyn Fn(&Value, Coercion) -> Result<Value, ValidationError> + Send + Sync;

/// Compiled checking and normalizing function for one descriptor.
#[derive(Clone)]
pub struct Validator {
	descriptor: TypeDescriptor,
	func: Arc<ValidateFn>,
}

impl Validator {
	fn new(descriptor: TypeDescriptor, func: impl Fn(&Value, Coercion) -> Result<Value, ValidationError> + Send + Sync + 'static) -> Self {
		Self {
			descriptor,
			func: Arc::new(func),
		}
	}

	pub fn descriptor(&self) -> &TypeDescriptor {
		&self.descriptor
	}

	/// Validates and normalizes `value`, allowing coercions.
	pub fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
		(self.func)(value, Coercion::Lenient)
	}

	pub fn validate_with(&self, value: &Value, mode: Coercion) -> Result<Value, ValidationError> {
		(self.func)(value, mode)
	}
}

impl fmt::Debug for Validator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Validator({})", self.descriptor)
	}
}

/// Memoizing validator compiler.
#[derive(Default)]
pub struct Synthesizer {
	memo: Mutex<HashMap<TypeDescriptor, Validator>>,
}

impl fmt::Debug for Synthesizer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Synthesizer").field("memoized", &self.memo.lock().len()).finish()
	}
}

impl Synthesizer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the validator for `descriptor`, compiling it on first use.
	pub fn compile(&self, descriptor: &TypeDescriptor) -> Validator {
		if let Some(found) = self.memo.lock().get(descriptor) {
			return found.clone();
		}
		let compiled = self.build(descriptor);
		// Compilation of children re-enters the memo, so the lock is not held
		// across `build`.
		self.memo.lock().entry(descriptor.clone()).or_insert(compiled).clone()
	}

	pub fn memoized(&self) -> usize {
		self.memo.lock().len()
	}

	fn build(&self, descriptor: &TypeDescriptor) -> Validator {
		let core = self.build_core(&descriptor.required());
		if !descriptor.is_optional() {
			return core;
		}
		Validator::new(descriptor.clone(), move |value, mode| match value {
			Value::None => Ok(Value::None),
			other => (core.func)(other, mode),
		})
	}

	fn build_core(&self, descriptor: &TypeDescriptor) -> Validator {
		let desc = descriptor.clone();
		match descriptor.origin() {
			Origin::Any => Validator::new(desc, |value, _| Ok(value.clone())),
			Origin::None => Validator::new(desc.clone(), move |value, _| match value {
				Value::None => Ok(Value::None),
				other => Err(ValidationError::mismatch(&desc, other)),
			}),
			Origin::Bool => scalar(desc, |value| matches!(value, Value::Bool(_))),
			Origin::Int => scalar(desc, |value| matches!(value, Value::Int(_))),
			Origin::Str => scalar(desc, |value| matches!(value, Value::Str(_))),
			Origin::Bytes => scalar(desc, |value| matches!(value, Value::Bytes(_))),
			Origin::Float => Validator::new(desc.clone(), move |value, mode| match (value, mode) {
				(Value::Float(_), _) => Ok(value.clone()),
				(Value::Int(i), Coercion::Lenient) => {
					let float = *i as f64;
					if float as i128 == i128::from(*i) {
						Ok(Value::Float(float))
					} else {
						Err(ValidationError::invalid("int is not exactly representable as float"))
					}
				}
				(other, _) => Err(ValidationError::mismatch(&desc, other)),
			}),
			Origin::Literal(allowed) => {
				let allowed = Arc::clone(allowed);
				Validator::new(desc.clone(), move |value, _| {
					if allowed.contains(value) {
						Ok(value.clone())
					} else {
						Err(ValidationError::mismatch(&desc, value))
					}
				})
			}
			Origin::Enumeration(enumeration) => {
				let enumeration = Arc::clone(enumeration);
				Validator::new(desc.clone(), move |value, mode| {
					if enumeration.contains(value) {
						return Ok(value.clone());
					}
					if mode == Coercion::Lenient
						&& let Some(member) = value.as_str().and_then(|name| enumeration.member(name))
					{
						return Ok(member.clone());
					}
					Err(ValidationError::mismatch(&desc, value))
				})
			}
			Origin::List => {
				let element = self.compile(&descriptor.arguments()[0]);
				Validator::new(desc.clone(), move |value, mode| {
					let items: Vec<&Value> = match (value, mode) {
						(Value::List(items), _) => items.iter().collect(),
						(Value::Set(items), Coercion::Lenient) => items.iter().collect(),
						(other, _) => return Err(ValidationError::mismatch(&desc, other)),
					};
					let validated = validate_elements(&element, &items, mode)?;
					if let Value::List(original) = value
						&& reused(&items, &validated)
					{
						return Ok(Value::List(Arc::clone(original)));
					}
					Ok(Value::List(Arc::new(validated)))
				})
			}
			Origin::Set => {
				let element = self.compile(&descriptor.arguments()[0]);
				Validator::new(desc.clone(), move |value, mode| {
					let items: Vec<&Value> = match (value, mode) {
						(Value::Set(items), _) => items.iter().collect(),
						(Value::List(items), Coercion::Lenient) => items.iter().collect(),
						(other, _) => return Err(ValidationError::mismatch(&desc, other)),
					};
					let validated = validate_elements(&element, &items, mode)?;
					if let Value::Set(original) = value
						&& reused(&items, &validated)
					{
						return Ok(Value::Set(Arc::clone(original)));
					}
					Ok(Value::Set(Arc::new(validated.into_iter().collect::<BTreeSet<_>>())))
				})
			}
			Origin::Map => {
				let key = self.compile(&descriptor.arguments()[0]);
				let val = self.compile(&descriptor.arguments()[1]);
				Validator::new(desc.clone(), move |value, mode| {
					let Value::Map(entries) = value else {
						return Err(ValidationError::mismatch(&desc, value));
					};
					let mut out = BTreeMap::new();
					let mut unchanged = true;
					for (k, v) in entries.iter() {
						let nk = key.validate_with(k, mode).map_err(|e| e.at(PathStep::Key(k.clone())))?;
						let nv = val.validate_with(v, mode).map_err(|e| e.at(PathStep::Key(k.clone())))?;
						unchanged &= nk.ptr_eq(k) && nv.ptr_eq(v);
						if out.contains_key(&nk) {
							return Err(ValidationError::invalid("key collides with another entry after normalization").at(PathStep::Key(k.clone())));
						}
						out.insert(nk, nv);
					}
					if unchanged && out.len() == entries.len() {
						return Ok(value.clone());
					}
					Ok(Value::Map(Arc::new(out)))
				})
			}
			Origin::Tuple => {
				let positions: Vec<Validator> = descriptor.arguments().iter().map(|arg| self.compile(arg)).collect();
				Validator::new(desc.clone(), move |value, mode| {
					let Value::List(items) = value else {
						return Err(ValidationError::mismatch(&desc, value));
					};
					if items.len() != positions.len() {
						return Err(ValidationError::new(ValidationErrorKind::Length {
							expected: positions.len(),
							received: items.len(),
						}));
					}
					let refs: Vec<&Value> = items.iter().collect();
					let mut validated = Vec::with_capacity(items.len());
					for (idx, (validator, item)) in positions.iter().zip(items.iter()).enumerate() {
						validated.push(validator.validate_with(item, mode).map_err(|e| e.at(PathStep::Index(idx)))?);
					}
					if reused(&refs, &validated) {
						return Ok(value.clone());
					}
					Ok(Value::List(Arc::new(validated)))
				})
			}
			Origin::Union => {
				let alternatives: Vec<Validator> = descriptor.arguments().iter().map(|arg| self.compile(arg)).collect();
				Validator::new(desc.clone(), move |value, mode| {
					for alt in &alternatives {
						if let Ok(found) = alt.validate_with(value, Coercion::Exact) {
							return Ok(found);
						}
					}
					if mode == Coercion::Lenient {
						for alt in &alternatives {
							if let Ok(found) = alt.validate_with(value, Coercion::Lenient) {
								return Ok(found);
							}
						}
					}
					Err(ValidationError::mismatch(&desc, value))
				})
			}
			Origin::Record(schema_ref) => {
				let schema_ref = schema_ref.clone();
				Validator::new(desc.clone(), move |value, mode| record_value(&schema_ref, &desc, value, mode))
			}
			Origin::Callable(interface) => {
				let interface = Arc::clone(interface);
				Validator::new(desc.clone(), move |value, _| match value {
					Value::Callable(callable) if callable.signature().satisfies(&interface) => Ok(value.clone()),
					other => Err(ValidationError::mismatch(&desc, other)),
				})
			}
		}
	}
}

fn scalar(desc: TypeDescriptor, accepts: fn(&Value) -> bool) -> Validator {
	Validator::new(desc.clone(), move |value, _| {
		if accepts(value) {
			Ok(value.clone())
		} else {
			Err(ValidationError::mismatch(&desc, value))
		}
	})
}

fn validate_elements(element: &Validator, items: &[&Value], mode: Coercion) -> Result<Vec<Value>, ValidationError> {
	items
		.iter()
		.enumerate()
		.map(|(idx, item)| element.validate_with(item, mode).map_err(|e| e.at(PathStep::Index(idx))))
		.collect()
}

/// Returns `true` if validation handed back every element untouched.
fn reused(original: &[&Value], validated: &[Value]) -> bool {
	original.len() == validated.len() && original.iter().zip(validated).all(|(a, b)| a.ptr_eq(b))
}

fn record_value(schema_ref: &SchemaRef, desc: &TypeDescriptor, value: &Value, mode: Coercion) -> Result<Value, ValidationError> {
	let Some(schema) = schema_ref.resolve() else {
		return Err(ValidationError::invalid(format!("schema `{}` is no longer available", schema_ref.name())));
	};
	match (value, mode) {
		(Value::Record(record), _) if schema.accepts(record) => Ok(value.clone()),
		(Value::Map(_), Coercion::Lenient) => schema.from_mapping(value).map(Value::Record),
		(other, _) => Err(ValidationError::mismatch(desc, other)),
	}
}

#[cfg(test)]
mod tests;
