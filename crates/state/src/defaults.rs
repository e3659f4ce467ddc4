//! Default providers for omitted fields.
//!
//! Environment defaults are read when an instance is constructed, never
//! when the schema is declared, and are never re-read afterwards.

use std::fmt;
use std::sync::Arc;

use crate::descriptor::{Origin, TypeDescriptor};
use crate::error::ValidationError;
use crate::value::Value;

type Factory = dyn Fn() -> Value + Send + Sync;

/// How an omitted field obtains its value.
#[derive(Clone)]
pub enum DefaultValue {
	/// Fixed value, validated once at declaration.
	Value(Value),
	/// Called once per construction.
	Factory(Arc<Factory>),
	/// Read from the process environment at construction.
	Env { var: Arc<str>, fallback: Option<Value> },
}

impl DefaultValue {
	pub fn value(value: impl Into<Value>) -> Self {
		Self::Value(value.into())
	}

	pub fn factory(factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
		Self::Factory(Arc::new(factory))
	}

	pub fn env(var: impl AsRef<str>) -> Self {
		Self::Env {
			var: Arc::from(var.as_ref()),
			fallback: None,
		}
	}

	pub fn env_or(var: impl AsRef<str>, fallback: impl Into<Value>) -> Self {
		Self::Env {
			var: Arc::from(var.as_ref()),
			fallback: Some(fallback.into()),
		}
	}

	/// Produces the raw default for a field of type `descriptor`.
	pub(crate) fn produce(&self, descriptor: &TypeDescriptor) -> Result<Value, ValidationError> {
		match self {
			Self::Value(value) => Ok(value.clone()),
			Self::Factory(factory) => Ok(factory()),
			Self::Env { var, fallback } => match std::env::var(var.as_ref()) {
				Ok(raw) => parse_env_value(&raw, descriptor)
					.map_err(|reason| ValidationError::invalid(format!("environment variable `{var}`: {reason}"))),
				Err(std::env::VarError::NotPresent) => fallback
					.clone()
					.ok_or_else(|| ValidationError::invalid(format!("environment variable `{var}` is not set"))),
				Err(std::env::VarError::NotUnicode(_)) => {
					Err(ValidationError::invalid(format!("environment variable `{var}` is not valid unicode")))
				}
			},
		}
	}
}

impl fmt::Debug for DefaultValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
			Self::Factory(_) => f.write_str("Factory(..)"),
			Self::Env { var, fallback } => f.debug_struct("Env").field("var", var).field("fallback", fallback).finish(),
		}
	}
}

/// Parses a raw environment string according to the field's declared type.
///
/// Structured types are read as JSON; anything else is taken verbatim and
/// left to the field validator.
pub fn parse_env_value(raw: &str, descriptor: &TypeDescriptor) -> Result<Value, String> {
	if descriptor.is_optional() && raw.is_empty() {
		return Ok(Value::None);
	}
	match descriptor.origin() {
		Origin::Bool => parse_bool(raw).map(Value::Bool),
		Origin::Int => parse_int(raw).map(Value::Int),
		Origin::Float => parse_float(raw).map(Value::Float),
		Origin::Str | Origin::Enumeration(_) | Origin::Any => Ok(Value::str(raw)),
		Origin::List | Origin::Set | Origin::Map | Origin::Tuple | Origin::Record(_) => serde_json::from_str::<serde_json::Value>(raw)
			.map(|json| Value::from_json(&json))
			.map_err(|err| format!("invalid JSON for {descriptor}: {err}")),
		_ => match serde_json::from_str::<serde_json::Value>(raw) {
			Ok(json) => Ok(Value::from_json(&json)),
			Err(_) => Ok(Value::str(raw)),
		},
	}
}

/// Parse a boolean value from common string representations.
pub fn parse_bool(value: &str) -> Result<bool, String> {
	match value.trim().to_lowercase().as_str() {
		"true" | "1" | "yes" | "on" => Ok(true),
		"false" | "0" | "no" | "off" => Ok(false),
		_ => Err(format!("invalid boolean: '{value}' (expected true/false, yes/no, on/off, 1/0)")),
	}
}

/// Parse an integer value.
pub fn parse_int(value: &str) -> Result<i64, String> {
	value.trim().parse::<i64>().map_err(|_| format!("invalid integer: '{value}'"))
}

/// Parse a floating point value.
pub fn parse_float(value: &str) -> Result<f64, String> {
	value.trim().parse::<f64>().map_err(|_| format!("invalid float: '{value}'"))
}
