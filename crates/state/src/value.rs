//! Dynamic values carried by records.
//!
//! Every container variant holds its payload behind an [`Arc`], so cloning a
//! [`Value`] never copies element data. Containers are never mutated after
//! construction; an update builds a new container that shares the untouched
//! elements with the original.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::callable::Callable;
use crate::record::Record;

/// A dynamically shaped value.
#[derive(Clone)]
pub enum Value {
	/// Absence of a value.
	None,
	/// Boolean value.
	Bool(bool),
	/// Signed integer value.
	Int(i64),
	/// Floating point value.
	Float(f64),
	/// Immutable string.
	Str(Arc<str>),
	/// Immutable byte string.
	Bytes(Arc<[u8]>),
	/// Canonical ordered sequence.
	List(Arc<Vec<Value>>),
	/// Canonical unordered collection without duplicates.
	Set(Arc<BTreeSet<Value>>),
	/// Canonical frozen key-value mapping.
	Map(Arc<BTreeMap<Value, Value>>),
	/// Validated record instance.
	Record(Record),
	/// Callable implementation bound to a signature.
	Callable(Callable),
}

impl Value {
	/// Creates a string value.
	pub fn str(value: impl AsRef<str>) -> Self {
		Self::Str(Arc::from(value.as_ref()))
	}

	/// Creates a list value from the given elements.
	pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
		Self::List(Arc::new(items.into_iter().collect()))
	}

	/// Creates a set value; duplicates collapse.
	pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
		Self::Set(Arc::new(items.into_iter().collect()))
	}

	/// Creates a map value; later duplicate keys win.
	pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<Value>,
		V: Into<Value>,
	{
		Self::Map(Arc::new(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect()))
	}

	/// Empty list.
	pub fn empty_list() -> Self {
		Self::List(Arc::default())
	}

	/// Empty set.
	pub fn empty_set() -> Self {
		Self::Set(Arc::default())
	}

	/// Empty map.
	pub fn empty_map() -> Self {
		Self::Map(Arc::default())
	}

	/// Returns a short name for this value's runtime shape.
	///
	/// Shapes never include payload data and are safe to embed in errors.
	pub fn shape(&self) -> String {
		match self {
			Self::None => "none".to_string(),
			Self::Bool(_) => "bool".to_string(),
			Self::Int(_) => "int".to_string(),
			Self::Float(_) => "float".to_string(),
			Self::Str(_) => "str".to_string(),
			Self::Bytes(_) => "bytes".to_string(),
			Self::List(items) => format!("list(len={})", items.len()),
			Self::Set(items) => format!("set(len={})", items.len()),
			Self::Map(entries) => format!("map(len={})", entries.len()),
			Self::Record(record) => format!("record {}", record.schema().name()),
			Self::Callable(callable) => format!("callable {}", callable.name()),
		}
	}

	/// Returns `true` when both values share the same allocation.
	///
	/// Scalars compare by value since they carry no allocation.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Str(a), Self::Str(b)) => Arc::ptr_eq(a, b),
			(Self::Bytes(a), Self::Bytes(b)) => Arc::ptr_eq(a, b),
			(Self::List(a), Self::List(b)) => Arc::ptr_eq(a, b),
			(Self::Set(a), Self::Set(b)) => Arc::ptr_eq(a, b),
			(Self::Map(a), Self::Map(b)) => Arc::ptr_eq(a, b),
			(Self::Record(a), Self::Record(b)) => a.ptr_eq(b),
			(Self::Callable(a), Self::Callable(b)) => a.ptr_eq(b),
			(a, b) => a == b,
		}
	}

	/// Returns `true` for [`Value::None`].
	pub fn is_none(&self) -> bool {
		matches!(self, Self::None)
	}

	/// Returns the boolean if this is a `Bool`.
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the integer if this is an `Int`.
	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the float if this is a `Float`; ints are not widened.
	pub fn as_float(&self) -> Option<f64> {
		match self {
			Self::Float(v) => Some(*v),
			_ => None,
		}
	}

	/// Returns the string slice if this is a `Str`.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(v) => Some(v),
			_ => None,
		}
	}

	/// Returns the elements if this is a `List`, which also covers tuples.
	pub fn as_list(&self) -> Option<&[Value]> {
		match self {
			Self::List(v) => Some(v.as_slice()),
			_ => None,
		}
	}

	/// Returns the elements if this is a `Set`.
	pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
		match self {
			Self::Set(v) => Some(v),
			_ => None,
		}
	}

	/// Returns the entries if this is a `Map`.
	pub fn as_map(&self) -> Option<&BTreeMap<Value, Value>> {
		match self {
			Self::Map(v) => Some(v),
			_ => None,
		}
	}

	/// Returns the record if this is a `Record`.
	pub fn as_record(&self) -> Option<&Record> {
		match self {
			Self::Record(v) => Some(v),
			_ => None,
		}
	}

	/// Returns the callable if this is a `Callable`.
	pub fn as_callable(&self) -> Option<&Callable> {
		match self {
			Self::Callable(v) => Some(v),
			_ => None,
		}
	}

	/// Returns `true` if this value may key a map or live in a set.
	///
	/// Records and callables are excluded so that set membership stays a
	/// pure function of plain data.
	pub fn is_hashable(&self) -> bool {
		match self {
			Self::None | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Str(_) | Self::Bytes(_) => true,
			Self::List(items) => items.iter().all(Value::is_hashable),
			Self::Set(_) | Self::Map(_) | Self::Record(_) | Self::Callable(_) => false,
		}
	}

	/// Converts this value into JSON.
	///
	/// Returns `None` when the value contains callables or non-string map
	/// keys, which have no JSON form.
	pub fn to_json(&self) -> Option<serde_json::Value> {
		use serde_json::Value as Json;
		Some(match self {
			Self::None => Json::Null,
			Self::Bool(v) => Json::Bool(*v),
			Self::Int(v) => Json::from(*v),
			Self::Float(v) => serde_json::Number::from_f64(*v).map(Json::Number)?,
			Self::Str(v) => Json::String(v.to_string()),
			Self::Bytes(v) => Json::Array(v.iter().map(|b| Json::from(*b)).collect()),
			Self::List(items) => Json::Array(items.iter().map(Value::to_json).collect::<Option<_>>()?),
			Self::Set(items) => Json::Array(items.iter().map(Value::to_json).collect::<Option<_>>()?),
			Self::Map(entries) => {
				let mut object = serde_json::Map::with_capacity(entries.len());
				for (key, value) in entries.iter() {
					object.insert(key.as_str()?.to_string(), value.to_json()?);
				}
				Json::Object(object)
			}
			Self::Record(record) => record.to_mapping(true).to_json()?,
			Self::Callable(_) => return None,
		})
	}

	/// Builds a value from JSON. Objects become string-keyed maps.
	pub fn from_json(json: &serde_json::Value) -> Self {
		use serde_json::Value as Json;
		match json {
			Json::Null => Self::None,
			Json::Bool(v) => Self::Bool(*v),
			Json::Number(n) => match n.as_i64() {
				Some(i) => Self::Int(i),
				None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
			},
			Json::String(s) => Self::str(s),
			Json::Array(items) => Self::list(items.iter().map(Self::from_json)),
			Json::Object(entries) => Self::map(entries.iter().map(|(k, v)| (Self::str(k), Self::from_json(v)))),
		}
	}

	fn rank(&self) -> u8 {
		match self {
			Self::None => 0,
			Self::Bool(_) => 1,
			Self::Int(_) => 2,
			Self::Float(_) => 3,
			Self::Str(_) => 4,
			Self::Bytes(_) => 5,
			Self::List(_) => 6,
			Self::Set(_) => 7,
			Self::Map(_) => 8,
			Self::Record(_) => 9,
			Self::Callable(_) => 10,
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for Value {}

impl PartialOrd for Value {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Value {
	fn cmp(&self, other: &Self) -> Ordering {
		match (self, other) {
			(Self::None, Self::None) => Ordering::Equal,
			(Self::Bool(a), Self::Bool(b)) => a.cmp(b),
			(Self::Int(a), Self::Int(b)) => a.cmp(b),
			(Self::Float(a), Self::Float(b)) => a.total_cmp(b),
			(Self::Str(a), Self::Str(b)) => a.cmp(b),
			(Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
			(Self::List(a), Self::List(b)) => {
				if Arc::ptr_eq(a, b) {
					return Ordering::Equal;
				}
				a.iter().cmp(b.iter())
			}
			(Self::Set(a), Self::Set(b)) => {
				if Arc::ptr_eq(a, b) {
					return Ordering::Equal;
				}
				a.iter().cmp(b.iter())
			}
			(Self::Map(a), Self::Map(b)) => {
				if Arc::ptr_eq(a, b) {
					return Ordering::Equal;
				}
				a.iter().cmp(b.iter())
			}
			(Self::Record(a), Self::Record(b)) => a.cmp(b),
			(Self::Callable(a), Self::Callable(b)) => a.cmp(b),
			(a, b) => a.rank().cmp(&b.rank()),
		}
	}
}

impl Hash for Value {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.rank().hash(state);
		match self {
			Self::None => {}
			Self::Bool(v) => v.hash(state),
			Self::Int(v) => v.hash(state),
			Self::Float(v) => v.to_bits().hash(state),
			Self::Str(v) => v.hash(state),
			Self::Bytes(v) => v.hash(state),
			Self::List(items) => items.hash(state),
			Self::Set(items) => items.hash(state),
			Self::Map(entries) => entries.hash(state),
			Self::Record(record) => record.hash(state),
			Self::Callable(callable) => callable.hash(state),
		}
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::None => f.write_str("None"),
			Self::Bool(v) => write!(f, "{v}"),
			Self::Int(v) => write!(f, "{v}"),
			Self::Float(v) => write!(f, "{v:?}"),
			Self::Str(v) => write!(f, "{v:?}"),
			Self::Bytes(v) => write!(f, "b{:?}", v.as_ref()),
			Self::List(items) => f.debug_list().entries(items.iter()).finish(),
			Self::Set(items) => f.debug_set().entries(items.iter()).finish(),
			Self::Map(entries) => f.debug_map().entries(entries.iter()).finish(),
			Self::Record(record) => record.fmt(f),
			Self::Callable(callable) => callable.fmt(f),
		}
	}
}

impl Default for Value {
	fn default() -> Self {
		Self::None
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Self::Int(value)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Self::Int(i64::from(value))
	}
}

impl From<u32> for Value {
	fn from(value: u32) -> Self {
		Self::Int(i64::from(value))
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::str(value)
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::Str(Arc::from(value))
	}
}

impl From<Vec<Value>> for Value {
	fn from(value: Vec<Value>) -> Self {
		Self::List(Arc::new(value))
	}
}

impl From<Record> for Value {
	fn from(value: Record) -> Self {
		Self::Record(value)
	}
}

impl From<Callable> for Value {
	fn from(value: Callable) -> Self {
		Self::Callable(value)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Self::None, Into::into)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn set_collapses_duplicates() {
		let set = Value::set(["x".into(), "x".into(), "y".into()]);
		assert_eq!(set.as_set().map(BTreeSet::len), Some(2));
	}

	#[test]
	fn ordering_is_total_across_shapes() {
		let mut values = vec![Value::str("a"), Value::Int(3), Value::None, Value::Float(f64::NAN), Value::Bool(true)];
		values.sort();
		assert!(values[0].is_none());
		assert_eq!(values[1], Value::Bool(true));
		assert_eq!(values[2], Value::Int(3));
	}

	#[test]
	fn int_and_float_are_distinct() {
		assert_ne!(Value::Int(1), Value::Float(1.0));
	}

	#[test]
	fn shape_hides_payload() {
		let secret = Value::str("hunter2");
		assert_eq!(secret.shape(), "str");
		assert_eq!(Value::list([secret]).shape(), "list(len=1)");
	}

	#[test]
	fn json_conversion_keeps_structure() {
		let json = serde_json::json!({"a": [1, 2.5, "x"], "b": null});
		let value = Value::from_json(&json);
		assert_eq!(value.to_json(), Some(json));
	}

	#[test]
	fn hashability_excludes_mutable_shapes() {
		assert!(Value::list([Value::Int(1)]).is_hashable());
		assert!(!Value::empty_map().is_hashable());
	}
}
