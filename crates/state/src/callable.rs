//! Callable values and the structural interfaces they are checked against.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::descriptor::TypeDescriptor;
use crate::value::Value;

type CallFn = dyn Fn(&[Value]) -> Result<Value, CallError> + Send + Sync;

/// Failure raised while invoking a [`Callable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
	#[error("callable `{name}` takes {expected} argument(s), got {got}")]
	Arity { name: String, expected: usize, got: usize },
	#[error("callable `{name}` failed: {reason}")]
	Failed { name: String, reason: String },
}

/// One declared parameter of a callable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
	pub name: Arc<str>,
	pub descriptor: TypeDescriptor,
}

impl Parameter {
	pub fn new(name: impl AsRef<str>, descriptor: TypeDescriptor) -> Self {
		Self {
			name: Arc::from(name.as_ref()),
			descriptor,
		}
	}
}

/// Call signature exposed by a callable value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
	pub params: Vec<Parameter>,
	pub returns: TypeDescriptor,
}

impl Signature {
	pub fn new(params: Vec<Parameter>, returns: TypeDescriptor) -> Self {
		Self { params, returns }
	}

	/// Checks whether this signature can stand in for `interface`.
	///
	/// Parameters are checked contravariantly and the return type
	/// covariantly; parameter names are not significant.
	pub fn satisfies(&self, interface: &InterfaceDescriptor) -> bool {
		self.params.len() == interface.params.len()
			&& self
				.params
				.iter()
				.zip(&interface.params)
				.all(|(own, required)| own.descriptor.is_assignable_from(required))
			&& interface.returns.is_assignable_from(&self.returns)
	}
}

/// Resolved callable interface used by descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceDescriptor {
	pub name: Arc<str>,
	pub params: Vec<TypeDescriptor>,
	pub returns: TypeDescriptor,
}

impl fmt::Display for InterfaceDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}(", self.name)?;
		for (idx, param) in self.params.iter().enumerate() {
			if idx > 0 {
				f.write_str(", ")?;
			}
			write!(f, "{param}")?;
		}
		write!(f, ") -> {}", self.returns)
	}
}

struct CallableInner {
	name: Arc<str>,
	signature: Signature,
	func: Box<CallFn>,
}

/// A function value with a declared signature.
///
/// Identity is by allocation: two callables compare equal only when they
/// are clones of one another.
#[derive(Clone)]
pub struct Callable {
	inner: Arc<CallableInner>,
}

impl Callable {
	pub fn new<F>(name: impl AsRef<str>, signature: Signature, func: F) -> Self
	where
		F: Fn(&[Value]) -> Result<Value, CallError> + Send + Sync + 'static,
	{
		Self {
			inner: Arc::new(CallableInner {
				name: Arc::from(name.as_ref()),
				signature,
				func: Box::new(func),
			}),
		}
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn signature(&self) -> &Signature {
		&self.inner.signature
	}

	/// Invokes the callable after checking the argument count.
	pub fn call(&self, args: &[Value]) -> Result<Value, CallError> {
		let expected = self.inner.signature.params.len();
		if args.len() != expected {
			return Err(CallError::Arity {
				name: self.inner.name.to_string(),
				expected,
				got: args.len(),
			});
		}
		(self.inner.func)(args)
	}

	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	fn addr(&self) -> usize {
		Arc::as_ptr(&self.inner) as *const () as usize
	}
}

impl fmt::Debug for Callable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<callable {}/{}>", self.inner.name, self.inner.signature.params.len())
	}
}

impl PartialEq for Callable {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}

impl Eq for Callable {}

impl PartialOrd for Callable {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Callable {
	fn cmp(&self, other: &Self) -> Ordering {
		self.addr().cmp(&other.addr())
	}
}

impl Hash for Callable {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.addr().hash(state);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn adder() -> Callable {
		Callable::new(
			"add",
			Signature::new(
				vec![Parameter::new("a", TypeDescriptor::int()), Parameter::new("b", TypeDescriptor::int())],
				TypeDescriptor::int(),
			),
			|args| match (&args[0], &args[1]) {
				(Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
				_ => Err(CallError::Failed {
					name: "add".into(),
					reason: "expected ints".into(),
				}),
			},
		)
	}

	#[test]
	fn call_checks_arity() {
		let add = adder();
		assert_eq!(add.call(&[Value::Int(1), Value::Int(2)]), Ok(Value::Int(3)));
		assert!(matches!(add.call(&[Value::Int(1)]), Err(CallError::Arity { expected: 2, got: 1, .. })));
	}

	#[test]
	fn signature_matches_interface_structurally() {
		let iface = InterfaceDescriptor {
			name: "BinaryOp".into(),
			params: vec![TypeDescriptor::int(), TypeDescriptor::int()],
			returns: TypeDescriptor::any(),
		};
		assert!(adder().signature().satisfies(&iface));

		let unary = InterfaceDescriptor {
			name: "UnaryOp".into(),
			params: vec![TypeDescriptor::int()],
			returns: TypeDescriptor::int(),
		};
		assert!(!adder().signature().satisfies(&unary));
	}

	#[test]
	fn identity_equality() {
		let a = adder();
		let b = adder();
		assert_eq!(a, a.clone());
		assert_ne!(a, b);
	}
}
