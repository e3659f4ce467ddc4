use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::callable::{Callable, InterfaceDescriptor, Parameter, Signature};
use crate::descriptor::{Enumeration, Origin};
use crate::error::ValidationErrorKind;

fn compile(desc: TypeDescriptor) -> Validator {
	Synthesizer::new().compile(&desc)
}

#[test]
fn primitives_check_identity() {
	let v = compile(TypeDescriptor::int());
	assert_eq!(v.validate(&Value::Int(3)), Ok(Value::Int(3)));
	let err = v.validate(&Value::str("3")).unwrap_err();
	assert_eq!(
		err.kind(),
		&ValidationErrorKind::Mismatch {
			expected: "int".into(),
			received: "str".into()
		}
	);
}

#[test]
fn float_widens_ints_only_when_lenient() {
	let v = compile(TypeDescriptor::float());
	assert_eq!(v.validate(&Value::Int(2)), Ok(Value::Float(2.0)));
	assert!(v.validate_with(&Value::Int(2), Coercion::Exact).is_err());
}

#[test]
fn union_prefers_exact_match_over_widening() {
	let float_first = compile(TypeDescriptor::union(vec![TypeDescriptor::float(), TypeDescriptor::int()]));
	assert_eq!(float_first.validate(&Value::Int(5)), Ok(Value::Int(5)));

	let float_only = compile(TypeDescriptor::union(vec![TypeDescriptor::float(), TypeDescriptor::string()]));
	assert_eq!(float_only.validate(&Value::Int(5)), Ok(Value::Float(5.0)));
}

#[test]
fn optional_accepts_none() {
	let v = compile(TypeDescriptor::string().into_optional());
	assert_eq!(v.validate(&Value::None), Ok(Value::None));
	assert!(compile(TypeDescriptor::string()).validate(&Value::None).is_err());
}

#[test]
fn literal_checks_membership_by_value() {
	let desc = TypeDescriptor::new(Origin::Literal(Arc::from(vec![Value::str("a"), Value::Int(1)])), Vec::new());
	let v = compile(desc);
	assert!(v.validate(&Value::str("a")).is_ok());
	assert!(v.validate(&Value::Int(1)).is_ok());
	assert!(v.validate(&Value::str("b")).is_err());
}

#[test]
fn enumeration_accepts_member_names_when_lenient() {
	let color = Enumeration::new("Color", [("RED", "red"), ("BLUE", "blue")]);
	let v = compile(TypeDescriptor::new(Origin::Enumeration(Arc::new(color)), Vec::new()));
	assert_eq!(v.validate(&Value::str("red")), Ok(Value::str("red")));
	assert_eq!(v.validate(&Value::str("BLUE")), Ok(Value::str("blue")));
	assert!(v.validate_with(&Value::str("BLUE"), Coercion::Exact).is_err());
}

#[test]
fn sequences_normalize_to_lists() {
	let v = compile(TypeDescriptor::list(TypeDescriptor::int()));
	let from_set = v.validate(&Value::set([Value::Int(2), Value::Int(1)])).unwrap();
	assert_eq!(from_set, Value::list([Value::Int(1), Value::Int(2)]));
}

#[test]
fn sets_deduplicate() {
	let v = compile(TypeDescriptor::set(TypeDescriptor::string()));
	let out = v.validate(&Value::list(["x".into(), "x".into(), "y".into()])).unwrap();
	assert_eq!(out.as_set().map(|s| s.len()), Some(2));
}

#[test]
fn unchanged_containers_are_shared() {
	let v = compile(TypeDescriptor::list(TypeDescriptor::int()));
	let input = Value::list([Value::Int(1), Value::Int(2)]);
	let out = v.validate(&input).unwrap();
	assert!(out.ptr_eq(&input));
}

#[test]
fn element_errors_carry_the_path() {
	let v = compile(TypeDescriptor::map(TypeDescriptor::string(), TypeDescriptor::list(TypeDescriptor::int())));
	let input = Value::map([("a", Value::list([Value::Int(1), Value::str("x")]))]);
	let err = v.validate(&input).unwrap_err();
	assert_eq!(err.location(), "$[\"a\"][1]");
}

#[test]
fn tuples_check_length_and_positions() {
	let v = compile(TypeDescriptor::tuple(vec![TypeDescriptor::int(), TypeDescriptor::string()]));
	assert!(v.validate(&Value::list([Value::Int(1), Value::str("a")])).is_ok());
	let err = v.validate(&Value::list([Value::Int(1)])).unwrap_err();
	assert_eq!(err.kind(), &ValidationErrorKind::Length { expected: 2, received: 1 });
	assert!(v.validate(&Value::list([Value::str("a"), Value::Int(1)])).is_err());
}

#[test]
fn callables_are_checked_structurally() {
	let iface = InterfaceDescriptor {
		name: "Fetch".into(),
		params: vec![TypeDescriptor::string()],
		returns: TypeDescriptor::any(),
	};
	let v = compile(TypeDescriptor::callable(iface));
	let fetch = Callable::new(
		"fetch",
		Signature::new(vec![Parameter::new("url", TypeDescriptor::any())], TypeDescriptor::bytes()),
		|_| Ok(Value::None),
	);
	assert!(v.validate(&Value::Callable(fetch)).is_ok());

	let wrong = Callable::new("noop", Signature::new(Vec::new(), TypeDescriptor::none()), |_| Ok(Value::None));
	assert!(v.validate(&Value::Callable(wrong)).is_err());
}

#[test]
fn compiled_validators_are_memoized() {
	let synth = Synthesizer::new();
	let desc = TypeDescriptor::list(TypeDescriptor::int());
	synth.compile(&desc);
	let before = synth.memoized();
	synth.compile(&TypeDescriptor::list(TypeDescriptor::int()));
	assert_eq!(synth.memoized(), before);
}

#[test]
fn normalized_map_keys_must_stay_distinct() {
	let v = compile(TypeDescriptor::map(TypeDescriptor::float(), TypeDescriptor::string()));
	let input = Value::map([(Value::Int(1), "int"), (Value::Float(1.0), "float")]);
	let err = v.validate(&input).unwrap_err();
	assert!(matches!(err.kind(), ValidationErrorKind::Invalid { .. }));
	assert_eq!(err.path().len(), 1);
	assert!(v.validate(&Value::map([(Value::Int(1), "a"), (Value::Float(2.0), "b")])).is_ok());
}

#[test]
fn lossy_int_to_float_widening_is_rejected() {
	let v = compile(TypeDescriptor::float());
	assert_eq!(v.validate(&Value::Int(1 << 53)), Ok(Value::Float(9_007_199_254_740_992.0)));
	assert!(v.validate(&Value::Int((1 << 53) + 1)).is_err());
	assert!(v.validate(&Value::Int(i64::MAX)).is_err());
}

fn scalars() -> impl Strategy<Value = Value> {
	prop_oneof![
		any::<bool>().prop_map(Value::Bool),
		any::<i64>().prop_map(Value::Int),
		(-1.0e6..1.0e6f64).prop_map(Value::Float),
		"[a-z]{0,6}".prop_map(|s| Value::str(s)),
	]
}

fn descriptors() -> impl Strategy<Value = TypeDescriptor> {
	let leaf = prop_oneof![
		Just(TypeDescriptor::bool()),
		Just(TypeDescriptor::int()),
		Just(TypeDescriptor::float()),
		Just(TypeDescriptor::string()),
		prop::collection::vec(scalars(), 1..4).prop_map(|values| TypeDescriptor::new(Origin::Literal(Arc::from(values)), Vec::new())),
	];
	leaf.prop_recursive(3, 24, 4, |inner| {
		prop_oneof![
			inner.clone().prop_map(TypeDescriptor::list),
			inner.clone().prop_map(|value| TypeDescriptor::map(TypeDescriptor::string(), value)),
			prop::collection::vec(inner.clone(), 1..4).prop_map(TypeDescriptor::tuple),
			prop::collection::vec(inner.clone(), 2..4).prop_map(TypeDescriptor::union),
			inner.prop_map(TypeDescriptor::into_optional),
		]
	})
}

/// Values that conform to `desc` without any coercion.
fn conforming(desc: &TypeDescriptor) -> BoxedStrategy<Value> {
	let core = match desc.origin() {
		Origin::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
		Origin::Int => any::<i64>().prop_map(Value::Int).boxed(),
		Origin::Float => (-1.0e6..1.0e6f64).prop_map(Value::Float).boxed(),
		Origin::Str => "[a-z]{0,6}".prop_map(|s| Value::str(s)).boxed(),
		Origin::Literal(values) => prop::sample::select(values.to_vec()).boxed(),
		Origin::List => prop::collection::vec(conforming(&desc.arguments()[0]), 0..4).prop_map(Value::list).boxed(),
		Origin::Map => prop::collection::vec(("[a-d]{1,2}", conforming(&desc.arguments()[1])), 0..4)
			.prop_map(|entries| Value::map(entries.into_iter().map(|(k, v)| (Value::str(k), v))))
			.boxed(),
		Origin::Tuple => desc.arguments().iter().map(conforming).collect::<Vec<_>>().prop_map(Value::list).boxed(),
		Origin::Union => prop::strategy::Union::new(desc.arguments().iter().map(conforming)).boxed(),
		_ => Just(Value::None).boxed(),
	};
	if desc.is_optional() {
		prop_oneof![1 => Just(Value::None), 3 => core].boxed()
	} else {
		core
	}
}

fn described_values() -> impl Strategy<Value = (TypeDescriptor, Value)> {
	descriptors().prop_flat_map(|desc| {
		let values = conforming(&desc);
		(Just(desc), values)
	})
}

proptest! {
	#[test]
	fn int_lists_validate_and_stay_lists(items in prop::collection::vec(any::<i64>(), 0..16)) {
		let v = compile(TypeDescriptor::list(TypeDescriptor::int()));
		let input = Value::list(items.iter().copied().map(Value::Int));
		let out = v.validate(&input).unwrap();
		prop_assert_eq!(out.as_list().map(<[Value]>::len), Some(items.len()));
	}

	#[test]
	fn mismatched_elements_always_fail_with_index(items in prop::collection::vec(any::<i64>(), 1..16), bad in 0usize..16) {
		let bad = bad % items.len();
		let v = compile(TypeDescriptor::list(TypeDescriptor::int()));
		let mut values: Vec<Value> = items.iter().copied().map(Value::Int).collect();
		values[bad] = Value::str("x");
		let err = v.validate(&Value::list(values)).unwrap_err();
		prop_assert_eq!(err.path(), &[PathStep::Index(bad)][..]);
	}

	#[test]
	fn string_sets_normalize_from_any_sequence(items in prop::collection::vec("[a-c]{1,2}", 0..12)) {
		let v = compile(TypeDescriptor::set(TypeDescriptor::string()));
		let out = v.validate(&Value::list(items.iter().map(Value::str))).unwrap();
		let distinct: std::collections::BTreeSet<&String> = items.iter().collect();
		prop_assert_eq!(out.as_set().map(|s| s.len()), Some(distinct.len()));
	}

	#[test]
	fn conforming_values_always_validate((desc, value) in described_values()) {
		let v = compile(desc);
		let exact = v.validate_with(&value, Coercion::Exact);
		prop_assert_eq!(exact.as_ref(), Ok(&value));
		prop_assert_eq!(v.validate(&value), Ok(value));
	}

	#[test]
	fn validation_is_total_and_lenient_output_is_exact(desc in descriptors(), (_, value) in described_values()) {
		let v = compile(desc);
		if let Ok(out) = v.validate(&value) {
			prop_assert_eq!(v.validate_with(&out, Coercion::Exact), Ok(out.clone()));
		}
	}
}
