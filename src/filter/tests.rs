use super::*;

fn bag(pairs: &[(&str, Value)]) -> Props {
	let mut p = Props::new();
	for (name, value) in pairs {
		p.add(*name, value.clone());
	}
	p
}

#[test]
fn parses_presence() {
	let f = Filter::parse("(x=*)").unwrap();
	assert_eq!(f, Filter::Present { key: "x".into() });
}

#[test]
fn parses_equal() {
	let f = Filter::parse("(x=hello)").unwrap();
	assert_eq!(
		f,
		Filter::Comparison {
			op: ComparisonOp::Equal,
			key: "x".into(),
			value: "hello".into(),
		}
	);
}

#[test]
fn parses_greater_and_less_than() {
	assert_eq!(
		Filter::parse("(x>5)").unwrap(),
		Filter::IntComparison {
			op: ComparisonOp::GreaterThan,
			key: "x".into(),
			value: 5,
		}
	);
	assert_eq!(
		Filter::parse("(x<-5)").unwrap(),
		Filter::IntComparison {
			op: ComparisonOp::LessThan,
			key: "x".into(),
			value: -5,
		}
	);
}

#[test]
fn parses_not() {
	let f = Filter::parse("(!(x=*))").unwrap();
	assert_eq!(f, Filter::Not(Box::new(Filter::Present { key: "x".into() })));
}

#[test]
fn parses_composite_requires_at_least_two_operands() {
	assert!(Filter::parse("(&(x=*))").is_err());
	assert!(Filter::parse("(&(x=*)(y=*))").is_ok());
}

#[test]
fn parses_substring_with_anchors() {
	let f = Filter::parse("(x=a*b*c)").unwrap();
	assert_eq!(
		f,
		Filter::Substring {
			key: "x".into(),
			initial: Some("a".into()),
			intermediate: vec!["b".into()],
			r#final: Some("c".into()),
		}
	);
}

#[test]
fn parses_substring_with_only_middle_wildcard() {
	let f = Filter::parse("(x=*b*)").unwrap();
	assert_eq!(
		f,
		Filter::Substring {
			key: "x".into(),
			initial: None,
			intermediate: vec!["b".into()],
			r#final: None,
		}
	);
}

#[test]
fn unescapes_tokens() {
	let f = Filter::parse(r"(x=a\*b)").unwrap();
	assert_eq!(
		f,
		Filter::Comparison {
			op: ComparisonOp::Equal,
			key: "x".into(),
			value: "a*b".into(),
		}
	);
}

#[test]
fn rejects_empty_and_malformed_input() {
	assert!(Filter::parse("").is_err());
	assert!(Filter::parse("x=1").is_err());
	assert!(Filter::parse("(x=1").is_err());
	assert!(Filter::parse("(x=1))").is_err());
}

#[test]
fn round_trips_through_stringify() {
	for s in [
		"(x=*)",
		"(x=hello)",
		"(x>5)",
		"(x<-5)",
		"(!(x=*))",
		"(&(x=*)(y=*))",
		"(|(x=*)(y=*)(z=*))",
		"(x=a*b*c)",
		"(x=*b*)",
		r"(x=a\*b)",
	] {
		let f = Filter::parse(s).unwrap();
		assert_eq!(f.to_string(), s, "round-trip failed for {s}");
	}
}

#[test]
fn equal_keys_compare_against_rendered_int() {
	let f = Filter::parse("(x=17)").unwrap();
	assert!(f.matches(&bag(&[("x", Value::Int(17))])));
	assert!(!f.matches(&bag(&[("x", Value::Int(18))])));
}

#[test]
fn greater_than_skips_string_values() {
	let f = Filter::parse("(x>5)").unwrap();
	assert!(!f.matches(&bag(&[("x", Value::Str("10".into()))])));
	assert!(f.matches(&bag(&[("x", Value::Int(10))])));
}

#[test]
fn presence_matches_any_value_type() {
	let f = Filter::parse("(x=*)").unwrap();
	assert!(f.matches(&bag(&[("x", Value::Int(1))])));
	assert!(f.matches(&bag(&[("x", Value::Str("y".into()))])));
	assert!(!f.matches(&bag(&[("other", Value::Int(1))])));
}

#[test]
fn substring_matches_requires_all_anchors() {
	let f = Filter::parse("(x=a*b*c)").unwrap();
	assert!(f.matches(&bag(&[("x", Value::Str("a--b--c".into()))])));
	assert!(!f.matches(&bag(&[("x", Value::Str("a--c--b".into()))])));
	assert!(!f.matches(&bag(&[("x", Value::Str("--b--c".into()))])));
}

#[test]
fn substring_never_matches_integers() {
	let f = Filter::parse("(x=a*)").unwrap();
	assert!(!f.matches(&bag(&[("x", Value::Int(123))])));
}

#[test]
fn substring_intermediate_cursor_advances_past_match_not_backwards() {
	// Regression test for the reference implementation's sign bug:
	// `abab` should match `(x=a*b*)` by finding "a" at the start, then
	// "b" searching forward from after it, landing at offset 2, not a
	// bogus negative/huge offset.
	let f = Filter::parse("(x=a*b*)").unwrap();
	assert!(f.matches(&bag(&[("x", Value::Str("abab".into()))])));
}

#[test]
fn composite_short_circuits() {
	let and = Filter::parse("(&(x=*)(y=*))").unwrap();
	assert!(!and.matches(&bag(&[("x", Value::Int(1))])));
	assert!(and.matches(&bag(&[("x", Value::Int(1)), ("y", Value::Int(2))])));

	let or = Filter::parse("(|(x=*)(y=*))").unwrap();
	assert!(or.matches(&bag(&[("x", Value::Int(1))])));
	assert!(!or.matches(&bag(&[("z", Value::Int(1))])));
}

#[test]
fn not_negates() {
	let f = Filter::parse("(!(x=*))").unwrap();
	assert!(f.matches(&bag(&[])));
	assert!(!f.matches(&bag(&[("x", Value::Int(1))])));
}

#[test]
fn filter_equal_is_stringify_equality() {
	let a = Filter::parse("(x=1)").unwrap();
	let b = Filter::parse("(x=1)").unwrap();
	assert_eq!(a.to_string(), b.to_string());
	assert_eq!(a, b.to_string().as_str());

	let c = Filter::parse("(x=2)").unwrap();
	assert_ne!(a.to_string(), c.to_string());
}

#[test]
fn escape_round_trips_special_characters() {
	let raw = "a(b)c*d\\e!f&g|h=i>j<k";
	let escaped = Filter::escape(raw);
	let wrapped = format!("(key={escaped})");
	let f = Filter::parse(&wrapped).unwrap();
	assert_eq!(
		f,
		Filter::Comparison {
			op: ComparisonOp::Equal,
			key: "key".into(),
			value: raw.into(),
		}
	);
}
