//! The property bag: an ordered, multi-valued name -> value mapping.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Multi-valued property bag.
///
/// A name may appear more than once, with distinct or equal values.
/// Insertion order is preserved for iteration; equality ignores order
/// (it is multiset equality on (name, value) pairs).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Props {
	entries: Vec<(String, Value)>,
}

impl Props {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, name: impl Into<String>, value: impl Into<Value>) {
		self.entries.push((name.into(), value.into()));
	}

	/// First value stored under `name`, if any.
	pub fn get_one(&self, name: &str) -> Option<&Value> {
		self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
	}

	/// All values stored under `name`, in insertion order.
	pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
		self.entries.iter().filter(move |(n, _)| n == name).map(|(_, v)| v)
	}

	/// Removes the first occurrence of `name`, if any.
	pub fn delete_first(&mut self, name: &str) {
		if let Some(idx) = self.entries.iter().position(|(n, _)| n == name) {
			self.entries.remove(idx);
		}
	}

	pub fn has(&self, name: &str) -> bool {
		self.entries.iter().any(|(n, _)| n == name)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.entries.iter().map(|(n, v)| (n.as_str(), v))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

}

impl PartialEq for Props {
	/// Multiset equality on (name, value) pairs: each entry on one side
	/// consumes exactly one matching, not-yet-consumed entry on the
	/// other, so differing multiplicities of the same pair are not
	/// mistaken for equality (`spec.md` §4.1, §8).
	fn eq(&self, other: &Self) -> bool {
		if self.entries.len() != other.entries.len() {
			return false;
		}
		let mut consumed = vec![false; other.entries.len()];
		'outer: for (name, value) in &self.entries {
			for (i, (other_name, other_value)) in other.entries.iter().enumerate() {
				if !consumed[i] && other_name == name && other_value == value {
					consumed[i] = true;
					continue 'outer;
				}
			}
			return false;
		}
		true
	}
}

impl Eq for Props {}

impl FromIterator<(String, Value)> for Props {
	fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
		Self {
			entries: iter.into_iter().collect(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn bag(pairs: &[(&str, Value)]) -> Props {
		let mut p = Props::new();
		for (name, value) in pairs {
			p.add(*name, value.clone());
		}
		p
	}

	#[test]
	fn equality_is_order_invariant() {
		let a = bag(&[("x", Value::Int(1)), ("y", Value::Str("v".into()))]);
		let b = bag(&[("y", Value::Str("v".into())), ("x", Value::Int(1))]);
		assert_eq!(a, b);
	}

	#[test]
	fn equality_respects_multiplicity() {
		let a = bag(&[("x", Value::Int(1)), ("x", Value::Int(1))]);
		let b = bag(&[("x", Value::Int(1))]);
		assert_ne!(a, b);
	}

	#[test]
	fn equality_respects_multiplicity_at_equal_length() {
		let a = bag(&[("x", Value::Int(1)), ("x", Value::Int(1))]);
		let b = bag(&[("x", Value::Int(1)), ("z", Value::Int(9))]);
		assert_ne!(a, b);
	}

	#[test]
	fn get_all_preserves_insertion_order() {
		let p = bag(&[("x", Value::Int(1)), ("x", Value::Int(2))]);
		let values: Vec<_> = p.get_all("x").cloned().collect();
		assert_eq!(values, vec![Value::Int(1), Value::Int(2)]);
	}

	#[test]
	fn delete_first_removes_only_one_occurrence() {
		let mut p = bag(&[("x", Value::Int(1)), ("x", Value::Int(2))]);
		p.delete_first("x");
		let values: Vec<_> = p.get_all("x").cloned().collect();
		assert_eq!(values, vec![Value::Int(2)]);
	}

	#[test]
	fn get_one_returns_first_match() {
		let p = bag(&[("x", Value::Int(1)), ("x", Value::Int(2))]);
		assert_eq!(p.get_one("x"), Some(&Value::Int(1)));
		assert_eq!(p.get_one("missing"), None);
	}
}
