//! The filter language: an S-expression grammar over property bags.
//!
//! See `spec.md` §4.2 for the grammar and `original_source/src/sd/filter.c`
//! for the reference semantics this module re-derives (not ports —
//! see the substring-matching note below).

mod error;
mod parser;

#[cfg(test)]
mod tests;

pub use error::FilterError;

use crate::props::Props;
use crate::value::Value;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonOp {
	Equal,
	GreaterThan,
	LessThan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeOp {
	And,
	Or,
}

/// A parsed filter expression.
///
/// `Comparison` only ever holds `Equal`; `GreaterThan`/`LessThan` are
/// split into `IntComparison` because they carry a parsed integer
/// rather than a raw token (the grammar in `spec.md` §4.2 requires
/// `k>n`/`k<n` values to be integer literals, while `k=v` compares
/// against the *rendering* of either kind of value).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
	Comparison {
		op: ComparisonOp,
		key: String,
		value: String,
	},
	IntComparison {
		op: ComparisonOp,
		key: String,
		value: i64,
	},
	Present {
		key: String,
	},
	Substring {
		key: String,
		initial: Option<String>,
		intermediate: Vec<String>,
		r#final: Option<String>,
	},
	Not(Box<Filter>),
	Composite {
		op: CompositeOp,
		operands: Vec<Filter>,
	},
}

impl Filter {
	/// Parses a canonical filter string per `spec.md` §4.2.
	pub fn parse(s: &str) -> Result<Self, FilterError> {
		parser::parse_filter(s)
	}

	/// Whether `s` parses successfully; discards the result.
	pub fn is_valid(s: &str) -> bool {
		Self::parse(s).is_ok()
	}

	/// Escapes special characters for embedding in a filter's key or
	/// value position.
	pub fn escape(s: &str) -> String {
		parser::escape(s)
	}

	/// Evaluates this filter against a property bag.
	pub fn matches(&self, props: &Props) -> bool {
		match self {
			Filter::Comparison { key, value, .. } => props
				.iter()
				.any(|(name, v)| name == key && &v.rendered() == value),
			Filter::IntComparison { op, key, value } => props.iter().any(|(name, v)| {
				name == key
					&& match (v.as_int(), op) {
						(Some(i), ComparisonOp::GreaterThan) => i > *value,
						(Some(i), ComparisonOp::LessThan) => i < *value,
						_ => false,
					}
			}),
			Filter::Present { key } => props.has(key),
			Filter::Substring {
				key,
				initial,
				intermediate,
				r#final,
			} => props
				.iter()
				.any(|(name, v)| name == key && matches_substring(v, initial, intermediate, r#final)),
			Filter::Not(operand) => !operand.matches(props),
			Filter::Composite { op, operands } => match op {
				CompositeOp::And => operands.iter().all(|f| f.matches(props)),
				CompositeOp::Or => operands.iter().any(|f| f.matches(props)),
			},
		}
	}
}

/// Matches a single string-valued property against a `(k=a*b*c)`
/// substring pattern.
///
/// Advances a cursor past each matched segment in turn: the initial
/// anchor, then each intermediate token (found anywhere at or after
/// the cursor), then the final anchor (which must align with the end
/// of the string). Integer-valued properties never match — this is
/// checked by the caller passing only string values in.
fn matches_substring(value: &Value, initial: &Option<String>, intermediate: &[String], r#final: &Option<String>) -> bool {
	let Some(value) = value.as_str() else {
		return false;
	};

	let mut cursor = 0usize;

	if let Some(initial) = initial {
		if !value[cursor..].starts_with(initial.as_str()) {
			return false;
		}
		cursor += initial.len();
	}

	for segment in intermediate {
		match value[cursor..].find(segment.as_str()) {
			// The cursor advances to just past the matched segment,
			// not `(value - start)` as in the reference's offset
			// arithmetic, which subtracts in the wrong direction.
			Some(found_at) => cursor += found_at + segment.len(),
			None => return false,
		}
	}

	if let Some(r#final) = r#final {
		let remaining = &value[cursor..];
		if remaining.len() < r#final.len() {
			return false;
		}
		let tail_at = remaining.len() - r#final.len();
		if &remaining[tail_at..] != r#final.as_str() {
			return false;
		}
	}

	true
}

impl fmt::Display for Filter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Filter::Comparison { op, key, value } => {
				write!(f, "({}{}{})", Self::escape(key), op_char(*op), Self::escape(value))
			}
			Filter::IntComparison { op, key, value } => {
				write!(f, "({}{}{})", Self::escape(key), op_char(*op), value)
			}
			Filter::Present { key } => write!(f, "({}=*)", Self::escape(key)),
			Filter::Substring {
				key,
				initial,
				intermediate,
				r#final,
			} => {
				write!(f, "({}=", Self::escape(key))?;
				if let Some(initial) = initial {
					write!(f, "{}", Self::escape(initial))?;
				}
				write!(f, "*")?;
				for segment in intermediate {
					write!(f, "{}*", Self::escape(segment))?;
				}
				if let Some(r#final) = r#final {
					write!(f, "{}", Self::escape(r#final))?;
				}
				write!(f, ")")
			}
			Filter::Not(operand) => write!(f, "(!{operand})"),
			Filter::Composite { op, operands } => {
				write!(f, "({}", if *op == CompositeOp::And { '&' } else { '|' })?;
				for operand in operands {
					write!(f, "{operand}")?;
				}
				write!(f, ")")
			}
		}
	}
}

fn op_char(op: ComparisonOp) -> char {
	match op {
		ComparisonOp::Equal => '=',
		ComparisonOp::GreaterThan => '>',
		ComparisonOp::LessThan => '<',
	}
}

/// `filter_equal(a, b) := stringify(a) == stringify(b)` (`spec.md` §4.2).
impl PartialEq<str> for Filter {
	fn eq(&self, other: &str) -> bool {
		self.to_string() == other
	}
}
