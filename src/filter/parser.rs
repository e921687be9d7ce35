//! Recursive-descent parser for the filter grammar in `spec.md` §4.2.

use super::{error::FilterError, Filter};

const BEGIN_EXPR: char = '(';
const END_EXPR: char = ')';
const ANY: char = '*';
const ESCAPE: char = '\\';
const NOT: char = '!';
const AND: char = '&';
const OR: char = '|';
const EQUAL: char = '=';
const GREATER_THAN: char = '>';
const LESS_THAN: char = '<';

fn is_special(c: char) -> bool {
	matches!(
		c,
		BEGIN_EXPR | END_EXPR | ANY | ESCAPE | NOT | AND | OR | EQUAL | GREATER_THAN | LESS_THAN
	)
}

struct Input {
	data: Vec<char>,
	offset: usize,
}

impl Input {
	fn new(data: &str) -> Self {
		Self {
			data: data.chars().collect(),
			offset: 0,
		}
	}

	fn current(&self) -> Result<char, FilterError> {
		self
			.data
			.get(self.offset)
			.copied()
			.ok_or(FilterError::UnexpectedEnd { offset: self.offset })
	}

	fn is_current(&self, expected: char) -> Result<bool, FilterError> {
		Ok(self.current()? == expected)
	}

	fn expect(&mut self, expected: char) -> Result<(), FilterError> {
		if self.current()? != expected {
			return Err(FilterError::Expected {
				expected,
				offset: self.offset,
			});
		}
		self.offset += 1;
		Ok(())
	}

	fn skip(&mut self) -> Result<(), FilterError> {
		if self.offset >= self.data.len() {
			return Err(FilterError::UnexpectedEnd { offset: self.offset });
		}
		self.offset += 1;
		Ok(())
	}

	fn left(&self) -> usize {
		self.data.len().saturating_sub(self.offset)
	}
}

fn parse_str(input: &mut Input) -> Result<String, FilterError> {
	let mut result = String::new();
	let mut escaped = false;

	loop {
		let c = input.current()?;
		let special = is_special(c);

		if escaped {
			if !special {
				return Err(FilterError::Expected {
					expected: ESCAPE,
					offset: input.offset,
				});
			}
			input.skip()?;
			result.push(c);
			escaped = false;
		} else if c == ESCAPE {
			escaped = true;
			input.skip()?;
		} else if special {
			return Ok(result);
		} else {
			result.push(c);
			input.skip()?;
		}
	}
}

fn parse_int(input: &mut Input) -> Result<i64, FilterError> {
	let start = input.offset;
	let value_s = parse_str(input)?;

	if value_s.is_empty() {
		return Err(FilterError::InvalidInteger { offset: start });
	}
	if value_s.starts_with(|c: char| c.is_whitespace()) {
		return Err(FilterError::InvalidInteger { offset: start });
	}

	value_s
		.parse::<i64>()
		.map_err(|_| FilterError::InvalidInteger { offset: start })
}

fn parse_not(input: &mut Input) -> Result<Filter, FilterError> {
	input.expect(NOT)?;
	input.expect(BEGIN_EXPR)?;
	let operand = parse(input)?;
	input.expect(END_EXPR)?;
	Ok(Filter::Not(Box::new(operand)))
}

fn parse_substring_and_present(
	input: &mut Input,
	key: String,
	first_part_value: String,
) -> Result<Filter, FilterError> {
	let initial = if first_part_value.is_empty() {
		None
	} else {
		Some(first_part_value)
	};
	let mut intermediate = Vec::new();
	let mut final_value = None;

	loop {
		let next_value = parse_str(input)?;
		let is_any = input.is_current(ANY)?;

		if is_any {
			if next_value.is_empty() {
				return Err(FilterError::EmptyToken { offset: input.offset });
			}
			intermediate.push(next_value);
			input.skip()?;
		} else {
			if !next_value.is_empty() {
				final_value = Some(next_value);
			}
			break;
		}
	}

	Ok(if initial.is_none() && intermediate.is_empty() && final_value.is_none() {
		Filter::Present { key }
	} else {
		Filter::Substring {
			key,
			initial,
			intermediate,
			r#final: final_value,
		}
	})
}

fn parse_equal(input: &mut Input, key: String) -> Result<Filter, FilterError> {
	input.expect(EQUAL)?;
	let value = parse_str(input)?;
	let is_any = input.is_current(ANY)?;

	if is_any {
		input.skip()?;
		parse_substring_and_present(input, key, value)
	} else {
		Ok(Filter::Comparison {
			op: super::ComparisonOp::Equal,
			key,
			value,
		})
	}
}

fn parse_greater_and_less_than(
	input: &mut Input,
	key: String,
	op: char,
	create: super::ComparisonOp,
) -> Result<Filter, FilterError> {
	input.expect(op)?;
	let value = parse_int(input)?;
	Ok(Filter::IntComparison { op: create, key, value })
}

fn parse_simple(input: &mut Input) -> Result<Filter, FilterError> {
	let start = input.offset;
	let key = parse_str(input)?;

	if key.is_empty() {
		return Err(FilterError::EmptyToken { offset: start });
	}

	let c = input.current()?;

	match c {
		EQUAL => parse_equal(input, key),
		GREATER_THAN => parse_greater_and_less_than(input, key, GREATER_THAN, super::ComparisonOp::GreaterThan),
		LESS_THAN => parse_greater_and_less_than(input, key, LESS_THAN, super::ComparisonOp::LessThan),
		_ => Err(FilterError::Expected {
			expected: EQUAL,
			offset: input.offset,
		}),
	}
}

fn parse_composite(input: &mut Input, op: char) -> Result<Filter, FilterError> {
	input.expect(op)?;

	let mut operands = Vec::new();

	loop {
		let c = input.current()?;

		if c == BEGIN_EXPR {
			input.skip()?;
			let operand = parse(input)?;
			operands.push(operand);
			input.expect(END_EXPR)?;
		} else if c == END_EXPR {
			if operands.len() < 2 {
				return Err(FilterError::TooFewOperands { offset: input.offset });
			}
			let kind = if op == AND {
				super::CompositeOp::And
			} else {
				super::CompositeOp::Or
			};
			return Ok(Filter::Composite { op: kind, operands });
		} else {
			return Err(FilterError::Expected {
				expected: END_EXPR,
				offset: input.offset,
			});
		}
	}
}

fn parse(input: &mut Input) -> Result<Filter, FilterError> {
	let c = input.current()?;

	match c {
		AND => parse_composite(input, AND),
		OR => parse_composite(input, OR),
		NOT => parse_not(input),
		_ => parse_simple(input),
	}
}

/// Parses a complete, `(`…`)`-wrapped filter expression.
pub fn parse_filter(s: &str) -> Result<Filter, FilterError> {
	if s.is_empty() {
		return Err(FilterError::Empty);
	}

	let mut input = Input::new(s);

	input.expect(BEGIN_EXPR)?;
	let filter = parse(&mut input)?;
	input.expect(END_EXPR)?;

	if input.left() > 0 {
		return Err(FilterError::TrailingData { offset: input.offset });
	}

	Ok(filter)
}

/// Escapes special characters (`spec.md` §4.2 token rules) for
/// embedding in a filter's key or value position.
pub fn escape(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for c in s.chars() {
		if is_special(c) {
			out.push(ESCAPE);
		}
		out.push(c);
	}
	out
}
