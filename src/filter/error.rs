use thiserror::Error;

/// Why a filter string failed to parse.
///
/// The source grammar reports only a sentinel absence on any
/// deviation (`spec.md` §4.2); this enum exists so the rest of the
/// crate (and its tests) can report something more useful than
/// "invalid", while the wire-visible error stays the single closed
/// `invalid-filter-syntax` reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
	#[error("filter string is empty")]
	Empty,
	#[error("expected '{expected}' at byte offset {offset}")]
	Expected { expected: char, offset: usize },
	#[error("unexpected end of filter at byte offset {offset}")]
	UnexpectedEnd { offset: usize },
	#[error("key or value token is empty at byte offset {offset}")]
	EmptyToken { offset: usize },
	#[error("invalid integer literal at byte offset {offset}")]
	InvalidInteger { offset: usize },
	#[error("composite expression needs at least two operands at byte offset {offset}")]
	TooFewOperands { offset: usize },
	#[error("trailing data after filter at byte offset {offset}")]
	TrailingData { offset: usize },
}
