//! Crate-wide error type.
//!
//! This is the process's internal/fatal error surface — I/O failures,
//! malformed configuration, and the like. It is distinct from
//! [`crate::proto::FailReason`], which is the protocol's closed,
//! recoverable, on-the-wire error vocabulary (see `spec.md` §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),

	#[error("malformed json: {0}")]
	Json(#[from] serde_json::Error),

	#[error("invalid filter: {0}")]
	Filter(#[from] crate::filter::FilterError),

	#[error("invalid listen address: {0}")]
	InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, Error>;
