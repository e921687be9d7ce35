//! The protocol's closed, on-the-wire error vocabulary.
//!
//! Grounded on `original_source/src/sd/sd_err.h` (the `SD_ERR_*` set)
//! and `original_source/src/proto/proto_ta.c`'s `PROTO_FIELD_FAIL_REASON`
//! field. Unlike the reference's `sd_str_error`, which is a stub that
//! always returns `"Unknown error"` (`spec.md` §9), every variant here
//! maps to its exact wire string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the closed set of reasons a `fail` message may carry
/// (`spec.md` §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailReason {
	NoHello,
	ClientIdExists,
	InvalidFilterSyntax,
	SubscriptionIdExists,
	NonExistentSubscriptionId,
	NonExistentServiceId,
	UnsupportedProtocolVersion,
	PermissionDenied,
	OldGeneration,
	SameGenerationButDifferent,
	InsufficientResources,
}

impl FailReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::NoHello => "no-hello",
			Self::ClientIdExists => "client-id-exists",
			Self::InvalidFilterSyntax => "invalid-filter-syntax",
			Self::SubscriptionIdExists => "subscription-id-exists",
			Self::NonExistentSubscriptionId => "non-existent-subscription-id",
			Self::NonExistentServiceId => "non-existent-service-id",
			Self::UnsupportedProtocolVersion => "unsupported-protocol-version",
			Self::PermissionDenied => "permission-denied",
			Self::OldGeneration => "old-generation",
			Self::SameGenerationButDifferent => "same-generation-but-different",
			Self::InsufficientResources => "insufficient-resources",
		}
	}
}

impl fmt::Display for FailReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_variant_has_a_distinct_wire_string() {
		let all = [
			FailReason::NoHello,
			FailReason::ClientIdExists,
			FailReason::InvalidFilterSyntax,
			FailReason::SubscriptionIdExists,
			FailReason::NonExistentSubscriptionId,
			FailReason::NonExistentServiceId,
			FailReason::UnsupportedProtocolVersion,
			FailReason::PermissionDenied,
			FailReason::OldGeneration,
			FailReason::SameGenerationButDifferent,
			FailReason::InsufficientResources,
		];
		let mut strs: Vec<_> = all.iter().map(FailReason::as_str).collect();
		let before = strs.len();
		strs.sort_unstable();
		strs.dedup();
		assert_eq!(strs.len(), before);
	}

	#[test]
	fn serializes_as_kebab_case() {
		let json = serde_json::to_string(&FailReason::SameGenerationButDifferent).unwrap();
		assert_eq!(json, "\"same-generation-but-different\"");
	}
}
