//! Ambient configuration: everything `spec.md` §6 calls "the process
//! interface" that this core accepts as parameters instead of
//! hard-coding (`SPEC_FULL.md` §A.3).

use std::ops::RangeInclusive;
use std::time::Duration;

/// The protocol version this build of the broker negotiates
/// (`spec.md` §6). Modeled as a range rather than a bare constant so
/// the `hello` negotiation logic in `scheduler.rs` stays general even
/// though only one version ships today (`SPEC_FULL.md` §B.4).
pub const PROTOCOL_VERSION_RANGE: RangeInclusive<i64> = crate::proto::PROTOCOL_VERSION..=crate::proto::PROTOCOL_VERSION;

/// `spec.md` §4.8's scheduler constants.
pub const MAX_RECEIVE_BATCH: usize = crate::scheduler::MAX_RECEIVE_BATCH;
pub const MAX_SEND_BATCH: usize = crate::scheduler::MAX_SEND_BATCH;
pub const SOFT_OUT_WIRE_LIMIT: usize = crate::scheduler::SOFT_OUT_WIRE_LIMIT;

/// Runtime configuration for a broker instance.
#[derive(Clone, Debug)]
pub struct Config {
	/// Addresses to listen on, e.g. `"0.0.0.0:7890"`. The transport
	/// these are bound against is an external collaborator
	/// (`spec.md` §1); `server.rs` binds them with plain TCP.
	pub listen_addrs: Vec<String>,

	/// How often the handshake-deadline sweep runs (`spec.md` §5).
	pub handshake_sweep_interval: Duration,

	/// A pre-handshake connection older than this is dropped
	/// (`spec.md` §5, `MAX_HANDSHAKE_TIME`).
	pub max_handshake_time: Duration,
}

impl Config {
	pub fn new(listen_addrs: Vec<String>) -> Self {
		Self {
			listen_addrs,
			handshake_sweep_interval: Duration::from_secs(1),
			max_handshake_time: Duration::from_secs(2),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_handshake_timeouts_match_spec_literals() {
		let config = Config::new(vec!["127.0.0.1:0".into()]);
		assert_eq!(config.handshake_sweep_interval, Duration::from_secs(1));
		assert_eq!(config.max_handshake_time, Duration::from_secs(2));
	}
}
