//! The monotonic clock capability named in `spec.md` §6.
//!
//! Orphan deadlines, connection timestamps, and the handshake sweep
//! all measure time as `f64` seconds since an arbitrary epoch rather
//! than wall-clock time, so they stay meaningful under
//! `tokio::time::pause()` in tests. Wraps `tokio::time::Instant`
//! rather than `std::time::Instant` so the same epoch composes with
//! `tokio::time::sleep_until` for scheduling actual wakeups.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
pub struct Clock {
	epoch: Instant,
}

impl Clock {
	pub fn new() -> Self {
		Self { epoch: Instant::now() }
	}

	pub fn now(&self) -> f64 {
		self.epoch.elapsed().as_secs_f64()
	}

	/// Converts a `now()`-relative timestamp back into an `Instant`
	/// suitable for `tokio::time::sleep_until`.
	pub fn instant_at(&self, seconds: f64) -> Instant {
		self.epoch + Duration::from_secs_f64(seconds.max(0.0))
	}
}

impl Default for Clock {
	fn default() -> Self {
		Self::new()
	}
}
