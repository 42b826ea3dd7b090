use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Injected source of wall-clock time, consumed only to stamp
/// `last_update_time` and to evaluate staleness. Kept as a trait so E4's
/// staleness scenario can run without a real `sleep`.
pub trait Clock: Send + Sync {
	/// Seconds since the Unix epoch.
	fn now_secs(&self) -> u64;
}

/// Production clock backed by [`SystemTime::now`].
pub struct SystemClock;

impl Clock for SystemClock {
	fn now_secs(&self) -> u64 {
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.unwrap_or(Duration::ZERO)
			.as_secs()
	}
}

/// A clock tests can advance by hand, avoiding any dependency on real time
/// passing or on `tokio::time::pause` semantics for the staleness checks
/// themselves (the refresh loop's own scheduling still uses Tokio's clock
/// via `nscache-worker`).
#[derive(Default)]
pub struct FixedClock {
	now: parking_lot::Mutex<u64>,
}

impl FixedClock {
	pub fn new(now_secs: u64) -> Self {
		Self {
			now: parking_lot::Mutex::new(now_secs),
		}
	}

	pub fn advance(&self, secs: u64) {
		*self.now.lock() += secs;
	}

	pub fn set(&self, now_secs: u64) {
		*self.now.lock() = now_secs;
	}
}

impl Clock for FixedClock {
	fn now_secs(&self) -> u64 {
		*self.now.lock()
	}
}
