// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`RefreshMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshCounts {
	/// Calls made to the refresh endpoint.
	pub attempts: u64,
	/// Callers that waited on a refresh already in flight.
	pub joins: u64,
	/// Callers that picked up a token installed by a refresh that had already finished.
	pub reuses: u64,
	/// Refreshes that installed a new access token.
	pub successes: u64,
	/// Refreshes that failed, local refresh-token checks included.
	pub failures: u64,
}

/// Counters shared by every clone of a broker.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	joins: AtomicU64,
	reuses: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of calls made to the refresh endpoint.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of callers that joined a refresh already in flight.
	pub fn joins(&self) -> u64 {
		self.joins.load(Ordering::Relaxed)
	}

	/// Returns the number of callers that reused a freshly installed token instead of refreshing.
	pub fn reuses(&self) -> u64 {
		self.reuses.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that installed a new access token.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that failed, including local refresh-token checks.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Reads every counter at once.
	pub fn snapshot(&self) -> RefreshCounts {
		RefreshCounts {
			attempts: self.attempts(),
			joins: self.joins(),
			reuses: self.reuses(),
			successes: self.successes(),
			failures: self.failures(),
		}
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_join(&self) {
		self.joins.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_reuse(&self) {
		self.reuses.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn snapshot_reflects_recorded_events() {
		let metrics = RefreshMetrics::default();

		metrics.record_attempt();
		metrics.record_join();
		metrics.record_join();
		metrics.record_reuse();
		metrics.record_failure();

		assert_eq!(
			metrics.snapshot(),
			RefreshCounts { attempts: 1, joins: 2, reuses: 1, successes: 0, failures: 1 }
		);
	}
}
