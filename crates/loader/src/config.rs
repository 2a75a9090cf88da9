use std::sync::Arc;
use std::time::Duration;

/// Synchronous predicate reporting whether a module's backing artifact is
/// already physically present without further loading. Produced by the build
/// step; the core never inspects artifacts itself.
pub type AvailabilityCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Timer configuration for one subscription.
#[derive(Debug, Clone)]
pub struct LoadOptions {
	pub(crate) delay: Duration,
	pub(crate) timeout: Option<Duration>,
}

impl Default for LoadOptions {
	fn default() -> Self {
		Self {
			delay: Duration::from_millis(200),
			timeout: None,
		}
	}
}

impl LoadOptions {
	/// Creates options with the default 200ms delay and no timeout.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets how long a load must run before `past_delay` is raised.
	///
	/// A zero delay raises `past_delay` on the very first snapshot of a load
	/// cycle (no flash-of-loading suppression).
	#[must_use]
	pub fn delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	/// Sets how long a load may run before `timed_out` is raised. The load
	/// itself is never aborted.
	#[must_use]
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}
}
