use crate::LoadError;

/// Immutable snapshot of one load's progress.
///
/// `P` is the aggregate payload: `Arc<T>` for a single load, a keyed map of
/// `Arc<T>` for a batch. `loading == true` implies `error.is_none()`; once a
/// load's `loading` goes false it never goes true again (retrying builds a
/// fresh load rather than mutating the old one).
#[derive(Debug, Clone)]
pub struct LoadState<P> {
	/// An operation is in flight.
	pub loading: bool,
	/// Resolved payload, if any.
	pub loaded: Option<P>,
	/// Terminal failure, if any.
	pub error: Option<LoadError>,
	/// The configured delay elapsed while still loading.
	pub past_delay: bool,
	/// The configured timeout elapsed while still loading.
	pub timed_out: bool,
}

impl<P> LoadState<P> {
	/// True once the load settled successfully.
	pub fn is_ready(&self) -> bool {
		!self.loading && self.error.is_none() && self.loaded.is_some()
	}

	/// True once the load settled with a failure.
	pub fn is_failed(&self) -> bool {
		!self.loading && self.error.is_some()
	}
}
