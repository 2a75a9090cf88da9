use futures::future::BoxFuture;

use crate::LoadError;

/// Seam between a [`Subscription`](crate::Subscription) and the load it
/// observes.
///
/// Implemented by [`LoadUnit`](crate::LoadUnit) for single loads and
/// [`BatchLoadUnit`](crate::BatchLoadUnit) for keyed batches; the
/// subscription state machine is identical for both.
pub trait LoadDriver: Send + Sync + 'static {
	/// Aggregate payload exposed in snapshots.
	type Payload: Clone + Send + Sync + 'static;

	/// Whether any wrapped operation is still in flight.
	fn loading(&self) -> bool;

	/// Resolved payload, possibly partial for batches.
	fn loaded(&self) -> Option<Self::Payload>;

	/// Most recent terminal failure, if any.
	fn error(&self) -> Option<LoadError>;

	/// Completion signal resolving once every wrapped operation has settled,
	/// success or failure. Never errors.
	fn wait_settled(&self) -> BoxFuture<'static, ()>;
}
