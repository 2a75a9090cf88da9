//! Single-shot wrapper around one asynchronous loader invocation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::task::noop_waker_ref;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::driver::LoadDriver;
use crate::{LoadError, LoadState};

/// Pending result of a loader invocation.
pub type LoadFuture<T> = Pin<Box<dyn Future<Output = Result<T, LoadError>> + Send>>;

/// Zero-argument loader function producing a [`LoadFuture`].
pub type LoaderFn<T> = Arc<dyn Fn() -> LoadFuture<T> + Send + Sync>;

enum UnitSlot<T> {
	Loading,
	Loaded(Arc<T>),
	Failed(LoadError),
}

struct UnitShared<T> {
	slot: Mutex<UnitSlot<T>>,
	settled: watch::Sender<bool>,
}

impl<T> UnitShared<T> {
	fn settle(&self, result: Result<T, LoadError>) {
		{
			let mut slot = self.slot.lock();
			*slot = match result {
				Ok(value) => UnitSlot::Loaded(Arc::new(value)),
				Err(err) => {
					tracing::debug!(error = %err, "load.unit.failed");
					UnitSlot::Failed(err)
				}
			};
		}
		self.settled.send_replace(true);
	}
}

/// One in-flight (or settled) load.
///
/// A unit is single-shot: it starts its loader exactly once and, after
/// settling, never transitions back to loading. Retrying is a
/// [`Subscription`](crate::Subscription) concern and replaces the unit
/// wholesale.
pub struct LoadUnit<T> {
	shared: Arc<UnitShared<T>>,
}

impl<T> Clone for LoadUnit<T> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<T> LoadUnit<T>
where
	T: Send + Sync + 'static,
{
	/// Invokes the loader and starts tracking its result.
	///
	/// The future is polled once inline so loaders that are already complete
	/// (cached artifacts, preloaded chunks) settle synchronously; otherwise
	/// it is handed to the runtime.
	pub fn start(loader: &LoaderFn<T>) -> Self {
		let (settled, _) = watch::channel(false);
		let shared = Arc::new(UnitShared {
			slot: Mutex::new(UnitSlot::Loading),
			settled,
		});

		let mut fut = loader();
		let mut cx = Context::from_waker(noop_waker_ref());
		match fut.as_mut().poll(&mut cx) {
			Poll::Ready(result) => shared.settle(result),
			Poll::Pending => {
				let task_shared = Arc::clone(&shared);
				crate::spawn::spawn(async move {
					let result = fut.await;
					task_shared.settle(result);
					tracing::trace!("load.unit.settle");
				});
			}
		}

		Self { shared }
	}

	/// Whether the load is still in flight.
	pub fn loading(&self) -> bool {
		matches!(*self.shared.slot.lock(), UnitSlot::Loading)
	}

	/// Resolved value once the load succeeded.
	pub fn loaded(&self) -> Option<Arc<T>> {
		match &*self.shared.slot.lock() {
			UnitSlot::Loaded(value) => Some(Arc::clone(value)),
			_ => None,
		}
	}

	/// Terminal failure once the load failed.
	pub fn error(&self) -> Option<LoadError> {
		match &*self.shared.slot.lock() {
			UnitSlot::Failed(err) => Some(err.clone()),
			_ => None,
		}
	}

	/// Multi-consumer completion signal; resolves on success or failure.
	pub fn wait_settled(&self) -> BoxFuture<'static, ()> {
		let shared = Arc::clone(&self.shared);
		Box::pin(async move {
			let mut rx = shared.settled.subscribe();
			let _ = rx.wait_for(|settled| *settled).await;
		})
	}

	/// Current snapshot. Timer flags are owned by the subscription and are
	/// always false here.
	pub fn snapshot(&self) -> LoadState<Arc<T>> {
		LoadState {
			loading: self.loading(),
			loaded: self.loaded(),
			error: self.error(),
			past_delay: false,
			timed_out: false,
		}
	}
}

impl<T> LoadDriver for LoadUnit<T>
where
	T: Send + Sync + 'static,
{
	type Payload = Arc<T>;

	fn loading(&self) -> bool {
		Self::loading(self)
	}

	fn loaded(&self) -> Option<Arc<T>> {
		Self::loaded(self)
	}

	fn error(&self) -> Option<LoadError> {
		Self::error(self)
	}

	fn wait_settled(&self) -> BoxFuture<'static, ()> {
		Self::wait_settled(self)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	fn loader_after(delay: Duration, result: Result<&'static str, LoadError>) -> LoaderFn<String> {
		Arc::new(move || {
			let result = result.clone();
			Box::pin(async move {
				tokio::time::sleep(delay).await;
				result.map(str::to_owned)
			})
		})
	}

	#[tokio::test(start_paused = true)]
	async fn resolving_loader_settles_with_value() {
		let unit = LoadUnit::start(&loader_after(Duration::from_millis(10), Ok("X")));
		assert!(unit.loading());
		assert!(unit.loaded().is_none());

		unit.wait_settled().await;
		assert!(!unit.loading());
		assert_eq!(unit.loaded().as_deref(), Some(&"X".to_owned()));
		assert!(unit.error().is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn rejecting_loader_settles_with_error() {
		let unit = LoadUnit::start(&loader_after(Duration::from_millis(10), Err(LoadError::new("boom"))));
		unit.wait_settled().await;

		let state = unit.snapshot();
		assert!(!state.loading);
		assert!(state.loaded.is_none());
		assert_eq!(state.error, Some(LoadError::new("boom")));
		assert!(state.is_failed());
	}

	#[tokio::test]
	async fn ready_loader_settles_synchronously() {
		let loader: LoaderFn<String> = Arc::new(|| Box::pin(async { Ok("cached".to_owned()) }));
		let unit = LoadUnit::start(&loader);
		// No await between start and assert: the inline poll settled it.
		assert!(!unit.loading());
		assert_eq!(unit.loaded().as_deref(), Some(&"cached".to_owned()));
	}

	#[tokio::test]
	async fn wait_settled_resolves_for_late_subscribers() {
		let loader: LoaderFn<String> = Arc::new(|| Box::pin(async { Ok("done".to_owned()) }));
		let unit = LoadUnit::start(&loader);
		// Already settled; the signal must still resolve immediately.
		unit.wait_settled().await;
		assert!(unit.snapshot().is_ready());
	}
}
