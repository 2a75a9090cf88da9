//! Process-wide lists of pending load initializers and the drain
//! algorithms that flush them.
//!
//! An initializer is a thunk that idempotently ensures a subscription's load
//! has started and returns its completion signal ("ensure started", never
//! "start again"), so registering the same declaration repeatedly is
//! harmless. Draining pops entries LIFO and repeats whole passes until no
//! entry remains, which picks up initializers registered as a side effect of
//! the ones just drained (nested lazy trees). Per-entry failures are
//! absorbed: completion signals resolve on failure too, so one broken module
//! cannot stall readiness.

use std::sync::{Arc, OnceLock};

use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;

use crate::config::AvailabilityCheck;

/// Completion signal returned by an initializer.
pub type InitFuture = BoxFuture<'static, ()>;

/// Registry-held thunk that starts (or no-ops if already started) a load and
/// returns its completion signal.
pub type Initializer = Arc<dyn Fn() -> InitFuture + Send + Sync>;

struct ReadyEntry {
	init: Initializer,
	available: AvailabilityCheck,
}

#[derive(Default)]
struct RegistryInner {
	all: Mutex<Vec<Initializer>>,
	ready: Mutex<Vec<ReadyEntry>>,
}

/// Append-only registry of load initializers.
///
/// Cheap to clone; clones share the same lists. [`LoadRegistry::global`] is
/// the process-wide instance used by default.
#[derive(Clone, Default)]
pub struct LoadRegistry {
	inner: Arc<RegistryInner>,
}

impl LoadRegistry {
	/// Creates an empty, isolated registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// The shared process-wide registry.
	pub fn global() -> LoadRegistry {
		static GLOBAL: OnceLock<LoadRegistry> = OnceLock::new();
		GLOBAL.get_or_init(LoadRegistry::new).clone()
	}

	/// Appends an initializer to the full-drain list. No deduplication.
	pub fn register_all(&self, init: Initializer) {
		self.inner.all.lock().push(init);
	}

	/// Appends an initializer to the ready-only list. Callers only register
	/// here when the loader configuration supplies an availability check.
	pub fn register_ready(&self, init: Initializer, available: AvailabilityCheck) {
		self.inner.ready.lock().push(ReadyEntry { init, available });
	}

	/// Number of pending full-drain initializers.
	pub fn pending_all(&self) -> usize {
		self.inner.all.lock().len()
	}

	/// Number of pending ready-only initializers.
	pub fn pending_ready(&self) -> usize {
		self.inner.ready.lock().len()
	}

	/// Clears both lists. Intended for test isolation.
	pub fn reset(&self) {
		self.inner.all.lock().clear();
		self.inner.ready.lock().clear();
	}

	/// Invokes every registered initializer, including ones registered while
	/// draining, and resolves once none remain.
	pub async fn drain_all(&self) {
		loop {
			let mut joined: Vec<InitFuture> = Vec::new();
			loop {
				let Some(init) = self.inner.all.lock().pop() else {
					break;
				};
				joined.push(init());
			}
			if joined.is_empty() {
				break;
			}
			tracing::debug!(count = joined.len(), "load.registry.drain_all.pass");
			join_all(joined).await;
		}
	}

	/// Invokes every ready-only initializer whose availability check passes.
	///
	/// Entries whose check fails are dropped for this drain without being
	/// invoked. Best-effort: this never reports failure.
	pub async fn drain_ready(&self) {
		loop {
			let mut joined: Vec<InitFuture> = Vec::new();
			loop {
				let Some(entry) = self.inner.ready.lock().pop() else {
					break;
				};
				if (entry.available)() {
					joined.push((entry.init)());
				} else {
					tracing::trace!("load.registry.drain_ready.skip");
				}
			}
			if joined.is_empty() {
				break;
			}
			tracing::debug!(count = joined.len(), "load.registry.drain_ready.pass");
			join_all(joined).await;
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	fn counting_init(counter: &Arc<AtomicUsize>) -> Initializer {
		let counter = Arc::clone(counter);
		Arc::new(move || {
			counter.fetch_add(1, Ordering::SeqCst);
			Box::pin(async {})
		})
	}

	#[tokio::test]
	async fn drain_all_runs_every_initializer() {
		let registry = LoadRegistry::new();
		let calls = Arc::new(AtomicUsize::new(0));
		registry.register_all(counting_init(&calls));
		registry.register_all(counting_init(&calls));

		registry.drain_all().await;
		assert_eq!(calls.load(Ordering::SeqCst), 2);
		assert_eq!(registry.pending_all(), 0);
	}

	#[tokio::test]
	async fn drain_all_picks_up_initializers_registered_mid_drain() {
		let registry = LoadRegistry::new();
		let nested_calls = Arc::new(AtomicUsize::new(0));

		let nested = counting_init(&nested_calls);
		let outer: Initializer = {
			let registry = registry.clone();
			Arc::new(move || {
				registry.register_all(Arc::clone(&nested));
				Box::pin(async {})
			})
		};
		registry.register_all(outer);

		registry.drain_all().await;
		assert_eq!(nested_calls.load(Ordering::SeqCst), 1, "nested initializer must run before drain_all resolves");
		assert_eq!(registry.pending_all(), 0);
	}

	#[tokio::test]
	async fn drain_ready_skips_unavailable_entries() {
		let registry = LoadRegistry::new();
		let ready_calls = Arc::new(AtomicUsize::new(0));
		let missing_calls = Arc::new(AtomicUsize::new(0));

		registry.register_ready(counting_init(&ready_calls), Arc::new(|| true));
		registry.register_ready(counting_init(&missing_calls), Arc::new(|| false));

		registry.drain_ready().await;
		assert_eq!(ready_calls.load(Ordering::SeqCst), 1);
		assert_eq!(missing_calls.load(Ordering::SeqCst), 0, "unavailable entry must never be invoked");
		assert_eq!(registry.pending_ready(), 0);
	}

	#[tokio::test]
	async fn reset_clears_both_lists() {
		let registry = LoadRegistry::new();
		let calls = Arc::new(AtomicUsize::new(0));
		registry.register_all(counting_init(&calls));
		registry.register_ready(counting_init(&calls), Arc::new(|| true));

		registry.reset();
		assert_eq!(registry.pending_all(), 0);
		assert_eq!(registry.pending_ready(), 0);

		registry.drain_all().await;
		registry.drain_ready().await;
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn global_registry_is_shared() {
		let a = LoadRegistry::global();
		let b = LoadRegistry::global();
		assert!(Arc::ptr_eq(&a.inner, &b.inner));
	}
}
