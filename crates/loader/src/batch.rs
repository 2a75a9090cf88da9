//! Composition of many named loads into one aggregate unit.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::driver::LoadDriver;
use crate::unit::{LoadUnit, LoaderFn};
use crate::{LoadError, LoadState};

struct BatchShared {
	last_error: Mutex<Option<LoadError>>,
	errors: Mutex<BTreeMap<String, LoadError>>,
	pending: AtomicUsize,
	settled: watch::Sender<bool>,
}

/// Many named loads observed as one unit.
///
/// Every entry starts concurrently and fails independently: one slow or
/// failing entry must not block siblings from resolving, so the aggregate
/// completion signal resolves only once every entry has settled regardless
/// of individual outcomes. The aggregate `error` holds the most recently
/// settled per-key failure; [`errors`](Self::errors) has all of them.
pub struct BatchLoadUnit<T> {
	units: BTreeMap<String, LoadUnit<T>>,
	shared: Arc<BatchShared>,
}

impl<T> Clone for BatchLoadUnit<T> {
	fn clone(&self) -> Self {
		Self {
			units: self.units.clone(),
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<T> BatchLoadUnit<T>
where
	T: Send + Sync + 'static,
{
	/// Starts every named loader concurrently.
	///
	/// Entries whose loaders are already complete populate the aggregate
	/// before this returns.
	pub fn start(loaders: &BTreeMap<String, LoaderFn<T>>) -> Self {
		let (settled, _) = watch::channel(false);
		let shared = Arc::new(BatchShared {
			last_error: Mutex::new(None),
			errors: Mutex::new(BTreeMap::new()),
			pending: AtomicUsize::new(0),
			settled,
		});

		let units: BTreeMap<String, LoadUnit<T>> = loaders
			.iter()
			.map(|(name, loader)| (name.clone(), LoadUnit::start(loader)))
			.collect();

		// One scan, in key order: an entry observed settled has its error
		// recorded here; an entry observed loading gets a watcher. A unit that
		// settles mid-scan on another worker lands in exactly one of the two,
		// so no outcome is lost. Counting the unsettled entries up front also
		// keeps any watcher from observing a transient zero while siblings are
		// still being registered.
		let mut unsettled: Vec<(String, LoadUnit<T>)> = Vec::new();
		for (name, unit) in &units {
			if unit.loading() {
				unsettled.push((name.clone(), unit.clone()));
			} else if let Some(err) = unit.error() {
				*shared.last_error.lock() = Some(err.clone());
				shared.errors.lock().insert(name.clone(), err);
			}
		}
		shared.pending.store(unsettled.len(), Ordering::Release);

		if unsettled.is_empty() {
			shared.settled.send_replace(true);
		}

		for (name, unit) in unsettled {
			let shared = Arc::clone(&shared);
			crate::spawn::spawn(async move {
				unit.wait_settled().await;
				if let Some(err) = unit.error() {
					*shared.last_error.lock() = Some(err.clone());
					shared.errors.lock().insert(name, err);
				}
				if shared.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
					shared.settled.send_replace(true);
					tracing::trace!("load.batch.settle");
				}
			});
		}

		Self { units, shared }
	}

	/// Whether any entry is still in flight.
	pub fn loading(&self) -> bool {
		self.units.values().any(LoadUnit::loading)
	}

	/// Values for every entry that has resolved so far, keyed by name.
	pub fn loaded(&self) -> BTreeMap<String, Arc<T>> {
		self.units
			.iter()
			.filter_map(|(name, unit)| unit.loaded().map(|value| (name.clone(), value)))
			.collect()
	}

	/// Most recently settled per-key failure.
	pub fn error(&self) -> Option<LoadError> {
		self.shared.last_error.lock().clone()
	}

	/// All per-key failures observed so far.
	pub fn errors(&self) -> BTreeMap<String, LoadError> {
		self.shared.errors.lock().clone()
	}

	/// Number of entries.
	pub fn len(&self) -> usize {
		self.units.len()
	}

	/// True when the batch has no entries.
	pub fn is_empty(&self) -> bool {
		self.units.is_empty()
	}

	/// Resolves once every entry has settled, success or failure.
	pub fn wait_settled(&self) -> BoxFuture<'static, ()> {
		let shared = Arc::clone(&self.shared);
		Box::pin(async move {
			let mut rx = shared.settled.subscribe();
			let _ = rx.wait_for(|settled| *settled).await;
		})
	}

	/// Aggregate snapshot. Timer flags are owned by the subscription and are
	/// always false here.
	pub fn snapshot(&self) -> LoadState<BTreeMap<String, Arc<T>>> {
		LoadState {
			loading: self.loading(),
			loaded: Some(self.loaded()),
			error: self.error(),
			past_delay: false,
			timed_out: false,
		}
	}
}

impl<T> LoadDriver for BatchLoadUnit<T>
where
	T: Send + Sync + 'static,
{
	type Payload = BTreeMap<String, Arc<T>>;

	fn loading(&self) -> bool {
		Self::loading(self)
	}

	fn loaded(&self) -> Option<Self::Payload> {
		Some(Self::loaded(self))
	}

	fn error(&self) -> Option<LoadError> {
		Self::error(self)
	}

	fn wait_settled(&self) -> BoxFuture<'static, ()> {
		Self::wait_settled(self)
	}
}
