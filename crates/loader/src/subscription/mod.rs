//! Retry/delay/timeout-aware controller around one load.
//!
//! A [`Subscription`] owns the current [`LoadDriver`] instance, the delay and
//! timeout timers, and the set of observer callbacks. State transitions are
//! notified synchronously, in registration order, one notification per
//! transition.
//!
//! # Staleness
//!
//! In-flight loads cannot be aborted. [`Subscription::retry`] therefore
//! supersedes the old load instead of cancelling it: each load cycle gets a
//! monotonically increasing generation, every timer and settlement task
//! captures the generation it was armed for, and events from superseded
//! generations are silently dropped. Timer tasks are additionally scoped by a
//! per-generation cancellation token so they stop promptly.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::driver::LoadDriver;
use crate::{LoadOptions, LoadState};

/// Identifier for one registered observer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type ObserverFn<P> = Arc<dyn Fn(&LoadState<P>) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
struct TimerFlags {
	past_delay: bool,
	timed_out: bool,
}

#[derive(Debug, Clone, Copy)]
enum TimerKind {
	Delay,
	Timeout,
}

struct SubInner<D: LoadDriver> {
	factory: Arc<dyn Fn() -> D + Send + Sync>,
	options: LoadOptions,
	/// Current load instance; replaced wholesale on retry.
	current: Mutex<Arc<D>>,
	generation: AtomicU64,
	flags: Mutex<TimerFlags>,
	observers: Mutex<Vec<(ObserverId, ObserverFn<D::Payload>)>>,
	next_observer: AtomicU64,
	/// Cancelled on destroy; parent of every generation token.
	lifetime: CancellationToken,
	/// Scope of the current generation's timers and settlement watcher.
	gen_cancel: Mutex<CancellationToken>,
}

/// Observable controller around one load, with retry, delay, and timeout.
pub struct Subscription<D: LoadDriver> {
	inner: Arc<SubInner<D>>,
}

impl<D: LoadDriver> Clone for Subscription<D> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<D: LoadDriver> Subscription<D> {
	/// Creates the subscription and starts the first load immediately.
	pub fn start(factory: Arc<dyn Fn() -> D + Send + Sync>, options: LoadOptions) -> Self {
		let driver = Arc::new((factory)());
		let lifetime = CancellationToken::new();
		let inner = Arc::new(SubInner {
			factory,
			options,
			current: Mutex::new(Arc::clone(&driver)),
			generation: AtomicU64::new(1),
			flags: Mutex::new(TimerFlags::default()),
			observers: Mutex::new(Vec::new()),
			next_observer: AtomicU64::new(1),
			gen_cancel: Mutex::new(lifetime.child_token()),
			lifetime,
		});
		let sub = Self { inner };
		let token = sub.inner.gen_cancel.lock().clone();
		sub.arm(driver, 1, token);
		sub
	}

	/// Discards the current load and starts a fresh one from the retained
	/// configuration. Timers are cleared synchronously, `past_delay` and
	/// `timed_out` reset, and observers are notified with the fresh snapshot
	/// before the new timers are armed.
	pub fn retry(&self) {
		if self.inner.lifetime.is_cancelled() {
			return;
		}

		let token = {
			let mut guard = self.inner.gen_cancel.lock();
			guard.cancel();
			let fresh = self.inner.lifetime.child_token();
			*guard = fresh.clone();
			fresh
		};
		let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
		*self.inner.flags.lock() = TimerFlags::default();

		let driver = Arc::new((self.inner.factory)());
		*self.inner.current.lock() = Arc::clone(&driver);
		tracing::debug!(generation, "load.subscription.retry");
		self.arm(driver, generation, token);
	}

	/// Arms timers and the settlement watcher for one load cycle, then
	/// notifies observers with the cycle's first snapshot.
	fn arm(&self, driver: Arc<D>, generation: u64, token: CancellationToken) {
		if driver.loading() {
			let delay = self.inner.options.delay;
			if delay.is_zero() {
				self.inner.flags.lock().past_delay = true;
			} else {
				self.arm_timer(delay, generation, token.clone(), TimerKind::Delay);
			}
			if let Some(timeout) = self.inner.options.timeout {
				self.arm_timer(timeout, generation, token.clone(), TimerKind::Timeout);
			}
		}

		let inner = Arc::clone(&self.inner);
		let settled = driver.wait_settled();
		crate::spawn::spawn(async move {
			tokio::select! {
				_ = token.cancelled() => {}
				_ = settled => {
					if inner.generation.load(Ordering::Acquire) == generation {
						// Clears this generation's timers.
						token.cancel();
						tracing::trace!(generation, "load.subscription.settle");
						Self::notify_inner(&inner);
					}
				}
			}
		});

		self.notify();
	}

	fn arm_timer(&self, duration: Duration, generation: u64, token: CancellationToken, kind: TimerKind) {
		let inner = Arc::clone(&self.inner);
		crate::spawn::spawn(async move {
			tokio::select! {
				_ = token.cancelled() => {}
				_ = tokio::time::sleep(duration) => {
					if inner.generation.load(Ordering::Acquire) != generation {
						return;
					}
					{
						let mut flags = inner.flags.lock();
						match kind {
							TimerKind::Delay => flags.past_delay = true,
							TimerKind::Timeout => flags.timed_out = true,
						}
					}
					tracing::trace!(generation, kind = ?kind, "load.subscription.timer");
					Self::notify_inner(&inner);
				}
			}
		});
	}

	/// Registers an observer notified synchronously on every state
	/// transition, in registration order.
	pub fn subscribe(&self, callback: impl Fn(&LoadState<D::Payload>) + Send + Sync + 'static) -> ObserverId {
		let id = ObserverId(self.inner.next_observer.fetch_add(1, Ordering::Relaxed));
		self.inner.observers.lock().push((id, Arc::new(callback)));
		id
	}

	/// Removes one observer. Safe to call from within a notification
	/// callback.
	pub fn unsubscribe(&self, id: ObserverId) {
		self.inner.observers.lock().retain(|(oid, _)| *oid != id);
	}

	/// Current snapshot, combining the driver's result with timer flags.
	pub fn snapshot(&self) -> LoadState<D::Payload> {
		Self::snapshot_inner(&self.inner)
	}

	/// The current load instance.
	pub fn current(&self) -> Arc<D> {
		Arc::clone(&self.inner.current.lock())
	}

	/// Completion signal for the current load cycle; resolves on success or
	/// failure, never errors.
	pub fn wait_settled(&self) -> BoxFuture<'static, ()> {
		self.current().wait_settled()
	}

	/// Permanently stops timers and notifications. The in-flight load, if
	/// any, keeps running but its settlement is no longer observed.
	pub fn destroy(&self) {
		self.inner.lifetime.cancel();
		self.inner.observers.lock().clear();
		tracing::trace!("load.subscription.destroy");
	}

	fn notify(&self) {
		Self::notify_inner(&self.inner);
	}

	fn notify_inner(inner: &Arc<SubInner<D>>) {
		let state = Self::snapshot_inner(inner);
		// Copy before iterating so callbacks may (un)subscribe themselves.
		let callbacks: Vec<ObserverFn<D::Payload>> = inner.observers.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
		for callback in callbacks {
			callback(&state);
		}
	}

	fn snapshot_inner(inner: &Arc<SubInner<D>>) -> LoadState<D::Payload> {
		let driver = Arc::clone(&inner.current.lock());
		let flags = *inner.flags.lock();
		LoadState {
			loading: driver.loading(),
			loaded: driver.loaded(),
			error: driver.error(),
			past_delay: flags.past_delay,
			timed_out: flags.timed_out,
		}
	}
}
