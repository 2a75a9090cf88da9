//! Declaration-level facade tying loads, subscriptions, the registry, and
//! the rendering boundary together.
//!
//! A [`Loadable`] (or [`BatchLoadable`]) corresponds to one mount-time
//! declaration: it lazily creates its [`Subscription`] on first use and
//! registers an initializer with the [`LoadRegistry`] at construction so the
//! startup/SSR driver can drain it. The UI layer owns presentation; the core
//! hands it either the resolved payload or a [`PendingView`] descriptor.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use lode_treemap::{ModuleTree, ResolvedTree, flatten, reconstruct};

use crate::batch::BatchLoadUnit;
use crate::config::AvailabilityCheck;
use crate::registry::{InitFuture, Initializer, LoadRegistry};
use crate::subscription::{ObserverId, Subscription};
use crate::unit::{LoadFuture, LoadUnit, LoaderFn};
use crate::{ConfigError, LoadError, LoadOptions, LoadState};

/// Maps an opaque module identifier to its loader function. The identifier
/// registry is generated elsewhere; the core only performs lookups.
pub type ResolveFn<T> = Arc<dyn Fn(&str) -> Option<LoaderFn<T>> + Send + Sync>;

/// Cloneable handle that restarts a loadable's underlying load.
#[derive(Clone)]
pub struct RetryHandle(Arc<dyn Fn() + Send + Sync>);

impl RetryHandle {
	fn new(retry: impl Fn() + Send + Sync + 'static) -> Self {
		Self(Arc::new(retry))
	}

	/// Discards the current load and starts a fresh one.
	pub fn retry(&self) {
		(self.0)();
	}
}

impl fmt::Debug for RetryHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("RetryHandle")
	}
}

/// Loading/error descriptor handed to the rendering boundary while a load is
/// pending or failed.
#[derive(Debug, Clone)]
pub struct PendingView {
	pub is_loading: bool,
	pub past_delay: bool,
	pub timed_out: bool,
	pub error: Option<LoadError>,
	pub retry: RetryHandle,
}

/// What the external renderer should draw.
#[derive(Debug, Clone)]
pub enum LoadView<P> {
	/// Still pending or failed; draw a fallback.
	Pending(PendingView),
	/// Fully loaded payload.
	Ready(P),
}

/// Rendering boundary implemented by the embedding UI layer.
pub trait Render<Payload>: Send + Sync {
	type Props;
	type Output;

	/// Draws the resolved payload.
	fn ready(&self, loaded: &Payload, props: &Self::Props) -> Self::Output;

	/// Draws the loading/error fallback.
	fn pending(&self, view: &PendingView, props: &Self::Props) -> Self::Output;
}

/// Boxed renderer for the batch form, which has no default presentation.
pub type BatchRenderer<T, P, O> = Arc<dyn Render<ResolvedTree<T>, Props = P, Output = O>>;

/// Configuration for a single-load declaration.
pub struct LoadableSpec<T> {
	loader: LoaderFn<T>,
	options: LoadOptions,
	availability: Option<AvailabilityCheck>,
	module_hints: Vec<String>,
	registry: LoadRegistry,
}

impl<T> LoadableSpec<T> {
	/// Creates a spec around one loader, with default options and the global
	/// registry.
	pub fn new(loader: impl Fn() -> LoadFuture<T> + Send + Sync + 'static) -> Self {
		Self {
			loader: Arc::new(loader),
			options: LoadOptions::default(),
			availability: None,
			module_hints: Vec::new(),
			registry: LoadRegistry::global(),
		}
	}

	/// Sets delay/timeout options.
	#[must_use]
	pub fn options(mut self, options: LoadOptions) -> Self {
		self.options = options;
		self
	}

	/// Attaches the build step's synchronous availability check. Without
	/// one, this declaration is only drainable via
	/// [`LoadRegistry::drain_all`].
	#[must_use]
	pub fn availability_check(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
		self.availability = Some(Arc::new(check));
		self
	}

	/// Records a chunk-name hint emitted by the build step.
	#[must_use]
	pub fn module_hint(mut self, hint: impl Into<String>) -> Self {
		self.module_hints.push(hint.into());
		self
	}

	/// Registers into a specific registry instead of the global one.
	#[must_use]
	pub fn registry(mut self, registry: LoadRegistry) -> Self {
		self.registry = registry;
		self
	}
}

struct LoadableInner<T>
where
	T: Send + Sync + 'static,
{
	loader: LoaderFn<T>,
	options: LoadOptions,
	module_hints: Vec<String>,
	subscription: OnceLock<Subscription<LoadUnit<T>>>,
}

/// One mount-time declaration of a single deferred load.
pub struct Loadable<T>
where
	T: Send + Sync + 'static,
{
	inner: Arc<LoadableInner<T>>,
}

impl<T: Send + Sync + 'static> Clone for Loadable<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Loadable<T>
where
	T: Send + Sync + 'static,
{
	/// Builds the loadable and registers its initializer.
	pub fn new(spec: LoadableSpec<T>) -> Self {
		let loadable = Self {
			inner: Arc::new(LoadableInner {
				loader: spec.loader,
				options: spec.options,
				module_hints: spec.module_hints,
				subscription: OnceLock::new(),
			}),
		};

		let init: Initializer = {
			let loadable = loadable.clone();
			Arc::new(move || loadable.ensure_started())
		};
		spec.registry.register_all(Arc::clone(&init));
		if let Some(available) = spec.availability {
			spec.registry.register_ready(init, available);
		}

		loadable
	}

	fn subscription(&self) -> &Subscription<LoadUnit<T>> {
		self.inner.subscription.get_or_init(|| {
			let loader = Arc::clone(&self.inner.loader);
			let factory: Arc<dyn Fn() -> LoadUnit<T> + Send + Sync> = Arc::new(move || LoadUnit::start(&loader));
			Subscription::start(factory, self.inner.options.clone())
		})
	}

	/// Ensures the load has started and returns its completion signal.
	/// Idempotent: repeated calls observe the same in-flight load.
	pub fn ensure_started(&self) -> InitFuture {
		self.subscription().wait_settled()
	}

	/// Current snapshot, starting the load if necessary.
	pub fn state(&self) -> LoadState<Arc<T>> {
		self.subscription().snapshot()
	}

	/// What the renderer should draw right now.
	pub fn view(&self) -> LoadView<Arc<T>> {
		let state = self.state();
		if state.loading || state.error.is_some() {
			return LoadView::Pending(self.pending_view(&state));
		}
		match state.loaded {
			Some(loaded) => LoadView::Ready(loaded),
			// Settled with neither value nor error does not occur; keep the
			// renderer total anyway.
			None => LoadView::Pending(self.pending_view(&state)),
		}
	}

	/// Renders the current state through the supplied renderer.
	pub fn render<R>(&self, renderer: &R, props: &R::Props) -> R::Output
	where
		R: Render<Arc<T>>,
	{
		match self.view() {
			LoadView::Ready(loaded) => renderer.ready(&loaded, props),
			LoadView::Pending(view) => renderer.pending(&view, props),
		}
	}

	/// Registers an observer on the underlying subscription.
	pub fn subscribe(&self, callback: impl Fn(&LoadState<Arc<T>>) + Send + Sync + 'static) -> ObserverId {
		self.subscription().subscribe(callback)
	}

	/// Removes one observer.
	pub fn unsubscribe(&self, id: ObserverId) {
		self.subscription().unsubscribe(id);
	}

	/// Restarts the load.
	pub fn retry(&self) {
		self.subscription().retry();
	}

	/// Cloneable retry handle for fallback UIs.
	pub fn retry_handle(&self) -> RetryHandle {
		let sub = self.subscription().clone();
		RetryHandle::new(move || sub.retry())
	}

	/// Chunk-name hints recorded at declaration time.
	pub fn module_hints(&self) -> &[String] {
		&self.inner.module_hints
	}

	/// Stops observing. The in-flight load, if any, keeps running but no
	/// further notifications fire.
	pub fn destroy(&self) {
		if let Some(sub) = self.inner.subscription.get() {
			sub.destroy();
		}
	}

	fn pending_view(&self, state: &LoadState<Arc<T>>) -> PendingView {
		PendingView {
			is_loading: state.loading,
			past_delay: state.past_delay,
			timed_out: state.timed_out,
			error: state.error.clone(),
			retry: self.retry_handle(),
		}
	}
}

/// Configuration for a batch declaration over a nested identifier tree.
pub struct BatchLoadableSpec<T> {
	tree: ModuleTree,
	resolve: ResolveFn<T>,
	options: LoadOptions,
	availability: Option<AvailabilityCheck>,
	module_hints: Vec<String>,
	registry: LoadRegistry,
}

impl<T> BatchLoadableSpec<T> {
	/// Creates a spec over a nested tree of identifiers and the lookup that
	/// maps each identifier to its loader.
	pub fn new(tree: ModuleTree, resolve: impl Fn(&str) -> Option<LoaderFn<T>> + Send + Sync + 'static) -> Self {
		Self {
			tree,
			resolve: Arc::new(resolve),
			options: LoadOptions::default(),
			availability: None,
			module_hints: Vec::new(),
			registry: LoadRegistry::global(),
		}
	}

	/// Sets delay/timeout options.
	#[must_use]
	pub fn options(mut self, options: LoadOptions) -> Self {
		self.options = options;
		self
	}

	/// Attaches a composite availability check covering every named loader.
	/// The core never decomposes it.
	#[must_use]
	pub fn availability_check(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
		self.availability = Some(Arc::new(check));
		self
	}

	/// Records a chunk-name hint emitted by the build step.
	#[must_use]
	pub fn module_hint(mut self, hint: impl Into<String>) -> Self {
		self.module_hints.push(hint.into());
		self
	}

	/// Registers into a specific registry instead of the global one.
	#[must_use]
	pub fn registry(mut self, registry: LoadRegistry) -> Self {
		self.registry = registry;
		self
	}
}

struct BatchInner<T, P, O>
where
	T: Send + Sync + 'static,
{
	tree: ModuleTree,
	loaders: Arc<BTreeMap<String, LoaderFn<T>>>,
	options: LoadOptions,
	module_hints: Vec<String>,
	renderer: BatchRenderer<T, P, O>,
	subscription: OnceLock<Subscription<BatchLoadUnit<T>>>,
}

/// One mount-time declaration of a batch of deferred loads that resolve
/// together and render as one reconstructed tree.
pub struct BatchLoadable<T, P, O>
where
	T: Send + Sync + 'static,
{
	inner: Arc<BatchInner<T, P, O>>,
}

impl<T: Send + Sync + 'static, P, O> Clone for BatchLoadable<T, P, O> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T, P, O> BatchLoadable<T, P, O>
where
	T: Send + Sync + 'static,
	P: 'static,
	O: 'static,
{
	/// Builds the batch loadable, resolving every identifier up front and
	/// registering its initializer.
	///
	/// The batch form requires a renderer: a loaded tree has no meaningful
	/// default presentation, so its absence is rejected here rather than
	/// surfacing at load time. Identifiers that fail to resolve are also
	/// construction errors.
	pub fn new(spec: BatchLoadableSpec<T>, renderer: Option<BatchRenderer<T, P, O>>) -> Result<Self, ConfigError> {
		let renderer = renderer.ok_or(ConfigError::MissingRenderer)?;

		let mut loaders = BTreeMap::new();
		for (path, id) in flatten(&spec.tree) {
			let loader = (spec.resolve)(&id).ok_or_else(|| ConfigError::UnresolvedIdentifier(id.clone()))?;
			loaders.insert(path, loader);
		}

		let loadable = Self {
			inner: Arc::new(BatchInner {
				tree: spec.tree,
				loaders: Arc::new(loaders),
				options: spec.options,
				module_hints: spec.module_hints,
				renderer,
				subscription: OnceLock::new(),
			}),
		};

		let init: Initializer = {
			let loadable = loadable.clone();
			Arc::new(move || loadable.ensure_started())
		};
		spec.registry.register_all(Arc::clone(&init));
		if let Some(available) = spec.availability {
			spec.registry.register_ready(init, available);
		}

		Ok(loadable)
	}

	fn subscription(&self) -> &Subscription<BatchLoadUnit<T>> {
		self.inner.subscription.get_or_init(|| {
			let loaders = Arc::clone(&self.inner.loaders);
			let factory: Arc<dyn Fn() -> BatchLoadUnit<T> + Send + Sync> = Arc::new(move || BatchLoadUnit::start(&loaders));
			Subscription::start(factory, self.inner.options.clone())
		})
	}

	/// Ensures every entry's load has started and returns the aggregate
	/// completion signal. Idempotent.
	pub fn ensure_started(&self) -> InitFuture {
		self.subscription().wait_settled()
	}

	/// Current aggregate snapshot, starting the loads if necessary.
	pub fn state(&self) -> LoadState<BTreeMap<String, Arc<T>>> {
		self.subscription().snapshot()
	}

	/// What the renderer should draw right now. On success the original
	/// tree shape is reconstructed with resolved values substituted for
	/// identifiers.
	pub fn view(&self) -> LoadView<ResolvedTree<T>> {
		let state = self.state();
		if state.loading || state.error.is_some() {
			return LoadView::Pending(self.pending_view(&state));
		}
		let loaded = state.loaded.unwrap_or_default();
		LoadView::Ready(reconstruct(&self.inner.tree, &loaded))
	}

	/// Renders the current state through the declaration's renderer.
	pub fn render(&self, props: &P) -> O {
		match self.view() {
			LoadView::Ready(tree) => self.inner.renderer.ready(&tree, props),
			LoadView::Pending(view) => self.inner.renderer.pending(&view, props),
		}
	}

	/// Registers an observer on the underlying subscription.
	pub fn subscribe(&self, callback: impl Fn(&LoadState<BTreeMap<String, Arc<T>>>) + Send + Sync + 'static) -> ObserverId {
		self.subscription().subscribe(callback)
	}

	/// Removes one observer.
	pub fn unsubscribe(&self, id: ObserverId) {
		self.subscription().unsubscribe(id);
	}

	/// Restarts every entry of the batch.
	pub fn retry(&self) {
		self.subscription().retry();
	}

	/// Per-key failures of the current load cycle.
	pub fn errors(&self) -> BTreeMap<String, LoadError> {
		self.subscription().current().errors()
	}

	/// Chunk-name hints recorded at declaration time.
	pub fn module_hints(&self) -> &[String] {
		&self.inner.module_hints
	}

	/// Stops observing. In-flight loads keep running but no further
	/// notifications fire.
	pub fn destroy(&self) {
		if let Some(sub) = self.inner.subscription.get() {
			sub.destroy();
		}
	}

	fn pending_view(&self, state: &LoadState<BTreeMap<String, Arc<T>>>) -> PendingView {
		let sub = self.subscription().clone();
		PendingView {
			is_loading: state.loading,
			past_delay: state.past_delay,
			timed_out: state.timed_out,
			error: state.error.clone(),
			retry: RetryHandle::new(move || sub.retry()),
		}
	}
}
