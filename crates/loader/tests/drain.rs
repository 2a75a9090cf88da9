//! End-to-end drain flows: full prefetch and ready-only startup.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lode_loader::treemap::{ModuleTree, ResolvedLeaf, ResolvedTree};
use lode_loader::{
	BatchLoadable, BatchLoadableSpec, BatchRenderer, LoadError, LoadRegistry, LoadView, Loadable, LoadableSpec,
	LoaderFn, PendingView, Render,
};

fn slow_loader(value: &'static str, delay: Duration) -> LoaderFn<String> {
	Arc::new(move || {
		Box::pin(async move {
			tokio::time::sleep(delay).await;
			Ok(value.to_owned())
		})
	})
}

struct JoinRenderer;

impl Render<ResolvedTree<String>> for JoinRenderer {
	type Props = ();
	type Output = String;

	fn ready(&self, loaded: &ResolvedTree<String>, (): &()) -> String {
		fn walk(tree: &ResolvedTree<String>, out: &mut Vec<String>) {
			match tree {
				ResolvedTree::Leaf(ResolvedLeaf::Resolved(value)) => out.push(value.as_ref().clone()),
				ResolvedTree::Leaf(ResolvedLeaf::Unresolved(id)) => out.push(format!("?{id}")),
				ResolvedTree::Seq(items) => items.iter().for_each(|item| walk(item, out)),
				ResolvedTree::Map(entries) => entries.values().for_each(|item| walk(item, out)),
			}
		}
		let mut parts = Vec::new();
		walk(loaded, &mut parts);
		parts.join("/")
	}

	fn pending(&self, view: &PendingView, (): &()) -> String {
		format!("pending({})", view.is_loading)
	}
}

#[tokio::test]
async fn drain_all_resolves_single_and_batch_declarations() {
	let registry = LoadRegistry::new();

	let single = Loadable::new(
		LoadableSpec::new({
			let loader = slow_loader("single", Duration::from_millis(5));
			move || loader()
		})
		.registry(registry.clone()),
	);

	let tree = ModuleTree::Map(BTreeMap::from([
		("doc".to_owned(), ModuleTree::leaf("doc-chunk")),
		("nav".to_owned(), ModuleTree::leaf("nav-chunk")),
	]));
	let batch = BatchLoadable::new(
		BatchLoadableSpec::new(tree, |id: &str| Some(slow_loader(if id == "doc-chunk" { "doc" } else { "nav" }, Duration::from_millis(3))))
			.registry(registry.clone()),
		Some(Arc::new(JoinRenderer) as BatchRenderer<String, (), String>),
	)
	.expect("renderer supplied");

	assert_eq!(registry.pending_all(), 2);
	registry.drain_all().await;
	assert_eq!(registry.pending_all(), 0);

	match single.view() {
		LoadView::Ready(value) => assert_eq!(value.as_str(), "single"),
		LoadView::Pending(view) => panic!("single not drained: {view:?}"),
	}
	assert_eq!(batch.render(&()), "doc/nav");
}

#[tokio::test]
async fn drain_all_absorbs_failing_declarations() {
	let registry = LoadRegistry::new();

	let broken = Loadable::new(
		LoadableSpec::new(|| Box::pin(async { Err::<String, _>(LoadError::new("missing chunk")) })).registry(registry.clone()),
	);
	let healthy = Loadable::new(
		LoadableSpec::new({
			let loader = slow_loader("fine", Duration::from_millis(2));
			move || loader()
		})
		.registry(registry.clone()),
	);

	// Resolves despite the failure; readiness gating must not hang.
	registry.drain_all().await;

	assert!(broken.state().is_failed());
	assert_eq!(healthy.state().loaded.as_deref(), Some(&"fine".to_owned()));
}

#[tokio::test]
async fn drain_ready_only_touches_available_declarations() {
	let registry = LoadRegistry::new();
	let invocations = Arc::new(AtomicUsize::new(0));

	let counting_loader = |invocations: &Arc<AtomicUsize>, value: &'static str| -> LoaderFn<String> {
		let invocations = Arc::clone(invocations);
		Arc::new(move || {
			invocations.fetch_add(1, Ordering::SeqCst);
			Box::pin(async move { Ok(value.to_owned()) })
		})
	};

	let available = Loadable::new(
		LoadableSpec::new({
			let loader = counting_loader(&invocations, "on-disk");
			move || loader()
		})
		.availability_check(|| true)
		.registry(registry.clone()),
	);
	let unavailable = Loadable::new(
		LoadableSpec::new({
			let loader = counting_loader(&invocations, "remote");
			move || loader()
		})
		.availability_check(|| false)
		.registry(registry.clone()),
	);

	assert_eq!(registry.pending_ready(), 2);
	registry.drain_ready().await;

	assert_eq!(invocations.load(Ordering::SeqCst), 1, "only the available loader runs");
	assert!(available.state().is_ready());

	// A later full drain still picks the unavailable one up.
	registry.drain_all().await;
	assert_eq!(invocations.load(Ordering::SeqCst), 2);
	assert!(unavailable.state().is_ready());
}

#[tokio::test]
async fn drain_ready_gates_batches_on_their_composite_check() {
	let registry = LoadRegistry::new();
	let invocations = Arc::new(AtomicUsize::new(0));

	let counting_resolver = {
		let invocations = Arc::clone(&invocations);
		move |id: &str| -> Option<LoaderFn<String>> {
			let value = id.to_owned();
			let invocations = Arc::clone(&invocations);
			Some(Arc::new(move || {
				invocations.fetch_add(1, Ordering::SeqCst);
				let value = value.clone();
				Box::pin(async move { Ok(value) })
			}))
		}
	};

	let tree = ModuleTree::Seq(vec![ModuleTree::leaf("header"), ModuleTree::leaf("footer")]);
	let cached = BatchLoadable::new(
		BatchLoadableSpec::new(tree.clone(), counting_resolver.clone())
			.availability_check(|| true)
			.registry(registry.clone()),
		Some(Arc::new(JoinRenderer) as BatchRenderer<String, (), String>),
	)
	.expect("renderer supplied");
	let remote = BatchLoadable::new(
		BatchLoadableSpec::new(tree, counting_resolver)
			.availability_check(|| false)
			.registry(registry.clone()),
		Some(Arc::new(JoinRenderer) as BatchRenderer<String, (), String>),
	)
	.expect("renderer supplied");

	assert_eq!(registry.pending_ready(), 2);
	registry.drain_ready().await;

	assert_eq!(invocations.load(Ordering::SeqCst), 2, "only the available batch's two loaders run");
	assert_eq!(cached.render(&()), "header/footer");

	registry.drain_all().await;
	assert_eq!(invocations.load(Ordering::SeqCst), 4);
	assert_eq!(remote.render(&()), "header/footer");
}
