//! Structural mapping between nested module-identifier trees and flat
//! dotted-path maps.
//!
//! A consumer declares the modules it needs as an arbitrarily nested tree of
//! opaque identifiers. [`flatten`] turns that tree into a flat
//! `path -> identifier` map so every leaf can be loaded independently;
//! [`reconstruct`] rebuilds the original shape once leaves have resolved,
//! substituting each resolved value for its identifier. The two functions are
//! inverse in shape: reconstruction never adds, drops, or reorders nodes.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Nested declaration of module identifiers.
///
/// Mappings are key-ordered so flattening is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleTree {
	/// A single opaque module identifier.
	Leaf(String),
	/// An ordered sequence of subtrees.
	Seq(Vec<ModuleTree>),
	/// A key-ordered mapping of subtrees.
	Map(BTreeMap<String, ModuleTree>),
}

impl ModuleTree {
	/// Creates a leaf from any identifier-like value.
	pub fn leaf(id: impl Into<String>) -> Self {
		Self::Leaf(id.into())
	}

	/// Returns the number of leaf identifiers in the tree.
	pub fn leaf_count(&self) -> usize {
		match self {
			Self::Leaf(_) => 1,
			Self::Seq(items) => items.iter().map(Self::leaf_count).sum(),
			Self::Map(entries) => entries.values().map(Self::leaf_count).sum(),
		}
	}
}

/// Leaf of a [`ResolvedTree`]: the loaded value, or the original identifier
/// when no resolution was supplied for its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLeaf<T> {
	/// The value loaded for this position.
	Resolved(Arc<T>),
	/// The untouched identifier; its path was absent from the resolved map.
	Unresolved(String),
}

/// Tree with the same shape as the originating [`ModuleTree`], leaves
/// replaced by [`ResolvedLeaf`] values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTree<T> {
	Leaf(ResolvedLeaf<T>),
	Seq(Vec<ResolvedTree<T>>),
	Map(BTreeMap<String, ResolvedTree<T>>),
}

/// Flattens a nested identifier tree into a `dotted-path -> identifier` map.
///
/// Sequence indices and map keys are joined with `.`: `{a: [x, y]}` becomes
/// `{"a.0": x, "a.1": y}`. A bare leaf at the root flattens to the empty
/// path. An empty tree produces an empty map.
pub fn flatten(tree: &ModuleTree) -> BTreeMap<String, String> {
	let mut out = BTreeMap::new();
	flatten_into(tree, String::new(), &mut out);
	out
}

fn flatten_into(tree: &ModuleTree, prefix: String, out: &mut BTreeMap<String, String>) {
	match tree {
		ModuleTree::Leaf(id) => {
			out.insert(prefix, id.clone());
		}
		ModuleTree::Seq(items) => {
			for (index, item) in items.iter().enumerate() {
				flatten_into(item, join(&prefix, &index.to_string()), out);
			}
		}
		ModuleTree::Map(entries) => {
			for (key, item) in entries {
				flatten_into(item, join(&prefix, key), out);
			}
		}
	}
}

fn join(prefix: &str, segment: &str) -> String {
	if prefix.is_empty() { segment.to_owned() } else { format!("{prefix}.{segment}") }
}

/// Rebuilds the original tree shape, substituting resolved values.
///
/// Every path present in `resolved` replaces its leaf identifier; paths
/// absent from `resolved` keep the identifier as
/// [`ResolvedLeaf::Unresolved`]. The output preserves sequence lengths and
/// map key sets exactly.
pub fn reconstruct<T>(tree: &ModuleTree, resolved: &BTreeMap<String, Arc<T>>) -> ResolvedTree<T> {
	reconstruct_at(tree, String::new(), resolved)
}

fn reconstruct_at<T>(tree: &ModuleTree, prefix: String, resolved: &BTreeMap<String, Arc<T>>) -> ResolvedTree<T> {
	match tree {
		ModuleTree::Leaf(id) => match resolved.get(&prefix) {
			Some(value) => ResolvedTree::Leaf(ResolvedLeaf::Resolved(Arc::clone(value))),
			None => ResolvedTree::Leaf(ResolvedLeaf::Unresolved(id.clone())),
		},
		ModuleTree::Seq(items) => ResolvedTree::Seq(
			items
				.iter()
				.enumerate()
				.map(|(index, item)| reconstruct_at(item, join(&prefix, &index.to_string()), resolved))
				.collect(),
		),
		ModuleTree::Map(entries) => ResolvedTree::Map(
			entries
				.iter()
				.map(|(key, item)| (key.clone(), reconstruct_at(item, join(&prefix, key), resolved)))
				.collect(),
		),
	}
}
