//! One tree per parent: the entry point a host embeds.

use std::collections::HashMap;
use std::hash::Hash;

use crate::reconcile::{ChangeListener, ReconcileOptions};
use crate::tree::ChunkTree;
use crate::ChunkItem;

/// Owns one [`ChunkTree`] per parent, keyed by the parent's resolved
/// identity token.
///
/// Trees are created lazily on first request and live until the host calls
/// [`release`]; entry lifetime is never coupled to garbage collection, so a
/// host that drops a parent must release its tree through its own lifecycle
/// hook.
///
/// [`release`]: TreeRegistry::release
#[derive(Debug)]
pub struct TreeRegistry<P, T: ChunkItem> {
    trees: HashMap<P, ChunkTree<T>>,
}

impl<P: Eq + Hash, T: ChunkItem> TreeRegistry<P, T> {
    pub fn new() -> Self {
        TreeRegistry {
            trees: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// The tree for `parent`, if one has been created.
    pub fn tree(&self, parent: &P) -> Option<&ChunkTree<T>> {
        self.trees.get(parent)
    }

    /// Get or create the tree for `parent`.
    pub fn tree_for(&mut self, parent: P) -> &mut ChunkTree<T> {
        self.trees.entry(parent).or_default()
    }

    /// Get or create the tree for `parent` and reconcile it against
    /// `children` in one step.
    pub fn reconcile<R, L>(
        &mut self,
        parent: P,
        children: &[T],
        options: &ReconcileOptions,
        resolve_key: R,
        listener: &mut L,
    ) -> &ChunkTree<T>
    where
        R: FnMut(&T) -> T::Key,
        L: ChangeListener<T>,
    {
        let tree = self.trees.entry(parent).or_default();
        tree.reconcile(children, options, resolve_key, listener);
        tree
    }

    /// Drop the tree for `parent`. Returns false if there wasn't one.
    pub fn release(&mut self, parent: &P) -> bool {
        self.trees.remove(parent).is_some()
    }
}

impl<P: Eq + Hash, T: ChunkItem> Default for TreeRegistry<P, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testitem::TestItem;

    fn items(keys: impl IntoIterator<Item = u64>) -> Vec<TestItem> {
        keys.into_iter().map(TestItem::new).collect()
    }

    #[test]
    fn trees_are_created_lazily_and_persist() {
        let mut registry: TreeRegistry<&str, TestItem> = TreeRegistry::new();
        assert!(registry.tree(&"doc").is_none());

        let options = ReconcileOptions::chunk_size(3).with_debug();
        let children = items(0..10);
        registry.reconcile("doc", &children, &options, TestItem::key, &mut ());
        assert_eq!(registry.len(), 1);

        // Second pass on the same parent reuses the tree: nothing changes.
        let tree = registry.reconcile("doc", &children, &options, TestItem::key, &mut ());
        assert!(tree.modified_chunks().is_empty());
        assert!(tree.leaves().map(|(key, _)| *key).eq(0..10));
    }

    #[test]
    fn parents_are_independent() {
        let mut registry: TreeRegistry<u32, TestItem> = TreeRegistry::new();
        let options = ReconcileOptions::chunk_size(3);
        registry.reconcile(1, &items(0..4), &options, TestItem::key, &mut ());
        registry.reconcile(2, &items(10..12), &options, TestItem::key, &mut ());

        assert_eq!(registry.tree(&1).unwrap().leaves().count(), 4);
        assert_eq!(registry.tree(&2).unwrap().leaves().count(), 2);
    }

    #[test]
    fn release_is_explicit() {
        let mut registry: TreeRegistry<&str, TestItem> = TreeRegistry::new();
        registry.tree_for("doc");
        assert!(registry.release(&"doc"));
        assert!(!registry.release(&"doc"));
        assert!(registry.is_empty());
    }
}
