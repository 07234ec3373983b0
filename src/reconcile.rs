//! Reconciliation: mutate the tree in place until its leaves, read left to
//! right, equal the desired children sequence.
//!
//! The reconciler walks the existing leaves with a cursor and looks each
//! one up in the unread suffix of the desired sequence - first by handle
//! identity (the common case: an unchanged item costs one comparison), then
//! by resolved key (the item was rewritten in place). Items skipped over by
//! a match are insertions; leaves that match nothing are removals; a key
//! match with a different handle is an in-place update.

use std::ops::Range;

use smallvec::SmallVec;

use crate::cursor::Cursor;
use crate::tree::{ChunkTree, NodeId};
use crate::{ChunkItem, DEFAULT_CHUNK_SIZE};

/// Options for one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Fanout bound `C`: the maximum number of children a chunk is created
    /// with. Must be at least 2. Tree depth comes out around `log_C(n)`.
    pub chunk_size: usize,
    /// Re-validate every tree invariant after each mutation. Expensive;
    /// for tests and debugging only.
    pub debug: bool,
}

impl ReconcileOptions {
    pub fn chunk_size(chunk_size: usize) -> Self {
        ReconcileOptions {
            chunk_size,
            debug: false,
        }
    }

    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::chunk_size(DEFAULT_CHUNK_SIZE)
    }
}

/// Callbacks fired while reconciling. All indices are positions in the new
/// children sequence. Implementations must not call back into the
/// reconciler for the same tree.
///
/// `()` is the no-op listener.
pub trait ChangeListener<T: ChunkItem> {
    /// An item newly present in the tree.
    fn on_insert(&mut self, _item: &T, _index: usize) {}
    /// A leaf whose handle was swapped in place (same key, new item).
    fn on_update(&mut self, _item: &T, _index: usize) {}
    /// An already-present item whose position in the sequence shifted.
    fn on_index_change(&mut self, _item: &T, _index: usize) {}
}

impl<T: ChunkItem> ChangeListener<T> for () {}

impl<T: ChunkItem> ChunkTree<T> {
    /// Reconcile the tree against `children`, so that the in-order leaves
    /// equal the new sequence. `resolve_key` maps an item to its stable
    /// key; it is called at most once per item and must agree with itself
    /// across calls.
    ///
    /// `modified_chunks` is reset at the start of the pass and afterwards
    /// holds every chunk whose descendant set changed.
    pub fn reconcile<R, L>(
        &mut self,
        children: &[T],
        options: &ReconcileOptions,
        resolve_key: R,
        listener: &mut L,
    ) where
        R: FnMut(&T) -> T::Key,
        L: ChangeListener<T>,
    {
        assert!(options.chunk_size >= 2, "chunk size must be at least 2");
        self.chunk_size = options.chunk_size;
        self.debug = options.debug;
        self.modified_chunks.clear();

        Reconciler {
            tree: &mut *self,
            children,
            resolve_key,
            listener,
            cursor: Cursor::new(),
            pointer: 0,
            child_keys: vec![None; children.len()],
            shift: 0,
        }
        .run();

        self.moved_node_keys.clear();
        if self.debug {
            self.check();
        }
    }
}

struct Reconciler<'a, T: ChunkItem, R, L> {
    tree: &'a mut ChunkTree<T>,
    children: &'a [T],
    resolve_key: R,
    listener: &'a mut L,
    cursor: Cursor,
    /// Index of the next unread item in `children`.
    pointer: usize,
    /// Lazily resolved keys, by child index.
    child_keys: Vec<Option<T::Key>>,
    /// Running insertions minus removals; nonzero means the indexes of
    /// everything still matching have shifted.
    shift: isize,
}

impl<'a, T, R, L> Reconciler<'a, T, R, L>
where
    T: ChunkItem,
    R: FnMut(&T) -> T::Key,
    L: ChangeListener<T>,
{
    fn run(&mut self) {
        while let Some(leaf_id) = self.cursor.read_leaf(&*self.tree) {
            let Some(offset) = self.lookahead(leaf_id) else {
                // Not in the new sequence: drop the leaf.
                self.tree.remove_at(&mut self.cursor);
                self.shift -= 1;
                continue;
            };

            if offset > 0 {
                // Everything before the match is new.
                let start = self.pointer;
                let batch = self.build_leaves(start..start + offset);
                self.tree.insert_before(&mut self.cursor, &batch);
                for (i, item) in self.children[start..start + offset].iter().enumerate() {
                    self.listener.on_insert(item, start + i);
                }
                self.shift += offset as isize;
            }

            let matched_index = self.pointer + offset;
            let matched = &self.children[matched_index];
            self.pointer = matched_index + 1;

            if !matched.same_item(&self.tree.leaf(leaf_id).item) {
                let item = matched.clone();
                self.tree.update_leaf_item(&self.cursor, leaf_id, item);
                self.listener.on_update(matched, matched_index);
            }
            if self.shift != 0 {
                self.listener.on_index_change(matched, matched_index);
            }
        }

        // Whatever is still unread gets appended after the last leaf.
        if self.pointer < self.children.len() {
            let start = self.pointer;
            let batch = self.build_leaves(start..self.children.len());
            self.cursor.return_to_previous_leaf(&*self.tree);
            self.tree.insert_after(&mut self.cursor, &batch);
            for (i, item) in self.children[start..].iter().enumerate() {
                self.listener.on_insert(item, start + i);
            }
        }
    }

    /// Find the leaf's item in the unread suffix of `children`, returning
    /// its offset from `pointer`. Identity wins over key so unchanged
    /// handles never pay for key resolution.
    fn lookahead(&mut self, leaf_id: NodeId) -> Option<usize> {
        let leaf_item = &self.tree.leaf(leaf_id).item;
        for (i, child) in self.children[self.pointer..].iter().enumerate() {
            if child.same_item(leaf_item) {
                return Some(i);
            }
        }

        let leaf_key = self.tree.leaf(leaf_id).key.clone();
        for i in self.pointer..self.children.len() {
            if *self.key_for(i) == leaf_key {
                return Some(i - self.pointer);
            }
        }
        None
    }

    fn key_for(&mut self, index: usize) -> &T::Key {
        if self.child_keys[index].is_none() {
            self.child_keys[index] = Some((self.resolve_key)(&self.children[index]));
        }
        self.child_keys[index].as_ref().unwrap()
    }

    fn build_leaves(&mut self, range: Range<usize>) -> SmallVec<[NodeId; 8]> {
        let mut batch = SmallVec::with_capacity(range.len());
        for i in range {
            let key = self.key_for(i).clone();
            let item = self.children[i].clone();
            batch.push(self.tree.alloc_leaf(key, item));
        }
        batch
    }
}
