use smallvec::SmallVec;

use crate::tree::{ChunkTree, NodeId};
use crate::ChunkItem;

/// The reconciler's working position inside a [`ChunkTree`].
///
/// A cursor points at `chunk.children[index]`, where `chunk` is the root or
/// any chunk. `index == -1` is the legal "before the first child" position,
/// used at the start of a traversal and after a removal that emptied the
/// left side of a chunk. `stack` holds the index at which `chunk` is nested
/// in each ancestor, root first, so exiting a chunk is O(1).
///
/// The cursor is a plain record of ids and indexes; every method takes the
/// tree by reference. It must only be used with the tree it was created
/// for, and it is the caller's job to keep it valid across mutations (the
/// mutators in this crate do).
#[derive(Debug, Clone)]
pub(crate) struct Cursor {
    pub(crate) chunk: NodeId,
    pub(crate) index: isize,
    pub(crate) stack: SmallVec<[usize; 8]>,
    pub(crate) reached_end: bool,
    /// Memoized `chunk.children[index]`. `None` at the `-1` position, after
    /// the end, or after a mutation cleared it.
    pub(crate) cached_node: Option<NodeId>,
}

/// A position remembered across mutations. Restoring rescans the chunk for
/// the node, so saved pointers survive splices that shifted indexes around
/// them (but not removal of the node itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SavedPointer {
    /// Before the first top-level child.
    Start,
    Node { chunk: NodeId, node: NodeId },
}

impl Cursor {
    pub(crate) fn new() -> Self {
        Cursor {
            chunk: NodeId::ROOT,
            index: -1,
            stack: SmallVec::new(),
            reached_end: false,
            cached_node: None,
        }
    }

    /// The node under the cursor, if the cursor is on one.
    pub(crate) fn node_at_pointer<T: ChunkItem>(&self, tree: &ChunkTree<T>) -> Option<NodeId> {
        if let Some(node) = self.cached_node {
            return Some(node);
        }
        if self.reached_end || self.index < 0 {
            return None;
        }
        Some(tree.chunk(self.chunk).children[self.index as usize])
    }

    pub(crate) fn clear_cache(&mut self) {
        self.cached_node = None;
    }

    /// True when the cursor sits on the last child of its chunk.
    pub(crate) fn at_last_index<T: ChunkItem>(&self, tree: &ChunkTree<T>) -> bool {
        self.index >= 0 && self.index as usize == tree.chunk(self.chunk).children.len() - 1
    }

    /// Advance to the next leaf in document order. Returns `None` (once) at
    /// the end of the tree; calling again after that is a bug.
    pub(crate) fn read_leaf<T: ChunkItem>(&mut self, tree: &ChunkTree<T>) -> Option<NodeId> {
        if self.reached_end {
            panic!("Cannot read past the end of the tree");
        }

        // Step right, exiting chunks until a next sibling exists.
        loop {
            let len = tree.chunk(self.chunk).children.len() as isize;
            if self.index + 1 < len {
                self.index += 1;
                break;
            }
            if self.chunk.is_root() {
                self.reached_end = true;
                self.cached_node = None;
                return None;
            }
            self.exit_chunk(tree);
        }

        // Descend through any chunks to the first leaf below the cursor.
        let mut node = tree.chunk(self.chunk).children[self.index as usize];
        while tree.is_chunk(node) {
            self.enter_chunk(tree, false);
            node = tree.chunk(self.chunk).children[self.index as usize];
        }
        self.cached_node = Some(node);
        Some(node)
    }

    /// The reverse of [`read_leaf`](Cursor::read_leaf): move to the previous
    /// leaf in document order, or to the before-start position if there is
    /// none.
    pub(crate) fn return_to_previous_leaf<T: ChunkItem>(
        &mut self,
        tree: &ChunkTree<T>,
    ) -> Option<NodeId> {
        if self.reached_end {
            self.reached_end = false;
            debug_assert!(self.chunk.is_root());
            let len = tree.chunk(self.chunk).children.len();
            if len == 0 {
                self.index = -1;
                self.cached_node = None;
                return None;
            }
            self.index = len as isize - 1;
            return Some(self.descend_to_last_leaf(tree));
        }

        loop {
            if self.index > 0 {
                self.index -= 1;
                return Some(self.descend_to_last_leaf(tree));
            }
            if self.chunk.is_root() {
                self.index = -1;
                self.cached_node = None;
                return None;
            }
            self.exit_chunk(tree);
        }
    }

    /// Step into the chunk under the cursor, landing on its first child
    /// (or its last, with `end`).
    pub(crate) fn enter_chunk<T: ChunkItem>(&mut self, tree: &ChunkTree<T>, end: bool) {
        let id = self
            .node_at_pointer(tree)
            .expect("Cannot enter: no node under the cursor");
        let chunk = tree.chunk(id);
        assert!(!chunk.children.is_empty(), "Cannot enter an empty chunk");

        self.stack.push(self.index as usize);
        self.chunk = id;
        self.index = if end { chunk.children.len() as isize - 1 } else { 0 };
        self.cached_node = Some(chunk.children[self.index as usize]);
    }

    /// Step up to the parent, landing on the chunk that was just exited.
    pub(crate) fn exit_chunk<T: ChunkItem>(&mut self, tree: &ChunkTree<T>) {
        assert!(!self.chunk.is_root(), "Cannot exit the root");
        let exited = self.chunk;
        let parent = tree.chunk(exited).parent;
        let index = self.stack.pop().expect("Cursor stack underflow");
        debug_assert_eq!(tree.chunk(parent).children.get(index).copied(), Some(exited));

        self.chunk = parent;
        self.index = index as isize;
        self.cached_node = Some(exited);
    }

    /// Descend through chunks at the cursor, keeping to the last child,
    /// until a leaf is under the cursor. Returns that leaf.
    pub(crate) fn descend_to_last_leaf<T: ChunkItem>(&mut self, tree: &ChunkTree<T>) -> NodeId {
        let mut node = tree.chunk(self.chunk).children[self.index as usize];
        while tree.is_chunk(node) {
            self.enter_chunk(tree, true);
            node = tree.chunk(self.chunk).children[self.index as usize];
        }
        self.cached_node = Some(node);
        node
    }

    pub(crate) fn save<T: ChunkItem>(&self, tree: &ChunkTree<T>) -> SavedPointer {
        debug_assert!(!self.reached_end);
        if self.index < 0 {
            assert!(
                self.chunk.is_root(),
                "Cannot save a pointer before the start of a nested chunk"
            );
            return SavedPointer::Start;
        }
        SavedPointer::Node {
            chunk: self.chunk,
            node: tree.chunk(self.chunk).children[self.index as usize],
        }
    }

    /// Re-aim the cursor at a saved position, recomputing the index and the
    /// ancestor stack. Panics if the saved node is gone or its chunk is
    /// detached.
    pub(crate) fn restore<T: ChunkItem>(&mut self, tree: &ChunkTree<T>, saved: SavedPointer) {
        self.reached_end = false;
        self.stack.clear();

        match saved {
            SavedPointer::Start => {
                self.chunk = NodeId::ROOT;
                self.index = -1;
                self.cached_node = None;
            }
            SavedPointer::Node { chunk, node } => {
                let index = tree
                    .chunk(chunk)
                    .children
                    .iter()
                    .position(|c| *c == node)
                    .expect("Cannot restore: saved node is no longer in its chunk");

                let mut id = chunk;
                while !id.is_root() {
                    let parent = tree.chunk(id).parent;
                    let at = tree
                        .chunk(parent)
                        .children
                        .iter()
                        .position(|c| *c == id)
                        .expect("Cannot restore: saved chunk is detached from the tree");
                    self.stack.push(at);
                    id = parent;
                }
                self.stack.reverse();

                self.chunk = chunk;
                self.index = index as isize;
                self.cached_node = Some(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testitem::TestItem;

    // Builds [0, [1, 2, [3, 4]], 5] and returns (tree, outer, inner).
    fn nested_tree() -> (ChunkTree<TestItem>, NodeId, NodeId) {
        let mut tree = ChunkTree::new();
        let leaves: Vec<NodeId> = (0..6u64)
            .map(|k| tree.alloc_leaf(k, TestItem::new(k)))
            .collect();

        let outer = tree.alloc_chunk(NodeId::ROOT);
        let inner = tree.alloc_chunk(outer);
        tree.chunk_mut(inner).children.extend([leaves[3], leaves[4]]);
        tree.chunk_mut(outer)
            .children
            .extend([leaves[1], leaves[2], inner]);
        tree.chunk_mut(NodeId::ROOT)
            .children
            .extend([leaves[0], outer, leaves[5]]);
        (tree, outer, inner)
    }

    fn read_all(tree: &ChunkTree<TestItem>) -> Vec<u64> {
        let mut cursor = Cursor::new();
        let mut keys = vec![];
        while let Some(leaf) = cursor.read_leaf(tree) {
            keys.push(tree.leaf(leaf).key);
        }
        keys
    }

    #[test]
    fn forward_traversal() {
        let (tree, ..) = nested_tree();
        assert_eq!(read_all(&tree), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn backward_traversal() {
        let (tree, ..) = nested_tree();
        let mut cursor = Cursor::new();
        while cursor.read_leaf(&tree).is_some() {}
        assert!(cursor.reached_end);

        let mut keys = vec![];
        while let Some(leaf) = cursor.return_to_previous_leaf(&tree) {
            keys.push(tree.leaf(leaf).key);
        }
        assert_eq!(keys, vec![5, 4, 3, 2, 1, 0]);
        // Parked at the start sentinel; staying put is fine.
        assert_eq!(cursor.index, -1);
        assert!(cursor.return_to_previous_leaf(&tree).is_none());
    }

    #[test]
    fn forward_then_back_is_stable() {
        let (tree, ..) = nested_tree();
        let mut cursor = Cursor::new();
        let a = cursor.read_leaf(&tree).unwrap();
        let b = cursor.read_leaf(&tree).unwrap();
        assert_eq!(cursor.return_to_previous_leaf(&tree), Some(a));
        assert_eq!(cursor.read_leaf(&tree), Some(b));
    }

    #[test]
    fn save_restore_roundtrip() {
        let (tree, ..) = nested_tree();
        let mut cursor = Cursor::new();
        for _ in 0..4 {
            cursor.read_leaf(&tree);
        }
        let saved = cursor.save(&tree);
        let here = (cursor.chunk, cursor.index, cursor.stack.clone());

        while cursor.read_leaf(&tree).is_some() {}
        cursor.restore(&tree, saved);
        assert_eq!((cursor.chunk, cursor.index, cursor.stack.clone()), here);
        assert_eq!(tree.leaf(cursor.node_at_pointer(&tree).unwrap()).key, 3);
    }

    #[test]
    fn empty_tree_reads_nothing() {
        let tree: ChunkTree<TestItem> = ChunkTree::new();
        let mut cursor = Cursor::new();
        assert!(cursor.read_leaf(&tree).is_none());
        assert!(cursor.reached_end);
        assert!(cursor.return_to_previous_leaf(&tree).is_none());
        assert!(!cursor.reached_end);
    }

    #[test]
    #[should_panic(expected = "Cannot read past the end")]
    fn read_past_end_panics() {
        let tree: ChunkTree<TestItem> = ChunkTree::new();
        let mut cursor = Cursor::new();
        assert!(cursor.read_leaf(&tree).is_none());
        cursor.read_leaf(&tree);
    }

    #[test]
    #[should_panic(expected = "Cannot exit the root")]
    fn exit_root_panics() {
        let (tree, ..) = nested_tree();
        let mut cursor = Cursor::new();
        cursor.exit_chunk(&tree);
    }

    #[test]
    #[should_panic(expected = "Expected chunk - found leaf")]
    fn enter_leaf_panics() {
        let (tree, ..) = nested_tree();
        let mut cursor = Cursor::new();
        cursor.read_leaf(&tree); // on leaf 0
        cursor.enter_chunk(&tree, false);
    }

    #[test]
    #[should_panic(expected = "no longer in its chunk")]
    fn restore_removed_node_panics() {
        let (mut tree, outer, _) = nested_tree();
        let mut cursor = Cursor::new();
        cursor.read_leaf(&tree);
        cursor.read_leaf(&tree); // on leaf 1 inside `outer`
        let saved = cursor.save(&tree);

        let gone = tree.chunk_mut(outer).children.remove(0);
        tree.free_node(gone);
        cursor.restore(&tree, saved);
    }
}
