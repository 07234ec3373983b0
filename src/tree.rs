use std::collections::HashSet;

use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{ChunkItem, DEFAULT_CHUNK_SIZE};

/// Index of a node slot in the tree's arena.
///
/// Slots are reused after a node is freed, so a `NodeId` is only meaningful
/// while the node it was obtained for is still in the tree. Stable identity
/// across reconciliations is what [`ChunkKey`] and leaf keys are for.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub(crate) usize);

impl Default for NodeId {
    fn default() -> Self {
        Self(usize::MAX)
    }
}

impl NodeId {
    /// The root is always slot 0.
    pub(crate) const ROOT: NodeId = NodeId(0);

    pub fn exists(&self) -> bool {
        self.0 != usize::MAX
    }

    pub(crate) fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

/// Stable identity of a chunk. Assigned when the chunk is created and never
/// reused after it is deleted, so downstream consumers can key re-render
/// state on it.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChunkKey(pub(crate) u64);

impl ChunkKey {
    /// Stands in for the root in [`ChunkTree::modified_chunks`]. The root
    /// carries no user-visible key of its own; seeing this value means the
    /// top-level child list changed.
    pub const ROOT: ChunkKey = ChunkKey(0);
}

pub(crate) type NodeList = SmallVec<[NodeId; 8]>;

#[derive(Debug, Clone)]
pub(crate) struct Chunk {
    pub(crate) key: ChunkKey,
    /// Back-reference for upward traversal only; the arena owns the node.
    pub(crate) parent: NodeId,
    pub(crate) children: NodeList,
}

#[derive(Debug, Clone)]
pub(crate) struct Leaf<T: ChunkItem> {
    pub(crate) key: T::Key,
    pub(crate) item: T,
}

#[derive(Debug, Clone)]
pub(crate) enum Node<T: ChunkItem> {
    Chunk(Chunk),
    Leaf(Leaf<T>),
    /// Slot is on the free list. Reaching one of these through a live id is
    /// a bug, and the accessors below turn it into a panic.
    Free,
}

/// Read-only view of a node, for consumers walking the tree.
#[derive(Debug)]
pub enum NodeRef<'a, T: ChunkItem> {
    Chunk {
        key: ChunkKey,
        children: &'a [NodeId],
    },
    Leaf {
        key: &'a T::Key,
        item: &'a T,
    },
}

/// A tree of bounded-fanout chunks over an ordered list of leaf items.
///
/// The root is a chunk-shaped node whose top-level child list is allowed to
/// grow past the fanout bound; all other chunks are created at or below it
/// by the chunking rules. Mutation happens through reconciliation
/// ([`ChunkTree::reconcile`]); the read surface is [`children`],
/// [`get`], [`leaves`], [`modified_chunks`] and [`moved_node_keys`].
///
/// [`children`]: ChunkTree::children
/// [`get`]: ChunkTree::get
/// [`leaves`]: ChunkTree::leaves
/// [`modified_chunks`]: ChunkTree::modified_chunks
/// [`moved_node_keys`]: ChunkTree::moved_node_keys
#[derive(Debug, Clone)]
pub struct ChunkTree<T: ChunkItem> {
    pub(crate) nodes: Vec<Node<T>>,
    pub(crate) free: Vec<NodeId>,

    /// Chunks whose descendant set changed during the current
    /// reconciliation. Cleared when a reconciliation starts.
    pub(crate) modified_chunks: HashSet<ChunkKey>,

    /// Keys of leaves that moved between chunks.
    ///
    /// TODO: populate this when the key scan matches at a distance, so the
    /// second lookahead pass becomes a set probe instead of a linear scan.
    /// Until then only the clearing contract is implemented.
    pub(crate) moved_node_keys: HashSet<T::Key>,

    next_chunk_key: u64,

    /// Fanout bound, set from the options of the last reconciliation.
    pub(crate) chunk_size: usize,
    /// When set, every mutation re-validates the whole tree.
    pub(crate) debug: bool,
}

fn root_node<T: ChunkItem>() -> Node<T> {
    Node::Chunk(Chunk {
        key: ChunkKey::ROOT,
        parent: NodeId::default(),
        children: NodeList::new(),
    })
}

impl<T: ChunkItem> ChunkTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: vec![root_node()],
            free: vec![],
            modified_chunks: HashSet::new(),
            moved_node_keys: HashSet::new(),
            next_chunk_key: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
            debug: false,
        }
    }

    /// Drop every leaf and chunk, keeping the chunk key counter so keys are
    /// still never reused across the clear.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(root_node());
        self.free.clear();
        self.modified_chunks.clear();
        self.moved_node_keys.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.children().is_empty()
    }

    /// The top-level child list.
    pub fn children(&self) -> &[NodeId] {
        &self.chunk(NodeId::ROOT).children
    }

    pub fn get(&self, id: NodeId) -> NodeRef<'_, T> {
        match &self.nodes[id.0] {
            Node::Chunk(c) => NodeRef::Chunk {
                key: c.key,
                children: &c.children,
            },
            Node::Leaf(l) => NodeRef::Leaf {
                key: &l.key,
                item: &l.item,
            },
            Node::Free => panic!("Node {:?} has been freed", id),
        }
    }

    /// Chunks a renderer needs to revisit after the last reconciliation.
    /// [`ChunkKey::ROOT`] means the top-level child list itself changed.
    pub fn modified_chunks(&self) -> &HashSet<ChunkKey> {
        &self.modified_chunks
    }

    pub fn moved_node_keys(&self) -> &HashSet<T::Key> {
        &self.moved_node_keys
    }

    /// Number of chunk layers between the root and the leaves, following
    /// the leftmost spine. 0 for a flat or empty tree.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut id = match self.children().first() {
            Some(id) => *id,
            None => return 0,
        };
        while let Node::Chunk(c) = &self.nodes[id.0] {
            depth += 1;
            id = c.children[0];
        }
        depth
    }

    /// Returns (number of chunks excluding the root, number of leaves).
    pub fn count_nodes(&self) -> (usize, usize) {
        let mut num = (0, 0);
        self.count_nodes_inner(NodeId::ROOT, &mut num);
        num
    }

    fn count_nodes_inner(&self, id: NodeId, num: &mut (usize, usize)) {
        for &child in &self.chunk(id).children {
            if self.is_chunk(child) {
                num.0 += 1;
                self.count_nodes_inner(child, num);
            } else {
                num.1 += 1;
            }
        }
    }

    pub(crate) fn is_chunk(&self, id: NodeId) -> bool {
        matches!(&self.nodes[id.0], Node::Chunk(_))
    }

    pub(crate) fn chunk(&self, id: NodeId) -> &Chunk {
        match &self.nodes[id.0] {
            Node::Chunk(c) => c,
            Node::Leaf(_) => panic!("Expected chunk - found leaf"),
            Node::Free => panic!("Expected chunk - node has been freed"),
        }
    }

    pub(crate) fn chunk_mut(&mut self, id: NodeId) -> &mut Chunk {
        match &mut self.nodes[id.0] {
            Node::Chunk(c) => c,
            Node::Leaf(_) => panic!("Expected chunk - found leaf"),
            Node::Free => panic!("Expected chunk - node has been freed"),
        }
    }

    pub(crate) fn leaf(&self, id: NodeId) -> &Leaf<T> {
        match &self.nodes[id.0] {
            Node::Leaf(l) => l,
            Node::Chunk(_) => panic!("Expected leaf - found chunk"),
            Node::Free => panic!("Expected leaf - node has been freed"),
        }
    }

    pub(crate) fn leaf_mut(&mut self, id: NodeId) -> &mut Leaf<T> {
        match &mut self.nodes[id.0] {
            Node::Leaf(l) => l,
            Node::Chunk(_) => panic!("Expected leaf - found chunk"),
            Node::Free => panic!("Expected leaf - node has been freed"),
        }
    }

    fn alloc(&mut self, node: Node<T>) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.0] = node;
            id
        } else {
            self.nodes.push(node);
            NodeId(self.nodes.len() - 1)
        }
    }

    /// Allocate an empty chunk with a fresh key. The caller fills in the
    /// children before the chunk becomes reachable.
    pub(crate) fn alloc_chunk(&mut self, parent: NodeId) -> NodeId {
        let key = ChunkKey(self.next_chunk_key);
        self.next_chunk_key += 1;
        self.alloc(Node::Chunk(Chunk {
            key,
            parent,
            children: NodeList::new(),
        }))
    }

    pub(crate) fn alloc_leaf(&mut self, key: T::Key, item: T) -> NodeId {
        self.alloc(Node::Leaf(Leaf { key, item }))
    }

    pub(crate) fn free_node(&mut self, id: NodeId) {
        debug_assert!(!id.is_root());
        if let Node::Chunk(c) = &self.nodes[id.0] {
            debug_assert!(c.children.is_empty(), "Freed a chunk that still has children");
        }
        self.nodes[id.0] = Node::Free;
        self.free.push(id);
    }
}

impl<T: ChunkItem> Default for ChunkTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testitem::TestItem;

    #[test]
    fn slots_are_reused_but_keys_are_not() {
        let mut tree: ChunkTree<TestItem> = ChunkTree::new();
        let a = tree.alloc_chunk(NodeId::ROOT);
        let a_key = tree.chunk(a).key;
        tree.free_node(a);

        let b = tree.alloc_chunk(NodeId::ROOT);
        assert_eq!(a, b);
        assert_ne!(a_key, tree.chunk(b).key);
        assert_ne!(tree.chunk(b).key, ChunkKey::ROOT);
    }

    #[test]
    #[should_panic(expected = "has been freed")]
    fn freed_slots_are_poisoned() {
        let mut tree: ChunkTree<TestItem> = ChunkTree::new();
        let a = tree.alloc_chunk(NodeId::ROOT);
        tree.free_node(a);
        tree.chunk(a);
    }

    #[test]
    fn empty_tree_shape() {
        let tree: ChunkTree<TestItem> = ChunkTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.count_nodes(), (0, 0));
    }
}
