//! Consistency checking and diagnostics.
//!
//! `check` walks the whole tree and asserts the structural invariants; the
//! mutators run it (plus cursor agreement checks) after every call when the
//! `debug` reconcile option is set. With the option off nothing here runs,
//! so it has no observable effect on the runtime contract.

use std::collections::HashSet;
use std::mem::size_of;

use humansize::{format_size, BINARY};

use crate::cursor::Cursor;
use crate::tree::{ChunkKey, ChunkTree, Node, NodeId};
use crate::ChunkItem;

impl<T: ChunkItem> ChunkTree<T> {
    /// Walk the tree and assert its structural invariants: every parent
    /// link points back correctly, no chunk other than the root is empty,
    /// no live child references a freed slot, chunk keys are unique, and
    /// the arena accounts for every slot (reachable + free == allocated).
    pub fn check(&self) {
        let mut seen_keys = HashSet::new();
        let reachable = self.check_chunk(NodeId::ROOT, NodeId::default(), &mut seen_keys);
        assert_eq!(
            reachable + self.free.len(),
            self.nodes.len(),
            "tree is leaking arena slots"
        );
    }

    // Returns the number of reachable slots under (and including) `id`.
    fn check_chunk(
        &self,
        id: NodeId,
        expected_parent: NodeId,
        seen_keys: &mut HashSet<ChunkKey>,
    ) -> usize {
        let chunk = self.chunk(id);
        assert_eq!(chunk.parent, expected_parent, "chunk parent link is wrong");
        assert!(seen_keys.insert(chunk.key), "chunk key used twice");
        if !id.is_root() {
            assert!(!chunk.children.is_empty(), "non-root chunk is empty");
        }

        let mut count = 1;
        for &child in &chunk.children {
            match &self.nodes[child.0] {
                Node::Chunk(_) => count += self.check_chunk(child, id, seen_keys),
                Node::Leaf(_) => count += 1,
                Node::Free => panic!("chunk references a freed slot"),
            }
        }
        count
    }

    /// `check`, plus agreement between the cursor and the tree.
    pub(crate) fn check_with_cursor(&self, cursor: &Cursor) {
        self.check();

        let chunk = self.chunk(cursor.chunk);
        assert!(cursor.index >= -1, "cursor index underflow");
        if !cursor.reached_end {
            assert!(
                cursor.index < chunk.children.len() as isize,
                "cursor index out of range"
            );
        }

        // The index stack must match a fresh parent-link walk.
        let mut path = Vec::new();
        let mut id = cursor.chunk;
        while !id.is_root() {
            let parent = self.chunk(id).parent;
            let at = self
                .chunk(parent)
                .children
                .iter()
                .position(|c| *c == id)
                .expect("cursor chunk is detached from the tree");
            path.push(at);
            id = parent;
        }
        path.reverse();
        assert_eq!(&cursor.stack[..], &path[..], "cursor stack does not match the tree");

        if let Some(cached) = cursor.cached_node {
            assert!(cursor.index >= 0, "cursor cache set at the -1 position");
            assert_eq!(
                chunk.children[cursor.index as usize], cached,
                "cursor cache is stale"
            );
        }
    }

    #[allow(unused)]
    pub fn print_tree(&self) {
        eprintln!("Tree with {} top-level children:", self.children().len());
        self.print_node_inner(NodeId::ROOT, 1);
    }

    fn print_node_inner(&self, id: NodeId, depth: usize) {
        for &child in &self.chunk(id).children {
            for _ in 0..depth {
                eprint!("  ");
            }
            match &self.nodes[child.0] {
                Node::Chunk(c) => {
                    eprintln!("Chunk {:?} ({} children)", c.key, c.children.len());
                    self.print_node_inner(child, depth + 1);
                }
                Node::Leaf(l) => eprintln!("Leaf {:?}", l.key),
                Node::Free => eprintln!("(freed slot!)"),
            }
        }
    }

    #[allow(unused)]
    pub fn print_stats(&self, name: &str) {
        let (chunks, leaves) = self.count_nodes();
        let slot_bytes = self.nodes.capacity() * size_of::<Node<T>>();

        println!("-------- Chunk tree {} stats --------", name);
        println!("{} chunks / {} leaves, depth {}", chunks, leaves, self.depth());
        println!(
            "{} arena slots ({} free) using {}",
            self.nodes.len(),
            self.free.len(),
            format_size(slot_bytes, BINARY)
        );
        println!(
            "{} modified chunks, {} moved keys",
            self.modified_chunks.len(),
            self.moved_node_keys.len()
        );
    }
}

/// Renders the tree's shape with leaf keys, e.g. `"[0 [1 2] 3]"`. Test
/// helper.
#[cfg(test)]
pub(crate) fn shape_of<T: ChunkItem>(tree: &ChunkTree<T>) -> String {
    let mut out = String::new();
    write_children(tree, NodeId::ROOT, &mut out);
    out
}

#[cfg(test)]
fn write_children<T: ChunkItem>(tree: &ChunkTree<T>, id: NodeId, out: &mut String) {
    use std::fmt::Write as _;

    out.push('[');
    for (i, &child) in tree.chunk(id).children.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match &tree.nodes[child.0] {
            Node::Chunk(_) => write_children(tree, child, out),
            Node::Leaf(l) => {
                let _ = write!(out, "{:?}", l.key);
            }
            Node::Free => out.push('!'),
        }
    }
    out.push(']');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testitem::TestItem;

    #[test]
    fn check_accepts_a_valid_tree() {
        let mut tree: ChunkTree<TestItem> = ChunkTree::new();
        let chunk = tree.alloc_chunk(NodeId::ROOT);
        let leaf = tree.alloc_leaf(1, TestItem::new(1));
        tree.chunk_mut(chunk).children.push(leaf);
        tree.chunk_mut(NodeId::ROOT).children.push(chunk);
        tree.check();
    }

    #[test]
    #[should_panic(expected = "parent link is wrong")]
    fn check_catches_bad_parent_links() {
        let mut tree: ChunkTree<TestItem> = ChunkTree::new();
        let a = tree.alloc_chunk(NodeId::ROOT);
        let b = tree.alloc_chunk(a); // parent claims `a`...
        let leaf = tree.alloc_leaf(1, TestItem::new(1));
        tree.chunk_mut(b).children.push(leaf);
        tree.free_node(a);
        tree.chunk_mut(NodeId::ROOT).children.push(b); // ...but lives at the root
        tree.check();
    }

    #[test]
    #[should_panic(expected = "non-root chunk is empty")]
    fn check_catches_empty_chunks() {
        let mut tree: ChunkTree<TestItem> = ChunkTree::new();
        let chunk = tree.alloc_chunk(NodeId::ROOT);
        tree.chunk_mut(NodeId::ROOT).children.push(chunk);
        tree.check();
    }

    #[test]
    #[should_panic(expected = "leaking arena slots")]
    fn check_catches_leaked_slots() {
        let mut tree: ChunkTree<TestItem> = ChunkTree::new();
        tree.alloc_leaf(1, TestItem::new(1)); // never linked in
        tree.check();
    }
}
