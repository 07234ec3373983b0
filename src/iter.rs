use smallvec::{smallvec, SmallVec};

use crate::tree::{ChunkTree, NodeId};
use crate::ChunkItem;

/// In-order iterator over a tree's leaves, yielding `(key, item)` pairs.
#[derive(Debug)]
pub struct Leaves<'a, T: ChunkItem> {
    tree: &'a ChunkTree<T>,
    /// (chunk, next child index) for every level currently being walked.
    stack: SmallVec<[(NodeId, usize); 8]>,
}

impl<T: ChunkItem> ChunkTree<T> {
    /// Iterate the leaves in document order.
    pub fn leaves(&self) -> Leaves<'_, T> {
        Leaves {
            tree: self,
            stack: smallvec![(NodeId::ROOT, 0)],
        }
    }
}

impl<'a, T: ChunkItem> Iterator for Leaves<'a, T> {
    type Item = (&'a T::Key, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (chunk, index) = *self.stack.last()?;
            let children = &self.tree.chunk(chunk).children;
            if index >= children.len() {
                self.stack.pop();
                continue;
            }
            self.stack.last_mut().unwrap().1 += 1;

            let child = children[index];
            if self.tree.is_chunk(child) {
                self.stack.push((child, 0));
            } else {
                let leaf = self.tree.leaf(child);
                return Some((&leaf.key, &leaf.item));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testitem::TestItem;
    use crate::tree::{ChunkTree, NodeId};

    #[test]
    fn empty_tree_has_no_leaves() {
        let tree: ChunkTree<TestItem> = ChunkTree::new();
        assert!(tree.leaves().next().is_none());
    }

    #[test]
    fn leaves_come_out_in_document_order() {
        // [0, [1, [2, 3]], 4]
        let mut tree: ChunkTree<TestItem> = ChunkTree::new();
        let leaves: Vec<NodeId> = (0..5u64)
            .map(|k| tree.alloc_leaf(k, TestItem::new(k)))
            .collect();
        let outer = tree.alloc_chunk(NodeId::ROOT);
        let inner = tree.alloc_chunk(outer);
        tree.chunk_mut(inner).children.extend([leaves[2], leaves[3]]);
        tree.chunk_mut(outer).children.extend([leaves[1], inner]);
        tree.chunk_mut(NodeId::ROOT)
            .children
            .extend([leaves[0], outer, leaves[4]]);

        let keys: Vec<u64> = tree.leaves().map(|(key, _)| *key).collect();
        assert_eq!(keys, vec![0, 1, 2, 3, 4]);
    }
}
