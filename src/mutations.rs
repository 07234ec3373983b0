//! Mutation of the chunk tree at a cursor: removal, adjacency-aware
//! insertion, and the chunking rules that keep the tree balanced.

use crate::cursor::Cursor;
use crate::tree::{ChunkKey, ChunkTree, NodeId, NodeList};
use crate::ChunkItem;

impl<T: ChunkItem> ChunkTree<T> {
    /// Delete the node under the cursor, leaving the cursor one position to
    /// the left (possibly at `-1`). A chunk emptied by the removal is
    /// deleted too, recursively upward.
    pub(crate) fn remove_at(&mut self, cursor: &mut Cursor) {
        assert!(cursor.index >= 0, "Cannot remove: no node under the cursor");

        let index = cursor.index as usize;
        cursor.index -= 1;
        cursor.clear_cache();
        let removed = self.chunk_mut(cursor.chunk).children.remove(index);
        self.free_node(removed);

        if !cursor.chunk.is_root() && self.chunk(cursor.chunk).children.is_empty() {
            cursor.exit_chunk(self);
            self.remove_at(cursor);
        } else {
            self.invalidate_at(cursor);
            if self.debug {
                self.check_with_cursor(cursor);
            }
        }
    }

    /// Insert `leaves` immediately after the cursor, leaving the cursor on
    /// the last inserted leaf.
    ///
    /// Before falling back to a bulk insert, two adjacency passes try to
    /// fill existing chunks at the seam: chunks that end at the insertion
    /// point take leaves from the front of the list, and chunks that start
    /// right after it take leaves from the back. Each pass carries the
    /// depth of the chunks it has stepped out of, so bulk-chunked leaves
    /// are wrapped at least as deep as the subtrees they end up beside.
    pub(crate) fn insert_after(&mut self, cursor: &mut Cursor, leaves: &[NodeId]) {
        assert!(!leaves.is_empty(), "Cannot insert an empty list of leaves");
        let chunk_size = self.chunk_size;
        let mut lo = 0;
        let mut hi = leaves.len();

        // Left adjacency: the cursor sits at the end of a chunk.
        let mut before_depth = 0;
        while !cursor.chunk.is_root() && cursor.at_last_index(self) {
            let capacity = chunk_size.saturating_sub(self.chunk(cursor.chunk).children.len());
            let take = capacity.min(hi - lo);
            if take > 0 {
                self.raw_insert_after(cursor, &leaves[lo..lo + take], before_depth);
                lo += take;
                if lo == hi {
                    return self.finish_insert(cursor);
                }
            }
            cursor.exit_chunk(self);
            before_depth += 1;
        }

        // Right adjacency: the next leaf starts a chunk. Splices anchor at
        // the front of that chunk, so the back of the list stays in order.
        let saved = cursor.save(self);
        let mut after_depth = 0;
        let mut final_pointer = None;
        if cursor.read_leaf(self).is_some() {
            while !cursor.chunk.is_root() && cursor.index == 0 {
                let capacity = chunk_size.saturating_sub(self.chunk(cursor.chunk).children.len());
                let take = capacity.min(hi - lo);
                if take > 0 {
                    cursor.index = -1;
                    cursor.clear_cache();
                    self.raw_insert_after(cursor, &leaves[hi - take..hi], after_depth);
                    hi -= take;
                    // The overall last leaf lives in the first batch taken
                    // from the back; remember where it landed.
                    if final_pointer.is_none() {
                        final_pointer = Some(cursor.save(self));
                    }
                    if lo == hi {
                        break;
                    }
                }
                cursor.exit_chunk(self);
                after_depth += 1;
            }
        }

        cursor.restore(self, saved);
        if lo < hi {
            self.raw_insert_after(cursor, &leaves[lo..hi], before_depth.max(after_depth));
        }
        if let Some(final_pointer) = final_pointer {
            cursor.restore(self, final_pointer);
        }
        self.finish_insert(cursor)
    }

    /// Insert `leaves` immediately before the leaf under the cursor,
    /// leaving the cursor back on that leaf.
    pub(crate) fn insert_before(&mut self, cursor: &mut Cursor, leaves: &[NodeId]) {
        cursor.return_to_previous_leaf(self);
        self.insert_after(cursor, leaves);
        cursor.read_leaf(self);
    }

    /// Swap a new handle into the leaf under the cursor. The key is
    /// unchanged by definition; only key-matched items take this path.
    pub(crate) fn update_leaf_item(&mut self, cursor: &Cursor, leaf: NodeId, item: T) {
        self.leaf_mut(leaf).item = item;
        self.invalidate_at(cursor);
        if self.debug {
            self.check_with_cursor(cursor);
        }
    }

    fn finish_insert(&mut self, cursor: &mut Cursor) {
        // Land on the last inserted *leaf*, not a chunk wrapping it.
        if let Some(node) = cursor.node_at_pointer(self) {
            if self.is_chunk(node) {
                cursor.descend_to_last_leaf(self);
            }
        }
        if self.debug {
            self.check_with_cursor(cursor);
        }
    }

    /// The chunking primitive: splice `leaves` right after the cursor,
    /// grouped into chunks of a computed depth, and advance the cursor onto
    /// the last spliced node.
    ///
    /// The depth is the smallest `d` with `C^(d+1) >= len(children) +
    /// len(leaves)`, floored by `min_depth`. Without the floor, repeated
    /// small appends at the edge of a deep tree would pile shallow chunks
    /// next to deep ones.
    fn raw_insert_after(&mut self, cursor: &mut Cursor, leaves: &[NodeId], min_depth: usize) {
        let chunk_size = self.chunk_size;
        let new_total = self.chunk(cursor.chunk).children.len() + leaves.len();

        let mut depth = 0;
        let mut span = chunk_size;
        while span < new_total {
            span *= chunk_size;
            depth += 1;
        }
        depth = depth.max(min_depth);

        let inserted: NodeList = if depth == 0 {
            leaves.iter().copied().collect()
        } else {
            let per_chunk = chunk_size.pow(depth as u32);
            self.group_into_chunks(leaves, cursor.chunk, per_chunk)
        };

        let at = (cursor.index + 1) as usize;
        let last = *inserted.last().unwrap();
        cursor.index += inserted.len() as isize;
        cursor.cached_node = Some(last);
        self.chunk_mut(cursor.chunk)
            .children
            .insert_from_slice(at, &inserted);
        self.invalidate_at(cursor);
    }

    /// Build a balanced chunk tree over `leaves` by recursive subdivision:
    /// up to `C` slices of `per_chunk` leaves each, every slice wrapped in
    /// a fresh chunk. `per_chunk == 1` bottoms out at the leaves
    /// themselves.
    fn group_into_chunks(
        &mut self,
        leaves: &[NodeId],
        parent: NodeId,
        per_chunk: usize,
    ) -> NodeList {
        if per_chunk == 1 {
            return leaves.iter().copied().collect();
        }
        let mut out = NodeList::new();
        for slice in leaves.chunks(per_chunk) {
            let chunk = self.alloc_chunk(parent);
            let children = self.group_into_chunks(slice, chunk, per_chunk / self.chunk_size);
            self.chunk_mut(chunk).children = children;
            // A fresh chunk's entire descendant set is new.
            let key = self.chunk(chunk).key;
            self.modified_chunks.insert(key);
            out.push(chunk);
        }
        out
    }

    /// Mark every chunk from the cursor's chunk up to (but excluding) the
    /// root as modified. When the cursor rests at the root itself the root
    /// marker is recorded instead: the top-level child list changed.
    pub(crate) fn invalidate_at(&mut self, cursor: &Cursor) {
        let mut id = cursor.chunk;
        if id.is_root() {
            self.modified_chunks.insert(ChunkKey::ROOT);
            return;
        }
        while !id.is_root() {
            let chunk = self.chunk(id);
            let (key, parent) = (chunk.key, chunk.parent);
            self.modified_chunks.insert(key);
            id = parent;
        }
    }
}
