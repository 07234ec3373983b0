//! A chunked tree over a flat, ordered list of child items.
//!
//! Rendering a very large list of children as a single flat sequence makes
//! every edit O(n) for the consumer: one inserted paragraph forces the whole
//! sibling list to be diffed and re-painted. This crate maintains a balanced
//! tree of bounded-fanout chunks over the flat list instead, and reconciles
//! that tree in place whenever the desired list changes. Afterwards the
//! leaves, read left to right, equal the new list, and
//! [`ChunkTree::modified_chunks`] names exactly the chunks a renderer has to
//! revisit.
//!
//! Items are opaque handles with identity semantics (see [`ChunkItem`]); an
//! external resolver maps each handle to a stable key so that an item which
//! was rewritten in place (new handle, same key) is updated rather than
//! removed and re-inserted.
//!
//! ```rust
//! use chunk_tree::testitem::TestItem;
//! use chunk_tree::{ChunkTree, ReconcileOptions};
//!
//! let children: Vec<TestItem> = (0..28).map(TestItem::new).collect();
//!
//! let mut tree = ChunkTree::new();
//! tree.reconcile(&children, &ReconcileOptions::chunk_size(3), TestItem::key, &mut ());
//!
//! assert!(tree.leaves().map(|(_, item)| item.key()).eq(0..28));
//! // 28 items with a fanout of 3 need three chunk layers.
//! assert_eq!(tree.depth(), 3);
//! ```

mod cursor;
mod debug;
mod iter;
mod mutations;
mod reconcile;
mod registry;
pub mod testitem;
mod tree;

use std::fmt::Debug;
use std::hash::Hash;

pub use iter::Leaves;
pub use reconcile::{ChangeListener, ReconcileOptions};
pub use registry::TreeRegistry;
pub use tree::{ChunkKey, ChunkTree, NodeId, NodeRef};

/// The fanout bound used when [`ReconcileOptions`] doesn't specify one.
/// Small enough to exercise the chunking paths in debug builds, large enough
/// to keep real sibling lists shallow.
pub const DEFAULT_CHUNK_SIZE: usize = 16;

/// An opaque handle to one item in the desired children sequence.
///
/// Handles compare by *identity*, not by value: [`same_item`] must return
/// true only when both handles refer to the same underlying object. A
/// consumer that rewrites an item produces a new handle with the same key;
/// the reconciler detects this through the key resolver and swaps the handle
/// into the existing leaf instead of deleting and re-inserting it.
///
/// [`same_item`]: ChunkItem::same_item
pub trait ChunkItem: Clone + Debug {
    /// The stable identity token resolved for this item by the external
    /// key resolver. Two live items never share a key.
    type Key: Clone + Eq + Hash + Debug;

    /// Identity equality.
    fn same_item(&self, other: &Self) -> bool;
}
