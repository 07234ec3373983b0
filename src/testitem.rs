//! A simple item handle for tests, examples and fuzzing.

use std::fmt;
use std::rc::Rc;

use crate::ChunkItem;

/// An `Rc`-backed item handle. Identity lives in the allocation
/// ([`same_item`](ChunkItem::same_item) is pointer equality), while the key
/// stays stable across rewrites: [`TestItem::revised`] produces a fresh
/// handle for the same logical item, which is exactly what a consumer
/// editing an item in place does.
#[derive(Clone)]
pub struct TestItem(Rc<Data>);

struct Data {
    key: u64,
    revision: u32,
}

impl TestItem {
    pub fn new(key: u64) -> Self {
        Self::revised(key, 0)
    }

    /// A rewritten rendition of the item: same key, new handle.
    pub fn revised(key: u64, revision: u32) -> Self {
        TestItem(Rc::new(Data { key, revision }))
    }

    pub fn key(&self) -> u64 {
        self.0.key
    }

    pub fn revision(&self) -> u32 {
        self.0.revision
    }
}

impl fmt::Debug for TestItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestItem({}v{})", self.0.key, self.0.revision)
    }
}

impl ChunkItem for TestItem {
    type Key = u64;

    fn same_item(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
