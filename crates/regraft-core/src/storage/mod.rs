//! # Storage Backends
//!
//! Local calculation stores:
//! - `Memory`: [`MemoryStore`] (fast, volatile)
//! - `Persistent`: [`RedbStore`] (disk-backed, ACID)

mod redb_store;

pub use redb_store::RedbStore;

use crate::calc::CalculationNode;
use crate::ident::Identifier;
use crate::store::{CalculationStore, MemoryStore};
use crate::types::{RegraftError, StoreError};
use std::path::Path;

/// A local store, either in memory or on disk.
#[derive(Debug)]
pub enum StoreBackend {
    /// In-memory store (fast, volatile).
    Memory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::Memory(MemoryStore::new())
    }
}

impl StoreBackend {
    /// Open (or create) a persistent backend at `path`.
    pub fn open_redb(path: impl AsRef<Path>) -> Result<Self, RegraftError> {
        RedbStore::open(path).map(Self::Persistent)
    }

    /// Whether this backend survives a restart.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    /// Number of stored calculations.
    pub fn len(&self) -> Result<u64, StoreError> {
        match self {
            Self::Memory(store) => Ok(store.len() as u64),
            Self::Persistent(store) => store.len(),
        }
    }

    /// Whether the backend holds no calculations.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl CalculationStore for StoreBackend {
    fn fetch_calculation(&mut self, id: &Identifier) -> Result<CalculationNode, StoreError> {
        match self {
            Self::Memory(store) => store.fetch_calculation(id),
            Self::Persistent(store) => store.fetch_calculation(id),
        }
    }

    fn post_calculation(&mut self, node: &CalculationNode) -> Result<Identifier, StoreError> {
        match self {
            Self::Memory(store) => store.post_calculation(node),
            Self::Persistent(store) => store.post_calculation(node),
        }
    }

    fn lookup_calculation(
        &mut self,
        node: &CalculationNode,
    ) -> Result<Option<Identifier>, StoreError> {
        match self {
            Self::Memory(store) => store.lookup_calculation(node),
            Self::Persistent(store) => store.lookup_calculation(node),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn memory_and_redb_assign_the_same_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = StoreBackend::default();
        let mut redb = StoreBackend::open_redb(dir.path().join("calcs.db")).unwrap();
        let node = CalculationNode::reference("abc");

        assert_eq!(
            memory.post_calculation(&node).unwrap(),
            redb.post_calculation(&node).unwrap()
        );
        assert!(!memory.is_persistent());
        assert!(redb.is_persistent());
        assert_eq!(memory.len().unwrap(), 1);
        assert!(!redb.is_empty().unwrap());
    }
}
