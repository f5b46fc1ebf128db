//! # Redb Calculation Store
//!
//! Disk-backed, content-addressed calculation storage using redb.
//!
//! Calculations are stored as JSON bytes keyed by their content identifier.
//! Seeded calculations (identifiers issued elsewhere) share the same table.

use crate::calc::CalculationNode;
use crate::ident::Identifier;
use crate::store::{CalculationStore, content_id};
use crate::types::{RegraftError, StoreError};
use redb::{Database, ReadableDatabase, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for calculations: identifier -> JSON-encoded node
const CALCULATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("calculations");

/// A disk-backed calculation store.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

/// Convert a redb error into a store transport failure.
fn transport(e: impl std::fmt::Display) -> StoreError {
    StoreError::Transport(e.to_string())
}

impl RedbStore {
    /// Open or create a calculation database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegraftError> {
        let db = Database::create(path.as_ref()).map_err(|e| RegraftError::Io(e.to_string()))?;

        // Initialize the table if it doesn't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| RegraftError::Io(e.to_string()))?;
            let _ = write_txn
                .open_table(CALCULATIONS)
                .map_err(|e| RegraftError::Io(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| RegraftError::Io(e.to_string()))?;
        }

        Ok(Self { db })
    }

    /// Number of stored calculations.
    pub fn len(&self) -> Result<u64, StoreError> {
        let read_txn = self.db.begin_read().map_err(transport)?;
        let table = read_txn.open_table(CALCULATIONS).map_err(transport)?;
        table.len().map_err(transport)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Place `node` under an arbitrary identifier.
    pub fn insert(&mut self, id: &Identifier, node: &CalculationNode) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(node).map_err(|e| StoreError::Rejected(e.to_string()))?;
        let write_txn = self.db.begin_write().map_err(transport)?;
        {
            let mut table = write_txn.open_table(CALCULATIONS).map_err(transport)?;
            table
                .insert(id.as_str(), bytes.as_slice())
                .map_err(transport)?;
        }
        write_txn.commit().map_err(transport)
    }

    /// Whether a calculation exists under `id`.
    pub fn contains(&self, id: &Identifier) -> Result<bool, StoreError> {
        let read_txn = self.db.begin_read().map_err(transport)?;
        let table = read_txn.open_table(CALCULATIONS).map_err(transport)?;
        Ok(table.get(id.as_str()).map_err(transport)?.is_some())
    }
}

impl CalculationStore for RedbStore {
    fn fetch_calculation(&mut self, id: &Identifier) -> Result<CalculationNode, StoreError> {
        let read_txn = self.db.begin_read().map_err(transport)?;
        let table = read_txn.open_table(CALCULATIONS).map_err(transport)?;
        let entry = table
            .get(id.as_str())
            .map_err(transport)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        serde_json::from_slice(entry.value()).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn post_calculation(&mut self, node: &CalculationNode) -> Result<Identifier, StoreError> {
        let id = content_id(node)?;
        if !self.contains(&id)? {
            self.insert(&id, node)?;
        }
        Ok(id)
    }

    fn lookup_calculation(
        &mut self,
        node: &CalculationNode,
    ) -> Result<Option<Identifier>, StoreError> {
        let id = content_id(node)?;
        Ok(self.contains(&id)?.then_some(id))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn post_then_fetch_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("calcs.db");
        let node = CalculationNode::function("acme", "math", "add", vec![CalculationNode::value(1)]);

        let id = {
            let mut store = RedbStore::open(&path).unwrap();
            store.post_calculation(&node).unwrap()
        };

        let mut store = RedbStore::open(&path).unwrap();
        assert_eq!(store.fetch_calculation(&id).unwrap(), node);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn posting_twice_stores_once() {
        let dir = tempdir().unwrap();
        let mut store = RedbStore::open(dir.path().join("calcs.db")).unwrap();
        let node = CalculationNode::value("x");
        let a = store.post_calculation(&node).unwrap();
        let b = store.post_calculation(&node).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.lookup_calculation(&node).unwrap(), Some(a));
    }

    #[test]
    fn missing_is_not_found() {
        let dir = tempdir().unwrap();
        let mut store = RedbStore::open(dir.path().join("calcs.db")).unwrap();
        assert!(store.is_empty().unwrap());
        let id = Identifier::new("missing");
        assert_eq!(store.fetch_calculation(&id), Err(StoreError::NotFound(id.clone())));
    }
}
