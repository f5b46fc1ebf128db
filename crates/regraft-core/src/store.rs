//! # Calculation Stores
//!
//! The engine reaches stored calculations only through [`CalculationStore`].
//! A remote client, a local database and a pair of plain closures can all
//! stand behind it.
//!
//! Stores in this crate are content-addressed: the identifier of a posted
//! node is derived from its JSON encoding, so posting equal content twice
//! yields the same identifier.

use crate::calc::CalculationNode;
use crate::ident::{Identifier, Service};
use crate::primitives::IDENTIFIER_BYTES;
use crate::types::StoreError;
use std::collections::BTreeMap;

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Read and append access to a calculation store.
///
/// Each call is one synchronous request. Stores never mutate or delete a
/// calculation once it has an identifier.
pub trait CalculationStore {
    /// Fetch the calculation stored under `id`.
    fn fetch_calculation(&mut self, id: &Identifier) -> Result<CalculationNode, StoreError>;

    /// Store `node` and return its identifier.
    fn post_calculation(&mut self, node: &CalculationNode) -> Result<Identifier, StoreError>;

    /// The identifier `node` already has in this store, if any.
    ///
    /// Stores that cannot answer without posting report `None`.
    fn lookup_calculation(
        &mut self,
        _node: &CalculationNode,
    ) -> Result<Option<Identifier>, StoreError> {
        Ok(None)
    }
}

impl<S: CalculationStore + ?Sized> CalculationStore for &mut S {
    fn fetch_calculation(&mut self, id: &Identifier) -> Result<CalculationNode, StoreError> {
        (**self).fetch_calculation(id)
    }

    fn post_calculation(&mut self, node: &CalculationNode) -> Result<Identifier, StoreError> {
        (**self).post_calculation(node)
    }

    fn lookup_calculation(
        &mut self,
        node: &CalculationNode,
    ) -> Result<Option<Identifier>, StoreError> {
        (**self).lookup_calculation(node)
    }
}

// =============================================================================
// CLOSURE ADAPTER
// =============================================================================

/// A store assembled from a fetch closure and a post closure.
pub struct FnStore<F, P> {
    fetch: F,
    post: P,
}

impl<F, P> FnStore<F, P>
where
    F: FnMut(&Identifier) -> Result<CalculationNode, StoreError>,
    P: FnMut(&CalculationNode) -> Result<Identifier, StoreError>,
{
    /// Pair `fetch` and `post` into a store.
    pub fn new(fetch: F, post: P) -> Self {
        Self { fetch, post }
    }
}

impl<F, P> CalculationStore for FnStore<F, P>
where
    F: FnMut(&Identifier) -> Result<CalculationNode, StoreError>,
    P: FnMut(&CalculationNode) -> Result<Identifier, StoreError>,
{
    fn fetch_calculation(&mut self, id: &Identifier) -> Result<CalculationNode, StoreError> {
        (self.fetch)(id)
    }

    fn post_calculation(&mut self, node: &CalculationNode) -> Result<Identifier, StoreError> {
        (self.post)(node)
    }
}

// =============================================================================
// CONTENT ADDRESSING
// =============================================================================

/// The identifier a content-addressed store assigns to `node`.
///
/// BLAKE3 over the JSON encoding, truncated and stamped as a calculation.
pub fn content_id(node: &CalculationNode) -> Result<Identifier, StoreError> {
    let bytes = serde_json::to_vec(node).map_err(|e| StoreError::Rejected(e.to_string()))?;
    let digest = blake3::hash(&bytes);
    let mut body = [0u8; IDENTIFIER_BYTES];
    body.copy_from_slice(&digest.as_bytes()[..IDENTIFIER_BYTES]);
    Ok(Identifier::forge(Service::Calc, body))
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Volatile content-addressed store.
///
/// Counts every fetch and every post that reaches it, including failed
/// fetches.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    calculations: BTreeMap<Identifier, CalculationNode>,
    fetches: usize,
    posts: usize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `node` under an arbitrary identifier.
    ///
    /// Lets tests and imports seed identifiers that were issued elsewhere.
    /// Not counted as a post.
    pub fn insert(&mut self, id: Identifier, node: CalculationNode) {
        self.calculations.insert(id, node);
    }

    /// Post `node` without counting it. Returns its content identifier.
    pub fn seed(&mut self, node: CalculationNode) -> Result<Identifier, StoreError> {
        let id = content_id(&node)?;
        self.calculations.insert(id.clone(), node);
        Ok(id)
    }

    /// The calculation stored under `id`, without counting a fetch.
    #[must_use]
    pub fn get(&self, id: &Identifier) -> Option<&CalculationNode> {
        self.calculations.get(id)
    }

    /// Number of stored calculations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calculations.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calculations.is_empty()
    }

    /// Number of fetches served so far.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Number of posts accepted so far.
    #[must_use]
    pub fn posts(&self) -> usize {
        self.posts
    }
}

impl CalculationStore for MemoryStore {
    fn fetch_calculation(&mut self, id: &Identifier) -> Result<CalculationNode, StoreError> {
        self.fetches = self.fetches.saturating_add(1);
        self.calculations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn post_calculation(&mut self, node: &CalculationNode) -> Result<Identifier, StoreError> {
        self.posts = self.posts.saturating_add(1);
        let id = content_id(node)?;
        self.calculations
            .entry(id.clone())
            .or_insert_with(|| node.clone());
        Ok(id)
    }

    fn lookup_calculation(
        &mut self,
        node: &CalculationNode,
    ) -> Result<Option<Identifier>, StoreError> {
        let id = content_id(node)?;
        Ok(self.calculations.contains_key(&id).then_some(id))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn equal_content_gets_equal_identifier() {
        let mut store = MemoryStore::new();
        let a = store.post_calculation(&CalculationNode::value(1)).unwrap();
        let b = store.post_calculation(&CalculationNode::value(1)).unwrap();
        let c = store.post_calculation(&CalculationNode::value(2)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.len(), 2);
        assert_eq!(store.posts(), 3);
    }

    #[test]
    fn posted_identifiers_are_calculations() {
        let mut store = MemoryStore::new();
        let id = store.post_calculation(&CalculationNode::variable("x")).unwrap();
        assert_eq!(id.service(), Service::Calc);
    }

    #[test]
    fn fetch_missing_is_not_found() {
        let mut store = MemoryStore::new();
        let id = Identifier::new("nope");
        assert_eq!(
            store.fetch_calculation(&id),
            Err(StoreError::NotFound(id.clone()))
        );
        assert_eq!(store.fetches(), 1);
    }

    #[test]
    fn lookup_reports_existing_content_only() {
        let mut store = MemoryStore::new();
        let node = CalculationNode::value("x");
        assert_eq!(store.lookup_calculation(&node).unwrap(), None);
        let id = store.seed(node.clone()).unwrap();
        assert_eq!(store.lookup_calculation(&node).unwrap(), Some(id));
        assert_eq!(store.posts(), 0);
    }

    #[test]
    fn fn_store_forwards_calls() {
        let mut fetched = Vec::new();
        let mut store = FnStore::new(
            |id: &Identifier| {
                fetched.push(id.clone());
                Ok(CalculationNode::value(7))
            },
            |_: &CalculationNode| Ok(Identifier::new("posted")),
        );
        assert_eq!(
            store.fetch_calculation(&Identifier::new("a")).unwrap(),
            CalculationNode::value(7)
        );
        assert_eq!(
            store.post_calculation(&CalculationNode::value(7)).unwrap(),
            Identifier::new("posted")
        );
        assert_eq!(store.lookup_calculation(&CalculationNode::value(7)).unwrap(), None);
        drop(store);
        assert_eq!(fetched, vec![Identifier::new("a")]);
    }
}
