//! # Substitution Engine
//!
//! Rewrites a stored calculation graph so that every reference to `old`
//! points at `new` instead, without touching anything already stored.
//!
//! ## Resolution Rule
//!
//! For each identifier reached, in order:
//! 1. `old` resolves to `new`.
//! 2. Identifiers not issued by the calculation service resolve to themselves.
//! 3. An identifier already resolved in this run reuses its result.
//! 4. Otherwise the calculation is rewritten; if the rewrite equals the stored
//!    content the identifier resolves to itself, else the rewrite is posted
//!    and resolves to the new identifier.
//!
//! ## Phases
//!
//! A run first fetches every reachable calculation (plan), then rewrites and
//! posts (apply). Anything that makes the run fail during planning, such as a
//! `meta` node, a failed fetch or a reference cycle, is found before the first
//! post. Both phases walk the graph without recursing across references.
//!
//! ## Let Bindings
//!
//! Only the body of a `let` is rewritten. Bindings are carried over as they
//! are, even if they reference `old`.

use crate::calc::{
    ArrayCalc, CalculationNode, CastCalc, FunctionApplication, ItemCalc, LetCalc, ObjectCalc,
    PropertyCalc,
};
use crate::ident::{Identifier, Service, classify};
use crate::primitives::META_SUBSTITUTION_MESSAGE;
use crate::store::{CalculationStore, FnStore};
use crate::types::{RegraftError, StoreError};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// OUTCOME
// =============================================================================

/// Result of one substitution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionOutcome {
    /// Identifier of the rewritten root.
    pub result: Identifier,
    /// Calculations fetched from the store.
    pub fetched: usize,
    /// Calculations posted to the store.
    pub posted: usize,
}

impl SubstitutionOutcome {
    /// Whether the run left the root unchanged.
    #[must_use]
    pub fn is_unchanged(&self, root: &Identifier) -> bool {
        &self.result == root
    }
}

// =============================================================================
// SUBSTITUTION
// =============================================================================

/// A single `old -> new` substitution run.
///
/// Owns the memo cache for the run. The value is consumed by [`run`], so a
/// cache can never be reused after an error or for another substitution.
///
/// [`run`]: Substitution::run
#[derive(Debug)]
pub struct Substitution {
    old: Identifier,
    new: Identifier,
    /// Calculations fetched during planning, removed as they are rewritten.
    fetched: BTreeMap<Identifier, CalculationNode>,
    /// Memo cache: original identifier -> resolved identifier.
    results: BTreeMap<Identifier, Identifier>,
    /// Calculations on the current planning path.
    in_progress: BTreeSet<Identifier>,
    fetches: usize,
    posts: usize,
}

impl Substitution {
    /// Prepare a run replacing `old` with `new`.
    #[must_use]
    pub fn new(old: Identifier, new: Identifier) -> Self {
        Self {
            old,
            new,
            fetched: BTreeMap::new(),
            results: BTreeMap::new(),
            in_progress: BTreeSet::new(),
            fetches: 0,
            posts: 0,
        }
    }

    /// Substitute within the graph rooted at `root`.
    pub fn run<S: CalculationStore + ?Sized>(
        mut self,
        store: &mut S,
        root: &Identifier,
    ) -> Result<SubstitutionOutcome, RegraftError> {
        tracing::debug!(%root, old = %self.old, new = %self.new, "substitution started");

        let order = self.plan(store, root)?;
        self.apply(store, order)?;
        let result = self.resolved(root);

        tracing::info!(
            %root,
            %result,
            fetched = self.fetches,
            posted = self.posts,
            "substitution complete"
        );

        Ok(SubstitutionOutcome {
            result,
            fetched: self.fetches,
            posted: self.posts,
        })
    }

    /// Whether `id` is a calculation this run must look inside.
    fn is_expandable(&self, id: &Identifier) -> bool {
        id != &self.old && classify(id) == Service::Calc
    }

    // -------------------------------------------------------------------------
    // PLAN
    // -------------------------------------------------------------------------

    /// Fetch every calculation reachable from `root` exactly once.
    ///
    /// Returns the fetched identifiers in post-order: every calculation comes
    /// after all the calculations it references. The walk uses an explicit
    /// stack, so graph depth is bounded only by memory.
    fn plan<S: CalculationStore + ?Sized>(
        &mut self,
        store: &mut S,
        root: &Identifier,
    ) -> Result<Vec<Identifier>, RegraftError> {
        let mut order = Vec::new();
        let mut stack = Vec::new();
        if self.is_expandable(root) {
            stack.push(self.enter(store, root)?);
        }

        loop {
            let Some((_, children)) = stack.last_mut() else {
                break;
            };
            match children.next() {
                Some(child) => {
                    if self.in_progress.contains(&child) {
                        return Err(RegraftError::MalformedCalculation(format!(
                            "reference cycle through {child}"
                        )));
                    }
                    if self.is_expandable(&child) && !self.fetched.contains_key(&child) {
                        stack.push(self.enter(store, &child)?);
                    }
                }
                None => {
                    if let Some((id, _)) = stack.pop() {
                        self.in_progress.remove(&id);
                        order.push(id);
                    }
                }
            }
        }

        Ok(order)
    }

    /// Fetch `id` and mark it as being on the current path.
    fn enter<S: CalculationStore + ?Sized>(
        &mut self,
        store: &mut S,
        id: &Identifier,
    ) -> Result<(Identifier, std::vec::IntoIter<Identifier>), RegraftError> {
        tracing::debug!(%id, "fetching calculation");
        let node = store
            .fetch_calculation(id)
            .map_err(|e| RegraftError::read(id, e))?;
        self.fetches = self.fetches.saturating_add(1);

        let mut refs = Vec::new();
        collect_references(&node, &mut refs)?;

        self.fetched.insert(id.clone(), node);
        self.in_progress.insert(id.clone());
        Ok((id.clone(), refs.into_iter()))
    }

    // -------------------------------------------------------------------------
    // APPLY
    // -------------------------------------------------------------------------

    /// Rewrite each planned calculation, children before parents, posting
    /// those whose content changed.
    fn apply<S: CalculationStore + ?Sized>(
        &mut self,
        store: &mut S,
        order: Vec<Identifier>,
    ) -> Result<(), RegraftError> {
        for id in order {
            let Some(original) = self.fetched.remove(&id) else {
                continue;
            };
            let candidate = self.rewrite(&original)?;

            let result = if candidate == original {
                id.clone()
            } else {
                tracing::debug!(%id, "posting rewritten calculation");
                let posted = store
                    .post_calculation(&candidate)
                    .map_err(RegraftError::write)?;
                self.posts = self.posts.saturating_add(1);
                posted
            };
            self.results.insert(id, result);
        }
        Ok(())
    }

    /// Identifier `id` stands for in the rewritten graph.
    ///
    /// Identifiers that were never planned (foreign services) map to
    /// themselves.
    fn resolved(&self, id: &Identifier) -> Identifier {
        if id == &self.old {
            return self.new.clone();
        }
        self.results.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    /// Rebuild `node` with every child rewritten.
    ///
    /// Recursion here follows the nesting inside one stored calculation;
    /// references are looked up, never followed.
    fn rewrite(&self, node: &CalculationNode) -> Result<CalculationNode, RegraftError> {
        Ok(match node {
            CalculationNode::Array(a) => CalculationNode::Array(ArrayCalc {
                items: self.rewrite_all(&a.items)?,
                item_schema: a.item_schema.clone(),
            }),
            CalculationNode::Cast(c) => CalculationNode::Cast(CastCalc {
                schema: c.schema.clone(),
                object: Box::new(self.rewrite(&c.object)?),
            }),
            CalculationNode::Function(f) => CalculationNode::Function(FunctionApplication {
                account: f.account.clone(),
                app: f.app.clone(),
                name: f.name.clone(),
                level: f.level,
                args: self.rewrite_all(&f.args)?,
            }),
            CalculationNode::Item(i) => CalculationNode::Item(ItemCalc {
                array: Box::new(self.rewrite(&i.array)?),
                index: Box::new(self.rewrite(&i.index)?),
                schema: i.schema.clone(),
            }),
            CalculationNode::Let(l) => CalculationNode::Let(LetCalc {
                variables: l.variables.clone(),
                body: Box::new(self.rewrite(&l.body)?),
            }),
            CalculationNode::Meta(_) => {
                return Err(RegraftError::UnsupportedOperation(
                    META_SUBSTITUTION_MESSAGE.to_string(),
                ));
            }
            CalculationNode::Object(o) => {
                let mut properties = BTreeMap::new();
                for (field, value) in &o.properties {
                    properties.insert(field.clone(), self.rewrite(value)?);
                }
                CalculationNode::Object(ObjectCalc {
                    properties,
                    schema: o.schema.clone(),
                })
            }
            CalculationNode::Property(p) => CalculationNode::Property(PropertyCalc {
                object: Box::new(self.rewrite(&p.object)?),
                field: Box::new(self.rewrite(&p.field)?),
                schema: p.schema.clone(),
            }),
            CalculationNode::Reference(id) => CalculationNode::Reference(self.resolved(id)),
            CalculationNode::Value(_) | CalculationNode::Variable(_) => node.clone(),
        })
    }

    fn rewrite_all(&self, nodes: &[CalculationNode]) -> Result<Vec<CalculationNode>, RegraftError> {
        nodes.iter().map(|n| self.rewrite(n)).collect()
    }
}

/// Push every identifier `node` references, in order.
///
/// Follows the same children as the rewrite: `let` bindings are skipped and a
/// `meta` node is an error.
fn collect_references(
    node: &CalculationNode,
    out: &mut Vec<Identifier>,
) -> Result<(), RegraftError> {
    match node {
        CalculationNode::Array(a) => a
            .items
            .iter()
            .try_for_each(|item| collect_references(item, out)),
        CalculationNode::Cast(c) => collect_references(&c.object, out),
        CalculationNode::Function(f) => f
            .args
            .iter()
            .try_for_each(|arg| collect_references(arg, out)),
        CalculationNode::Item(i) => {
            collect_references(&i.array, out)?;
            collect_references(&i.index, out)
        }
        CalculationNode::Let(l) => collect_references(&l.body, out),
        CalculationNode::Meta(_) => Err(RegraftError::UnsupportedOperation(
            META_SUBSTITUTION_MESSAGE.to_string(),
        )),
        CalculationNode::Object(o) => o
            .properties
            .values()
            .try_for_each(|value| collect_references(value, out)),
        CalculationNode::Property(p) => {
            collect_references(&p.object, out)?;
            collect_references(&p.field, out)
        }
        CalculationNode::Reference(id) => {
            out.push(id.clone());
            Ok(())
        }
        CalculationNode::Value(_) | CalculationNode::Variable(_) => Ok(()),
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Replace every reference to `old` reachable from `root` with `new`.
///
/// Returns the identifier of the rewritten root, which is `root` itself when
/// nothing reachable referenced `old`.
pub fn substitute<S: CalculationStore + ?Sized>(
    root: &Identifier,
    old: &Identifier,
    new: &Identifier,
    store: &mut S,
) -> Result<Identifier, RegraftError> {
    Substitution::new(old.clone(), new.clone())
        .run(store, root)
        .map(|outcome| outcome.result)
}

/// [`substitute`] over a pair of store closures.
pub fn substitute_with<F, P>(
    root: &Identifier,
    old: &Identifier,
    new: &Identifier,
    fetch: F,
    post: P,
) -> Result<Identifier, RegraftError>
where
    F: FnMut(&Identifier) -> Result<CalculationNode, StoreError>,
    P: FnMut(&CalculationNode) -> Result<Identifier, StoreError>,
{
    let mut store = FnStore::new(fetch, post);
    substitute(root, old, new, &mut store)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::primitives::IDENTIFIER_BYTES;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn calc_id(n: u8) -> Identifier {
        Identifier::forge(Service::Calc, [n; IDENTIFIER_BYTES])
    }

    fn add(args: Vec<CalculationNode>) -> CalculationNode {
        CalculationNode::function("acme", "math", "add", args)
    }

    #[test]
    fn root_equal_to_old_needs_no_store() {
        let mut store = MemoryStore::new();
        let outcome = Substitution::new(calc_id(1), calc_id(2))
            .run(&mut store, &calc_id(1))
            .unwrap();
        assert_eq!(outcome.result, calc_id(2));
        assert_eq!((outcome.fetched, outcome.posted), (0, 0));
        assert_eq!(store.fetches(), 0);
    }

    #[test]
    fn non_calculation_root_is_opaque() {
        let mut store = MemoryStore::new();
        let iss = Identifier::forge(Service::Iss, [1; IDENTIFIER_BYTES]);
        let result = substitute(&iss, &calc_id(1), &calc_id(2), &mut store).unwrap();
        assert_eq!(result, iss);
        assert_eq!(store.fetches(), 0);
    }

    #[test]
    fn let_bindings_are_not_rewritten() {
        let mut store = MemoryStore::new();
        let old = calc_id(1);
        let bindings = BTreeMap::from([("a".to_string(), CalculationNode::reference(old.clone()))]);
        let root = calc_id(9);
        store.insert(
            root.clone(),
            CalculationNode::let_in(bindings, CalculationNode::variable("a")),
        );

        let result = substitute(&root, &old, &calc_id(2), &mut store).unwrap();
        assert_eq!(result, root);
        assert_eq!(store.posts(), 0);
    }

    #[test]
    fn let_body_is_rewritten() {
        let mut store = MemoryStore::new();
        let old = calc_id(1);
        let root = calc_id(9);
        store.insert(
            root.clone(),
            CalculationNode::let_in(BTreeMap::new(), CalculationNode::reference(old.clone())),
        );

        let result = substitute(&root, &old, &calc_id(2), &mut store).unwrap();
        assert_ne!(result, root);
        assert_eq!(
            store.get(&result),
            Some(&CalculationNode::let_in(
                BTreeMap::new(),
                CalculationNode::reference(calc_id(2))
            ))
        );
    }

    #[test]
    fn every_structural_child_is_rewritten() {
        let mut store = MemoryStore::new();
        let old = calc_id(1);
        let new = calc_id(2);
        let r = |id: &Identifier| CalculationNode::reference(id.clone());
        let schema = json!({"string_type": {}});

        let shape = |x: &Identifier| {
            CalculationNode::Object(ObjectCalc {
                properties: BTreeMap::from([
                    (
                        "item".to_string(),
                        CalculationNode::Item(ItemCalc {
                            array: Box::new(CalculationNode::array(vec![r(x)], schema.clone())),
                            index: Box::new(r(x)),
                            schema: schema.clone(),
                        }),
                    ),
                    (
                        "property".to_string(),
                        CalculationNode::Property(PropertyCalc {
                            object: Box::new(r(x)),
                            field: Box::new(r(x)),
                            schema: schema.clone(),
                        }),
                    ),
                    (
                        "cast".to_string(),
                        CalculationNode::Cast(CastCalc {
                            schema: schema.clone(),
                            object: Box::new(add(vec![r(x), CalculationNode::value(1)])),
                        }),
                    ),
                ]),
                schema: schema.clone(),
            })
        };

        let root = calc_id(9);
        store.insert(root.clone(), shape(&old));
        let result = substitute(&root, &old, &new, &mut store).unwrap();
        assert_eq!(store.get(&result), Some(&shape(&new)));
        assert_eq!(store.posts(), 1);
    }

    #[test]
    fn reference_cycle_is_reported() {
        let mut store = MemoryStore::new();
        let (a, b) = (calc_id(3), calc_id(4));
        store.insert(a.clone(), add(vec![CalculationNode::reference(b.clone())]));
        store.insert(b.clone(), add(vec![CalculationNode::reference(a.clone())]));

        let err = substitute(&a, &calc_id(1), &calc_id(2), &mut store).unwrap_err();
        assert!(matches!(err, RegraftError::MalformedCalculation(msg) if msg.contains("cycle")));
        assert_eq!(store.posts(), 0);
    }

    #[test]
    fn closures_serve_as_store() {
        let old = calc_id(1);
        let root = calc_id(9);
        let stored = CalculationNode::reference(old.clone());
        let mut posted = Vec::new();

        let result = substitute_with(
            &root,
            &old,
            &calc_id(2),
            |id: &Identifier| {
                assert_eq!(id, &root);
                Ok(stored.clone())
            },
            |node: &CalculationNode| {
                posted.push(node.clone());
                Ok(calc_id(7))
            },
        )
        .unwrap();

        assert_eq!(result, calc_id(7));
        assert_eq!(posted, vec![CalculationNode::reference(calc_id(2))]);
    }
}
