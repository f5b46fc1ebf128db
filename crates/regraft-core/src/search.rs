//! # Calculation Search
//!
//! Finds every calculation reachable from a root whose node is a function
//! application with a matching name.
//!
//! Only direct `reference` children are followed, and only those issued by
//! the calculation service. Results of copied calculations may point at
//! inputs the store no longer serves; such calculations are skipped with a
//! warning, so the result can be incomplete.

use crate::calc::CalculationNode;
use crate::ident::{Identifier, Service, classify};
use crate::store::CalculationStore;
use crate::types::{RegraftError, StoreError};
use std::collections::BTreeMap;

/// Identifiers of calculations under `root` that call a function whose name
/// contains `needle`, in identifier order.
///
/// # Errors
///
/// - [`RegraftError::MalformedCalculation`] if a stored calculation contains
///   `let` or `variable`
/// - Any fetch failure other than not-found
pub fn search_calculation<S: CalculationStore + ?Sized>(
    store: &mut S,
    root: &Identifier,
    needle: &str,
) -> Result<Vec<Identifier>, RegraftError> {
    let mut is_matching: BTreeMap<Identifier, bool> = BTreeMap::new();
    let mut pending = vec![root.clone()];
    let mut children = Vec::new();

    while let Some(id) = pending.pop() {
        if is_matching.contains_key(&id) {
            continue;
        }

        let node = match store.fetch_calculation(&id) {
            Ok(node) => node,
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(%id, "calculation not found; search results may be incomplete");
                is_matching.insert(id, false);
                continue;
            }
            Err(e) => return Err(RegraftError::read(&id, e)),
        };

        children.clear();
        let matched = inspect(&id, &node, needle, &mut children)?;
        is_matching.insert(id, matched);

        pending.extend(
            children
                .drain(..)
                .rev()
                .filter(|child| classify(child) == Service::Calc),
        );
    }

    let matches: Vec<Identifier> = is_matching
        .into_iter()
        .filter_map(|(id, matched)| matched.then_some(id))
        .collect();

    tracing::debug!(%root, needle, matches = matches.len(), "search complete");
    Ok(matches)
}

/// Whether `node` matches, pushing the references to search next.
fn inspect(
    id: &Identifier,
    node: &CalculationNode,
    needle: &str,
    children: &mut Vec<Identifier>,
) -> Result<bool, RegraftError> {
    let mut follow = |child: &CalculationNode| {
        if let Some(r) = child.as_reference() {
            children.push(r.clone());
        }
    };

    match node {
        CalculationNode::Reference(_) | CalculationNode::Value(_) => Ok(false),
        CalculationNode::Function(f) => {
            f.args.iter().for_each(&mut follow);
            Ok(f.name.contains(needle))
        }
        CalculationNode::Array(a) => {
            a.items.iter().for_each(&mut follow);
            Ok(false)
        }
        CalculationNode::Item(i) => {
            follow(&*i.array);
            Ok(false)
        }
        CalculationNode::Object(o) => {
            o.properties.values().for_each(&mut follow);
            Ok(false)
        }
        CalculationNode::Property(p) => {
            follow(&*p.object);
            Ok(false)
        }
        CalculationNode::Meta(m) => {
            follow(&*m.generator);
            Ok(false)
        }
        CalculationNode::Cast(c) => {
            follow(&*c.object);
            Ok(false)
        }
        CalculationNode::Let(_) | CalculationNode::Variable(_) => {
            Err(RegraftError::MalformedCalculation(format!(
                "{id}: stored calculation contains '{}'",
                node.tag()
            )))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::calc::MetaCalc;
    use crate::primitives::IDENTIFIER_BYTES;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn calc_id(n: u8) -> Identifier {
        Identifier::forge(Service::Calc, [n; IDENTIFIER_BYTES])
    }

    fn call(name: &str, args: Vec<CalculationNode>) -> CalculationNode {
        CalculationNode::function("acme", "math", name, args)
    }

    #[test]
    fn finds_matching_functions_through_references() {
        let mut store = MemoryStore::new();
        store.insert(calc_id(3), call("add_then_scale", vec![]));
        store.insert(calc_id(2), call("mul", vec![CalculationNode::reference(calc_id(3))]));
        store.insert(
            calc_id(1),
            call(
                "add",
                vec![
                    CalculationNode::reference(calc_id(2)),
                    CalculationNode::reference(calc_id(3)),
                ],
            ),
        );

        let mut found = search_calculation(&mut store, &calc_id(1), "add").unwrap();
        found.sort();
        let mut expected = vec![calc_id(1), calc_id(3)];
        expected.sort();
        assert_eq!(found, expected);
        assert_eq!(store.fetches(), 3);
    }

    #[test]
    fn non_calculation_references_are_not_followed() {
        let mut store = MemoryStore::new();
        let iss = Identifier::forge(Service::Iss, [9; IDENTIFIER_BYTES]);
        store.insert(iss.clone(), call("add", vec![]));
        store.insert(calc_id(1), call("mul", vec![CalculationNode::reference(iss)]));

        assert!(search_calculation(&mut store, &calc_id(1), "add").unwrap().is_empty());
        assert_eq!(store.fetches(), 1);
    }

    #[test]
    fn nested_references_are_not_followed() {
        let mut store = MemoryStore::new();
        store.insert(calc_id(2), call("add", vec![]));
        let nested = CalculationNode::array(
            vec![CalculationNode::reference(calc_id(2))],
            json!("integer"),
        );
        store.insert(calc_id(1), call("mul", vec![nested]));

        assert!(search_calculation(&mut store, &calc_id(1), "add").unwrap().is_empty());
    }

    #[test]
    fn meta_generator_is_followed() {
        let mut store = MemoryStore::new();
        store.insert(calc_id(2), call("make_add", vec![]));
        store.insert(
            calc_id(1),
            CalculationNode::Meta(MetaCalc {
                generator: Box::new(CalculationNode::reference(calc_id(2))),
                schema: json!("integer"),
            }),
        );
        assert_eq!(
            search_calculation(&mut store, &calc_id(1), "add").unwrap(),
            vec![calc_id(2)]
        );
    }

    #[test]
    fn missing_calculation_counts_as_no_match() {
        let mut store = MemoryStore::new();
        store.insert(calc_id(1), call("add", vec![CalculationNode::reference(calc_id(2))]));
        assert_eq!(
            search_calculation(&mut store, &calc_id(1), "add").unwrap(),
            vec![calc_id(1)]
        );
    }

    #[test]
    fn stored_variable_is_malformed() {
        let mut store = MemoryStore::new();
        store.insert(calc_id(1), CalculationNode::variable("x"));
        let err = search_calculation(&mut store, &calc_id(1), "add").unwrap_err();
        assert!(matches!(err, RegraftError::MalformedCalculation(_)));
    }
}
