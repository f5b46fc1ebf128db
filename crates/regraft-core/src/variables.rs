//! # Variables & Let Submission
//!
//! A request built locally may bind sub-calculations with nested `let`
//! nodes. The store only accepts resolved calculations, so such a request is
//! submitted piecewise: every binding is posted on its own and each variable
//! becomes a `reference` to the identifier it was posted under.
//!
//! ## Unwinding
//!
//! ```text
//! let {a: f(1)} in let {b: g(a)} in h(a, b)
//!   post f(1)              -> A
//!   post g(ref A)          -> B
//!   post h(ref A, ref B)   -> main
//! ```

use crate::calc::{
    ArrayCalc, CalculationNode, CastCalc, FunctionApplication, ItemCalc, MetaCalc, ObjectCalc,
    PropertyCalc,
};
use crate::ident::Identifier;
use crate::store::CalculationStore;
use crate::types::RegraftError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label given to a reported binding that is not a function application.
pub const UNRECOGNIZED_REPORTED_LABEL: &str = "unrecognized reported calculation";

// =============================================================================
// VARIABLE SUBSTITUTION
// =============================================================================

/// Replace every `variable` in `node` with its entry in `substitutions`.
///
/// `item` indices and `property` fields are copied as they are.
///
/// # Errors
///
/// - [`RegraftError::UnsupportedOperation`] on a `let` node
/// - [`RegraftError::MissingVariable`] on a variable with no entry
pub fn substitute_variables(
    substitutions: &BTreeMap<String, CalculationNode>,
    node: &CalculationNode,
) -> Result<CalculationNode, RegraftError> {
    let each = |nodes: &[CalculationNode]| -> Result<Vec<CalculationNode>, RegraftError> {
        nodes
            .iter()
            .map(|n| substitute_variables(substitutions, n))
            .collect()
    };

    Ok(match node {
        CalculationNode::Reference(_) | CalculationNode::Value(_) => node.clone(),
        CalculationNode::Function(f) => CalculationNode::Function(FunctionApplication {
            account: f.account.clone(),
            app: f.app.clone(),
            name: f.name.clone(),
            level: f.level,
            args: each(&f.args)?,
        }),
        CalculationNode::Array(a) => CalculationNode::Array(ArrayCalc {
            items: each(&a.items)?,
            item_schema: a.item_schema.clone(),
        }),
        CalculationNode::Item(i) => CalculationNode::Item(ItemCalc {
            array: Box::new(substitute_variables(substitutions, &i.array)?),
            index: i.index.clone(),
            schema: i.schema.clone(),
        }),
        CalculationNode::Object(o) => {
            let mut properties = BTreeMap::new();
            for (field, value) in &o.properties {
                properties.insert(field.clone(), substitute_variables(substitutions, value)?);
            }
            CalculationNode::Object(ObjectCalc {
                properties,
                schema: o.schema.clone(),
            })
        }
        CalculationNode::Property(p) => CalculationNode::Property(PropertyCalc {
            object: Box::new(substitute_variables(substitutions, &p.object)?),
            field: p.field.clone(),
            schema: p.schema.clone(),
        }),
        CalculationNode::Let(_) => {
            return Err(RegraftError::UnsupportedOperation(
                "let encountered during variable substitution".to_string(),
            ));
        }
        CalculationNode::Variable(name) => substitutions
            .get(name)
            .cloned()
            .ok_or_else(|| RegraftError::MissingVariable(name.clone()))?,
        CalculationNode::Meta(m) => CalculationNode::Meta(MetaCalc {
            generator: Box::new(substitute_variables(substitutions, &m.generator)?),
            schema: m.schema.clone(),
        }),
        CalculationNode::Cast(c) => CalculationNode::Cast(CastCalc {
            schema: c.schema.clone(),
            object: Box::new(substitute_variables(substitutions, &c.object)?),
        }),
    })
}

// =============================================================================
// LET SUBMISSION
// =============================================================================

/// A request together with the bindings the caller wants reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedCalculation {
    pub request: CalculationNode,
    #[serde(default)]
    pub reported_variables: Vec<String>,
}

/// A reported binding and the identifier it was submitted under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedCalculation {
    pub id: Identifier,
    pub label: String,
}

/// Identifiers produced by [`submit_let_calculation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetSubmission {
    pub main_calc_id: Identifier,
    pub reported_subcalcs: Vec<ReportedCalculation>,
    pub other_subcalc_ids: Vec<Identifier>,
}

/// Submit a request built from nested `let`s, one binding at a time.
///
/// Bindings are submitted in name order within each `let`, outermost `let`
/// first. With `dry_run` nothing is posted; each piece is only looked up, and
/// `Ok(None)` means at least one piece is not in the store yet.
pub fn submit_let_calculation<S: CalculationStore + ?Sized>(
    store: &mut S,
    augmented: &AugmentedCalculation,
    dry_run: bool,
) -> Result<Option<LetSubmission>, RegraftError> {
    let mut substitutions = BTreeMap::new();
    let mut reported_subcalcs = Vec::new();
    let mut other_subcalc_ids = Vec::new();

    let mut current = &augmented.request;
    while let CalculationNode::Let(l) = current {
        for (name, binding) in &l.variables {
            let resolved = substitute_variables(&substitutions, binding)?;
            let Some(id) = submit(store, &resolved, dry_run)? else {
                return Ok(None);
            };

            if augmented.reported_variables.contains(name) {
                let label = match binding {
                    CalculationNode::Function(f) => f.name.clone(),
                    _ => UNRECOGNIZED_REPORTED_LABEL.to_string(),
                };
                reported_subcalcs.push(ReportedCalculation {
                    id: id.clone(),
                    label,
                });
            } else {
                other_subcalc_ids.push(id.clone());
            }

            substitutions.insert(name.clone(), CalculationNode::Reference(id));
        }
        current = &l.body;
    }

    let main = substitute_variables(&substitutions, current)?;
    let Some(main_calc_id) = submit(store, &main, dry_run)? else {
        return Ok(None);
    };

    tracing::info!(
        main = %main_calc_id,
        reported = reported_subcalcs.len(),
        other = other_subcalc_ids.len(),
        dry_run,
        "let calculation submitted"
    );

    Ok(Some(LetSubmission {
        main_calc_id,
        reported_subcalcs,
        other_subcalc_ids,
    }))
}

fn submit<S: CalculationStore + ?Sized>(
    store: &mut S,
    node: &CalculationNode,
    dry_run: bool,
) -> Result<Option<Identifier>, RegraftError> {
    if dry_run {
        store.lookup_calculation(node).map_err(RegraftError::write)
    } else {
        store
            .post_calculation(node)
            .map(Some)
            .map_err(RegraftError::write)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn call(name: &str, args: Vec<CalculationNode>) -> CalculationNode {
        CalculationNode::function("acme", "math", name, args)
    }

    fn bind(pairs: Vec<(&str, CalculationNode)>) -> BTreeMap<String, CalculationNode> {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn variables_are_replaced_everywhere_they_are_children() {
        let subs = bind(vec![("x", CalculationNode::value(3))]);
        let node = CalculationNode::Meta(MetaCalc {
            generator: Box::new(call(
                "gen",
                vec![CalculationNode::array(
                    vec![CalculationNode::variable("x")],
                    json!("integer"),
                )],
            )),
            schema: json!("integer"),
        });
        let expected = CalculationNode::Meta(MetaCalc {
            generator: Box::new(call(
                "gen",
                vec![CalculationNode::array(
                    vec![CalculationNode::value(3)],
                    json!("integer"),
                )],
            )),
            schema: json!("integer"),
        });
        assert_eq!(substitute_variables(&subs, &node).unwrap(), expected);
    }

    #[test]
    fn item_index_is_not_substituted() {
        let subs = bind(vec![("x", CalculationNode::value(3))]);
        let node = CalculationNode::Item(ItemCalc {
            array: Box::new(CalculationNode::variable("x")),
            index: Box::new(CalculationNode::variable("x")),
            schema: json!("integer"),
        });
        let expected = CalculationNode::Item(ItemCalc {
            array: Box::new(CalculationNode::value(3)),
            index: Box::new(CalculationNode::variable("x")),
            schema: json!("integer"),
        });
        assert_eq!(substitute_variables(&subs, &node).unwrap(), expected);
    }

    #[test]
    fn unbound_variable_is_missing() {
        let err = substitute_variables(&BTreeMap::new(), &CalculationNode::variable("y"))
            .unwrap_err();
        assert!(matches!(err, RegraftError::MissingVariable(name) if name == "y"));
    }

    #[test]
    fn let_is_unsupported_in_substitution() {
        let node = CalculationNode::let_in(BTreeMap::new(), CalculationNode::value(1));
        let err = substitute_variables(&BTreeMap::new(), &node).unwrap_err();
        assert!(matches!(err, RegraftError::UnsupportedOperation(_)));
    }

    fn nested_request() -> AugmentedCalculation {
        let inner = CalculationNode::let_in(
            bind(vec![("b", call("g", vec![CalculationNode::variable("a")]))]),
            call(
                "h",
                vec![CalculationNode::variable("a"), CalculationNode::variable("b")],
            ),
        );
        AugmentedCalculation {
            request: CalculationNode::let_in(
                bind(vec![("a", call("f", vec![CalculationNode::value(1)]))]),
                inner,
            ),
            reported_variables: vec!["b".to_string()],
        }
    }

    #[test]
    fn nested_lets_are_submitted_piecewise() {
        let mut store = MemoryStore::new();
        let submission = submit_let_calculation(&mut store, &nested_request(), false)
            .unwrap()
            .unwrap();

        assert_eq!(store.posts(), 3);
        assert_eq!(submission.other_subcalc_ids.len(), 1);
        assert_eq!(submission.reported_subcalcs.len(), 1);
        assert_eq!(submission.reported_subcalcs[0].label, "g");

        let a = submission.other_subcalc_ids[0].clone();
        let b = submission.reported_subcalcs[0].id.clone();
        assert_eq!(
            store.get(&b),
            Some(&call("g", vec![CalculationNode::reference(a.clone())]))
        );
        assert_eq!(
            store.get(&submission.main_calc_id),
            Some(&call(
                "h",
                vec![CalculationNode::reference(a), CalculationNode::reference(b)]
            ))
        );
    }

    #[test]
    fn non_function_reported_binding_gets_fallback_label() {
        let mut store = MemoryStore::new();
        let request = AugmentedCalculation {
            request: CalculationNode::let_in(
                bind(vec![("v", CalculationNode::value(7))]),
                CalculationNode::variable("v"),
            ),
            reported_variables: vec!["v".to_string()],
        };
        let submission = submit_let_calculation(&mut store, &request, false)
            .unwrap()
            .unwrap();
        assert_eq!(submission.reported_subcalcs[0].label, UNRECOGNIZED_REPORTED_LABEL);
        assert_eq!(
            store.get(&submission.main_calc_id),
            Some(&CalculationNode::reference(
                submission.reported_subcalcs[0].id.clone()
            ))
        );
    }

    #[test]
    fn dry_run_before_submission_is_none() {
        let mut store = MemoryStore::new();
        let result = submit_let_calculation(&mut store, &nested_request(), true).unwrap();
        assert_eq!(result, None);
        assert_eq!(store.posts(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn dry_run_after_submission_matches() {
        let mut store = MemoryStore::new();
        let submitted = submit_let_calculation(&mut store, &nested_request(), false).unwrap();
        let dry = submit_let_calculation(&mut store, &nested_request(), true).unwrap();
        assert_eq!(dry, submitted);
        assert_eq!(store.posts(), 3);
    }

    #[test]
    fn request_without_let_is_submitted_whole() {
        let mut store = MemoryStore::new();
        let request = AugmentedCalculation {
            request: call("f", vec![]),
            reported_variables: vec![],
        };
        let submission = submit_let_calculation(&mut store, &request, false)
            .unwrap()
            .unwrap();
        assert!(submission.reported_subcalcs.is_empty());
        assert!(submission.other_subcalc_ids.is_empty());
        assert_eq!(store.get(&submission.main_calc_id), Some(&call("f", vec![])));
    }
}
