//! # Calculation Model
//!
//! A calculation is a tree of [`CalculationNode`]s. Every node carries
//! exactly one tag; the payload of some tags nests further nodes, and
//! `reference` nodes point at other stored calculations by [`Identifier`].
//!
//! ## Wire Form
//!
//! Nodes serialize as single-key JSON objects keyed by the lowercase tag:
//!
//! ```text
//! {"function": {"account": "acme", "app": "math", "name": "add",
//!               "args": [{"reference": "..."}, {"value": 5}]}}
//! ```
//!
//! Schemas and literal values are opaque JSON.

use crate::ident::Identifier;
use crate::primitives::DEFAULT_FUNCTION_LEVEL;
use crate::types::RegraftError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An opaque type description attached to some nodes.
pub type Schema = serde_json::Value;

// =============================================================================
// NODE
// =============================================================================

/// A node in a calculation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationNode {
    Array(ArrayCalc),
    Cast(CastCalc),
    Function(FunctionApplication),
    Item(ItemCalc),
    Let(LetCalc),
    Meta(MetaCalc),
    Object(ObjectCalc),
    Property(PropertyCalc),
    Reference(Identifier),
    Value(serde_json::Value),
    Variable(String),
}

/// Construct an array from its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayCalc {
    pub items: Vec<CalculationNode>,
    pub item_schema: Schema,
}

/// Reinterpret an object under another schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastCalc {
    pub schema: Schema,
    pub object: Box<CalculationNode>,
}

/// Apply an app function to arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionApplication {
    pub account: String,
    pub app: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u64>,
    pub args: Vec<CalculationNode>,
}

/// Select one element of an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCalc {
    pub array: Box<CalculationNode>,
    pub index: Box<CalculationNode>,
    pub schema: Schema,
}

/// Bind named sub-calculations for use inside `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetCalc {
    pub variables: BTreeMap<String, CalculationNode>,
    #[serde(rename = "in")]
    pub body: Box<CalculationNode>,
}

/// A calculation whose result is itself a calculation to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaCalc {
    pub generator: Box<CalculationNode>,
    pub schema: Schema,
}

/// Construct a structure from named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectCalc {
    pub properties: BTreeMap<String, CalculationNode>,
    pub schema: Schema,
}

/// Select one field of a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyCalc {
    pub object: Box<CalculationNode>,
    pub field: Box<CalculationNode>,
    pub schema: Schema,
}

// =============================================================================
// CONSTRUCTORS & ACCESSORS
// =============================================================================

impl CalculationNode {
    /// A reference to another stored calculation.
    #[must_use]
    pub fn reference(id: impl Into<Identifier>) -> Self {
        Self::Reference(id.into())
    }

    /// A literal value.
    #[must_use]
    pub fn value(v: impl Into<serde_json::Value>) -> Self {
        Self::Value(v.into())
    }

    /// A variable bound by an enclosing `let`.
    #[must_use]
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// A function application with no explicit level.
    #[must_use]
    pub fn function(
        account: impl Into<String>,
        app: impl Into<String>,
        name: impl Into<String>,
        args: Vec<Self>,
    ) -> Self {
        Self::Function(FunctionApplication {
            account: account.into(),
            app: app.into(),
            name: name.into(),
            level: None,
            args,
        })
    }

    /// An array of items sharing `item_schema`.
    #[must_use]
    pub fn array(items: Vec<Self>, item_schema: Schema) -> Self {
        Self::Array(ArrayCalc { items, item_schema })
    }

    /// A `let` binding `variables` over `body`.
    #[must_use]
    pub fn let_in(variables: BTreeMap<String, Self>, body: Self) -> Self {
        Self::Let(LetCalc {
            variables,
            body: Box::new(body),
        })
    }

    /// The lowercase tag of this node.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Array(_) => "array",
            Self::Cast(_) => "cast",
            Self::Function(_) => "function",
            Self::Item(_) => "item",
            Self::Let(_) => "let",
            Self::Meta(_) => "meta",
            Self::Object(_) => "object",
            Self::Property(_) => "property",
            Self::Reference(_) => "reference",
            Self::Value(_) => "value",
            Self::Variable(_) => "variable",
        }
    }

    /// The referenced identifier, if this is a `reference` node.
    #[must_use]
    pub fn as_reference(&self) -> Option<&Identifier> {
        match self {
            Self::Reference(id) => Some(id),
            _ => None,
        }
    }

    /// Parse a node from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, RegraftError> {
        serde_json::from_slice(bytes).map_err(|e| RegraftError::MalformedCalculation(e.to_string()))
    }

    /// Serialize a node to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, RegraftError> {
        serde_json::to_vec(self).map_err(|e| RegraftError::Serialization(e.to_string()))
    }

    /// Copy of this node with every function level filled in.
    ///
    /// Functions without a level get [`DEFAULT_FUNCTION_LEVEL`]. Applied to a
    /// calculation just before it is posted to the remote store.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let each = |nodes: &[Self]| -> Vec<Self> { nodes.iter().map(Self::sanitized).collect() };
        let each_named = |nodes: &BTreeMap<String, Self>| -> BTreeMap<String, Self> {
            nodes
                .iter()
                .map(|(k, v)| (k.clone(), v.sanitized()))
                .collect()
        };
        match self {
            Self::Reference(_) | Self::Value(_) | Self::Variable(_) => self.clone(),
            Self::Function(f) => Self::Function(FunctionApplication {
                account: f.account.clone(),
                app: f.app.clone(),
                name: f.name.clone(),
                level: Some(f.level.unwrap_or(DEFAULT_FUNCTION_LEVEL)),
                args: each(&f.args),
            }),
            Self::Array(a) => Self::Array(ArrayCalc {
                items: each(&a.items),
                item_schema: a.item_schema.clone(),
            }),
            Self::Item(i) => Self::Item(ItemCalc {
                array: Box::new(i.array.sanitized()),
                index: i.index.clone(),
                schema: i.schema.clone(),
            }),
            Self::Object(o) => Self::Object(ObjectCalc {
                properties: each_named(&o.properties),
                schema: o.schema.clone(),
            }),
            Self::Property(p) => Self::Property(PropertyCalc {
                object: Box::new(p.object.sanitized()),
                field: p.field.clone(),
                schema: p.schema.clone(),
            }),
            Self::Let(l) => Self::Let(LetCalc {
                variables: each_named(&l.variables),
                body: Box::new(l.body.sanitized()),
            }),
            Self::Meta(m) => Self::Meta(MetaCalc {
                generator: Box::new(m.generator.sanitized()),
                schema: m.schema.clone(),
            }),
            Self::Cast(c) => Self::Cast(CastCalc {
                schema: c.schema.clone(),
                object: Box::new(c.object.sanitized()),
            }),
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
    use serde_json::json;

    fn add(args: Vec<CalculationNode>) -> CalculationNode {
        CalculationNode::function("acme", "math", "add", args)
    }

    #[test]
    fn function_wire_form() {
        let node = add(vec![CalculationNode::reference("abc"), CalculationNode::value(5)]);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            json!({"function": {
                "account": "acme",
                "app": "math",
                "name": "add",
                "args": [{"reference": "abc"}, {"value": 5}]
            }})
        );
    }

    #[test]
    fn let_body_serializes_as_in() {
        let node = CalculationNode::let_in(
            BTreeMap::from([("a".to_string(), CalculationNode::value("x"))]),
            CalculationNode::variable("a"),
        );
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            json!({"let": {"variables": {"a": {"value": "x"}}, "in": {"variable": "a"}}})
        );
        let back: CalculationNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let err = CalculationNode::from_json(br#"{"lambda": {"x": 1}}"#).unwrap_err();
        assert!(matches!(err, RegraftError::MalformedCalculation(_)));
    }

    #[test]
    fn missing_tag_is_malformed() {
        let err = CalculationNode::from_json(b"{}").unwrap_err();
        assert!(matches!(err, RegraftError::MalformedCalculation(_)));
    }

    #[test]
    fn payload_mismatch_is_malformed() {
        let err = CalculationNode::from_json(br#"{"function": {"name": "add"}}"#).unwrap_err();
        assert!(matches!(err, RegraftError::MalformedCalculation(_)));
    }

    #[test]
    fn sanitize_fills_missing_levels_recursively() {
        let leveled = |level, args| {
            CalculationNode::Function(FunctionApplication {
                account: "acme".into(),
                app: "math".into(),
                name: "mul".into(),
                level,
                args,
            })
        };
        let node = CalculationNode::array(
            vec![leveled(Some(2), vec![leveled(None, vec![])])],
            json!("string"),
        );

        let expected = CalculationNode::array(
            vec![leveled(Some(2), vec![leveled(Some(DEFAULT_FUNCTION_LEVEL), vec![])])],
            json!("string"),
        );
        assert_eq!(node.sanitized(), expected);
    }

    #[test]
    fn sanitize_leaves_leaves_alone() {
        let node = CalculationNode::value(json!([2.1, 4.2]));
        assert_eq!(node.sanitized(), node);
    }

    #[test]
    fn tags_match_wire_keys() {
        let node = CalculationNode::variable("a");
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get(node.tag()).is_some());
    }
}
