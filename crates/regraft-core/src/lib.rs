//! # regraft-core
//!
//! The substitution engine for Regraft: rewrites content-addressed
//! calculation graphs held in an immutable, append-only store.
//!
//! Given the identifier of a calculation, the engine produces an equivalent
//! graph in which every occurrence of one sub-calculation identifier is
//! replaced by another. Stored calculations are never mutated. Changed nodes
//! are posted as new calculations; unchanged nodes keep their identifiers.
//!
//! ## Architectural Constraints
//!
//! - Has NO async, NO network dependencies (pure Rust)
//! - Reaches stored calculations only through [`CalculationStore`]
//! - Is deterministic: the same graph and store yield the same result

// =============================================================================
// MODULES
// =============================================================================

pub mod calc;
pub mod ident;
pub mod primitives;
pub mod search;
pub mod storage;
pub mod store;
pub mod substitute;
pub mod types;
pub mod variables;

// =============================================================================
// RE-EXPORTS: Identifiers & Model
// =============================================================================

pub use calc::{
    ArrayCalc, CalculationNode, CastCalc, FunctionApplication, ItemCalc, LetCalc, MetaCalc,
    ObjectCalc, PropertyCalc, Schema,
};
pub use ident::{Identifier, Service, classify};
pub use types::{RegraftError, StoreError};

// =============================================================================
// RE-EXPORTS: Stores
// =============================================================================

pub use storage::{RedbStore, StoreBackend};
pub use store::{CalculationStore, FnStore, MemoryStore, content_id};

// =============================================================================
// RE-EXPORTS: Graph Operations
// =============================================================================

pub use search::search_calculation;
pub use substitute::{Substitution, SubstitutionOutcome, substitute, substitute_with};
pub use variables::{
    AugmentedCalculation, LetSubmission, ReportedCalculation, submit_let_calculation,
    substitute_variables,
};
