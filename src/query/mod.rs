#![forbid(unsafe_code)]

//! Query model, pattern compiler and unification evaluator.
//!
//! Patterns built with [`match_`] and friends compile into a
//! [`QueryDescriptor`]; an [`Evaluator`] solves descriptors against a
//! [`SymbolGraph`](crate::registry::SymbolGraph) and the [`An`] / [`The`]
//! quantifiers shape the answers.

/// Answer rows and projected tuples.
pub mod bindings;

/// Alpha-equivalence of terms, conditions and descriptors.
pub mod equiv;

/// Pull-based unification evaluator.
pub mod executor;

/// Human-readable explain trees and structural query hashes.
pub mod explain;

/// Symbolic expression model.
pub mod expr;

/// Match/Select pattern compiler.
pub mod pattern;

/// Performance profiling for evaluation.
///
/// Collects timing and count statistics per evaluator.
pub mod profile;

/// `An` and `The` result quantifiers.
pub mod quantifier;

mod stream;

pub use bindings::{Answer, Bindings, UnificationDict};
pub use executor::{compare_values, Answers, Evaluator, EvaluatorOptions};
pub use explain::{ExplainNode, ExplainProp, QueryExplain};
pub use expr::{
    and_, contains, entity, eq, exists, flatten, for_all, ge, gt, has_type, in_, le, lt, ne, not_,
    or_, set_of, BindingId, CmpOp, Condition, Domain, QueryDescriptor, Term, Variable,
};
pub use pattern::{
    entity_matching, match_, match_all, match_any, select, select_any, select_field,
    CompiledQuery, FieldValue, Pattern, PatternTarget,
};
pub use profile::QueryProfileSnapshot;
pub use quantifier::{an, the, An, ResultQuantificationConstraint, The};
