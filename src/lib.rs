//! Declarative pattern compiler and unification evaluator over in-memory
//! record graphs.
//!
//! Record and enum types are registered in a [`TypeCatalog`]; live records
//! are tracked in a [`SymbolGraph`]. Queries are written either directly in
//! the expression model ([`query::entity`], [`query::eq`], ...) or as nested
//! [`Pattern`]s that compile into the same model, and are answered through
//! the [`An`] and [`The`] quantifiers.
//!
//! ```
//! use std::sync::Arc;
//!
//! use entity_query::{match_, the, Evaluator, Record, RecordType, SymbolGraph, TypeCatalog, TypeExpr};
//!
//! # fn main() -> entity_query::Result<()> {
//! let mut catalog = TypeCatalog::new();
//! catalog.register_record(
//!     RecordType::new("Handle").field("name", TypeExpr::str()).queryable(),
//! )?;
//! let registry = SymbolGraph::new();
//! let h1 = Record::new("Handle", [("name", "H1")]);
//! registry.insert(&h1);
//! registry.insert(&Record::new("Handle", [("name", "H2")]));
//!
//! let query = match_("Handle").with("name", "H1").compile(&catalog)?;
//! let evaluator = Evaluator::new(Arc::new(catalog), Arc::new(registry));
//! let answer = the(query).evaluate(&evaluator)?;
//! assert_eq!(answer.as_value(), Some(&entity_query::Value::from(h1)));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod query;
pub mod reflect;
pub mod registry;
pub mod value;

pub use error::{QueryError, QueryErrorWithCode, Result};
pub use query::{
    an, entity_matching, match_, match_all, match_any, select, select_any, select_field, the, An,
    Answer, Answers, CompiledQuery, Evaluator, EvaluatorOptions, Pattern, QueryDescriptor,
    ResultQuantificationConstraint, The, UnificationDict,
};
pub use reflect::{EnumType, FieldDescriptor, RecordType, TypeCatalog, TypeExpr};
pub use registry::SymbolGraph;
pub use value::{Record, RecordId, RecordRef, Value};
