#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors raised while reflecting types, compiling patterns, or evaluating
/// queries.
///
/// Reflection and compile errors are raised eagerly before any domain is
/// scanned. Evaluation errors surface as `Err` items of the answer stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A referenced type name is not registered in the catalog.
    #[error("could not resolve type '{name}'")]
    TypeResolution { name: String },
    /// A type name was registered twice.
    #[error("type '{name}' is already registered")]
    DuplicateType { name: String },
    /// A record type extends a type that is not a record type.
    #[error("type '{ty}' extends '{supertype}', which is not a record type")]
    UnknownSupertype { ty: String, supertype: String },
    /// The field is absent from the declared shape of the type.
    #[error("type '{ty}' has no field '{field}'")]
    UnresolvedField { ty: String, field: String },
    /// A pattern constrains a field that has no backing descriptor.
    #[error("pattern on '{ty}' references '{field}', which has no backing field")]
    NoBackingField { ty: String, field: String },
    /// The outermost pattern has neither a type nor a bound term.
    #[error("root pattern requires a type")]
    MissingPatternType,
    /// A nested pattern requests a type unrelated to the field's type.
    #[error("field '{field}' holds '{expected}', which is unrelated to requested type '{found}'")]
    IncompatiblePatternType {
        field: String,
        expected: String,
        found: String,
    },
    /// A universally quantified nested pattern tried to select a term.
    #[error("field '{field}' is universally quantified and cannot select")]
    SelectionUnderUniversal { field: String },
    /// The unique-result quantifier found zero or several answers.
    #[error("expected exactly one result, found {found}")]
    NotExactlyOneResult { found: usize },
    /// An `An` quantification constraint was violated.
    #[error("expected {constraint} results, found {found}")]
    QuantificationNotSatisfied { constraint: String, found: usize },
    /// A variable has no explicit domain and its type is not queryable.
    #[error("variable '{var}' of type '{ty}' has no domain")]
    DomainUnavailable { var: String, ty: String },
    /// A comparator was applied to incompatible values.
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    /// An attribute was read off a value that is not a record.
    #[error("cannot read '{field}' from a {found} value")]
    NotARecord { field: String, found: &'static str },
    /// A record does not carry a value for a declared field.
    #[error("record of type '{ty}' has no value for '{field}'")]
    MissingFieldValue { ty: String, field: String },
    /// A flatten was applied to a value that is not a container.
    #[error("cannot unnest a {found} value")]
    NotIterable { found: &'static str },
    /// A term used as a condition did not evaluate to a boolean.
    #[error("condition evaluated to a {found} value, expected bool")]
    NotBoolean { found: &'static str },
    /// An internal invariant of the evaluator was broken.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl QueryError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::TypeResolution { .. } => "TypeResolution",
            QueryError::DuplicateType { .. } => "DuplicateType",
            QueryError::UnknownSupertype { .. } => "UnknownSupertype",
            QueryError::UnresolvedField { .. } => "UnresolvedField",
            QueryError::NoBackingField { .. } => "NoBackingField",
            QueryError::MissingPatternType => "MissingPatternType",
            QueryError::IncompatiblePatternType { .. } => "IncompatiblePatternType",
            QueryError::SelectionUnderUniversal { .. } => "SelectionUnderUniversal",
            QueryError::NotExactlyOneResult { .. } => "NotExactlyOneResult",
            QueryError::QuantificationNotSatisfied { .. } => "QuantificationNotSatisfied",
            QueryError::DomainUnavailable { .. } => "DomainUnavailable",
            QueryError::TypeMismatch { .. } => "TypeMismatch",
            QueryError::NotARecord { .. } => "NotARecord",
            QueryError::MissingFieldValue { .. } => "MissingFieldValue",
            QueryError::NotIterable { .. } => "NotIterable",
            QueryError::NotBoolean { .. } => "NotBoolean",
            QueryError::Internal(_) => "Internal",
        }
    }

    /// Whether the error was raised before evaluation started.
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            QueryError::TypeResolution { .. }
                | QueryError::DuplicateType { .. }
                | QueryError::UnknownSupertype { .. }
                | QueryError::UnresolvedField { .. }
                | QueryError::NoBackingField { .. }
                | QueryError::MissingPatternType
                | QueryError::IncompatiblePatternType { .. }
                | QueryError::SelectionUnderUniversal { .. }
        )
    }
}

/// Convenience wrapper that formats errors with their codes.
pub struct QueryErrorWithCode<'a>(pub &'a QueryError);

impl fmt::Display for QueryErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
