//! Field reflection layer.
//!
//! Record and enum types are registered once into a [`TypeCatalog`]. The
//! catalog classifies each declared field into a [`FieldDescriptor`]
//! (scalar, container, optional, enum, one-to-one or one-to-many) using
//! only the structure of its declared [`TypeExpr`].

#![forbid(unsafe_code)]

mod catalog;
mod field;
mod types;

pub use catalog::TypeCatalog;
pub use field::{ContainerKind, FieldDescriptor, Relationship};
pub use types::{EnumType, FieldDef, RecordType, ResolvedType, ScalarKind, TypeDef, TypeExpr};
