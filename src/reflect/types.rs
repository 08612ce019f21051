//! Declared shapes of record and enum types.
//!
//! A [`TypeExpr`] is what a field declares; it may forward-reference other
//! types by name. The catalog resolves it into a [`ResolvedType`] where every
//! name has been checked and classified.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Builtin scalar kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// UTF-8 string.
    Str,
    /// Boolean.
    Bool,
    /// Point in time.
    DateTime,
    /// The absence marker.
    None,
}

impl ScalarKind {
    /// Canonical name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Str => "str",
            ScalarKind::Bool => "bool",
            ScalarKind::DateTime => "datetime",
            ScalarKind::None => "none",
        }
    }

    /// Parses a canonical kind name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(ScalarKind::Int),
            "float" => Some(ScalarKind::Float),
            "str" => Some(ScalarKind::Str),
            "bool" => Some(ScalarKind::Bool),
            "datetime" => Some(ScalarKind::DateTime),
            "none" => Some(ScalarKind::None),
            _ => None,
        }
    }

    /// Whether `value` is an instance of this kind. `int` values are accepted
    /// where a `float` is declared.
    pub fn admits(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ScalarKind::Int, Value::Int(_))
                | (ScalarKind::Float, Value::Float(_) | Value::Int(_))
                | (ScalarKind::Str, Value::String(_))
                | (ScalarKind::Bool, Value::Bool(_))
                | (ScalarKind::DateTime, Value::DateTime(_))
                | (ScalarKind::None, Value::Null)
        )
    }
}

/// Type annotation of a declared field.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum TypeExpr {
    /// A builtin scalar.
    Scalar(ScalarKind),
    /// A record or enum type referenced by name.
    Named(String),
    /// `list[T]`.
    List(Box<TypeExpr>),
    /// `set[T]`.
    Set(Box<TypeExpr>),
    /// `tuple[T, ...]`.
    Tuple(Vec<TypeExpr>),
    /// `type[T]`: the field holds a type, not an instance.
    TypeRef(Box<TypeExpr>),
    /// `T | None`.
    Optional(Box<TypeExpr>),
}

impl TypeExpr {
    /// `int`.
    pub fn int() -> Self {
        TypeExpr::Scalar(ScalarKind::Int)
    }

    /// `float`.
    pub fn float() -> Self {
        TypeExpr::Scalar(ScalarKind::Float)
    }

    /// `str`.
    pub fn str() -> Self {
        TypeExpr::Scalar(ScalarKind::Str)
    }

    /// `bool`.
    pub fn bool() -> Self {
        TypeExpr::Scalar(ScalarKind::Bool)
    }

    /// `datetime`.
    pub fn datetime() -> Self {
        TypeExpr::Scalar(ScalarKind::DateTime)
    }

    /// Reference to a record or enum type by name.
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named(name.into())
    }

    /// `list[inner]`.
    pub fn list(inner: TypeExpr) -> Self {
        TypeExpr::List(Box::new(inner))
    }

    /// `set[inner]`.
    pub fn set(inner: TypeExpr) -> Self {
        TypeExpr::Set(Box::new(inner))
    }

    /// `tuple[items...]`.
    pub fn tuple(items: impl IntoIterator<Item = TypeExpr>) -> Self {
        TypeExpr::Tuple(items.into_iter().collect())
    }

    /// `type[inner]`.
    pub fn type_ref(inner: TypeExpr) -> Self {
        TypeExpr::TypeRef(Box::new(inner))
    }

    /// `inner | None`.
    pub fn optional(inner: TypeExpr) -> Self {
        TypeExpr::Optional(Box::new(inner))
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Scalar(kind) => write!(f, "{}", kind.name()),
            TypeExpr::Named(name) => write!(f, "{name}"),
            TypeExpr::List(inner) => write!(f, "list[{inner}]"),
            TypeExpr::Set(inner) => write!(f, "set[{inner}]"),
            TypeExpr::Tuple(items) => {
                write!(f, "tuple[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            TypeExpr::TypeRef(inner) => write!(f, "type[{inner}]"),
            TypeExpr::Optional(inner) => write!(f, "{inner} | None"),
        }
    }
}

/// A [`TypeExpr`] whose names have all been checked against the catalog.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum ResolvedType {
    /// Builtin scalar.
    Scalar(ScalarKind),
    /// Registered record type.
    Record(String),
    /// Registered enum type.
    Enum(String),
    /// `list[T]`.
    List(Box<ResolvedType>),
    /// `set[T]`.
    Set(Box<ResolvedType>),
    /// `tuple[T, ...]`.
    Tuple(Vec<ResolvedType>),
    /// `type[T]`.
    TypeRef(Box<ResolvedType>),
    /// `T | None`.
    Optional(Box<ResolvedType>),
}

impl ResolvedType {
    /// Name of a scalar, record, or enum type; `None` for wrappers.
    pub fn name(&self) -> Option<&str> {
        match self {
            ResolvedType::Scalar(kind) => Some(kind.name()),
            ResolvedType::Record(name) | ResolvedType::Enum(name) => Some(name),
            _ => None,
        }
    }

    /// Innermost element type, stripping every container and optional layer.
    /// Tuples contribute their first element type.
    pub fn endpoint(&self) -> &ResolvedType {
        match self {
            ResolvedType::List(inner)
            | ResolvedType::Set(inner)
            | ResolvedType::TypeRef(inner)
            | ResolvedType::Optional(inner) => inner.endpoint(),
            ResolvedType::Tuple(items) => items.first().map_or(self, ResolvedType::endpoint),
            _ => self,
        }
    }
}

impl fmt::Display for ResolvedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedType::Scalar(kind) => write!(f, "{}", kind.name()),
            ResolvedType::Record(name) | ResolvedType::Enum(name) => write!(f, "{name}"),
            ResolvedType::List(inner) => write!(f, "list[{inner}]"),
            ResolvedType::Set(inner) => write!(f, "set[{inner}]"),
            ResolvedType::Tuple(items) => {
                write!(f, "tuple[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            ResolvedType::TypeRef(inner) => write!(f, "type[{inner}]"),
            ResolvedType::Optional(inner) => write!(f, "{inner} | None"),
        }
    }
}

/// One declared field of a record type.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Declared type annotation.
    pub ty: TypeExpr,
    /// Whether the field declares a default value or factory.
    #[serde(default)]
    pub has_default: bool,
}

impl FieldDef {
    /// A required field.
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            has_default: false,
        }
    }

    /// A field with a default value.
    pub fn with_default(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            has_default: true,
            ..Self::new(name, ty)
        }
    }
}

/// Declared shape of a record type.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RecordType {
    /// Unique type name.
    pub name: String,
    /// Optional supertype whose fields are inherited.
    #[serde(default)]
    pub extends: Option<String>,
    /// Own fields in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Whether instances are tracked by the instance registry.
    #[serde(default)]
    pub queryable: bool,
}

impl RecordType {
    /// Starts a record type definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            fields: Vec::new(),
            queryable: false,
        }
    }

    /// Sets the supertype.
    pub fn extends(mut self, supertype: impl Into<String>) -> Self {
        self.extends = Some(supertype.into());
        self
    }

    /// Adds a required field.
    pub fn field(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.fields.push(FieldDef::new(name, ty));
        self
    }

    /// Adds a field that declares a default.
    pub fn field_with_default(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.fields.push(FieldDef::with_default(name, ty));
        self
    }

    /// Marks the type as queryable through the instance registry.
    pub fn queryable(mut self) -> Self {
        self.queryable = true;
        self
    }
}

/// Declared enum type.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    /// Unique type name.
    pub name: String,
    /// Member names.
    pub variants: Vec<String>,
}

impl EnumType {
    /// Creates an enum definition.
    pub fn new<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds a member value of this enum.
    pub fn member(&self, variant: impl Into<String>) -> Value {
        Value::Enum {
            ty: self.name.clone(),
            variant: variant.into(),
        }
    }
}

/// Any registered type definition.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "def", rename_all = "snake_case")]
pub enum TypeDef {
    /// Record type.
    Record(RecordType),
    /// Enum type.
    Enum(EnumType),
}

impl TypeDef {
    /// Name of the defined type.
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Record(def) => &def.name,
            TypeDef::Enum(def) => &def.name,
        }
    }
}
