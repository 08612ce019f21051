//! Runtime values and records shared by the reflection layer, the expression
//! model and the evaluator.
//!
//! Records are immutable and compared by identity: two attribute paths that
//! reach the same record unify, two structurally identical records do not.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct RecordId(pub u64);

impl RecordId {
    fn next() -> Self {
        RecordId(NEXT_RECORD_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Shared handle to an immutable record.
pub type RecordRef = Arc<Record>;

/// A structured record: a type name plus named field values.
#[derive(Debug)]
pub struct Record {
    id: RecordId,
    type_name: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates a record of `type_name` with the supplied field values.
    pub fn new<T, I, K, V>(type_name: T, fields: I) -> RecordRef
    where
        T: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Arc::new(Self {
            id: RecordId::next(),
            type_name: type_name.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        })
    }

    /// Identity of this record.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Name of the record's dynamic type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Value stored under `name`, if the record carries one.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Iterates over the stored fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Record {}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Record", 3)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("type", &self.type_name)?;
        state.serialize_field("fields", &self.fields)?;
        state.end()
    }
}

/// Typed value tagged with explicit kind information.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Absence of a value (an unset optional field).
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Nanoseconds since Unix epoch in UTC.
    DateTime(i128),
    /// Enum member.
    Enum {
        /// Enum type name.
        ty: String,
        /// Member name.
        variant: String,
    },
    /// Reference to a record.
    Record(RecordRef),
    /// Ordered list.
    List(Vec<Value>),
    /// Unordered set; equality ignores order.
    Set(Vec<Value>),
    /// Fixed-size tuple.
    Tuple(Vec<Value>),
    /// A type used as a value (the content of a type-reference field).
    Type(String),
}

impl Value {
    /// Human-readable kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "str",
            Value::DateTime(_) => "datetime",
            Value::Enum { .. } => "enum",
            Value::Record(_) => "record",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Tuple(_) => "tuple",
            Value::Type(_) => "type",
        }
    }

    /// Whether the value is a container that can be unnested.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::List(_) | Value::Set(_) | Value::Tuple(_))
    }

    /// Elements of a container value.
    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Record behind this value, if any.
    pub fn as_record(&self) -> Option<&RecordRef> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Partial ordering used by range comparators. Returns `None` when the two
    /// kinds are not mutually orderable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Hashable key with the same equality as [`Value`]'s `PartialEq`.
    pub fn key(&self) -> ValueKey {
        match self {
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Int(i) => ValueKey::Int(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    ValueKey::Int(*f as i64)
                } else {
                    ValueKey::Float(f.to_bits())
                }
            }
            Value::String(s) => ValueKey::String(s.clone()),
            Value::DateTime(t) => ValueKey::DateTime(*t),
            Value::Enum { ty, variant } => ValueKey::Enum(ty.clone(), variant.clone()),
            Value::Record(record) => ValueKey::Record(record.id()),
            Value::List(items) => ValueKey::List(items.iter().map(Value::key).collect()),
            Value::Tuple(items) => ValueKey::Tuple(items.iter().map(Value::key).collect()),
            Value::Set(items) => {
                let mut keys: Vec<ValueKey> = items.iter().map(Value::key).collect();
                keys.sort();
                keys.dedup();
                ValueKey::Set(keys)
            }
            Value::Type(name) => ValueKey::Type(name.clone()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (
                Value::Enum { ty, variant },
                Value::Enum {
                    ty: other_ty,
                    variant: other_variant,
                },
            ) => ty == other_ty && variant == other_variant,
            (Value::Record(a), Value::Record(b)) => a.id() == b.id(),
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                a.iter().all(|x| b.contains(x)) && b.iter().all(|y| a.contains(y))
            }
            (Value::Type(a), Value::Type(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }
        match self {
            Value::Null => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::DateTime(t) => write!(f, "datetime({t})"),
            Value::Enum { ty, variant } => write!(f, "{ty}.{variant}"),
            Value::Record(record) => write!(f, "{}#{}", record.type_name(), record.id().0),
            Value::List(items) => {
                write!(f, "[")?;
                join(f, items)?;
                write!(f, "]")
            }
            Value::Set(items) => {
                write!(f, "{{")?;
                join(f, items)?;
                write!(f, "}}")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                join(f, items)?;
                write!(f, ")")
            }
            Value::Type(name) => write!(f, "type[{name}]"),
        }
    }
}

/// Canonical, hashable form of a [`Value`] used for de-duplication.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    String(String),
    DateTime(i128),
    Enum(String, String),
    Record(RecordId),
    List(Vec<ValueKey>),
    Set(Vec<ValueKey>),
    Tuple(Vec<ValueKey>),
    Type(String),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<RecordRef> for Value {
    fn from(value: RecordRef) -> Self {
        Value::Record(value)
    }
}

impl From<&RecordRef> for Value {
    fn from(value: &RecordRef) -> Self {
        Value::Record(Arc::clone(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Vec<RecordRef>> for Value {
    fn from(value: Vec<RecordRef>) -> Self {
        Value::List(value.into_iter().map(Value::Record).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
