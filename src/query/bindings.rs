//! Partial solutions and projected answers.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use smallvec::SmallVec;

use super::expr::BindingId;
use crate::value::{Value, ValueKey};

/// One partial or complete solution: binder identity to bound value.
///
/// Entries are kept sorted by identity so two rows with the same bindings
/// produce the same [`key`](Bindings::key) regardless of binding order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    entries: SmallVec<[(BindingId, Value); 4]>,
}

impl Bindings {
    /// Empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value bound to `id`.
    pub fn get(&self, id: BindingId) -> Option<&Value> {
        self.entries
            .binary_search_by_key(&id, |(bound, _)| *bound)
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    /// Whether `id` is bound.
    pub fn contains(&self, id: BindingId) -> bool {
        self.get(id).is_some()
    }

    /// Binds `id`, replacing any previous value.
    pub fn insert(&mut self, id: BindingId, value: Value) {
        match self.entries.binary_search_by_key(&id, |(bound, _)| *bound) {
            Ok(idx) => self.entries[idx].1 = value,
            Err(idx) => self.entries.insert(idx, (id, value)),
        }
    }

    /// Copy of `self` with `id` bound to `value`.
    pub fn with(&self, id: BindingId, value: Value) -> Self {
        let mut next = self.clone();
        next.insert(id, value);
        next
    }

    /// Number of bound identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bound identities and values in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (BindingId, &Value)> {
        self.entries.iter().map(|(id, value)| (*id, value))
    }

    /// Hashable key of the whole binding set.
    pub fn key(&self) -> Vec<(BindingId, ValueKey)> {
        self.entries
            .iter()
            .map(|(id, value)| (*id, value.key()))
            .collect()
    }

    /// Hashable key restricted to `ids`, in the order given. Unbound
    /// identities contribute `None`.
    pub fn key_of(&self, ids: &[BindingId]) -> Vec<Option<ValueKey>> {
        ids.iter()
            .map(|id| self.get(*id).map(Value::key))
            .collect()
    }
}

/// Projected answer of a multi-term selection: selected term labels and
/// their values, in selection order.
///
/// Labels are unique. A term whose rendered label is already taken is
/// suffixed `#2`, `#3`, ... in selection order, so two selected variables
/// that share a display name stay addressable as `x` and `x#2`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnificationDict {
    entries: Vec<(String, Value)>,
}

impl UnificationDict {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, label: String, value: Value) {
        let mut unique = label.clone();
        let mut suffix = 1;
        while self.get(&unique).is_some() {
            suffix += 1;
            unique = format!("{label}#{suffix}");
        }
        self.entries.push((unique, value));
    }

    /// Value of the entry labelled `label`.
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| value)
    }

    /// Value at selection position `idx`.
    pub fn at(&self, idx: usize) -> Option<&Value> {
        self.entries.get(idx).map(|(_, value)| value)
    }

    /// Entries in selection order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Values in selection order.
    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, value)| value.clone()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for UnificationDict {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, value) in &self.entries {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

/// One projected solution.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Answer {
    /// Exactly one term was selected.
    Single(Value),
    /// Several terms were selected.
    Tuple(UnificationDict),
}

impl Answer {
    /// The single selected value.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Answer::Single(value) => Some(value),
            Answer::Tuple(_) => None,
        }
    }

    /// The selected tuple.
    pub fn as_tuple(&self) -> Option<&UnificationDict> {
        match self {
            Answer::Single(_) => None,
            Answer::Tuple(dict) => Some(dict),
        }
    }

    /// Unwraps a single selected value.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Answer::Single(value) => Some(value),
            Answer::Tuple(_) => None,
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Single(value) => write!(f, "{value}"),
            Answer::Tuple(dict) => {
                write!(f, "{{")?;
                for (idx, (label, value)) in dict.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{label}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
