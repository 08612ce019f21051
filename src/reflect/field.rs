//! Classified view of one declared record field.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use super::types::{ResolvedType, ScalarKind};

/// Outermost container constructor of a field type. An optional layer
/// hides the container beneath it: `Optional<List<T>>` is not a container.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Not a container.
    None,
    /// `list[T]`.
    List,
    /// `set[T]`.
    Set,
    /// `tuple[T, ...]`.
    Tuple,
    /// `type[T]`.
    TypeRef,
}

/// Cardinality of a relationship field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    /// Builtin-typed field.
    None,
    /// Single reference to a non-builtin type.
    OneToOne,
    /// Container of a non-builtin type.
    OneToMany,
}

/// Immutable classification of a declared field.
///
/// Descriptors are produced by [`TypeCatalog::classify`](super::TypeCatalog::classify)
/// and shared as `Arc`s. Equality is keyed on the declared field itself: the
/// declaring type, the field name and the resolved type. Two owners that
/// inherit the same field therefore share equal descriptors.
#[derive(Clone, Debug, Serialize)]
pub struct FieldDescriptor {
    pub(crate) owner: String,
    pub(crate) declared_in: String,
    pub(crate) name: String,
    pub(crate) resolved: ResolvedType,
    pub(crate) container: ContainerKind,
    pub(crate) optional: bool,
    pub(crate) is_enum: bool,
    pub(crate) relationship: Relationship,
    pub(crate) has_default: bool,
}

impl FieldDescriptor {
    pub(crate) fn from_resolved(
        owner: &str,
        declared_in: &str,
        name: &str,
        resolved: ResolvedType,
        has_default: bool,
    ) -> Self {
        let (optional, inner) = match &resolved {
            ResolvedType::Optional(inner) => (true, inner.as_ref()),
            other => (false, other),
        };
        let container = match &resolved {
            ResolvedType::List(_) => ContainerKind::List,
            ResolvedType::Set(_) => ContainerKind::Set,
            ResolvedType::Tuple(_) => ContainerKind::Tuple,
            ResolvedType::TypeRef(_) => ContainerKind::TypeRef,
            _ => ContainerKind::None,
        };
        let builtin = matches!(resolved.endpoint(), ResolvedType::Scalar(_));
        let is_container = container != ContainerKind::None;
        let relationship = match (is_container, builtin) {
            (_, true) => Relationship::None,
            (false, false) => Relationship::OneToOne,
            (true, false) => Relationship::OneToMany,
        };
        let is_enum = !is_container && matches!(inner, ResolvedType::Enum(_));
        Self {
            owner: owner.to_owned(),
            declared_in: declared_in.to_owned(),
            name: name.to_owned(),
            resolved,
            container,
            optional,
            is_enum,
            relationship,
            has_default,
        }
    }

    /// Type the descriptor was classified for.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Type that declares the field (the owner or one of its supertypes).
    pub fn declared_in(&self) -> &str {
        &self.declared_in
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully resolved field type.
    pub fn resolved_type(&self) -> &ResolvedType {
        &self.resolved
    }

    /// Innermost element type with container and optional layers stripped.
    pub fn type_endpoint(&self) -> &ResolvedType {
        self.resolved.endpoint()
    }

    /// Name of the endpoint type.
    pub fn endpoint_name(&self) -> &str {
        self.type_endpoint().name().unwrap_or("?")
    }

    /// Container constructor of the field.
    pub fn container(&self) -> ContainerKind {
        self.container
    }

    /// Whether the field holds a container.
    pub fn is_container(&self) -> bool {
        self.container != ContainerKind::None
    }

    /// Whether evaluation can unnest the field's value.
    pub fn is_iterable(&self) -> bool {
        matches!(
            self.container,
            ContainerKind::List | ContainerKind::Set | ContainerKind::Tuple
        )
    }

    /// Whether the declared type admits an absent value.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Whether the endpoint is a builtin scalar kind.
    pub fn is_builtin(&self) -> bool {
        matches!(self.type_endpoint(), ResolvedType::Scalar(_))
    }

    /// Scalar kind of the endpoint, if builtin.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self.type_endpoint() {
            ResolvedType::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Whether the field holds a single enum member.
    pub fn is_enum(&self) -> bool {
        self.is_enum
    }

    /// Relationship cardinality.
    pub fn relationship(&self) -> Relationship {
        self.relationship
    }

    /// Whether the field is a single reference to a non-builtin type.
    pub fn is_one_to_one(&self) -> bool {
        self.relationship == Relationship::OneToOne
    }

    /// Whether the field is a container of a non-builtin type.
    pub fn is_one_to_many(&self) -> bool {
        self.relationship == Relationship::OneToMany
    }

    /// Whether the field declares a default.
    pub fn has_default(&self) -> bool {
        self.has_default
    }

    /// Required, non-optional one-to-one field without a default.
    pub fn is_role_taker(&self) -> bool {
        self.is_one_to_one() && !self.optional && !self.has_default
    }
}

impl PartialEq for FieldDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.declared_in == other.declared_in
            && self.name == other.name
            && self.resolved == other.resolved
    }
}

impl Eq for FieldDescriptor {}

impl Hash for FieldDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declared_in.hash(state);
        self.name.hash(state);
        self.resolved.hash(state);
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.declared_in, self.name, self.resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describe(resolved: ResolvedType) -> FieldDescriptor {
        FieldDescriptor::from_resolved("Owner", "Owner", "f", resolved, false)
    }

    #[test]
    fn optional_hides_the_container_beneath_it() {
        let desc = describe(ResolvedType::Optional(Box::new(ResolvedType::List(
            Box::new(ResolvedType::Record("Drawer".into())),
        ))));
        assert!(desc.is_optional());
        assert_eq!(desc.container(), ContainerKind::None);
        assert!(!desc.is_container());
        assert!(!desc.is_iterable());
        assert!(!desc.is_one_to_many());
        assert!(!desc.is_role_taker());
        assert_eq!(desc.endpoint_name(), "Drawer");

        let colors = describe(ResolvedType::Optional(Box::new(ResolvedType::List(
            Box::new(ResolvedType::Enum("Color".into())),
        ))));
        assert!(!colors.is_enum());
    }

    #[test]
    fn required_reference_takes_a_role() {
        let desc = describe(ResolvedType::Record("Container".into()));
        assert!(desc.is_one_to_one());
        assert!(desc.is_role_taker());
        let defaulted =
            FieldDescriptor::from_resolved("O", "O", "f", ResolvedType::Record("C".into()), true);
        assert!(!defaulted.is_role_taker());
    }

    #[test]
    fn type_references_are_containers_but_not_iterable() {
        let desc = describe(ResolvedType::TypeRef(Box::new(ResolvedType::Record(
            "Body".into(),
        ))));
        assert!(desc.is_container());
        assert!(!desc.is_iterable());
        assert!(desc.is_one_to_many());
    }

    #[test]
    fn scalar_lists_are_builtin() {
        let desc = describe(ResolvedType::List(Box::new(ResolvedType::Scalar(
            ScalarKind::Str,
        ))));
        assert!(desc.is_builtin());
        assert_eq!(desc.relationship(), Relationship::None);
        assert_eq!(desc.scalar_kind(), Some(ScalarKind::Str));
    }

    #[test]
    fn enum_flag_requires_a_single_member() {
        let single = describe(ResolvedType::Enum("Color".into()));
        assert!(single.is_enum());
        let many = describe(ResolvedType::List(Box::new(ResolvedType::Enum(
            "Color".into(),
        ))));
        assert!(!many.is_enum());
    }
}
