//! Structural equivalence of expression trees up to binder renaming.
//!
//! Two trees are equivalent when a one-to-one mapping between their
//! variables and unnest nodes makes them identical. Variables must agree on
//! their declared type; attributes must reference equal field descriptors;
//! conjunct order is significant.

use rustc_hash::FxHashMap;

use super::expr::{BindingId, Condition, QueryDescriptor, Term};

#[derive(Default)]
struct Renaming {
    forward: FxHashMap<BindingId, BindingId>,
    backward: FxHashMap<BindingId, BindingId>,
}

impl Renaming {
    fn bind(&mut self, left: BindingId, right: BindingId) -> bool {
        match (self.forward.get(&left), self.backward.get(&right)) {
            (Some(mapped), Some(back)) => *mapped == right && *back == left,
            (None, None) => {
                self.forward.insert(left, right);
                self.backward.insert(right, left);
                true
            }
            _ => false,
        }
    }

    fn terms(&mut self, left: &Term, right: &Term) -> bool {
        match (left, right) {
            (Term::Variable(a), Term::Variable(b)) => a.ty() == b.ty() && self.bind(a.id(), b.id()),
            (
                Term::Attribute {
                    base: base_a,
                    field: field_a,
                },
                Term::Attribute {
                    base: base_b,
                    field: field_b,
                },
            ) => field_a == field_b && self.terms(base_a, base_b),
            (
                Term::Flatten {
                    id: id_a,
                    inner: inner_a,
                },
                Term::Flatten {
                    id: id_b,
                    inner: inner_b,
                },
            ) => self.terms(inner_a, inner_b) && self.bind(*id_a, *id_b),
            (Term::Literal(a), Term::Literal(b)) => a == b,
            _ => false,
        }
    }

    fn conditions(&mut self, left: &Condition, right: &Condition) -> bool {
        match (left, right) {
            (
                Condition::Comparator {
                    left: l_a,
                    op: op_a,
                    right: r_a,
                },
                Condition::Comparator {
                    left: l_b,
                    op: op_b,
                    right: r_b,
                },
            ) => op_a == op_b && self.terms(l_a, l_b) && self.terms(r_a, r_b),
            (Condition::And(a), Condition::And(b)) | (Condition::Or(a), Condition::Or(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| self.conditions(x, y))
            }
            (Condition::Not(a), Condition::Not(b)) => self.conditions(a, b),
            (
                Condition::Exists {
                    over: over_a,
                    condition: cond_a,
                },
                Condition::Exists {
                    over: over_b,
                    condition: cond_b,
                },
            )
            | (
                Condition::ForAll {
                    over: over_a,
                    condition: cond_a,
                },
                Condition::ForAll {
                    over: over_b,
                    condition: cond_b,
                },
            ) => self.terms(over_a, over_b) && self.conditions(cond_a, cond_b),
            (
                Condition::HasType { term: a, ty: ty_a },
                Condition::HasType { term: b, ty: ty_b },
            ) => ty_a == ty_b && self.terms(a, b),
            (Condition::Truthy(a), Condition::Truthy(b)) => self.terms(a, b),
            _ => false,
        }
    }
}

impl Term {
    /// Whether the two terms are identical up to binder renaming.
    pub fn is_equivalent(&self, other: &Term) -> bool {
        Renaming::default().terms(self, other)
    }
}

impl Condition {
    /// Whether the two conditions are identical up to binder renaming.
    pub fn is_equivalent(&self, other: &Condition) -> bool {
        Renaming::default().conditions(self, other)
    }
}

impl QueryDescriptor {
    /// Whether the two descriptors are identical up to binder renaming.
    ///
    /// Compiling the same pattern twice yields equivalent descriptors, as
    /// does a hand-built descriptor with the same shape.
    pub fn is_equivalent(&self, other: &QueryDescriptor) -> bool {
        let same_kind = matches!(
            (self, other),
            (QueryDescriptor::Entity { .. }, QueryDescriptor::Entity { .. })
                | (QueryDescriptor::SetOf { .. }, QueryDescriptor::SetOf { .. })
        );
        if !same_kind || self.selected().len() != other.selected().len() {
            return false;
        }
        let mut renaming = Renaming::default();
        let selected = self
            .selected()
            .iter()
            .zip(other.selected())
            .all(|(a, b)| renaming.terms(a, b));
        selected
            && match (self.condition(), other.condition()) {
                (None, None) => true,
                (Some(a), Some(b)) => renaming.conditions(a, b),
                _ => false,
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{entity, eq, exists, flatten, Variable};
    use crate::reflect::{RecordType, TypeCatalog, TypeExpr};
    use crate::Result;

    fn catalog() -> Result<TypeCatalog> {
        let mut catalog = TypeCatalog::new();
        catalog.register_record(
            RecordType::new("Shelf")
                .field("name", TypeExpr::str())
                .field("items", TypeExpr::list(TypeExpr::str())),
        )?;
        Ok(catalog)
    }

    #[test]
    fn renamed_variables_are_equivalent() -> Result<()> {
        let catalog = catalog()?;
        let a = Variable::new("Shelf");
        let b = Variable::new("Shelf").named("other");
        let left = entity(&a, [eq(a.attr(&catalog, "name")?, "S1")]);
        let right = entity(&b, [eq(b.attr(&catalog, "name")?, "S1")]);
        assert!(left.is_equivalent(&right));
        assert_ne!(left, right);
        let changed = entity(&b, [eq(b.attr(&catalog, "name")?, "S2")]);
        assert!(!left.is_equivalent(&changed));
        Ok(())
    }

    #[test]
    fn renaming_must_be_one_to_one() -> Result<()> {
        let catalog = catalog()?;
        let a = Variable::new("Shelf");
        let b = Variable::new("Shelf");
        let c = Variable::new("Shelf");
        let left = eq(a.attr(&catalog, "name")?, b.attr(&catalog, "name")?);
        let joined = eq(c.attr(&catalog, "name")?, c.attr(&catalog, "name")?);
        assert!(!left.is_equivalent(&joined));
        assert!(!joined.is_equivalent(&left));
        Ok(())
    }

    #[test]
    fn unnest_identity_participates_in_renaming() -> Result<()> {
        let catalog = catalog()?;
        let a = Variable::new("Shelf");
        let item = flatten(a.attr(&catalog, "items")?);
        let shared = exists(item.clone(), eq(item.clone(), "x"));
        let fresh = exists(item, eq(flatten(a.attr(&catalog, "items")?), "x"));
        assert!(!shared.is_equivalent(&fresh));
        assert!(shared.is_equivalent(&shared.clone()));
        Ok(())
    }
}
