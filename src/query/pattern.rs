//! Match/Select pattern compiler.
//!
//! A [`Pattern`] is a builder-time description of nested per-field
//! constraints. [`Pattern::compile`] lowers it in one pass into a single
//! [`QueryDescriptor`] rooted at one variable:
//!
//! * a field assigned a value or term becomes exactly one comparator, chosen
//!   by comparing the cardinality of the field and of the value;
//! * a field assigned a nested pattern is resolved against the attribute,
//!   unnesting it first when the field holds a container;
//! * nested selections are collected into one accumulator owned by the
//!   compile call, so several selected entities yield one flat tuple.

use std::fmt;

use tracing::{debug, trace};

use super::expr::{
    and_, contains, entity, eq, exists, flatten, for_all, has_type, in_, set_of, Condition,
    QueryDescriptor, Term, Variable,
};
use crate::error::{QueryError, Result};
use crate::reflect::TypeCatalog;
use crate::value::{RecordRef, Value};

/// What a pattern matches: instances of a named type, or an already-bound
/// term.
#[derive(Clone, Debug)]
pub enum PatternTarget {
    /// Instances of the named type.
    Type(String),
    /// A bound variable, attribute or literal.
    Term(Term),
}

impl From<&str> for PatternTarget {
    fn from(ty: &str) -> Self {
        PatternTarget::Type(ty.to_owned())
    }
}

impl From<String> for PatternTarget {
    fn from(ty: String) -> Self {
        PatternTarget::Type(ty)
    }
}

impl From<Term> for PatternTarget {
    fn from(term: Term) -> Self {
        PatternTarget::Term(term)
    }
}

impl From<Variable> for PatternTarget {
    fn from(var: Variable) -> Self {
        PatternTarget::Term(Term::Variable(var))
    }
}

impl From<&Variable> for PatternTarget {
    fn from(var: &Variable) -> Self {
        PatternTarget::Term(Term::from(var))
    }
}

impl From<Value> for PatternTarget {
    fn from(value: Value) -> Self {
        PatternTarget::Term(Term::Literal(value))
    }
}

impl From<RecordRef> for PatternTarget {
    fn from(record: RecordRef) -> Self {
        PatternTarget::Term(Term::lit(record))
    }
}

impl From<&RecordRef> for PatternTarget {
    fn from(record: &RecordRef) -> Self {
        PatternTarget::Term(Term::lit(record))
    }
}

/// Constraint assigned to one field of a pattern.
#[derive(Clone, Debug)]
pub enum FieldValue {
    /// A literal value.
    Value(Value),
    /// A bound term.
    Term(Term),
    /// A nested pattern.
    Pattern(Box<Pattern>),
}

impl From<Pattern> for FieldValue {
    fn from(pattern: Pattern) -> Self {
        FieldValue::Pattern(Box::new(pattern))
    }
}

impl From<Term> for FieldValue {
    fn from(term: Term) -> Self {
        FieldValue::Term(term)
    }
}

impl From<&Term> for FieldValue {
    fn from(term: &Term) -> Self {
        FieldValue::Term(term.clone())
    }
}

impl From<Variable> for FieldValue {
    fn from(var: Variable) -> Self {
        FieldValue::Term(Term::Variable(var))
    }
}

impl From<&Variable> for FieldValue {
    fn from(var: &Variable) -> Self {
        FieldValue::Term(Term::from(var))
    }
}

macro_rules! literal_field_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Value(value.into())
                }
            }
        )*
    };
}

literal_field_value!(Value, &str, String, i64, i32, f64, bool, RecordRef, &RecordRef, Vec<Value>, Vec<RecordRef>);

/// Builder-time description of nested per-field constraints.
#[derive(Clone, Debug, Default)]
pub struct Pattern {
    ty: Option<String>,
    domain: Option<Vec<Value>>,
    bound: Option<Term>,
    name: Option<String>,
    fields: Vec<(String, FieldValue)>,
    selected: bool,
    existential: bool,
    universal: bool,
    iterable: bool,
}

impl Pattern {
    fn from_target(target: PatternTarget) -> Self {
        match target {
            PatternTarget::Type(ty) => Self {
                ty: Some(ty),
                ..Self::default()
            },
            PatternTarget::Term(term) => Self {
                ty: term.static_type().map(str::to_owned),
                bound: Some(term),
                ..Self::default()
            },
        }
    }

    /// Assigns a constraint to `field`; assigning the same field again
    /// replaces the earlier constraint.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
        self
    }

    /// Marks the matched value itself as a container, so the enclosing
    /// field is not unnested.
    pub fn iterable(mut self) -> Self {
        self.iterable = true;
        self
    }

    /// Restricts a root pattern's variable to an explicit collection.
    pub fn in_domain<I, V>(mut self, domain: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.domain = Some(domain.into_iter().map(Into::into).collect());
        self
    }

    /// Names the root variable.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Requested type, if any.
    pub fn ty(&self) -> Option<&str> {
        self.ty.as_deref()
    }

    /// Field constraints in assignment order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Whether the matched term is selected.
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Whether the pattern is satisfied by any element of a container field.
    pub fn is_existential(&self) -> bool {
        self.existential
    }

    /// Whether the pattern must hold for every element of a container field.
    pub fn is_universal(&self) -> bool {
        self.universal
    }

    /// Whether the pattern is bound to a term already.
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Lowers the pattern into an immutable [`CompiledQuery`].
    ///
    /// Every compile-time error is raised here, before any domain is read.
    pub fn compile(&self, catalog: &TypeCatalog) -> Result<CompiledQuery> {
        let root = self.root_term(catalog)?;
        let mut ctx = CompileContext {
            catalog,
            selected: Vec::new(),
        };
        if self.selected {
            ctx.select(root.clone());
        }
        let conditions = ctx.resolve(self, &root)?;
        let condition_count = conditions.len();
        let descriptor = match ctx.selected.len() {
            0 => entity(root.clone(), conditions),
            1 => entity(ctx.selected.remove(0), conditions),
            _ => set_of(ctx.selected, conditions),
        };
        debug!(
            root = %root,
            conditions = condition_count,
            selected = descriptor.selected().len(),
            "compiled pattern"
        );
        Ok(CompiledQuery { root, descriptor })
    }

    fn root_term(&self, catalog: &TypeCatalog) -> Result<Term> {
        if let Some(bound) = &self.bound {
            return Ok(bound.clone());
        }
        let ty = self.ty.as_deref().ok_or(QueryError::MissingPatternType)?;
        catalog.resolve_name(ty)?;
        let var = match &self.domain {
            Some(domain) => Variable::with_domain(ty, domain.iter().cloned()),
            None => Variable::new(ty),
        };
        Ok(Term::Variable(match &self.name {
            Some(name) => var.named(name.clone()),
            None => var,
        }))
    }
}

/// Matches instances of `target`.
pub fn match_(target: impl Into<PatternTarget>) -> Pattern {
    Pattern::from_target(target.into())
}

/// Matches when any element of the enclosing container field matches.
pub fn match_any(target: impl Into<PatternTarget>) -> Pattern {
    Pattern {
        existential: true,
        ..match_(target)
    }
}

/// Matches when every element of the enclosing container field matches.
pub fn match_all(target: impl Into<PatternTarget>) -> Pattern {
    Pattern {
        universal: true,
        ..match_(target)
    }
}

/// Matches instances of `target` and selects them.
pub fn select(target: impl Into<PatternTarget>) -> Pattern {
    Pattern {
        selected: true,
        ..match_(target)
    }
}

/// Existential match that also selects the matching elements.
pub fn select_any(target: impl Into<PatternTarget>) -> Pattern {
    Pattern {
        selected: true,
        existential: true,
        ..match_(target)
    }
}

/// Selects the field it is assigned to, whatever its type.
pub fn select_field() -> Pattern {
    Pattern {
        selected: true,
        ..Pattern::default()
    }
}

/// Root pattern over an explicit collection of candidates.
pub fn entity_matching<I, V>(ty: impl Into<String>, domain: I) -> Pattern
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    match_(PatternTarget::Type(ty.into())).in_domain(domain)
}

/// Result of compiling a [`Pattern`].
#[derive(Clone, Debug)]
pub struct CompiledQuery {
    root: Term,
    descriptor: QueryDescriptor,
}

impl CompiledQuery {
    /// Term the root pattern is bound to.
    pub fn root(&self) -> &Term {
        &self.root
    }

    /// Projection descriptor.
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Consumes the query, returning its descriptor.
    pub fn into_descriptor(self) -> QueryDescriptor {
        self.descriptor
    }
}

impl From<CompiledQuery> for QueryDescriptor {
    fn from(query: CompiledQuery) -> Self {
        query.descriptor
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

/// Accumulator threaded through one compile call.
struct CompileContext<'c> {
    catalog: &'c TypeCatalog,
    selected: Vec<Term>,
}

impl CompileContext<'_> {
    fn select(&mut self, term: Term) {
        trace!(term = %term, "selecting term");
        self.selected.push(term);
    }

    /// Conditions contributed by `pattern`'s fields, read off `term`.
    fn resolve(&mut self, pattern: &Pattern, term: &Term) -> Result<Vec<Condition>> {
        let mut conditions = Vec::new();
        for (field, value) in &pattern.fields {
            let owner = pattern
                .ty
                .as_deref()
                .or_else(|| term.static_type())
                .ok_or_else(|| QueryError::NoBackingField {
                    ty: term.to_string(),
                    field: field.clone(),
                })?;
            let attr = self.attribute(term, owner, field)?;
            match value {
                FieldValue::Value(value) => {
                    let value = Term::Literal(value.clone());
                    conditions.push(Self::bound_condition(&attr, &value, false, false));
                }
                FieldValue::Term(value) => {
                    conditions.push(Self::bound_condition(&attr, value, false, false));
                }
                FieldValue::Pattern(child) => match &child.bound {
                    Some(bound) => {
                        if child.selected {
                            self.select(bound.clone());
                        }
                        conditions.extend(self.resolve(child, bound)?);
                        conditions.push(Self::bound_condition(
                            &attr,
                            bound,
                            child.existential,
                            child.universal,
                        ));
                    }
                    None => self.resolve_nested(field, attr, child, &mut conditions)?,
                },
            }
        }
        Ok(conditions)
    }

    fn attribute(&self, base: &Term, owner: &str, field: &str) -> Result<Term> {
        if self.catalog.record_type(owner).is_err() {
            self.catalog.resolve_name(owner)?;
            return Err(QueryError::NoBackingField {
                ty: owner.to_owned(),
                field: field.to_owned(),
            });
        }
        let descriptor = self.catalog.classify(owner, field).map_err(|err| match err {
            QueryError::UnresolvedField { ty, field } => QueryError::NoBackingField { ty, field },
            other => other,
        })?;
        Ok(Term::Attribute {
            base: Box::new(base.clone()),
            field: descriptor,
        })
    }

    /// `HasType` filter when the child requests a strict subtype of what
    /// the field holds.
    fn type_filter(
        &self,
        field: &str,
        term: &Term,
        child: &Pattern,
        held: Option<&str>,
    ) -> Result<Option<Condition>> {
        let (Some(requested), Some(held)) = (child.ty.as_deref(), held) else {
            return Ok(None);
        };
        if requested == held {
            return Ok(None);
        }
        self.catalog.resolve_name(requested)?;
        if self.catalog.is_subtype(requested, held) {
            Ok(Some(has_type(term.clone(), requested)))
        } else if self.catalog.is_subtype(held, requested) {
            Ok(None)
        } else {
            Err(QueryError::IncompatiblePatternType {
                field: field.to_owned(),
                expected: held.to_owned(),
                found: requested.to_owned(),
            })
        }
    }

    fn resolve_nested(
        &mut self,
        field: &str,
        attr: Term,
        child: &Pattern,
        conditions: &mut Vec<Condition>,
    ) -> Result<()> {
        let unnest = attr.is_iterable() && !child.iterable;
        let held = attr
            .field()
            .and_then(|desc| desc.type_endpoint().name())
            .map(str::to_owned);
        let term = if unnest { flatten(attr) } else { attr };
        let before = self.selected.len();
        if child.selected {
            if child.universal {
                return Err(QueryError::SelectionUnderUniversal {
                    field: field.to_owned(),
                });
            }
            self.select(term.clone());
        }
        let mut group: Vec<Condition> = self
            .type_filter(field, &term, child, held.as_deref())?
            .into_iter()
            .collect();
        group.extend(self.resolve(child, &term)?);
        let selects_inside = self.selected.len() > before;
        if unnest && child.universal {
            if selects_inside {
                return Err(QueryError::SelectionUnderUniversal {
                    field: field.to_owned(),
                });
            }
            conditions.push(for_all(term, conjunction(group)));
        } else if unnest && child.existential && !selects_inside {
            conditions.push(exists(term, conjunction(group)));
        } else {
            conditions.extend(group);
        }
        Ok(())
    }

    /// The single comparator synthesised for a field assigned a bound value.
    fn bound_condition(attr: &Term, value: &Term, existential: bool, universal: bool) -> Condition {
        let (condition, unnested) = match (attr.is_iterable(), value.is_iterable()) {
            (true, false) => (contains(attr, value), None),
            (false, true) => (in_(attr, value), None),
            (true, true) if !universal => {
                let element = flatten(attr);
                (in_(element.clone(), value), Some(element))
            }
            _ => (eq(attr, value), None),
        };
        if existential {
            exists(unnested.unwrap_or_else(|| attr.clone()), condition)
        } else {
            condition
        }
    }
}

fn conjunction(mut group: Vec<Condition>) -> Condition {
    if group.len() == 1 {
        group.remove(0)
    } else {
        and_(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{RecordType, TypeExpr};
    use crate::value::Record;

    fn catalog() -> Result<TypeCatalog> {
        let mut catalog = TypeCatalog::new();
        catalog.register_record(
            RecordType::new("Body")
                .field("name", TypeExpr::str())
                .queryable(),
        )?;
        catalog.register_record(RecordType::new("Drawer").extends("Body"))?;
        catalog.register_record(
            RecordType::new("LockedDrawer")
                .extends("Drawer")
                .field("code", TypeExpr::int()),
        )?;
        catalog.register_record(
            RecordType::new("Cabinet")
                .extends("Body")
                .field("drawers", TypeExpr::list(TypeExpr::named("Drawer")))
                .field("tags", TypeExpr::set(TypeExpr::str())),
        )?;
        Ok(catalog)
    }

    #[test]
    fn flat_pattern_matches_manual_entity() -> Result<()> {
        let catalog = catalog()?;
        let compiled = match_("Cabinet")
            .with("name", "C1")
            .with("tags", "oak")
            .compile(&catalog)?;
        let var = Variable::new("Cabinet");
        let manual = entity(
            &var,
            [
                eq(var.attr(&catalog, "name")?, "C1"),
                contains(var.attr(&catalog, "tags")?, "oak"),
            ],
        );
        assert!(compiled.descriptor().is_equivalent(&manual));
        Ok(())
    }

    #[test]
    fn reassigning_a_field_replaces_it() -> Result<()> {
        let catalog = catalog()?;
        let pattern = match_("Body").with("name", "a").with("name", "b");
        assert_eq!(pattern.fields().count(), 1);
        let compiled = pattern.compile(&catalog)?;
        assert_eq!(
            compiled.descriptor().condition().map(ToString::to_string),
            Some("Body.name == \"b\"".to_owned())
        );
        Ok(())
    }

    #[test]
    fn nested_subtype_adds_type_filter_before_fields() -> Result<()> {
        let catalog = catalog()?;
        let compiled = match_("Cabinet")
            .named("c")
            .with("drawers", match_("LockedDrawer").with("code", 7))
            .compile(&catalog)?;
        let conjuncts = compiled.descriptor().conjuncts();
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(conjuncts[0].to_string(), "has_type(flatten(c.drawers), LockedDrawer)");
        assert_eq!(conjuncts[1].to_string(), "flatten(c.drawers).code == 7");
        Ok(())
    }

    #[test]
    fn existential_and_universal_wrap_the_group() -> Result<()> {
        let catalog = catalog()?;
        let any = match_("Cabinet")
            .named("c")
            .with("drawers", match_any("Drawer").with("name", "D1"))
            .compile(&catalog)?;
        assert_eq!(
            any.descriptor().condition().map(ToString::to_string),
            Some("exists(flatten(c.drawers), flatten(c.drawers).name == \"D1\")".to_owned())
        );
        let all = match_("Cabinet")
            .named("c")
            .with("drawers", match_all("Drawer").with("name", "D1"))
            .compile(&catalog)?;
        assert!(matches!(
            all.descriptor().condition(),
            Some(Condition::ForAll { .. })
        ));
        Ok(())
    }

    #[test]
    fn bound_values_follow_cardinality() -> Result<()> {
        let catalog = catalog()?;
        let drawer = Record::new("Drawer", [("name", "D1")]);
        let cases = [
            (FieldValue::from(&drawer), "contains(c.drawers, Drawer#"),
            (
                FieldValue::from(vec![Value::from(&drawer)]),
                "contains([Drawer#",
            ),
        ];
        for (value, prefix) in cases {
            let compiled = match_("Cabinet").named("c").with("drawers", value).compile(&catalog)?;
            let text = compiled.descriptor().to_string();
            assert!(text.contains(prefix), "{text}");
        }
        let scalar_in_list = match_("Cabinet")
            .named("c")
            .with("name", vec![Value::from("a"), Value::from("b")])
            .compile(&catalog)?;
        assert!(scalar_in_list
            .descriptor()
            .to_string()
            .contains("contains([\"a\", \"b\"], c.name)"));
        Ok(())
    }

    #[test]
    fn universal_with_iterable_value_compares_whole_container() -> Result<()> {
        let catalog = catalog()?;
        let tags = Term::lit(Value::Set(vec![Value::from("oak")]));
        let compiled = match_("Cabinet")
            .named("c")
            .with("tags", match_all(tags))
            .compile(&catalog)?;
        assert_eq!(
            compiled.descriptor().condition().map(ToString::to_string),
            Some("c.tags == {\"oak\"}".to_owned())
        );
        Ok(())
    }

    #[test]
    fn selections_bubble_to_the_root() -> Result<()> {
        let catalog = catalog()?;
        let compiled = match_("Cabinet")
            .named("c")
            .with("name", select_field())
            .with("drawers", select("Drawer").with("name", select_field()))
            .compile(&catalog)?;
        let labels: Vec<String> = compiled
            .descriptor()
            .selected()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            labels,
            ["c.name", "flatten(c.drawers)", "flatten(c.drawers).name"]
        );
        assert!(matches!(compiled.descriptor(), QueryDescriptor::SetOf { .. }));
        Ok(())
    }

    #[test]
    fn compile_errors_are_eager() -> Result<()> {
        let catalog = catalog()?;
        assert_eq!(
            select_field().compile(&catalog).err(),
            Some(QueryError::MissingPatternType)
        );
        assert!(matches!(
            match_("Nope").compile(&catalog),
            Err(QueryError::TypeResolution { .. })
        ));
        assert!(matches!(
            match_("Cabinet").with("color", "red").compile(&catalog),
            Err(QueryError::NoBackingField { .. })
        ));
        assert!(matches!(
            match_("Cabinet")
                .with("drawers", match_("Cabinet"))
                .compile(&catalog),
            Err(QueryError::IncompatiblePatternType { .. })
        ));
        assert!(matches!(
            match_("Cabinet")
                .with("drawers", match_all("Drawer").with("name", select_field()))
                .compile(&catalog),
            Err(QueryError::SelectionUnderUniversal { .. })
        ));
        assert!(matches!(
            match_("Cabinet")
                .with("name", match_("str").with("len", 1))
                .compile(&catalog),
            Err(QueryError::NoBackingField { .. })
        ));
        Ok(())
    }

    #[test]
    fn compiling_twice_is_equivalent() -> Result<()> {
        let catalog = catalog()?;
        let pattern = match_("Cabinet")
            .with("drawers", match_any("Drawer").with("name", "D1"))
            .with("name", select_field());
        let first = pattern.compile(&catalog)?;
        let second = pattern.compile(&catalog)?;
        assert!(first.descriptor().is_equivalent(second.descriptor()));
        assert_eq!(
            first.descriptor().query_hash(),
            second.descriptor().query_hash()
        );
        assert_ne!(first.descriptor(), second.descriptor());
        Ok(())
    }
}
