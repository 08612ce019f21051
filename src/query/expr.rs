//! Symbolic expression model.
//!
//! A compiled query is a tree of [`Condition`]s over value-producing
//! [`Term`]s, wrapped in a [`QueryDescriptor`] that names the selected
//! terms. Variables are shared handles: every node that mentions a variable
//! holds a clone of the same [`Variable`], and joins fall out of two paths
//! reaching the same [`BindingId`].

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{QueryError, Result};
use crate::reflect::{FieldDescriptor, TypeCatalog};
use crate::value::{RecordRef, Value};

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a binder (a variable or an unnest node).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct BindingId(pub u64);

impl BindingId {
    pub(crate) fn fresh() -> Self {
        BindingId(NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Where a variable draws its candidate values from.
#[derive(Clone, Debug)]
pub enum Domain {
    /// An explicit collection, filtered to instances of the variable's type
    /// when enumerated.
    Explicit(Arc<[Value]>),
    /// All tracked instances of the variable's type in the
    /// [`SymbolGraph`](crate::registry::SymbolGraph).
    Registry,
}

#[derive(Clone, Debug)]
struct VariableInner {
    id: BindingId,
    ty: String,
    name: String,
    domain: Domain,
}

/// Named placeholder typed to a record or scalar type.
///
/// The domain is fixed at construction. Clones share identity.
#[derive(Clone, Debug)]
pub struct Variable(Arc<VariableInner>);

impl Variable {
    /// A variable over every registered instance of `ty`.
    pub fn new(ty: impl Into<String>) -> Self {
        Self::with_source(ty.into(), Domain::Registry)
    }

    /// A variable over an explicit collection.
    pub fn with_domain<I, V>(ty: impl Into<String>, domain: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = domain.into_iter().map(Into::into).collect();
        Self::with_source(ty.into(), Domain::Explicit(values.into()))
    }

    fn with_source(ty: String, domain: Domain) -> Self {
        Variable(Arc::new(VariableInner {
            id: BindingId::fresh(),
            name: ty.clone(),
            ty,
            domain,
        }))
    }

    /// Renames the variable. The identity is unchanged.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.0).name = name.into();
        self
    }

    /// Identity of the variable.
    pub fn id(&self) -> BindingId {
        self.0.id
    }

    /// Declared type name.
    pub fn ty(&self) -> &str {
        &self.0.ty
    }

    /// Display name; defaults to the type name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Domain source.
    pub fn domain(&self) -> &Domain {
        &self.0.domain
    }

    /// Attribute access `self.field`, classified through `catalog`.
    pub fn attr(&self, catalog: &TypeCatalog, field: &str) -> Result<Term> {
        Term::from(self).attr(catalog, field)
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Variable {}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Value-producing expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    /// Reference to a variable.
    Variable(Variable),
    /// Attribute read off another term.
    Attribute {
        /// Term the field is read from.
        base: Box<Term>,
        /// Classified field.
        field: Arc<FieldDescriptor>,
    },
    /// One binding per element of the inner container value.
    Flatten {
        /// Identity shared by every reference to this unnest.
        id: BindingId,
        /// Container-valued term.
        inner: Box<Term>,
    },
    /// Constant value.
    Literal(Value),
}

impl Term {
    /// Literal term.
    pub fn lit(value: impl Into<Value>) -> Self {
        Term::Literal(value.into())
    }

    /// Attribute access `self.field`.
    ///
    /// Fails with [`QueryError::NotARecord`] when the term has no static
    /// record type and with [`QueryError::UnresolvedField`] when the type has
    /// no such field.
    pub fn attr(self, catalog: &TypeCatalog, field: &str) -> Result<Term> {
        let ty = self
            .static_type()
            .ok_or_else(|| QueryError::NotARecord {
                field: field.to_owned(),
                found: "untyped",
            })?
            .to_owned();
        if catalog.record_type(&ty).is_err() {
            return Err(QueryError::NotARecord {
                field: field.to_owned(),
                found: if catalog.contains(&ty) { "enum" } else { "scalar" },
            });
        }
        let descriptor = catalog.classify(&ty, field)?;
        Ok(Term::Attribute {
            base: Box::new(self),
            field: descriptor,
        })
    }

    /// Type name the term is known to produce at compile time. For iterable
    /// attributes this is the element type.
    pub fn static_type(&self) -> Option<&str> {
        match self {
            Term::Variable(var) => Some(var.ty()),
            Term::Attribute { field, .. } => field.type_endpoint().name(),
            Term::Flatten { inner, .. } => inner.static_type(),
            Term::Literal(value) => match value {
                Value::Record(record) => Some(record.type_name()),
                Value::Enum { ty, .. } => Some(ty),
                Value::Null
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::String(_)
                | Value::DateTime(_) => Some(value.kind()),
                _ => None,
            },
        }
    }

    /// Whether the term produces a container.
    pub fn is_iterable(&self) -> bool {
        match self {
            Term::Attribute { field, .. } => field.is_iterable(),
            Term::Literal(value) => value.is_container(),
            Term::Variable(_) | Term::Flatten { .. } => false,
        }
    }

    /// Identity this term binds, for variables and unnest nodes.
    pub fn binder(&self) -> Option<BindingId> {
        match self {
            Term::Variable(var) => Some(var.id()),
            Term::Flatten { id, .. } => Some(*id),
            Term::Attribute { .. } | Term::Literal(_) => None,
        }
    }

    /// Field descriptor of an attribute term.
    pub fn field(&self) -> Option<&Arc<FieldDescriptor>> {
        match self {
            Term::Attribute { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Collects the binder terms this term depends on, innermost first,
    /// without duplicates.
    pub fn binder_terms<'t>(&'t self, out: &mut Vec<&'t Term>) {
        match self {
            Term::Variable(var) => push_binder(out, self, var.id()),
            Term::Attribute { base, .. } => base.binder_terms(out),
            Term::Flatten { id, inner } => {
                inner.binder_terms(out);
                push_binder(out, self, *id);
            }
            Term::Literal(_) => {}
        }
    }
}

fn push_binder<'t>(out: &mut Vec<&'t Term>, term: &'t Term, id: BindingId) {
    if !out.iter().any(|seen| seen.binder() == Some(id)) {
        out.push(term);
    }
}

/// Unnest `term`: one binding per element of its container value.
pub fn flatten(term: impl Into<Term>) -> Term {
    Term::Flatten {
        id: BindingId::fresh(),
        inner: Box::new(term.into()),
    }
}

impl From<Variable> for Term {
    fn from(var: Variable) -> Self {
        Term::Variable(var)
    }
}

impl From<&Variable> for Term {
    fn from(var: &Variable) -> Self {
        Term::Variable(var.clone())
    }
}

impl From<&Term> for Term {
    fn from(term: &Term) -> Self {
        term.clone()
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Term::Literal(value)
    }
}

impl From<&str> for Term {
    fn from(value: &str) -> Self {
        Term::lit(value)
    }
}

impl From<String> for Term {
    fn from(value: String) -> Self {
        Term::lit(value)
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Term::lit(value)
    }
}

impl From<i32> for Term {
    fn from(value: i32) -> Self {
        Term::lit(value)
    }
}

impl From<f64> for Term {
    fn from(value: f64) -> Self {
        Term::lit(value)
    }
}

impl From<bool> for Term {
    fn from(value: bool) -> Self {
        Term::lit(value)
    }
}

impl From<RecordRef> for Term {
    fn from(value: RecordRef) -> Self {
        Term::lit(value)
    }
}

impl From<&RecordRef> for Term {
    fn from(value: &RecordRef) -> Self {
        Term::lit(value)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(var) => write!(f, "{var}"),
            Term::Attribute { base, field } => write!(f, "{base}.{}", field.name()),
            Term::Flatten { inner, .. } => write!(f, "flatten({inner})"),
            Term::Literal(value) => write!(f, "{value}"),
        }
    }
}

/// Comparator operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// Container on the left holds the item on the right.
    Contains,
}

impl CmpOp {
    /// Operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Contains => "contains",
        }
    }
}

/// Boolean expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Binary comparison.
    Comparator {
        /// Left operand.
        left: Term,
        /// Operator.
        op: CmpOp,
        /// Right operand.
        right: Term,
    },
    /// Sequential conjunction. Empty is true.
    And(Vec<Condition>),
    /// Disjunction with de-duplicated solutions.
    Or(Vec<Condition>),
    /// Negation as failure; adds no bindings.
    Not(Box<Condition>),
    /// Some value of `over` satisfies `condition`.
    Exists {
        /// Quantified term.
        over: Term,
        /// Condition checked per value.
        condition: Box<Condition>,
    },
    /// Every value of `over` satisfies `condition`.
    ForAll {
        /// Quantified term.
        over: Term,
        /// Condition checked per value.
        condition: Box<Condition>,
    },
    /// The term's value is a record of `ty` or a subtype.
    HasType {
        /// Checked term.
        term: Term,
        /// Required type name.
        ty: String,
    },
    /// A boolean-valued term used as a condition.
    Truthy(Term),
}

impl Condition {
    /// Always-true condition.
    pub fn always() -> Self {
        Condition::And(Vec::new())
    }

    /// Visits every term mentioned directly by this condition or its
    /// children, in tree order.
    pub fn walk_terms<'t>(&'t self, visit: &mut impl FnMut(&'t Term)) {
        match self {
            Condition::Comparator { left, right, .. } => {
                visit(left);
                visit(right);
            }
            Condition::And(children) | Condition::Or(children) => {
                for child in children {
                    child.walk_terms(visit);
                }
            }
            Condition::Not(child) => child.walk_terms(visit),
            Condition::Exists { over, condition } | Condition::ForAll { over, condition } => {
                visit(over);
                condition.walk_terms(visit);
            }
            Condition::HasType { term, .. } | Condition::Truthy(term) => visit(term),
        }
    }

    /// Binder terms that are free in this condition: every variable and
    /// unnest it depends on, except the binders consumed by a nested
    /// quantifier.
    pub fn free_binders<'t>(&'t self, out: &mut Vec<&'t Term>) {
        match self {
            Condition::Comparator { left, right, .. } => {
                left.binder_terms(out);
                right.binder_terms(out);
            }
            Condition::And(children) | Condition::Or(children) => {
                for child in children {
                    child.free_binders(out);
                }
            }
            Condition::Not(child) => child.free_binders(out),
            Condition::Exists { over, condition } | Condition::ForAll { over, condition } => {
                out.extend(quantifier_free_binders(over, condition));
            }
            Condition::HasType { term, .. } | Condition::Truthy(term) => term.binder_terms(out),
        }
        let mut seen = Vec::with_capacity(out.len());
        out.retain(|term| {
            let id = term.binder();
            if seen.contains(&id) {
                false
            } else {
                seen.push(id);
                true
            }
        });
    }

    /// Number of nodes in the condition tree.
    pub fn size(&self) -> usize {
        1 + match self {
            Condition::And(children) | Condition::Or(children) => {
                children.iter().map(Condition::size).sum()
            }
            Condition::Not(child) => child.size(),
            Condition::Exists { condition, .. } | Condition::ForAll { condition, .. } => {
                condition.size()
            }
            _ => 0,
        }
    }
}

/// Outer binders a quantifier needs grounded before it can run: the binders
/// `over` depends on plus the free binders of `condition`, minus the
/// quantified binder and every binder reached through it.
pub(crate) fn quantifier_free_binders<'t>(over: &'t Term, condition: &'t Condition) -> Vec<&'t Term> {
    let mut inner = Vec::new();
    match over {
        Term::Flatten { inner: container, .. } => container.binder_terms(&mut inner),
        Term::Variable(_) => {}
        other => other.binder_terms(&mut inner),
    }
    condition.free_binders(&mut inner);
    if let Some(quantified) = over.binder() {
        inner.retain(|term| !depends_on(term, quantified));
    }
    inner
}

fn depends_on(term: &Term, id: BindingId) -> bool {
    let mut chain = Vec::new();
    term.binder_terms(&mut chain);
    chain.iter().any(|link| link.binder() == Some(id))
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, children: &[Condition], sep: &str) -> fmt::Result {
            write!(f, "(")?;
            for (idx, child) in children.iter().enumerate() {
                if idx > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{child}")?;
            }
            write!(f, ")")
        }
        match self {
            Condition::Comparator {
                left,
                op: CmpOp::Contains,
                right,
            } => write!(f, "contains({left}, {right})"),
            Condition::Comparator { left, op, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
            Condition::And(children) if children.is_empty() => write!(f, "true"),
            Condition::And(children) => join(f, children, "AND"),
            Condition::Or(children) if children.is_empty() => write!(f, "false"),
            Condition::Or(children) => join(f, children, "OR"),
            Condition::Not(child) => write!(f, "NOT {child}"),
            Condition::Exists { over, condition } => write!(f, "exists({over}, {condition})"),
            Condition::ForAll { over, condition } => write!(f, "for_all({over}, {condition})"),
            Condition::HasType { term, ty } => write!(f, "has_type({term}, {ty})"),
            Condition::Truthy(term) => write!(f, "{term}"),
        }
    }
}

fn compare(left: impl Into<Term>, op: CmpOp, right: impl Into<Term>) -> Condition {
    Condition::Comparator {
        left: left.into(),
        op,
        right: right.into(),
    }
}

/// `left == right`.
pub fn eq(left: impl Into<Term>, right: impl Into<Term>) -> Condition {
    compare(left, CmpOp::Eq, right)
}

/// `left != right`.
pub fn ne(left: impl Into<Term>, right: impl Into<Term>) -> Condition {
    compare(left, CmpOp::Ne, right)
}

/// `left < right`.
pub fn lt(left: impl Into<Term>, right: impl Into<Term>) -> Condition {
    compare(left, CmpOp::Lt, right)
}

/// `left <= right`.
pub fn le(left: impl Into<Term>, right: impl Into<Term>) -> Condition {
    compare(left, CmpOp::Le, right)
}

/// `left > right`.
pub fn gt(left: impl Into<Term>, right: impl Into<Term>) -> Condition {
    compare(left, CmpOp::Gt, right)
}

/// `left >= right`.
pub fn ge(left: impl Into<Term>, right: impl Into<Term>) -> Condition {
    compare(left, CmpOp::Ge, right)
}

/// `container` holds `item`.
pub fn contains(container: impl Into<Term>, item: impl Into<Term>) -> Condition {
    compare(container, CmpOp::Contains, item)
}

/// `item` is an element of `container`.
pub fn in_(item: impl Into<Term>, container: impl Into<Term>) -> Condition {
    contains(container, item)
}

/// Conjunction of `conditions`.
pub fn and_(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::And(conditions.into_iter().collect())
}

/// Disjunction of `conditions`.
pub fn or_(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::Or(conditions.into_iter().collect())
}

/// Negation of `condition`.
pub fn not_(condition: Condition) -> Condition {
    Condition::Not(Box::new(condition))
}

/// Some value of `over` satisfies `condition`.
pub fn exists(over: impl Into<Term>, condition: Condition) -> Condition {
    Condition::Exists {
        over: over.into(),
        condition: Box::new(condition),
    }
}

/// Every value of `over` satisfies `condition`.
pub fn for_all(over: impl Into<Term>, condition: Condition) -> Condition {
    Condition::ForAll {
        over: over.into(),
        condition: Box::new(condition),
    }
}

/// The value of `term` is a record of `ty` or one of its subtypes.
pub fn has_type(term: impl Into<Term>, ty: impl Into<String>) -> Condition {
    Condition::HasType {
        term: term.into(),
        ty: ty.into(),
    }
}

/// Projection descriptor: which terms a query returns and under which
/// condition.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryDescriptor {
    /// A single selected term; answers are plain values.
    Entity {
        /// Selected term.
        selected: Term,
        /// Condition, `None` when unconstrained.
        condition: Option<Condition>,
    },
    /// Several selected terms; answers are tuples.
    SetOf {
        /// Selected terms in selection order.
        selected: Vec<Term>,
        /// Condition, `None` when unconstrained.
        condition: Option<Condition>,
    },
}

fn fold_conditions(conditions: impl IntoIterator<Item = Condition>) -> Option<Condition> {
    let mut conditions: Vec<Condition> = conditions.into_iter().collect();
    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(Condition::And(conditions)),
    }
}

/// Entity descriptor over the conjunction of `conditions`.
pub fn entity(
    selected: impl Into<Term>,
    conditions: impl IntoIterator<Item = Condition>,
) -> QueryDescriptor {
    QueryDescriptor::Entity {
        selected: selected.into(),
        condition: fold_conditions(conditions),
    }
}

/// Set-of descriptor over the conjunction of `conditions`.
pub fn set_of(
    selected: impl IntoIterator<Item = Term>,
    conditions: impl IntoIterator<Item = Condition>,
) -> QueryDescriptor {
    QueryDescriptor::SetOf {
        selected: selected.into_iter().collect(),
        condition: fold_conditions(conditions),
    }
}

impl QueryDescriptor {
    /// Selected terms in selection order.
    pub fn selected(&self) -> &[Term] {
        match self {
            QueryDescriptor::Entity { selected, .. } => std::slice::from_ref(selected),
            QueryDescriptor::SetOf { selected, .. } => selected,
        }
    }

    /// Declared type of each selected term.
    pub fn selected_types(&self) -> Vec<Option<&str>> {
        self.selected().iter().map(Term::static_type).collect()
    }

    /// The whole condition.
    pub fn condition(&self) -> Option<&Condition> {
        match self {
            QueryDescriptor::Entity { condition, .. }
            | QueryDescriptor::SetOf { condition, .. } => condition.as_ref(),
        }
    }

    /// Top-level conjuncts, with nested conjunctions flattened.
    pub fn conjuncts(&self) -> Vec<&Condition> {
        fn collect<'c>(cond: &'c Condition, out: &mut Vec<&'c Condition>) {
            match cond {
                Condition::And(children) => {
                    for child in children {
                        collect(child, out);
                    }
                }
                other => out.push(other),
            }
        }
        let mut out = Vec::new();
        if let Some(cond) = self.condition() {
            collect(cond, &mut out);
        }
        out
    }

    /// Variables mentioned anywhere in the descriptor, in first-mention
    /// order.
    pub fn variables(&self) -> Vec<&Variable> {
        let mut terms: Vec<&Term> = self.selected().iter().collect();
        if let Some(cond) = self.condition() {
            cond.walk_terms(&mut |term| terms.push(term));
        }
        let mut binders = Vec::new();
        for term in terms {
            term.binder_terms(&mut binders);
        }
        binders
            .into_iter()
            .filter_map(|term| match term {
                Term::Variable(var) => Some(var),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryDescriptor::Entity { .. } => "entity",
            QueryDescriptor::SetOf { .. } => "set_of",
        };
        write!(f, "{name}(")?;
        for (idx, term) in self.selected().iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{term}")?;
        }
        if let Some(cond) = self.condition() {
            write!(f, " | {cond}")?;
        }
        write!(f, ")")
    }
}
