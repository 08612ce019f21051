//! Unification evaluator.
//!
//! Conditions are solved depth-first by composing [`BindingStream`]s: a
//! variable contributes one row per domain value, an unnest contributes one
//! row per element of its container, comparators and type tests filter rows
//! and quantifiers consume their binder without exporting it. Answers are
//! pulled lazily through [`Answers`].

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::bindings::{Answer, Bindings, UnificationDict};
use super::expr::{quantifier_free_binders, BindingId, CmpOp, Condition, Domain, QueryDescriptor, Term, Variable};
use super::profile::{
    profile_timer, record_profile_timer, record_registry_scan, Profile, QueryProfileCounters,
    QueryProfileKind, QueryProfileSnapshot,
};
use super::quantifier::ResultQuantificationConstraint;
use super::stream::{
    BindValuesStream, BindingStream, BoxBindingStream, DistinctStream, ExpandStream,
    FilterStream, UnionStream, VecBindingStream,
};
use crate::error::{QueryError, Result};
use crate::reflect::TypeCatalog;
use crate::registry::SymbolGraph;
use crate::value::Value;

/// Evaluation options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvaluatorOptions {
    /// Drop answers whose selected binders repeat an earlier answer.
    pub distinct_answers: bool,
    /// Collect per-evaluator profiling counters.
    pub profile: bool,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            distinct_answers: true,
            profile: false,
        }
    }
}

impl EvaluatorOptions {
    /// Sets [`distinct_answers`](Self::distinct_answers).
    pub fn with_distinct_answers(mut self, distinct: bool) -> Self {
        self.distinct_answers = distinct;
        self
    }

    /// Sets [`profile`](Self::profile).
    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }
}

/// Evaluates compiled queries against a type catalog and an instance
/// registry.
///
/// An evaluator holds no per-query state, so one instance can serve any
/// number of sequential or concurrent evaluations.
#[derive(Debug)]
pub struct Evaluator {
    catalog: Arc<TypeCatalog>,
    registry: Arc<SymbolGraph>,
    options: EvaluatorOptions,
    counters: Option<QueryProfileCounters>,
}

impl Evaluator {
    /// Evaluator with default options.
    pub fn new(catalog: Arc<TypeCatalog>, registry: Arc<SymbolGraph>) -> Self {
        Self::with_options(catalog, registry, EvaluatorOptions::default())
    }

    /// Evaluator with explicit options.
    pub fn with_options(
        catalog: Arc<TypeCatalog>,
        registry: Arc<SymbolGraph>,
        options: EvaluatorOptions,
    ) -> Self {
        Self {
            catalog,
            registry,
            options,
            counters: options.profile.then(QueryProfileCounters::default),
        }
    }

    /// Type catalog used for type tests.
    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Instance registry backing registry-domain variables.
    pub fn registry(&self) -> &SymbolGraph {
        &self.registry
    }

    /// Active options.
    pub fn options(&self) -> EvaluatorOptions {
        self.options
    }

    /// Reads the profiling counters; `None` when profiling is off.
    pub fn profile_snapshot(&self, reset: bool) -> Option<QueryProfileSnapshot> {
        self.counters.as_ref().map(|counters| counters.snapshot(reset))
    }

    fn profile(&self) -> Profile<'_> {
        self.counters.as_ref()
    }

    /// Lazily evaluates `descriptor`, yielding one answer per distinct
    /// solution in domain order.
    pub fn evaluate<'a>(&'a self, descriptor: &'a QueryDescriptor) -> Answers<'a> {
        Answers::new(self, descriptor, None)
    }

    /// Whether `condition` has at least one solution extending `row`.
    pub fn holds(&self, condition: &Condition, row: &Bindings) -> Result<bool> {
        Scope::new(self).has_solution(condition, row.clone())
    }

    /// Candidate values of `var`, filtered to instances of its type.
    pub fn domain_of(&self, var: &Variable) -> Result<Vec<Value>> {
        let values = self.domain_values(var)?;
        Ok(values
            .iter()
            .filter(|value| self.catalog.value_is_instance(value, var.ty()))
            .cloned()
            .collect())
    }

    fn domain_values(&self, var: &Variable) -> Result<Arc<[Value]>> {
        match var.domain() {
            Domain::Explicit(values) => Ok(Arc::clone(values)),
            Domain::Registry => self.scan_registry(var),
        }
    }

    fn scan_registry(&self, var: &Variable) -> Result<Arc<[Value]>> {
        let values = self
            .registry
            .instances_of(&self.catalog, var.name(), var.ty())?;
        record_registry_scan(self.profile());
        Ok(values.into())
    }

    /// Value of `term` under `row`. Every binder the term depends on must
    /// already be bound.
    pub fn value_of(&self, term: &Term, row: &Bindings) -> Result<Value> {
        match term {
            Term::Variable(var) => row
                .get(var.id())
                .cloned()
                .ok_or(QueryError::Internal("variable read before it was bound")),
            Term::Flatten { id, .. } => row
                .get(*id)
                .cloned()
                .ok_or(QueryError::Internal("unnest read before it was bound")),
            Term::Literal(value) => Ok(value.clone()),
            Term::Attribute { base, field } => match self.value_of(base, row)? {
                Value::Null => Ok(Value::Null),
                Value::Record(record) => match record.get(field.name()) {
                    Some(value) => Ok(value.clone()),
                    None if field.is_optional() => Ok(Value::Null),
                    None => Err(QueryError::MissingFieldValue {
                        ty: record.type_name().to_owned(),
                        field: field.name().to_owned(),
                    }),
                },
                other => Err(QueryError::NotARecord {
                    field: field.name().to_owned(),
                    found: other.kind(),
                }),
            },
        }
    }

    fn project(&self, descriptor: &QueryDescriptor, row: &Bindings) -> Result<Answer> {
        let timer = profile_timer(self.profile());
        let answer = match descriptor {
            QueryDescriptor::Entity { selected, .. } => Answer::Single(self.value_of(selected, row)?),
            QueryDescriptor::SetOf { selected, .. } => {
                let mut dict = UnificationDict::with_capacity(selected.len());
                for term in selected {
                    dict.push(term.to_string(), self.value_of(term, row)?);
                }
                Answer::Tuple(dict)
            }
        };
        record_profile_timer(self.profile(), QueryProfileKind::Project, timer);
        Ok(answer)
    }
}

/// Registry snapshots taken so far in one evaluation, by variable.
type DomainSnapshots = Mutex<FxHashMap<BindingId, Arc<[Value]>>>;

/// One evaluation run. A registry-domain variable is snapshotted the first
/// time it is grounded and every later grounding in the run reuses that
/// snapshot. Clones share the snapshots.
#[derive(Clone)]
struct Scope<'a> {
    evaluator: &'a Evaluator,
    snapshots: Arc<DomainSnapshots>,
}

impl<'a> Scope<'a> {
    fn new(evaluator: &'a Evaluator) -> Self {
        Self {
            evaluator,
            snapshots: Arc::default(),
        }
    }

    fn profile(&self) -> Profile<'a> {
        self.evaluator.profile()
    }

    fn domain_values(&self, var: &Variable) -> Result<Arc<[Value]>> {
        if let Domain::Explicit(values) = var.domain() {
            return Ok(Arc::clone(values));
        }
        let cached = self.snapshots.lock().get(&var.id()).cloned();
        if let Some(values) = cached {
            return Ok(values);
        }
        let values = self.evaluator.scan_registry(var)?;
        self.snapshots.lock().insert(var.id(), Arc::clone(&values));
        Ok(values)
    }

    /// Rows extending `input` with every binder `term` depends on.
    fn ground(&self, term: &'a Term, input: Bindings) -> Result<BoxBindingStream<'a>> {
        match term {
            Term::Literal(_) => Ok(VecBindingStream::single(input)),
            Term::Attribute { base, .. } => self.ground(base, input),
            Term::Variable(var) => {
                if input.contains(var.id()) {
                    return Ok(VecBindingStream::single(input));
                }
                let values = self.domain_values(var)?;
                trace!(var = var.name(), candidates = values.len(), "grounding variable");
                let catalog = self.evaluator.catalog();
                let accept: Option<Box<dyn Fn(&Value) -> bool + 'a>> = match var.domain() {
                    Domain::Explicit(_) => Some(Box::new(move |value: &Value| {
                        catalog.value_is_instance(value, var.ty())
                    })),
                    Domain::Registry => None,
                };
                Ok(Box::new(BindValuesStream::new(
                    input,
                    var.id(),
                    values,
                    accept,
                    self.profile(),
                )))
            }
            Term::Flatten { id, inner } => {
                if input.contains(*id) {
                    return Ok(VecBindingStream::single(input));
                }
                let id = *id;
                let containers = self.ground(inner, input)?;
                let scope = self.clone();
                Ok(Box::new(ExpandStream::new(
                    containers,
                    move |row| scope.unnest(id, inner, row),
                    self.profile(),
                )))
            }
        }
    }

    fn unnest(&self, id: BindingId, inner: &'a Term, row: Bindings) -> Result<BoxBindingStream<'a>> {
        let elements: Arc<[Value]> = match self.evaluator.value_of(inner, &row)? {
            Value::Null => return Ok(VecBindingStream::empty()),
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => items.into(),
            other => {
                return Err(QueryError::NotIterable {
                    found: other.kind(),
                })
            }
        };
        Ok(Box::new(BindValuesStream::new(
            row,
            id,
            elements,
            None,
            self.profile(),
        )))
    }

    fn ground_all(&self, terms: Vec<&'a Term>, input: Bindings) -> Result<BoxBindingStream<'a>> {
        let mut stream = VecBindingStream::single(input);
        for term in terms {
            let scope = self.clone();
            stream = Box::new(ExpandStream::new(
                stream,
                move |row| scope.ground(term, row),
                self.profile(),
            ));
        }
        Ok(stream)
    }

    /// Rows extending `input` that satisfy `condition`.
    fn solve(&self, condition: &'a Condition, input: Bindings) -> Result<BoxBindingStream<'a>> {
        let profile = self.profile();
        let evaluator = self.evaluator;
        match condition {
            Condition::Comparator { left, op, right } => {
                let lefts = self.ground(left, input)?;
                let scope = self.clone();
                let rows = ExpandStream::new(lefts, move |row| scope.ground(right, row), profile);
                Ok(Box::new(FilterStream::new(
                    Box::new(rows),
                    move |row| {
                        let l = evaluator.value_of(left, row)?;
                        let r = evaluator.value_of(right, row)?;
                        compare_values(*op, &l, &r)
                    },
                    profile,
                )))
            }
            Condition::And(children) => {
                let mut stream = VecBindingStream::single(input);
                for child in children {
                    let scope = self.clone();
                    stream = Box::new(ExpandStream::new(
                        stream,
                        move |row| scope.solve(child, row),
                        profile,
                    ));
                }
                Ok(stream)
            }
            Condition::Or(children) => {
                let branches = children
                    .iter()
                    .map(|child| self.solve(child, input.clone()))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(UnionStream::new(branches, true)))
            }
            Condition::Not(child) => {
                let scope = self.clone();
                Ok(Box::new(FilterStream::new(
                    VecBindingStream::single(input),
                    move |row| Ok(!scope.has_solution(child, row.clone())?),
                    profile,
                )))
            }
            Condition::Exists { over, condition } => {
                let outer = self.ground_all(quantifier_free_binders(over, condition), input)?;
                let scope = self.clone();
                Ok(Box::new(FilterStream::new(
                    outer,
                    move |row| scope.any_satisfies(over, condition, row),
                    profile,
                )))
            }
            Condition::ForAll { over, condition } => {
                let outer = self.ground_all(quantifier_free_binders(over, condition), input)?;
                let scope = self.clone();
                Ok(Box::new(FilterStream::new(
                    outer,
                    move |row| scope.all_satisfy(over, condition, row),
                    profile,
                )))
            }
            Condition::HasType { term, ty } => {
                let rows = self.ground(term, input)?;
                Ok(Box::new(FilterStream::new(
                    rows,
                    move |row| {
                        let value = evaluator.value_of(term, row)?;
                        Ok(evaluator.catalog.value_is_instance(&value, ty))
                    },
                    profile,
                )))
            }
            Condition::Truthy(term) => {
                let rows = self.ground(term, input)?;
                Ok(Box::new(FilterStream::new(
                    rows,
                    move |row| match evaluator.value_of(term, row)? {
                        Value::Bool(truth) => Ok(truth),
                        other => Err(QueryError::NotBoolean {
                            found: other.kind(),
                        }),
                    },
                    profile,
                )))
            }
        }
    }

    fn has_solution(&self, condition: &'a Condition, row: Bindings) -> Result<bool> {
        Ok(self.solve(condition, row)?.try_next()?.is_some())
    }

    fn any_satisfies(&self, over: &'a Term, condition: &'a Condition, row: &Bindings) -> Result<bool> {
        let mut candidates = self.ground(over, row.clone())?;
        while let Some(candidate) = candidates.try_next()? {
            if self.has_solution(condition, candidate)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn all_satisfy(&self, over: &'a Term, condition: &'a Condition, row: &Bindings) -> Result<bool> {
        let mut candidates = self.ground(over, row.clone())?;
        while let Some(candidate) = candidates.try_next()? {
            if !self.has_solution(condition, candidate)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Solved and grounded rows of `descriptor`, de-duplicated on the
    /// selected binders when configured.
    fn answer_rows(&self, descriptor: &'a QueryDescriptor) -> Result<BoxBindingStream<'a>> {
        debug!(query = %descriptor, "evaluating query");
        let solved = match descriptor.condition() {
            Some(condition) => self.solve(condition, Bindings::new())?,
            None => VecBindingStream::single(Bindings::new()),
        };
        let mut selected_binders = Vec::new();
        for term in descriptor.selected() {
            term.binder_terms(&mut selected_binders);
        }
        let ids: Vec<BindingId> = selected_binders.iter().filter_map(|t| t.binder()).collect();
        let scope = self.clone();
        let grounded = Box::new(ExpandStream::new(
            solved,
            move |row| scope.ground_all(selected_binders.clone(), row),
            self.profile(),
        ));
        if self.evaluator.options.distinct_answers {
            Ok(Box::new(DistinctStream::new(grounded, ids)))
        } else {
            Ok(grounded)
        }
    }
}

/// Applies a comparator to two values.
///
/// Equality never fails. Ordering fails with [`QueryError::TypeMismatch`]
/// when the kinds are not mutually orderable; containment fails when the
/// left value is neither a container, a string nor `None`.
pub fn compare_values(op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
    let mismatch = || QueryError::TypeMismatch {
        op: op.symbol(),
        left: left.kind(),
        right: right.kind(),
    };
    Ok(match op {
        CmpOp::Eq => left == right,
        CmpOp::Ne => left != right,
        CmpOp::Lt => left.compare(right).ok_or_else(mismatch)?.is_lt(),
        CmpOp::Le => left.compare(right).ok_or_else(mismatch)?.is_le(),
        CmpOp::Gt => left.compare(right).ok_or_else(mismatch)?.is_gt(),
        CmpOp::Ge => left.compare(right).ok_or_else(mismatch)?.is_ge(),
        CmpOp::Contains => match (left, right) {
            (Value::Null, _) => false,
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::List(items) | Value::Set(items) | Value::Tuple(items), item) => {
                items.contains(item)
            }
            _ => return Err(mismatch()),
        },
    })
}

/// Lazy, restartable sequence of projected answers.
///
/// Each [`restart`](Answers::restart) re-runs the search from scratch; the
/// evaluator and descriptor are only borrowed, so independent iterations
/// can coexist.
pub struct Answers<'a> {
    evaluator: &'a Evaluator,
    descriptor: &'a QueryDescriptor,
    constraint: Option<ResultQuantificationConstraint>,
    stream: Option<BoxBindingStream<'a>>,
    produced: usize,
    done: bool,
}

impl<'a> Answers<'a> {
    pub(crate) fn new(
        evaluator: &'a Evaluator,
        descriptor: &'a QueryDescriptor,
        constraint: Option<ResultQuantificationConstraint>,
    ) -> Self {
        Self {
            evaluator,
            descriptor,
            constraint,
            stream: None,
            produced: 0,
            done: false,
        }
    }

    /// Rewinds to the first answer.
    pub fn restart(&mut self) {
        self.stream = None;
        self.produced = 0;
        self.done = false;
    }

    /// Number of answers yielded since the last restart.
    pub fn produced(&self) -> usize {
        self.produced
    }

    fn fail(&mut self, err: QueryError) -> Option<Result<Answer>> {
        self.done = true;
        self.stream = None;
        Some(Err(err))
    }

    fn exhausted(&mut self) -> Option<Result<Answer>> {
        self.done = true;
        self.stream = None;
        match self.constraint {
            Some(constraint) if !constraint.admits_final(self.produced) => {
                Some(Err(constraint.violation(self.produced)))
            }
            _ => None,
        }
    }
}

impl Iterator for Answers<'_> {
    type Item = Result<Answer>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.stream.is_none() {
            match Scope::new(self.evaluator).answer_rows(self.descriptor) {
                Ok(stream) => self.stream = Some(stream),
                Err(err) => return self.fail(err),
            }
        }
        let stream = self.stream.as_mut()?;
        let row = match stream.try_next() {
            Ok(Some(row)) => row,
            Ok(None) => return self.exhausted(),
            Err(err) => return self.fail(err),
        };
        self.produced += 1;
        if let Some(constraint) = self.constraint {
            if constraint.exceeded(self.produced) {
                return self.fail(constraint.violation(self.produced));
            }
        }
        match self.evaluator.project(self.descriptor, &row) {
            Ok(answer) => Some(Ok(answer)),
            Err(err) => self.fail(err),
        }
    }
}
