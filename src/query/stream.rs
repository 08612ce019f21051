//! Pull-based binding streams.
//!
//! Every operator of the evaluator is a [`BindingStream`] that yields
//! extended [`Bindings`] on demand. Nothing is computed ahead of the
//! consumer, so dropping a stream cancels the search.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::bindings::Bindings;
use super::expr::BindingId;
use super::profile::{
    profile_timer, record_enumerated, record_profile_timer, record_rejected, Profile,
    QueryProfileKind,
};
use crate::error::Result;
use crate::value::{Value, ValueKey};

pub(crate) trait BindingStream {
    fn try_next(&mut self) -> Result<Option<Bindings>>;
}

pub(crate) type BoxBindingStream<'a> = Box<dyn BindingStream + 'a>;

pub(crate) struct VecBindingStream {
    rows: std::vec::IntoIter<Bindings>,
}

impl VecBindingStream {
    pub(crate) fn new(rows: Vec<Bindings>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }

    pub(crate) fn single<'a>(row: Bindings) -> BoxBindingStream<'a> {
        Box::new(Self::new(vec![row]))
    }

    pub(crate) fn empty<'a>() -> BoxBindingStream<'a> {
        Box::new(Self::new(Vec::new()))
    }
}

impl BindingStream for VecBindingStream {
    fn try_next(&mut self) -> Result<Option<Bindings>> {
        Ok(self.rows.next())
    }
}

type Accept<'a> = Box<dyn Fn(&Value) -> bool + 'a>;

/// Extends one row with each accepted value in turn.
pub(crate) struct BindValuesStream<'a> {
    base: Bindings,
    id: BindingId,
    values: Arc<[Value]>,
    index: usize,
    accept: Option<Accept<'a>>,
    profile: Profile<'a>,
}

impl<'a> BindValuesStream<'a> {
    pub(crate) fn new(
        base: Bindings,
        id: BindingId,
        values: Arc<[Value]>,
        accept: Option<Accept<'a>>,
        profile: Profile<'a>,
    ) -> Self {
        Self {
            base,
            id,
            values,
            index: 0,
            accept,
            profile,
        }
    }
}

impl BindingStream for BindValuesStream<'_> {
    fn try_next(&mut self) -> Result<Option<Bindings>> {
        let timer = profile_timer(self.profile);
        let mut found = None;
        while let Some(value) = self.values.get(self.index) {
            self.index += 1;
            if self.accept.as_ref().map_or(true, |accept| accept(value)) {
                record_enumerated(self.profile);
                found = Some(self.base.with(self.id, value.clone()));
                break;
            }
        }
        record_profile_timer(self.profile, QueryProfileKind::Ground, timer);
        Ok(found)
    }
}

type Expand<'a> = Box<dyn FnMut(Bindings) -> Result<BoxBindingStream<'a>> + 'a>;

/// Nested-loop expansion: every input row opens an inner stream whose rows
/// are yielded before the next input row is pulled.
pub(crate) struct ExpandStream<'a> {
    input: BoxBindingStream<'a>,
    expand: Expand<'a>,
    current: Option<BoxBindingStream<'a>>,
    profile: Profile<'a>,
}

impl<'a> ExpandStream<'a> {
    pub(crate) fn new(
        input: BoxBindingStream<'a>,
        expand: impl FnMut(Bindings) -> Result<BoxBindingStream<'a>> + 'a,
        profile: Profile<'a>,
    ) -> Self {
        Self {
            input,
            expand: Box::new(expand),
            current: None,
            profile,
        }
    }
}

impl BindingStream for ExpandStream<'_> {
    fn try_next(&mut self) -> Result<Option<Bindings>> {
        let timer = profile_timer(self.profile);
        let result = self.try_next_inner();
        record_profile_timer(self.profile, QueryProfileKind::Expand, timer);
        result
    }
}

impl ExpandStream<'_> {
    fn try_next_inner(&mut self) -> Result<Option<Bindings>> {
        loop {
            if let Some(current) = self.current.as_mut() {
                if let Some(row) = current.try_next()? {
                    return Ok(Some(row));
                }
                self.current = None;
            }
            let Some(row) = self.input.try_next()? else {
                return Ok(None);
            };
            self.current = Some((self.expand)(row)?);
        }
    }
}

type Predicate<'a> = Box<dyn FnMut(&Bindings) -> Result<bool> + 'a>;

/// Keeps the rows the predicate accepts.
pub(crate) struct FilterStream<'a> {
    input: BoxBindingStream<'a>,
    predicate: Predicate<'a>,
    profile: Profile<'a>,
}

impl<'a> FilterStream<'a> {
    pub(crate) fn new(
        input: BoxBindingStream<'a>,
        predicate: impl FnMut(&Bindings) -> Result<bool> + 'a,
        profile: Profile<'a>,
    ) -> Self {
        Self {
            input,
            predicate: Box::new(predicate),
            profile,
        }
    }
}

impl BindingStream for FilterStream<'_> {
    fn try_next(&mut self) -> Result<Option<Bindings>> {
        loop {
            let Some(row) = self.input.try_next()? else {
                return Ok(None);
            };
            let timer = profile_timer(self.profile);
            let keep = (self.predicate)(&row);
            record_profile_timer(self.profile, QueryProfileKind::Filter, timer);
            if keep? {
                return Ok(Some(row));
            }
            record_rejected(self.profile);
        }
    }
}

/// Concatenates its inputs, optionally dropping repeated binding sets.
pub(crate) struct UnionStream<'a> {
    inputs: Vec<BoxBindingStream<'a>>,
    current: usize,
    seen: Option<FxHashSet<Vec<(BindingId, ValueKey)>>>,
}

impl<'a> UnionStream<'a> {
    pub(crate) fn new(inputs: Vec<BoxBindingStream<'a>>, dedup: bool) -> Self {
        Self {
            inputs,
            current: 0,
            seen: dedup.then(FxHashSet::default),
        }
    }
}

impl BindingStream for UnionStream<'_> {
    fn try_next(&mut self) -> Result<Option<Bindings>> {
        while self.current < self.inputs.len() {
            match self.inputs[self.current].try_next()? {
                Some(row) => {
                    if let Some(seen) = self.seen.as_mut() {
                        if !seen.insert(row.key()) {
                            continue;
                        }
                    }
                    return Ok(Some(row));
                }
                None => self.current += 1,
            }
        }
        Ok(None)
    }
}

/// Drops rows whose values for `ids` were already yielded.
pub(crate) struct DistinctStream<'a> {
    input: BoxBindingStream<'a>,
    ids: Vec<BindingId>,
    seen: FxHashSet<Vec<Option<ValueKey>>>,
}

impl<'a> DistinctStream<'a> {
    pub(crate) fn new(input: BoxBindingStream<'a>, ids: Vec<BindingId>) -> Self {
        Self {
            input,
            ids,
            seen: FxHashSet::default(),
        }
    }
}

impl BindingStream for DistinctStream<'_> {
    fn try_next(&mut self) -> Result<Option<Bindings>> {
        while let Some(row) = self.input.try_next()? {
            if self.seen.insert(row.key_of(&self.ids)) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;

    fn drain(mut stream: BoxBindingStream<'_>) -> Result<Vec<Bindings>> {
        let mut rows = Vec::new();
        while let Some(row) = stream.try_next()? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn values(items: &[i64]) -> Arc<[Value]> {
        items.iter().map(|i| Value::Int(*i)).collect()
    }

    #[test]
    fn expand_keeps_outer_bindings() -> Result<()> {
        let (outer, inner) = (BindingId(1), BindingId(2));
        let input: BoxBindingStream<'_> = Box::new(BindValuesStream::new(
            Bindings::new(),
            outer,
            values(&[1, 2]),
            None,
            None,
        ));
        let stream = ExpandStream::new(
            input,
            move |row| {
                Ok(Box::new(BindValuesStream::new(
                    row,
                    inner,
                    values(&[10, 20, 30]),
                    None,
                    None,
                )) as BoxBindingStream<'_>)
            },
            None,
        );
        let rows = drain(Box::new(stream))?;
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[3].get(outer), Some(&Value::Int(2)));
        assert_eq!(rows[3].get(inner), Some(&Value::Int(10)));
        Ok(())
    }

    #[test]
    fn filter_propagates_errors() {
        let input = Box::new(BindValuesStream::new(
            Bindings::new(),
            BindingId(1),
            values(&[1]),
            None,
            None,
        ));
        let mut stream = FilterStream::new(input, |_| Err(QueryError::Internal("boom")), None);
        assert_eq!(stream.try_next(), Err(QueryError::Internal("boom")));
    }

    #[test]
    fn union_and_distinct_drop_repeats() -> Result<()> {
        let id = BindingId(1);
        let branch = |items: &[i64]| -> BoxBindingStream<'static> {
            Box::new(BindValuesStream::new(
                Bindings::new(),
                id,
                values(items),
                None,
                None,
            ))
        };
        let union = UnionStream::new(vec![branch(&[1, 2]), branch(&[2, 3])], true);
        assert_eq!(drain(Box::new(union))?.len(), 3);
        let distinct = DistinctStream::new(branch(&[4, 4, 5]), vec![id]);
        assert_eq!(drain(Box::new(distinct))?.len(), 2);
        Ok(())
    }

    #[test]
    fn accept_filters_candidates() -> Result<()> {
        let stream = BindValuesStream::new(
            Bindings::new(),
            BindingId(1),
            values(&[1, 2, 3, 4]),
            Some(Box::new(|value: &Value| matches!(value, Value::Int(i) if i % 2 == 0))),
            None,
        );
        assert_eq!(drain(Box::new(stream))?.len(), 2);
        Ok(())
    }
}
