use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A snapshot of evaluation profiling metrics.
///
/// Counters are kept per [`Evaluator`](super::Evaluator) and only updated
/// when [`EvaluatorOptions::profile`](super::EvaluatorOptions::profile) is
/// set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryProfileSnapshot {
    /// Total nanoseconds spent enumerating domains and unnesting containers.
    pub ground_ns: u64,
    /// Number of grounding pulls.
    pub ground_count: u64,
    /// Total nanoseconds spent in conjunction and quantifier expansion.
    pub expand_ns: u64,
    /// Number of expansion pulls.
    pub expand_count: u64,
    /// Total nanoseconds spent evaluating filters.
    pub filter_ns: u64,
    /// Number of filter pulls.
    pub filter_count: u64,
    /// Total nanoseconds spent projecting answers.
    pub project_ns: u64,
    /// Number of projected answers.
    pub project_count: u64,
    /// Candidate rows produced by domain enumeration and unnesting.
    pub rows_enumerated: u64,
    /// Rows rejected by filters.
    pub rows_rejected: u64,
    /// Registry snapshots taken; at most one per registry-domain variable
    /// per evaluation.
    pub registry_scans: u64,
}

#[derive(Debug, Default)]
pub(crate) struct QueryProfileCounters {
    ground_ns: AtomicU64,
    ground_count: AtomicU64,
    expand_ns: AtomicU64,
    expand_count: AtomicU64,
    filter_ns: AtomicU64,
    filter_count: AtomicU64,
    project_ns: AtomicU64,
    project_count: AtomicU64,
    rows_enumerated: AtomicU64,
    rows_rejected: AtomicU64,
    registry_scans: AtomicU64,
}

pub(crate) enum QueryProfileKind {
    /// Domain enumeration and unnesting.
    Ground,
    /// Conjunction and quantifier expansion.
    Expand,
    /// Filter evaluation.
    Filter,
    /// Answer projection.
    Project,
}

/// Optional handle to an evaluator's counters.
pub(crate) type Profile<'a> = Option<&'a QueryProfileCounters>;

pub(crate) fn profile_timer(profile: Profile<'_>) -> Option<Instant> {
    profile.map(|_| Instant::now())
}

pub(crate) fn record_profile_timer(
    profile: Profile<'_>,
    kind: QueryProfileKind,
    start: Option<Instant>,
) {
    let (Some(counters), Some(start)) = (profile, start) else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    let (ns, count) = match kind {
        QueryProfileKind::Ground => (&counters.ground_ns, &counters.ground_count),
        QueryProfileKind::Expand => (&counters.expand_ns, &counters.expand_count),
        QueryProfileKind::Filter => (&counters.filter_ns, &counters.filter_count),
        QueryProfileKind::Project => (&counters.project_ns, &counters.project_count),
    };
    ns.fetch_add(nanos, Ordering::Relaxed);
    count.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_enumerated(profile: Profile<'_>) {
    if let Some(counters) = profile {
        counters.rows_enumerated.fetch_add(1, Ordering::Relaxed);
    }
}

pub(crate) fn record_rejected(profile: Profile<'_>) {
    if let Some(counters) = profile {
        counters.rows_rejected.fetch_add(1, Ordering::Relaxed);
    }
}

pub(crate) fn record_registry_scan(profile: Profile<'_>) {
    if let Some(counters) = profile {
        counters.registry_scans.fetch_add(1, Ordering::Relaxed);
    }
}

impl QueryProfileCounters {
    /// Reads the counters, zeroing them when `reset` is set.
    pub(crate) fn snapshot(&self, reset: bool) -> QueryProfileSnapshot {
        let load = |counter: &AtomicU64| {
            if reset {
                counter.swap(0, Ordering::Relaxed)
            } else {
                counter.load(Ordering::Relaxed)
            }
        };
        QueryProfileSnapshot {
            ground_ns: load(&self.ground_ns),
            ground_count: load(&self.ground_count),
            expand_ns: load(&self.expand_ns),
            expand_count: load(&self.expand_count),
            filter_ns: load(&self.filter_ns),
            filter_count: load(&self.filter_count),
            project_ns: load(&self.project_ns),
            project_count: load(&self.project_count),
            rows_enumerated: load(&self.rows_enumerated),
            rows_rejected: load(&self.rows_rejected),
            registry_scans: load(&self.registry_scans),
        }
    }
}
