//! Result quantifiers: all solutions (`An`) and the unique solution (`The`).

use std::fmt;

use serde::Serialize;
use tracing::debug;

use super::bindings::Answer;
use super::executor::{Answers, Evaluator};
use super::expr::QueryDescriptor;
use crate::error::{QueryError, Result};

/// Bound on the number of answers an [`An`] may produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultQuantificationConstraint {
    /// Exactly `n` answers.
    Exactly {
        /// Required count.
        n: usize,
    },
    /// At least `n` answers.
    AtLeast {
        /// Minimum count.
        n: usize,
    },
    /// At most `n` answers.
    AtMost {
        /// Maximum count.
        n: usize,
    },
    /// Between `min` and `max` answers, inclusive.
    Between {
        /// Minimum count.
        min: usize,
        /// Maximum count.
        max: usize,
    },
}

impl ResultQuantificationConstraint {
    /// Smallest admissible count.
    pub fn min(self) -> usize {
        match self {
            Self::Exactly { n } | Self::AtLeast { n } => n,
            Self::AtMost { .. } => 0,
            Self::Between { min, .. } => min,
        }
    }

    /// Largest admissible count, if bounded.
    pub fn max(self) -> Option<usize> {
        match self {
            Self::Exactly { n } | Self::AtMost { n } => Some(n),
            Self::AtLeast { .. } => None,
            Self::Between { max, .. } => Some(max),
        }
    }

    /// Whether `produced` answers already exceed the maximum.
    pub fn exceeded(self, produced: usize) -> bool {
        self.max().is_some_and(|max| produced > max)
    }

    /// Whether a final count of `produced` satisfies the constraint.
    pub fn admits_final(self, produced: usize) -> bool {
        produced >= self.min() && !self.exceeded(produced)
    }

    pub(crate) fn violation(self, found: usize) -> QueryError {
        QueryError::QuantificationNotSatisfied {
            constraint: self.to_string(),
            found,
        }
    }
}

impl fmt::Display for ResultQuantificationConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exactly { n } => write!(f, "exactly {n}"),
            Self::AtLeast { n } => write!(f, "at least {n}"),
            Self::AtMost { n } => write!(f, "at most {n}"),
            Self::Between { min, max } => write!(f, "between {min} and {max}"),
        }
    }
}

/// All solutions of a descriptor, as a lazy restartable sequence.
#[derive(Clone, Debug)]
pub struct An {
    descriptor: QueryDescriptor,
    constraint: Option<ResultQuantificationConstraint>,
}

impl An {
    /// Quantifies over every solution of `descriptor`.
    pub fn new(descriptor: impl Into<QueryDescriptor>) -> Self {
        Self {
            descriptor: descriptor.into(),
            constraint: None,
        }
    }

    /// Requires the answer count to satisfy `constraint`. Exceeding the
    /// maximum fails as soon as it happens; falling short of the minimum
    /// fails once the sequence is exhausted.
    pub fn with_constraint(mut self, constraint: ResultQuantificationConstraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    /// Wrapped descriptor.
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Active count constraint.
    pub fn constraint(&self) -> Option<ResultQuantificationConstraint> {
        self.constraint
    }

    /// Starts a fresh iteration over the answers. Each call is independent.
    pub fn evaluate<'a>(&'a self, evaluator: &'a Evaluator) -> Answers<'a> {
        Answers::new(evaluator, &self.descriptor, self.constraint)
    }

    /// Collects every answer, stopping at the first error.
    pub fn collect(&self, evaluator: &Evaluator) -> Result<Vec<Answer>> {
        self.evaluate(evaluator).collect()
    }
}

/// The unique solution of a descriptor.
#[derive(Clone, Debug)]
pub struct The {
    descriptor: QueryDescriptor,
}

impl The {
    /// Requires exactly one solution of `descriptor`.
    pub fn new(descriptor: impl Into<QueryDescriptor>) -> Self {
        Self {
            descriptor: descriptor.into(),
        }
    }

    /// Wrapped descriptor.
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Evaluates every solution and returns the only one.
    ///
    /// Fails with [`QueryError::NotExactlyOneResult`] when there are zero or
    /// several answers.
    pub fn evaluate(&self, evaluator: &Evaluator) -> Result<Answer> {
        let mut answers: Vec<Answer> = evaluator.evaluate(&self.descriptor).collect::<Result<_>>()?;
        debug!(found = answers.len(), "unique-result evaluation");
        match answers.len() {
            1 => answers.pop().ok_or(QueryError::Internal("answer vanished")),
            found => Err(QueryError::NotExactlyOneResult { found }),
        }
    }
}

/// Shorthand for [`An::new`].
pub fn an(descriptor: impl Into<QueryDescriptor>) -> An {
    An::new(descriptor)
}

/// Shorthand for [`The::new`].
pub fn the(descriptor: impl Into<QueryDescriptor>) -> The {
    The::new(descriptor)
}
