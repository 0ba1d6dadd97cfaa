use std::fmt;
use thiserror::Error as ThisError;

///
/// PlannerError
///
/// Unrecoverable planning failures surfaced out of `plan()`.
///
/// A candidate that merely fails to match a filter or sort is represented by
/// absence (no scored plan), never by an error. Only metadata violations,
/// impossible sorts, budget overruns, and internal invariant failures reach
/// this type.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum PlannerError {
    #[error("metadata error: {message}")]
    Metadata { message: String },

    #[error("index '{index}' is not readable on this store")]
    UnreadableIndex { index: String },

    #[error("cannot sort without appropriate index: {sort}")]
    NoIndexForSort { sort: String },

    #[error("no candidate index satisfies the requested sort: {sort}")]
    UnsatisfiableSort { sort: String },

    #[error("plan complexity {complexity} exceeds the configured threshold {threshold}")]
    PlanTooComplex {
        complexity: usize,
        threshold: usize,
        /// Canonical rendering of the offending plan, for diagnostics.
        plan: String,
    },

    #[error("invalid expression: {message}")]
    InvalidExpression { message: String },

    #[error("unexpected planner state: {message}")]
    Unexpected { message: String },
}

impl PlannerError {
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata {
            message: message.into(),
        }
    }

    pub fn invalid_expression(message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Stable classification of this error for callers that dispatch on kind.
    #[must_use]
    pub const fn kind(&self) -> PlannerErrorKind {
        match self {
            Self::Metadata { .. } | Self::UnreadableIndex { .. } => PlannerErrorKind::Metadata,
            Self::NoIndexForSort { .. } => PlannerErrorKind::NoIndexForSort,
            Self::UnsatisfiableSort { .. } => PlannerErrorKind::UnsatisfiableSort,
            Self::PlanTooComplex { .. } => PlannerErrorKind::PlanTooComplex,
            Self::InvalidExpression { .. } => PlannerErrorKind::InvalidExpression,
            Self::Unexpected { .. } => PlannerErrorKind::Unknown,
        }
    }
}

///
/// PlannerErrorKind
/// Stable error taxonomy; the variant set is part of the public contract.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlannerErrorKind {
    Metadata,
    NoIndexForSort,
    UnsatisfiableSort,
    PlanTooComplex,
    InvalidExpression,
    Unknown,
}

impl fmt::Display for PlannerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Metadata => "metadata_error",
            Self::NoIndexForSort => "no_index_for_sort",
            Self::UnsatisfiableSort => "unsatisfiable_sort",
            Self::PlanTooComplex => "plan_too_complex",
            Self::InvalidExpression => "invalid_expression",
            Self::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}
