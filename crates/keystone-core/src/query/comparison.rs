use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// Comparison
///
/// One comparison against a field, key expression, or record function.
///
/// For scan construction, comparisons are categorized as equalities (bindable
/// into the equality prefix of a scan), inequalities (bindable as the single
/// terminal range), or neither.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Comparison {
    Equals(Value),
    NotEquals(Value),
    LessThan(Value),
    LessThanOrEquals(Value),
    GreaterThan(Value),
    GreaterThanOrEquals(Value),
    StartsWith(Value),
    IsNull,
    NotNull,
    /// Any of the listed values; rewritten by IN extraction.
    In(Vec<Value>),
    /// Opaque token comparison, claimable only by text indexes.
    Text(TextComparison),
    /// Equality against an outer-bound parameter (IN-join re-binding).
    Parameter(String),
    /// Equality on the synthetic record-type column.
    RecordType(String),
}

impl Comparison {
    #[must_use]
    pub const fn kind(&self) -> ComparisonKind {
        match self {
            Self::Equals(_) | Self::IsNull | Self::Parameter(_) | Self::RecordType(_) => {
                ComparisonKind::Equality
            }
            Self::LessThan(_)
            | Self::LessThanOrEquals(_)
            | Self::GreaterThan(_)
            | Self::GreaterThanOrEquals(_)
            | Self::StartsWith(_)
            | Self::NotNull => ComparisonKind::Inequality,
            Self::NotEquals(_) | Self::In(_) | Self::Text(_) => ComparisonKind::Other,
        }
    }

    /// Direct complement, where one exists. Drives NOT pushing into leaves.
    #[must_use]
    pub fn complement(&self) -> Option<Self> {
        match self {
            Self::Equals(v) => Some(Self::NotEquals(v.clone())),
            Self::NotEquals(v) => Some(Self::Equals(v.clone())),
            Self::LessThan(v) => Some(Self::GreaterThanOrEquals(v.clone())),
            Self::LessThanOrEquals(v) => Some(Self::GreaterThan(v.clone())),
            Self::GreaterThan(v) => Some(Self::LessThanOrEquals(v.clone())),
            Self::GreaterThanOrEquals(v) => Some(Self::LessThan(v.clone())),
            Self::IsNull => Some(Self::NotNull),
            Self::NotNull => Some(Self::IsNull),
            Self::StartsWith(_)
            | Self::In(_)
            | Self::Text(_)
            | Self::Parameter(_)
            | Self::RecordType(_) => None,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => write!(f, "EQUALS {v}"),
            Self::NotEquals(v) => write!(f, "NOT_EQUALS {v}"),
            Self::LessThan(v) => write!(f, "LESS_THAN {v}"),
            Self::LessThanOrEquals(v) => write!(f, "LESS_THAN_OR_EQUALS {v}"),
            Self::GreaterThan(v) => write!(f, "GREATER_THAN {v}"),
            Self::GreaterThanOrEquals(v) => write!(f, "GREATER_THAN_OR_EQUALS {v}"),
            Self::StartsWith(v) => write!(f, "STARTS_WITH {v}"),
            Self::IsNull => write!(f, "IS_NULL"),
            Self::NotNull => write!(f, "NOT_NULL"),
            Self::In(values) => {
                write!(f, "IN [")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Self::Text(text) => write!(f, "{text}"),
            Self::Parameter(name) => write!(f, "EQUALS ${name}"),
            Self::RecordType(name) => write!(f, "IS_RECORD_TYPE {name:?}"),
        }
    }
}

///
/// ComparisonKind
/// Scan-construction category of a comparison.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComparisonKind {
    Equality,
    Inequality,
    Other,
}

///
/// TextComparison
///
/// Tokenized text predicate. The planner treats it as opaque: a text index
/// claims it wholesale, value indexes never bind it into scan keys.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct TextComparison {
    tokens: Vec<String>,
    match_kind: TextMatch,
}

impl TextComparison {
    pub fn new(tokens: Vec<String>, match_kind: TextMatch) -> Self {
        Self { tokens, match_kind }
    }

    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    #[must_use]
    pub const fn match_kind(&self) -> &TextMatch {
        &self.match_kind
    }

    /// Token fan-out can emit the same record more than once.
    #[must_use]
    pub fn creates_duplicates(&self) -> bool {
        self.tokens.len() > 1
    }
}

impl fmt::Display for TextComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &self.match_kind {
            TextMatch::ContainsAll => "TEXT_CONTAINS_ALL",
            TextMatch::ContainsAny => "TEXT_CONTAINS_ANY",
            TextMatch::ContainsPhrase => "TEXT_CONTAINS_PHRASE",
            TextMatch::ContainsAllPrefixes { .. } => "TEXT_CONTAINS_ALL_PREFIXES",
        };
        write!(f, "{label} [")?;
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{token:?}")?;
        }
        write!(f, "]")
    }
}

///
/// TextMatch
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum TextMatch {
    ContainsAll,
    ContainsAny,
    ContainsPhrase,
    /// Prefix matching may return false positives; a strict match keeps the
    /// original predicate as a residual filter around the scan.
    ContainsAllPrefixes { strict: bool },
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_partition_for_scan_construction() {
        assert_eq!(
            Comparison::Equals(Value::Int(1)).kind(),
            ComparisonKind::Equality
        );
        assert_eq!(Comparison::IsNull.kind(), ComparisonKind::Equality);
        assert_eq!(
            Comparison::Parameter("p".into()).kind(),
            ComparisonKind::Equality
        );
        assert_eq!(
            Comparison::GreaterThan(Value::Int(1)).kind(),
            ComparisonKind::Inequality
        );
        assert_eq!(Comparison::NotNull.kind(), ComparisonKind::Inequality);
        assert_eq!(
            Comparison::NotEquals(Value::Int(1)).kind(),
            ComparisonKind::Other
        );
        assert_eq!(
            Comparison::In(vec![Value::Int(1)]).kind(),
            ComparisonKind::Other
        );
    }

    #[test]
    fn complement_round_trips() {
        let cases = [
            Comparison::Equals(Value::Int(1)),
            Comparison::LessThan(Value::Int(1)),
            Comparison::GreaterThanOrEquals(Value::Int(1)),
            Comparison::IsNull,
        ];
        for comparison in cases {
            let complement = comparison.complement().expect("has complement");
            assert_eq!(complement.complement(), Some(comparison));
        }
        assert_eq!(Comparison::In(vec![]).complement(), None);
    }
}
