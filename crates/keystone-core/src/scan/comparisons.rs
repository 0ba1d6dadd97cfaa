use crate::query::{Comparison, ComparisonKind};
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// ScanComparisons
///
/// The sarged bounds of one scan: an ordered tuple of equality comparisons
/// followed by at most one compound inequality range on the next column.
///
/// Invariant: once an inequality has been added, no further equality may be
/// added; the equality size is the sarged prefix length.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScanComparisons {
    equality: Vec<Comparison>,
    inequality: Vec<Comparison>,
}

impl ScanComparisons {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Lift a single comparison into scan bounds, when its kind allows it.
    #[must_use]
    pub fn from_comparison(comparison: &Comparison) -> Option<Self> {
        match comparison.kind() {
            ComparisonKind::Equality => Some(Self {
                equality: vec![comparison.clone()],
                inequality: Vec::new(),
            }),
            ComparisonKind::Inequality => Some(Self {
                equality: Vec::new(),
                inequality: vec![comparison.clone()],
            }),
            ComparisonKind::Other => None,
        }
    }

    /// Bounds for an opaque text comparison behind a sarged group prefix.
    #[must_use]
    pub fn opaque(equality: Vec<Comparison>, opaque: Comparison) -> Self {
        Self {
            equality,
            inequality: vec![opaque],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.equality.is_empty() && self.inequality.is_empty()
    }

    /// True while no inequality terminates the equality prefix.
    #[must_use]
    pub fn is_equality(&self) -> bool {
        self.inequality.is_empty()
    }

    #[must_use]
    pub fn equality_size(&self) -> usize {
        self.equality.len()
    }

    #[must_use]
    pub fn equality_comparisons(&self) -> &[Comparison] {
        &self.equality
    }

    #[must_use]
    pub fn inequality_comparisons(&self) -> &[Comparison] {
        &self.inequality
    }

    /// Number of key columns these bounds consume.
    #[must_use]
    pub fn size(&self) -> usize {
        self.equality.len() + usize::from(!self.inequality.is_empty())
    }

    /// Number of comparisons bound; the matcher's score contribution.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.equality.len() + self.inequality.len()
    }

    /// Append an equality to the prefix. Refused once an inequality exists.
    pub fn push_equality(&mut self, comparison: Comparison) -> bool {
        if !self.is_equality() {
            return false;
        }
        self.equality.push(comparison);
        true
    }

    /// Add an inequality on the current column.
    pub fn push_inequality(&mut self, comparison: Comparison) {
        if !self.inequality.contains(&comparison) {
            self.inequality.push(comparison);
        }
    }

    /// Append another comparison set after this one's equality prefix.
    /// Legal only while this set is still all-equality.
    pub fn try_append(&mut self, other: &Self) -> bool {
        if !self.is_equality() {
            return false;
        }
        self.equality.extend(other.equality.iter().cloned());
        for comparison in &other.inequality {
            self.push_inequality(comparison.clone());
        }
        true
    }

    /// Union two comparison sets over the same column layout: the equality
    /// prefixes must agree, the inequality ranges combine.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Option<Self> {
        if self.equality != other.equality {
            return None;
        }
        let mut merged = self.clone();
        for comparison in &other.inequality {
            merged.push_inequality(comparison.clone());
        }
        Some(merged)
    }

    /// Whether any equality binds the record-type column, and to which type.
    #[must_use]
    pub fn record_type_comparison(&self) -> Option<&str> {
        self.equality.iter().find_map(|comparison| match comparison {
            Comparison::RecordType(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for ScanComparisons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, comparison) in self.equality.iter().chain(self.inequality.iter()).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{comparison}")?;
        }
        write!(f, "]")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn equality_prefix_closes_on_inequality() {
        let mut comparisons = ScanComparisons::empty();
        assert!(comparisons.push_equality(Comparison::Equals(Value::Int(1))));
        comparisons.push_inequality(Comparison::GreaterThan(Value::Int(5)));
        assert!(!comparisons.push_equality(Comparison::Equals(Value::Int(2))));
        assert_eq!(comparisons.equality_size(), 1);
        assert_eq!(comparisons.size(), 2);
        assert_eq!(comparisons.total_size(), 2);
    }

    #[test]
    fn compound_inequality_counts_one_column() {
        let mut comparisons = ScanComparisons::empty();
        comparisons.push_inequality(Comparison::GreaterThanOrEquals(Value::Int(5)));
        comparisons.push_inequality(Comparison::LessThan(Value::Int(10)));
        assert_eq!(comparisons.size(), 1);
        assert_eq!(comparisons.total_size(), 2);
    }

    #[test]
    fn from_comparison_rejects_unscannable_kinds() {
        assert!(ScanComparisons::from_comparison(&Comparison::Equals(Value::Int(1))).is_some());
        assert!(ScanComparisons::from_comparison(&Comparison::NotNull).is_some());
        assert!(ScanComparisons::from_comparison(&Comparison::NotEquals(Value::Int(1))).is_none());
        assert!(
            ScanComparisons::from_comparison(&Comparison::In(vec![Value::Int(1)])).is_none()
        );
    }

    #[test]
    fn merge_requires_matching_equality_prefix() {
        let mut left = ScanComparisons::empty();
        left.push_equality(Comparison::Equals(Value::Text("g".into())));
        left.push_inequality(Comparison::GreaterThan(Value::Int(5)));

        let mut right = ScanComparisons::empty();
        right.push_equality(Comparison::Equals(Value::Text("g".into())));
        right.push_inequality(Comparison::LessThan(Value::Int(9)));

        let merged = left.merged_with(&right).expect("same prefix merges");
        assert_eq!(merged.inequality_comparisons().len(), 2);

        let mut different = ScanComparisons::empty();
        different.push_equality(Comparison::Equals(Value::Text("h".into())));
        assert!(left.merged_with(&different).is_none());
    }
}
