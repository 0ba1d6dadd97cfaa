use crate::{
    expr::KeyExpression,
    query::QueryComponent,
    scan::ScanComparisons,
    value::Value,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

///
/// IndexScanType
///

#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq, Serialize, Deserialize)]
pub enum IndexScanType {
    #[default]
    #[display("BY_VALUE")]
    ByValue,
    #[display("BY_RANK")]
    ByRank,
    #[display("BY_TEXT")]
    ByText,
    #[display("BY_GROUP")]
    ByGroup,
}

///
/// IndexScanPlan
/// One scan over a secondary index, bounded by sarged comparisons.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IndexScanPlan {
    pub index_name: String,
    pub scan_type: IndexScanType,
    pub comparisons: ScanComparisons,
    pub reverse: bool,
    pub strictly_sorted: bool,
    pub possible_types: Vec<String>,
}

///
/// RecordScanPlan
/// A scan over the primary key space of the requested record types.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RecordScanPlan {
    pub comparisons: ScanComparisons,
    pub reverse: bool,
    pub strictly_sorted: bool,
    pub possible_types: Vec<String>,
}

///
/// InSource
/// One extracted IN clause: the binding the subplan re-binds per element,
/// the element list, and whether elements iterate in sorted order.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InSource {
    pub binding: String,
    pub values: Vec<Value>,
    pub sort_values: bool,
    pub sort_reverse: bool,
}

///
/// RecordQueryPlan
///
/// Tagged tree of physical operators. Complexity is structural: one per
/// node plus the size of scan bounds at the leaves; the complexity guard
/// compares it against the configured threshold.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RecordQueryPlan {
    IndexScan(IndexScanPlan),
    Scan(RecordScanPlan),
    TypeFilter {
        inner: Box<RecordQueryPlan>,
        record_types: Vec<String>,
    },
    /// Residual filter evaluated on each fetched record.
    Filter {
        inner: Box<RecordQueryPlan>,
        filter: QueryComponent,
    },
    /// For each element of the source, re-bind the parameter and run the inner plan.
    InJoin {
        inner: Box<RecordQueryPlan>,
        source: InSource,
    },
    /// Multi-way merge of the inner plan over every source element.
    InUnion {
        inner: Box<RecordQueryPlan>,
        sources: Vec<InSource>,
        comparison_key: KeyExpression,
        reverse: bool,
        max_size: usize,
    },
    Intersection {
        children: Vec<RecordQueryPlan>,
        comparison_key: KeyExpression,
        reverse: bool,
    },
    /// Ordered union merging on the comparison key.
    Union {
        children: Vec<RecordQueryPlan>,
        comparison_key: KeyExpression,
        reverse: bool,
        show_comparison_key: bool,
    },
    UnorderedUnion {
        children: Vec<RecordQueryPlan>,
    },
    PrimaryKeyDistinct {
        inner: Box<RecordQueryPlan>,
    },
    /// Covering index scan: partial records served from index entries.
    Covering {
        index: IndexScanPlan,
        required_fields: Vec<KeyExpression>,
    },
    /// Fetch full records for a stream of partial records.
    Fetch {
        inner: Box<RecordQueryPlan>,
    },
    /// In-memory sort; emitted only when the sort configuration allows it.
    Sort {
        inner: Box<RecordQueryPlan>,
        key: KeyExpression,
        reverse: bool,
    },
}

impl RecordQueryPlan {
    /// Structural complexity: children plus one, plus scan-bound sizes.
    #[must_use]
    pub fn complexity(&self) -> usize {
        match self {
            Self::IndexScan(scan) => 1 + scan.comparisons.total_size(),
            Self::Scan(scan) => 1 + scan.comparisons.total_size(),
            Self::Covering { index, .. } => 1 + index.comparisons.total_size(),
            Self::TypeFilter { inner, .. }
            | Self::Filter { inner, .. }
            | Self::InJoin { inner, .. }
            | Self::InUnion { inner, .. }
            | Self::PrimaryKeyDistinct { inner }
            | Self::Fetch { inner }
            | Self::Sort { inner, .. } => 1 + inner.complexity(),
            Self::Intersection { children, .. }
            | Self::Union { children, .. }
            | Self::UnorderedUnion { children } => {
                1 + children.iter().map(Self::complexity).sum::<usize>()
            }
        }
    }

    #[must_use]
    pub fn is_reverse(&self) -> bool {
        match self {
            Self::IndexScan(scan) => scan.reverse,
            Self::Scan(scan) => scan.reverse,
            Self::Covering { index, .. } => index.reverse,
            Self::TypeFilter { inner, .. }
            | Self::Filter { inner, .. }
            | Self::InJoin { inner, .. }
            | Self::PrimaryKeyDistinct { inner }
            | Self::Fetch { inner } => inner.is_reverse(),
            Self::InUnion { reverse, .. }
            | Self::Intersection { reverse, .. }
            | Self::Union { reverse, .. }
            | Self::Sort { reverse, .. } => *reverse,
            Self::UnorderedUnion { children } => {
                children.first().is_some_and(Self::is_reverse)
            }
        }
    }

    /// Record types this plan's results can come from.
    #[must_use]
    pub fn possible_record_types(&self) -> Vec<String> {
        match self {
            Self::IndexScan(scan) => scan.possible_types.clone(),
            Self::Scan(scan) => scan.possible_types.clone(),
            Self::Covering { index, .. } => index.possible_types.clone(),
            Self::TypeFilter { record_types, .. } => record_types.clone(),
            Self::Filter { inner, .. }
            | Self::InJoin { inner, .. }
            | Self::InUnion { inner, .. }
            | Self::PrimaryKeyDistinct { inner }
            | Self::Fetch { inner }
            | Self::Sort { inner, .. } => inner.possible_record_types(),
            Self::Intersection { children, .. }
            | Self::Union { children, .. }
            | Self::UnorderedUnion { children } => {
                let mut types: Vec<String> = children
                    .iter()
                    .flat_map(Self::possible_record_types)
                    .collect();
                types.sort();
                types.dedup();
                types
            }
        }
    }

    /// Number of field-comparison leaves across residual filters in the tree.
    #[must_use]
    pub fn field_comparison_count(&self) -> usize {
        match self {
            Self::IndexScan(_) | Self::Scan(_) | Self::Covering { .. } => 0,
            Self::Filter { inner, filter } => {
                filter.field_comparison_count() + inner.field_comparison_count()
            }
            Self::TypeFilter { inner, .. }
            | Self::InJoin { inner, .. }
            | Self::InUnion { inner, .. }
            | Self::PrimaryKeyDistinct { inner }
            | Self::Fetch { inner }
            | Self::Sort { inner, .. } => inner.field_comparison_count(),
            Self::Intersection { children, .. }
            | Self::Union { children, .. }
            | Self::UnorderedUnion { children } => {
                children.iter().map(Self::field_comparison_count).sum()
            }
        }
    }

    /// Stable identifier for explainability: a digest of the canonical
    /// rendering, so identical plans carry identical ids across runs.
    #[must_use]
    pub fn stable_id(&self) -> String {
        let digest = Sha256::digest(self.to_string().as_bytes());
        let mut id = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            use std::fmt::Write as _;
            let _ = write!(id, "{byte:02x}");
        }
        id
    }
}

impl fmt::Display for RecordQueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexScan(scan) => {
                write!(f, "Index({} {}", scan.index_name, scan.comparisons)?;
                if scan.scan_type != IndexScanType::ByValue {
                    write!(f, " {}", scan.scan_type)?;
                }
                if scan.reverse {
                    write!(f, " REVERSE")?;
                }
                write!(f, ")")
            }
            Self::Scan(scan) => {
                if scan.comparisons.is_empty() {
                    write!(f, "Scan(<all>")?;
                } else {
                    write!(f, "Scan({}", scan.comparisons)?;
                }
                if scan.reverse {
                    write!(f, " REVERSE")?;
                }
                write!(f, ")")
            }
            Self::TypeFilter {
                inner,
                record_types,
            } => {
                write!(f, "TypeFilter([")?;
                for (i, record_type) in record_types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{record_type}")?;
                }
                write!(f, "], {inner})")
            }
            Self::Filter { inner, filter } => write!(f, "Filter([{filter}], {inner})"),
            Self::InJoin { inner, source } => {
                write!(f, "InJoin({} IN [", source.binding)?;
                for (i, value) in source.values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")?;
                if source.sort_values {
                    write!(f, " SORTED")?;
                    if source.sort_reverse {
                        write!(f, " DESC")?;
                    }
                }
                write!(f, ", {inner})")
            }
            Self::InUnion {
                inner,
                sources,
                comparison_key,
                ..
            } => {
                write!(f, "InUnion([")?;
                for (i, source) in sources.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", source.binding)?;
                }
                write!(f, "], {inner} BY {comparison_key})")
            }
            Self::Intersection {
                children,
                comparison_key,
                ..
            } => {
                write!(f, "Intersection(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, " BY {comparison_key})")
            }
            Self::Union {
                children,
                comparison_key,
                show_comparison_key,
                ..
            } => {
                write!(f, "Union(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                if *show_comparison_key {
                    write!(f, " BY {comparison_key}")?;
                }
                write!(f, ")")
            }
            Self::UnorderedUnion { children } => {
                write!(f, "UnorderedUnion(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            Self::PrimaryKeyDistinct { inner } => write!(f, "PrimaryKeyDistinct({inner})"),
            Self::Covering {
                index,
                required_fields,
            } => {
                write!(f, "Covering({} -> [", RecordQueryPlan::IndexScan(index.clone()))?;
                for (i, field) in required_fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, "])")
            }
            Self::Fetch { inner } => write!(f, "Fetch({inner})"),
            Self::Sort {
                inner,
                key,
                reverse,
            } => {
                write!(f, "Sort({inner} BY {key}")?;
                if *reverse {
                    write!(f, " DESC")?;
                }
                write!(f, ")")
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Comparison;

    fn index_scan(name: &str) -> RecordQueryPlan {
        let mut comparisons = ScanComparisons::empty();
        comparisons.push_equality(Comparison::Equals(Value::Text("x".into())));
        RecordQueryPlan::IndexScan(IndexScanPlan {
            index_name: name.to_string(),
            scan_type: IndexScanType::ByValue,
            comparisons,
            reverse: false,
            strictly_sorted: false,
            possible_types: vec!["A".to_string()],
        })
    }

    #[test]
    fn complexity_sums_children_and_scan_bounds() {
        let scan = index_scan("ix");
        assert_eq!(scan.complexity(), 2);
        let union = RecordQueryPlan::UnorderedUnion {
            children: vec![scan.clone(), index_scan("iy")],
        };
        assert_eq!(union.complexity(), 5);
        let distinct = RecordQueryPlan::PrimaryKeyDistinct {
            inner: Box::new(union),
        };
        assert_eq!(distinct.complexity(), 6);
    }

    #[test]
    fn stable_id_is_deterministic_and_shape_sensitive() {
        let a = index_scan("ix");
        let b = index_scan("ix");
        let c = index_scan("iy");
        assert_eq!(a.stable_id(), b.stable_id());
        assert_ne!(a.stable_id(), c.stable_id());
        assert_eq!(a.stable_id().len(), 16);
    }

    #[test]
    fn explain_renders_scan_bounds() {
        assert_eq!(index_scan("ix").to_string(), "Index(ix [EQUALS \"x\"])");
    }
}
