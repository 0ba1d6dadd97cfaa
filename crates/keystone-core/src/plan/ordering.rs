use crate::{
    expr::KeyExpression,
    model::MetadataModel,
    plan::{IndexScanPlan, IndexScanType, RecordQueryPlan},
};

///
/// PlanOrderingKey
///
/// The sequence of columns by which a subplan's output arrives, used to
/// decide whether subplans can be combined by ordered union, intersection,
/// or IN-union.
///
/// `keys[..prefix_size]` are equality-bound: constant within one execution
/// and therefore free to appear anywhere in a merge key. `keys[prefix_size..]`
/// is the real arrival order. `primary_key_start` marks where the common
/// primary key begins within `keys`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlanOrderingKey {
    keys: Vec<KeyExpression>,
    prefix_size: usize,
    primary_key_start: usize,
}

impl PlanOrderingKey {
    #[must_use]
    pub fn new(keys: Vec<KeyExpression>, prefix_size: usize, primary_key_start: usize) -> Self {
        Self {
            keys,
            prefix_size,
            primary_key_start,
        }
    }

    /// Derive the output ordering of a plan, when one is statically known.
    #[must_use]
    pub fn for_plan(
        metadata: &MetadataModel,
        plan: &RecordQueryPlan,
        common_primary_key: Option<&KeyExpression>,
    ) -> Option<Self> {
        match plan {
            RecordQueryPlan::IndexScan(scan) => {
                Self::for_index_scan(metadata, scan, common_primary_key)
            }
            RecordQueryPlan::Covering { index, .. } => {
                Self::for_index_scan(metadata, index, common_primary_key)
            }
            RecordQueryPlan::Scan(scan) => {
                let keys = common_primary_key?.normalized_columns();
                Some(Self::new(keys, scan.comparisons.equality_size(), 0))
            }
            RecordQueryPlan::TypeFilter { inner, .. }
            | RecordQueryPlan::Filter { inner, .. }
            | RecordQueryPlan::PrimaryKeyDistinct { inner }
            | RecordQueryPlan::Fetch { inner } => {
                Self::for_plan(metadata, inner, common_primary_key)
            }
            RecordQueryPlan::Intersection { comparison_key, .. } => {
                let keys = comparison_key.normalized_columns();
                let primary_key_start =
                    primary_key_suffix_start(&keys, common_primary_key);
                Some(Self::new(keys, 0, primary_key_start))
            }
            _ => None,
        }
    }

    fn for_index_scan(
        metadata: &MetadataModel,
        scan: &IndexScanPlan,
        common_primary_key: Option<&KeyExpression>,
    ) -> Option<Self> {
        if scan.scan_type != IndexScanType::ByValue {
            // Rank, text, and group scans order in their own key space.
            return None;
        }
        let index = metadata.index(&scan.index_name).ok()?;
        let mut keys = index.root().normalized_columns();
        let before_primary_key = keys.len();
        if let Some(primary_key) = common_primary_key {
            for column in primary_key.normalized_columns() {
                if !keys.contains(&column) {
                    keys.push(column);
                }
            }
        }
        let mut primary_key_start = before_primary_key;
        if let Some(primary_key) = common_primary_key {
            let primary_columns = primary_key.normalized_columns();
            while primary_key_start > 0
                && primary_columns.contains(&keys[primary_key_start - 1])
            {
                primary_key_start -= 1;
            }
        }
        Some(Self::new(
            keys,
            scan.comparisons.equality_size(),
            primary_key_start,
        ))
    }

    #[must_use]
    pub fn keys(&self) -> &[KeyExpression] {
        &self.keys
    }

    #[must_use]
    pub const fn prefix_size(&self) -> usize {
        self.prefix_size
    }

    #[must_use]
    pub const fn primary_key_start(&self) -> usize {
        self.primary_key_start
    }

    /// Every column before the primary key is equality-bound, so the plan
    /// arrives in primary-key order.
    #[must_use]
    pub const fn is_primary_key_ordered(&self) -> bool {
        self.prefix_size >= self.primary_key_start
    }

    /// Ordered (non-constant) arrival columns.
    #[must_use]
    pub fn ordered_columns(&self) -> &[KeyExpression] {
        &self.keys[self.prefix_size.min(self.keys.len())..]
    }

    /// Whether merging this plan's output on `key_columns` reproduces its
    /// arrival order: the ordered columns must appear, in order, as a prefix
    /// of `key_columns` interleaved only with equality-bound columns; once
    /// all ordered columns are consumed, further key columns cannot reorder
    /// anything.
    #[must_use]
    pub fn accepts_comparison_key(&self, key_columns: &[KeyExpression]) -> bool {
        let ordered = self.ordered_columns();
        let constants = &self.keys[..self.prefix_size.min(self.keys.len())];
        let mut next_ordered = 0;
        for column in key_columns {
            if next_ordered >= ordered.len() {
                break;
            }
            if ordered[next_ordered] == *column {
                next_ordered += 1;
            } else if !constants.contains(column) {
                return false;
            }
        }
        next_ordered == ordered.len()
    }

    /// Pick the comparison key for an ordered merge of `orderings`: the
    /// candidate key (typically sort ∥ common primary key) when every
    /// subplan accepts it; without `candidate_only`, each subplan's own
    /// ordered suffix is also tried.
    #[must_use]
    pub fn merged_comparison_key(
        orderings: &[&Self],
        candidate_key: Option<&KeyExpression>,
        candidate_only: bool,
    ) -> Option<KeyExpression> {
        let mut candidates: Vec<Vec<KeyExpression>> = Vec::new();
        if let Some(candidate) = candidate_key {
            candidates.push(candidate.normalized_columns());
        }
        if !candidate_only {
            for ordering in orderings {
                let columns = ordering.ordered_columns().to_vec();
                if !columns.is_empty() && !candidates.contains(&columns) {
                    candidates.push(columns);
                }
            }
        }
        for candidate in candidates {
            if candidate.is_empty() {
                continue;
            }
            if orderings
                .iter()
                .all(|ordering| ordering.accepts_comparison_key(&candidate))
            {
                return Some(KeyExpression::concat(candidate));
            }
        }
        None
    }

    /// Re-derive the ordering after IN-join wrapping: the bound columns move
    /// from the equality prefix into the ordered region, in clause order.
    /// Returns `None` when a bound column was never sarged.
    #[must_use]
    pub fn with_in_bound_columns(&self, clause_columns: &[KeyExpression]) -> Option<Self> {
        let mut constants: Vec<KeyExpression> =
            self.keys[..self.prefix_size.min(self.keys.len())].to_vec();
        for column in clause_columns {
            let position = constants.iter().position(|c| c == column)?;
            constants.remove(position);
        }
        let mut keys = constants.clone();
        keys.extend(clause_columns.iter().cloned());
        keys.extend(self.ordered_columns().iter().cloned());
        let prefix_size = constants.len();
        let primary_key_start = self.primary_key_start.max(prefix_size);
        Some(Self::new(keys, prefix_size, primary_key_start))
    }
}

// Earliest start of a contiguous suffix of `keys` drawn from the primary key.
fn primary_key_suffix_start(
    keys: &[KeyExpression],
    common_primary_key: Option<&KeyExpression>,
) -> usize {
    let Some(primary_key) = common_primary_key else {
        return keys.len();
    };
    let primary_columns = primary_key.normalized_columns();
    let mut start = keys.len();
    while start > 0 && primary_columns.contains(&keys[start - 1]) {
        start -= 1;
    }
    start
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> KeyExpression {
        KeyExpression::field(name)
    }

    #[test]
    fn accepts_key_matching_ordered_suffix() {
        let ordering = PlanOrderingKey::new(vec![field("a"), field("b"), field("id")], 1, 2);
        // Ordered columns are [b, id]; "a" is equality-bound.
        assert!(ordering.accepts_comparison_key(&[field("b"), field("id")]));
        assert!(ordering.accepts_comparison_key(&[field("a"), field("b"), field("id")]));
        assert!(!ordering.accepts_comparison_key(&[field("id"), field("b")]));
        assert!(!ordering.accepts_comparison_key(&[field("b")]));
    }

    #[test]
    fn accepts_extra_columns_after_total_order() {
        let ordering = PlanOrderingKey::new(vec![field("a"), field("id")], 1, 1);
        assert!(ordering.accepts_comparison_key(&[field("id"), field("z")]));
    }

    #[test]
    fn merged_comparison_key_requires_unanimity() {
        let left = PlanOrderingKey::new(vec![field("a"), field("id")], 1, 1);
        let right = PlanOrderingKey::new(vec![field("b"), field("id")], 1, 1);
        let candidate = KeyExpression::field("id");
        assert_eq!(
            PlanOrderingKey::merged_comparison_key(&[&left, &right], Some(&candidate), true),
            Some(candidate.clone())
        );
        let sorted = PlanOrderingKey::new(vec![field("b"), field("id")], 0, 1);
        assert_eq!(
            PlanOrderingKey::merged_comparison_key(&[&left, &sorted], Some(&candidate), true),
            None
        );
    }

    #[test]
    fn in_bound_columns_move_into_ordered_region() {
        let ordering =
            PlanOrderingKey::new(vec![field("name"), field("age"), field("id")], 2, 2);
        let adjusted = ordering
            .with_in_bound_columns(&[field("name")])
            .expect("name was sarged");
        assert_eq!(adjusted.prefix_size(), 1);
        assert_eq!(
            adjusted.keys(),
            &[field("age"), field("name"), field("id")]
        );
        assert!(adjusted.accepts_comparison_key(&[field("name"), field("id")]));
    }

    #[test]
    fn in_bound_column_missing_from_prefix_is_rejected() {
        let ordering = PlanOrderingKey::new(vec![field("age"), field("id")], 0, 1);
        assert_eq!(ordering.with_in_bound_columns(&[field("name")]), None);
    }
}
