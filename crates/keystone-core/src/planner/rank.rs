//! Module: planner::rank
//! Responsibility: rank-index matching and the rank-comparison table.
//! Does not own: rank maintenance or rank-to-score evaluation at runtime.

use crate::{
    expr::KeyExpression,
    model::{IndexKind, IndexModel},
    plan::IndexScanType,
    planner::{context::CandidateScan, scored::ScoredPlan, RecordQueryPlanner},
    query::{Comparison, ComparisonKind, QueryComponent, QueryFunction},
    scan::ScanComparisons,
};

///
/// RankComparison
///
/// One `rank(group) <op> value` predicate resolved against a concrete rank
/// index: the rank-space scan bounds and the sibling group filters the
/// bounds consumed.
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RankComparison {
    pub(crate) component: QueryComponent,
    pub(crate) index_name: String,
    pub(crate) scan_comparisons: ScanComparisons,
    pub(crate) group_filters: Vec<QueryComponent>,
}

///
/// RankComparisons
///
/// Table of rank predicates found in a filter, built once per filter
/// planning attempt. Residual rank predicates are substituted through this
/// table when the chosen plan is wrapped with a residual filter.
///

#[derive(Clone, Debug, Default)]
pub(crate) struct RankComparisons {
    entries: Vec<RankComparison>,
}

impl RankComparisons {
    pub(crate) fn new(filter: Option<&QueryComponent>, indexes: &[&IndexModel]) -> Self {
        let mut entries = Vec::new();
        let Some(filter) = filter else {
            return Self { entries };
        };
        let siblings = filter.conjuncts();
        for component in &siblings {
            if let QueryComponent::RecordFunction {
                function: QueryFunction::Rank { group },
                comparison,
            } = component
            {
                for index in indexes {
                    if index.kind() != IndexKind::Rank || index.root() != group {
                        continue;
                    }
                    if let Some(entry) =
                        build_rank_comparison(component, comparison, group, index, &siblings)
                    {
                        entries.push(entry);
                        break;
                    }
                }
            }
        }
        Self { entries }
    }

    pub(crate) fn get(&self, component: &QueryComponent) -> Option<&RankComparison> {
        self.entries
            .iter()
            .find(|entry| entry.component == *component)
    }

    /// Rank-space substitution for residual evaluation. Rank predicates keep
    /// their functional form; everything else passes through unchanged.
    pub(crate) fn substitute(&self, component: &QueryComponent) -> QueryComponent {
        component.clone()
    }

    pub(crate) fn substitute_all(&self, components: Vec<QueryComponent>) -> Vec<QueryComponent> {
        components
            .into_iter()
            .map(|component| self.substitute(&component))
            .collect()
    }
}

// Bind the rank predicate into rank-space scan bounds: every group column
// must be pinned by a sibling equality; the rank value follows as the ranked
// column's comparison.
fn build_rank_comparison(
    component: &QueryComponent,
    comparison: &Comparison,
    group: &KeyExpression,
    index: &IndexModel,
    siblings: &[QueryComponent],
) -> Option<RankComparison> {
    if comparison.kind() == ComparisonKind::Other {
        return None;
    }
    let group_columns = group.grouping_sub_key()?.normalized_columns();
    let mut scan_comparisons = ScanComparisons::empty();
    let mut group_filters = Vec::new();
    for column in &group_columns {
        let KeyExpression::Field { name, .. } = column else {
            return None;
        };
        let sibling = siblings.iter().find(|sibling| {
            matches!(
                sibling,
                QueryComponent::Field { field, comparison }
                    if field == name && comparison.kind() == ComparisonKind::Equality
            )
        })?;
        let QueryComponent::Field { comparison, .. } = sibling else {
            return None;
        };
        scan_comparisons.push_equality(comparison.clone());
        group_filters.push(sibling.clone());
    }
    match comparison.kind() {
        ComparisonKind::Equality => {
            scan_comparisons.push_equality(comparison.clone());
        }
        ComparisonKind::Inequality => scan_comparisons.push_inequality(comparison.clone()),
        ComparisonKind::Other => return None,
    }
    Some(RankComparison {
        component: component.clone(),
        index_name: index.name().to_string(),
        scan_comparisons,
        group_filters,
    })
}

// Rank scans order by rank within a group, not by any sortable key, so a
// requested sort rejects the rank-space rewrite.
fn matches_sort(sort: Option<&KeyExpression>) -> bool {
    sort.is_none()
}

impl RecordQueryPlanner<'_> {
    pub(crate) fn plan_rank(
        &self,
        candidate_scan: &CandidateScan<'_>,
        index: &IndexModel,
        grouping: &KeyExpression,
        filter: &QueryComponent,
    ) -> Option<ScoredPlan> {
        match filter {
            QueryComponent::RecordFunction { .. } => {
                let rank_comparison = candidate_scan.rank_comparisons.get(filter)?;
                if rank_comparison.index_name != index.name()
                    || !matches_sort(candidate_scan.context.query.sort())
                {
                    return None;
                }
                let scan = self.rank_scan(
                    candidate_scan,
                    rank_comparison.scan_comparisons.clone(),
                );
                let creates_duplicates = grouping.whole_key().creates_duplicates();
                Some(
                    ScoredPlan::with_unsatisfied(1, scan, Vec::new(), creates_duplicates)
                        .with_rank_comparisons(vec![rank_comparison.clone()]),
                )
            }
            QueryComponent::And(_) => {
                self.plan_rank_with_and(candidate_scan, index, grouping, filter)
            }
            _ => None,
        }
    }

    fn plan_rank_with_and(
        &self,
        candidate_scan: &CandidateScan<'_>,
        index: &IndexModel,
        grouping: &KeyExpression,
        filter: &QueryComponent,
    ) -> Option<ScoredPlan> {
        let filters = filter.conjuncts();
        for child in &filters {
            let Some(rank_comparison) = candidate_scan.rank_comparisons.get(child) else {
                continue;
            };
            if rank_comparison.index_name != index.name()
                || !matches_sort(candidate_scan.context.query.sort())
            {
                continue;
            }
            let mut scan_comparisons = rank_comparison.scan_comparisons.clone();
            let mut included = vec![rank_comparison.clone()];
            let mut unsatisfied: Vec<QueryComponent> = filters
                .iter()
                .filter(|&other| {
                    other != child && !rank_comparison.group_filters.contains(other)
                })
                .cloned()
                .collect();

            // Merge additional rank predicates over the same grouping.
            let mut i = 0;
            while i < unsatisfied.len() {
                let other = unsatisfied[i].clone();
                if let Some(other_rank) = candidate_scan.rank_comparisons.get(&other)
                    && other_rank.index_name == index.name()
                    && let Some(merged) =
                        scan_comparisons.merged_with(&other_rank.scan_comparisons)
                {
                    scan_comparisons = merged;
                    included.push(other_rank.clone());
                    unsatisfied.remove(i);
                    continue;
                }
                i += 1;
            }

            let scan = self.rank_scan(candidate_scan, scan_comparisons);
            let creates_duplicates = grouping.whole_key().creates_duplicates();
            return Some(
                ScoredPlan::with_unsatisfied(
                    grouping.column_size(),
                    scan,
                    unsatisfied,
                    creates_duplicates,
                )
                .with_rank_comparisons(included),
            );
        }
        None
    }

    pub(crate) fn rank_scan(
        &self,
        candidate_scan: &CandidateScan<'_>,
        comparisons: ScanComparisons,
    ) -> crate::plan::RecordQueryPlan {
        self.plan_scan(candidate_scan, IndexScanType::ByRank, comparisons, false)
    }
}
