//! Module: planner::select
//! Responsibility: choosing among scored candidates and combining the rest.
//! Does not own: per-candidate matching.

use crate::{
    error::PlannerError,
    expr::KeyExpression,
    model::{IndexKind, IndexModel},
    plan::RecordQueryPlan,
    planner::{
        config::IndexScanPreference,
        context::PlanContext,
        post,
        rank::RankComparisons,
        scored::{merge_rank_comparisons, ScoredPlan},
        RecordQueryPlanner,
    },
    query::QueryComponent,
};
use std::cmp::Ordering;

impl RecordQueryPlanner<'_> {
    /// The selection comparator: higher score, then fewer non-sargables,
    /// then more index filters (fewer fetches), then the smaller index with
    /// the scan-vs-index preference policy as the no-index tie-break.
    pub(crate) fn is_better_than_other(
        &self,
        context: &PlanContext<'_>,
        plan: &ScoredPlan,
        index: Option<&IndexModel>,
        other_plan: Option<&ScoredPlan>,
        other_index: Option<&IndexModel>,
    ) -> bool {
        let Some(other_plan) = other_plan else {
            return true;
        };
        if plan.score > other_plan.score {
            return true;
        }
        if plan.num_non_sargables() < other_plan.num_non_sargables() {
            return true;
        }
        if plan.score == other_plan.score
            && plan.num_non_sargables() == other_plan.num_non_sargables()
        {
            if plan.num_index_filters() == other_plan.num_index_filters()
                && self.compare_indexes(context, index, other_index) == Ordering::Greater
            {
                return true;
            }
            return plan.num_index_filters() > other_plan.num_index_filters();
        }
        false
    }

    pub(crate) fn compare_indexes(
        &self,
        context: &PlanContext<'_>,
        first: Option<&IndexModel>,
        second: Option<&IndexModel>,
    ) -> Ordering {
        match (first, second) {
            (None, None) => Ordering::Equal,
            (None, Some(second)) => {
                if self.prefer_index_to_scan(context, second) {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (Some(first), None) => {
                if self.prefer_index_to_scan(context, first) {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            // Better for fewer stored columns.
            (Some(first), Some(second)) => index_size_overhead(context, second)
                .cmp(&index_size_overhead(context, first)),
        }
    }

    fn prefer_index_to_scan(&self, context: &PlanContext<'_>, index: &IndexModel) -> bool {
        match self.configuration().index_scan_preference {
            IndexScanPreference::PreferIndex => true,
            IndexScanPreference::PreferScan => false,
            IndexScanPreference::PreferPrimaryKeyIndex => context
                .common_primary_key
                .as_ref()
                .is_some_and(|primary_key| index.root() == primary_key),
        }
    }

    /// Combine the best plan with order-compatible candidates into an
    /// ordered intersection, or wrap the remaining non-sargables as a
    /// residual filter.
    pub(crate) fn handle_non_sargables(
        &self,
        best_plan: ScoredPlan,
        intersection_candidates: Vec<ScoredPlan>,
        context: &PlanContext<'_>,
        rank_comparisons: &RankComparisons,
    ) -> Result<ScoredPlan, PlannerError> {
        let mut best_plan = best_plan;
        if let Some(common_primary_key) = &context.common_primary_key
            && !intersection_candidates.is_empty()
        {
            let comparison_key =
                self.key_for_merge(context.query.sort(), Some(common_primary_key));
            if let Some(comparison_key) = comparison_key {
                let intersection =
                    self.plan_intersection(intersection_candidates, &comparison_key)?;
                if let Some(intersection) = intersection {
                    if intersection.unsatisfied_filters.is_empty() {
                        return Ok(intersection);
                    } else if best_plan.num_non_sargables() > intersection.num_non_sargables() {
                        best_plan = intersection;
                    }
                }
            }
        }

        if best_plan.num_non_sargables() > 0 {
            let non_sargables =
                rank_comparisons.substitute_all(best_plan.combine_non_sargables());
            let filter = if non_sargables.len() == 1 {
                non_sargables
                    .into_iter()
                    .next()
                    .unwrap_or(QueryComponent::And(Vec::new()))
            } else {
                QueryComponent::And(non_sargables)
            };
            let filtered = RecordQueryPlan::Filter {
                inner: Box::new(best_plan.plan.clone()),
                filter,
            };
            Ok(ScoredPlan {
                plan: filtered,
                score: best_plan.score,
                unsatisfied_filters: Vec::new(),
                index_filters: Vec::new(),
                creates_duplicates: best_plan.creates_duplicates,
                included_rank_comparisons: best_plan.included_rank_comparisons,
                ordering_key: None,
            })
        } else {
            Ok(best_plan)
        }
    }

    // Greedily add order-compatible plans while each strictly reduces the
    // remaining non-sargable set. The resulting score is not recomputed; the
    // first intersection that strictly dominates on non-sargable count wins.
    pub(crate) fn plan_intersection(
        &self,
        mut candidates: Vec<ScoredPlan>,
        comparison_key: &KeyExpression,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        // Prefer plans that handle more filters, then more index filters.
        candidates.sort_by(|a, b| {
            a.num_non_sargables()
                .cmp(&b.num_non_sargables())
                .then_with(|| b.num_index_filters().cmp(&a.num_index_filters()))
        });
        let Some(first) = candidates.first() else {
            return Ok(None);
        };
        let mut non_sargables = first.combine_non_sargables();
        let mut included_rank_comparisons = Vec::new();
        merge_rank_comparisons(&mut included_rank_comparisons, &first.included_rank_comparisons);
        let reverse = first.plan.is_reverse();
        let score = first.score;
        let creates_duplicates = first.creates_duplicates;
        let mut included_plans = vec![first.plan.clone()];
        for next_plan in candidates.iter().skip(1) {
            let next_non_sargables = next_plan.combine_non_sargables();
            let old_count = non_sargables.len();
            non_sargables.retain(|component| next_non_sargables.contains(component));
            if non_sargables.len() < old_count {
                if next_plan.plan.is_reverse() != reverse {
                    // Cannot intersect plans with incompatible directions.
                    return Ok(None);
                }
                included_plans.push(next_plan.plan.clone());
            }
            merge_rank_comparisons(
                &mut included_rank_comparisons,
                &next_plan.included_rank_comparisons,
            );
        }
        if included_plans.len() <= 1 {
            return Ok(None);
        }
        let intersection = RecordQueryPlan::Intersection {
            children: included_plans,
            comparison_key: comparison_key.clone(),
            reverse,
        };
        let complexity = intersection.complexity();
        if complexity > self.configuration().complexity_threshold {
            return Err(PlannerError::PlanTooComplex {
                complexity,
                threshold: self.configuration().complexity_threshold,
                plan: intersection.to_string(),
            });
        }
        Ok(Some(ScoredPlan {
            plan: intersection,
            score,
            unsatisfied_filters: non_sargables,
            index_filters: Vec::new(),
            creates_duplicates,
            included_rank_comparisons,
            ordering_key: None,
        }))
    }

    /// Partition a plan's unsatisfied filters into those evaluable on index
    /// entries (no fetch needed) and true record residuals.
    pub(crate) fn compute_index_filters(
        &self,
        context: &PlanContext<'_>,
        plan: ScoredPlan,
    ) -> ScoredPlan {
        let RecordQueryPlan::IndexScan(ref index_scan) = plan.plan else {
            return plan;
        };
        let Ok(index) = self.metadata().index(&index_scan.index_name) else {
            return plan;
        };
        if self.metadata().record_types_for_index(index).len() != 1 {
            return plan;
        }
        let available =
            post::available_index_fields(index, context.common_primary_key.as_ref());
        let mut index_filters = Vec::new();
        let mut residual_filters = Vec::new();
        for component in &plan.unsatisfied_filters {
            if post::component_evaluable_on(&available, component) {
                index_filters.push(component.clone());
            } else {
                residual_filters.push(component.clone());
            }
        }
        if index_filters.is_empty() {
            plan
        } else {
            plan.with_filters(residual_filters, index_filters)
        }
    }

    /// Key for a merge operation: the sort key for comparison plus a primary
    /// key for uniqueness. A sort that prefixes the candidate key collapses
    /// into it.
    pub(crate) fn key_for_merge(
        &self,
        sort: Option<&KeyExpression>,
        candidate_key: Option<&KeyExpression>,
    ) -> Option<KeyExpression> {
        match (sort, candidate_key) {
            (None, Some(candidate)) => Some(candidate.clone()),
            (Some(sort), None) => Some(sort.clone()),
            (Some(sort), Some(candidate)) => {
                if sort.is_prefix_key(candidate) {
                    Some(candidate.clone())
                } else if candidate.is_prefix_key(sort) {
                    Some(sort.clone())
                } else {
                    Some(sort.concat_without_duplicates(candidate))
                }
            }
            (None, None) => None,
        }
    }
}

// Smaller entries lose less to overhead: value indexes are sized by their
// stored entry width against the common primary key.
fn index_size_overhead(context: &PlanContext<'_>, index: &IndexModel) -> usize {
    match &context.common_primary_key {
        Some(primary_key) if index.kind() == IndexKind::Value => index.entry_size(primary_key),
        _ => index.column_size(),
    }
}
