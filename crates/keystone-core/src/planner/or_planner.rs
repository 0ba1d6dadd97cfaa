//! Module: planner::or_planner
//! Responsibility: planning disjunctions — same-base collapse, ordered
//! unions, unordered unions — and the bounded AND-over-OR distribution.
//! Does not own: disjunct matching; each branch plans through the filter path.

use crate::{
    error::PlannerError,
    plan::{PlanOrderingKey, RecordQueryPlan},
    planner::{
        context::PlanContext,
        scored::{merge_rank_comparisons, ScoredPlan},
        RecordQueryPlanner,
    },
    query::QueryComponent,
};

impl RecordQueryPlanner<'_> {
    pub(crate) fn plan_or(
        &self,
        context: &PlanContext<'_>,
        filter: &QueryComponent,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        let QueryComponent::Or(children) = filter else {
            return Ok(None);
        };
        if children.is_empty() {
            return Ok(None);
        }
        let mut subplans: Vec<ScoredPlan> = Vec::with_capacity(children.len());
        let mut all_have_ordering_key = true;
        let mut common_base: Option<RecordQueryPlan> = None;
        let mut all_same_base = true;
        for subfilter in children {
            let Some(subplan) = self.plan_filter_with_in(context, subfilter, true)? else {
                return Ok(None);
            };
            if subplan.ordering_key.is_none() {
                all_have_ordering_key = false;
            }
            let filtered_base = match &subplan.plan {
                RecordQueryPlan::Filter { inner, .. } => Some((**inner).clone()),
                _ => None,
            };
            if subplans.is_empty() {
                all_same_base = filtered_base.is_some();
                common_base = filtered_base;
            } else if all_same_base && filtered_base != common_base {
                all_same_base = false;
            }
            subplans.push(subplan);
        }

        // If the subplans only differ in their filters, there is no point in
        // repeating the base scan to evaluate each of them. Evaluate the scan
        // once with an OR filter.
        if all_same_base && let Some(base) = common_base {
            let or_filter = QueryComponent::or(
                subplans
                    .iter()
                    .map(|subplan| match &subplan.plan {
                        RecordQueryPlan::Filter { filter, .. } => filter.clone(),
                        _ => QueryComponent::And(Vec::new()),
                    })
                    .collect(),
            );
            let first = &subplans[0];
            return Ok(Some(ScoredPlan {
                plan: RecordQueryPlan::Filter {
                    inner: Box::new(base),
                    filter: or_filter,
                },
                score: first.score,
                unsatisfied_filters: Vec::new(),
                index_filters: Vec::new(),
                creates_duplicates: first.creates_duplicates,
                included_rank_comparisons: first.included_rank_comparisons.clone(),
                ordering_key: None,
            }));
        }

        // Under a requested sort, compatibly ordered children merge into an
        // ordered union that removes duplicates as they come; without one,
        // an unordered union with explicit deduplication does less work.
        if context.query.sort().is_some()
            && all_have_ordering_key
            && let Some(plan) = self.plan_ordered_union(context, &subplans)?
        {
            return Ok(Some(plan));
        }
        if let Some(plan) = self.plan_unordered_union(context, &subplans)? {
            return Ok(self.plan_remove_duplicates(context, plan));
        }
        Ok(None)
    }

    fn plan_ordered_union(
        &self,
        context: &PlanContext<'_>,
        subplans: &[ScoredPlan],
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        let sort = context.query.sort();
        let candidate_only = sort.is_some();
        let candidate_key =
            self.key_for_merge(sort, context.common_primary_key.as_ref());
        let orderings: Vec<&PlanOrderingKey> = subplans
            .iter()
            .filter_map(|subplan| subplan.ordering_key.as_ref())
            .collect();
        if orderings.len() != subplans.len() {
            return Ok(None);
        }
        let Some(comparison_key) = PlanOrderingKey::merged_comparison_key(
            &orderings,
            candidate_key.as_ref(),
            candidate_only,
        ) else {
            return Ok(None);
        };
        let reverse = subplans[0].plan.is_reverse();
        let mut any_duplicates = false;
        let mut included_rank_comparisons = Vec::new();
        let mut child_plans = Vec::with_capacity(subplans.len());
        for subplan in subplans {
            if subplan.plan.is_reverse() != reverse {
                // Cannot mix directions under one common ordering key.
                return Ok(None);
            }
            child_plans.push(subplan.plan.clone());
            any_duplicates |= subplan.creates_duplicates;
            merge_rank_comparisons(
                &mut included_rank_comparisons,
                &subplan.included_rank_comparisons,
            );
        }
        let show_comparison_key =
            context.common_primary_key.as_ref() != Some(&comparison_key);
        let union_plan = RecordQueryPlan::Union {
            children: child_plans,
            comparison_key,
            reverse,
            show_comparison_key,
        };
        let complexity = union_plan.complexity();
        if complexity > self.configuration().complexity_threshold {
            return Err(PlannerError::PlanTooComplex {
                complexity,
                threshold: self.configuration().complexity_threshold,
                plan: union_plan.to_string(),
            });
        }
        // Score 0 when failed IN-joins retry as ORs, so that an IN-join that
        // did work is not beaten by its own union expansion.
        let score = usize::from(!self.configuration().attempt_failed_in_join_as_or);
        Ok(Some(ScoredPlan {
            plan: union_plan,
            score,
            unsatisfied_filters: Vec::new(),
            index_filters: Vec::new(),
            creates_duplicates: any_duplicates,
            included_rank_comparisons,
            ordering_key: None,
        }))
    }

    fn plan_unordered_union(
        &self,
        context: &PlanContext<'_>,
        subplans: &[ScoredPlan],
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        if context.query.sort().is_some() {
            return Ok(None);
        }
        let mut included_rank_comparisons = Vec::new();
        let mut child_plans = Vec::with_capacity(subplans.len());
        for subplan in subplans {
            child_plans.push(subplan.plan.clone());
            merge_rank_comparisons(
                &mut included_rank_comparisons,
                &subplan.included_rank_comparisons,
            );
        }
        let union_plan = RecordQueryPlan::UnorderedUnion {
            children: child_plans,
        };
        let complexity = union_plan.complexity();
        if complexity > self.configuration().complexity_threshold {
            return Err(PlannerError::PlanTooComplex {
                complexity,
                threshold: self.configuration().complexity_threshold,
                plan: union_plan.to_string(),
            });
        }
        Ok(Some(ScoredPlan {
            plan: union_plan,
            score: 1,
            unsatisfied_filters: Vec::new(),
            index_filters: Vec::new(),
            creates_duplicates: true,
            included_rank_comparisons,
            ordering_key: None,
        }))
    }

    /// Single-step distribution of an AND over its one OR child, so a union
    /// plan becomes reachable:
    /// `AND(x, y, OR(a, b)) → OR(AND(x, y, a), AND(x, y, b))`.
    ///
    /// Applies only when every sibling of the OR is a single-field
    /// comparison and the resulting disjunction stays within the configured
    /// width.
    pub(crate) fn normalize_and_or(&self, filter: &QueryComponent) -> QueryComponent {
        let QueryComponent::And(children) = filter else {
            return filter.clone();
        };
        let mut single_or_child: Option<&Vec<QueryComponent>> = None;
        let mut other_children = Vec::new();
        for child in children {
            match child {
                QueryComponent::Or(or_children) => {
                    if single_or_child.is_some() {
                        return filter.clone();
                    }
                    single_or_child = Some(or_children);
                }
                other if other.is_single_field_comparison() => {
                    other_children.push(other.clone());
                }
                _ => return filter.clone(),
            }
        }
        let Some(or_children) = single_or_child else {
            return filter.clone();
        };
        if or_children.len() > self.configuration().or_distribution_limit {
            return filter.clone();
        }
        QueryComponent::or(distribute_and(&other_children, or_children))
    }

    /// Distribution used after a failed IN-join is expanded to an OR; the
    /// expansion leaves one OR child among single-field siblings, which is
    /// exactly the shape the single-step distribution handles.
    pub(crate) fn normalize_and_or_for_in_as_or(
        &self,
        component: &QueryComponent,
    ) -> QueryComponent {
        self.normalize_and_or(component)
    }
}

fn distribute_and(
    predicates_to_distribute: &[QueryComponent],
    children: &[QueryComponent],
) -> Vec<QueryComponent> {
    let mut distributed = Vec::with_capacity(children.len());
    for child in children {
        let mut conjuncts = predicates_to_distribute.to_vec();
        match child {
            QueryComponent::And(grandchildren) => {
                conjuncts.extend(grandchildren.iter().cloned());
            }
            other => conjuncts.push(other.clone()),
        }
        distributed.push(QueryComponent::and(conjuncts));
    }
    distributed
}
