use crate::{
    plan::{PlanOrderingKey, RecordQueryPlan},
    planner::rank::RankComparison,
    query::QueryComponent,
};

///
/// ScoredPlan
///
/// Intermediate result of one candidate match: the plan so far, its score
/// (number of sarged comparisons), the filters it leaves unhandled, and the
/// bookkeeping that selection and combination run on.
///
/// Held by value and re-owned on each transformation; mutation happens only
/// through the `with_*` copies.
///

#[derive(Clone, Debug)]
pub(crate) struct ScoredPlan {
    pub(crate) plan: RecordQueryPlan,
    pub(crate) score: usize,
    /// Residual filters to evaluate on each fetched record.
    pub(crate) unsatisfied_filters: Vec<QueryComponent>,
    /// Filters evaluable on index entries before the fetch.
    pub(crate) index_filters: Vec<QueryComponent>,
    pub(crate) creates_duplicates: bool,
    pub(crate) included_rank_comparisons: Vec<RankComparison>,
    pub(crate) ordering_key: Option<PlanOrderingKey>,
}

impl ScoredPlan {
    pub(crate) fn new(score: usize, plan: RecordQueryPlan) -> Self {
        Self::with_unsatisfied(score, plan, Vec::new(), false)
    }

    pub(crate) fn with_unsatisfied(
        score: usize,
        plan: RecordQueryPlan,
        unsatisfied_filters: Vec<QueryComponent>,
        creates_duplicates: bool,
    ) -> Self {
        Self {
            plan,
            score,
            unsatisfied_filters,
            index_filters: Vec::new(),
            creates_duplicates,
            included_rank_comparisons: Vec::new(),
            ordering_key: None,
        }
    }

    pub(crate) fn num_residuals(&self) -> usize {
        self.unsatisfied_filters.len()
    }

    pub(crate) fn num_index_filters(&self) -> usize {
        self.index_filters.len()
    }

    pub(crate) fn num_non_sargables(&self) -> usize {
        self.num_residuals() + self.num_index_filters()
    }

    pub(crate) fn combine_non_sargables(&self) -> Vec<QueryComponent> {
        let mut combined = self.unsatisfied_filters.clone();
        combined.extend(self.index_filters.iter().cloned());
        combined
    }

    pub(crate) fn with_plan(self, plan: RecordQueryPlan) -> Self {
        Self { plan, ..self }
    }

    pub(crate) fn with_score(self, score: usize) -> Self {
        Self { score, ..self }
    }

    pub(crate) fn with_unsatisfied_filters(self, unsatisfied_filters: Vec<QueryComponent>) -> Self {
        Self {
            unsatisfied_filters,
            ..self
        }
    }

    pub(crate) fn with_filters(
        self,
        unsatisfied_filters: Vec<QueryComponent>,
        index_filters: Vec<QueryComponent>,
    ) -> Self {
        Self {
            unsatisfied_filters,
            index_filters,
            ..self
        }
    }

    pub(crate) fn with_creates_duplicates(self, creates_duplicates: bool) -> Self {
        Self {
            creates_duplicates,
            ..self
        }
    }

    pub(crate) fn with_rank_comparisons(self, included: Vec<RankComparison>) -> Self {
        Self {
            included_rank_comparisons: included,
            ..self
        }
    }
}

/// Merge included rank comparisons, deduplicating by their source component.
pub(crate) fn merge_rank_comparisons(
    into: &mut Vec<RankComparison>,
    additional: &[RankComparison],
) {
    for comparison in additional {
        if !into.iter().any(|existing| existing.component == comparison.component) {
            into.push(comparison.clone());
        }
    }
}
