//! Module: planner
//! Responsibility: converting a `RecordQuery` into a `RecordQueryPlan` using
//! the secondary indexes declared in the metadata.
//! Does not own: plan execution or metadata loading.
//!
//! Determinism: candidate indexes are considered in lexicographic name
//! order, tie-breaks in the selection comparator are strict, and the filter
//! normalizer sorts nothing it does not own, so the emitted plan is a pure
//! function of (metadata, store state, configuration, query).

mod config;
mod context;
mod in_extract;
mod matching;
mod or_planner;
mod post;
mod rank;
mod scored;
mod select;
mod text;

#[cfg(test)]
mod tests;

pub use config::{
    IndexScanPreference, PlannerConfiguration, DEFAULT_COMPLEXITY_THRESHOLD,
    DEFAULT_DNF_TERM_BUDGET, DEFAULT_IN_UNION_MAX_SIZE, DEFAULT_OR_DISTRIBUTION_LIMIT,
};

use crate::{
    error::PlannerError,
    expr::KeyExpression,
    model::{IndexKind, IndexModel, MetadataModel, RecordTypeModel, StoreReadability},
    plan::{IndexScanPlan, IndexScanType, PlanOrderingKey, RecordQueryPlan},
    planner::{
        context::{CandidateScan, PlanContext},
        in_extract::InExtractor,
        rank::RankComparisons,
        scored::ScoredPlan,
    },
    query::{BooleanNormalizer, Comparison, QueryComponent, RecordQuery},
    scan::ScanComparisons,
};
use std::cmp::Ordering;

///
/// RecordQueryPlanner
///
/// The heuristic query planner. Holds immutable references to the metadata
/// and the store-readability snapshot plus a configuration value; a single
/// `plan()` call performs all matching, selection, and post-processing on
/// the calling thread and returns the plan tree.
///

#[derive(Clone, Debug)]
pub struct RecordQueryPlanner<'m> {
    metadata: &'m MetadataModel,
    store_state: &'m StoreReadability,
    configuration: PlannerConfiguration,
    primary_key_has_record_type_prefix: bool,
}

impl<'m> RecordQueryPlanner<'m> {
    pub fn new(metadata: &'m MetadataModel, store_state: &'m StoreReadability) -> Self {
        let primary_key_has_record_type_prefix = metadata.primary_key_has_record_type_prefix();
        // With several record types and no type prefix on the primary key, a
        // record scan has to skip unrelated types, so an index is safer
        // without knowing any cardinalities.
        let preference = if metadata.record_types().count() > 1
            && !primary_key_has_record_type_prefix
        {
            IndexScanPreference::PreferIndex
        } else {
            IndexScanPreference::PreferScan
        };
        Self {
            metadata,
            store_state,
            configuration: PlannerConfiguration::default()
                .with_index_scan_preference(preference),
            primary_key_has_record_type_prefix,
        }
    }

    #[must_use]
    pub fn with_configuration(mut self, configuration: PlannerConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    #[must_use]
    pub const fn configuration(&self) -> &PlannerConfiguration {
        &self.configuration
    }

    pub fn set_configuration(&mut self, configuration: PlannerConfiguration) {
        self.configuration = configuration;
    }

    #[must_use]
    pub const fn metadata(&self) -> &'m MetadataModel {
        self.metadata
    }

    pub(crate) const fn primary_key_has_record_type_prefix(&self) -> bool {
        self.primary_key_has_record_type_prefix
    }

    /// Create a plan for the results of the given query.
    pub fn plan(&self, query: &RecordQuery) -> Result<RecordQueryPlan, PlannerError> {
        query.validate(self.metadata)?;
        let context = self.plan_context(query)?;
        let normalizer = BooleanNormalizer::for_configuration(&self.configuration);
        let filter = normalizer.normalize_if_possible(query.filter());
        let sort = query.sort();

        let planned = self.plan_with_filter(&context, filter.as_ref(), sort)?;
        let mut plan = match planned {
            Some(plan) => plan,
            None => {
                let Some(sort_key) = sort else {
                    return Err(PlannerError::unexpected(
                        "unexpected failure to plan without a sort",
                    ));
                };
                if self.configuration.allow_in_memory_sort {
                    let unsorted = query.without_sort();
                    let unsorted_context = self.plan_context(&unsorted)?;
                    let inner = self
                        .plan_with_filter(&unsorted_context, filter.as_ref(), None)?
                        .ok_or_else(|| {
                            PlannerError::unexpected("unexpected failure to plan without a sort")
                        })?;
                    RecordQueryPlan::Sort {
                        inner: Box::new(inner),
                        key: sort_key.clone(),
                        reverse: query.is_sort_reverse(),
                    }
                } else if filter.is_none() {
                    return Err(PlannerError::NoIndexForSort {
                        sort: sort_key.to_string(),
                    });
                } else {
                    return Err(PlannerError::UnsatisfiableSort {
                        sort: sort_key.to_string(),
                    });
                }
            }
        };

        if query.required_results().is_some() {
            plan = self.try_convert_to_covering(&context, plan);
        }

        let complexity = plan.complexity();
        if complexity > self.configuration.complexity_threshold {
            return Err(PlannerError::PlanTooComplex {
                complexity,
                threshold: self.configuration.complexity_threshold,
                plan: plan.to_string(),
            });
        }
        Ok(plan)
    }

    /// Plan a grouped-aggregate scan served entirely from the given index's
    /// entries; no plan when the index cannot satisfy the aggregate. An
    /// unknown index name is one more way of not satisfying it.
    pub fn plan_covering_aggregate(
        &self,
        query: &RecordQuery,
        index_name: &str,
    ) -> Result<Option<RecordQueryPlan>, PlannerError> {
        let Some(index) = self.metadata.find_index(index_name) else {
            return Ok(None);
        };
        if self.metadata.record_types_for_index(index).len() != 1 {
            // Partial records need a unique record type.
            return Ok(None);
        }
        let index_expr = index
            .root()
            .grouping_sub_key()
            .unwrap_or(KeyExpression::Empty);
        let mut context = self.plan_context(query)?;
        // Repeated fields are scanned one entry at a time by a grouped
        // aggregate, so fan-out does not count as duplication here.
        context.allow_duplicates = true;
        let rank_comparisons = RankComparisons::new(query.filter(), &context.indexes);
        let candidate = CandidateScan::new(
            &context,
            &rank_comparisons,
            Some(index),
            query.is_sort_reverse(),
        );
        let normalizer = BooleanNormalizer::for_configuration(&self.configuration);
        let filter = normalizer.normalize_if_possible(query.filter());
        let scored = match &filter {
            None => Some(ScoredPlan::new(
                0,
                self.plan_scan(
                    &candidate,
                    IndexScanType::ByGroup,
                    ScanComparisons::empty(),
                    false,
                ),
            )),
            Some(filter) => {
                self.plan_candidate_scan(&candidate, &index_expr, filter, query.sort())?
            }
        };
        let Some(scored) = scored else {
            return Ok(None);
        };
        if !scored.unsatisfied_filters.is_empty() {
            return Ok(None);
        }
        let index_scan = match scored.plan {
            RecordQueryPlan::IndexScan(scan) => scan,
            RecordQueryPlan::TypeFilter { inner, .. } => match *inner {
                RecordQueryPlan::IndexScan(scan) => scan,
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };
        let Some(required) = query.required_results() else {
            return Ok(None);
        };
        let key_fields = index.root().whole_key().normalized_columns();
        let mut required_fields = Vec::new();
        for field in required {
            for column in field.normalized_columns() {
                if !key_fields.contains(&column) {
                    return Ok(None);
                }
                if !required_fields.contains(&column) {
                    required_fields.push(column);
                }
            }
        }
        Ok(Some(RecordQueryPlan::Covering {
            index: IndexScanPlan {
                scan_type: IndexScanType::ByGroup,
                ..index_scan
            },
            required_fields,
        }))
    }

    fn plan_with_filter(
        &self,
        context: &PlanContext<'_>,
        filter: Option<&QueryComponent>,
        sort: Option<&KeyExpression>,
    ) -> Result<Option<RecordQueryPlan>, PlannerError> {
        let mut plan: Option<RecordQueryPlan> = None;
        match filter {
            None => plan = self.plan_no_filter(context, sort)?,
            Some(filter) => {
                if self.configuration.plan_other_attempt_whole_filter
                    && let Some(original_filter) = context.query.filter()
                {
                    let rank_comparisons = RankComparisons::default();
                    for &index in &context.indexes {
                        if !matches!(index.kind(), IndexKind::Text | IndexKind::Other) {
                            continue;
                        }
                        let candidate = CandidateScan::new(
                            context,
                            &rank_comparisons,
                            Some(index),
                            context.query.is_sort_reverse(),
                        );
                        if let Some(whole_plan) =
                            self.plan_other(&candidate, index, original_filter, sort)
                            && whole_plan.unsatisfied_filters.is_empty()
                        {
                            return Ok(Some(whole_plan.plan));
                        }
                    }
                }
                plan = self
                    .plan_filter_entry(context, filter)?
                    .map(|scored| scored.plan);
            }
        }
        let mut plan = match plan {
            Some(plan) => plan,
            None => {
                if sort.is_some() {
                    return Ok(None);
                }
                let rank_comparisons = RankComparisons::default();
                let candidate = CandidateScan::new(context, &rank_comparisons, None, false);
                let mut fallback = self.value_scan(&candidate, ScanComparisons::empty(), false);
                if let Some(filter) = filter {
                    fallback = RecordQueryPlan::Filter {
                        inner: Box::new(fallback),
                        filter: filter.clone(),
                    };
                }
                fallback
            }
        };
        plan = post::push_residual_filters(plan);
        if self.configuration.defer_fetch_after_union_and_intersection {
            plan = post::defer_fetch(self.metadata, context.common_primary_key.as_ref(), plan);
        }
        Ok(Some(plan))
    }

    fn plan_no_filter(
        &self,
        context: &PlanContext<'_>,
        sort: Option<&KeyExpression>,
    ) -> Result<Option<RecordQueryPlan>, PlannerError> {
        let rank_comparisons = RankComparisons::default();
        let mut best_plan: Option<ScoredPlan> = None;
        let mut best_index: Option<&IndexModel> = None;
        match sort {
            None => {
                best_plan = self.plan_no_filter_no_sort(context, &rank_comparisons, None);
            }
            Some(sort_key) => {
                if let Some(primary_key) = &context.common_primary_key {
                    let candidate = CandidateScan::new(
                        context,
                        &rank_comparisons,
                        None,
                        context.query.is_sort_reverse(),
                    );
                    best_plan = self.plan_sort_only(&candidate, primary_key, Some(sort_key));
                }
            }
        }
        for &index in &context.indexes {
            let plan = match sort {
                None => self.plan_no_filter_no_sort(context, &rank_comparisons, Some(index)),
                Some(sort_key) => {
                    let index_key = self
                        .index_key_expression_for_plan(context.common_primary_key.as_ref(), index);
                    let candidate = CandidateScan::new(
                        context,
                        &rank_comparisons,
                        Some(index),
                        context.query.is_sort_reverse(),
                    );
                    self.plan_sort_only(&candidate, &index_key, Some(sort_key))
                }
            };
            if let Some(plan) = plan {
                let better = match &best_plan {
                    None => true,
                    Some(best) => {
                        plan.score > best.score
                            || (plan.score == best.score
                                && self.compare_indexes(context, Some(index), best_index)
                                    == Ordering::Greater)
                    }
                };
                if better {
                    best_plan = Some(plan);
                    best_index = Some(index);
                }
            }
        }
        match best_plan {
            Some(best) => {
                let deduped = self.plan_remove_duplicates(context, best).ok_or_else(|| {
                    PlannerError::unexpected(
                        "a common primary key is required to remove duplicates",
                    )
                })?;
                Ok(Some(deduped.plan))
            }
            None => Ok(None),
        }
    }

    fn plan_no_filter_no_sort(
        &self,
        context: &PlanContext<'_>,
        rank_comparisons: &RankComparisons,
        index: Option<&IndexModel>,
    ) -> Option<ScoredPlan> {
        if let Some(index) = index
            && (!index.kind().plans_as_value() || index.root().creates_duplicates())
        {
            return None;
        }
        let mut comparisons = ScanComparisons::empty();
        if index.is_none()
            && context.query.record_types().len() == 1
            && context
                .common_primary_key
                .as_ref()
                .is_some_and(KeyExpression::has_record_type_prefix)
        {
            // Can scan just the one requested record type.
            comparisons.push_equality(Comparison::RecordType(
                context.query.record_types()[0].clone(),
            ));
        }
        let candidate = CandidateScan::new(context, rank_comparisons, index, false);
        Some(ScoredPlan::new(
            0,
            self.value_scan(&candidate, comparisons, false),
        ))
    }

    fn plan_filter_entry(
        &self,
        context: &PlanContext<'_>,
        filter: &QueryComponent,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        if matches!(filter, QueryComponent::And(_)) {
            let normalized = self.normalize_and_or(filter);
            if matches!(normalized, QueryComponent::Or(_)) {
                // The best the And shape could do is index the first part and
                // filter the Or; a union would be superior when reachable.
                if let Some(as_or) = self.plan_or(context, &normalized)? {
                    return Ok(Some(as_or));
                }
            }
        }
        if matches!(filter, QueryComponent::Or(_))
            && let Some(or_plan) = self.plan_or(context, filter)?
        {
            return Ok(Some(or_plan));
        }
        self.plan_filter_with_in(context, filter, false)
    }

    /// Plan a filter (the whole query's, or one OR branch), extracting IN
    /// comparisons into join sources first. `need_ordering` asks for the
    /// plan's ordering key so the caller can merge sub-plans.
    pub(crate) fn plan_filter_with_in(
        &self,
        context: &PlanContext<'_>,
        filter: &QueryComponent,
        need_ordering: bool,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        let mut extractor = InExtractor::new(filter);
        let mut with_in_as_or_union: Option<ScoredPlan> = None;
        if let Some(sort) = context.query.sort() {
            let saved_extractor = extractor.clone();
            let can_sort = extractor.set_sort(sort, context.query.is_sort_reverse());
            if !can_sort {
                if self.configuration.attempt_failed_in_join_as_union {
                    with_in_as_or_union =
                        self.plan_filter_with_in_union(context, &saved_extractor)?;
                } else if self.configuration.attempt_failed_in_join_as_or {
                    // Cannot implement as an IN-join because of the sort
                    // order; try as an OR instead.
                    let as_or = self.normalize_and_or_for_in_as_or(&extractor.as_or());
                    if *filter != as_or {
                        with_in_as_or_union = self.plan_filter_entry(context, &as_or)?;
                    }
                }
            }
        } else if need_ordering {
            extractor.sort_by_clauses();
        }
        let with_in_join = self.plan_filter_with_in_join(context, &extractor, need_ordering)?;
        if let Some(as_or_union) = with_in_as_or_union {
            let better = match &with_in_join {
                None => true,
                Some(in_join) => {
                    as_or_union.score > in_join.score
                        || as_or_union.plan.field_comparison_count()
                            < in_join.plan.field_comparison_count()
                }
            };
            if better {
                return Ok(Some(as_or_union));
            }
        }
        Ok(with_in_join)
    }

    fn plan_filter_with_in_join(
        &self,
        context: &PlanContext<'_>,
        extractor: &InExtractor,
        need_ordering: bool,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        let rank_comparisons = RankComparisons::new(Some(extractor.sub_filter()), &context.indexes);
        let Some(best_plan) = self.plan_filter_for_in_join(
            context,
            &rank_comparisons,
            extractor.sub_filter(),
            need_ordering,
        )?
        else {
            return Ok(None);
        };
        let wrapped = extractor.wrap(best_plan.plan.clone());
        let mut scored = ScoredPlan::new(best_plan.score, wrapped);
        if need_ordering {
            scored.ordering_key = extractor.adjust_ordering(best_plan.ordering_key);
        }
        Ok(Some(scored))
    }

    fn plan_filter_with_in_union(
        &self,
        context: &PlanContext<'_>,
        extractor: &InExtractor,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        if !extractor.has_clauses() {
            return Ok(None);
        }
        let mut extractor = extractor.clone();
        extractor.sort_for_union(context.query.is_sort_reverse());
        let rank_comparisons = RankComparisons::new(Some(extractor.sub_filter()), &context.indexes);
        let Some(scored) = self.plan_filter_for_in_join(
            context,
            &rank_comparisons,
            extractor.sub_filter(),
            true,
        )?
        else {
            return Ok(None);
        };
        // Each source binds its parameter to a constant, so every branch of
        // the union arrives in the subplan's own order; the merge re-orders
        // across branches on the comparison key.
        let Some(ordering) = scored.ordering_key.clone() else {
            return Ok(None);
        };
        let candidate_key =
            self.key_for_merge(context.query.sort(), context.common_primary_key.as_ref());
        let Some(comparison_key) =
            PlanOrderingKey::merged_comparison_key(&[&ordering], candidate_key.as_ref(), true)
        else {
            return Ok(None);
        };
        let union = RecordQueryPlan::InUnion {
            inner: Box::new(scored.plan.clone()),
            sources: extractor.union_sources(),
            comparison_key,
            reverse: context.query.is_sort_reverse(),
            max_size: self.configuration.attempt_failed_in_union_max_size,
        };
        Ok(Some(ScoredPlan::new(scored.score, union)))
    }

    fn plan_filter_for_in_join(
        &self,
        context: &PlanContext<'_>,
        rank_comparisons: &RankComparisons,
        filter: &QueryComponent,
        need_ordering: bool,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        let mut intersection_candidates: Vec<ScoredPlan> = Vec::new();
        let mut best_plan: Option<ScoredPlan> = None;
        let mut best_index: Option<&IndexModel> = None;
        if let Some(primary_key) = context.common_primary_key.clone() {
            best_plan = self.plan_index(
                context,
                rank_comparisons,
                filter,
                None,
                &primary_key,
                &mut intersection_candidates,
            )?;
        }
        for &index in &context.indexes {
            let index_key =
                self.index_key_expression_for_plan(context.common_primary_key.as_ref(), index);
            if let Some(plan) = self.plan_index(
                context,
                rank_comparisons,
                filter,
                Some(index),
                &index_key,
                &mut intersection_candidates,
            )? && self.is_better_than_other(
                context,
                &plan,
                Some(index),
                best_plan.as_ref(),
                best_index,
            ) {
                best_plan = Some(plan);
                best_index = Some(index);
            }
        }
        let Some(mut best_plan) = best_plan else {
            return Ok(None);
        };
        if best_plan.num_non_sargables() > 0 {
            best_plan = self.handle_non_sargables(
                best_plan,
                intersection_candidates,
                context,
                rank_comparisons,
            )?;
        }
        if need_ordering {
            best_plan.ordering_key = PlanOrderingKey::for_plan(
                self.metadata,
                &best_plan.plan,
                context.common_primary_key.as_ref(),
            );
        }
        Ok(Some(best_plan))
    }

    fn plan_index(
        &self,
        context: &PlanContext<'_>,
        rank_comparisons: &RankComparisons,
        filter: &QueryComponent,
        index: Option<&IndexModel>,
        index_expr: &KeyExpression,
        intersection_candidates: &mut Vec<ScoredPlan>,
    ) -> Result<Option<ScoredPlan>, PlannerError> {
        let sort = context.query.sort();
        let candidate = CandidateScan::new(
            context,
            rank_comparisons,
            index,
            context.query.is_sort_reverse(),
        );
        let mut plan: Option<ScoredPlan> = None;
        let mut effective_expr = index_expr.clone();
        if let Some(index) = index {
            match index.kind() {
                IndexKind::Rank => {
                    plan = self.plan_rank(&candidate, index, index.root(), filter);
                    // Otherwise plan as just a value index over the whole key.
                    effective_expr = index.root().whole_key().clone();
                }
                IndexKind::Text | IndexKind::Other => {
                    let other_plan = self
                        .plan_other(&candidate, index, filter, sort)
                        .and_then(|plan| self.plan_remove_duplicates(context, plan))
                        .map(|plan| self.compute_index_filters(context, plan));
                    if let Some(mut other_plan) = other_plan {
                        if other_plan.num_non_sargables() > 0 && sort.is_some() {
                            let ordering = PlanOrderingKey::for_plan(
                                self.metadata,
                                &other_plan.plan,
                                context.common_primary_key.as_ref(),
                            );
                            if let Some(ordering) = ordering {
                                other_plan.ordering_key = Some(ordering);
                                intersection_candidates.push(other_plan.clone());
                            }
                        }
                        return Ok(Some(other_plan));
                    }
                    return Ok(None);
                }
                IndexKind::Value | IndexKind::Version => {}
            }
        }
        if plan.is_none() {
            plan = self.plan_candidate_scan(&candidate, &effective_expr, filter, sort)?;
        }
        if plan.is_none() {
            // Cannot match the filter; maybe the sort alone.
            plan = self
                .plan_sort_only(&candidate, &effective_expr, sort)
                .map(|sort_plan| {
                    ScoredPlan::with_unsatisfied(
                        0,
                        sort_plan.plan,
                        filter.conjuncts(),
                        sort_plan.creates_duplicates,
                    )
                });
        }
        let Some(plan) = plan else {
            return Ok(None);
        };
        let plan = if self.configuration.optimize_for_index_filters {
            if index.is_none() {
                let combined = plan.combine_non_sargables();
                plan.with_filters(combined, Vec::new())
            } else {
                self.compute_index_filters(context, plan)
            }
        } else {
            plan
        };
        let Some(mut plan) = self.plan_remove_duplicates(context, plan) else {
            return Ok(None);
        };
        if plan.num_non_sargables() > 0 {
            let ordering = PlanOrderingKey::for_plan(
                self.metadata,
                &plan.plan,
                context.common_primary_key.as_ref(),
            );
            // With a sort, all chosen plans are ordered by it and therefore
            // compatible; otherwise primary-key order is required so the
            // intersection's comparison key always works.
            if let Some(ordering) = ordering
                && (sort.is_some() || ordering.is_primary_key_ordered())
            {
                plan.ordering_key = Some(ordering);
                intersection_candidates.push(plan.clone());
            }
        }
        Ok(Some(plan))
    }

    // The key expression index entries are matched against, which includes
    // primary-key columns for ordinary value indexes.
    pub(crate) fn index_key_expression_for_plan(
        &self,
        common_primary_key: Option<&KeyExpression>,
        index: &IndexModel,
    ) -> KeyExpression {
        let root = index.root();
        let base = match root {
            KeyExpression::KeyWithValue { .. } => {
                // Only the indexed prefix participates in matching.
                KeyExpression::concat(root.normalized_columns())
            }
            other => other.clone(),
        };
        if let Some(primary_key) = common_primary_key
            && index.kind().plans_as_value()
            && self.configuration.use_full_key_for_value_index
        {
            let mut keys = primary_key.normalized_columns();
            index.trim_primary_key(&mut keys);
            if !keys.is_empty() {
                keys.insert(0, base);
                return KeyExpression::concat(keys);
            }
        }
        base
    }

    pub(crate) fn plan_remove_duplicates(
        &self,
        context: &PlanContext<'_>,
        plan: ScoredPlan,
    ) -> Option<ScoredPlan> {
        if plan.creates_duplicates && context.query.removes_duplicates() {
            context.common_primary_key.as_ref()?;
            let distinct = RecordQueryPlan::PrimaryKeyDistinct {
                inner: Box::new(plan.plan.clone()),
            };
            Some(ScoredPlan {
                plan: distinct,
                creates_duplicates: false,
                ordering_key: None,
                ..plan
            })
        } else {
            Some(plan)
        }
    }

    fn try_convert_to_covering(
        &self,
        context: &PlanContext<'_>,
        plan: RecordQueryPlan,
    ) -> RecordQueryPlan {
        let Some(required) = context.query.required_results() else {
            return plan;
        };
        let mut required_fields: Vec<KeyExpression> = Vec::new();
        for field in required {
            for column in field.normalized_columns() {
                if !required_fields.contains(&column) {
                    required_fields.push(column);
                }
            }
        }
        match post::remove_index_fetch(
            self.metadata,
            context.common_primary_key.as_ref(),
            plan.clone(),
            &required_fields,
        ) {
            Some(without_fetch) => without_fetch,
            None => plan,
        }
    }

    fn plan_context<'a>(&'a self, query: &'a RecordQuery) -> Result<PlanContext<'a>, PlannerError> {
        let mut indexes: Vec<&IndexModel> = Vec::new();
        let common_primary_key;
        if query.record_types().is_empty() {
            common_primary_key = MetadataModel::common_primary_key(self.metadata.record_types());
        } else {
            let record_types: Vec<&RecordTypeModel> = query
                .record_types()
                .iter()
                .map(|name| self.metadata.record_type(name))
                .collect::<Result<_, _>>()?;
            if let [record_type] = record_types.as_slice() {
                indexes.extend(self.readable_of(self.metadata.indexes_for_type(record_type.name())));
                indexes.extend(
                    self.readable_of(self.metadata.multi_type_indexes_for(record_type.name())),
                );
                common_primary_key = Some(record_type.primary_key().clone());
            } else {
                let mut first = true;
                for record_type in &record_types {
                    let multi =
                        self.readable_of(self.metadata.multi_type_indexes_for(record_type.name()));
                    if first {
                        indexes.extend(multi);
                        first = false;
                    } else {
                        indexes.retain(|index| multi.contains(index));
                    }
                }
                common_primary_key =
                    MetadataModel::common_primary_key(record_types.iter().copied());
            }
        }
        indexes.extend(self.readable_of(self.metadata.universal_indexes()));

        match query.allowed_indexes() {
            Some(allowed) => {
                indexes.retain(|index| allowed.iter().any(|name| name == index.name()));
                if indexes.is_empty() {
                    for name in allowed {
                        let index = self.metadata.index(name)?;
                        if !self.store_state.is_readable(index.name()) {
                            return Err(PlannerError::UnreadableIndex {
                                index: name.clone(),
                            });
                        }
                    }
                }
            }
            None => indexes.retain(|index| index.is_queryable()),
        }

        indexes.sort_by(|a, b| a.name().cmp(b.name()));
        indexes.dedup_by(|a, b| a.name() == b.name());
        Ok(PlanContext {
            query,
            indexes,
            common_primary_key,
            allow_duplicates: false,
        })
    }

    fn readable_of<'i>(
        &self,
        indexes: impl Iterator<Item = &'i IndexModel>,
    ) -> Vec<&'i IndexModel> {
        if self.store_state.all_indexes_readable() {
            indexes.collect()
        } else {
            indexes
                .filter(|index| self.store_state.is_readable(index.name()))
                .collect()
        }
    }
}
