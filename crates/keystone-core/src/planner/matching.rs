//! Module: planner::matching
//! Responsibility: matching one filter against one candidate scan.
//! Does not own: candidate selection or plan combination.
//! Boundary: returns a `ScoredPlan` per candidate, or nothing on mismatch.

use crate::{
    error::PlannerError,
    expr::{FanType, KeyExpression},
    plan::{IndexScanPlan, IndexScanType, RecordQueryPlan, RecordScanPlan},
    planner::{context::CandidateScan, scored::ScoredPlan, RecordQueryPlanner},
    query::{Comparison, ComparisonKind, QueryComponent, QueryFunction},
    scan::ScanComparisons,
};
use std::collections::VecDeque;

pub(crate) type MatchResult = Result<Option<ScoredPlan>, PlannerError>;

// Remove the first component equal to `target`.
pub(crate) fn remove_component(list: &mut Vec<QueryComponent>, target: &QueryComponent) {
    if let Some(position) = list.iter().position(|component| component == target) {
        list.remove(position);
    }
}

impl RecordQueryPlanner<'_> {
    /// Match one filter shape against one candidate's key expression.
    pub(crate) fn plan_candidate_scan(
        &self,
        candidate: &CandidateScan<'_>,
        index_expr: &KeyExpression,
        filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> MatchResult {
        match filter {
            QueryComponent::Field { field, comparison } => {
                self.plan_field_with_comparison(candidate, index_expr, field, comparison, sort, true)
            }
            QueryComponent::OneOfThem { field, comparison } => self
                .plan_one_of_them_with_comparison(
                    candidate, index_expr, field, comparison, filter, sort,
                ),
            QueryComponent::And(_) => self.plan_and(candidate, index_expr, filter, sort),
            QueryComponent::Nested { .. } => {
                self.plan_nested_field(candidate, index_expr, filter, sort)
            }
            QueryComponent::OneOfThemComponent { field, child } => self
                .plan_one_of_them_with_component(
                    candidate, index_expr, field, child, filter, sort,
                ),
            QueryComponent::RecordFunction {
                function: QueryFunction::Version,
                comparison,
            } => self.plan_version(candidate, index_expr, comparison, filter, sort),
            QueryComponent::RecordTypeKey { comparison } => {
                self.plan_record_type_key(candidate, index_expr, comparison, filter, sort)
            }
            QueryComponent::KeyExpressionComparison { key, comparison } => self
                .plan_key_expression_with_comparison(
                    candidate, index_expr, key, comparison, filter, sort,
                ),
            _ => Ok(None),
        }
    }

    fn plan_field_with_comparison(
        &self,
        candidate: &CandidateScan<'_>,
        index_expr: &KeyExpression,
        field_name: &str,
        comparison: &Comparison,
        sort: Option<&KeyExpression>,
        full_key: bool,
    ) -> MatchResult {
        let Some(scan_comparisons) = ScanComparisons::from_comparison(comparison) else {
            // Not accomplishable with a single scan; sort-only handling
            // happens elsewhere in the planner.
            return Ok(None);
        };
        match index_expr {
            KeyExpression::Field {
                name,
                fan: FanType::None,
            } if name == field_name => match sort {
                None => Ok(Some(ScoredPlan::new(
                    1,
                    self.value_scan(candidate, scan_comparisons, false),
                ))),
                Some(KeyExpression::Field {
                    name: sort_name,
                    fan: FanType::None,
                }) if sort_name == field_name => {
                    // An inequality ranges over the whole sort column, so the
                    // scan's arrival order is total on it.
                    let strictly_sorted = full_key || !scan_comparisons.is_equality();
                    Ok(Some(ScoredPlan::new(
                        1,
                        self.value_scan(candidate, scan_comparisons, strictly_sorted),
                    )))
                }
                Some(_) => Ok(None),
            },
            KeyExpression::Then(children) => {
                let first = children.first();
                let sort_is_first = sort.is_none() || sort == first;
                if sort_is_first
                    && !index_expr.creates_duplicates()
                    && !matches!(first, Some(KeyExpression::RecordTypeKey))
                    && !candidate.index.is_some_and(crate::model::IndexModel::is_unique)
                {
                    // First column will do it all or not.
                    let Some(first) = first else { return Ok(None) };
                    self.plan_field_with_comparison(
                        candidate, first, field_name, comparison, sort, false,
                    )
                } else {
                    // May need a later column for the sort; handled like And.
                    AndWithThenPlanner::new(
                        self,
                        *candidate,
                        Some(index_expr.clone()),
                        children.clone(),
                        vec![QueryComponent::field_cmp(field_name, comparison.clone())],
                        sort,
                    )
                    .plan()
                }
            }
            _ => Ok(None),
        }
    }

    fn plan_one_of_them_with_comparison(
        &self,
        candidate: &CandidateScan<'_>,
        index_expr: &KeyExpression,
        field_name: &str,
        comparison: &Comparison,
        whole_filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> MatchResult {
        let Some(scan_comparisons) = ScanComparisons::from_comparison(comparison) else {
            let sort_only = self.plan_sort_only(candidate, index_expr, sort);
            return Ok(sort_only.map(|plan| {
                ScoredPlan::with_unsatisfied(
                    0,
                    plan.plan,
                    vec![whole_filter.clone()],
                    plan.creates_duplicates,
                )
            }));
        };
        match index_expr {
            KeyExpression::Field {
                name,
                fan: FanType::FanOut,
            } if name == field_name => match sort {
                None => Ok(Some(ScoredPlan::with_unsatisfied(
                    1,
                    self.value_scan(candidate, scan_comparisons, false),
                    Vec::new(),
                    true,
                ))),
                Some(KeyExpression::Field {
                    name: sort_name, ..
                }) if sort_name == field_name => Ok(Some(ScoredPlan::with_unsatisfied(
                    1,
                    self.value_scan(candidate, scan_comparisons, true),
                    Vec::new(),
                    true,
                ))),
                Some(_) => Ok(None),
            },
            KeyExpression::Then(children) => AndWithThenPlanner::new(
                self,
                *candidate,
                Some(index_expr.clone()),
                children.clone(),
                vec![whole_filter.clone()],
                sort,
            )
            .plan(),
            _ => Ok(None),
        }
    }

    fn plan_and(
        &self,
        candidate: &CandidateScan<'_>,
        index_expr: &KeyExpression,
        filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> MatchResult {
        match index_expr {
            KeyExpression::Nesting { .. } => {
                self.plan_and_with_nesting(candidate, index_expr, filter, sort)
            }
            KeyExpression::Then(children) => AndWithThenPlanner::new(
                self,
                *candidate,
                Some(index_expr.clone()),
                children.clone(),
                filter.conjuncts(),
                sort,
            )
            .plan(),
            single => AndWithThenPlanner::new(
                self,
                *candidate,
                None,
                vec![single.clone()],
                filter.conjuncts(),
                sort,
            )
            .plan(),
        }
    }

    // When several AND children descend into the same non-repeated parent,
    // gather them so more than one leaf can bind to nested columns.
    fn plan_and_with_nesting(
        &self,
        candidate: &CandidateScan<'_>,
        index_expr: &KeyExpression,
        filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> MatchResult {
        let KeyExpression::Nesting {
            parent, parent_fan, ..
        } = index_expr
        else {
            return Ok(None);
        };
        let children = filter.conjuncts();
        if *parent_fan == FanType::None {
            let mut nested_children = Vec::new();
            let mut remaining = Vec::new();
            for filter_child in &children {
                if let QueryComponent::Nested { field, child } = filter_child
                    && field == parent
                {
                    nested_children.push((**child).clone());
                    continue;
                }
                remaining.push(filter_child.clone());
            }
            if nested_children.len() > 1 {
                let nested_and =
                    QueryComponent::nested(parent.clone(), QueryComponent::and(nested_children));
                let plan = self.plan_nested_field(candidate, index_expr, &nested_and, sort)?;
                return Ok(plan.map(|plan| {
                    if remaining.is_empty() {
                        plan
                    } else {
                        plan.with_unsatisfied_filters(remaining)
                    }
                }));
            }
        }
        for filter_child in &children {
            if matches!(filter_child, QueryComponent::Nested { .. }) {
                let plan = self.plan_nested_field(candidate, index_expr, filter_child, sort)?;
                if let Some(plan) = plan {
                    let mut unsatisfied = children.clone();
                    remove_component(&mut unsatisfied, filter_child);
                    return Ok(Some(plan.with_unsatisfied_filters(unsatisfied)));
                }
            }
        }
        Ok(None)
    }

    pub(crate) fn plan_nested_field(
        &self,
        candidate: &CandidateScan<'_>,
        index_expr: &KeyExpression,
        filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> MatchResult {
        match index_expr {
            KeyExpression::Then(_) => {
                self.plan_then_nested_field(candidate, index_expr, filter, sort)
            }
            KeyExpression::Nesting { .. } => {
                self.plan_nesting_nested_field(candidate, index_expr, filter, sort)
            }
            _ => Ok(None),
        }
    }

    fn plan_then_nested_field(
        &self,
        candidate: &CandidateScan<'_>,
        then_expr: &KeyExpression,
        filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> MatchResult {
        let KeyExpression::Then(children) = then_expr else {
            return Ok(None);
        };
        if matches!(sort, Some(KeyExpression::Then(_))) || then_expr.creates_duplicates() {
            // Too complicated for the simple checks below.
            return AndWithThenPlanner::new(
                self,
                *candidate,
                Some(then_expr.clone()),
                children.clone(),
                vec![filter.clone()],
                sort,
            )
            .plan();
        }
        let Some(first) = children.first() else {
            return Ok(None);
        };
        let mut plan = self.plan_nested_field(candidate, first, filter, sort)?;
        if plan.is_none()
            && let Some(sort_key) = sort
            && children.get(1) == Some(sort_key)
        {
            let sortless = self.plan_nested_field(candidate, first, filter, None)?;
            if let Some(ref sortless_plan) = sortless
                && self
                    .plan_comparisons_of(&sortless_plan.plan)
                    .is_some_and(ScanComparisons::is_equality)
            {
                // A scan for an equality filter is sorted by the next index key.
                plan = sortless;
            }
        }
        Ok(plan)
    }

    fn plan_nesting_nested_field(
        &self,
        candidate: &CandidateScan<'_>,
        nesting: &KeyExpression,
        filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> MatchResult {
        let (KeyExpression::Nesting {
            parent, child: child_key, ..
        }, QueryComponent::Nested {
            field,
            child: child_filter,
        }) = (nesting, filter)
        else {
            return Ok(None);
        };
        if parent != field {
            return Ok(None);
        }
        let child_plan = match sort {
            None => self.plan_candidate_scan(candidate, child_key, child_filter, None)?,
            Some(KeyExpression::Nesting {
                parent: sort_parent,
                child: sort_child,
                ..
            }) if sort_parent == parent => {
                self.plan_candidate_scan(candidate, child_key, child_filter, Some(sort_child))?
            }
            Some(_) => None,
        };
        match child_plan {
            Some(plan) if !plan.unsatisfied_filters.is_empty() => {
                // The whole nesting is unsatisfied when its child is.
                let unsatisfied_child = if plan.unsatisfied_filters.len() > 1 {
                    QueryComponent::and(plan.unsatisfied_filters.clone())
                } else {
                    plan.unsatisfied_filters[0].clone()
                };
                let wrapped = QueryComponent::nested(field.clone(), unsatisfied_child);
                Ok(Some(plan.with_unsatisfied_filters(vec![wrapped])))
            }
            other => Ok(other),
        }
    }

    fn plan_one_of_them_with_component(
        &self,
        candidate: &CandidateScan<'_>,
        index_expr: &KeyExpression,
        field_name: &str,
        child_filter: &QueryComponent,
        whole_filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> MatchResult {
        match index_expr {
            KeyExpression::Then(children) => {
                let Some(first) = children.first() else {
                    return Ok(None);
                };
                self.plan_one_of_them_with_component(
                    candidate,
                    first,
                    field_name,
                    child_filter,
                    whole_filter,
                    sort,
                )
            }
            KeyExpression::Nesting {
                parent, child: child_key, ..
            } => {
                let plan = match sort {
                    None if parent == field_name => {
                        self.plan_candidate_scan(candidate, child_key, child_filter, None)?
                    }
                    Some(KeyExpression::Nesting {
                        parent: sort_parent,
                        child: sort_child,
                        ..
                    }) if sort_parent == parent && parent == field_name => {
                        self.plan_candidate_scan(candidate, child_key, child_filter, Some(sort_child))?
                    }
                    _ => None,
                };
                Ok(plan.map(|plan| {
                    // The whole quantifier stays unsatisfied when any of its
                    // child filters does.
                    let unsatisfied = if plan.unsatisfied_filters.is_empty() {
                        Vec::new()
                    } else {
                        vec![whole_filter.clone()]
                    };
                    ScoredPlan::with_unsatisfied(plan.score, plan.plan, unsatisfied, true)
                }))
            }
            _ => Ok(None),
        }
    }

    fn plan_version(
        &self,
        candidate: &CandidateScan<'_>,
        index_expr: &KeyExpression,
        comparison: &Comparison,
        whole_filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> MatchResult {
        match index_expr {
            KeyExpression::Version => {
                let Some(scan_comparisons) = ScanComparisons::from_comparison(comparison) else {
                    return Ok(None);
                };
                if sort.is_none() || sort == Some(&KeyExpression::Version) {
                    Ok(Some(ScoredPlan::new(
                        1,
                        self.value_scan(candidate, scan_comparisons, false),
                    )))
                } else {
                    Ok(None)
                }
            }
            KeyExpression::Then(children) => {
                let Some(first) = children.first() else {
                    return Ok(None);
                };
                if sort.is_none() {
                    self.plan_version(candidate, first, comparison, whole_filter, None)
                } else {
                    AndWithThenPlanner::new(
                        self,
                        *candidate,
                        Some(index_expr.clone()),
                        children.clone(),
                        vec![whole_filter.clone()],
                        sort,
                    )
                    .plan()
                }
            }
            _ => Ok(None),
        }
    }

    fn plan_record_type_key(
        &self,
        candidate: &CandidateScan<'_>,
        index_expr: &KeyExpression,
        comparison: &Comparison,
        whole_filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> MatchResult {
        match index_expr {
            KeyExpression::RecordTypeKey => {
                let Some(scan_comparisons) = ScanComparisons::from_comparison(comparison) else {
                    return Ok(None);
                };
                if sort.is_none() {
                    Ok(Some(ScoredPlan::new(
                        1,
                        self.value_scan(candidate, scan_comparisons, false),
                    )))
                } else {
                    Ok(None)
                }
            }
            KeyExpression::Then(children) => AndWithThenPlanner::new(
                self,
                *candidate,
                Some(index_expr.clone()),
                children.clone(),
                vec![whole_filter.clone()],
                sort,
            )
            .plan(),
            _ => Ok(None),
        }
    }

    fn plan_key_expression_with_comparison(
        &self,
        candidate: &CandidateScan<'_>,
        index_expr: &KeyExpression,
        key: &KeyExpression,
        comparison: &Comparison,
        whole_filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> MatchResult {
        if index_expr == key && (sort.is_none() || sort == Some(index_expr)) {
            let Some(scan_comparisons) = ScanComparisons::from_comparison(comparison) else {
                return Ok(None);
            };
            let strictly_sorted = sort.is_some(); // must be equal
            return Ok(Some(ScoredPlan::new(
                1,
                self.value_scan(candidate, scan_comparisons, strictly_sorted),
            )));
        }
        if let KeyExpression::Then(children) = index_expr {
            return AndWithThenPlanner::new(
                self,
                *candidate,
                Some(index_expr.clone()),
                children.clone(),
                vec![whole_filter.clone()],
                sort,
            )
            .plan();
        }
        Ok(None)
    }

    /// No filter matched; the sort alone may still justify this candidate.
    pub(crate) fn plan_sort_only(
        &self,
        candidate: &CandidateScan<'_>,
        index_expr: &KeyExpression,
        sort: Option<&KeyExpression>,
    ) -> Option<ScoredPlan> {
        let sort = sort?;
        if !sort.is_prefix_key(index_expr) {
            return None;
        }
        let strictly_sorted = sort == index_expr
            || candidate.index.is_some_and(|index| {
                index.is_unique() && sort.column_size() >= index.column_size()
            });
        Some(ScoredPlan::with_unsatisfied(
            0,
            self.value_scan(candidate, ScanComparisons::empty(), strictly_sorted),
            Vec::new(),
            index_expr.creates_duplicates(),
        ))
    }

    pub(crate) fn plan_comparisons_of<'p>(
        &self,
        plan: &'p RecordQueryPlan,
    ) -> Option<&'p ScanComparisons> {
        match plan {
            RecordQueryPlan::IndexScan(scan) => Some(&scan.comparisons),
            RecordQueryPlan::Scan(scan) => Some(&scan.comparisons),
            RecordQueryPlan::TypeFilter { inner, .. } => self.plan_comparisons_of(inner),
            _ => None,
        }
    }

    pub(crate) fn get_possible_types(&self, index: &crate::model::IndexModel) -> Vec<String> {
        self.metadata().record_types_for_index(index)
    }

    pub(crate) fn add_type_filter_if_needed(
        &self,
        candidate: &CandidateScan<'_>,
        plan: RecordQueryPlan,
        possible_types: &[String],
    ) -> RecordQueryPlan {
        let allowed = candidate.context.query.record_types();
        if !allowed.is_empty()
            && !possible_types
                .iter()
                .all(|possible| allowed.contains(possible))
        {
            RecordQueryPlan::TypeFilter {
                inner: Box::new(plan),
                record_types: allowed.to_vec(),
            }
        } else {
            plan
        }
    }

    pub(crate) fn plan_scan(
        &self,
        candidate: &CandidateScan<'_>,
        scan_type: IndexScanType,
        comparisons: ScanComparisons,
        strictly_sorted: bool,
    ) -> RecordQueryPlan {
        let (plan, possible_types) = match candidate.index {
            None => {
                let possible_types = if self.primary_key_has_record_type_prefix()
                    && let Some(record_type) = comparisons.record_type_comparison()
                {
                    vec![record_type.to_string()]
                } else {
                    self.metadata().record_type_names()
                };
                (
                    RecordQueryPlan::Scan(RecordScanPlan {
                        comparisons,
                        reverse: candidate.reverse,
                        strictly_sorted,
                        possible_types: possible_types.clone(),
                    }),
                    possible_types,
                )
            }
            Some(index) => {
                let possible_types = self.get_possible_types(index);
                (
                    RecordQueryPlan::IndexScan(IndexScanPlan {
                        index_name: index.name().to_string(),
                        scan_type,
                        comparisons,
                        reverse: candidate.reverse,
                        strictly_sorted,
                        possible_types: possible_types.clone(),
                    }),
                    possible_types,
                )
            }
        };
        self.add_type_filter_if_needed(candidate, plan, &possible_types)
    }

    pub(crate) fn value_scan(
        &self,
        candidate: &CandidateScan<'_>,
        comparisons: ScanComparisons,
        strictly_sorted: bool,
    ) -> RecordQueryPlan {
        self.plan_scan(candidate, IndexScanType::ByValue, comparisons, strictly_sorted)
    }
}

///
/// AndWithThenPlanner
///
/// Mini-planner for AND filters over compound (`Then`) index keys: matches
/// comparisons to index columns left to right, combines them into a single
/// scan, and validates that the requested sort is consumed along the way.
///
/// Also covers the degenerate shapes (single filter over a compound index,
/// many filters over a single-column index), which share the same logic.
///
/// State lives for one matching attempt and is reset between candidates.
///

pub(crate) struct AndWithThenPlanner<'a, 'm> {
    planner: &'a RecordQueryPlanner<'m>,
    candidate: CandidateScan<'a>,
    /// The compound root, when the index key really is a `Then`.
    index_expr: Option<KeyExpression>,
    index_children: Vec<KeyExpression>,
    filters: Vec<QueryComponent>,
    sort: Option<&'a KeyExpression>,
    /// Filters not yet satisfied by a matched comparison.
    unsatisfied: Vec<QueryComponent>,
    /// Remaining sort columns; the front is the current one.
    sort_queue: VecDeque<KeyExpression>,
    current_sort: Option<KeyExpression>,
    /// The current index column has an equality comparison in the filter.
    found_comparison: bool,
    /// That comparison completely accounted for the column.
    found_complete_comparison: bool,
    comparisons: ScanComparisons,
}

impl<'a, 'm> AndWithThenPlanner<'a, 'm> {
    pub(crate) fn new(
        planner: &'a RecordQueryPlanner<'m>,
        candidate: CandidateScan<'a>,
        index_expr: Option<KeyExpression>,
        index_children: Vec<KeyExpression>,
        filters: Vec<QueryComponent>,
        sort: Option<&'a KeyExpression>,
    ) -> Self {
        Self {
            planner,
            candidate,
            index_expr,
            index_children,
            filters,
            sort,
            unsatisfied: Vec::new(),
            sort_queue: VecDeque::new(),
            current_sort: None,
            found_comparison: false,
            found_complete_comparison: false,
            comparisons: ScanComparisons::empty(),
        }
    }

    pub(crate) fn plan(mut self) -> MatchResult {
        self.setup_plan_state();
        let mut done_comparing = false;
        let mut strictly_sorted = true;
        let mut sort_closed_by_inequality = false;
        let mut child_columns = 0;
        let children = self.index_children.clone();
        for child in &children {
            if !done_comparing {
                self.plan_child(child)?;
                if !self.comparisons.is_equality() || !self.found_complete_comparison {
                    // Didn't add another equality, or only covered part of the
                    // child; done matching filters to index columns.
                    done_comparing = true;
                }
            }
            if done_comparing {
                if self.current_sort.is_none() {
                    // More index children than sorts, except for a unique
                    // index already sorted up far enough, or a terminating
                    // inequality that ranged over the final sort column.
                    let unique_covered = self.candidate.index.is_some_and(|index| {
                        index.is_unique() && child_columns >= index.column_size()
                    });
                    if !unique_covered && !sort_closed_by_inequality {
                        strictly_sorted = false;
                    }
                    break;
                }
                // With inequalities or no filters, index ordering must match
                // the sort ordering.
                if self.current_sort_matches(child) {
                    self.advance_current_sort();
                    sort_closed_by_inequality =
                        !self.comparisons.is_equality() && self.current_sort.is_none();
                } else {
                    break;
                }
            }
            child_columns += child.column_size();
        }
        if self.current_sort.is_some() {
            return Ok(None);
        }
        if self.comparisons.is_empty() {
            return Ok(None);
        }
        let mut creates_duplicates = false;
        if let Some(index) = self.candidate.index {
            if !self.candidate.context.allow_duplicates {
                creates_duplicates = index.root().creates_duplicates();
            }
            if creates_duplicates
                && let Some(index_expr) = &self.index_expr
                && index_expr.creates_duplicates_after(self.comparisons.size())
            {
                // Unconstrained fan-out columns after the sarged prefix may be
                // empty, leaving matching records absent from the index.
                return Ok(None);
            }
        }
        let plan = self
            .planner
            .value_scan(&self.candidate, self.comparisons.clone(), strictly_sorted);
        Ok(Some(ScoredPlan::with_unsatisfied(
            self.comparisons.total_size(),
            plan,
            self.unsatisfied.clone(),
            creates_duplicates,
        )))
    }

    fn setup_plan_state(&mut self) {
        self.unsatisfied = self.filters.clone();
        self.comparisons = ScanComparisons::empty();
        self.sort_queue.clear();
        let sort_key = self.sort.map(KeyExpression::whole_key);
        match sort_key {
            Some(KeyExpression::Then(children)) => {
                self.sort_queue = children.iter().cloned().collect();
                self.current_sort = self.sort_queue.pop_front();
            }
            other => {
                self.current_sort = other.cloned();
            }
        }
    }

    fn plan_child(&mut self, child: &KeyExpression) -> Result<(), PlannerError> {
        self.found_complete_comparison = false;
        self.found_comparison = false;
        if matches!(child, KeyExpression::RecordTypeKey) {
            let record_types = self.candidate.context.query.record_types();
            if record_types.len() == 1 {
                // Can scan just the one requested record type.
                let comparison = Comparison::RecordType(record_types[0].clone());
                self.add_to_comparisons(&comparison);
                self.found_complete_comparison = true;
            }
            return Ok(());
        }
        // A nested Then can match multiple filters at once when they share
        // the same non-repeated parent. Cf. plan_and_with_nesting.
        if let KeyExpression::Nesting {
            parent,
            parent_fan: FanType::None,
            ..
        } = child
            && self.filters.len() > 1
            && child.column_size() > 1
        {
            let mut nested_filters = Vec::new();
            let mut nested_children = Vec::new();
            for filter_child in &self.filters {
                if let QueryComponent::Nested { field, child: nested } = filter_child
                    && field == parent
                {
                    nested_filters.push(filter_child.clone());
                    nested_children.push((**nested).clone());
                }
            }
            if nested_filters.len() > 1 {
                let nested_and =
                    QueryComponent::nested(parent.clone(), QueryComponent::and(nested_children));
                let saved_unsatisfied = self.unsatisfied.clone();
                self.unsatisfied
                    .retain(|component| !nested_filters.contains(component));
                self.unsatisfied.push(nested_and.clone());
                if self.plan_nested_field_child(child, &nested_and, &nested_and)? {
                    return Ok(());
                }
                self.unsatisfied = saved_unsatisfied;
            }
        }
        let filters = self.filters.clone();
        for filter_child in &filters {
            match filter_child {
                QueryComponent::Field { field, comparison } => {
                    self.plan_field_comparison_child(child, field, comparison, filter_child);
                }
                QueryComponent::Nested { .. } => {
                    self.plan_nested_field_child(child, filter_child, filter_child)?;
                }
                QueryComponent::OneOfThem { field, comparison } => {
                    self.plan_one_of_them_child(child, field, comparison, filter_child);
                }
                QueryComponent::RecordFunction {
                    function: QueryFunction::Version,
                    comparison,
                } => {
                    self.plan_version_child(child, comparison, filter_child);
                }
                QueryComponent::RecordTypeKey { comparison } => {
                    self.plan_record_type_child(child, comparison, filter_child);
                }
                QueryComponent::KeyExpressionComparison { key, comparison } => {
                    self.plan_key_expression_child(child, key, comparison, filter_child);
                }
                _ => {}
            }
            if self.found_comparison {
                break;
            }
        }
        Ok(())
    }

    fn plan_nested_field_child(
        &mut self,
        child: &KeyExpression,
        filter_field: &QueryComponent,
        filter_child: &QueryComponent,
    ) -> Result<bool, PlannerError> {
        let mut scored = self
            .planner
            .plan_nested_field(&self.candidate, child, filter_field, None)?;
        let next_comparisons = scored
            .as_ref()
            .and_then(|plan| self.planner.plan_comparisons_of(&plan.plan))
            .cloned();
        let Some(next_comparisons) = next_comparisons else {
            return Ok(false);
        };
        if !self.comparisons.is_equality() && next_comparisons.equality_size() > 0 {
            return Err(PlannerError::invalid_expression(
                "two nested fields in the same AND clause; combine them into one",
            ));
        }
        if next_comparisons.is_equality() {
            // Equality comparisons might match the required sort.
            if self.current_sort_matches(child) {
                self.advance_current_sort();
            }
        } else if self.current_sort.is_some() {
            // Didn't plan to equality; need to retry with the sort in place.
            let sort = self.current_sort.clone();
            scored = self
                .planner
                .plan_nested_field(&self.candidate, child, filter_field, sort.as_ref())?;
            if scored.is_some() {
                self.advance_current_sort();
            }
        }
        if let Some(sub_plan) = scored {
            remove_component(&mut self.unsatisfied, filter_child);
            self.unsatisfied
                .extend(sub_plan.unsatisfied_filters.iter().cloned());
            self.comparisons.try_append(&next_comparisons);
            if next_comparisons.is_equality() {
                self.found_comparison = true;
                self.found_complete_comparison =
                    next_comparisons.equality_size() == child.column_size();
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn plan_field_comparison_child(
        &mut self,
        child: &KeyExpression,
        field_name: &str,
        comparison: &Comparison,
        filter_child: &QueryComponent,
    ) {
        if let KeyExpression::Field {
            name,
            fan: FanType::None,
        } = child
            && name == field_name
            && self.add_to_comparisons(comparison)
        {
            self.added_comparison(child, filter_child);
        }
    }

    fn plan_one_of_them_child(
        &mut self,
        child: &KeyExpression,
        field_name: &str,
        comparison: &Comparison,
        filter_child: &QueryComponent,
    ) {
        if let KeyExpression::Field {
            name,
            fan: FanType::FanOut,
        } = child
            && name == field_name
            && self.add_to_comparisons(comparison)
        {
            self.added_comparison(child, filter_child);
        }
    }

    fn plan_version_child(
        &mut self,
        child: &KeyExpression,
        comparison: &Comparison,
        filter_child: &QueryComponent,
    ) {
        if matches!(child, KeyExpression::Version) && self.add_to_comparisons(comparison) {
            self.added_comparison(child, filter_child);
        }
    }

    fn plan_record_type_child(
        &mut self,
        child: &KeyExpression,
        comparison: &Comparison,
        filter_child: &QueryComponent,
    ) {
        if matches!(child, KeyExpression::RecordTypeKey) && self.add_to_comparisons(comparison) {
            self.added_comparison(child, filter_child);
        }
    }

    fn plan_key_expression_child(
        &mut self,
        child: &KeyExpression,
        key: &KeyExpression,
        comparison: &Comparison,
        filter_child: &QueryComponent,
    ) {
        if child == key && self.add_to_comparisons(comparison) {
            self.added_comparison(child, filter_child);
        }
    }

    fn add_to_comparisons(&mut self, comparison: &Comparison) -> bool {
        match comparison.kind() {
            ComparisonKind::Equality => {
                if self.comparisons.is_equality() {
                    self.comparisons.push_equality(comparison.clone());
                    self.found_comparison = true;
                    true
                } else {
                    false
                }
            }
            ComparisonKind::Inequality => {
                self.comparisons.push_inequality(comparison.clone());
                true
            }
            ComparisonKind::Other => false,
        }
    }

    fn added_comparison(&mut self, child: &KeyExpression, filter_child: &QueryComponent) {
        remove_component(&mut self.unsatisfied, filter_child);
        if self.found_comparison {
            self.found_complete_comparison = true;
            if self.current_sort_matches(child) {
                self.advance_current_sort();
            }
        }
    }

    fn current_sort_matches(&self, child: &KeyExpression) -> bool {
        self.current_sort.as_ref() == Some(child)
    }

    fn advance_current_sort(&mut self) {
        self.current_sort = self.sort_queue.pop_front();
    }
}
