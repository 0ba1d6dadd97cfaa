//! Module: planner::text
//! Responsibility: matching text predicates against text indexes.
//! Does not own: tokenization or text-scan execution; the comparison stays
//! opaque to the rest of the planner.

use crate::{
    expr::KeyExpression,
    model::{IndexKind, IndexModel},
    plan::{IndexScanType, RecordQueryPlan},
    planner::{context::CandidateScan, scored::ScoredPlan, RecordQueryPlanner},
    query::{Comparison, ComparisonKind, QueryComponent, TextMatch},
    scan::ScanComparisons,
};

// Most of the time a full text scan is more selective (and more expensive to
// run as a post-filter) than other indexes.
const TEXT_SCAN_SCORE: usize = 10;

impl RecordQueryPlanner<'_> {
    /// Entry point for non-value, non-rank index kinds. Text indexes get a
    /// bespoke routine; anything else stays unplanned here.
    pub(crate) fn plan_other(
        &self,
        candidate: &CandidateScan<'_>,
        index: &IndexModel,
        filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> Option<ScoredPlan> {
        if index.kind() == IndexKind::Text {
            self.plan_text(candidate, index, filter, sort)
        } else {
            None
        }
    }

    fn plan_text(
        &self,
        candidate: &CandidateScan<'_>,
        index: &IndexModel,
        filter: &QueryComponent,
        sort: Option<&KeyExpression>,
    ) -> Option<ScoredPlan> {
        if sort.is_some() {
            // Sorts are not supported with full-text predicates; a text scan
            // documents no ordering.
            return None;
        }
        let (prefix_columns, text_column) = text_index_columns(index)?;
        let KeyExpression::Field {
            name: text_field, ..
        } = &text_column
        else {
            return None;
        };
        let conjuncts = filter.conjuncts();
        let (text_leaf, text_comparison) = conjuncts.iter().find_map(|component| {
            match component {
                QueryComponent::Field {
                    field,
                    comparison: Comparison::Text(text),
                }
                | QueryComponent::OneOfThem {
                    field,
                    comparison: Comparison::Text(text),
                } if field == text_field => Some((component.clone(), text.clone())),
                _ => None,
            }
        })?;

        // Every grouping column must be pinned by a sibling equality.
        let mut equalities = Vec::new();
        let mut satisfied = vec![text_leaf];
        for column in &prefix_columns {
            let KeyExpression::Field { name, .. } = column else {
                return None;
            };
            let sibling = conjuncts.iter().find(|component| {
                matches!(
                    component,
                    QueryComponent::Field { field, comparison }
                        if field == name && comparison.kind() == ComparisonKind::Equality
                )
            })?;
            let QueryComponent::Field { comparison, .. } = sibling else {
                return None;
            };
            equalities.push(comparison.clone());
            satisfied.push(sibling.clone());
        }

        let comparisons =
            ScanComparisons::opaque(equalities, Comparison::Text(text_comparison.clone()));
        let mut plan = self.plan_scan(candidate, IndexScanType::ByText, comparisons, false);
        let mut unsatisfied: Vec<QueryComponent> = conjuncts
            .iter()
            .filter(|&component| !satisfied.contains(component))
            .cloned()
            .collect();
        // A strict all-prefixes scan can return false positives; keep the
        // whole predicate as a residual guard around it.
        if matches!(
            text_comparison.match_kind(),
            TextMatch::ContainsAllPrefixes { strict: true }
        ) {
            plan = RecordQueryPlan::Filter {
                inner: Box::new(plan),
                filter: filter.clone(),
            };
            unsatisfied = Vec::new();
        }
        Some(ScoredPlan::with_unsatisfied(
            TEXT_SCAN_SCORE,
            plan,
            unsatisfied,
            text_comparison.creates_duplicates(),
        ))
    }
}

// Grouping prefix columns and the tokenized column of a text index.
fn text_index_columns(index: &IndexModel) -> Option<(Vec<KeyExpression>, KeyExpression)> {
    match index.root() {
        KeyExpression::Grouping {
            whole,
            grouped_count,
        } => {
            let columns = whole.normalized_columns();
            let text = columns.get(*grouped_count)?.clone();
            Some((columns[..*grouped_count].to_vec(), text))
        }
        root => {
            let columns = root.normalized_columns();
            let text = columns.first()?.clone();
            Some((Vec::new(), text))
        }
    }
}
