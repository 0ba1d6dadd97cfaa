//! Module: planner::in_extract
//! Responsibility: rewriting equality-with-list predicates into parameterized
//! scans driven by outer value lists (IN-join / IN-union).
//! Does not own: the matching of the rewritten sub-filter.

use crate::{
    expr::{FanType, KeyExpression},
    plan::{InSource, PlanOrderingKey, RecordQueryPlan},
    query::{Comparison, ComparisonKind, QueryComponent},
    value::Value,
};

///
/// InClause
/// One extracted IN predicate: where it sat, what it binds, and whether its
/// values iterate in sorted order.
///

#[derive(Clone, Debug)]
struct InClause {
    binding: String,
    /// Nesting path from the root down to the leaf's parent.
    path: Vec<String>,
    field: String,
    one_of: bool,
    values: Vec<Value>,
    sort_values: bool,
    sort_reverse: bool,
}

impl InClause {
    /// The key column an equality on this clause's field binds.
    fn bound_column(&self) -> KeyExpression {
        let fan = if self.one_of {
            FanType::FanOut
        } else {
            FanType::None
        };
        let mut column = KeyExpression::field_fan(self.field.clone(), fan);
        for parent in self.path.iter().rev() {
            column = KeyExpression::nest(parent.clone(), column);
        }
        column
    }
}

///
/// InExtractor
///
/// Pulls `field IN list` leaves out of an AND-shaped filter, replacing each
/// with an equality against an outer-bound parameter. The extracted clauses
/// become IN-join wrappers (or IN-union sources) around the planned
/// sub-filter.
///

#[derive(Clone, Debug)]
pub(crate) struct InExtractor {
    clauses: Vec<InClause>,
    sub_filter: QueryComponent,
    original: QueryComponent,
}

impl InExtractor {
    pub(crate) fn new(filter: &QueryComponent) -> Self {
        let mut clauses = Vec::new();
        let mut path = Vec::new();
        let sub_filter = extract(filter, &mut path, &mut clauses);
        Self {
            clauses,
            sub_filter,
            original: filter.clone(),
        }
    }

    pub(crate) fn sub_filter(&self) -> &QueryComponent {
        &self.sub_filter
    }

    pub(crate) fn has_clauses(&self) -> bool {
        !self.clauses.is_empty()
    }

    /// Arrange the extracted clauses so that outer iteration order,
    /// concatenated with the subplan's ordering, matches the requested sort.
    ///
    /// Walking the sort columns in order, each must be bound by the next
    /// arranged clause, pinned by an equality in the filter (a constant
    /// contributes nothing to the order), or — once every multi-valued
    /// clause is arranged — satisfied by the subplan itself. Single-valued
    /// clauses are constants and never constrain the arrangement. Returns
    /// false when no arrangement works.
    pub(crate) fn set_sort(&mut self, sort: &KeyExpression, reverse: bool) -> bool {
        let sort_columns = sort.normalized_columns();
        let mut arranged: Vec<InClause> = Vec::new();
        let mut remaining: Vec<InClause> = self.clauses.clone();
        for column in &sort_columns {
            if !remaining.iter().any(|clause| clause.values.len() > 1) {
                break;
            }
            if let Some(position) = remaining
                .iter()
                .position(|clause| clause.bound_column() == *column)
            {
                let mut clause = remaining.remove(position);
                clause.sort_values = true;
                clause.sort_reverse = reverse;
                arranged.push(clause);
            } else if !filter_binds_column(&self.sub_filter, column) {
                // A sort column that is neither an IN clause nor a constant
                // interleaves across outer iterations; no arrangement fixes
                // that while multi-valued clauses remain. Cancel extraction
                // so the INs stay in place as residual predicates.
                self.clauses.clear();
                self.sub_filter = self.original.clone();
                return false;
            }
        }
        arranged.extend(remaining);
        self.clauses = arranged;
        true
    }

    /// Deterministic iteration order for union merging when no sort was
    /// requested but ordering is still needed.
    pub(crate) fn sort_by_clauses(&mut self) {
        for clause in &mut self.clauses {
            clause.sort_values = true;
            clause.sort_reverse = false;
        }
    }

    /// IN-union sources iterate sorted in the merge direction.
    pub(crate) fn sort_for_union(&mut self, reverse: bool) {
        for clause in &mut self.clauses {
            clause.sort_values = true;
            clause.sort_reverse = reverse;
        }
    }

    /// The original filter with each IN leaf expanded to an OR of equalities.
    pub(crate) fn as_or(&self) -> QueryComponent {
        expand_ins(&self.original)
    }

    /// Wrap the planned sub-filter so the first extracted clause iterates
    /// outermost.
    pub(crate) fn wrap(&self, plan: RecordQueryPlan) -> RecordQueryPlan {
        let mut wrapped = plan;
        for clause in self.clauses.iter().rev() {
            wrapped = RecordQueryPlan::InJoin {
                inner: Box::new(wrapped),
                source: InSource {
                    binding: clause.binding.clone(),
                    values: clause.values.clone(),
                    sort_values: clause.sort_values,
                    sort_reverse: clause.sort_reverse,
                },
            };
        }
        wrapped
    }

    pub(crate) fn union_sources(&self) -> Vec<InSource> {
        self.clauses
            .iter()
            .map(|clause| InSource {
                binding: clause.binding.clone(),
                values: clause.values.clone(),
                sort_values: clause.sort_values,
                sort_reverse: clause.sort_reverse,
            })
            .collect()
    }

    /// Re-derive the subplan's ordering key after wrapping: IN-bound columns
    /// move from the equality prefix into the ordered region, in clause
    /// order. Every multi-valued source must iterate sorted; single-valued
    /// sources are trivially sorted.
    pub(crate) fn adjust_ordering(
        &self,
        ordering: Option<PlanOrderingKey>,
    ) -> Option<PlanOrderingKey> {
        let ordering = ordering?;
        if self.clauses.is_empty() {
            return Some(ordering);
        }
        for clause in &self.clauses {
            if clause.values.len() > 1 && !clause.sort_values {
                return None;
            }
        }
        let columns: Vec<KeyExpression> =
            self.clauses.iter().map(InClause::bound_column).collect();
        ordering.with_in_bound_columns(&columns)
    }
}

// Walk And/Nested shapes, extracting IN leaves into parameter equalities.
// INs under OR or quantified components stay in place; their expansion is
// the OR planner's business.
fn extract(
    component: &QueryComponent,
    path: &mut Vec<String>,
    clauses: &mut Vec<InClause>,
) -> QueryComponent {
    match component {
        QueryComponent::And(children) => QueryComponent::And(
            children
                .iter()
                .map(|child| extract(child, path, clauses))
                .collect(),
        ),
        QueryComponent::Nested { field, child } => {
            path.push(field.clone());
            let extracted = extract(child, path, clauses);
            path.pop();
            QueryComponent::nested(field.clone(), extracted)
        }
        QueryComponent::Field {
            field,
            comparison: Comparison::In(values),
        } => {
            let binding = binding_name(path, field, clauses.len());
            clauses.push(InClause {
                binding: binding.clone(),
                path: path.clone(),
                field: field.clone(),
                one_of: false,
                values: values.clone(),
                sort_values: false,
                sort_reverse: false,
            });
            QueryComponent::field_cmp(field.clone(), Comparison::Parameter(binding))
        }
        QueryComponent::OneOfThem {
            field,
            comparison: Comparison::In(values),
        } => {
            let binding = binding_name(path, field, clauses.len());
            clauses.push(InClause {
                binding: binding.clone(),
                path: path.clone(),
                field: field.clone(),
                one_of: true,
                values: values.clone(),
                sort_values: false,
                sort_reverse: false,
            });
            QueryComponent::one_of_them(field.clone(), Comparison::Parameter(binding))
        }
        other => other.clone(),
    }
}

// Whether an AND-shaped filter pins the given key column with an equality,
// making it constant for ordering purposes.
fn filter_binds_column(filter: &QueryComponent, column: &KeyExpression) -> bool {
    match column {
        KeyExpression::Field {
            name,
            fan: FanType::None,
        } => filter.conjuncts().iter().any(|component| {
            matches!(
                component,
                QueryComponent::Field { field, comparison }
                    if field == name && comparison.kind() == ComparisonKind::Equality
            )
        }),
        KeyExpression::Nesting { parent, child, .. } => {
            filter.conjuncts().iter().any(|component| match component {
                QueryComponent::Nested {
                    field,
                    child: nested,
                } => field == parent && filter_binds_column(nested, child),
                _ => false,
            })
        }
        _ => false,
    }
}

fn binding_name(path: &[String], field: &str, ordinal: usize) -> String {
    let mut name = String::from("__in_");
    for parent in path {
        name.push_str(parent);
        name.push('.');
    }
    name.push_str(field);
    name.push_str("__");
    name.push_str(&ordinal.to_string());
    name
}

// Expand IN leaves into ORs of equalities, in place.
fn expand_ins(component: &QueryComponent) -> QueryComponent {
    match component {
        QueryComponent::And(children) => {
            QueryComponent::And(children.iter().map(expand_ins).collect())
        }
        QueryComponent::Nested { field, child } => {
            QueryComponent::nested(field.clone(), expand_ins(child))
        }
        QueryComponent::Field {
            field,
            comparison: Comparison::In(values),
        } => expand_list(values, |value| {
            QueryComponent::field_eq(field.clone(), value)
        })
        .unwrap_or_else(|| component.clone()),
        QueryComponent::OneOfThem {
            field,
            comparison: Comparison::In(values),
        } => expand_list(values, |value| {
            QueryComponent::one_of_them(field.clone(), Comparison::Equals(value))
        })
        .unwrap_or_else(|| component.clone()),
        other => other.clone(),
    }
}

fn expand_list(
    values: &[Value],
    leaf: impl Fn(Value) -> QueryComponent,
) -> Option<QueryComponent> {
    match values {
        [] => None,
        [single] => Some(leaf(single.clone())),
        many => Some(QueryComponent::or(
            many.iter().cloned().map(leaf).collect(),
        )),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn in_filter() -> QueryComponent {
        QueryComponent::and(vec![
            QueryComponent::field_in("name", vec![Value::from("x"), Value::from("y")]),
            QueryComponent::field_eq("age", 30i64),
        ])
    }

    #[test]
    fn extraction_replaces_in_with_parameter() {
        let extractor = InExtractor::new(&in_filter());
        assert!(extractor.has_clauses());
        assert_eq!(
            extractor.sub_filter(),
            &QueryComponent::and(vec![
                QueryComponent::field_cmp(
                    "name",
                    Comparison::Parameter("__in_name__0".to_string())
                ),
                QueryComponent::field_eq("age", 30i64),
            ])
        );
    }

    #[test]
    fn nested_extraction_carries_the_path() {
        let filter = QueryComponent::nested(
            "address",
            QueryComponent::field_in("city", vec![Value::from("p"), Value::from("q")]),
        );
        let extractor = InExtractor::new(&filter);
        assert_eq!(
            extractor.sub_filter(),
            &QueryComponent::nested(
                "address",
                QueryComponent::field_cmp(
                    "city",
                    Comparison::Parameter("__in_address.city__0".to_string())
                )
            )
        );
    }

    #[test]
    fn set_sort_arranges_matching_clause_first() {
        let mut extractor = InExtractor::new(&in_filter());
        assert!(extractor.set_sort(&KeyExpression::field("name"), false));
        let sources = extractor.union_sources();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].sort_values);
    }

    #[test]
    fn set_sort_accepts_equality_bound_sort_columns() {
        // age is pinned to 30, so iteration over name values cannot disturb
        // an ordering by age.
        let mut extractor = InExtractor::new(&in_filter());
        assert!(extractor.set_sort(&KeyExpression::field("age"), false));
    }

    #[test]
    fn set_sort_fails_on_an_unbound_sort_column() {
        let mut extractor = InExtractor::new(&in_filter());
        assert!(!extractor.set_sort(&KeyExpression::field("city"), false));
    }

    #[test]
    fn singleton_clause_never_blocks_the_sort() {
        let filter = QueryComponent::and(vec![
            QueryComponent::field_in("name", vec![Value::from("x")]),
            QueryComponent::field_eq("age", 30i64),
        ]);
        let mut extractor = InExtractor::new(&filter);
        assert!(extractor.set_sort(&KeyExpression::field("age"), false));
    }

    #[test]
    fn as_or_expands_in_lists() {
        let expanded = InExtractor::new(&in_filter()).as_or();
        assert_eq!(
            expanded,
            QueryComponent::and(vec![
                QueryComponent::or(vec![
                    QueryComponent::field_eq("name", "x"),
                    QueryComponent::field_eq("name", "y"),
                ]),
                QueryComponent::field_eq("age", 30i64),
            ])
        );
    }
}
