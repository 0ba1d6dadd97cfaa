//! Module: query::normalize
//! Responsibility: canonical boolean shape for index matching.
//! Does not own: index selection or scan-bound construction.
//! Boundary: the planner normalizes a query's filter once, before matching.

use crate::query::component::QueryComponent;
use crate::planner::PlannerConfiguration;

///
/// BooleanNormalizer
///
/// Rewrites a filter toward disjunctive normal form under a term budget.
///
/// NOT nodes push through And/Or by De Morgan and into leaves that have a
/// direct comparison complement; a Not over a leaf without a complement stays
/// where it is and is evaluated as a residual. Full DNF expansion is
/// attempted only when the estimated term count stays within the budget;
/// otherwise the (NOT-pushed) original shape is kept.
///

#[derive(Clone, Copy, Debug)]
pub struct BooleanNormalizer {
    term_budget: usize,
}

impl BooleanNormalizer {
    #[must_use]
    pub const fn new(term_budget: usize) -> Self {
        Self { term_budget }
    }

    #[must_use]
    pub const fn for_configuration(configuration: &PlannerConfiguration) -> Self {
        Self::new(configuration.dnf_term_budget)
    }

    #[must_use]
    pub fn normalize_if_possible(&self, filter: Option<&QueryComponent>) -> Option<QueryComponent> {
        let filter = filter?;
        let pushed = push_nots(filter);
        if estimate_dnf_terms(&pushed) > self.term_budget {
            return Some(simplify(pushed));
        }
        let terms = to_dnf(&pushed);
        let disjuncts: Vec<QueryComponent> = terms
            .into_iter()
            .map(|conjuncts| {
                if conjuncts.len() == 1 {
                    conjuncts.into_iter().next().unwrap_or(QueryComponent::And(Vec::new()))
                } else {
                    QueryComponent::And(conjuncts)
                }
            })
            .collect();
        let normalized = if disjuncts.len() == 1 {
            disjuncts.into_iter().next().unwrap_or(QueryComponent::Or(Vec::new()))
        } else {
            QueryComponent::Or(disjuncts)
        };
        Some(simplify(normalized))
    }
}

// Push NOT down: De Morgan over And/Or, complement into leaves.
fn push_nots(component: &QueryComponent) -> QueryComponent {
    match component {
        QueryComponent::And(children) => {
            QueryComponent::And(children.iter().map(push_nots).collect())
        }
        QueryComponent::Or(children) => {
            QueryComponent::Or(children.iter().map(push_nots).collect())
        }
        QueryComponent::Not(child) => push_not_of(child),
        other => other.clone(),
    }
}

fn push_not_of(child: &QueryComponent) -> QueryComponent {
    match child {
        QueryComponent::And(children) => {
            QueryComponent::Or(children.iter().map(push_not_of).collect())
        }
        QueryComponent::Or(children) => {
            QueryComponent::And(children.iter().map(push_not_of).collect())
        }
        QueryComponent::Not(inner) => push_nots(inner),
        QueryComponent::Field { field, comparison } => match comparison.complement() {
            Some(complement) => QueryComponent::Field {
                field: field.clone(),
                comparison: complement,
            },
            None => QueryComponent::not(child.clone()),
        },
        QueryComponent::RecordFunction {
            function,
            comparison,
        } => match comparison.complement() {
            Some(complement) => QueryComponent::RecordFunction {
                function: function.clone(),
                comparison: complement,
            },
            None => QueryComponent::not(child.clone()),
        },
        // A complemented one-of-them flips the quantifier, not the comparison.
        other => QueryComponent::not(other.clone()),
    }
}

// Estimated DNF width: products over And, sums over Or, 1 at leaves.
fn estimate_dnf_terms(component: &QueryComponent) -> usize {
    match component {
        QueryComponent::And(children) => children
            .iter()
            .map(estimate_dnf_terms)
            .fold(1usize, usize::saturating_mul),
        QueryComponent::Or(children) => children
            .iter()
            .map(estimate_dnf_terms)
            .fold(0usize, usize::saturating_add),
        _ => 1,
    }
}

// Disjunction of conjunctions over an already NOT-pushed tree. Nested and
// one-of-them components are opaque leaves here.
fn to_dnf(component: &QueryComponent) -> Vec<Vec<QueryComponent>> {
    match component {
        QueryComponent::Or(children) => children.iter().flat_map(to_dnf).collect(),
        QueryComponent::And(children) => {
            let mut terms: Vec<Vec<QueryComponent>> = vec![Vec::new()];
            for child in children {
                let child_terms = to_dnf(child);
                let mut next = Vec::with_capacity(terms.len() * child_terms.len());
                for term in &terms {
                    for child_term in &child_terms {
                        let mut merged = term.clone();
                        merged.extend(child_term.iter().cloned());
                        next.push(merged);
                    }
                }
                terms = next;
            }
            terms
        }
        other => vec![vec![other.clone()]],
    }
}

// Flatten nested And/Or and unwrap singletons; preserves child order.
fn simplify(component: QueryComponent) -> QueryComponent {
    match component {
        QueryComponent::And(children) => {
            let mut out = Vec::with_capacity(children.len());
            for child in children {
                match simplify(child) {
                    QueryComponent::And(grandchildren) => out.extend(grandchildren),
                    other => out.push(other),
                }
            }
            if out.len() == 1 {
                out.into_iter().next().unwrap_or(QueryComponent::And(Vec::new()))
            } else {
                QueryComponent::And(out)
            }
        }
        QueryComponent::Or(children) => {
            let mut out = Vec::with_capacity(children.len());
            for child in children {
                match simplify(child) {
                    QueryComponent::Or(grandchildren) => out.extend(grandchildren),
                    other => out.push(other),
                }
            }
            if out.len() == 1 {
                out.into_iter().next().unwrap_or(QueryComponent::Or(Vec::new()))
            } else {
                QueryComponent::Or(out)
            }
        }
        other => other,
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::comparison::Comparison;
    use crate::value::Value;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn eq(field: &str, value: i64) -> QueryComponent {
        QueryComponent::field_eq(field, value)
    }

    fn normalizer() -> BooleanNormalizer {
        BooleanNormalizer::new(1000)
    }

    #[test]
    fn not_pushes_into_comparison_leaves() {
        let filter = QueryComponent::not(QueryComponent::field_cmp(
            "age",
            Comparison::LessThan(Value::Int(21)),
        ));
        let normalized = normalizer().normalize_if_possible(Some(&filter));
        assert_eq!(
            normalized,
            Some(QueryComponent::field_cmp(
                "age",
                Comparison::GreaterThanOrEquals(Value::Int(21))
            ))
        );
    }

    #[test]
    fn not_without_complement_stays_residual() {
        let filter = QueryComponent::not(QueryComponent::field_in(
            "a",
            vec![Value::Int(1), Value::Int(2)],
        ));
        let normalized = normalizer().normalize_if_possible(Some(&filter));
        assert_eq!(normalized, Some(filter));
    }

    #[test]
    fn and_over_or_distributes_within_budget() {
        let filter = QueryComponent::and(vec![
            eq("x", 1),
            QueryComponent::or(vec![eq("a", 1), eq("b", 2)]),
        ]);
        let normalized = normalizer()
            .normalize_if_possible(Some(&filter))
            .expect("normalizes");
        assert_eq!(
            normalized,
            QueryComponent::or(vec![
                QueryComponent::and(vec![eq("x", 1), eq("a", 1)]),
                QueryComponent::and(vec![eq("x", 1), eq("b", 2)]),
            ])
        );
    }

    #[test]
    fn budget_overflow_keeps_the_original_shape() {
        // 2^10 DNF terms; budget 8 keeps the conjunction of disjunctions.
        let children: Vec<QueryComponent> = (0..10)
            .map(|i| {
                QueryComponent::or(vec![
                    eq(&format!("a{i}"), 0),
                    eq(&format!("b{i}"), 1),
                ])
            })
            .collect();
        let filter = QueryComponent::and(children);
        let normalized = BooleanNormalizer::new(8)
            .normalize_if_possible(Some(&filter))
            .expect("keeps original");
        assert_eq!(normalized, filter);
    }

    // Truth-table oracle over single-field equality leaves.
    fn eval(component: &QueryComponent, row: &BTreeMap<String, i64>) -> bool {
        match component {
            QueryComponent::And(children) => children.iter().all(|child| eval(child, row)),
            QueryComponent::Or(children) => children.iter().any(|child| eval(child, row)),
            QueryComponent::Not(child) => !eval(child, row),
            QueryComponent::Field { field, comparison } => {
                let actual = row.get(field).copied().unwrap_or(0);
                match comparison {
                    Comparison::Equals(Value::Int(v)) => actual == *v,
                    Comparison::NotEquals(Value::Int(v)) => actual != *v,
                    Comparison::LessThan(Value::Int(v)) => actual < *v,
                    Comparison::GreaterThanOrEquals(Value::Int(v)) => actual >= *v,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn arb_leaf() -> impl Strategy<Value = QueryComponent> {
        (prop_oneof!["a", "b", "c"], -2i64..2).prop_map(|(field, v)| eq(&field, v))
    }

    fn arb_component() -> impl Strategy<Value = QueryComponent> {
        arb_leaf().prop_recursive(3, 24, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..3).prop_map(QueryComponent::And),
                prop::collection::vec(inner.clone(), 1..3).prop_map(QueryComponent::Or),
                inner.prop_map(QueryComponent::not),
            ]
        })
    }

    proptest! {
        #[test]
        fn normalization_preserves_truth_tables(
            component in arb_component(),
            a in -2i64..2,
            b in -2i64..2,
            c in -2i64..2,
        ) {
            let normalized = normalizer()
                .normalize_if_possible(Some(&component))
                .expect("some filter");
            let row: BTreeMap<String, i64> = [
                ("a".to_string(), a),
                ("b".to_string(), b),
                ("c".to_string(), c),
            ]
            .into_iter()
            .collect();
            prop_assert_eq!(eval(&component, &row), eval(&normalized, &row));
        }

        #[test]
        fn normalization_is_deterministic(component in arb_component()) {
            let first = normalizer().normalize_if_possible(Some(&component));
            let second = normalizer().normalize_if_possible(Some(&component));
            prop_assert_eq!(first, second);
        }
    }
}
