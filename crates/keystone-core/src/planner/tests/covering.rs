//! Covering rewrites, deferred fetches, filter pushdown, index-filter
//! partitioning, and covering aggregate planning.

use super::{person_metadata, plan, plan_configured};
use crate::{
    expr::KeyExpression,
    model::IndexModel,
    plan::{IndexScanType, RecordQueryPlan},
    planner::{post, PlannerConfiguration},
    query::{Comparison, QueryComponent, RecordQuery},
    value::Value,
};

#[test]
fn required_results_from_the_index_key_skip_the_fetch() {
    let metadata = person_metadata(vec![IndexModel::new(
        "ix_name",
        KeyExpression::field("name"),
    )]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::field_eq("name", "x"))
        .required_results(vec![KeyExpression::field("name")])
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    let RecordQueryPlan::Covering {
        index,
        required_fields,
    } = &planned
    else {
        panic!("expected a covering scan, got {planned}");
    };
    assert_eq!(index.index_name, "ix_name");
    assert_eq!(required_fields, &[KeyExpression::field("name")]);
}

#[test]
fn required_results_outside_the_index_keep_the_fetch() {
    let metadata = person_metadata(vec![IndexModel::new(
        "ix_name",
        KeyExpression::field("name"),
    )]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::field_eq("name", "x"))
        .required_results(vec![KeyExpression::field("salary")])
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    assert!(matches!(planned, RecordQueryPlan::IndexScan(_)));
}

#[test]
fn covering_rewrite_keeps_entry_evaluable_residuals() {
    // The residual on `name` is evaluable on the index entry, so the fetch
    // can still be skipped; the filter runs over partial records.
    let metadata = person_metadata(vec![IndexModel::new(
        "ix_name",
        KeyExpression::field("name"),
    )]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::and(vec![
            QueryComponent::field_cmp("name", Comparison::GreaterThan(Value::from("a"))),
            QueryComponent::field_cmp("name", Comparison::NotEquals(Value::from("x"))),
        ]))
        .required_results(vec![KeyExpression::field("name")])
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    let RecordQueryPlan::Filter { inner, .. } = &planned else {
        panic!("expected a filter over the covering scan, got {planned}");
    };
    assert!(matches!(&**inner, RecordQueryPlan::Covering { .. }));
}

#[test]
fn deferred_fetch_lifts_above_the_union() {
    let metadata = person_metadata(vec![
        IndexModel::new("ix_a", KeyExpression::field("a")),
        IndexModel::new("ix_b", KeyExpression::field("b")),
    ]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::or(vec![
            QueryComponent::field_eq("a", 1i64),
            QueryComponent::field_eq("b", 2i64),
        ]))
        .build();
    let configuration =
        PlannerConfiguration::default().with_defer_fetch_after_union_and_intersection(true);

    let planned = plan_configured(&metadata, configuration, &query).expect("plans");

    let rendered = planned.to_string();
    assert!(
        rendered.contains("Fetch(UnorderedUnion(Covering("),
        "fetch should sit above the union of covering scans: {rendered}"
    );
}

#[test]
fn residual_filters_push_below_union_branches() {
    let filter = QueryComponent::field_eq("c", 3i64);
    let scan = |name: &str| {
        RecordQueryPlan::IndexScan(crate::plan::IndexScanPlan {
            index_name: name.to_string(),
            scan_type: IndexScanType::ByValue,
            comparisons: crate::scan::ScanComparisons::empty(),
            reverse: false,
            strictly_sorted: false,
            possible_types: vec!["Person".to_string()],
        })
    };
    let plan = RecordQueryPlan::Filter {
        inner: Box::new(RecordQueryPlan::UnorderedUnion {
            children: vec![scan("ix_a"), scan("ix_b")],
        }),
        filter,
    };

    let pushed = post::push_residual_filters(plan);

    let RecordQueryPlan::UnorderedUnion { children } = &pushed else {
        panic!("expected the union on top, got {pushed}");
    };
    assert!(children
        .iter()
        .all(|child| matches!(child, RecordQueryPlan::Filter { .. })));
}

#[test]
fn index_filter_partitioning_prefers_the_wider_index() {
    let metadata = person_metadata(vec![
        IndexModel::new("ix_a", KeyExpression::field("a")),
        IndexModel::new(
            "ix_ab",
            KeyExpression::concat(vec![KeyExpression::field("a"), KeyExpression::field("b")]),
        ),
    ]);
    let filter = QueryComponent::and(vec![
        QueryComponent::field_eq("a", 1i64),
        QueryComponent::field_cmp("b", Comparison::NotEquals(Value::Int(2))),
    ]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(filter.clone())
        .build();

    // Without the option the smaller index wins the tie.
    let default_plan = plan(&metadata, &query).expect("plans");
    assert!(default_plan.to_string().contains("Index(ix_a ["));

    // With it, the residual on `b` counts as an index filter (no fetch
    // needed to evaluate it), so the wider index wins.
    let configuration = PlannerConfiguration::default().with_optimize_for_index_filters(true);
    let optimized_plan = plan_configured(&metadata, configuration, &query).expect("plans");
    assert!(optimized_plan.to_string().contains("Index(ix_ab ["));
}

#[test]
fn covering_aggregate_plans_from_the_grouping_key() {
    let grouping = KeyExpression::grouping(
        KeyExpression::concat(vec![
            KeyExpression::field("league"),
            KeyExpression::field("score"),
        ]),
        1,
    );
    let metadata = person_metadata(vec![IndexModel::new("ix_league_score", grouping)]);
    let readability = crate::model::StoreReadability::all_readable();
    let planner = crate::planner::RecordQueryPlanner::new(&metadata, &readability);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::field_eq("league", "gold"))
        .required_results(vec![KeyExpression::field("league")])
        .build();

    let planned = planner
        .plan_covering_aggregate(&query, "ix_league_score")
        .expect("planning succeeds")
        .expect("the index satisfies the aggregate");

    let RecordQueryPlan::Covering { index, .. } = &planned else {
        panic!("expected a covering aggregate scan, got {planned}");
    };
    assert_eq!(index.scan_type, IndexScanType::ByGroup);
    assert_eq!(
        index.comparisons.equality_comparisons(),
        &[Comparison::Equals(Value::from("gold"))]
    );
}

#[test]
fn covering_aggregate_with_unknown_index_yields_no_plan() {
    let metadata = person_metadata(Vec::new());
    let readability = crate::model::StoreReadability::all_readable();
    let planner = crate::planner::RecordQueryPlanner::new(&metadata, &readability);
    let query = RecordQuery::builder()
        .record_type("Person")
        .required_results(vec![KeyExpression::field("league")])
        .build();

    let planned = planner
        .plan_covering_aggregate(&query, "ix_missing")
        .expect("planning succeeds");
    assert!(planned.is_none());
}

#[test]
fn covering_aggregate_refuses_unsatisfied_filters() {
    let grouping = KeyExpression::grouping(
        KeyExpression::concat(vec![
            KeyExpression::field("league"),
            KeyExpression::field("score"),
        ]),
        1,
    );
    let metadata = person_metadata(vec![IndexModel::new("ix_league_score", grouping)]);
    let readability = crate::model::StoreReadability::all_readable();
    let planner = crate::planner::RecordQueryPlanner::new(&metadata, &readability);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::field_eq("city", "p"))
        .required_results(vec![KeyExpression::field("league")])
        .build();

    let planned = planner
        .plan_covering_aggregate(&query, "ix_league_score")
        .expect("planning succeeds");
    assert!(planned.is_none());
}
