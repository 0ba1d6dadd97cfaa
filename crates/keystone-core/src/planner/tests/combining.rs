//! Candidate combination: intersections, same-base collapse, IN-unions,
//! duplicate handling, rank and text scans, and the sort failure modes.

use super::{name_age_index, person_metadata, plan, plan_configured};
use crate::{
    error::PlannerErrorKind,
    expr::{FanType, KeyExpression},
    model::{IndexKind, IndexModel, MetadataModel, RecordTypeModel, StoreReadability},
    plan::{IndexScanType, RecordQueryPlan},
    planner::{PlannerConfiguration, RecordQueryPlanner},
    query::{Comparison, QueryComponent, RecordQuery, TextComparison, TextMatch},
    value::Value,
};

#[test]
fn residual_conjunction_intersects_order_compatible_indexes() {
    let metadata = person_metadata(vec![
        IndexModel::new("ix_a", KeyExpression::field("a")),
        IndexModel::new("ix_b", KeyExpression::field("b")),
    ]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::and(vec![
            QueryComponent::field_eq("a", 1i64),
            QueryComponent::field_eq("b", 2i64),
        ]))
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    let RecordQueryPlan::Intersection {
        children,
        comparison_key,
        ..
    } = &planned
    else {
        panic!("expected an intersection, got {planned}");
    };
    assert_eq!(children.len(), 2);
    assert_eq!(comparison_key, &KeyExpression::field("id"));
}

#[test]
fn or_branches_sharing_a_base_scan_collapse_into_one_filter() {
    let metadata = person_metadata(vec![IndexModel::new("ix_a", KeyExpression::field("a"))]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::or(vec![
            QueryComponent::and(vec![
                QueryComponent::field_eq("a", 1i64),
                QueryComponent::field_eq("b", 2i64),
            ]),
            QueryComponent::and(vec![
                QueryComponent::field_eq("a", 1i64),
                QueryComponent::field_eq("c", 3i64),
            ]),
        ]))
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    let RecordQueryPlan::Filter { inner, filter } = &planned else {
        panic!("expected a collapsed filter, got {planned}");
    };
    assert!(matches!(&**inner, RecordQueryPlan::IndexScan(_)));
    let QueryComponent::Or(branches) = filter else {
        panic!("expected an OR of the branch filters");
    };
    assert_eq!(branches.len(), 2);
}

#[test]
fn sort_incompatible_in_list_falls_back_to_in_union() {
    let metadata = person_metadata(vec![name_age_index()]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::field_in(
            "name",
            vec![Value::from("x"), Value::from("y")],
        ))
        .sort(KeyExpression::field("age"))
        .build();
    let configuration = PlannerConfiguration::default()
        .with_attempt_failed_in_join_as_union(true);

    let planned = plan_configured(&metadata, configuration, &query).expect("plans");

    let RecordQueryPlan::InUnion {
        inner,
        sources,
        comparison_key,
        ..
    } = &planned
    else {
        panic!("expected an IN-union, got {planned}");
    };
    assert_eq!(sources.len(), 1);
    assert!(sources[0].sort_values);
    assert!(matches!(&**inner, RecordQueryPlan::IndexScan(_)));
    // Merge on the sort followed by the primary key.
    assert_eq!(
        comparison_key,
        &KeyExpression::concat(vec![
            KeyExpression::field("age"),
            KeyExpression::field("id"),
        ])
    );
}

#[test]
fn sort_incompatible_in_list_without_fallbacks_stays_residual() {
    let metadata = person_metadata(vec![name_age_index()]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::field_in(
            "age",
            vec![Value::Int(1), Value::Int(2)],
        ))
        .sort(KeyExpression::field("name"))
        .build();
    // The IN cannot drive the outer loop (the sort is on an unbound column),
    // and with both fallbacks off the IN stays a residual predicate over the
    // sorted scan.
    let configuration = PlannerConfiguration::default()
        .with_attempt_failed_in_join_as_or(false);

    let planned = plan_configured(&metadata, configuration, &query).expect("plans");

    let RecordQueryPlan::Filter { inner, filter } = &planned else {
        panic!("expected a residual filter over the sorted scan, got {planned}");
    };
    assert!(filter.to_string().contains("IN"));
    assert!(matches!(&**inner, RecordQueryPlan::IndexScan(_)));
}

#[test]
fn and_with_multiple_siblings_distributes_over_its_or_child() {
    let metadata = person_metadata(vec![
        IndexModel::new("ix_a", KeyExpression::field("a")),
        IndexModel::new("ix_b", KeyExpression::field("b")),
    ]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::and(vec![
            QueryComponent::field_eq("x", 1i64),
            QueryComponent::field_eq("y", 2i64),
            QueryComponent::or(vec![
                QueryComponent::field_eq("a", 1i64),
                QueryComponent::field_eq("b", 2i64),
            ]),
        ]))
        .build();
    // A term budget of one keeps the normalizer from rewriting the AND, so
    // the single-step distribution is what makes the union reachable.
    let configuration = PlannerConfiguration::default().with_dnf_term_budget(1);

    let planned = plan_configured(&metadata, configuration, &query).expect("plans");

    let RecordQueryPlan::PrimaryKeyDistinct { inner } = &planned else {
        panic!("expected a deduplicated union, got {planned}");
    };
    let RecordQueryPlan::UnorderedUnion { children } = &**inner else {
        panic!("expected a union of the distributed branches, got {inner}");
    };
    assert_eq!(children.len(), 2);
    let rendered = planned.to_string();
    assert!(rendered.contains("ix_a") && rendered.contains("ix_b"));
}

#[test]
fn fan_out_one_of_them_requires_distinct() {
    let metadata = person_metadata(vec![IndexModel::new(
        "ix_tags",
        KeyExpression::field_fan("tags", FanType::FanOut),
    )]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::one_of_them(
            "tags",
            Comparison::Equals(Value::from("blue")),
        ))
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    let RecordQueryPlan::PrimaryKeyDistinct { inner } = &planned else {
        panic!("expected a distinct wrapper, got {planned}");
    };
    assert!(matches!(&**inner, RecordQueryPlan::IndexScan(_)));
}

#[test]
fn fan_out_duplicates_are_kept_when_the_query_allows_them() {
    let metadata = person_metadata(vec![IndexModel::new(
        "ix_tags",
        KeyExpression::field_fan("tags", FanType::FanOut),
    )]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::one_of_them(
            "tags",
            Comparison::Equals(Value::from("blue")),
        ))
        .keep_duplicates()
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    assert!(matches!(planned, RecordQueryPlan::IndexScan(_)));
}

#[test]
fn nested_conjuncts_bind_multiple_columns_of_a_nested_index() {
    let metadata = person_metadata(vec![IndexModel::new(
        "ix_address",
        KeyExpression::nest(
            "address",
            KeyExpression::concat(vec![
                KeyExpression::field("city"),
                KeyExpression::field("zip"),
            ]),
        ),
    )]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::and(vec![
            QueryComponent::nested("address", QueryComponent::field_eq("city", "p")),
            QueryComponent::nested("address", QueryComponent::field_eq("zip", 10i64)),
        ]))
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    let RecordQueryPlan::IndexScan(scan) = &planned else {
        panic!("expected an index scan, got {planned}");
    };
    assert_eq!(scan.comparisons.equality_size(), 2);
}

#[test]
fn rank_predicate_with_group_equality_scans_in_rank_space() {
    let grouping = KeyExpression::grouping(
        KeyExpression::concat(vec![
            KeyExpression::field("league"),
            KeyExpression::field("score"),
        ]),
        1,
    );
    let metadata = person_metadata(vec![
        IndexModel::new("ix_rank", grouping.clone()).with_kind(IndexKind::Rank),
    ]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::and(vec![
            QueryComponent::field_eq("league", "gold"),
            QueryComponent::rank_cmp(grouping, Comparison::LessThan(Value::Int(10))),
        ]))
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    let RecordQueryPlan::IndexScan(scan) = &planned else {
        panic!("expected a rank-space index scan, got {planned}");
    };
    assert_eq!(scan.scan_type, IndexScanType::ByRank);
    assert_eq!(scan.comparisons.equality_size(), 1);
    assert_eq!(
        scan.comparisons.inequality_comparisons(),
        &[Comparison::LessThan(Value::Int(10))]
    );
}

#[test]
fn text_predicate_scans_the_text_index_with_an_opaque_comparison() {
    let metadata = person_metadata(vec![
        IndexModel::new("ix_bio", KeyExpression::field("bio")).with_kind(IndexKind::Text),
    ]);
    let text = TextComparison::new(
        vec!["hello".to_string(), "world".to_string()],
        TextMatch::ContainsAll,
    );
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::field_cmp("bio", Comparison::Text(text)))
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    let RecordQueryPlan::PrimaryKeyDistinct { inner } = &planned else {
        panic!("expected a distinct over the tokenized scan, got {planned}");
    };
    let RecordQueryPlan::IndexScan(scan) = &**inner else {
        panic!("expected a text index scan");
    };
    assert_eq!(scan.scan_type, IndexScanType::ByText);
}

#[test]
fn text_predicate_with_sort_is_rejected() {
    let metadata = person_metadata(vec![
        IndexModel::new("ix_bio", KeyExpression::field("bio")).with_kind(IndexKind::Text),
    ]);
    let text = TextComparison::new(vec!["hello".to_string()], TextMatch::ContainsAll);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::field_cmp("bio", Comparison::Text(text)))
        .sort(KeyExpression::field("bio"))
        .build();

    let error = plan(&metadata, &query).expect_err("text sorts are unsupported");
    assert_eq!(error.kind(), PlannerErrorKind::UnsatisfiableSort);
}

#[test]
fn version_predicate_matches_the_version_index() {
    let metadata = person_metadata(vec![
        IndexModel::new("ix_version", KeyExpression::Version).with_kind(IndexKind::Version),
    ]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::version_cmp(Comparison::GreaterThan(
            Value::Uint(5),
        )))
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    let RecordQueryPlan::IndexScan(scan) = &planned else {
        panic!("expected a version index scan, got {planned}");
    };
    assert_eq!(scan.index_name, "ix_version");
}

#[test]
fn unique_index_equality_with_matching_sort_is_strictly_sorted() {
    let metadata = person_metadata(vec![
        IndexModel::new("ix_name", KeyExpression::field("name")).unique(),
    ]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::field_eq("name", "x"))
        .sort(KeyExpression::field("name"))
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    let RecordQueryPlan::IndexScan(scan) = &planned else {
        panic!("expected an index scan, got {planned}");
    };
    assert!(scan.strictly_sorted);
}

#[test]
fn unsupported_sort_without_filter_reports_no_index_for_sort() {
    let metadata = person_metadata(Vec::new());
    let query = RecordQuery::builder()
        .record_type("Person")
        .sort(KeyExpression::field("name"))
        .build();

    let error = plan(&metadata, &query).expect_err("no index sorts by name");
    assert_eq!(error.kind(), PlannerErrorKind::NoIndexForSort);
}

#[test]
fn allowed_in_memory_sort_wraps_the_scan() {
    let metadata = person_metadata(Vec::new());
    let query = RecordQuery::builder()
        .record_type("Person")
        .sort(KeyExpression::field("name"))
        .build();
    let configuration = PlannerConfiguration::default().with_allow_in_memory_sort(true);

    let planned = plan_configured(&metadata, configuration, &query).expect("plans");

    let RecordQueryPlan::Sort { inner, key, .. } = &planned else {
        panic!("expected an in-memory sort, got {planned}");
    };
    assert_eq!(key, &KeyExpression::field("name"));
    assert!(matches!(&**inner, RecordQueryPlan::Scan(_)));
}

#[test]
fn demanded_unreadable_index_errors() {
    let metadata = person_metadata(vec![IndexModel::new(
        "ix_name",
        KeyExpression::field("name"),
    )]);
    let readability = StoreReadability::with_unreadable(["ix_name"]);
    let query = RecordQuery::builder()
        .record_type("Person")
        .filter(QueryComponent::field_eq("name", "x"))
        .allowed_indexes(vec!["ix_name".to_string()])
        .build();

    let error = RecordQueryPlanner::new(&metadata, &readability)
        .plan(&query)
        .expect_err("the demanded index is unreadable");
    assert_eq!(error.kind(), PlannerErrorKind::Metadata);
}

#[test]
fn non_queryable_index_is_skipped_unless_allowed() {
    let metadata = person_metadata(vec![IndexModel::new(
        "ix_name",
        KeyExpression::field("name"),
    )
    .not_queryable()]);
    let filter = QueryComponent::field_eq("name", "x");
    let skipped = plan(
        &metadata,
        &RecordQuery::builder()
            .record_type("Person")
            .filter(filter.clone())
            .build(),
    )
    .expect("plans");
    assert!(matches!(skipped, RecordQueryPlan::Filter { .. }));

    let allowed = plan(
        &metadata,
        &RecordQuery::builder()
            .record_type("Person")
            .filter(filter)
            .allowed_indexes(vec!["ix_name".to_string()])
            .build(),
    )
    .expect("plans");
    assert!(matches!(allowed, RecordQueryPlan::IndexScan(_)));
}

#[test]
fn unknown_record_type_is_a_metadata_error() {
    let metadata = person_metadata(Vec::new());
    let query = RecordQuery::builder().record_type("Martian").build();

    let error = plan(&metadata, &query).expect_err("unknown type");
    assert_eq!(error.kind(), PlannerErrorKind::Metadata);
}

#[test]
fn multi_type_query_uses_only_shared_indexes() {
    let metadata = MetadataModel::builder()
        .record_type(RecordTypeModel::new(
            "A",
            KeyExpression::concat(vec![
                KeyExpression::RecordTypeKey,
                KeyExpression::field("id"),
            ]),
        ))
        .record_type(RecordTypeModel::new(
            "B",
            KeyExpression::concat(vec![
                KeyExpression::RecordTypeKey,
                KeyExpression::field("id"),
            ]),
        ))
        .index(
            IndexModel::new("ix_shared", KeyExpression::field("name"))
                .on_types(vec!["A".to_string(), "B".to_string()]),
        )
        .index(
            IndexModel::new("ix_only_a", KeyExpression::field("name"))
                .on_types(vec!["A".to_string()]),
        )
        .build()
        .expect("metadata builds");
    let query = RecordQuery::builder()
        .record_type("A")
        .record_type("B")
        .filter(QueryComponent::field_eq("name", "x"))
        .build();

    let planned = plan(&metadata, &query).expect("plans");

    let RecordQueryPlan::IndexScan(scan) = &planned else {
        panic!("expected the shared index, got {planned}");
    };
    assert_eq!(scan.index_name, "ix_shared");
}
