//! Planner test suites: the end-to-end scenarios plus the combining and
//! covering behaviors, over fixture metadata built per test.

mod combining;
mod covering;

use crate::{
    error::PlannerError,
    expr::KeyExpression,
    model::{IndexModel, MetadataModel, RecordTypeModel, StoreReadability},
    plan::RecordQueryPlan,
    planner::{PlannerConfiguration, RecordQueryPlanner},
    query::RecordQuery,
};

/// One record type "Person" with primary key `id` and the given indexes.
fn person_metadata(indexes: Vec<IndexModel>) -> MetadataModel {
    let mut builder = MetadataModel::builder().record_type(RecordTypeModel::new(
        "Person",
        KeyExpression::field("id"),
    ));
    for index in indexes {
        builder = builder.index(index.on_types(vec!["Person".to_string()]));
    }
    builder.build().expect("fixture metadata builds")
}

fn plan(metadata: &MetadataModel, query: &RecordQuery) -> Result<RecordQueryPlan, PlannerError> {
    let readability = StoreReadability::all_readable();
    RecordQueryPlanner::new(metadata, &readability).plan(query)
}

fn plan_configured(
    metadata: &MetadataModel,
    configuration: PlannerConfiguration,
    query: &RecordQuery,
) -> Result<RecordQueryPlan, PlannerError> {
    let readability = StoreReadability::all_readable();
    RecordQueryPlanner::new(metadata, &readability)
        .with_configuration(configuration)
        .plan(query)
}

fn name_age_index() -> IndexModel {
    IndexModel::new(
        "ix_name_age",
        KeyExpression::concat(vec![
            KeyExpression::field("name"),
            KeyExpression::field("age"),
        ]),
    )
}
