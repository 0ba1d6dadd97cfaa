//! Core runtime for Keystone: the metadata model, query predicates, plan
//! operators, and the heuristic query planner, with the domain vocabulary
//! exported via the `prelude`.
pub mod error;
pub mod expr;
pub mod model;
pub mod plan;
pub mod planner;
pub mod query;
pub mod scan;
pub mod value;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No internal planner machinery is re-exported here.
///

pub mod prelude {
    pub use crate::{
        expr::{FanType, KeyExpression},
        model::{IndexKind, IndexModel, MetadataModel, RecordTypeModel, StoreReadability},
        plan::RecordQueryPlan,
        planner::{IndexScanPreference, PlannerConfiguration, RecordQueryPlanner},
        query::{Comparison, QueryComponent, RecordQuery},
        value::Value,
    };
}
