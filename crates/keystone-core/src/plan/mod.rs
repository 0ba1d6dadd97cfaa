//! Module: plan
//! Responsibility: the physical plan tree the planner emits.
//! Does not own: plan execution; consumers walk this tree.
//! Boundary: every node is a value; the top-level plan owns its sub-plans.

mod node;
mod ordering;

pub use node::{
    IndexScanPlan, IndexScanType, InSource, RecordQueryPlan, RecordScanPlan,
};
pub use ordering::PlanOrderingKey;
