//! Keystone: a heuristic, rule-based query planner for record stores layered
//! over ordered key-value engines.
//!
//! ## Crate layout
//! - `core`: metadata model, key-expression algebra, query predicates, plan
//!   operators, and the planner itself.
//!
//! The `prelude` module mirrors the domain vocabulary used by embedding
//! callers.

pub use keystone_core as core;

pub use keystone_core::{
    error::{PlannerError, PlannerErrorKind},
    planner::{IndexScanPreference, PlannerConfiguration, RecordQueryPlanner},
};

//
// Prelude
//

pub mod prelude {
    pub use keystone_core::prelude::*;
}
