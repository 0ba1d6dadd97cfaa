//! Module: expr
//! Responsibility: key-expression algebra shared by metadata, queries, and plans.
//! Does not own: predicate semantics or scan-bound construction.
//! Boundary: the planner matches predicates against these shapes; stores encode them.

mod key_expression;

pub use key_expression::{FanType, KeyExpression};
