//! Module: model
//! Responsibility: immutable metadata consumed by the planner.
//! Does not own: on-disk encodings or metadata loading.
//! Boundary: callers build this once; the planner only reads it.

mod index;
mod metadata;
mod readability;
mod record;

pub use index::{IndexKind, IndexModel};
pub use metadata::{MetadataBuilder, MetadataModel};
pub use readability::StoreReadability;
pub use record::RecordTypeModel;
