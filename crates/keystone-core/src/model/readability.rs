use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

///
/// StoreReadability
///
/// Snapshot of which indexes are readable on the store at planning time.
/// Indexes still being built (or disabled) must not be scanned.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoreReadability {
    unreadable: BTreeSet<String>,
}

impl StoreReadability {
    /// Snapshot with every index readable.
    #[must_use]
    pub fn all_readable() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_unreadable(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            unreadable: names.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn all_indexes_readable(&self) -> bool {
        self.unreadable.is_empty()
    }

    #[must_use]
    pub fn is_readable(&self, index_name: &str) -> bool {
        !self.unreadable.contains(index_name)
    }
}
