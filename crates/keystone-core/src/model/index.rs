use crate::expr::KeyExpression;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

///
/// IndexKind
///
/// Planner-facing classification of index types. `Value` and `Version`
/// indexes are planned by key matching; `Rank` via rank-space scans; `Text`
/// through the text routine; `Other` only through the whole-filter hook.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum IndexKind {
    #[default]
    Value,
    Version,
    Rank,
    Text,
    Other,
}

impl IndexKind {
    /// Indexes of this kind are matched like value indexes.
    #[must_use]
    pub const fn plans_as_value(self) -> bool {
        matches!(self, Self::Value | Self::Version)
    }
}

///
/// IndexModel
///
/// Immutable descriptor of one secondary index: its name, root key
/// expression, kind, uniqueness, and the record types it is declared on.
/// An empty record-type list marks a universal index.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IndexModel {
    name: String,
    root: KeyExpression,
    kind: IndexKind,
    unique: bool,
    record_types: Vec<String>,
    queryable: bool,
}

impl IndexModel {
    pub fn new(name: impl Into<String>, root: KeyExpression) -> Self {
        Self {
            name: name.into(),
            root,
            kind: IndexKind::Value,
            unique: false,
            record_types: Vec::new(),
            queryable: true,
        }
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: IndexKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn on_types(mut self, record_types: Vec<String>) -> Self {
        self.record_types = record_types;
        self
    }

    /// Mark this index as excluded from planning unless explicitly allowed.
    #[must_use]
    pub const fn not_queryable(mut self) -> Self {
        self.queryable = false;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn root(&self) -> &KeyExpression {
        &self.root
    }

    #[must_use]
    pub const fn kind(&self) -> IndexKind {
        self.kind
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub fn record_types(&self) -> &[String] {
        &self.record_types
    }

    #[must_use]
    pub const fn is_universal(&self) -> bool {
        self.record_types.is_empty()
    }

    #[must_use]
    pub const fn is_multi_type(&self) -> bool {
        self.record_types.len() > 1
    }

    #[must_use]
    pub const fn is_queryable(&self) -> bool {
        self.queryable
    }

    #[must_use]
    pub fn column_size(&self) -> usize {
        self.root.column_size()
    }

    /// Size of one stored entry: key columns plus primary-key columns not
    /// already part of the key. Drives the smaller-index tie-break.
    #[must_use]
    pub fn entry_size(&self, primary_key: &KeyExpression) -> usize {
        let own = self.root.normalized_columns();
        let extra = primary_key
            .normalized_columns()
            .into_iter()
            .filter(|column| !own.contains(column))
            .count();
        own.len() + extra
    }

    /// Remove primary-key columns that this index's key already contains.
    pub fn trim_primary_key(&self, primary_key_columns: &mut Vec<KeyExpression>) {
        let own = self.root.normalized_columns();
        primary_key_columns.retain(|column| !own.contains(column));
    }
}

impl Display for IndexModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            write!(f, "UNIQUE {}{}", self.name, self.root)
        } else {
            write!(f, "{}{}", self.name, self.root)
        }
    }
}
