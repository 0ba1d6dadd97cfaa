//! Module: query
//! Responsibility: declarative query contracts and boolean normalization.
//! Does not own: planning or execution semantics.
//! Boundary: built by callers, validated against metadata, consumed by the planner.

mod comparison;
mod component;
mod normalize;

pub use comparison::{Comparison, ComparisonKind, TextComparison, TextMatch};
pub use component::{QueryComponent, QueryFunction};
pub use normalize::BooleanNormalizer;

use crate::{error::PlannerError, expr::KeyExpression, model::MetadataModel};
use serde::{Deserialize, Serialize};

///
/// RecordQuery
///
/// A declarative query: the record types targeted, a boolean filter, an
/// optional sort key, optional required result fields (enabling covering
/// rewrites), and duplicate-removal semantics.
///
/// An empty record-type set targets every type in the metadata.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    record_types: Vec<String>,
    filter: Option<QueryComponent>,
    sort: Option<KeyExpression>,
    sort_reverse: bool,
    required_results: Option<Vec<KeyExpression>>,
    remove_duplicates: bool,
    allowed_indexes: Option<Vec<String>>,
}

impl RecordQuery {
    #[must_use]
    pub fn builder() -> RecordQueryBuilder {
        RecordQueryBuilder::default()
    }

    #[must_use]
    pub fn record_types(&self) -> &[String] {
        &self.record_types
    }

    #[must_use]
    pub const fn filter(&self) -> Option<&QueryComponent> {
        self.filter.as_ref()
    }

    #[must_use]
    pub const fn sort(&self) -> Option<&KeyExpression> {
        self.sort.as_ref()
    }

    #[must_use]
    pub const fn is_sort_reverse(&self) -> bool {
        self.sort_reverse
    }

    #[must_use]
    pub fn required_results(&self) -> Option<&[KeyExpression]> {
        self.required_results.as_deref()
    }

    #[must_use]
    pub const fn removes_duplicates(&self) -> bool {
        self.remove_duplicates
    }

    #[must_use]
    pub fn allowed_indexes(&self) -> Option<&[String]> {
        self.allowed_indexes.as_deref()
    }

    #[must_use]
    pub const fn has_allowed_indexes(&self) -> bool {
        self.allowed_indexes.is_some()
    }

    /// Copy of this query with the sort removed (in-memory sort fallback).
    #[must_use]
    pub fn without_sort(&self) -> Self {
        let mut query = self.clone();
        query.sort = None;
        query.sort_reverse = false;
        query
    }

    /// Static validation against the metadata this query will be planned on.
    pub fn validate(&self, metadata: &MetadataModel) -> Result<(), PlannerError> {
        for record_type in &self.record_types {
            metadata.record_type(record_type)?;
        }
        if let Some(sort) = &self.sort {
            sort.validate_sort_key()?;
        }
        if let Some(allowed) = &self.allowed_indexes {
            for index_name in allowed {
                metadata.index(index_name)?;
            }
        }
        Ok(())
    }
}

///
/// RecordQueryBuilder
///

#[derive(Clone, Debug)]
pub struct RecordQueryBuilder {
    record_types: Vec<String>,
    filter: Option<QueryComponent>,
    sort: Option<KeyExpression>,
    sort_reverse: bool,
    required_results: Option<Vec<KeyExpression>>,
    remove_duplicates: bool,
    allowed_indexes: Option<Vec<String>>,
}

impl Default for RecordQueryBuilder {
    fn default() -> Self {
        Self {
            record_types: Vec::new(),
            filter: None,
            sort: None,
            sort_reverse: false,
            required_results: None,
            remove_duplicates: true,
            allowed_indexes: None,
        }
    }
}

impl RecordQueryBuilder {
    #[must_use]
    pub fn record_type(mut self, name: impl Into<String>) -> Self {
        self.record_types.push(name.into());
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: QueryComponent) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: KeyExpression) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn sort_reverse(mut self, sort: KeyExpression) -> Self {
        self.sort = Some(sort);
        self.sort_reverse = true;
        self
    }

    #[must_use]
    pub fn required_results(mut self, fields: Vec<KeyExpression>) -> Self {
        self.required_results = Some(fields);
        self
    }

    /// Keep duplicates produced by fan-out scans instead of inserting a
    /// primary-key distinct operator.
    #[must_use]
    pub const fn keep_duplicates(mut self) -> Self {
        self.remove_duplicates = false;
        self
    }

    #[must_use]
    pub fn allowed_indexes(mut self, names: Vec<String>) -> Self {
        self.allowed_indexes = Some(names);
        self
    }

    #[must_use]
    pub fn build(self) -> RecordQuery {
        RecordQuery {
            record_types: self.record_types,
            filter: self.filter,
            sort: self.sort,
            sort_reverse: self.sort_reverse,
            required_results: self.required_results,
            remove_duplicates: self.remove_duplicates,
            allowed_indexes: self.allowed_indexes,
        }
    }
}
