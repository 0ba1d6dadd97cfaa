use crate::{
    error::PlannerError,
    expr::KeyExpression,
    model::{IndexModel, RecordTypeModel},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// MetadataModel
///
/// Immutable snapshot of the store's schema: record types keyed by name and
/// indexes keyed by name. Built once via `MetadataBuilder`; the planner only
/// reads it. Name-keyed maps keep candidate iteration deterministic.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MetadataModel {
    record_types: BTreeMap<String, RecordTypeModel>,
    indexes: BTreeMap<String, IndexModel>,
}

impl MetadataModel {
    #[must_use]
    pub fn builder() -> MetadataBuilder {
        MetadataBuilder::new()
    }

    pub fn record_type(&self, name: &str) -> Result<&RecordTypeModel, PlannerError> {
        self.record_types
            .get(name)
            .ok_or_else(|| PlannerError::metadata(format!("unknown record type '{name}'")))
    }

    pub fn record_types(&self) -> impl Iterator<Item = &RecordTypeModel> {
        self.record_types.values()
    }

    #[must_use]
    pub fn record_type_names(&self) -> Vec<String> {
        self.record_types.keys().cloned().collect()
    }

    pub fn index(&self, name: &str) -> Result<&IndexModel, PlannerError> {
        self.find_index(name)
            .ok_or_else(|| PlannerError::metadata(format!("unknown index '{name}'")))
    }

    /// Lookup that signals an unknown index by absence instead of an error.
    #[must_use]
    pub fn find_index(&self, name: &str) -> Option<&IndexModel> {
        self.indexes.get(name)
    }

    pub fn indexes(&self) -> impl Iterator<Item = &IndexModel> {
        self.indexes.values()
    }

    /// Single-type indexes declared on exactly the given record type.
    pub fn indexes_for_type<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a IndexModel> {
        self.indexes
            .values()
            .filter(move |index| matches!(index.record_types(), [only] if only == name))
    }

    /// Multi-type indexes that include the given record type.
    pub fn multi_type_indexes_for<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a IndexModel> {
        self.indexes.values().filter(move |index| {
            index.is_multi_type() && index.record_types().iter().any(|t| t == name)
        })
    }

    pub fn universal_indexes(&self) -> impl Iterator<Item = &IndexModel> {
        self.indexes.values().filter(|index| index.is_universal())
    }

    /// Record types an index's entries can come from.
    #[must_use]
    pub fn record_types_for_index(&self, index: &IndexModel) -> Vec<String> {
        if index.is_universal() {
            self.record_type_names()
        } else {
            index.record_types().to_vec()
        }
    }

    /// Structural common prefix of the primary keys of the given types.
    #[must_use]
    pub fn common_primary_key<'a>(
        types: impl IntoIterator<Item = &'a RecordTypeModel>,
    ) -> Option<KeyExpression> {
        let mut common: Option<Vec<KeyExpression>> = None;
        for record_type in types {
            let columns = record_type.primary_key().normalized_columns();
            common = Some(match common {
                None => columns,
                Some(existing) => existing
                    .into_iter()
                    .zip(columns)
                    .take_while(|(a, b)| a == b)
                    .map(|(a, _)| a)
                    .collect(),
            });
        }
        match common {
            Some(columns) if !columns.is_empty() => Some(KeyExpression::concat(columns)),
            _ => None,
        }
    }

    /// True when every record type's primary key leads with the type id.
    #[must_use]
    pub fn primary_key_has_record_type_prefix(&self) -> bool {
        !self.record_types.is_empty()
            && self
                .record_types
                .values()
                .all(|record_type| record_type.primary_key().has_record_type_prefix())
    }
}

///
/// MetadataBuilder
/// Teacher-pattern builder: collect record types and indexes, validate on build.
///

#[derive(Debug, Default)]
pub struct MetadataBuilder {
    record_types: BTreeMap<String, RecordTypeModel>,
    indexes: BTreeMap<String, IndexModel>,
}

impl MetadataBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn record_type(mut self, record_type: RecordTypeModel) -> Self {
        self.record_types
            .insert(record_type.name().to_string(), record_type);
        self
    }

    #[must_use]
    pub fn index(mut self, index: IndexModel) -> Self {
        self.indexes.insert(index.name().to_string(), index);
        self
    }

    pub fn build(self) -> Result<MetadataModel, PlannerError> {
        for index in self.indexes.values() {
            index.root().validate_index_key()?;
            for type_name in index.record_types() {
                if !self.record_types.contains_key(type_name) {
                    return Err(PlannerError::metadata(format!(
                        "index '{}' references unknown record type '{type_name}'",
                        index.name()
                    )));
                }
            }
        }
        Ok(MetadataModel {
            record_types: self.record_types,
            indexes: self.indexes,
        })
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn type_with_pk(name: &str, pk: KeyExpression) -> RecordTypeModel {
        RecordTypeModel::new(name, pk)
    }

    #[test]
    fn common_primary_key_is_structural_prefix() {
        let a = type_with_pk(
            "A",
            KeyExpression::concat(vec![
                KeyExpression::RecordTypeKey,
                KeyExpression::field("id"),
            ]),
        );
        let b = type_with_pk(
            "B",
            KeyExpression::concat(vec![
                KeyExpression::RecordTypeKey,
                KeyExpression::field("uuid"),
            ]),
        );
        assert_eq!(
            MetadataModel::common_primary_key([&a, &b]),
            Some(KeyExpression::RecordTypeKey)
        );
        assert_eq!(
            MetadataModel::common_primary_key([&a, &a.clone()]),
            Some(a.primary_key().clone())
        );
    }

    #[test]
    fn common_primary_key_of_disjoint_keys_is_none() {
        let a = type_with_pk("A", KeyExpression::field("id"));
        let b = type_with_pk("B", KeyExpression::field("uuid"));
        assert_eq!(MetadataModel::common_primary_key([&a, &b]), None);
    }

    #[test]
    fn build_rejects_index_on_unknown_type() {
        let result = MetadataModel::builder()
            .record_type(type_with_pk("A", KeyExpression::field("id")))
            .index(
                IndexModel::new("ix", KeyExpression::field("name"))
                    .on_types(vec!["Missing".to_string()]),
            )
            .build();
        assert!(matches!(result, Err(PlannerError::Metadata { .. })));
    }

    #[test]
    fn index_partitions_by_declared_types() {
        let metadata = MetadataModel::builder()
            .record_type(type_with_pk("A", KeyExpression::field("id")))
            .record_type(type_with_pk("B", KeyExpression::field("id")))
            .index(
                IndexModel::new("single", KeyExpression::field("name"))
                    .on_types(vec!["A".to_string()]),
            )
            .index(
                IndexModel::new("multi", KeyExpression::field("name"))
                    .on_types(vec!["A".to_string(), "B".to_string()]),
            )
            .index(IndexModel::new("universal", KeyExpression::Version))
            .build()
            .expect("metadata builds");

        let single: Vec<_> = metadata.indexes_for_type("A").map(IndexModel::name).collect();
        assert_eq!(single, vec!["single"]);
        let multi: Vec<_> = metadata
            .multi_type_indexes_for("B")
            .map(IndexModel::name)
            .collect();
        assert_eq!(multi, vec!["multi"]);
        let universal: Vec<_> = metadata.universal_indexes().map(IndexModel::name).collect();
        assert_eq!(universal, vec!["universal"]);
    }
}
