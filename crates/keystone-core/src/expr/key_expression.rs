use crate::error::PlannerError;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// FanType
///
/// How a repeated field contributes to an index key.
///
/// `None` emits the single value, `FanOut` emits one key per element, and
/// `Concatenate` emits the whole list as a single column. A concatenated
/// column is never sortable.
///

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum FanType {
    #[default]
    None,
    FanOut,
    Concatenate,
}

///
/// KeyExpression
///
/// Tree of key-building primitives. An index's root expression describes the
/// prefix-ordered columns of its entries; a query's sort is expressed in the
/// same vocabulary so the planner can match one against the other.
///
/// Invariants:
/// - `Then` never directly nests a `Then`; `concat` flattens on build.
/// - `Grouping` appears only as the top expression of an index.
/// - A `Field` with `FanType::Concatenate` is not sortable.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum KeyExpression {
    /// A top-level field of the record.
    Field { name: String, fan: FanType },
    /// Descend into a submessage field and key by the child expression.
    Nesting {
        parent: String,
        parent_fan: FanType,
        child: Box<KeyExpression>,
    },
    /// Ordered concatenation of child keys.
    Then(Vec<KeyExpression>),
    /// The first `grouped_count` columns of `whole` are the group prefix; the
    /// remaining columns are the grouped (scored) value.
    Grouping {
        whole: Box<KeyExpression>,
        grouped_count: usize,
    },
    /// Only the first `split_point` columns are indexed; the suffix is stored
    /// in the entry's value and remains available without a record fetch.
    KeyWithValue {
        key: Box<KeyExpression>,
        split_point: usize,
    },
    /// Synthetic leading column holding the record type id.
    RecordTypeKey,
    /// The record's commit version.
    Version,
    /// Matches nothing.
    Empty,
}

impl KeyExpression {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            fan: FanType::None,
        }
    }

    pub fn field_fan(name: impl Into<String>, fan: FanType) -> Self {
        Self::Field {
            name: name.into(),
            fan,
        }
    }

    pub fn nest(parent: impl Into<String>, child: Self) -> Self {
        Self::Nesting {
            parent: parent.into(),
            parent_fan: FanType::None,
            child: Box::new(child),
        }
    }

    pub fn nest_fan(parent: impl Into<String>, parent_fan: FanType, child: Self) -> Self {
        Self::Nesting {
            parent: parent.into(),
            parent_fan,
            child: Box::new(child),
        }
    }

    /// Concatenate keys, flattening nested `Then`s and dropping `Empty`s.
    #[must_use]
    pub fn concat(children: Vec<Self>) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Self::Then(grandchildren) => flat.extend(grandchildren),
                Self::Empty => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::Empty,
            1 => flat.into_iter().next().unwrap_or(Self::Empty),
            _ => Self::Then(flat),
        }
    }

    #[must_use]
    pub fn grouping(whole: Self, grouped_count: usize) -> Self {
        Self::Grouping {
            whole: Box::new(whole),
            grouped_count,
        }
    }

    #[must_use]
    pub fn key_with_value(key: Self, split_point: usize) -> Self {
        Self::KeyWithValue {
            key: Box::new(key),
            split_point,
        }
    }

    /// Number of columns this expression contributes to a key.
    #[must_use]
    pub fn column_size(&self) -> usize {
        match self {
            Self::Field { .. } | Self::RecordTypeKey | Self::Version => 1,
            Self::Nesting { child, .. } => child.column_size(),
            Self::Then(children) => children.iter().map(Self::column_size).sum(),
            Self::Grouping { whole, .. } => whole.column_size(),
            Self::KeyWithValue { key, split_point } => key.column_size().min(*split_point),
            Self::Empty => 0,
        }
    }

    /// True when evaluating this key can emit more than one entry per record.
    #[must_use]
    pub fn creates_duplicates(&self) -> bool {
        match self {
            Self::Field { fan, .. } => *fan == FanType::FanOut,
            Self::Nesting {
                parent_fan, child, ..
            } => *parent_fan == FanType::FanOut || child.creates_duplicates(),
            Self::Then(children) => children.iter().any(Self::creates_duplicates),
            Self::Grouping { whole, .. } => whole.creates_duplicates(),
            Self::KeyWithValue { key, .. } => key.creates_duplicates(),
            Self::RecordTypeKey | Self::Version | Self::Empty => false,
        }
    }

    /// True when any column at or after `column` can emit duplicates.
    ///
    /// A record whose repeated field is empty has no entry at all for such a
    /// column, so scans that leave it unconstrained may miss records.
    #[must_use]
    pub fn creates_duplicates_after(&self, column: usize) -> bool {
        self.normalized_columns()
            .iter()
            .skip(column)
            .any(Self::creates_duplicates)
    }

    /// Positional normalization: one entry per key column, with `Nesting`
    /// distributed over `Then` so each column is a self-contained expression.
    #[must_use]
    pub fn normalized_columns(&self) -> Vec<Self> {
        match self {
            Self::Field { .. } | Self::RecordTypeKey | Self::Version => vec![self.clone()],
            Self::Nesting {
                parent,
                parent_fan,
                child,
            } => child
                .normalized_columns()
                .into_iter()
                .map(|column| Self::Nesting {
                    parent: parent.clone(),
                    parent_fan: *parent_fan,
                    child: Box::new(column),
                })
                .collect(),
            Self::Then(children) => children
                .iter()
                .flat_map(Self::normalized_columns)
                .collect(),
            Self::Grouping { whole, .. } => whole.normalized_columns(),
            Self::KeyWithValue { key, split_point } => {
                let mut columns = key.normalized_columns();
                columns.truncate(*split_point);
                columns
            }
            Self::Empty => Vec::new(),
        }
    }

    /// Column-wise prefix test: is this key a (strict or full) prefix of `other`?
    #[must_use]
    pub fn is_prefix_key(&self, other: &Self) -> bool {
        let own = self.normalized_columns();
        let theirs = other.normalized_columns();
        own.len() <= theirs.len() && own.iter().zip(theirs.iter()).all(|(a, b)| a == b)
    }

    /// First key column is the record type id.
    #[must_use]
    pub fn has_record_type_prefix(&self) -> bool {
        self.normalized_columns()
            .first()
            .is_some_and(|column| matches!(column, Self::RecordTypeKey))
    }

    /// The group prefix of a `Grouping`, as a key of its own.
    #[must_use]
    pub fn grouping_sub_key(&self) -> Option<Self> {
        match self {
            Self::Grouping {
                whole,
                grouped_count,
            } => {
                let mut columns = whole.normalized_columns();
                columns.truncate(*grouped_count);
                Some(Self::concat(columns))
            }
            _ => None,
        }
    }

    /// The full underlying key of a `Grouping`, or the expression itself.
    #[must_use]
    pub fn whole_key(&self) -> &Self {
        match self {
            Self::Grouping { whole, .. } => whole,
            other => other,
        }
    }

    /// Merge-key concatenation that skips columns already present.
    #[must_use]
    pub fn concat_without_duplicates(&self, other: &Self) -> Self {
        let mut columns = self.normalized_columns();
        for column in other.normalized_columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        Self::concat(columns)
    }

    /// Static validation of an index root expression.
    pub fn validate_index_key(&self) -> Result<(), PlannerError> {
        self.validate_inner(true)
    }

    /// Validation of a requested sort key. Concatenated columns and grouping
    /// wrappers are not sortable shapes.
    pub fn validate_sort_key(&self) -> Result<(), PlannerError> {
        for column in self.normalized_columns() {
            if let Self::Field {
                name,
                fan: FanType::Concatenate,
            } = &column
            {
                return Err(PlannerError::invalid_expression(format!(
                    "sorting by concatenated field '{name}' is not supported"
                )));
            }
        }
        Ok(())
    }

    fn validate_inner(&self, top: bool) -> Result<(), PlannerError> {
        match self {
            Self::Field { .. } | Self::RecordTypeKey | Self::Version | Self::Empty => Ok(()),
            Self::Nesting { child, .. } => child.validate_inner(false),
            Self::Then(children) => {
                for child in children {
                    if matches!(child, Self::Then(_)) {
                        return Err(PlannerError::invalid_expression(
                            "Then may not directly nest a Then; flatten on build",
                        ));
                    }
                    child.validate_inner(false)?;
                }
                Ok(())
            }
            Self::Grouping {
                whole,
                grouped_count,
            } => {
                if !top {
                    return Err(PlannerError::invalid_expression(
                        "Grouping is only valid as a top-level index expression",
                    ));
                }
                if *grouped_count > whole.column_size() {
                    return Err(PlannerError::invalid_expression(
                        "Grouping prefix exceeds the column size of its key",
                    ));
                }
                whole.validate_inner(false)
            }
            Self::KeyWithValue { key, split_point } => {
                if *split_point > key.column_size() {
                    return Err(PlannerError::invalid_expression(
                        "KeyWithValue split point exceeds the column size of its key",
                    ));
                }
                key.validate_inner(false)
            }
        }
    }
}

impl fmt::Display for KeyExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { name, fan } => match fan {
                FanType::None => write!(f, "{name}"),
                FanType::FanOut => write!(f, "{name}[*]"),
                FanType::Concatenate => write!(f, "{name}[]"),
            },
            Self::Nesting { parent, child, .. } => write!(f, "{parent}.{child}"),
            Self::Then(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            Self::Grouping {
                whole,
                grouped_count,
            } => write!(f, "group({whole}, {grouped_count})"),
            Self::KeyWithValue { key, split_point } => {
                write!(f, "key_with_value({key}, {split_point})")
            }
            Self::RecordTypeKey => write!(f, "record_type()"),
            Self::Version => write!(f, "version()"),
            Self::Empty => write!(f, "empty()"),
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn name_age() -> KeyExpression {
        KeyExpression::concat(vec![
            KeyExpression::field("name"),
            KeyExpression::field("age"),
        ])
    }

    #[test]
    fn concat_flattens_nested_thens() {
        let key = KeyExpression::concat(vec![
            name_age(),
            KeyExpression::field("city"),
            KeyExpression::Empty,
        ]);
        let KeyExpression::Then(children) = &key else {
            panic!("expected Then");
        };
        assert_eq!(children.len(), 3);
        assert!(key.validate_index_key().is_ok());
    }

    #[test]
    fn concat_of_one_is_the_child() {
        assert_eq!(
            KeyExpression::concat(vec![KeyExpression::field("name")]),
            KeyExpression::field("name")
        );
    }

    #[test]
    fn column_size_counts_normalized_positions() {
        let key = KeyExpression::concat(vec![
            KeyExpression::RecordTypeKey,
            KeyExpression::nest(
                "address",
                KeyExpression::concat(vec![
                    KeyExpression::field("city"),
                    KeyExpression::field("zip"),
                ]),
            ),
        ]);
        assert_eq!(key.column_size(), 3);
        assert_eq!(key.normalized_columns().len(), 3);
    }

    #[test]
    fn nesting_distributes_over_then_in_normalization() {
        let key = KeyExpression::nest(
            "address",
            KeyExpression::concat(vec![
                KeyExpression::field("city"),
                KeyExpression::field("zip"),
            ]),
        );
        let columns = key.normalized_columns();
        assert_eq!(
            columns,
            vec![
                KeyExpression::nest("address", KeyExpression::field("city")),
                KeyExpression::nest("address", KeyExpression::field("zip")),
            ]
        );
    }

    #[test]
    fn fan_out_creates_duplicates() {
        let key = KeyExpression::concat(vec![
            KeyExpression::field("name"),
            KeyExpression::field_fan("tags", FanType::FanOut),
        ]);
        assert!(key.creates_duplicates());
        assert!(!key.creates_duplicates_after(2));
        assert!(key.creates_duplicates_after(1));
    }

    #[test]
    fn prefix_key_is_column_wise() {
        let sort = KeyExpression::field("name");
        assert!(sort.is_prefix_key(&name_age()));
        assert!(!KeyExpression::field("age").is_prefix_key(&name_age()));
        assert!(name_age().is_prefix_key(&name_age()));
    }

    #[test]
    fn key_with_value_indexes_only_the_prefix() {
        let key = KeyExpression::key_with_value(name_age(), 1);
        assert_eq!(key.column_size(), 1);
        assert_eq!(key.normalized_columns(), vec![KeyExpression::field("name")]);
    }

    #[test]
    fn grouping_sub_key_takes_the_prefix() {
        let key = KeyExpression::grouping(name_age(), 1);
        assert_eq!(
            key.grouping_sub_key(),
            Some(KeyExpression::field("name"))
        );
        assert_eq!(key.whole_key(), &name_age());
    }

    #[test]
    fn grouping_below_top_is_rejected() {
        let key = KeyExpression::Then(vec![
            KeyExpression::grouping(KeyExpression::field("a"), 1),
            KeyExpression::field("b"),
        ]);
        assert!(key.validate_index_key().is_err());
    }

    #[test]
    fn concatenate_sort_is_rejected() {
        let sort = KeyExpression::field_fan("tags", FanType::Concatenate);
        assert!(sort.validate_sort_key().is_err());
        assert!(KeyExpression::field("name").validate_sort_key().is_ok());
    }

    #[test]
    fn concat_without_duplicates_skips_shared_columns() {
        let merged = KeyExpression::field("age").concat_without_duplicates(&name_age());
        assert_eq!(
            merged.normalized_columns(),
            vec![KeyExpression::field("age"), KeyExpression::field("name")]
        );
    }
}
