use crate::{
    expr::KeyExpression,
    query::comparison::Comparison,
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// QueryComponent
///
/// Boolean predicate tree of a query. Leaves compare a field, a repeated
/// field's elements, a record function, the record-type column, or an
/// arbitrary key expression; inner nodes combine components.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum QueryComponent {
    And(Vec<QueryComponent>),
    Or(Vec<QueryComponent>),
    Not(Box<QueryComponent>),
    /// `field <comparison>`
    Field {
        field: String,
        comparison: Comparison,
    },
    /// Any element of the repeated `field` satisfies the comparison.
    OneOfThem {
        field: String,
        comparison: Comparison,
    },
    /// Descend into the submessage `field` and apply the child component.
    Nested {
        field: String,
        child: Box<QueryComponent>,
    },
    /// Any element of the repeated submessage `field` satisfies the child.
    OneOfThemComponent {
        field: String,
        child: Box<QueryComponent>,
    },
    /// `function(record) <comparison>` (rank, version).
    RecordFunction {
        function: QueryFunction,
        comparison: Comparison,
    },
    /// Comparison on the synthetic record-type column.
    RecordTypeKey { comparison: Comparison },
    /// Comparison against an arbitrary key expression's evaluation.
    KeyExpressionComparison {
        key: KeyExpression,
        comparison: Comparison,
    },
}

impl QueryComponent {
    #[must_use]
    pub fn and(children: Vec<Self>) -> Self {
        Self::And(children)
    }

    #[must_use]
    pub fn or(children: Vec<Self>) -> Self {
        Self::Or(children)
    }

    #[expect(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(child: Self) -> Self {
        Self::Not(Box::new(child))
    }

    pub fn field_cmp(field: impl Into<String>, comparison: Comparison) -> Self {
        Self::Field {
            field: field.into(),
            comparison,
        }
    }

    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field_cmp(field, Comparison::Equals(value.into()))
    }

    pub fn field_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::field_cmp(field, Comparison::In(values))
    }

    pub fn one_of_them(field: impl Into<String>, comparison: Comparison) -> Self {
        Self::OneOfThem {
            field: field.into(),
            comparison,
        }
    }

    pub fn nested(field: impl Into<String>, child: Self) -> Self {
        Self::Nested {
            field: field.into(),
            child: Box::new(child),
        }
    }

    pub fn one_of_them_component(field: impl Into<String>, child: Self) -> Self {
        Self::OneOfThemComponent {
            field: field.into(),
            child: Box::new(child),
        }
    }

    #[must_use]
    pub fn version_cmp(comparison: Comparison) -> Self {
        Self::RecordFunction {
            function: QueryFunction::Version,
            comparison,
        }
    }

    #[must_use]
    pub fn rank_cmp(group: KeyExpression, comparison: Comparison) -> Self {
        Self::RecordFunction {
            function: QueryFunction::Rank { group },
            comparison,
        }
    }

    /// Leaf over exactly one top-level field. Gates OR distribution.
    #[must_use]
    pub const fn is_single_field_comparison(&self) -> bool {
        matches!(self, Self::Field { .. } | Self::OneOfThem { .. })
    }

    /// The AND children, or the component itself as a one-element list.
    #[must_use]
    pub fn conjuncts(&self) -> Vec<Self> {
        match self {
            Self::And(children) => children.clone(),
            other => vec![other.clone()],
        }
    }

    /// Number of field-comparison leaves. Used as a plan-quality tie-break
    /// between an IN-join and its OR expansion.
    #[must_use]
    pub fn field_comparison_count(&self) -> usize {
        match self {
            Self::And(children) | Self::Or(children) => {
                children.iter().map(Self::field_comparison_count).sum()
            }
            Self::Not(child) => child.field_comparison_count(),
            Self::Nested { child, .. } | Self::OneOfThemComponent { child, .. } => {
                child.field_comparison_count()
            }
            Self::Field { .. } | Self::OneOfThem { .. } => 1,
            Self::RecordFunction { .. }
            | Self::RecordTypeKey { .. }
            | Self::KeyExpressionComparison { .. } => 0,
        }
    }
}

impl fmt::Display for QueryComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(children) => write_joined(f, "And", children),
            Self::Or(children) => write_joined(f, "Or", children),
            Self::Not(child) => write!(f, "Not({child})"),
            Self::Field { field, comparison } => write!(f, "{field} {comparison}"),
            Self::OneOfThem { field, comparison } => write!(f, "one of {field} {comparison}"),
            Self::Nested { field, child } => write!(f, "{field}/{{{child}}}"),
            Self::OneOfThemComponent { field, child } => {
                write!(f, "one of {field}/{{{child}}}")
            }
            Self::RecordFunction {
                function,
                comparison,
            } => write!(f, "{function} {comparison}"),
            Self::RecordTypeKey { comparison } => write!(f, "record_type() {comparison}"),
            Self::KeyExpressionComparison { key, comparison } => {
                write!(f, "{key} {comparison}")
            }
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    children: &[QueryComponent],
) -> fmt::Result {
    write!(f, "{label}(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{child}")?;
    }
    write!(f, ")")
}

///
/// QueryFunction
/// Record functions that can appear on the left side of a comparison.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum QueryFunction {
    /// The record's commit version.
    Version,
    /// The record's ordinal within the rank index grouped by `group`.
    Rank { group: KeyExpression },
}

impl fmt::Display for QueryFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version => write!(f, "version()"),
            Self::Rank { group } => write!(f, "rank({group})"),
        }
    }
}
