use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

///
/// Value
///
/// Comparison literal carried inside query predicates and scan bounds.
///
/// Values have a canonical total order (variant tag first, payload second) so
/// that planner output, IN-source ordering, and explain renderings are pure
/// functions of their inputs.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Text(String),
    Bytes(Vec<u8>),
    /// Ordered list of values; element order is preserved.
    List(Vec<Self>),
}

impl Value {
    /// Variant tag used as the major key of the canonical order.
    #[must_use]
    const fn tag(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Uint(_) => 3,
            Self::Text(_) => 4,
            Self::Bytes(_) => 5,
            Self::List(_) => 6,
        }
    }

    /// Total order over all values, across variants.
    #[must_use]
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(left), Self::Bool(right)) => left.cmp(right),
            (Self::Int(left), Self::Int(right)) => left.cmp(right),
            (Self::Uint(left), Self::Uint(right)) => left.cmp(right),
            (Self::Text(left), Self::Text(right)) => left.cmp(right),
            (Self::Bytes(left), Self::Bytes(right)) => left.cmp(right),
            (Self::List(left), Self::List(right)) => {
                for (l, r) in left.iter().zip(right.iter()) {
                    match l.canonical_cmp(r) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                }
                left.len().cmp(&right.len())
            }
            _ => self.tag().cmp(&other.tag()),
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => {
                write!(f, "0x")?;
                for byte in v {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_cmp_orders_within_variant() {
        assert_eq!(
            Value::Int(1).canonical_cmp(&Value::Int(2)),
            Ordering::Less
        );
        assert_eq!(
            Value::Text("b".into()).canonical_cmp(&Value::Text("a".into())),
            Ordering::Greater
        );
    }

    #[test]
    fn canonical_cmp_orders_across_variants_by_tag() {
        assert_eq!(
            Value::Null.canonical_cmp(&Value::Bool(false)),
            Ordering::Less
        );
        assert_eq!(
            Value::Uint(0).canonical_cmp(&Value::Int(i64::MAX)),
            Ordering::Greater
        );
    }

    #[test]
    fn canonical_cmp_list_is_lexicographic() {
        let shorter = Value::List(vec![Value::Int(1)]);
        let longer = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(shorter.canonical_cmp(&longer), Ordering::Less);
        assert_eq!(longer.canonical_cmp(&shorter), Ordering::Greater);
    }
}
