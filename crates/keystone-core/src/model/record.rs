use crate::expr::KeyExpression;
use serde::{Deserialize, Serialize};

///
/// RecordTypeModel
/// One record type: its name and the primary key its records are stored under.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RecordTypeModel {
    name: String,
    primary_key: KeyExpression,
}

impl RecordTypeModel {
    pub fn new(name: impl Into<String>, primary_key: KeyExpression) -> Self {
        Self {
            name: name.into(),
            primary_key,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn primary_key(&self) -> &KeyExpression {
        &self.primary_key
    }
}
