//! Notice type database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named category of notification.
///
/// `default` is the sensitivity threshold: a medium is enabled by default
/// when its sensitivity is less than or equal to this number.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct NoticeTypeDbModel {
    pub id: String,
    /// Unique label, e.g. `friends_invite`.
    pub label: String,
    pub display: String,
    pub description: String,
    pub default: i64,
}

impl NoticeTypeDbModel {
    pub fn new(
        label: impl Into<String>,
        display: impl Into<String>,
        description: impl Into<String>,
        default: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            display: display.into(),
            description: description.into(),
            default,
        }
    }
}

impl std::fmt::Display for NoticeTypeDbModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}
