//! Observed item database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A subscription of a user to a signal of some domain object.
///
/// The observed object is a polymorphic reference: `content_type` names the
/// kind of object and `object_id` its key within that kind.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ObservedItemDbModel {
    pub id: String,
    pub user_id: String,
    pub content_type: String,
    pub object_id: String,
    pub notice_type_id: String,
    pub added: i64,
    /// Signal name, e.g. `post_save`.
    pub signal: String,
}

impl ObservedItemDbModel {
    pub fn new(
        user_id: impl Into<String>,
        content_type: impl Into<String>,
        object_id: impl Into<String>,
        notice_type_id: impl Into<String>,
        signal: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            content_type: content_type.into(),
            object_id: object_id.into(),
            notice_type_id: notice_type_id.into(),
            added: crate::database::time::now_ms(),
            signal: signal.into(),
        }
    }
}
