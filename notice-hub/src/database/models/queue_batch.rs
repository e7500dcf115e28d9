//! Queued notice batch database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A deferred dispatch request stored for out-of-process draining.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NoticeQueueBatchDbModel {
    pub id: String,
    /// JSON-encoded `QueuedBatchPayload`.
    pub payload: String,
    pub created_at: i64,
}

impl NoticeQueueBatchDbModel {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload: payload.into(),
            created_at: crate::database::time::now_ms(),
        }
    }
}
