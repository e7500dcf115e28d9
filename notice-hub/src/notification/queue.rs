//! Deferred delivery.
//!
//! `DispatchEngine::queue` stores a batch of notices as one JSON row;
//! [`QueueDrainer`] later replays each entry through `send_now`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatch::{Context, DispatchEngine, SendOptions};
use crate::database::models::{NoticeQueueBatchDbModel, UserDbModel};
use crate::database::repositories::{QueueBatchRepository, UserRepository};
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

/// Current payload schema version.
pub const PAYLOAD_VERSION: u32 = 1;

/// Who a notice goes to: loaded users or bare ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    Users(Vec<UserDbModel>),
    Ids(Vec<String>),
}

impl Recipients {
    pub fn into_ids(self) -> Vec<String> {
        match self {
            Self::Users(users) => users.into_iter().map(|u| u.id).collect(),
            Self::Ids(ids) => ids,
        }
    }
}

impl From<Vec<UserDbModel>> for Recipients {
    fn from(users: Vec<UserDbModel>) -> Self {
        Self::Users(users)
    }
}

impl From<Vec<String>> for Recipients {
    fn from(ids: Vec<String>) -> Self {
        Self::Ids(ids)
    }
}

/// One deferred notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedNotice {
    pub user_id: String,
    pub label: String,
    pub context: Context,
    pub on_site: bool,
    pub sender_id: Option<String>,
}

/// Stored form of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedBatchPayload {
    pub version: u32,
    pub notices: Vec<QueuedNotice>,
}

impl QueuedBatchPayload {
    pub fn new(notices: Vec<QueuedNotice>) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            notices,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> Result<Self> {
        let decoded: Self = serde_json::from_str(payload)?;
        if decoded.version != PAYLOAD_VERSION {
            return Err(Error::validation(format!(
                "unsupported queued batch version {}",
                decoded.version
            )));
        }
        Ok(decoded)
    }
}

/// Store of pending batches.
pub struct DeferredQueue {
    repo: Arc<dyn QueueBatchRepository>,
}

impl DeferredQueue {
    pub fn new(repo: Arc<dyn QueueBatchRepository>) -> Self {
        Self { repo }
    }

    /// Persist the notices as one batch and return its id.
    pub async fn enqueue(&self, notices: Vec<QueuedNotice>) -> Result<String> {
        let count = notices.len();
        let batch = NoticeQueueBatchDbModel::new(QueuedBatchPayload::new(notices).encode()?);
        retry_on_sqlite_busy("enqueue_notice_batch", || self.repo.create(&batch)).await?;
        debug!(batch_id = %batch.id, notices = count, "Queued notice batch");
        Ok(batch.id)
    }

    /// Pending batches, oldest first.
    pub async fn pending(&self) -> Result<Vec<NoticeQueueBatchDbModel>> {
        self.repo.list().await
    }

    pub async fn remove(&self, batch_id: &str) -> Result<()> {
        retry_on_sqlite_busy("delete_notice_batch", || self.repo.delete(batch_id)).await
    }
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub batches: usize,
    pub notices: usize,
    pub failed_batches: usize,
}

/// Replays queued batches.
pub struct QueueDrainer {
    engine: Arc<DispatchEngine>,
    users: Arc<dyn UserRepository>,
}

impl QueueDrainer {
    pub fn new(engine: Arc<DispatchEngine>, users: Arc<dyn UserRepository>) -> Self {
        Self { engine, users }
    }

    /// Send every pending batch in insertion order.
    ///
    /// A batch is deleted once all its entries were dispatched. A batch that
    /// fails (bad payload, unknown label, rendering error) is kept and the
    /// pass moves on to the next one.
    pub async fn drain(&self) -> Result<DrainStats> {
        let queue = self.engine.deferred_queue();
        let mut stats = DrainStats::default();

        for batch in queue.pending().await? {
            match self.drain_batch(&batch).await {
                Ok(notices) => {
                    queue.remove(&batch.id).await?;
                    stats.batches += 1;
                    stats.notices += notices;
                }
                Err(e) => {
                    error!(
                        batch_id = %batch.id,
                        error = %e,
                        "Failed to drain notice batch, keeping it"
                    );
                    stats.failed_batches += 1;
                }
            }
        }

        if stats.batches > 0 || stats.failed_batches > 0 {
            info!(
                batches = stats.batches,
                notices = stats.notices,
                failed = stats.failed_batches,
                "Drained notice queue"
            );
        }
        Ok(stats)
    }

    async fn drain_batch(&self, batch: &NoticeQueueBatchDbModel) -> Result<usize> {
        let payload = QueuedBatchPayload::decode(&batch.payload)?;
        let mut sent = 0;

        for notice in &payload.notices {
            let Some(user) = self.users.find_by_id(&notice.user_id).await? else {
                warn!(
                    batch_id = %batch.id,
                    user_id = %notice.user_id,
                    "Queued notice for unknown user, skipping"
                );
                continue;
            };

            let sender = match &notice.sender_id {
                Some(id) => {
                    let sender = self.users.find_by_id(id).await?;
                    if sender.is_none() {
                        warn!(
                            batch_id = %batch.id,
                            sender_id = %id,
                            "Queued notice sender no longer exists"
                        );
                    }
                    sender
                }
                None => None,
            };

            let options = SendOptions {
                on_site: notice.on_site,
                sender,
                ..SendOptions::default()
            };
            self.engine
                .send_now(&[user], &notice.label, &notice.context, &options)
                .await?;
            sent += 1;
        }

        Ok(sent)
    }

    /// Drain every `interval` until cancelled.
    pub async fn run(&self, interval: Duration, cancel_token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Queue drainer shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.drain().await {
                        warn!(error = %e, "Queue drain pass failed");
                    }
                }
            }
        }
    }
}
