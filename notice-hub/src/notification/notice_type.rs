//! Notice type registration.

use std::sync::Arc;

use tracing::info;

use crate::database::models::NoticeTypeDbModel;
use crate::database::repositories::NoticeTypeRepository;
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

/// What `create_notice_type` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Registry of notice types, keyed by label.
pub struct NoticeTypeService {
    repo: Arc<dyn NoticeTypeRepository>,
}

impl NoticeTypeService {
    pub fn new(repo: Arc<dyn NoticeTypeRepository>) -> Self {
        Self { repo }
    }

    /// Create the notice type, or update it in place if any field differs.
    ///
    /// Meant to run at bootstrap; calling it repeatedly with the same
    /// arguments is a no-op.
    pub async fn create_notice_type(
        &self,
        label: &str,
        display: &str,
        description: &str,
        default: i64,
    ) -> Result<UpsertOutcome> {
        match self.repo.find_by_label(label).await? {
            Some(mut existing) => {
                if existing.display == display
                    && existing.description == description
                    && existing.default == default
                {
                    return Ok(UpsertOutcome::Unchanged);
                }
                existing.display = display.to_string();
                existing.description = description.to_string();
                existing.default = default;
                retry_on_sqlite_busy("update_notice_type", || self.repo.update(&existing)).await?;
                info!(notice_type = label, "Updated notice type");
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let notice_type = NoticeTypeDbModel::new(label, display, description, default);
                retry_on_sqlite_busy("create_notice_type", || self.repo.create(&notice_type))
                    .await?;
                info!(notice_type = label, "Created notice type");
                Ok(UpsertOutcome::Created)
            }
        }
    }

    /// Look up a notice type; unknown labels are `NotFound`.
    pub async fn get_by_label(&self, label: &str) -> Result<NoticeTypeDbModel> {
        self.repo
            .find_by_label(label)
            .await?
            .ok_or_else(|| Error::not_found("NoticeType", label))
    }

    pub async fn list(&self) -> Result<Vec<NoticeTypeDbModel>> {
        self.repo.list().await
    }
}
