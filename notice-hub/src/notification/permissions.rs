//! Object-scoped notification overrides.
//!
//! A user holding [`CUSTOM_SETTINGS_PERMISSION`] on an object has their
//! per-medium decision for notices about that object taken from object
//! permissions named `"{Medium}-{label}"` instead of their stored preference.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::database::repositories::ObjectPermissionRepository;

/// Permission that enables per-object notification settings.
pub const CUSTOM_SETTINGS_PERMISSION: &str = "custom_notification_settings";

/// Polymorphic reference to a domain object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub content_type: String,
    pub object_id: String,
}

impl ObjectRef {
    pub fn new(content_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_type, self.object_id)
    }
}

/// Per-object permission predicate.
#[async_trait]
pub trait ObjectPermissionCheck: Send + Sync {
    async fn has(&self, permission: &str, object: &ObjectRef, user_id: &str) -> Result<bool>;
}

/// `ObjectPermissionCheck` backed by the `object_permission` table.
pub struct SqlxObjectPermissionCheck {
    repo: Arc<dyn ObjectPermissionRepository>,
}

impl SqlxObjectPermissionCheck {
    pub fn new(repo: Arc<dyn ObjectPermissionRepository>) -> Self {
        Self { repo }
    }

    pub async fn grant(&self, permission: &str, object: &ObjectRef, user_id: &str) -> Result<()> {
        self.repo
            .grant(user_id, permission, &object.content_type, &object.object_id)
            .await
    }

    pub async fn revoke(&self, permission: &str, object: &ObjectRef, user_id: &str) -> Result<()> {
        self.repo
            .revoke(user_id, permission, &object.content_type, &object.object_id)
            .await
    }
}

#[async_trait]
impl ObjectPermissionCheck for SqlxObjectPermissionCheck {
    async fn has(&self, permission: &str, object: &ObjectRef, user_id: &str) -> Result<bool> {
        self.repo
            .exists(user_id, permission, &object.content_type, &object.object_id)
            .await
    }
}
