//! Observation of domain objects.
//!
//! Users register interest in a signal of an object ("tell me when this
//! project is saved"); when the host application fires that signal,
//! every observer is sent the registered notice type.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{error, warn};

use super::dispatch::{Context, DispatchEngine, SendOptions};
use super::permissions::ObjectRef;
use crate::database::models::{ObservedItemDbModel, UserDbModel};
use crate::database::repositories::{NoticeTypeRepository, ObservedItemRepository, UserRepository};
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

/// Signal used when none is given.
pub const DEFAULT_SIGNAL: &str = "post_save";

/// A domain object users can observe.
pub trait Observable: Send + Sync {
    fn content_type(&self) -> &str;

    fn object_id(&self) -> &str;

    /// Value exposed to templates as `observed`.
    fn context_value(&self) -> Value {
        json!({
            "content_type": self.content_type(),
            "object_id": self.object_id(),
        })
    }

    fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.content_type(), self.object_id())
    }
}

impl Observable for ObjectRef {
    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn object_id(&self) -> &str {
        &self.object_id
    }
}

pub struct ObservationRegistry {
    items: Arc<dyn ObservedItemRepository>,
    notice_types: Arc<dyn NoticeTypeRepository>,
    users: Arc<dyn UserRepository>,
    engine: Arc<DispatchEngine>,
}

impl ObservationRegistry {
    pub fn new(
        items: Arc<dyn ObservedItemRepository>,
        notice_types: Arc<dyn NoticeTypeRepository>,
        users: Arc<dyn UserRepository>,
        engine: Arc<DispatchEngine>,
    ) -> Self {
        Self {
            items,
            notice_types,
            users,
            engine,
        }
    }

    /// Register `observer` for `signal` on `object`. Repeated registrations
    /// are stored as separate rows.
    pub async fn observe(
        &self,
        object: &dyn Observable,
        observer: &UserDbModel,
        label: &str,
        signal: &str,
    ) -> Result<ObservedItemDbModel> {
        let notice_type = self
            .notice_types
            .find_by_label(label)
            .await?
            .ok_or_else(|| Error::not_found("NoticeType", label))?;

        let item = ObservedItemDbModel::new(
            &observer.id,
            object.content_type(),
            object.object_id(),
            &notice_type.id,
            signal,
        );
        retry_on_sqlite_busy("create_observed_item", || self.items.create(&item)).await?;
        Ok(item)
    }

    /// Remove the registration; `NotFound` when there is none.
    pub async fn stop_observing(
        &self,
        object: &dyn Observable,
        observer: &UserDbModel,
        signal: &str,
    ) -> Result<()> {
        let found = self
            .items
            .find_for(object.content_type(), object.object_id(), &observer.id, signal)
            .await?;
        if found.is_empty() {
            return Err(Error::not_found(
                "ObservedItem",
                format!("{}/{}/{}", object.object_ref(), observer.id, signal),
            ));
        }
        for item in found {
            retry_on_sqlite_busy("delete_observed_item", || self.items.delete(&item.id)).await?;
        }
        Ok(())
    }

    /// Whether `observer` watches `signal` on `object`. Anonymous observers
    /// never do.
    pub async fn is_observing(
        &self,
        object: &dyn Observable,
        observer: Option<&UserDbModel>,
        signal: &str,
    ) -> Result<bool> {
        let Some(observer) = observer else {
            return Ok(false);
        };
        let found = self
            .items
            .find_for(object.content_type(), object.object_id(), &observer.id, signal)
            .await?;
        Ok(!found.is_empty())
    }

    /// Send each observer of (`object`, `signal`) its notice, adding the
    /// object as `observed` to the context. Returns the registrations
    /// processed; individual dispatch failures are logged.
    pub async fn notify_all(
        &self,
        object: &dyn Observable,
        signal: &str,
        extra_context: &Context,
    ) -> Result<Vec<ObservedItemDbModel>> {
        let items = self
            .items
            .all_for(object.content_type(), object.object_id(), signal)
            .await?;

        let mut context = extra_context.clone();
        context.insert("observed".into(), object.context_value());

        for item in &items {
            if let Err(e) = self.notify(item, &context).await {
                error!(
                    observed_item = %item.id,
                    user_id = %item.user_id,
                    object = %object.object_ref(),
                    signal,
                    error = %e,
                    "Failed to notify observer"
                );
            }
        }
        Ok(items)
    }

    async fn notify(&self, item: &ObservedItemDbModel, context: &Context) -> Result<()> {
        let Some(user) = self.users.find_by_id(&item.user_id).await? else {
            warn!(observed_item = %item.id, user_id = %item.user_id, "Observer no longer exists");
            return Ok(());
        };
        let notice_type = self
            .notice_types
            .find_by_id(&item.notice_type_id)
            .await?
            .ok_or_else(|| Error::not_found("NoticeType", item.notice_type_id.as_str()))?;

        self.engine
            .send_now(&[user], &notice_type.label, context, &SendOptions::default())
            .await?;
        Ok(())
    }
}
