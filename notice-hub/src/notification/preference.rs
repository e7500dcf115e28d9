//! Per-user notification preferences.

use std::sync::Arc;

use tracing::debug;

use super::medium::Medium;
use super::permissions::{CUSTOM_SETTINGS_PERMISSION, ObjectPermissionCheck, ObjectRef};
use crate::database::models::{NoticeSettingDbModel, NoticeTypeDbModel, UserDbModel};
use crate::database::repositories::PreferenceRepository;
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

/// Resolves whether a user wants a notice type through a medium.
///
/// Rows are materialised lazily on first lookup with the medium's default.
pub struct PreferenceStore {
    repo: Arc<dyn PreferenceRepository>,
    permissions: Option<Arc<dyn ObjectPermissionCheck>>,
}

impl PreferenceStore {
    pub fn new(repo: Arc<dyn PreferenceRepository>) -> Self {
        Self {
            repo,
            permissions: None,
        }
    }

    /// Enable object-scoped overrides.
    pub fn with_permission_check(mut self, check: Arc<dyn ObjectPermissionCheck>) -> Self {
        self.permissions = Some(check);
        self
    }

    /// Stored preference, created with the default if absent.
    ///
    /// Concurrent first lookups race on the unique key; the loser re-reads
    /// the winner's row.
    pub async fn get(
        &self,
        user: &UserDbModel,
        notice_type: &NoticeTypeDbModel,
        medium: Medium,
    ) -> Result<NoticeSettingDbModel> {
        if let Some(setting) = self.find(user, notice_type, medium).await? {
            return Ok(setting);
        }

        let setting = NoticeSettingDbModel::new(
            &user.id,
            &notice_type.id,
            medium.code(),
            medium.default_send(notice_type.default),
        );
        match retry_on_sqlite_busy("create_notice_setting", || self.repo.create(&setting)).await {
            Ok(()) => Ok(setting),
            Err(Error::Duplicate { .. }) => {
                debug!(
                    user_id = %user.id,
                    notice_type = %notice_type.label,
                    medium = %medium,
                    "Lost preference creation race, re-reading"
                );
                self.find(user, notice_type, medium).await?.ok_or_else(|| {
                    Error::not_found(
                        "NoticeSetting",
                        format!("{}/{}/{}", user.id, notice_type.id, medium.code()),
                    )
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn find(
        &self,
        user: &UserDbModel,
        notice_type: &NoticeTypeDbModel,
        medium: Medium,
    ) -> Result<Option<NoticeSettingDbModel>> {
        self.repo
            .find(&user.id, &notice_type.id, medium.code())
            .await
    }

    /// Explicitly store a preference.
    pub async fn set(
        &self,
        user: &UserDbModel,
        notice_type: &NoticeTypeDbModel,
        medium: Medium,
        send: bool,
    ) -> Result<NoticeSettingDbModel> {
        let mut setting = self.get(user, notice_type, medium).await?;
        if setting.send != send {
            retry_on_sqlite_busy("update_notice_setting", || {
                self.repo.set_send(&setting.id, send)
            })
            .await?;
            setting.send = send;
        }
        Ok(setting)
    }

    /// All stored preferences of a user; nothing is created.
    pub async fn list_all(&self, user: &UserDbModel) -> Result<Vec<NoticeSettingDbModel>> {
        self.repo.list_for_user(&user.id).await
    }

    pub async fn should_send(
        &self,
        user: &UserDbModel,
        notice_type: &NoticeTypeDbModel,
        medium: Medium,
        target: Option<&ObjectRef>,
    ) -> Result<bool> {
        if let (Some(check), Some(object)) = (&self.permissions, target)
            && check
                .has(CUSTOM_SETTINGS_PERMISSION, object, &user.id)
                .await?
        {
            return check
                .has(&medium.permission_name(&notice_type.label), object, &user.id)
                .await;
        }
        Ok(self.get(user, notice_type, medium).await?.send)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::{
        NoticeTypeRepository, SqlxNoticeTypeRepository, SqlxObjectPermissionRepository,
        SqlxPreferenceRepository, SqlxUserRepository, UserRepository,
    };
    use crate::database::test_pool;
    use crate::notification::permissions::SqlxObjectPermissionCheck;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn fixtures(pool: &sqlx::SqlitePool) -> (UserDbModel, NoticeTypeDbModel) {
        let user = UserDbModel::new("alice").with_email("alice@example.com");
        SqlxUserRepository::new(pool.clone())
            .create(&user)
            .await
            .unwrap();
        let nt = NoticeTypeDbModel::new("welcome", "Welcome", "Welcome message", 2);
        SqlxNoticeTypeRepository::new(pool.clone())
            .create(&nt)
            .await
            .unwrap();
        (user, nt)
    }

    #[tokio::test]
    async fn test_get_materialises_default() {
        let pool = test_pool().await;
        let (user, nt) = fixtures(&pool).await;
        let store = PreferenceStore::new(Arc::new(SqlxPreferenceRepository::new(pool.clone())));

        assert!(store.list_all(&user).await.unwrap().is_empty());

        assert!(store.get(&user, &nt, Medium::Email).await.unwrap().send);
        assert!(!store.get(&user, &nt, Medium::Display).await.unwrap().send);
        assert!(!store.get(&user, &nt, Medium::Sms).await.unwrap().send);

        // Second lookup returns the stored row, not a new one.
        let again = store.get(&user, &nt, Medium::Email).await.unwrap();
        let all = store.list_all(&user).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().any(|s| s.id == again.id));
    }

    #[tokio::test]
    async fn test_set_overrides_default() {
        let pool = test_pool().await;
        let (user, nt) = fixtures(&pool).await;
        let store = PreferenceStore::new(Arc::new(SqlxPreferenceRepository::new(pool.clone())));

        store.set(&user, &nt, Medium::Sms, true).await.unwrap();
        assert!(store.should_send(&user, &nt, Medium::Sms, None).await.unwrap());
    }

    /// Reports "absent" on the first lookup so the store inserts after the
    /// competing writer already did.
    struct RacingRepository {
        inner: SqlxPreferenceRepository,
        hide_once: AtomicBool,
    }

    #[async_trait]
    impl PreferenceRepository for RacingRepository {
        async fn find(
            &self,
            user_id: &str,
            notice_type_id: &str,
            medium: &str,
        ) -> Result<Option<NoticeSettingDbModel>> {
            if self.hide_once.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find(user_id, notice_type_id, medium).await
        }

        async fn create(&self, setting: &NoticeSettingDbModel) -> Result<()> {
            self.inner.create(setting).await
        }

        async fn set_send(&self, id: &str, send: bool) -> Result<()> {
            self.inner.set_send(id, send).await
        }

        async fn list_for_user(&self, user_id: &str) -> Result<Vec<NoticeSettingDbModel>> {
            self.inner.list_for_user(user_id).await
        }
    }

    #[tokio::test]
    async fn test_lost_race_rereads_winner() {
        let pool = test_pool().await;
        let (user, nt) = fixtures(&pool).await;

        // The winner stored a non-default value first.
        let winner = NoticeSettingDbModel::new(&user.id, &nt.id, Medium::Email.code(), false);
        SqlxPreferenceRepository::new(pool.clone())
            .create(&winner)
            .await
            .unwrap();

        let store = PreferenceStore::new(Arc::new(RacingRepository {
            inner: SqlxPreferenceRepository::new(pool.clone()),
            hide_once: AtomicBool::new(true),
        }));

        let setting = store.get(&user, &nt, Medium::Email).await.unwrap();
        assert_eq!(setting.id, winner.id);
        assert!(!setting.send);
        assert_eq!(store.list_all(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_object_override() {
        let pool = test_pool().await;
        let (user, nt) = fixtures(&pool).await;
        let check = Arc::new(SqlxObjectPermissionCheck::new(Arc::new(
            SqlxObjectPermissionRepository::new(pool.clone()),
        )));
        let store = PreferenceStore::new(Arc::new(SqlxPreferenceRepository::new(pool.clone())))
            .with_permission_check(check.clone());
        let project = ObjectRef::new("project", "1");

        // No custom permission: the stored default applies.
        assert!(
            store
                .should_send(&user, &nt, Medium::Email, Some(&project))
                .await
                .unwrap()
        );

        // Custom settings without the medium permission disable email.
        check
            .grant(CUSTOM_SETTINGS_PERMISSION, &project, &user.id)
            .await
            .unwrap();
        assert!(
            !store
                .should_send(&user, &nt, Medium::Email, Some(&project))
                .await
                .unwrap()
        );

        check.grant("SMS-welcome", &project, &user.id).await.unwrap();
        assert!(
            store
                .should_send(&user, &nt, Medium::Sms, Some(&project))
                .await
                .unwrap()
        );

        // Without a target the global preference is used.
        assert!(!store.should_send(&user, &nt, Medium::Sms, None).await.unwrap());
    }
}
