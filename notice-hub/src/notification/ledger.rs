//! Notice ledger: the history of notices sent to and by users.

use std::sync::Arc;

use crate::Result;
use crate::database::models::{NoticeDbModel, NoticeTypeDbModel, UserDbModel};
use crate::database::repositories::{NoticeFilter, NoticeRepository, NoticeRole};
use crate::database::retry::retry_on_sqlite_busy;

pub struct NoticeLedger {
    repo: Arc<dyn NoticeRepository>,
}

impl NoticeLedger {
    pub fn new(repo: Arc<dyn NoticeRepository>) -> Self {
        Self { repo }
    }

    /// Record a new unseen, unarchived notice.
    pub async fn create(
        &self,
        recipient: &UserDbModel,
        sender: Option<&UserDbModel>,
        message: &str,
        notice_type: &NoticeTypeDbModel,
        on_site: bool,
    ) -> Result<NoticeDbModel> {
        let notice = NoticeDbModel::new(
            &recipient.id,
            sender.map(|s| s.id.clone()),
            message,
            &notice_type.id,
            on_site,
        );
        retry_on_sqlite_busy("create_notice", || self.repo.create(&notice)).await?;
        Ok(notice)
    }

    /// Notices of `user`, newest first. With `as_sender` the user is
    /// matched as the sender instead of the recipient.
    pub async fn query(
        &self,
        user: &UserDbModel,
        filter: &NoticeFilter,
        as_sender: bool,
    ) -> Result<Vec<NoticeDbModel>> {
        self.repo.list(&user.id, role(as_sender), filter).await
    }

    /// Notices received by `user`.
    pub async fn received(
        &self,
        user: &UserDbModel,
        filter: &NoticeFilter,
    ) -> Result<Vec<NoticeDbModel>> {
        self.query(user, filter, false).await
    }

    /// Notices sent by `user`.
    pub async fn sent(
        &self,
        user: &UserDbModel,
        filter: &NoticeFilter,
    ) -> Result<Vec<NoticeDbModel>> {
        self.query(user, filter, true).await
    }

    /// Number of unseen notices received by `user`; `filter.unseen` is forced.
    pub async fn unseen_count(&self, user: &UserDbModel, filter: &NoticeFilter) -> Result<i64> {
        let filter = filter.clone().unseen(true);
        self.repo.count(&user.id, NoticeRole::Recipient, &filter).await
    }

    /// Archive the notice. Archiving twice is harmless.
    pub async fn archive(&self, notice: &mut NoticeDbModel) -> Result<()> {
        retry_on_sqlite_busy("archive_notice", || self.repo.set_archived(&notice.id)).await?;
        notice.archived = true;
        Ok(())
    }

    /// Mark the notice seen and return whether it was unseen before.
    pub async fn mark_seen(&self, notice: &mut NoticeDbModel) -> Result<bool> {
        let was_unseen = notice.unseen;
        if was_unseen {
            retry_on_sqlite_busy("mark_notice_seen", || self.repo.set_unseen(&notice.id, false))
                .await?;
            notice.unseen = false;
        }
        Ok(was_unseen)
    }
}

fn role(as_sender: bool) -> NoticeRole {
    if as_sender {
        NoticeRole::Sender
    } else {
        NoticeRole::Recipient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::{
        NoticeTypeRepository, SqlxNoticeRepository, SqlxNoticeTypeRepository, SqlxUserRepository,
        UserRepository,
    };
    use crate::database::test_pool;

    struct Fixture {
        ledger: NoticeLedger,
        repo: Arc<SqlxNoticeRepository>,
        alice: UserDbModel,
        bob: UserDbModel,
        nt: NoticeTypeDbModel,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let users = SqlxUserRepository::new(pool.clone());
        let alice = UserDbModel::new("alice");
        let bob = UserDbModel::new("bob");
        users.create(&alice).await.unwrap();
        users.create(&bob).await.unwrap();
        let nt = NoticeTypeDbModel::new("welcome", "Welcome", "Welcome message", 2);
        SqlxNoticeTypeRepository::new(pool.clone())
            .create(&nt)
            .await
            .unwrap();
        let repo = Arc::new(SqlxNoticeRepository::new(pool));
        Fixture {
            ledger: NoticeLedger::new(repo.clone()),
            repo,
            alice,
            bob,
            nt,
        }
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let f = fixture().await;
        let notice = f
            .ledger
            .create(&f.alice, Some(&f.bob), "<p>hi</p>", &f.nt, false)
            .await
            .unwrap();

        let stored = f.repo.find_by_id(&notice.id).await.unwrap().unwrap();
        assert!(stored.unseen);
        assert!(!stored.archived);
        assert!(!stored.on_site);
        assert_eq!(stored.sender_id.as_deref(), Some(f.bob.id.as_str()));
        assert_eq!(stored.message, "<p>hi</p>");
    }

    #[tokio::test]
    async fn test_archive_is_idempotent() {
        let f = fixture().await;
        let mut notice = f.ledger.create(&f.alice, None, "m", &f.nt, false).await.unwrap();

        f.ledger.archive(&mut notice).await.unwrap();
        f.ledger.archive(&mut notice).await.unwrap();

        assert!(notice.archived);
        assert!(f.repo.find_by_id(&notice.id).await.unwrap().unwrap().archived);
    }

    #[tokio::test]
    async fn test_mark_seen_returns_prior_state() {
        let f = fixture().await;
        let mut notice = f.ledger.create(&f.alice, None, "m", &f.nt, false).await.unwrap();

        assert!(f.ledger.mark_seen(&mut notice).await.unwrap());
        assert!(!notice.unseen);
        assert!(!f.ledger.mark_seen(&mut notice).await.unwrap());
        assert!(!f.repo.find_by_id(&notice.id).await.unwrap().unwrap().unseen);
    }

    #[tokio::test]
    async fn test_query_filters() {
        let f = fixture().await;
        let mut seen = f
            .ledger
            .create(&f.alice, Some(&f.bob), "seen", &f.nt, false)
            .await
            .unwrap();
        f.ledger.mark_seen(&mut seen).await.unwrap();
        f.ledger
            .create(&f.alice, None, "unseen", &f.nt, true)
            .await
            .unwrap();
        let mut archived = f
            .ledger
            .create(&f.alice, None, "archived", &f.nt, false)
            .await
            .unwrap();
        f.ledger.archive(&mut archived).await.unwrap();

        let all = f
            .ledger
            .received(&f.alice, &NoticeFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let unseen = f
            .ledger
            .received(&f.alice, &NoticeFilter::default().unseen(true))
            .await
            .unwrap();
        assert_eq!(unseen.len(), 1);
        assert!(unseen.iter().all(|n| n.unseen));
        assert!(unseen.iter().all(|u| all.iter().any(|n| n.id == u.id)));

        let with_archived = f
            .ledger
            .received(&f.alice, &NoticeFilter::default().include_archived())
            .await
            .unwrap();
        assert_eq!(with_archived.len(), 3);

        let on_site = f
            .ledger
            .received(&f.alice, &NoticeFilter::default().on_site(true))
            .await
            .unwrap();
        assert_eq!(on_site.len(), 1);
        assert_eq!(on_site[0].message, "unseen");

        let sent = f.ledger.sent(&f.bob, &NoticeFilter::default()).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, "seen");

        assert_eq!(
            f.ledger.unseen_count(&f.alice, &NoticeFilter::default()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_query_orders_newest_first() {
        let f = fixture().await;
        f.ledger.create(&f.alice, None, "first", &f.nt, false).await.unwrap();
        f.ledger.create(&f.alice, None, "second", &f.nt, false).await.unwrap();

        let notices = f.ledger.received(&f.alice, &NoticeFilter::default()).await.unwrap();
        assert_eq!(notices[0].message, "second");
        assert_eq!(notices[1].message, "first");
    }
}
