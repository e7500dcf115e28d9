//! Notice dispatch.
//!
//! For each recipient the engine decides which media apply, renders the
//! notice in the recipient's language, records it in the ledger and hands it
//! to the email and SMS channels. A channel failure is recorded in the
//! returned [`DispatchReport`] and logged; it never aborts the batch.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::channels::{
    Attachment, EmailMessage, EmailSender, LoggingEmailSender, LoggingSmsSender, SmsSender,
    SmtpEmailSender, TwilioSmsSender,
};
use super::events::{EventBus, NotificationEvent};
use super::language::{Catalog, LanguageResolver, Translator, UserLanguageResolver};
use super::ledger::NoticeLedger;
use super::medium::Medium;
use super::permissions::{ObjectPermissionCheck, ObjectRef};
use super::preference::PreferenceStore;
use super::queue::{DeferredQueue, QueuedNotice, Recipients};
use super::templates::{
    EMAIL_BODY_TEMPLATE, EMAIL_SUBJECT_TEMPLATE, HandlebarsTemplateEngine, TemplateFormatter,
    inline_css, single_line,
};
use crate::config::{NotificationConfig, SiteConfig};
use crate::database::DbPool;
use crate::database::models::{NoticeTypeDbModel, UserDbModel};
use crate::database::repositories::{
    NoticeTypeRepository, SqlxNoticeRepository, SqlxNoticeTypeRepository,
    SqlxPreferenceRepository, SqlxQueueBatchRepository, SqlxUserRepository, UserRepository,
};
use crate::{Error, Result};

/// Template context: a JSON object.
pub type Context = Map<String, Value>;

/// Per-call dispatch options.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Caller's wish to show the notice on site; honoured only when on-site
    /// delivery is enabled and the recipient wants it.
    pub on_site: bool,
    /// `None` for system notices.
    pub sender: Option<UserDbModel>,
    pub attachments: Vec<Attachment>,
    /// Object the notice is about, for object-scoped preferences.
    pub target: Option<ObjectRef>,
    /// Email every active recipient that has an address, ignoring preferences.
    pub force_send: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            on_site: true,
            sender: None,
            attachments: Vec::new(),
            target: None,
            force_send: false,
        }
    }
}

impl SendOptions {
    pub fn sender(mut self, sender: UserDbModel) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn target(mut self, target: ObjectRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn force_send(mut self) -> Self {
        self.force_send = true;
        self
    }

    pub fn on_site(mut self, on_site: bool) -> Self {
        self.on_site = on_site;
        self
    }
}

/// How `send` delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Queue when `queue_all` is configured, otherwise send now.
    #[default]
    Auto,
    Queue,
    Now,
}

impl DispatchMode {
    /// Map the `queue` / `now` override flags; setting both is a contract error.
    pub fn from_flags(queue: bool, now: bool) -> Result<Self> {
        match (queue, now) {
            (true, true) => Err(Error::validation("can only set one of 'now' and 'queue'")),
            (true, false) => Ok(Self::Queue),
            (false, true) => Ok(Self::Now),
            (false, false) => Ok(Self::Auto),
        }
    }
}

/// Result of one channel for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ChannelOutcome {
    Skipped,
    Sent,
    Failed(String),
}

impl ChannelOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// What happened for one recipient that was not skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDelivery {
    pub user_id: String,
    pub notice_id: String,
    pub on_site: bool,
    pub email: ChannelOutcome,
    pub sms: ChannelOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// One entry per recipient that got a notice, in recipient order.
    pub deliveries: Vec<UserDelivery>,
}

impl DispatchReport {
    pub fn for_user(&self, user_id: &str) -> Option<&UserDelivery> {
        self.deliveries.iter().find(|d| d.user_id == user_id)
    }

    pub fn failures(&self) -> usize {
        self.deliveries
            .iter()
            .map(|d| usize::from(d.email.is_failed()) + usize::from(d.sms.is_failed()))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Id of the stored batch.
    Queued(String),
    Sent(DispatchReport),
}

/// Engine-wide settings taken from [`NotificationConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub queue_all: bool,
    pub on_site_enabled: bool,
    pub from_email: String,
    pub default_language: Option<String>,
    pub site: SiteConfig,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&NotificationConfig::default())
    }
}

impl From<&NotificationConfig> for DispatchSettings {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            queue_all: config.queue_all,
            on_site_enabled: config.on_site_enabled,
            from_email: config.default_from_email.clone(),
            default_language: config.default_language.clone(),
            site: config.site.clone(),
        }
    }
}

/// Which media a recipient gets.
struct Plan {
    email: bool,
    sms: bool,
    on_site: bool,
}

pub struct DispatchEngine {
    users: Arc<dyn UserRepository>,
    notice_types: Arc<dyn NoticeTypeRepository>,
    preferences: PreferenceStore,
    ledger: NoticeLedger,
    queue: DeferredQueue,
    formatter: TemplateFormatter,
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
    languages: Arc<dyn LanguageResolver>,
    translator: Arc<dyn Translator>,
    events: EventBus,
    settings: DispatchSettings,
}

impl DispatchEngine {
    /// Engine over SQLite repositories with logging channels.
    pub fn new(pool: DbPool, formatter: TemplateFormatter, settings: DispatchSettings) -> Self {
        Self {
            users: Arc::new(SqlxUserRepository::new(pool.clone())),
            notice_types: Arc::new(SqlxNoticeTypeRepository::new(pool.clone())),
            preferences: PreferenceStore::new(Arc::new(SqlxPreferenceRepository::new(
                pool.clone(),
            ))),
            ledger: NoticeLedger::new(Arc::new(SqlxNoticeRepository::new(pool.clone()))),
            queue: DeferredQueue::new(Arc::new(SqlxQueueBatchRepository::new(pool))),
            formatter,
            email: Arc::new(LoggingEmailSender),
            sms: Arc::new(LoggingSmsSender::default()),
            languages: Arc::new(UserLanguageResolver),
            translator: Arc::new(Catalog::empty()),
            events: EventBus::default(),
            settings,
        }
    }

    /// Engine wired from configuration: templates from `template_dir`,
    /// SMTP and Twilio when configured, the translation catalog if any.
    ///
    /// The catalog serves both the notice type names and the templates'
    /// `trans` helper.
    pub fn from_config(pool: DbPool, config: &NotificationConfig) -> Result<Self> {
        let translator: Arc<dyn Translator> = match &config.catalog_path {
            Some(path) => Arc::new(load_catalog(path)?),
            None => Arc::new(Catalog::empty()),
        };
        let templates = HandlebarsTemplateEngine::from_directory(&config.template_dir)?
            .with_translator(translator.clone());
        let formatter =
            TemplateFormatter::new(Arc::new(templates)).with_formats(config.formats.clone());
        let mut engine = Self::new(pool, formatter, DispatchSettings::from(config))
            .with_translator(translator);

        if let Some(smtp) = &config.smtp {
            engine = engine.with_email_sender(Arc::new(SmtpEmailSender::new(smtp)?));
        }
        if let Some(twilio) = &config.twilio {
            engine = engine.with_sms_sender(Arc::new(TwilioSmsSender::new(twilio.clone())));
        }
        Ok(engine)
    }

    pub fn with_email_sender(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = sender;
        self
    }

    pub fn with_sms_sender(mut self, sender: Arc<dyn SmsSender>) -> Self {
        self.sms = sender;
        self
    }

    pub fn with_language_resolver(mut self, resolver: Arc<dyn LanguageResolver>) -> Self {
        self.languages = resolver;
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_permission_check(mut self, check: Arc<dyn ObjectPermissionCheck>) -> Self {
        self.preferences = self.preferences.with_permission_check(check);
        self
    }

    pub fn with_user_repository(mut self, users: Arc<dyn UserRepository>) -> Self {
        self.users = users;
        self
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn ledger(&self) -> &NoticeLedger {
        &self.ledger
    }

    pub fn deferred_queue(&self) -> &DeferredQueue {
        &self.queue
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Receive `email_sent` / `sms_sent` events.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events.subscribe()
    }

    async fn notice_type(&self, label: &str) -> Result<NoticeTypeDbModel> {
        self.notice_types
            .find_by_label(label)
            .await?
            .ok_or_else(|| Error::not_found("NoticeType", label))
    }

    /// Queue or send, as `mode` and the `queue_all` setting decide.
    pub async fn send(
        &self,
        recipients: Recipients,
        label: &str,
        context: &Context,
        options: &SendOptions,
        mode: DispatchMode,
    ) -> Result<SendOutcome> {
        let queue = match mode {
            DispatchMode::Queue => true,
            DispatchMode::Now => false,
            DispatchMode::Auto => self.settings.queue_all,
        };

        if queue {
            let batch_id = self.queue(recipients, label, context, options).await?;
            return Ok(SendOutcome::Queued(batch_id));
        }

        let users = self.resolve_recipients(recipients).await?;
        let report = self.send_now(&users, label, context, options).await?;
        Ok(SendOutcome::Sent(report))
    }

    /// Store the request as one batch for later draining.
    ///
    /// Only recipients, label, context, `on_site` and the sender are kept;
    /// the context must therefore be plain JSON data.
    pub async fn queue(
        &self,
        recipients: Recipients,
        label: &str,
        context: &Context,
        options: &SendOptions,
    ) -> Result<String> {
        // Fail now rather than when the batch is drained.
        self.notice_type(label).await?;

        if !options.attachments.is_empty() || options.target.is_some() || options.force_send {
            warn!(
                notice_type = label,
                "Attachments, target object and force_send are not kept for queued notices"
            );
        }

        let sender_id = options.sender.as_ref().map(|s| s.id.clone());
        let notices = recipients
            .into_ids()
            .into_iter()
            .map(|user_id| QueuedNotice {
                user_id,
                label: label.to_string(),
                context: context.clone(),
                on_site: options.on_site,
                sender_id: sender_id.clone(),
            })
            .collect();

        self.queue.enqueue(notices).await
    }

    async fn resolve_recipients(&self, recipients: Recipients) -> Result<Vec<UserDbModel>> {
        match recipients {
            Recipients::Users(users) => Ok(users),
            Recipients::Ids(ids) => {
                let found = self.users.find_by_ids(&ids).await?;
                // Keep the caller's order.
                ids.iter()
                    .map(|id| {
                        found
                            .iter()
                            .find(|u| &u.id == id)
                            .cloned()
                            .ok_or_else(|| Error::not_found("User", id.as_str()))
                    })
                    .collect()
            }
        }
    }

    /// Deliver to every recipient now.
    ///
    /// An unknown label or a rendering failure aborts the call. Channel
    /// failures only show up in the report and the logs.
    pub async fn send_now(
        &self,
        users: &[UserDbModel],
        label: &str,
        context: &Context,
        options: &SendOptions,
    ) -> Result<DispatchReport> {
        let notice_type = self.notice_type(label).await?;

        let mut report = DispatchReport::default();
        for user in users {
            if let Some(delivery) = self.deliver(user, &notice_type, context, options).await? {
                report.deliveries.push(delivery);
            }
        }
        Ok(report)
    }

    async fn plan(
        &self,
        user: &UserDbModel,
        notice_type: &NoticeTypeDbModel,
        options: &SendOptions,
    ) -> Result<Plan> {
        let target = options.target.as_ref();
        if !user.is_active {
            return Ok(Plan {
                email: false,
                sms: false,
                on_site: false,
            });
        }

        let email = (options.force_send && user.has_email())
            || self
                .preferences
                .should_send(user, notice_type, Medium::Email, target)
                .await?;
        let sms = user.has_sms_number()
            && self
                .preferences
                .should_send(user, notice_type, Medium::Sms, target)
                .await?;
        let on_site = self.settings.on_site_enabled
            && options.on_site
            && self
                .preferences
                .should_send(user, notice_type, Medium::Display, target)
                .await?;

        Ok(Plan {
            email,
            sms,
            on_site,
        })
    }

    async fn resolve_language(&self, user: &UserDbModel) -> Option<String> {
        let resolved = match self.languages.resolve(user).await {
            Ok(language) => language,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Language lookup failed, using default");
                None
            }
        };
        resolved.or_else(|| self.settings.default_language.clone())
    }

    fn build_context(
        &self,
        user: &UserDbModel,
        notice_type: &NoticeTypeDbModel,
        language: Option<&str>,
        extra: &Context,
        options: &SendOptions,
    ) -> Result<Context> {
        let mut context = Context::new();
        context.insert("recipient".into(), serde_json::to_value(user)?);
        context.insert("sender".into(), serde_json::to_value(&options.sender)?);
        context.insert(
            "notice".into(),
            Value::String(self.translator.translate(language, &notice_type.display)),
        );
        context.insert("notices_url".into(), Value::String(String::new()));
        context.insert(
            "current_site".into(),
            serde_json::to_value(&self.settings.site)?,
        );
        context.insert(
            "language_code".into(),
            language.map_or(Value::Null, |l| Value::String(l.to_string())),
        );
        for (key, value) in extra {
            context.insert(key.clone(), value.clone());
        }
        Ok(context)
    }

    async fn deliver(
        &self,
        user: &UserDbModel,
        notice_type: &NoticeTypeDbModel,
        extra: &Context,
        options: &SendOptions,
    ) -> Result<Option<UserDelivery>> {
        let plan = self.plan(user, notice_type, options).await?;
        if !(plan.email || plan.sms || plan.on_site) {
            debug!(user_id = %user.id, notice_type = %notice_type.label, "Nothing to send");
            return Ok(None);
        }

        let language = self.resolve_language(user).await;
        let context = self.build_context(user, notice_type, language.as_deref(), extra, options)?;
        let messages = self
            .formatter
            .render_all(&notice_type.label, &Value::Object(context.clone()))?;

        let mut subject_context = context.clone();
        subject_context.insert(
            "message".into(),
            Value::String(messages.require("short.txt")?.to_string()),
        );
        let subject = single_line(
            &self
                .formatter
                .render_template(EMAIL_SUBJECT_TEMPLATE, &Value::Object(subject_context))?,
        );

        let mut body_context = context;
        body_context.insert(
            "message".into(),
            Value::String(messages.require("full.txt")?.to_string()),
        );
        let body = inline_css(
            &self
                .formatter
                .render_template(EMAIL_BODY_TEMPLATE, &Value::Object(body_context))?,
        )?;

        let notice = self
            .ledger
            .create(
                user,
                options.sender.as_ref(),
                messages.require("notice.html")?,
                notice_type,
                plan.on_site,
            )
            .await?;

        let email = if plan.email {
            self.send_email(user, notice_type, &subject, body, options).await
        } else {
            ChannelOutcome::Skipped
        };

        let sms = if plan.sms {
            self.send_sms(user, notice_type, messages.require("sms.txt")?, options).await
        } else {
            ChannelOutcome::Skipped
        };

        Ok(Some(UserDelivery {
            user_id: user.id.clone(),
            notice_id: notice.id,
            on_site: plan.on_site,
            email,
            sms,
        }))
    }

    async fn send_email(
        &self,
        user: &UserDbModel,
        notice_type: &NoticeTypeDbModel,
        subject: &str,
        html_body: String,
        options: &SendOptions,
    ) -> ChannelOutcome {
        let Some(address) = user.email.as_deref().filter(|_| user.has_email()) else {
            warn!(
                user_id = %user.id,
                notice_type = %notice_type.label,
                subject,
                "ERROR:EMAIL recipient has no email address"
            );
            return ChannelOutcome::Failed("recipient has no email address".to_string());
        };

        let message = EmailMessage {
            subject: subject.to_string(),
            text_body: String::new(),
            html_body,
            from: self.settings.from_email.clone(),
            to: vec![address.to_string()],
            attachments: options.attachments.clone(),
        };

        match self.email.send(&message).await {
            Ok(()) => {
                info!(
                    user_id = %user.id,
                    notice_type = %notice_type.label,
                    to = address,
                    "SUCCESS:EMAIL"
                );
                self.events.publish(NotificationEvent::EmailSent {
                    user_id: user.id.clone(),
                    notice_type: notice_type.label.clone(),
                    object: options.target.clone(),
                });
                ChannelOutcome::Sent
            }
            Err(e) => {
                error!(
                    user_id = %user.id,
                    username = %user.username,
                    notice_type = %notice_type.label,
                    subject,
                    error = %e,
                    "ERROR:EMAIL"
                );
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }

    async fn send_sms(
        &self,
        user: &UserDbModel,
        notice_type: &NoticeTypeDbModel,
        body: &str,
        options: &SendOptions,
    ) -> ChannelOutcome {
        let to = user.sms_number.as_deref().unwrap_or_default();
        match self.sms.send(to, self.sms.caller_id(), body).await {
            Ok(()) => {
                info!(
                    user_id = %user.id,
                    notice_type = %notice_type.label,
                    "SUCCESS:SMS"
                );
                self.events.publish(NotificationEvent::SmsSent {
                    user_id: user.id.clone(),
                    notice_type: notice_type.label.clone(),
                    object: options.target.clone(),
                });
                ChannelOutcome::Sent
            }
            Err(e) => {
                error!(
                    user_id = %user.id,
                    username = %user.username,
                    notice_type = %notice_type.label,
                    body,
                    error = %e,
                    "ERROR:SMS"
                );
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    Catalog::load(path)
        .map_err(|e| Error::config(format!("failed to load catalog {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::NoticeFilter;
    use crate::database::test_pool;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingEmail {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailSender for RecordingEmail {
        async fn send(&self, message: &EmailMessage) -> Result<()> {
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    struct FailingLanguages;

    #[async_trait]
    impl LanguageResolver for FailingLanguages {
        async fn resolve(&self, _user: &UserDbModel) -> Result<Option<String>> {
            Err(Error::Other("language store unavailable".into()))
        }
    }

    fn formatter() -> TemplateFormatter {
        formatter_with(HandlebarsTemplateEngine::new())
    }

    fn formatter_with(engine: HandlebarsTemplateEngine) -> TemplateFormatter {
        let engine = engine
            .with_template("notification/short.txt", "{{notice}} for {{recipient.username}}")
            .unwrap()
            .with_template("notification/full.txt", "Dear {{recipient.username}}, {{body}}")
            .unwrap()
            .with_template("notification/notice.html", "<p>{{body}}</p>")
            .unwrap()
            .with_template("notification/full.html", "<div>{{body}}</div>")
            .unwrap()
            .with_template("notification/sms.txt", "{{body}}")
            .unwrap()
            .with_template(EMAIL_SUBJECT_TEMPLATE, "[{{current_site.name}}] {{message}}\n")
            .unwrap()
            .with_template(
                EMAIL_BODY_TEMPLATE,
                "<html><head><style>p { color: red; }</style></head>\
                 <body><p>{{message}}</p></body></html>",
            )
            .unwrap();
        TemplateFormatter::new(Arc::new(engine))
    }

    async fn setup(settings: DispatchSettings) -> (DispatchEngine, Arc<RecordingEmail>, DbPool) {
        let pool = test_pool().await;
        SqlxNoticeTypeRepository::new(pool.clone())
            .create(&NoticeTypeDbModel::new("welcome", "Welcome", "Welcome message", 2))
            .await
            .unwrap();
        let email = Arc::new(RecordingEmail::default());
        let engine = DispatchEngine::new(pool.clone(), formatter(), settings)
            .with_email_sender(email.clone());
        (engine, email, pool)
    }

    async fn user(pool: &DbPool, user: UserDbModel) -> UserDbModel {
        SqlxUserRepository::new(pool.clone())
            .create(&user)
            .await
            .unwrap();
        user
    }

    fn ctx() -> Context {
        json!({"body": "Tom & Jerry"}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_dispatch_mode_flags() {
        assert_eq!(DispatchMode::from_flags(false, false).unwrap(), DispatchMode::Auto);
        assert_eq!(DispatchMode::from_flags(true, false).unwrap(), DispatchMode::Queue);
        assert_eq!(DispatchMode::from_flags(false, true).unwrap(), DispatchMode::Now);
        assert!(matches!(
            DispatchMode::from_flags(true, true).unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_send_now_renders_and_records() {
        let (engine, email, pool) = setup(DispatchSettings::default()).await;
        let alice = user(&pool, UserDbModel::new("alice").with_email("alice@example.com")).await;

        let report = engine
            .send_now(&[alice.clone()], "welcome", &ctx(), &SendOptions::default())
            .await
            .unwrap();

        let delivery = report.for_user(&alice.id).unwrap();
        assert_eq!(delivery.email, ChannelOutcome::Sent);
        assert_eq!(delivery.sms, ChannelOutcome::Skipped);
        assert!(!delivery.on_site);

        let sent = email.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "[example.com] Welcome for alice");
        assert_eq!(sent[0].to, vec!["alice@example.com".to_string()]);
        assert!(sent[0].text_body.is_empty());
        assert!(sent[0].html_body.contains(r#"style="color: red;""#));
        assert!(sent[0].html_body.contains("Dear alice, Tom &amp; Jerry"));

        let notices = engine
            .ledger()
            .received(&alice, &NoticeFilter::default())
            .await
            .unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, "<p>Tom &amp; Jerry</p>");
        assert!(!notices[0].on_site);
    }

    #[tokio::test]
    async fn test_unknown_label_is_fatal() {
        let (engine, _, pool) = setup(DispatchSettings::default()).await;
        let alice = user(&pool, UserDbModel::new("alice").with_email("a@example.com")).await;

        let err = engine
            .send_now(&[alice], "missing", &ctx(), &SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_user_with_nothing_to_receive_is_skipped() {
        let (engine, email, pool) = setup(DispatchSettings::default()).await;
        let alice = user(&pool, UserDbModel::new("alice").with_email("a@example.com")).await;
        let nt = engine.notice_type("welcome").await.unwrap();
        engine
            .preferences()
            .set(&alice, &nt, Medium::Email, false)
            .await
            .unwrap();

        let report = engine
            .send_now(&[alice.clone()], "welcome", &ctx(), &SendOptions::default())
            .await
            .unwrap();

        assert!(report.deliveries.is_empty());
        assert!(email.sent.lock().is_empty());
        let notices = engine
            .ledger()
            .received(&alice, &NoticeFilter::default().include_archived())
            .await
            .unwrap();
        assert!(notices.is_empty());
    }

    #[tokio::test]
    async fn test_force_send_overrides_preference() {
        let (engine, email, pool) = setup(DispatchSettings::default()).await;
        let alice = user(&pool, UserDbModel::new("alice").with_email("a@example.com")).await;
        let nt = engine.notice_type("welcome").await.unwrap();
        engine
            .preferences()
            .set(&alice, &nt, Medium::Email, false)
            .await
            .unwrap();

        let report = engine
            .send_now(&[alice.clone()], "welcome", &ctx(), &SendOptions::default().force_send())
            .await
            .unwrap();

        assert_eq!(report.for_user(&alice.id).unwrap().email, ChannelOutcome::Sent);
        assert_eq!(email.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_on_site_requires_configuration() {
        let settings = DispatchSettings {
            on_site_enabled: true,
            ..DispatchSettings::default()
        };
        let (engine, _, pool) = setup(settings).await;
        // No email or SMS, but the display medium is on for default 3.
        SqlxNoticeTypeRepository::new(pool.clone())
            .create(&NoticeTypeDbModel::new("digest", "Digest", "Daily digest", 3))
            .await
            .unwrap();
        let bob = user(&pool, UserDbModel::new("bob")).await;

        let report = engine
            .send_now(&[bob.clone()], "digest", &ctx(), &SendOptions::default())
            .await
            .unwrap();
        let delivery = report.for_user(&bob.id).unwrap();
        assert!(delivery.on_site);
        assert_eq!(delivery.email, ChannelOutcome::Failed("recipient has no email address".into()));

        let report = engine
            .send_now(&[bob.clone()], "digest", &ctx(), &SendOptions::default().on_site(false))
            .await
            .unwrap();
        assert!(!report.for_user(&bob.id).unwrap().on_site);
    }

    #[tokio::test]
    async fn test_send_respects_queue_all() {
        let settings = DispatchSettings {
            queue_all: true,
            ..DispatchSettings::default()
        };
        let (engine, email, pool) = setup(settings).await;
        let alice = user(&pool, UserDbModel::new("alice").with_email("a@example.com")).await;

        let outcome = engine
            .send(
                Recipients::Users(vec![alice.clone()]),
                "welcome",
                &ctx(),
                &SendOptions::default(),
                DispatchMode::Auto,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Queued(_)));
        assert!(email.sent.lock().is_empty());

        let outcome = engine
            .send(
                Recipients::Ids(vec![alice.id.clone()]),
                "welcome",
                &ctx(),
                &SendOptions::default(),
                DispatchMode::Now,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Sent(ref r) if r.deliveries.len() == 1));
    }

    #[tokio::test]
    async fn test_send_with_unknown_user_id_fails() {
        let (engine, _, _pool) = setup(DispatchSettings::default()).await;
        let err = engine
            .send(
                Recipients::Ids(vec!["nobody".into()]),
                "welcome",
                &ctx(),
                &SendOptions::default(),
                DispatchMode::Now,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_language_is_passed_to_rendering() {
        let (engine, _, pool) = setup(DispatchSettings::default()).await;
        let mut catalog = Catalog::empty();
        catalog.insert("de", "Welcome", "Willkommen");
        let engine = engine.with_translator(Arc::new(catalog));
        let hans = user(
            &pool,
            UserDbModel::new("hans")
                .with_email("hans@example.com")
                .with_language("de"),
        )
        .await;
        let email = Arc::new(RecordingEmail::default());
        let engine = engine.with_email_sender(email.clone());

        engine
            .send_now(&[hans], "welcome", &ctx(), &SendOptions::default())
            .await
            .unwrap();

        assert_eq!(email.sent.lock()[0].subject, "[example.com] Willkommen for hans");
    }

    #[tokio::test]
    async fn test_template_text_is_translated() {
        let mut catalog = Catalog::empty();
        catalog.insert("de", "Thanks for joining", "Danke für die Anmeldung");
        let catalog: Arc<dyn Translator> = Arc::new(catalog);
        let templates = HandlebarsTemplateEngine::new()
            .with_translator(catalog.clone())
            .with_template(
                "notification/welcome/notice.html",
                "<p>{{trans \"Thanks for joining\"}}</p>",
            )
            .unwrap();

        let (engine, _, pool) = setup(DispatchSettings::default()).await;
        let engine = DispatchEngine::new(
            pool.clone(),
            formatter_with(templates),
            engine.settings().clone(),
        )
        .with_translator(catalog);
        let hans = user(
            &pool,
            UserDbModel::new("hans")
                .with_email("hans@example.com")
                .with_language("de"),
        )
        .await;
        let alice = user(&pool, UserDbModel::new("alice").with_email("a@example.com")).await;

        let recipients = [hans.clone(), alice.clone()];
        engine
            .send_now(&recipients, "welcome", &ctx(), &SendOptions::default())
            .await
            .unwrap();

        let notices = engine
            .ledger()
            .received(&hans, &NoticeFilter::default())
            .await
            .unwrap();
        assert_eq!(notices[0].message, "<p>Danke für die Anmeldung</p>");

        let notices = engine
            .ledger()
            .received(&alice, &NoticeFilter::default())
            .await
            .unwrap();
        assert_eq!(notices[0].message, "<p>Thanks for joining</p>");
    }

    #[tokio::test]
    async fn test_failed_language_lookup_uses_default_language() {
        let settings = DispatchSettings {
            default_language: Some("de".into()),
            ..DispatchSettings::default()
        };
        let (engine, email, pool) = setup(settings).await;
        let mut catalog = Catalog::empty();
        catalog.insert("de", "Welcome", "Willkommen");
        let engine = engine
            .with_translator(Arc::new(catalog))
            .with_language_resolver(Arc::new(FailingLanguages));
        let alice = user(
            &pool,
            UserDbModel::new("alice")
                .with_email("alice@example.com")
                .with_language("fr"),
        )
        .await;

        let report = engine
            .send_now(&[alice.clone()], "welcome", &ctx(), &SendOptions::default())
            .await
            .unwrap();

        assert_eq!(report.for_user(&alice.id).unwrap().email, ChannelOutcome::Sent);
        assert_eq!(email.sent.lock()[0].subject, "[example.com] Willkommen for alice");
        let notices = engine
            .ledger()
            .received(&alice, &NoticeFilter::default())
            .await
            .unwrap();
        assert_eq!(notices.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_format_template_is_fatal() {
        let pool = test_pool().await;
        SqlxNoticeTypeRepository::new(pool.clone())
            .create(&NoticeTypeDbModel::new("welcome", "Welcome", "Welcome message", 2))
            .await
            .unwrap();
        let email = Arc::new(RecordingEmail::default());
        let templates = HandlebarsTemplateEngine::new()
            .with_template("notification/short.txt", "{{notice}}")
            .unwrap();
        let engine = DispatchEngine::new(
            pool.clone(),
            TemplateFormatter::new(Arc::new(templates)),
            DispatchSettings::default(),
        )
        .with_email_sender(email.clone());
        let alice = user(&pool, UserDbModel::new("alice").with_email("a@example.com")).await;

        let err = engine
            .send_now(&[alice.clone()], "welcome", &ctx(), &SendOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Template(_)));
        assert!(email.sent.lock().is_empty());
        let notices = engine
            .ledger()
            .received(&alice, &NoticeFilter::default().include_archived())
            .await
            .unwrap();
        assert!(notices.is_empty());
    }
}
