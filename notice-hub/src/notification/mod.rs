//! Notification core.
//!
//! This module provides:
//! - Notice types and per-user, per-medium preferences
//! - The notice ledger
//! - Template rendering in the recipient's language
//! - Dispatch to email and SMS, immediately or through the deferred queue
//! - Observation of domain objects

pub mod channels;
pub mod dispatch;
pub mod events;
pub mod language;
pub mod ledger;
pub mod medium;
pub mod notice_type;
pub mod observe;
pub mod permissions;
pub mod preference;
pub mod queue;
pub mod templates;

pub use channels::{
    Attachment, EmailMessage, EmailSender, LoggingEmailSender, LoggingSmsSender, SmsSender,
    SmtpEmailSender, TwilioSmsSender,
};
pub use dispatch::{
    ChannelOutcome, Context, DispatchEngine, DispatchMode, DispatchReport, DispatchSettings,
    SendOptions, SendOutcome, UserDelivery,
};
pub use events::{EventBus, NotificationEvent};
pub use language::{Catalog, LanguageResolver, NoLanguageStore, Translator, UserLanguageResolver};
pub use ledger::NoticeLedger;
pub use medium::Medium;
pub use notice_type::{NoticeTypeService, UpsertOutcome};
pub use observe::{DEFAULT_SIGNAL, Observable, ObservationRegistry};
pub use permissions::{
    CUSTOM_SETTINGS_PERMISSION, ObjectPermissionCheck, ObjectRef, SqlxObjectPermissionCheck,
};
pub use preference::PreferenceStore;
pub use queue::{
    DeferredQueue, DrainStats, QueueDrainer, QueuedBatchPayload, QueuedNotice, Recipients,
};
pub use templates::{
    DEFAULT_FORMATS, HandlebarsTemplateEngine, RenderProfile, RenderedMessages, TemplateEngine,
    TemplateFormatter,
};

pub type User = crate::database::models::UserDbModel;
pub type NoticeType = crate::database::models::NoticeTypeDbModel;
pub type Preference = crate::database::models::NoticeSettingDbModel;
pub type Notice = crate::database::models::NoticeDbModel;
pub type ObservedItem = crate::database::models::ObservedItemDbModel;
