//! Delivery channels.
//!
//! - Email over SMTP
//! - SMS through the Twilio REST API
//!
//! Both have a logging stand-in used when no transport is configured.

mod email;
mod sms;

pub use email::{Attachment, EmailMessage, EmailSender, LoggingEmailSender, SmtpEmailSender};
pub use sms::{LoggingSmsSender, SmsSender, TwilioSmsSender};
