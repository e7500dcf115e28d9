//! SMS delivery.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::TwilioConfig;
use crate::{Error, Result};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Outbound SMS transport.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, from: &str, body: &str) -> Result<()>;

    /// Default sender number for this transport.
    fn caller_id(&self) -> &str;
}

/// Twilio Messages API client.
pub struct TwilioSmsSender {
    config: TwilioConfig,
    client: Client,
    api_base: String,
}

impl TwilioSmsSender {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            api_base: TWILIO_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send(&self, to: &str, from: &str, body: &str) -> Result<()> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await
            .map_err(|e| Error::channel("sms", format!("Twilio request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Twilio message create failed: {} - {}", status, body);
        Err(Error::channel(
            "sms",
            format!("Twilio responded {status}: {body}"),
        ))
    }

    fn caller_id(&self) -> &str {
        &self.config.caller_id
    }
}

/// Logs text messages instead of sending them.
#[derive(Debug, Clone)]
pub struct LoggingSmsSender {
    caller_id: String,
}

impl LoggingSmsSender {
    pub fn new(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
        }
    }
}

impl Default for LoggingSmsSender {
    fn default() -> Self {
        Self::new("")
    }
}

#[async_trait]
impl SmsSender for LoggingSmsSender {
    async fn send(&self, to: &str, _from: &str, body: &str) -> Result<()> {
        info!(
            to,
            length = body.chars().count(),
            "SMS transport not configured, not sending"
        );
        Ok(())
    }

    fn caller_id(&self) -> &str {
        &self.caller_id
    }
}
