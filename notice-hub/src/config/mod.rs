//! Runtime configuration.
//!
//! Values come from the process environment (optionally seeded from a
//! `.env` file by the binary).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::notification::templates::DEFAULT_FORMATS;
use crate::{Error, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite:notice-hub.db?mode=rwc";
const DEFAULT_FROM_EMAIL: &str = "webmaster@localhost";
const DEFAULT_SMTP_PORT: u16 = 587;

/// Site identity exposed to templates as `current_site`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub domain: String,
    pub protocol: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "example.com".to_string(),
            domain: "example.com".to_string(),
            protocol: "http".to_string(),
        }
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

/// Twilio account settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    #[serde(skip_serializing, default)]
    pub auth_token: String,
    /// Number messages are sent from.
    pub caller_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub database_url: String,
    /// Queue every `send` unless the caller forces immediate delivery.
    pub queue_all: bool,
    /// Record notices as on-site when the recipient wants them displayed.
    /// Off by default: on-site delivery is disabled unless opted in.
    pub on_site_enabled: bool,
    pub default_from_email: String,
    /// Language used when a recipient has none.
    pub default_language: Option<String>,
    pub template_dir: PathBuf,
    /// JSON translation catalog.
    pub catalog_path: Option<PathBuf>,
    pub site: SiteConfig,
    pub smtp: Option<SmtpConfig>,
    pub twilio: Option<TwilioConfig>,
    pub formats: Vec<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            queue_all: false,
            on_site_enabled: false,
            default_from_email: DEFAULT_FROM_EMAIL.to_string(),
            default_language: None,
            template_dir: PathBuf::from("templates"),
            catalog_path: None,
            site: SiteConfig::default(),
            smtp: None,
            twilio: None,
            formats: DEFAULT_FORMATS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl NotificationConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to read variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let site_domain = var("SITE_DOMAIN").unwrap_or(defaults.site.domain);
        let site = SiteConfig {
            name: var("SITE_NAME").unwrap_or_else(|| site_domain.clone()),
            domain: site_domain,
            protocol: var("DEFAULT_HTTP_PROTOCOL").unwrap_or(defaults.site.protocol),
        };

        let smtp = match var("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: match var("SMTP_PORT") {
                    Some(port) => parse_value("SMTP_PORT", &port)?,
                    None => DEFAULT_SMTP_PORT,
                },
                username: var("SMTP_USER"),
                password: var("SMTP_PASSWORD"),
            }),
            None => None,
        };

        let twilio = match (
            var("TWILIO_ACCOUNT_SID"),
            var("TWILIO_ACCOUNT_TOKEN"),
            var("TWILIO_CALLER_ID"),
        ) {
            (Some(account_sid), Some(auth_token), Some(caller_id)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                caller_id,
            }),
            _ => None,
        };

        let formats = match var("NOTIFICATION_FORMATS") {
            Some(list) => {
                let formats: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect();
                if formats.is_empty() {
                    return Err(Error::config("NOTIFICATION_FORMATS lists no formats"));
                }
                formats
            }
            None => defaults.formats,
        };

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            queue_all: parse_flag("NOTIFICATION_QUEUE_ALL", var("NOTIFICATION_QUEUE_ALL"))?,
            on_site_enabled: parse_flag("NOTIFICATION_ON_SITE", var("NOTIFICATION_ON_SITE"))?,
            default_from_email: var("DEFAULT_FROM_EMAIL").unwrap_or(defaults.default_from_email),
            default_language: var("DEFAULT_LANGUAGE"),
            template_dir: var("NOTIFICATION_TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_dir),
            catalog_path: var("NOTIFICATION_CATALOG").map(PathBuf::from),
            site,
            smtp,
            twilio,
            formats,
        })
    }
}

fn parse_flag(key: &str, value: Option<String>) -> Result<bool> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key}: invalid value '{value}'")))
}
