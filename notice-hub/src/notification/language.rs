//! Per-user language resolution and message translation.
//!
//! There is no process-wide "current language": dispatch resolves a language
//! per recipient and passes it explicitly to rendering.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::Result;
use crate::database::models::UserDbModel;

/// Looks up a user's preferred language.
#[async_trait]
pub trait LanguageResolver: Send + Sync {
    /// `Ok(None)` when the user has no preference.
    async fn resolve(&self, user: &UserDbModel) -> Result<Option<String>>;
}

/// Reads the `language` column of the user record.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserLanguageResolver;

#[async_trait]
impl LanguageResolver for UserLanguageResolver {
    async fn resolve(&self, user: &UserDbModel) -> Result<Option<String>> {
        Ok(user
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string))
    }
}

/// Used when no language store is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLanguageStore;

#[async_trait]
impl LanguageResolver for NoLanguageStore {
    async fn resolve(&self, _user: &UserDbModel) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Message translation.
pub trait Translator: Send + Sync {
    /// Translate `msgid` into `language`, or return it unchanged.
    fn translate(&self, language: Option<&str>, msgid: &str) -> String;
}

/// JSON message catalog: `{"de": {"Welcome": "Willkommen"}}`.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    messages: HashMap<String, HashMap<String, String>>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self {
            messages: serde_json::from_str(json)?,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn insert(
        &mut self,
        language: impl Into<String>,
        msgid: impl Into<String>,
        msgstr: impl Into<String>,
    ) {
        self.messages
            .entry(language.into())
            .or_default()
            .insert(msgid.into(), msgstr.into());
    }

    fn lookup(&self, language: &str, msgid: &str) -> Option<&str> {
        if let Some(found) = self.messages.get(language).and_then(|m| m.get(msgid)) {
            return Some(found.as_str());
        }
        // "pt-br" falls back to "pt".
        let base = language.split(['-', '_']).next()?;
        if base == language {
            return None;
        }
        self.messages
            .get(base)
            .and_then(|m| m.get(msgid))
            .map(String::as_str)
    }
}

impl Translator for Catalog {
    fn translate(&self, language: Option<&str>, msgid: &str) -> String {
        language
            .and_then(|lang| self.lookup(lang, msgid))
            .unwrap_or(msgid)
            .to_string()
    }
}
