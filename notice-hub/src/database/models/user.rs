//! User database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The projection of an application user the notification core reads.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserDbModel {
    /// Unique identifier (UUID)
    pub id: String,
    pub username: String,
    /// Email address; empty or missing means no email delivery.
    pub email: Option<String>,
    /// Phone number for SMS delivery.
    pub sms_number: Option<String>,
    /// Inactive users never receive email or SMS.
    pub is_active: bool,
    /// Preferred notification language (language store).
    pub language: Option<String>,
    /// Unix epoch milliseconds (UTC) when the user was created.
    pub created_at: i64,
}

impl UserDbModel {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            email: None,
            sms_number: None,
            is_active: true,
            language: None,
            created_at: crate::database::time::now_ms(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_sms_number(mut self, number: impl Into<String>) -> Self {
        self.sms_number = Some(number.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    pub fn has_sms_number(&self) -> bool {
        self.sms_number
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty())
    }
}

impl std::fmt::Display for UserDbModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_checks() {
        let user = UserDbModel::new("alice");
        assert!(!user.has_email());
        assert!(!user.has_sms_number());

        let user = user.with_email("  ").with_sms_number("+15550100");
        assert!(!user.has_email());
        assert!(user.has_sms_number());
        assert!(user.is_active);
    }
}
