//! Delivery media.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A delivery channel a preference applies to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum Medium {
    #[strum(serialize = "Email")]
    Email,
    #[strum(serialize = "Display")]
    Display,
    #[strum(serialize = "SMS")]
    Sms,
}

impl Medium {
    /// Stored code of this medium.
    pub fn code(self) -> &'static str {
        match self {
            Self::Email => "1",
            Self::Display => "2",
            Self::Sms => "3",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "1" => Ok(Self::Email),
            "2" => Ok(Self::Display),
            "3" => Ok(Self::Sms),
            other => Err(Error::validation(format!("unknown medium code '{other}'"))),
        }
    }

    /// Sensitivity used to compute the default preference: the medium is
    /// enabled when `sensitivity <= notice_type.default`.
    pub fn sensitivity(self) -> i64 {
        match self {
            Self::Email => 2,
            Self::Display | Self::Sms => 3,
        }
    }

    /// Whether this medium is on by default for a notice type threshold.
    pub fn default_send(self, threshold: i64) -> bool {
        self.sensitivity() <= threshold
    }

    /// Name of the per-object permission that overrides this medium for `label`.
    pub fn permission_name(self, label: &str) -> String {
        format!("{self}-{label}")
    }
}
