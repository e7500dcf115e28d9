//! notice-hub library crate.
//!
//! Notice types, per-user preferences, the notice ledger, template rendering
//! and email/SMS dispatch for a host application's users.

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod notification;

pub use error::{Error, Result};
