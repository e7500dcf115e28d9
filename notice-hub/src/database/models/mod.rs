//! Database models for notice-hub.
//!
//! These models map directly to the database schema.

pub mod notice;
pub mod notice_type;
pub mod observed_item;
pub mod preference;
pub mod queue_batch;
pub mod user;

pub use notice::*;
pub use notice_type::*;
pub use observed_item::*;
pub use preference::*;
pub use queue_batch::*;
pub use user::*;
