//! Repository layer for database access.
//!
//! Each table is reached through an `async_trait` repository trait with a
//! SQLx implementation, so services can be exercised against substitutes.

pub mod notice;
pub mod notice_type;
pub mod observed_item;
pub mod permission;
pub mod preference;
pub mod queue_batch;
pub mod user;

pub use notice::*;
pub use notice_type::*;
pub use observed_item::*;
pub use permission::*;
pub use preference::*;
pub use queue_batch::*;
pub use user::*;
