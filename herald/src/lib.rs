//! herald: notification routing engine.
//!
//! Routes one notification request to the configured deliveries, resolving
//! recipients per delivery, holding back duplicates and snoozed targets,
//! and falling back when nothing else gets through.

pub mod archive;
pub mod conditions;
pub mod config;
pub mod context;
pub mod delivery;
pub mod directory;
pub mod dupe;
pub mod error;
pub mod logging;
pub mod notification;
pub mod scenario;
pub mod snooze;
pub mod target;
pub mod transport;

pub use context::HeraldContext;
pub use error::{Error, Result};
pub use notification::{Notification, NotificationRequest, Priority};
pub use target::Target;
