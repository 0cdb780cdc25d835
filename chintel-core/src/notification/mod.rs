//! Alert routing: decides whether a scored event alerts, where, and with
//! what text. Delivery itself lives in [`crate::services::notifier`].

mod router;
mod template;

pub use router::{Notification, NotificationRouter, RouteDecision, SkipReason, UNKNOWN_METHOD};
pub use template::render_template;
