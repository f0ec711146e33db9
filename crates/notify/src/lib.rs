//! Alert notification composition and gateway delivery.
//!
//! This crate provides:
//! - `NotificationSender` trait with SMS and mail gateway implementations
//! - Byte-budgeted SMS composition and email payload composition
//! - Best-effort link shortening with fallback to the long link
//! - Minijinja previews of mail templates
//! - Dispatcher that picks the sender for a contact kind

pub mod dispatcher;
pub mod format;
pub mod mail;
pub mod shortener;
pub mod sms;
pub mod templating;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use format::ValueFormatter;
pub use mail::{MailComposer, MailPayload, MailSender};
pub use shortener::LinkShortener;
pub use sms::{compose_sms, ComposedSms, SmsSender};
pub use traits::{Delivery, Notification, NotificationSender, SendError};
