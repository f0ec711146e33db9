//! Routes notifications to the sender registered for the contact kind.
//!
//! The dispatcher performs exactly one send per notification and records
//! how it went. Retrying is left to the caller.

use std::collections::HashMap;

use alertgate_core::ContactKind;

use crate::traits::{DispatchResult, Notification, NotificationSender, SendError};

/// Maps each contact kind to the sender that serves it.
pub struct Dispatcher {
    senders: HashMap<ContactKind, Box<dyn NotificationSender>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn empty() -> Self {
        Self {
            senders: HashMap::new(),
        }
    }

    /// Register (or replace) the sender for `kind`.
    pub fn register(&mut self, kind: ContactKind, sender: Box<dyn NotificationSender>) {
        self.senders.insert(kind, sender);
    }

    pub fn with(mut self, kind: ContactKind, sender: Box<dyn NotificationSender>) -> Self {
        self.register(kind, sender);
        self
    }

    pub fn handles(&self, kind: ContactKind) -> bool {
        self.senders.contains_key(&kind)
    }

    /// Deliver `notification` through the sender for its contact kind.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Config`] when no sender is registered for the
    /// contact kind. Delivery failures are reported in the result instead.
    pub async fn dispatch(&self, notification: &Notification) -> Result<DispatchResult, SendError> {
        let kind = notification.contact.kind;
        let sender = self
            .senders
            .get(&kind)
            .ok_or_else(|| SendError::Config(format!("no sender registered for {kind} contacts")))?;

        let trigger_id = notification.trigger.id.as_str();
        let start = std::time::Instant::now();
        let result = sender.send(notification).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (delivery, error) = match result {
            Ok(delivery) => {
                tracing::info!(
                    trigger_id,
                    channel = sender.channel_name(),
                    ?delivery,
                    duration_ms,
                    "notification dispatched"
                );
                (Some(delivery), None)
            }
            Err(e) => {
                tracing::warn!(
                    trigger_id,
                    channel = sender.channel_name(),
                    error = %e,
                    duration_ms,
                    "notification delivery failed"
                );
                (None, Some(e.to_string()))
            }
        };

        Ok(DispatchResult {
            channel: sender.channel_name().to_string(),
            trigger_id: trigger_id.to_string(),
            delivery,
            error,
            duration_ms,
        })
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::empty()
    }
}
