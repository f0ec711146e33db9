//! Sender trait definition and shared error types.

use alertgate_core::{ConfigError, Contact, Event, PlotImage, SenderSettings, State, Trigger};

/// Errors that can occur while composing or delivering a notification.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("invalid destination: {0}")]
    Validation(String),

    #[error("failed to encode request body: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway replied with {status}: {body}")]
    Gateway {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template rendering failed: {0}")]
    Template(String),
}

impl From<ConfigError> for SendError {
    fn from(e: ConfigError) -> Self {
        SendError::Config(e.to_string())
    }
}

/// Outcome of a send that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The gateway accepted the message.
    Delivered,
    /// The gateway permanently rejected the message. It must not be retried.
    Dropped,
}

/// Everything a sender needs for one notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub events: Vec<Event>,
    pub contact: Contact,
    pub trigger: Trigger,
    pub plots: Vec<PlotImage>,
    pub throttled: bool,
}

impl Notification {
    /// A single-event notification in the `TEST` state.
    pub fn test(contact: Contact) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            events: vec![Event::new("Test.metric.value", State::Test, State::Test)
                .with_value(1.0)
                .with_timestamp(now)],
            contact,
            trigger: Trigger {
                id: "test".to_string(),
                name: "Test Trigger".to_string(),
                ..Default::default()
            },
            plots: Vec::new(),
            throttled: false,
        }
    }
}

/// A gateway-backed notification channel.
#[async_trait::async_trait]
pub trait NotificationSender: Send + Sync {
    /// Build the sender from flat settings. `span` is the logging context all
    /// of the sender's diagnostics are recorded under.
    fn initialize(settings: &SenderSettings, span: tracing::Span) -> Result<Self, SendError>
    where
        Self: Sized;

    /// Compose and deliver one notification with a single HTTP call.
    async fn send(&self, notification: &Notification) -> Result<Delivery, SendError>;

    /// Send a test notification to `contact`.
    async fn test(&self, contact: Contact) -> Result<Delivery, SendError> {
        self.send(&Notification::test(contact)).await
    }

    /// Human-readable name for this channel (e.g., "sms", "mail").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub trigger_id: String,
    pub delivery: Option<Delivery>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl DispatchResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}
