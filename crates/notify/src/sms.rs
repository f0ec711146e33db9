//! SMS gateway sender.
//!
//! Composes a single SMS of at most [`MAX_MESSAGE_SIZE`] bytes and posts it
//! as JSON with basic auth. The message is laid out as:
//!
//! ```text
//! <trigger name, 40 chars max>
//! <state> <metric> <value>      one line per event, in input order
//! ...and <N>                    only when events were cut
//! throttled                     only when throttled
//! <link>
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use alertgate_core::{is_test_batch, Event, SenderSettings};
use regex::Regex;
use serde::Serialize;
use tracing::Instrument;

use crate::format::ValueFormatter;
use crate::shortener::LinkShortener;
use crate::traits::{Delivery, Notification, NotificationSender, SendError};

/// Transport limit for a single message, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 280;

const TRUNCATED_TEMPLATE: &str = "...and %d\n";
const THROTTLED_MARKER: &str = "throttled\n";
const MAX_TRIGGER_NAME_CHARS: usize = 40;
const MAX_METRIC_CHARS: usize = 20;
const KEPT_METRIC_CHARS: usize = 18;

const SUCCESS_STATUS: reqwest::StatusCode = reqwest::StatusCode::CREATED;
const DEFAULT_SOURCE_ADDRESS: &str = "alertgate";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A composed SMS body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedSms {
    pub text: String,
    /// Number of events left out of the message.
    pub omitted: usize,
}

/// Build the SMS body for `events`.
///
/// Event lines are added greedily while they fit the space left after
/// reserving room for the link, the truncation marker and the throttle
/// marker. The first event line is always kept; once a line does not fit,
/// it and everything after it is replaced by `...and N`.
pub fn compose_sms(trigger_name: &str, events: &[Event], throttled: bool, link: &str) -> ComposedSms {
    let marker_reserve = TRUNCATED_TEMPLATE
        .len()
        .max(truncation_marker(events.len()).len());
    let mut budget = MAX_MESSAGE_SIZE
        .saturating_sub(link.len())
        .saturating_sub(marker_reserve);
    if throttled {
        budget = budget.saturating_sub(THROTTLED_MARKER.len());
    }

    let mut text = String::with_capacity(MAX_MESSAGE_SIZE);
    text.push_str(&truncate_chars(trigger_name, MAX_TRIGGER_NAME_CHARS));
    text.push('\n');

    let mut omitted = 0;
    for (i, event) in events.iter().enumerate() {
        let line = event_line(event);
        let remaining = events.len() - i;
        // The last line may use the room reserved for the marker it makes unnecessary.
        let limit = if remaining > 1 {
            budget
        } else {
            budget + marker_reserve
        };
        if i > 0 && text.len() + line.len() > limit {
            text.push_str(&truncation_marker(remaining));
            omitted = remaining;
            break;
        }
        text.push_str(&line);
    }

    if throttled {
        text.push_str(THROTTLED_MARKER);
    }
    text.push_str(link);

    ComposedSms { text, omitted }
}

fn event_line(event: &Event) -> String {
    let metric = if event.metric.chars().count() > MAX_METRIC_CHARS {
        format!("{}..", truncate_chars(&event.metric, KEPT_METRIC_CHARS))
    } else {
        event.metric.clone()
    };
    format!(
        "{} {} {}\n",
        event.new_state,
        metric,
        ValueFormatter::SMS.format_opt(event.value)
    )
}

fn truncation_marker(omitted: usize) -> String {
    format!("...and {omitted}\n")
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+79[0-9]{9}$").expect("phone pattern is valid"))
}

/// Normalize a contact address to `+7XXXXXXXXXX` and check it is a mobile number.
///
/// Bare national numbers get the `+7` prefix; addresses that already start
/// with `+` are checked as given.
pub fn validate_phone(address: &str) -> Result<String, SendError> {
    let address = address.trim();
    let phone = if address.starts_with('+') {
        address.to_string()
    } else {
        format!("+7{address}")
    };
    if phone_pattern().is_match(&phone) {
        Ok(phone)
    } else {
        Err(SendError::Validation(format!("invalid phone number: {phone}")))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SmsRequest<'a> {
    text: &'a str,
    destination_address: SmsAddress<'a>,
    source_address: SmsAddress<'a>,
    delivery_control: bool,
}

#[derive(Debug, Serialize)]
struct SmsAddress<'a> {
    address: &'a str,
    npi: u8,
    ton: u8,
}

/// Delivers notifications as SMS through the HTTP gateway.
#[derive(Debug)]
pub struct SmsSender {
    url: String,
    login: String,
    password: String,
    front_uri: String,
    source_address: String,
    shortener: LinkShortener,
    /// Shared HTTP client (connection pooling, request timeout).
    client: reqwest::Client,
    span: tracing::Span,
}

impl SmsSender {
    /// Compose the message body for `notification` without sending it.
    pub async fn compose(&self, notification: &Notification) -> ComposedSms {
        let link = self
            .shortener
            .trigger_link(
                &self.front_uri,
                &notification.trigger.id,
                is_test_batch(&notification.events),
            )
            .await;
        compose_sms(
            &notification.trigger.name,
            &notification.events,
            notification.throttled,
            &link,
        )
    }

    async fn deliver(&self, phone: &str, text: &str) -> Result<Delivery, SendError> {
        let request = SmsRequest {
            text,
            destination_address: SmsAddress {
                address: phone,
                npi: 1,
                ton: 1,
            },
            source_address: SmsAddress {
                address: &self.source_address,
                npi: 1,
                ton: 5,
            },
            delivery_control: true,
        };
        let body = serde_json::to_string(&request)?;
        tracing::debug!(body = %body, "calling sms gateway");

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.login, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let answer = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if status != SUCCESS_STATUS {
            tracing::warn!(%status, body = %answer, "sms gateway replied with error");
            return Err(SendError::Gateway {
                status,
                body: answer,
            });
        }

        tracing::debug!(%status, body = %answer, "sms gateway answer");
        tracing::info!(channel = "sms", bytes = text.len(), "notification delivered");
        Ok(Delivery::Delivered)
    }
}

#[async_trait::async_trait]
impl NotificationSender for SmsSender {
    fn initialize(settings: &SenderSettings, span: tracing::Span) -> Result<Self, SendError> {
        let timeout = settings.parse_or("timeout_secs", DEFAULT_TIMEOUT_SECS)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| SendError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: settings.required("url")?.to_string(),
            login: settings.required("login")?.to_string(),
            password: settings.required("password")?.to_string(),
            front_uri: settings
                .required("front_uri")?
                .trim_end_matches('/')
                .to_string(),
            source_address: settings
                .or("source_address", DEFAULT_SOURCE_ADDRESS)
                .to_string(),
            shortener: LinkShortener::from_settings(settings, client.clone(), span.clone()),
            client,
            span,
        })
    }

    async fn send(&self, notification: &Notification) -> Result<Delivery, SendError> {
        let phone = validate_phone(&notification.contact.address)?;
        let composed = self.compose(notification).await;
        if composed.omitted > 0 {
            self.span.in_scope(|| {
                tracing::debug!(
                    omitted = composed.omitted,
                    trigger_id = %notification.trigger.id,
                    "sms truncated"
                );
            });
        }
        self.deliver(&phone, &composed.text)
            .instrument(self.span.clone())
            .await
    }

    fn channel_name(&self) -> &str {
        "sms"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertgate_core::State;

    const LINK: &str = "https://goo.gl/AbCdEf";

    fn events(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| {
                Event::new(format!("Metric number #{i}"), State::Ok, State::Error)
                    .with_value(i as f64 * 10.0)
            })
            .collect()
    }

    fn event_lines(text: &str) -> Vec<&str> {
        text.lines()
            .skip(1)
            .filter(|l| l.starts_with("ERROR "))
            .collect()
    }

    #[test]
    fn short_batch_is_untouched() {
        let composed = compose_sms("Disk usage", &events(2), false, LINK);
        assert_eq!(
            composed.text,
            "Disk usage\nERROR Metric number #0 0\nERROR Metric number #1 10\nhttps://goo.gl/AbCdEf"
        );
        assert_eq!(composed.omitted, 0);
    }

    #[test]
    fn zero_events_is_name_and_link() {
        let composed = compose_sms("Disk usage", &[], false, LINK);
        assert_eq!(composed.text, "Disk usage\nhttps://goo.gl/AbCdEf");
    }

    #[test]
    fn throttled_marker_precedes_link() {
        let composed = compose_sms("Disk usage", &events(1), true, LINK);
        assert!(composed.text.ends_with("\nthrottled\nhttps://goo.gl/AbCdEf"));
    }

    #[test]
    fn long_batch_is_truncated_with_count() {
        let all = events(50);
        let composed = compose_sms("Disk usage", &all, false, LINK);
        let kept = event_lines(&composed.text).len();
        assert!(kept > 0 && kept < all.len());
        assert_eq!(composed.omitted, all.len() - kept);
        assert!(composed
            .text
            .contains(&format!("\n...and {}\n", all.len() - kept)));
        assert!(composed.text.ends_with(LINK));
        assert!(composed.text.len() <= MAX_MESSAGE_SIZE);
    }

    #[test]
    fn kept_lines_are_the_first_ones() {
        let all = events(30);
        let composed = compose_sms("Disk usage", &all, true, LINK);
        for (i, line) in event_lines(&composed.text).iter().enumerate() {
            assert!(line.contains(&format!("#{i} ")), "line {i}: {line}");
        }
    }

    #[test]
    fn never_exceeds_limit() {
        let long_name = "Trigger with a name that is much longer than forty characters";
        for n in 0..120 {
            for throttled in [false, true] {
                for link in [LINK, "https://moira.example.com/trigger/0123456789abcdef-0123"] {
                    let composed = compose_sms(long_name, &events(n), throttled, link);
                    assert!(
                        composed.text.len() <= MAX_MESSAGE_SIZE,
                        "n={n} throttled={throttled}: {} bytes",
                        composed.text.len()
                    );
                }
            }
        }
    }

    #[test]
    fn trigger_name_is_cut_to_forty_chars() {
        let name = "x".repeat(60);
        let composed = compose_sms(&name, &[], false, LINK);
        assert_eq!(composed.text.lines().next().unwrap().len(), 40);
    }

    #[test]
    fn long_metric_is_shortened() {
        let event = Event::new("very.long.metric.name.for.sms", State::Ok, State::Warn)
            .with_value(1500.0);
        assert_eq!(event_line(&event), "WARN very.long.metric.n.. 1.5 k\n");

        let exact = Event::new("a".repeat(20), State::Ok, State::Warn);
        assert_eq!(event_line(&exact), format!("WARN {} 0\n", "a".repeat(20)));
    }

    #[test]
    fn first_line_is_kept_even_when_oversized() {
        let link = "l".repeat(250);
        let composed = compose_sms("Disk usage", &events(3), false, &link);
        assert_eq!(event_lines(&composed.text).len(), 1);
        assert!(composed.text.contains("\n...and 2\n"));
    }

    #[test]
    fn phone_with_prefix_is_accepted() {
        assert_eq!(validate_phone("+79123456789").unwrap(), "+79123456789");
    }

    #[test]
    fn bare_national_number_gets_prefix() {
        assert_eq!(validate_phone("9123456789").unwrap(), "+79123456789");
    }

    #[test]
    fn wrong_operator_digit_is_rejected() {
        let err = validate_phone("+71234567890").unwrap_err();
        assert!(matches!(err, SendError::Validation(_)));
        assert!(err.to_string().contains("+71234567890"));
    }

    #[test]
    fn initialize_requires_credentials() {
        let settings = SenderSettings::from([
            ("url", "https://sms.example.com"),
            ("front_uri", "https://moira.example.com"),
        ]);
        let err = SmsSender::initialize(&settings, tracing::Span::none()).unwrap_err();
        assert!(err.to_string().contains("login"), "got: {err}");
    }

    #[test]
    fn channel_name_is_sms() {
        let settings = SenderSettings::from([
            ("url", "https://sms.example.com"),
            ("login", "bot"),
            ("password", "secret"),
            ("front_uri", "https://moira.example.com/"),
        ]);
        let sender = SmsSender::initialize(&settings, tracing::Span::none()).unwrap();
        assert_eq!(sender.channel_name(), "sms");
        assert_eq!(sender.front_uri, "https://moira.example.com");
    }
}
