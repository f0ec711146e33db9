//! Mail gateway sender.
//!
//! The gateway renders the HTML body itself from a named template; this
//! module only builds the template variables and the inline plot
//! attachments, then posts them as JSON with basic auth.

use std::collections::BTreeMap;
use std::time::Duration;

use alertgate_core::{subject_state, Contact, Event, PlotImage, SenderSettings, State, Trigger};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::format::ValueFormatter;
use crate::traits::{Delivery, Notification, NotificationSender, SendError};

const SUCCESS_STATUS: reqwest::StatusCode = reqwest::StatusCode::CREATED;
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_DATE_TIME_FORMAT: &str = "%H:%M %d.%m.%Y";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PLOT_CONTENT_TYPE: &str = "image/png";

/// Template variables for one notification email.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailVars {
    pub link: String,
    pub throttled: bool,
    /// One entry per event, in input order.
    pub rows: Vec<BTreeMap<String, String>>,
    #[serde(rename = "desc")]
    pub description: String,
    #[serde(rename = "desc_provided")]
    pub description_provided: bool,
    #[serde(rename = "name")]
    pub trigger_name: String,
    pub tags: String,
    pub trigger_state: String,
    #[serde(rename = "is_test")]
    pub test_notification: bool,
    pub plot_cids: Vec<String>,
    pub plot_cids_provided: bool,
}

/// An inline attachment referenced from the body by its content-id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub data: String,
}

/// Composed email, ready to be wrapped into a gateway request.
#[derive(Debug, Clone, PartialEq)]
pub struct MailPayload {
    pub subject: String,
    pub vars: MailVars,
    pub contents: Vec<Content>,
}

/// Request body accepted by the mail gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailRequest {
    pub channel: String,
    pub address: String,
    pub vars: MailVars,
    pub template: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<Content>,
}

/// Builds [`MailPayload`]s. Holds only immutable per-sender settings.
#[derive(Debug, Clone)]
pub struct MailComposer {
    front_uri: String,
    timezone: Tz,
    date_time_format: String,
}

impl MailComposer {
    /// Create a composer. Fails when `date_time_format` is not a valid
    /// strftime string.
    pub fn new(front_uri: &str, timezone: Tz, date_time_format: &str) -> Result<Self, SendError> {
        if StrftimeItems::new(date_time_format).any(|item| matches!(item, Item::Error)) {
            return Err(SendError::Config(format!(
                "invalid date_time_format: {date_time_format}"
            )));
        }
        Ok(Self {
            front_uri: front_uri.trim_end_matches('/').to_string(),
            timezone,
            date_time_format: date_time_format.to_string(),
        })
    }

    pub fn compose(
        &self,
        trigger: &Trigger,
        events: &[Event],
        plots: &[PlotImage],
        throttled: bool,
    ) -> MailPayload {
        let state = subject_state(events);
        let state_label = state.map(State::as_str).unwrap_or_default();
        let tags = trigger.tag_string();
        let (contents, plot_cids) = plot_contents(plots);

        let (description, description_provided) = match trigger.description() {
            Some(desc) => (format_description(desc), true),
            None => (String::new(), false),
        };

        let vars = MailVars {
            link: format!("{}/trigger/{}", self.front_uri, trigger.id),
            throttled,
            rows: events.iter().map(|e| self.row(trigger, e)).collect(),
            description,
            description_provided,
            trigger_name: trigger.name.clone(),
            tags: tags.clone(),
            trigger_state: state_label.to_string(),
            test_notification: state == Some(State::Test),
            plot_cids_provided: !plot_cids.is_empty(),
            plot_cids,
        };

        MailPayload {
            subject: format!("{} {} {}", state_label, trigger.name, tags),
            vars,
            contents,
        }
    }

    fn row(&self, trigger: &Trigger, event: &Event) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("metric".to_string(), event.metric.clone()),
            ("timestamp".to_string(), self.timestamp(event)),
            ("oldstate".to_string(), event.previous_state.to_string()),
            ("state".to_string(), event.new_state.to_string()),
            (
                "value".to_string(),
                ValueFormatter::EMAIL.format_opt(event.value),
            ),
            ("warn_value".to_string(), trigger.warn_value.to_string()),
            ("error_value".to_string(), trigger.error_value.to_string()),
            ("message".to_string(), event.message_or_empty().to_string()),
        ])
    }

    fn timestamp(&self, event: &Event) -> String {
        event
            .datetime()
            .map(|dt| {
                dt.with_timezone(&self.timezone)
                    .format(&self.date_time_format)
                    .to_string()
            })
            .unwrap_or_default()
    }
}

/// One `image/png` content per plot with content-id `plot<index>.png`, plus
/// the content-ids in the same order.
pub fn plot_contents(plots: &[PlotImage]) -> (Vec<Content>, Vec<String>) {
    plots
        .iter()
        .enumerate()
        .map(|(i, plot)| {
            let cid = format!("plot{i}.png");
            let content = Content {
                id: cid.clone(),
                name: cid.clone(),
                content_type: PLOT_CONTENT_TYPE.to_string(),
                data: STANDARD.encode(plot.bytes()),
            };
            (content, cid)
        })
        .unzip()
}

/// HTML-escape a trigger description and turn newlines into `<br/>`.
pub fn format_description(desc: &str) -> String {
    escape_html(desc).replace('\n', "\n<br/>")
}

fn escape_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&#34;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(ch),
        }
    }
    result
}

/// Check that `contact` holds a syntactically valid email address.
pub fn validate_email(contact: &Contact) -> Result<(), SendError> {
    contact
        .address
        .trim()
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|e| SendError::Validation(format!("invalid email address '{}': {e}", contact.address)))
}

/// Delivers notifications through the HTTP mail gateway.
#[derive(Debug)]
pub struct MailSender {
    url: String,
    login: String,
    password: String,
    channel: String,
    template: String,
    composer: MailComposer,
    /// Shared HTTP client (connection pooling, request timeout).
    client: reqwest::Client,
    span: tracing::Span,
}

impl MailSender {
    /// Build the gateway request for `notification` without sending it.
    pub fn build_request(&self, notification: &Notification) -> MailRequest {
        let payload = self.composer.compose(
            &notification.trigger,
            &notification.events,
            &notification.plots,
            notification.throttled,
        );
        MailRequest {
            channel: self.channel.clone(),
            address: notification.contact.address.trim().to_string(),
            vars: payload.vars,
            template: self.template.clone(),
            subject: payload.subject,
            contents: payload.contents,
        }
    }

    async fn deliver(&self, request: &MailRequest) -> Result<Delivery, SendError> {
        let body = serde_json::to_string(request)?;
        tracing::debug!(
            subject = %request.subject,
            attachments = request.contents.len(),
            "calling mail gateway"
        );

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.login, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            tracing::error!(%status, address = %request.address, "mail gateway rejected message, dropping it");
            return Ok(Delivery::Dropped);
        }
        if status != SUCCESS_STATUS {
            let answer = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(%status, body = %answer, "mail gateway replied with error");
            return Err(SendError::Gateway {
                status,
                body: answer,
            });
        }

        tracing::info!(
            channel = "mail",
            subject = %request.subject,
            "notification delivered"
        );
        Ok(Delivery::Delivered)
    }
}

#[async_trait::async_trait]
impl NotificationSender for MailSender {
    fn initialize(settings: &SenderSettings, span: tracing::Span) -> Result<Self, SendError> {
        let timezone_name = settings.or("timezone", DEFAULT_TIMEZONE);
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|_| SendError::Config(format!("unknown timezone: {timezone_name}")))?;
        let composer = MailComposer::new(
            settings.required("front_uri")?,
            timezone,
            settings.or("date_time_format", DEFAULT_DATE_TIME_FORMAT),
        )?;

        let timeout = settings.parse_or("timeout_secs", DEFAULT_TIMEOUT_SECS)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| SendError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: settings.required("url")?.to_string(),
            login: settings.required("login")?.to_string(),
            password: settings.required("password")?.to_string(),
            channel: settings.required("channel")?.to_string(),
            template: settings.required("template")?.to_string(),
            composer,
            client,
            span,
        })
    }

    async fn send(&self, notification: &Notification) -> Result<Delivery, SendError> {
        validate_email(&notification.contact)?;
        let request = self.build_request(notification);
        self.deliver(&request).instrument(self.span.clone()).await
    }

    fn channel_name(&self) -> &str {
        "mail"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer() -> MailComposer {
        MailComposer::new("http://localhost/", chrono_tz::UTC, "%H:%M %d.%m.%Y").unwrap()
    }

    fn trigger() -> Trigger {
        Trigger {
            id: "triggerID-0000000000001".to_string(),
            name: "test trigger 1".to_string(),
            warn_value: 10.0,
            error_value: 20.5,
            tags: vec!["test-tag-1".to_string()],
            description: Some("# header 1\nsome text **bold text**".to_string()),
        }
    }

    fn test_events(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| Event::new(format!("Metric number #{i}"), State::Test, State::Test))
            .collect()
    }

    #[test]
    fn one_plot() {
        let payload = composer().compose(&trigger(), &test_events(10), &[PlotImage(vec![1, 0, 1])], true);
        assert_eq!(
            payload.contents,
            vec![Content {
                id: "plot0.png".to_string(),
                name: "plot0.png".to_string(),
                content_type: "image/png".to_string(),
                data: "AQAB".to_string(),
            }]
        );
        assert_eq!(payload.vars.plot_cids, vec!["plot0.png"]);
        assert!(payload.vars.plot_cids_provided);
    }

    #[test]
    fn multiple_plots_keep_order() {
        let plots: Vec<PlotImage> = vec![
            PlotImage(vec![1, 0, 1]),
            PlotImage(vec![1, 1, 0]),
            PlotImage(vec![1, 0, 0]),
        ];
        let payload = composer().compose(&trigger(), &test_events(10), &plots, true);
        let ids: Vec<&str> = payload.contents.iter().map(|c| c.id.as_str()).collect();
        let data: Vec<&str> = payload.contents.iter().map(|c| c.data.as_str()).collect();
        assert_eq!(ids, vec!["plot0.png", "plot1.png", "plot2.png"]);
        assert_eq!(data, vec!["AQAB", "AQEA", "AQAA"]);
        assert_eq!(payload.vars.plot_cids, ids);
    }

    #[test]
    fn no_plots_means_no_contents() {
        let payload = composer().compose(&trigger(), &test_events(1), &[], false);
        assert!(payload.contents.is_empty());
        assert!(payload.vars.plot_cids.is_empty());
        assert!(!payload.vars.plot_cids_provided);
    }

    #[test]
    fn link_and_subject() {
        let events = vec![
            Event::new("a", State::Ok, State::Warn),
            Event::new("b", State::Warn, State::Error),
        ];
        let payload = composer().compose(&trigger(), &events, &[], false);
        assert_eq!(payload.vars.link, "http://localhost/trigger/triggerID-0000000000001");
        assert_eq!(payload.subject, "ERROR test trigger 1 [test-tag-1]");
        assert_eq!(payload.vars.trigger_state, "ERROR");
        assert!(!payload.vars.test_notification);
    }

    #[test]
    fn test_state_marks_test_notification() {
        let payload = composer().compose(&trigger(), &test_events(2), &[], false);
        assert!(payload.vars.test_notification);
        assert_eq!(payload.vars.trigger_state, "TEST");
    }

    #[test]
    fn rows_follow_event_order_and_fields() {
        let events = vec![
            Event::new("very.long.metric.name.is.not.truncated.in.mail", State::Ok, State::Warn)
                .with_value(1_234_567.0)
                .with_timestamp(1_700_000_000)
                .with_message("disk almost full"),
            Event::new("second", State::Warn, State::Ok),
        ];
        let payload = composer().compose(&trigger(), &events, &[], false);
        assert_eq!(payload.vars.rows.len(), 2);

        let row = &payload.vars.rows[0];
        assert_eq!(row["metric"], "very.long.metric.name.is.not.truncated.in.mail");
        assert_eq!(row["timestamp"], "22:13 14.11.2023");
        assert_eq!(row["oldstate"], "OK");
        assert_eq!(row["state"], "WARN");
        assert_eq!(row["value"], "1.234567 M");
        assert_eq!(row["warn_value"], "10");
        assert_eq!(row["error_value"], "20.5");
        assert_eq!(row["message"], "disk almost full");

        let second = &payload.vars.rows[1];
        assert_eq!(second["metric"], "second");
        assert_eq!(second["value"], "0");
        assert_eq!(second["message"], "");
    }

    #[test]
    fn timestamp_uses_configured_timezone() {
        let moscow = MailComposer::new("http://localhost", chrono_tz::Europe::Moscow, "%H:%M %d.%m.%Y")
            .unwrap();
        let events = vec![Event::new("a", State::Ok, State::Warn).with_timestamp(1_700_000_000)];
        let payload = moscow.compose(&trigger(), &events, &[], false);
        assert_eq!(payload.vars.rows[0]["timestamp"], "01:13 15.11.2023");
    }

    #[test]
    fn description_is_escaped_with_line_breaks() {
        let mut trigger = trigger();
        trigger.description = Some("<script>alert('x')</script>\nsecond & last".to_string());
        let payload = composer().compose(&trigger, &test_events(1), &[], false);
        assert!(payload.vars.description_provided);
        assert_eq!(
            payload.vars.description,
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;\n<br/>second &amp; last"
        );
    }

    #[test]
    fn empty_description_is_not_provided() {
        let mut trigger = trigger();
        trigger.description = Some(String::new());
        let payload = composer().compose(&trigger, &test_events(1), &[], false);
        assert!(!payload.vars.description_provided);
        assert_eq!(payload.vars.description, "");
    }

    #[test]
    fn invalid_date_format_is_rejected() {
        let result = MailComposer::new("http://localhost", chrono_tz::UTC, "%H:%Q");
        assert!(matches!(result, Err(SendError::Config(_))));
    }

    #[test]
    fn request_omits_empty_contents() {
        let request = MailRequest {
            channel: "alerts".to_string(),
            address: "mail1@example.com".to_string(),
            vars: MailVars::default(),
            template: "fancy".to_string(),
            subject: "OK".to_string(),
            contents: Vec::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("contents").is_none());
        assert_eq!(json["vars"]["desc_provided"], false);
        assert_eq!(json["vars"]["is_test"], false);
    }

    #[test]
    fn email_validation() {
        assert!(validate_email(&Contact::email("mail1@example.com")).is_ok());
        let err = validate_email(&Contact::email("not-an-email")).unwrap_err();
        assert!(matches!(err, SendError::Validation(_)));
    }

    #[test]
    fn initialize_rejects_unknown_timezone() {
        let settings = SenderSettings::from([
            ("url", "https://mail.example.com"),
            ("login", "login"),
            ("password", "password"),
            ("front_uri", "http://localhost"),
            ("channel", "moira-alerts"),
            ("template", "fancy"),
            ("timezone", "Mars/Olympus"),
        ]);
        let err = MailSender::initialize(&settings, tracing::Span::none()).unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"), "got: {err}");
    }
}
