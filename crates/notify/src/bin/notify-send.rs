//! notify-send — compose and deliver one alert notification from the command line.
//!
//! Sender settings come from the environment (and `.env`):
//! - `ALERTGATE_SMS_*` for the SMS gateway (e.g. `ALERTGATE_SMS_URL`)
//! - `ALERTGATE_MAIL_*` for the mail gateway (e.g. `ALERTGATE_MAIL_TEMPLATE`)

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;

use alertgate_core::config::load_dotenv;
use alertgate_core::{Contact, ContactKind, Event, PlotImage, SenderSettings, State, Trigger};
use alertgate_notify::templating::TemplateRenderer;
use alertgate_notify::{Dispatcher, MailSender, Notification, NotificationSender, SmsSender};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Channel {
    Sms,
    Mail,
}

/// Send an alert notification through the SMS or mail gateway.
#[derive(Parser, Debug)]
#[command(name = "notify-send", version, about)]
struct Cli {
    /// Gateway to use.
    #[arg(long, value_enum, default_value = "sms")]
    channel: Channel,

    /// Phone number or email address of the recipient.
    #[arg(long)]
    address: String,

    /// Send the built-in test notification instead of the given events.
    #[arg(long)]
    test: bool,

    #[arg(long, default_value = "manual")]
    trigger_id: String,

    #[arg(long, default_value = "Manual notification")]
    trigger_name: String,

    #[arg(long = "tag")]
    tags: Vec<String>,

    #[arg(long)]
    description: Option<String>,

    /// Event as `STATE:metric[=value]`, e.g. `ERROR:disk.root=93.5`. Repeatable.
    #[arg(long = "event", value_parser = parse_event)]
    events: Vec<Event>,

    #[arg(long)]
    throttled: bool,

    /// PNG file attached as an inline plot (mail only). Repeatable.
    #[arg(long = "plot")]
    plots: Vec<PathBuf>,

    /// Print the composed payload instead of sending it.
    #[arg(long)]
    dry_run: bool,

    /// Print the mail rendered with the built-in template instead of sending it.
    #[arg(long)]
    preview: bool,
}

fn parse_event(raw: &str) -> Result<Event, String> {
    let (state, rest) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected STATE:metric[=value], got '{raw}'"))?;
    let state: State = state.parse()?;
    let now = chrono::Utc::now().timestamp();
    let event = match rest.split_once('=') {
        Some((metric, value)) => {
            let value: f64 = value
                .parse()
                .map_err(|e| format!("invalid value '{value}': {e}"))?;
            Event::new(metric, State::Ok, state).with_value(value)
        }
        None => Event::new(rest, State::Ok, state),
    };
    Ok(event.with_timestamp(now))
}

impl Cli {
    fn contact(&self) -> Contact {
        match self.channel {
            Channel::Sms => Contact::phone(&self.address),
            Channel::Mail => Contact::email(&self.address),
        }
    }

    fn notification(&self) -> anyhow::Result<Notification> {
        if self.test {
            return Ok(Notification::test(self.contact()));
        }
        let plots = self
            .plots
            .iter()
            .map(|path| {
                std::fs::read(path)
                    .map(PlotImage)
                    .with_context(|| format!("failed to read plot {}", path.display()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Notification {
            events: self.events.clone(),
            contact: self.contact(),
            trigger: Trigger {
                id: self.trigger_id.clone(),
                name: self.trigger_name.clone(),
                tags: self.tags.clone(),
                description: self.description.clone(),
                ..Default::default()
            },
            plots,
            throttled: self.throttled,
        })
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let notification = cli.notification()?;

    let dispatcher = match cli.channel {
        Channel::Sms => {
            let settings = SenderSettings::from_env("ALERTGATE_SMS");
            settings.log_summary("sms");
            let sender = SmsSender::initialize(&settings, tracing::info_span!("sender", channel = "sms"))
                .context("failed to initialize sms sender")?;
            if cli.dry_run {
                println!("{}", sender.compose(&notification).await.text);
                return Ok(());
            }
            Dispatcher::empty().with(ContactKind::Phone, Box::new(sender))
        }
        Channel::Mail => {
            let settings = SenderSettings::from_env("ALERTGATE_MAIL");
            settings.log_summary("mail");
            let sender = MailSender::initialize(&settings, tracing::info_span!("sender", channel = "mail"))
                .context("failed to initialize mail sender")?;
            if cli.preview {
                let request = sender.build_request(&notification);
                println!("{}", TemplateRenderer::new().render_default(&request.vars)?);
                return Ok(());
            }
            if cli.dry_run {
                let request = sender.build_request(&notification);
                println!("{}", serde_json::to_string_pretty(&request)?);
                return Ok(());
            }
            Dispatcher::empty().with(ContactKind::Email, Box::new(sender))
        }
    };

    let result = dispatcher.dispatch(&notification).await?;
    if let Some(error) = result.error {
        anyhow::bail!("{} delivery failed: {error}", result.channel);
    }
    info!(
        channel = %result.channel,
        delivery = ?result.delivery,
        duration_ms = result.duration_ms,
        "notify-send finished"
    );
    Ok(())
}
