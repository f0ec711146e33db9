//! Best-effort URL shortening.
//!
//! Shortening is opt-in: without a configured endpoint links pass through
//! unchanged. Any failure of the shortening call is logged and the original
//! link is used instead, so a broken shortener never fails a notification.

use alertgate_core::SenderSettings;
use serde::Deserialize;
use tracing::Instrument;

/// Status the shortening service answers with on success.
const SUCCESS_STATUS: reqwest::StatusCode = reqwest::StatusCode::OK;

#[derive(Debug, thiserror::Error)]
enum ShortenError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct ShortenResponse {
    id: String,
}

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    key: Option<String>,
}

/// Turns long trigger links into short ones via an external service.
#[derive(Debug, Clone)]
pub struct LinkShortener {
    endpoint: Option<Endpoint>,
    client: reqwest::Client,
    span: tracing::Span,
}

impl LinkShortener {
    /// A shortener that always returns its input.
    pub fn disabled() -> Self {
        Self {
            endpoint: None,
            client: reqwest::Client::new(),
            span: tracing::Span::none(),
        }
    }

    /// Read `shortener_url` and `shortener_key` from `settings`. Shortening
    /// stays disabled when `shortener_url` is unset.
    pub fn from_settings(
        settings: &SenderSettings,
        client: reqwest::Client,
        span: tracing::Span,
    ) -> Self {
        let endpoint = settings.optional("shortener_url").map(|url| Endpoint {
            url: url.to_string(),
            key: settings.optional("shortener_key").map(str::to_string),
        });
        Self {
            endpoint,
            client,
            span,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Shorten `long_link`, returning it unchanged on any failure.
    pub async fn shorten(&self, long_link: &str) -> String {
        let Some(endpoint) = &self.endpoint else {
            return long_link.to_string();
        };

        match self
            .request(endpoint, long_link)
            .instrument(self.span.clone())
            .await
        {
            Ok(short) => {
                self.span.in_scope(|| {
                    tracing::debug!(long = %long_link, short = %short, "link shortened");
                });
                short
            }
            Err(e) => {
                self.span.in_scope(|| {
                    tracing::warn!(error = %e, link = %long_link, "can't shorten url, using long link");
                });
                long_link.to_string()
            }
        }
    }

    /// Link for a trigger page. Test notifications point at the front page
    /// itself and are never shortened.
    pub async fn trigger_link(&self, front_uri: &str, trigger_id: &str, is_test: bool) -> String {
        if is_test {
            return front_uri.to_string();
        }
        self.shorten(&format!("{front_uri}/trigger/{trigger_id}"))
            .await
    }

    async fn request(&self, endpoint: &Endpoint, long_link: &str) -> Result<String, ShortenError> {
        let mut request = self
            .client
            .post(&endpoint.url)
            .json(&serde_json::json!({ "longUrl": long_link }));
        if let Some(key) = &endpoint.key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != SUCCESS_STATUS {
            return Err(ShortenError::Status(status));
        }

        let body = response.text().await?;
        let parsed: ShortenResponse =
            serde_json::from_str(&body).map_err(|e| ShortenError::Malformed(e.to_string()))?;
        if parsed.id.trim().is_empty() {
            return Err(ShortenError::Malformed("empty short link".to_string()));
        }
        Ok(parsed.id)
    }
}
