use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Setting keys whose values are never logged.
const SECRET_KEYS: &[&str] = &["password", "shortener_key"];

/// Flat string-keyed sender settings, as handed over by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderSettings {
    values: HashMap<String, String>,
}

impl SenderSettings {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Collect every `{PREFIX}_{KEY}` env var into a `key` setting
    /// (e.g. `ALERTGATE_SMS_FRONT_URI` → `front_uri`). Empty values are skipped.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, env::vars())
    }

    fn from_vars(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let marker = format!("{}_", prefix.to_uppercase());
        let values = vars
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .filter_map(|(key, value)| {
                key.strip_prefix(&marker)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_lowercase(), value))
            })
            .collect();
        Self { values }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Value for `key`, `None` when missing or empty.
    pub fn optional(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn required(&self, key: &str) -> Result<&str, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    pub fn or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.optional(key).unwrap_or(default)
    }

    /// Parse `key`, falling back to `default` when unset. A value that is set
    /// but does not parse is an error.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self, channel: &str) {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        for key in keys {
            let shown = if SECRET_KEYS.contains(&key.as_str()) {
                "***"
            } else {
                self.values[key].as_str()
            };
            tracing::info!(channel, key = %key, value = %shown, "sender setting");
        }
    }
}

impl From<HashMap<String, String>> for SenderSettings {
    fn from(values: HashMap<String, String>) -> Self {
        Self::new(values)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for SenderSettings {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_vars_are_stripped_and_lowercased() {
        let vars = vec![
            ("ALERTGATE_SMS_URL".to_string(), "https://sms.example.com".to_string()),
            ("ALERTGATE_SMS_FRONT_URI".to_string(), "https://moira.example.com".to_string()),
            ("ALERTGATE_SMS_LOGIN".to_string(), String::new()),
            ("ALERTGATE_MAIL_URL".to_string(), "https://mail.example.com".to_string()),
            ("ALERTGATE_SMS_".to_string(), "ignored".to_string()),
        ];
        let settings = SenderSettings::from_vars("alertgate_sms", vars);
        assert_eq!(settings.optional("url"), Some("https://sms.example.com"));
        assert_eq!(settings.optional("front_uri"), Some("https://moira.example.com"));
        assert_eq!(settings.optional("login"), None);
        assert_eq!(settings.values.len(), 2);
    }

    #[test]
    fn required_reports_missing_key() {
        let settings = SenderSettings::from([("url", "")]);
        assert_eq!(
            settings.required("url"),
            Err(ConfigError::Missing("url".to_string()))
        );
    }

    #[test]
    fn parse_or_uses_default_and_rejects_garbage() {
        let settings = SenderSettings::from([("timeout_secs", "abc")]);
        assert_eq!(settings.parse_or("retries", 3u32), Ok(3));
        let err = settings.parse_or("timeout_secs", 30u64).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"), "got: {err}");
    }

    #[test]
    fn or_falls_back_to_default() {
        let settings = SenderSettings::default().with("timezone", "Europe/Moscow");
        assert_eq!(settings.or("timezone", "UTC"), "Europe/Moscow");
        assert_eq!(settings.or("date_time_format", "%H:%M"), "%H:%M");
    }

    #[test]
    fn deserializes_from_flat_map() {
        let settings: SenderSettings =
            serde_json::from_str(r#"{"url":"https://x","login":"bot"}"#).unwrap();
        assert_eq!(settings.required("login"), Ok("bot"));
    }
}
