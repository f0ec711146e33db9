use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert state reported by the host for a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    Ok,
    Warn,
    Error,
    NoData,
    Exception,
    Test,
}

impl State {
    /// Relative severity used to pick the subject state of a batch.
    pub fn weight(self) -> u32 {
        match self {
            State::Ok | State::Test => 0,
            State::Warn => 1,
            State::Error => 100,
            State::NoData => 1_000,
            State::Exception => 100_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Ok => "OK",
            State::Warn => "WARN",
            State::Error => "ERROR",
            State::NoData => "NODATA",
            State::Exception => "EXCEPTION",
            State::Test => "TEST",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(State::Ok),
            "WARN" => Ok(State::Warn),
            "ERROR" => Ok(State::Error),
            "NODATA" => Ok(State::NoData),
            "EXCEPTION" => Ok(State::Exception),
            "TEST" => Ok(State::Test),
            other => Err(format!("unknown state: {other}")),
        }
    }
}

/// A single state transition of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub metric: String,
    pub previous_state: State,
    pub new_state: State,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Event {
    pub fn new(metric: impl Into<String>, previous_state: State, new_state: State) -> Self {
        Self {
            metric: metric.into(),
            previous_state,
            new_state,
            timestamp: 0,
            value: None,
            message: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Metric value, with an absent value read as `0`.
    pub fn value_or_zero(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }

    /// Event message, with an absent message read as an empty string.
    pub fn message_or_empty(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    /// Event time as UTC, `None` when the timestamp is out of range.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// Most severe new state across `events`. Ties keep the first one seen.
pub fn subject_state(events: &[Event]) -> Option<State> {
    let mut result: Option<State> = None;
    for event in events {
        match result {
            Some(current) if event.new_state.weight() <= current.weight() => {}
            _ => result = Some(event.new_state),
        }
    }
    result
}

/// True when the batch was produced by a test trigger.
pub fn is_test_batch(events: &[Event]) -> bool {
    events
        .first()
        .is_some_and(|event| event.new_state == State::Test)
}
