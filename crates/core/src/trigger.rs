use serde::{Deserialize, Serialize};

/// Trigger metadata the notification is rendered for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub warn_value: f64,
    #[serde(default)]
    pub error_value: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Trigger {
    /// Tags rendered as `[tag1][tag2]`.
    pub fn tag_string(&self) -> String {
        self.tags.iter().map(|tag| format!("[{tag}]")).collect()
    }

    /// Description, `None` when absent or empty.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref().filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Phone,
    Email,
}

impl std::fmt::Display for ContactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactKind::Phone => write!(f, "phone"),
            ContactKind::Email => write!(f, "email"),
        }
    }
}

/// Notification destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub address: String,
    pub kind: ContactKind,
}

impl Contact {
    pub fn phone(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: ContactKind::Phone,
        }
    }

    pub fn email(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: ContactKind::Email,
        }
    }
}

/// A rendered plot, usually PNG bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotImage(pub Vec<u8>);

impl PlotImage {
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for PlotImage {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_string_wraps_each_tag() {
        let trigger = Trigger {
            tags: vec!["db".to_string(), "prod".to_string()],
            ..Default::default()
        };
        assert_eq!(trigger.tag_string(), "[db][prod]");
        assert_eq!(Trigger::default().tag_string(), "");
    }

    #[test]
    fn empty_description_is_absent() {
        let mut trigger = Trigger {
            description: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(trigger.description(), None);
        trigger.description = Some("disk usage".to_string());
        assert_eq!(trigger.description(), Some("disk usage"));
    }

    #[test]
    fn contact_kind_display() {
        assert_eq!(Contact::phone("9123456789").kind.to_string(), "phone");
        assert_eq!(Contact::email("a@example.com").kind.to_string(), "email");
    }
}
