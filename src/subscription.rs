use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How often a subscriber wants to hear about one kind of activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Never,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Never => "never",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    /// Lenient parse used by schedulers: anything unrecognised is a daily run.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(Frequency::Daily)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(Frequency::Never),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(format!("unknown frequency: {}", other)),
        }
    }
}

/// GitHub activity category a digest can report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Opened,
    Closed,
    Reopened,
    Comment,
    NoComment,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Opened,
        EventKind::Closed,
        EventKind::Reopened,
        EventKind::Comment,
        EventKind::NoComment,
    ];

    /// The `payload.action` value recorded by the archive for issue events.
    pub fn action(&self) -> Option<&'static str> {
        match self {
            EventKind::Opened => Some("opened"),
            EventKind::Closed => Some("closed"),
            EventKind::Reopened => Some("reopened"),
            EventKind::Comment | EventKind::NoComment => None,
        }
    }

    pub fn is_issue_event(&self) -> bool {
        self.action().is_some()
    }

    /// Human label used in error reports.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Opened => "Open Issues",
            EventKind::Closed => "Closed Issues",
            EventKind::Reopened => "Reopened Issues",
            EventKind::Comment => "Comments",
            EventKind::NoComment => "No Comment Checks",
        }
    }
}

fn default_frequency() -> Frequency {
    Frequency::Daily
}

/// Per-kind delivery cadence for one subscription. New subscriptions hear about everything daily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPreference {
    #[serde(default = "default_frequency")]
    pub issue_open: Frequency,
    #[serde(default = "default_frequency")]
    pub issue_close: Frequency,
    #[serde(default = "default_frequency")]
    pub issue_reopen: Frequency,
    #[serde(default = "default_frequency")]
    pub new_comment: Frequency,
    #[serde(default = "default_frequency")]
    pub no_comment: Frequency,
}

impl Default for EmailPreference {
    fn default() -> Self {
        Self::uniform(Frequency::Daily)
    }
}

impl EmailPreference {
    pub fn uniform(frequency: Frequency) -> Self {
        Self {
            issue_open: frequency,
            issue_close: frequency,
            issue_reopen: frequency,
            new_comment: frequency,
            no_comment: frequency,
        }
    }

    pub fn for_kind(&self, kind: EventKind) -> Frequency {
        match kind {
            EventKind::Opened => self.issue_open,
            EventKind::Closed => self.issue_close,
            EventKind::Reopened => self.issue_reopen,
            EventKind::Comment => self.new_comment,
            EventKind::NoComment => self.no_comment,
        }
    }
}

/// A user's interest in one repository (`Org/Name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub user_id: u64,
    pub repo: String,
    /// Filled from the owning user's address when absent.
    #[serde(default)]
    pub default_email: String,
    /// Overrides `default_email` for this repository only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub preference: EmailPreference,
}

impl Subscription {
    pub fn new(user_id: u64, repo: &str, default_email: &str, preference: EmailPreference) -> Self {
        Self {
            user_id,
            repo: repo.to_string(),
            default_email: default_email.to_string(),
            email: None,
            preference,
        }
    }

    pub fn recipient(&self) -> &str {
        match self.email.as_deref() {
            Some(email) if !email.is_empty() => email,
            _ => &self.default_email,
        }
    }

    pub fn wants(&self, kind: EventKind, frequency: Frequency) -> bool {
        self.preference.for_kind(kind) == frequency
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub login: String,
    pub email: String,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}
