//! Incoming email and triage outcome types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One incoming message as seen by the triage router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailInput {
    /// Sender, e.g. `Alice Smith <alice.smith@company.com>`.
    pub author: String,
    /// Recipient(s).
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Message body or whole thread.
    #[serde(rename = "email_thread", alias = "body")]
    pub body: String,
}

impl EmailInput {
    /// Build an email from its four fields.
    pub fn new(
        author: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// JSON payload stored as a few-shot input and used as the similarity query.
    #[must_use]
    pub fn as_payload(&self) -> Value {
        json!({
            "author": self.author,
            "to": self.to,
            "subject": self.subject,
            "email_thread": self.body,
        })
    }

    /// Read an email back from a stored payload. Missing fields become empty.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Self {
        let field = |name: &str| payload.get(name).and_then(Value::as_str).unwrap_or_default().to_owned();
        Self {
            author: field("author"),
            to: field("to"),
            subject: field("subject"),
            body: payload
                .get("email_thread")
                .or_else(|| payload.get("body"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        }
    }
}

impl fmt::Display for EmailInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "From: {}\nTo: {}\nSubject: {}\n\n{}",
            self.author, self.to, self.subject, self.body
        )
    }
}

/// The three terminal triage classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Not worth responding to or tracking.
    Ignore,
    /// Worth knowing about, no reply needed.
    Notify,
    /// Needs a reply; goes to the response agent.
    Respond,
}

impl Classification {
    /// All classes, in counter order.
    pub const ALL: [Self; 3] = [Self::Ignore, Self::Notify, Self::Respond];

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Notify => "notify",
            Self::Respond => "respond",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    /// Exact lowercase names only; anything else is a schema violation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(Self::Ignore),
            "notify" => Ok(Self::Notify),
            "respond" => Ok(Self::Respond),
            other => Err(format!("unknown classification '{other}'")),
        }
    }
}

/// Validated triage result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageDecision {
    /// Where the email goes.
    pub classification: Classification,
    /// The model's reasoning, passed on to the response agent.
    pub reasoning: String,
}
