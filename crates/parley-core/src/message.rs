//! Message records for Parley.
//!
//! An [`Envelope`] is built once per routing call; every participant it
//! reaches appends a [`Received`] record to its own log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A unique message identifier.
pub type MessageId = u64;

/// Default source tag used for join notices.
pub const SYSTEM_SENDER: &str = "room";

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    now_nanos() / 1_000_000
}

/// Generate a unique message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    now_nanos().wrapping_add(counter)
}

/// Text of the notice broadcast when `name` joins.
#[must_use]
pub fn join_notice(name: &str) -> String {
    format!("{name} joins the chat")
}

/// How an envelope is routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "to", rename_all = "snake_case")]
pub enum Route {
    /// Every member except the source.
    Broadcast,
    /// The first member with this name.
    Direct(String),
}

impl Route {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Route::Broadcast => "broadcast",
            Route::Direct(_) => "direct",
        }
    }
}

/// A message in flight through the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message identifier.
    pub id: MessageId,
    /// Name (or system tag) of the sender.
    pub source: String,
    /// Routing target.
    pub route: Route,
    /// Message text.
    pub text: String,
    /// Timestamp when the envelope was created.
    pub timestamp: u64,
}

impl Envelope {
    /// Create a broadcast envelope.
    #[must_use]
    pub fn broadcast(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(source, Route::Broadcast, text)
    }

    /// Create a direct envelope addressed to `dest`.
    #[must_use]
    pub fn direct(
        source: impl Into<String>,
        dest: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(source, Route::Direct(dest.into()), text)
    }

    fn new(source: impl Into<String>, route: Route, text: impl Into<String>) -> Self {
        Self {
            id: generate_message_id(),
            source: source.into(),
            route,
            text: text.into(),
            timestamp: now_millis(),
        }
    }
}

/// A message as recorded in a participant's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Received {
    /// Unique record identifier.
    pub id: MessageId,
    /// Sender name or system tag.
    pub sender: String,
    /// Message text.
    pub text: String,
    /// When the record was appended.
    pub received_at: u64,
}

impl Received {
    /// Create a record outside of broker routing.
    #[must_use]
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: generate_message_id(),
            sender: sender.into(),
            text: text.into(),
            received_at: now_millis(),
        }
    }

    /// Whether the record is `(sender, text)`.
    #[must_use]
    pub fn is(&self, sender: &str, text: &str) -> bool {
        self.sender == sender && self.text == text
    }
}

impl fmt::Display for Received {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: '{}'", self.sender, self.text)
    }
}
