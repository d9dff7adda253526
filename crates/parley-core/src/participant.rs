//! Participants for Parley.
//!
//! A participant is a named endpoint. It sends only through the broker it
//! joined and receives through [`Participant::receive`], which appends to a
//! local log.

use crate::broker::{Broker, BrokerError, DeliveryReport};
use crate::message::Received;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use thiserror::Error;
use tracing::{debug, trace};

/// Maximum participant name length.
pub const MAX_NAME_LENGTH: usize = 64;

/// Validate a participant or room name.
///
/// # Errors
///
/// Returns an error message if the name is invalid.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Name cannot be empty");
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err("Name too long");
    }
    if name.trim() != name {
        return Err("Name cannot start or end with whitespace");
    }
    if name.chars().any(char::is_control) {
        return Err("Name contains control characters");
    }
    Ok(())
}

/// Participant-local delivery failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The listener refused the message.
    #[error("Delivery rejected: {0}")]
    Rejected(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Observer of messages a participant receives.
///
/// The record is already in the participant's log when the listener runs.
pub trait Listener: Send + Sync {
    /// Called once per received message.
    ///
    /// # Errors
    ///
    /// A returned error is reported to the broker, which applies its
    /// delivery policy.
    fn on_message(&self, owner: &str, record: &Received) -> Result<(), DeliveryError>;
}

/// Membership state of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantState {
    /// Not yet admitted by any broker.
    Unjoined,
    /// Bound to a broker.
    Joined,
}

/// A named conversational endpoint.
pub struct Participant {
    name: String,
    /// Set once, by `Broker::join`.
    broker: OnceLock<Weak<Broker>>,
    log: Mutex<Vec<Received>>,
    listener: Option<Arc<dyn Listener>>,
}

impl Participant {
    /// Create an unjoined participant.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(name.into(), None))
    }

    /// Create an unjoined participant that forwards received messages to `listener`.
    #[must_use]
    pub fn with_listener(name: impl Into<String>, listener: Arc<dyn Listener>) -> Arc<Self> {
        Arc::new(Self::build(name.into(), Some(listener)))
    }

    fn build(name: String, listener: Option<Arc<dyn Listener>>) -> Self {
        Self {
            name,
            broker: OnceLock::new(),
            log: Mutex::new(Vec::new()),
            listener,
        }
    }

    /// Get the participant name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the membership state.
    #[must_use]
    pub fn state(&self) -> ParticipantState {
        if self.broker.get().is_some() {
            ParticipantState::Joined
        } else {
            ParticipantState::Unjoined
        }
    }

    /// Check if the participant has joined a broker.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.state() == ParticipantState::Joined
    }

    /// Bind the back-reference. Returns `false` if already bound.
    pub(crate) fn bind(&self, broker: Weak<Broker>) -> bool {
        let bound = self.broker.set(broker).is_ok();
        if bound {
            debug!(member = %self.name, "Participant bound to broker");
        }
        bound
    }

    fn broker(&self) -> Result<Arc<Broker>, BrokerError> {
        let weak = self
            .broker
            .get()
            .ok_or_else(|| BrokerError::NotJoined(self.name.clone()))?;
        weak.upgrade().ok_or(BrokerError::BrokerClosed)
    }

    /// Broadcast `text` to every other member of the joined broker.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotJoined`] before `join`, and any routing
    /// error from the broker.
    pub fn say(&self, text: impl Into<String>) -> Result<DeliveryReport, BrokerError> {
        self.broker()?.broadcast(&self.name, text)
    }

    /// Send `text` to the member named `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotJoined`] before `join`, and any routing
    /// error from the broker.
    pub fn private_message(
        &self,
        dest: &str,
        text: impl Into<String>,
    ) -> Result<DeliveryReport, BrokerError> {
        self.broker()?.direct_message(&self.name, dest, text)
    }

    /// Inbound delivery contract.
    ///
    /// The record is always appended. An error means the listener failed.
    ///
    /// # Errors
    ///
    /// Returns the listener's error, if any.
    pub fn receive(&self, sender: &str, text: &str) -> Result<(), DeliveryError> {
        let record = Received::new(sender, text);
        trace!(member = %self.name, sender = %sender, "Received message");
        self.log.lock().push(record.clone());

        match &self.listener {
            Some(listener) => listener.on_message(&self.name, &record),
            None => Ok(()),
        }
    }

    /// Snapshot of the received messages, oldest first.
    #[must_use]
    pub fn log(&self) -> Vec<Received> {
        self.log.lock().clone()
    }

    /// Number of received messages.
    #[must_use]
    pub fn log_len(&self) -> usize {
        self.log.lock().len()
    }

    /// Most recently received message.
    #[must_use]
    pub fn last_received(&self) -> Option<Received> {
        self.log.lock().last().cloned()
    }
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("log_len", &self.log_len())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
