//! The message broker for Parley.
//!
//! The broker owns membership and makes every routing decision. Participants
//! never reference each other; they call into the broker they joined and the
//! broker invokes [`Participant::receive`] on each resolved target.
//!
//! Routing is synchronous: every delivery completes before the call returns.
//! Membership is guarded by an internal lock, so one broker may be shared by
//! many threads. Targets are snapshotted under the lock and delivered after
//! it is released, which lets a listener call back into the broker.

use crate::message::{join_notice, Envelope, MessageId, SYSTEM_SENDER};
use crate::participant::{validate_name, DeliveryError, Participant};
use crate::roster::Roster;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Broker errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Invalid participant name.
    #[error("Invalid name: {0}")]
    InvalidName(&'static str),

    /// Outbound operation before joining.
    #[error("Participant has not joined a broker: {0}")]
    NotJoined(String),

    /// Participant is already bound to a broker.
    #[error("Participant already joined a broker: {0}")]
    AlreadyJoined(String),

    /// A member with this name is already present.
    #[error("Duplicate member: {0}")]
    DuplicateMember(String),

    /// No member with this name.
    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    /// Maximum members reached.
    #[error("Maximum members reached")]
    BrokerFull,

    /// The joined broker has been dropped.
    #[error("Broker is closed")]
    BrokerClosed,

    /// A delivery failed under the fail-fast policy.
    #[error("Delivery to {recipient} failed: {source}")]
    DeliveryFailed {
        /// Recipient whose listener failed.
        recipient: String,
        /// The participant-local error.
        source: DeliveryError,
    },
}

/// What `join` does with a name that is already a member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail with [`BrokerError::DuplicateMember`].
    #[default]
    Reject,
    /// Return without changes.
    Ignore,
}

/// What `direct_message` does when no member has the destination name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingRecipientPolicy {
    /// Deliver to nobody.
    #[default]
    Ignore,
    /// Fail with [`BrokerError::RecipientNotFound`].
    Reject,
}

/// How routing reacts to a participant's delivery failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Continue and collect failures in the report.
    #[default]
    BestEffort,
    /// Stop at the first failure and return it.
    FailFast,
}

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Maximum number of members.
    pub max_members: usize,
    /// Duplicate-join handling.
    pub duplicate_policy: DuplicatePolicy,
    /// Missing-recipient handling.
    pub missing_recipient: MissingRecipientPolicy,
    /// Delivery failure handling.
    pub delivery: DeliveryPolicy,
    /// Source tag of join notices.
    pub system_sender: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_members: 10_000,
            duplicate_policy: DuplicatePolicy::default(),
            missing_recipient: MissingRecipientPolicy::default(),
            delivery: DeliveryPolicy::default(),
            system_sender: SYSTEM_SENDER.to_string(),
        }
    }
}

/// A delivery that failed under the best-effort policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Recipient name.
    pub recipient: String,
    /// The participant-local error.
    pub error: DeliveryError,
}

/// Outcome of a routing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Identifier of the routed envelope.
    pub message_id: MessageId,
    /// Participants whose delivery succeeded.
    pub delivered: usize,
    /// Failures collected under the best-effort policy.
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            delivered: 0,
            failures: Vec::new(),
        }
    }

    /// Report for a call that routed nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(0)
    }

    /// Number of participants the broker reached, including failures.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }

    /// Whether every attempted delivery succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The central message broker.
pub struct Broker {
    /// Handed to participants as their back-reference.
    this: Weak<Broker>,
    roster: RwLock<Roster>,
    config: BrokerConfig,
    messages_routed: AtomicU64,
    deliveries: AtomicU64,
    failures: AtomicU64,
}

impl Broker {
    /// Create a new broker with default configuration.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a new broker with custom configuration.
    #[must_use]
    pub fn with_config(config: BrokerConfig) -> Arc<Self> {
        info!("Creating broker with config: {:?}", config);
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            roster: RwLock::new(Roster::new()),
            config,
            messages_routed: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Get broker statistics.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        let roster = self.roster.read();
        BrokerStats {
            members: roster.len(),
            live_members: roster.live_count(),
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Admit a participant.
    ///
    /// Members present before the call receive a join notice from the
    /// system sender. Only then is the participant bound to this broker and
    /// appended, so traffic triggered by the notice never reaches the
    /// newcomer. The name stays reserved while the notice is delivered. On
    /// success the participant is visible to later routing calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, already a member (under
    /// [`DuplicatePolicy::Reject`]), the broker is full, or the participant
    /// is bound to another broker. Under [`DeliveryPolicy::FailFast`] a
    /// failed notice delivery aborts the join and the participant stays
    /// unjoined.
    pub fn join(&self, participant: &Arc<Participant>) -> Result<DeliveryReport, BrokerError> {
        let name = participant.name();
        validate_name(name).map_err(BrokerError::InvalidName)?;

        let targets = {
            let mut roster = self.roster.write();

            if roster.is_taken(name) {
                match self.config.duplicate_policy {
                    DuplicatePolicy::Reject => {
                        warn!(member = %name, "Join refused: duplicate member");
                        return Err(BrokerError::DuplicateMember(name.to_string()));
                    }
                    DuplicatePolicy::Ignore => {
                        debug!(member = %name, "Duplicate join ignored");
                        return Ok(DeliveryReport::empty());
                    }
                }
            }

            if roster.claimed() >= self.config.max_members {
                warn!(member = %name, "Join refused: broker full");
                return Err(BrokerError::BrokerFull);
            }

            if participant.is_joined() {
                warn!(member = %name, "Join refused: already bound to a broker");
                return Err(BrokerError::AlreadyJoined(name.to_string()));
            }

            roster.reserve(name);
            roster.handles_except(&self.config.system_sender)
        };

        let envelope = Envelope::broadcast(self.config.system_sender.as_str(), join_notice(name));
        let report = match self.deliver(&envelope, targets) {
            Ok(report) => report,
            Err(error) => {
                self.roster.write().release(name);
                warn!(member = %name, "Join aborted: notice delivery failed");
                return Err(error);
            }
        };

        let members = {
            let mut roster = self.roster.write();
            // Lost a race with a concurrent join to another broker.
            if !participant.bind(self.this.clone()) {
                roster.release(name);
                warn!(member = %name, "Join refused: already bound to a broker");
                return Err(BrokerError::AlreadyJoined(name.to_string()));
            }
            roster.insert(participant);
            roster.len()
        };

        info!(member = %name, members, notified = report.delivered, "Member joined");
        Ok(report)
    }

    /// Deliver `text` to every member not named `source`, in join order.
    ///
    /// `source` need not be a member.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::DeliveryFailed`] under [`DeliveryPolicy::FailFast`].
    pub fn broadcast(
        &self,
        source: &str,
        text: impl Into<String>,
    ) -> Result<DeliveryReport, BrokerError> {
        let envelope = Envelope::broadcast(source, text);
        let targets = self.roster.read().handles_except(source);
        debug!(source = %source, recipients = targets.len(), "Broadcasting");
        self.deliver(&envelope, targets)
    }

    /// Deliver `text` to the first member named `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::RecipientNotFound`] under
    /// [`MissingRecipientPolicy::Reject`], or [`BrokerError::DeliveryFailed`]
    /// under [`DeliveryPolicy::FailFast`].
    pub fn direct_message(
        &self,
        source: &str,
        dest: &str,
        text: impl Into<String>,
    ) -> Result<DeliveryReport, BrokerError> {
        let envelope = Envelope::direct(source, dest, text);
        let target = self
            .roster
            .read()
            .first_named(dest)
            .map(|entry| entry.handle.clone());

        match target {
            Some(handle) => {
                debug!(source = %source, dest = %dest, "Direct message");
                self.deliver(&envelope, vec![handle])
            }
            None => match self.config.missing_recipient {
                MissingRecipientPolicy::Ignore => {
                    debug!(
                        source = %source,
                        dest = %dest,
                        "Direct message dropped: unknown member"
                    );
                    self.messages_routed.fetch_add(1, Ordering::Relaxed);
                    Ok(DeliveryReport::new(envelope.id))
                }
                MissingRecipientPolicy::Reject => {
                    warn!(source = %source, dest = %dest, "Recipient not found");
                    Err(BrokerError::RecipientNotFound(dest.to_string()))
                }
            },
        }
    }

    fn deliver(
        &self,
        envelope: &Envelope,
        targets: Vec<Weak<Participant>>,
    ) -> Result<DeliveryReport, BrokerError> {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
        let mut report = DeliveryReport::new(envelope.id);

        for handle in targets {
            // Dropped participants are skipped; delivery is fire-and-forget.
            let Some(participant) = handle.upgrade() else {
                trace!(id = envelope.id, "Skipping dropped member");
                continue;
            };

            match participant.receive(&envelope.source, &envelope.text) {
                Ok(()) => {
                    report.delivered += 1;
                    self.deliveries.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        id = envelope.id,
                        route = envelope.route.label(),
                        recipient = %participant.name(),
                        "Delivered"
                    );
                }
                Err(error) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        id = envelope.id,
                        recipient = %participant.name(),
                        %error,
                        "Delivery failed"
                    );
                    let recipient = participant.name().to_string();
                    match self.config.delivery {
                        DeliveryPolicy::FailFast => {
                            return Err(BrokerError::DeliveryFailed {
                                recipient,
                                source: error,
                            });
                        }
                        DeliveryPolicy::BestEffort => {
                            report.failures.push(DeliveryFailure { recipient, error });
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Get the number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.roster.read().len()
    }

    /// Get member names in join order.
    #[must_use]
    pub fn member_names(&self) -> Vec<String> {
        self.roster.read().names()
    }

    /// Check if a name is a member.
    #[must_use]
    pub fn is_member(&self, name: &str) -> bool {
        self.roster.read().contains(name)
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("members", &self.member_names())
            .field("config", &self.config)
            .finish()
    }
}

/// Broker statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStats {
    /// Number of roster entries.
    pub members: usize,
    /// Members whose participant is still alive.
    pub live_members: usize,
    /// Routing calls made, including join notices.
    pub messages_routed: u64,
    /// Successful deliveries.
    pub deliveries: u64,
    /// Failed deliveries.
    pub failures: u64,
}
