//! # parley-core
//!
//! In-process message broker for the Parley chat engine.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Broker** - Owns membership and routes broadcast and direct messages
//! - **Participant** - Named endpoint that sends and receives only through its broker
//! - **Roster** - Join-ordered membership with a name index
//! - **Hub** - Registry of named rooms, one broker each
//! - **Message** - Envelopes and received-message records
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  say / private_message  ┌─────────────┐  receive  ┌─────────────┐
//! │ Participant │────────────────────────▶│   Broker    │──────────▶│ Participant │
//! └─────────────┘                         └─────────────┘           └─────────────┘
//!                                                │
//!                                                ▼
//!                                         ┌─────────────┐
//!                                         │   Roster    │
//!                                         └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use parley_core::{Broker, Participant};
//!
//! let room = Broker::new();
//! let nasim = Participant::new("Nasim");
//! let mehedi = Participant::new("Mehedi");
//!
//! room.join(&nasim).unwrap();
//! room.join(&mehedi).unwrap();
//! nasim.say("Hi").unwrap();
//!
//! // Nasim saw Mehedi's join notice; Mehedi saw the greeting.
//! assert_eq!(nasim.log()[0].to_string(), "room: 'Mehedi joins the chat'");
//! assert_eq!(mehedi.log()[0].to_string(), "Nasim: 'Hi'");
//! ```

pub mod broker;
pub mod hub;
pub mod message;
pub mod participant;
pub mod roster;

pub use broker::{
    Broker, BrokerConfig, BrokerError, BrokerStats, DeliveryFailure, DeliveryPolicy,
    DeliveryReport, DuplicatePolicy, MissingRecipientPolicy,
};
pub use hub::{Hub, HubConfig, HubError, HubStats, RoomId};
pub use message::{Envelope, MessageId, Received, Route, SYSTEM_SENDER};
pub use participant::{DeliveryError, Listener, Participant, ParticipantState};
pub use roster::Roster;
