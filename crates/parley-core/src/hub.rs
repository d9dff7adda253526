//! Registry of named conversation rooms.
//!
//! Each room is an independent [`Broker`]. The hub only maps names to
//! brokers; it never routes messages itself.

use crate::broker::{Broker, BrokerConfig};
use crate::participant::validate_name;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// A room identifier.
pub type RoomId = String;

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// Invalid room name.
    #[error("Invalid room name: {0}")]
    InvalidRoom(&'static str),

    /// Room not found.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Room already exists.
    #[error("Room already exists: {0}")]
    RoomExists(String),

    /// Maximum rooms reached.
    #[error("Maximum rooms reached")]
    MaxRoomsReached,
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of rooms.
    pub max_rooms: usize,
    /// Whether `room` creates missing rooms.
    pub auto_create_rooms: bool,
    /// Configuration for every room the hub creates.
    pub broker: BrokerConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_rooms: 1_000,
            auto_create_rooms: true,
            broker: BrokerConfig::default(),
        }
    }
}

/// Named rooms, each backed by its own broker.
#[derive(Debug)]
pub struct Hub {
    rooms: DashMap<RoomId, Arc<Broker>>,
    /// Rooms created and not yet removed.
    room_count: AtomicUsize,
    config: HubConfig,
}

impl Hub {
    /// Create a new hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!(max_rooms = config.max_rooms, "Creating hub");
        Self {
            rooms: DashMap::new(),
            room_count: AtomicUsize::new(0),
            config,
        }
    }

    /// Get a room, creating it if allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, the room is missing and
    /// auto-creation is off, or the room limit is reached.
    pub fn room(&self, name: &str) -> Result<Arc<Broker>, HubError> {
        if let Some(room) = self.rooms.get(name) {
            return Ok(Arc::clone(room.value()));
        }
        if !self.config.auto_create_rooms {
            return Err(HubError::RoomNotFound(name.to_string()));
        }
        self.insert_room(name, false)
    }

    /// Create a room.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, taken, or the room limit is
    /// reached.
    pub fn create_room(&self, name: &str) -> Result<Arc<Broker>, HubError> {
        self.insert_room(name, true)
    }

    fn insert_room(&self, name: &str, exclusive: bool) -> Result<Arc<Broker>, HubError> {
        validate_name(name).map_err(HubError::InvalidRoom)?;

        match self.rooms.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                if exclusive {
                    return Err(HubError::RoomExists(name.to_string()));
                }
                Ok(Arc::clone(entry.get()))
            }
            Entry::Vacant(entry) => {
                // The entry holds its shard lock, so `len()` is off limits here.
                let max = self.config.max_rooms;
                self.room_count
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < max).then_some(n + 1)
                    })
                    .map_err(|_| HubError::MaxRoomsReached)?;

                debug!(room = %name, "Creating new room");
                let broker = Broker::with_config(self.config.broker.clone());
                entry.insert(Arc::clone(&broker));
                Ok(broker)
            }
        }
    }

    /// Get an existing room.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Broker>> {
        self.rooms.get(name).map(|r| Arc::clone(r.value()))
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    /// Get all room names, sorted.
    #[must_use]
    pub fn room_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Remove a room from the hub.
    ///
    /// Participants keep their back-reference until the last `Arc` to the
    /// broker is dropped; after that their outbound calls fail with
    /// `BrokerClosed`.
    pub fn remove_room(&self, name: &str) -> Option<Arc<Broker>> {
        let removed = self.rooms.remove(name).map(|(_, broker)| broker);
        if removed.is_some() {
            self.room_count.fetch_sub(1, Ordering::SeqCst);
            debug!(room = %name, "Removed room");
        }
        removed
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            room_count: self.rooms.len(),
            total_members: self.rooms.iter().map(|r| r.member_count()).sum(),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Hub statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    /// Number of rooms.
    pub room_count: usize,
    /// Members across all rooms.
    pub total_members: usize,
}
