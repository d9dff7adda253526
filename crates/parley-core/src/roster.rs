//! Membership roster for a broker.
//!
//! Members are kept in join order, with a name index for direct lookup.
//! Entries hold weak handles; the roster never keeps a participant alive.
//!
//! A name can be reserved before its participant is appended. Reserved names
//! count as taken and toward capacity, but are not members and receive
//! nothing.

use crate::message::now_millis;
use crate::participant::Participant;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::debug;

/// A single roster slot.
#[derive(Debug, Clone)]
pub struct MemberEntry {
    /// Participant name.
    pub name: String,
    /// Non-owning handle to the participant.
    pub handle: Weak<Participant>,
    /// When the participant joined.
    pub joined_at: u64,
}

impl MemberEntry {
    fn new(participant: &Arc<Participant>) -> Self {
        Self {
            name: participant.name().to_string(),
            handle: Arc::downgrade(participant),
            joined_at: now_millis(),
        }
    }

    /// Whether the participant is still alive.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.handle.strong_count() > 0
    }
}

/// Ordered membership with a name index.
#[derive(Debug, Default)]
pub struct Roster {
    entries: Vec<MemberEntry>,
    /// Name to slot of the first entry with that name.
    index: HashMap<String, usize>,
    /// Names of joins in progress.
    reserved: HashSet<String>,
}

impl Roster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries whose participant is still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_live()).count()
    }

    /// Check if a name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Check if a name is a member or reserved by a join in progress.
    #[must_use]
    pub fn is_taken(&self, name: &str) -> bool {
        self.contains(name) || self.reserved.contains(name)
    }

    /// Members plus reservations.
    #[must_use]
    pub fn claimed(&self) -> usize {
        self.entries.len() + self.reserved.len()
    }

    /// Hold a name for a join in progress. Returns false if already taken.
    pub fn reserve(&mut self, name: &str) -> bool {
        if self.is_taken(name) {
            return false;
        }
        self.reserved.insert(name.to_string())
    }

    /// Drop a reservation without appending.
    pub fn release(&mut self, name: &str) {
        if self.reserved.remove(name) {
            debug!(member = %name, "Roster: reservation released");
        }
    }

    /// Slot of the first entry with this name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// First entry, in join order, with this name.
    #[must_use]
    pub fn first_named(&self, name: &str) -> Option<&MemberEntry> {
        self.position(name).map(|slot| &self.entries[slot])
    }

    /// Append a participant, consuming any reservation of its name. Returns
    /// its slot.
    ///
    /// An existing name keeps pointing at its first slot.
    pub fn insert(&mut self, participant: &Arc<Participant>) -> usize {
        let slot = self.entries.len();
        let entry = MemberEntry::new(participant);
        self.reserved.remove(&entry.name);
        self.index.entry(entry.name.clone()).or_insert(slot);
        debug!(member = %entry.name, slot, "Roster: member added");
        self.entries.push(entry);
        slot
    }

    /// Handles of every entry not named `source`, in join order.
    #[must_use]
    pub fn handles_except(&self, source: &str) -> Vec<Weak<Participant>> {
        self.entries
            .iter()
            .filter(|e| e.name != source)
            .map(|e| e.handle.clone())
            .collect()
    }

    /// All names in join order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// All entries in join order.
    #[must_use]
    pub fn entries(&self) -> &[MemberEntry] {
        &self.entries
    }
}
