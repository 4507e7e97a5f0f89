//! Ephemeral "who is reporting what status to whom" state, owned by the hub actor.

use crate::error::ProtocolError;
use crate::ws::types::UserId;
use serde::Serialize;
use std::collections::HashMap;

/// A status a user can report toward one other user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Online = 0,
    Writing = 1,
}

impl PresenceStatus {
    pub fn display(self) -> DisplayStatus {
        match self {
            PresenceStatus::Online => DisplayStatus::Online,
            PresenceStatus::Writing => DisplayStatus::Writing,
        }
    }
}

/// The payload of a status update: either a new status or the "clear" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Set(PresenceStatus),
    Clear,
}

impl StatusChange {
    /// How the change is announced to its target.
    pub fn display(self) -> DisplayStatus {
        match self {
            StatusChange::Set(status) => status.display(),
            StatusChange::Clear => DisplayStatus::Offline,
        }
    }
}

/// Wire codes: `-1` clears, `0` is online, `1` is writing.
impl TryFrom<i64> for StatusChange {
    type Error = ProtocolError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            -1 => Ok(StatusChange::Clear),
            0 => Ok(StatusChange::Set(PresenceStatus::Online)),
            1 => Ok(StatusChange::Set(PresenceStatus::Writing)),
            _ => Err(ProtocolError::InvalidStatus),
        }
    }
}

/// The label a viewer sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Online,
    Writing,
    Offline,
}

/// What one sender currently reports, and to whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceEntry {
    pub target: UserId,
    pub status: PresenceStatus,
}

/// Sender → single presence entry. A sender reports toward one target at a time.
#[derive(Debug, Default)]
pub struct PresenceStore {
    entries: HashMap<UserId, PresenceEntry>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the sender's entry, or deletes it on [`StatusChange::Clear`].
    /// Returns the entry that was there before.
    pub fn set_status(
        &mut self,
        sender: UserId,
        target: UserId,
        change: StatusChange,
    ) -> Option<PresenceEntry> {
        match change {
            StatusChange::Set(status) => self.entries.insert(sender, PresenceEntry { target, status }),
            StatusChange::Clear => self.entries.remove(&sender),
        }
    }

    /// Deletes the sender's entry, returning the target it was reported to.
    pub fn clear_status(&mut self, sender: UserId) -> Option<UserId> {
        self.entries.remove(&sender).map(|entry| entry.target)
    }

    pub fn status_of(&self, sender: UserId) -> Option<PresenceEntry> {
        self.entries.get(&sender).copied()
    }

    /// The status `subject` shows to `viewer`.
    ///
    /// Offline unless the subject is connected and currently reports its status
    /// toward exactly this viewer.
    pub fn effective_status(
        &self,
        subject: UserId,
        viewer: UserId,
        subject_connected: bool,
    ) -> DisplayStatus {
        if !subject_connected {
            return DisplayStatus::Offline;
        }
        match self.entries.get(&subject) {
            Some(entry) if entry.target == viewer => entry.status.display(),
            _ => DisplayStatus::Offline,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
