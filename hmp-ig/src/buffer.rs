//! Session buffer
//!
//! Keyed store of in-flight sessions. Each entry holds one slot per record
//! source plus a filled bitmask, so "slot absent" and "slot holds data" stay
//! unambiguous. Entries are created on the first record for a correlation id
//! and removed atomically with hand-off; a removed entry is never read again.

use chrono::{DateTime, Duration, Utc};
use hmp_common::config::DuplicatePolicy;
use hmp_common::record::{Record, SourceKind, SourcePayload, SourceSet};
use hmp_common::session::RawSession;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::IngestError;

/// Result of storing one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Slot was empty and is now filled
    Stored,
    /// Slot was filled; the new record replaced it
    Overwritten,
    /// Slot was filled; the new record was discarded
    Ignored,
    /// Slot was filled; rejected under [`DuplicatePolicy::Reject`]
    Rejected,
}

/// One in-flight session
struct SessionEntry {
    slots: [Option<SourcePayload>; SourceKind::COUNT],
    filled: SourceSet,
    first_seen_at: DateTime<Utc>,
}

impl SessionEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            slots: Default::default(),
            filled: SourceSet::empty(),
            first_seen_at: now,
        }
    }

    fn take_slot(&mut self, kind: SourceKind) -> Option<SourcePayload> {
        self.slots[kind.index()].take()
    }
}

/// Keyed store of in-flight sessions, exclusively owned by the engine loop
pub struct SessionBuffer {
    entries: HashMap<Uuid, SessionEntry>,
    duplicate_policy: DuplicatePolicy,
}

impl SessionBuffer {
    pub fn new(duplicate_policy: DuplicatePolicy) -> Self {
        Self {
            entries: HashMap::new(),
            duplicate_policy,
        }
    }

    /// Write a record into its session slot, creating the entry if absent
    ///
    /// A second record for an already-filled slot is resolved by the
    /// configured [`DuplicatePolicy`].
    pub fn store(&mut self, record: Record) -> StoreOutcome {
        let entry = self
            .entries
            .entry(record.uuid)
            .or_insert_with(|| SessionEntry::new(Utc::now()));

        let slot = &mut entry.slots[record.source.index()];
        if slot.is_some() {
            match self.duplicate_policy {
                DuplicatePolicy::Overwrite => {
                    *slot = Some(record.payload);
                    return StoreOutcome::Overwritten;
                }
                DuplicatePolicy::Ignore => return StoreOutcome::Ignored,
                DuplicatePolicy::Reject => return StoreOutcome::Rejected,
            }
        }

        *slot = Some(record.payload);
        entry.filled.insert(record.source);
        StoreOutcome::Stored
    }

    /// True iff every required slot is filled for this entry
    ///
    /// Unknown correlation ids are simply incomplete.
    pub fn is_complete(&self, uuid: Uuid, required: SourceSet) -> bool {
        self.entries
            .get(&uuid)
            .map(|entry| entry.filled.is_superset_of(required))
            .unwrap_or(false)
    }

    /// Build a raw session from the filled slots and delete the entry
    ///
    /// The labels slot is optional (absent outside development/evaluation);
    /// calendar, environment and helmet are mandatory. Calling this for an
    /// unknown correlation id is an error.
    pub fn extract_and_remove(&mut self, uuid: Uuid) -> Result<RawSession, IngestError> {
        let mut entry = self
            .entries
            .remove(&uuid)
            .ok_or(IngestError::UnknownSession(uuid))?;

        let calendar = match entry.take_slot(SourceKind::Calendar) {
            Some(SourcePayload::Calendar(fields)) => fields,
            _ => {
                return Err(IngestError::MissingSlot {
                    uuid,
                    missing: SourceKind::Calendar,
                })
            }
        };
        let environment = match entry.take_slot(SourceKind::Environment) {
            Some(SourcePayload::Environment(fields)) => fields,
            _ => {
                return Err(IngestError::MissingSlot {
                    uuid,
                    missing: SourceKind::Environment,
                })
            }
        };
        let helmet = match entry.take_slot(SourceKind::Helmet) {
            Some(SourcePayload::Helmet(fields)) => fields,
            _ => {
                return Err(IngestError::MissingSlot {
                    uuid,
                    missing: SourceKind::Helmet,
                })
            }
        };
        let label = match entry.take_slot(SourceKind::Labels) {
            Some(SourcePayload::Labels(fields)) => Some(fields.label),
            _ => None,
        };

        Ok(RawSession {
            uuid,
            environment: environment.environment,
            activity: calendar.activity,
            eeg_data: helmet.eeg_data,
            label,
        })
    }

    /// Evict partial sessions older than `ttl`; returns the evicted ids
    pub fn evict_expired(&mut self, ttl: Duration, now: DateTime<Utc>) -> Vec<Uuid> {
        let expired: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|(_, entry)| now - entry.first_seen_at > ttl)
            .map(|(uuid, _)| *uuid)
            .collect();
        for uuid in &expired {
            self.entries.remove(uuid);
        }
        expired
    }

    /// Number of in-flight sessions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
