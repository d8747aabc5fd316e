//! Inbound record types
//!
//! One record is a single source's contribution to a session, tied to a
//! correlation UUID. Four field sources feed the ingestion system: the
//! calendar (activity), the environment sensor, the helmet (EEG samples)
//! and, outside production, the labeller.
//!
//! Wire shape: `{ "source": "<name>", "value": { "UUID": "<uuid>", ... } }`.

use crate::session::Sample;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record source kinds (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Calendar,
    Environment,
    Helmet,
    Labels,
}

impl SourceKind {
    /// All source kinds, in slot order
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Calendar,
        SourceKind::Environment,
        SourceKind::Helmet,
        SourceKind::Labels,
    ];

    /// Number of source kinds (slot array size)
    pub const COUNT: usize = 4;

    /// Slot index for this source
    pub fn index(self) -> usize {
        match self {
            SourceKind::Calendar => 0,
            SourceKind::Environment => 1,
            SourceKind::Helmet => 2,
            SourceKind::Labels => 3,
        }
    }

    /// Parse a wire source name; `None` for anything outside the closed set
    pub fn from_wire(name: &str) -> Option<SourceKind> {
        match name {
            "calendar" => Some(SourceKind::Calendar),
            "environment" => Some(SourceKind::Environment),
            "helmet" => Some(SourceKind::Helmet),
            "labels" => Some(SourceKind::Labels),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Calendar => write!(f, "calendar"),
            SourceKind::Environment => write!(f, "environment"),
            SourceKind::Helmet => write!(f, "helmet"),
            SourceKind::Labels => write!(f, "labels"),
        }
    }
}

/// Set of source kinds, stored as a bitmask over slot indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSet(u8);

impl SourceSet {
    /// Empty set
    pub const fn empty() -> Self {
        SourceSet(0)
    }

    /// Set containing every source kind
    pub fn all() -> Self {
        SourceSet::of(&SourceKind::ALL)
    }

    /// Set containing exactly the given kinds
    pub fn of(kinds: &[SourceKind]) -> Self {
        let mut set = SourceSet::empty();
        for kind in kinds {
            set.insert(*kind);
        }
        set
    }

    pub fn insert(&mut self, kind: SourceKind) {
        self.0 |= 1 << kind.index();
    }

    pub fn contains(self, kind: SourceKind) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    /// True iff every member of `required` is also a member of `self`
    pub fn is_superset_of(self, required: SourceSet) -> bool {
        self.0 & required.0 == required.0
    }
}

/// Raw inbound message as received from the transport, prior to validation
///
/// `source` is kept as a plain string so that unknown sources surface as a
/// validation failure rather than a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordWire {
    pub source: String,
    pub value: serde_json::Value,
}

/// Calendar contribution: what the wearer was doing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarFields {
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    pub activity: String,
}

/// Environment contribution: where the session took place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentFields {
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    pub environment: String,
}

/// Helmet contribution: the periodic EEG signal samples
///
/// Absent samples arrive as JSON `null` and deserialize to [`Sample::Missing`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelmetFields {
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    pub eeg_data: Vec<Sample>,
}

/// Labeller contribution: the expert-assigned movement label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelFields {
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    pub label: String,
}

/// Typed, validated record payload
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePayload {
    Calendar(CalendarFields),
    Environment(EnvironmentFields),
    Helmet(HelmetFields),
    Labels(LabelFields),
}

impl SourcePayload {
    pub fn uuid(&self) -> Uuid {
        match self {
            SourcePayload::Calendar(f) => f.uuid,
            SourcePayload::Environment(f) => f.uuid,
            SourcePayload::Helmet(f) => f.uuid,
            SourcePayload::Labels(f) => f.uuid,
        }
    }
}

/// One validated record: a single source's contribution to a session
///
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Record {
    pub source: SourceKind,
    pub uuid: Uuid,
    pub payload: SourcePayload,
}

impl Record {
    /// Validate a wire message into a typed record
    ///
    /// Fails with [`Error::InvalidInput`] on unknown sources or payloads that
    /// do not match the expected per-source shape (missing UUID included).
    pub fn parse(wire: RecordWire) -> Result<Record> {
        let source = SourceKind::from_wire(&wire.source)
            .ok_or_else(|| Error::InvalidInput(format!("unknown source '{}'", wire.source)))?;

        let payload = match source {
            SourceKind::Calendar => SourcePayload::Calendar(parse_fields(source, wire.value)?),
            SourceKind::Environment => {
                SourcePayload::Environment(parse_fields(source, wire.value)?)
            }
            SourceKind::Helmet => SourcePayload::Helmet(parse_fields(source, wire.value)?),
            SourceKind::Labels => SourcePayload::Labels(parse_fields(source, wire.value)?),
        };

        Ok(Record {
            source,
            uuid: payload.uuid(),
            payload,
        })
    }
}

fn parse_fields<T: serde::de::DeserializeOwned>(
    source: SourceKind,
    value: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::InvalidInput(format!("bad {} record: {}", source, e)))
}
