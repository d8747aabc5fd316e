//! Raw session types
//!
//! A raw session is the merged aggregate of all records sharing a correlation
//! UUID, produced exactly once per UUID per buffer lifetime and forwarded to
//! the Preparation System.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Sentinel string used on the wire for an absent signal sample
pub const MISSING_MARKER: &str = "MISSING";

/// One EEG signal sample: either a measured value or the missing-data sentinel
///
/// Serializes as a JSON number or the string `"MISSING"`; deserializes from a
/// number, `null`, or `"MISSING"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Value(f64),
    Missing,
}

impl Sample {
    pub fn is_missing(self) -> bool {
        matches!(self, Sample::Missing)
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Sample::Value(v) => serializer.serialize_f64(*v),
            Sample::Missing => serializer.serialize_str(MISSING_MARKER),
        }
    }
}

struct SampleVisitor;

impl<'de> Visitor<'de> for SampleVisitor {
    type Value = Sample;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "a number, null, or \"{}\"", MISSING_MARKER)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Sample, E> {
        Ok(Sample::Value(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Sample, E> {
        Ok(Sample::Value(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Sample, E> {
        Ok(Sample::Value(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Sample, E> {
        if v == MISSING_MARKER {
            Ok(Sample::Missing)
        } else {
            Err(E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    fn visit_unit<E: de::Error>(self) -> Result<Sample, E> {
        Ok(Sample::Missing)
    }

    fn visit_none<E: de::Error>(self) -> Result<Sample, E> {
        Ok(Sample::Missing)
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Sample, D::Error> {
        deserializer.deserialize_any(SampleVisitor)
    }
}

/// Session-complete aggregate forwarded to the Preparation System
///
/// `label` is present only when the Labels source contributed (development
/// and evaluation phases); it serializes as JSON `null` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSession {
    pub uuid: Uuid,
    pub environment: String,
    pub activity: String,
    pub eeg_data: Vec<Sample>,
    pub label: Option<String>,
}

/// Label message forwarded to the Evaluation System during evaluation phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMessage {
    pub uuid: Uuid,
    pub label: String,
}
