//! Pipeline operating phase

use serde::{Deserialize, Serialize};

/// Operating phase of the whole pipeline
///
/// Exactly one phase is active at any instant. The phase governs which record
/// sources a session requires and whether labels are forwarded to the
/// Evaluation System.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Operator-driven model development; never auto-advances
    Development,
    /// Live classification; labels are not expected from the field
    Production,
    /// Accuracy monitoring; labels accompany sessions downstream
    Evaluation,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Development => write!(f, "development"),
            Phase::Production => write!(f, "production"),
            Phase::Evaluation => write!(f, "evaluation"),
        }
    }
}
