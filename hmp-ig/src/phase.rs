//! Phase state machine
//!
//! Tracks the current pipeline phase and the rolling count of sessions
//! forwarded in it. Owned exclusively by the engine loop; no process-wide
//! state. Auto-advance cycles production and evaluation; development is
//! operator-driven and never advances on its own.

use hmp_common::record::{SourceKind, SourceSet};
use hmp_common::Phase;

/// A phase change, reported for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
}

/// Per-phase session counting and transition logic
#[derive(Debug)]
pub struct PhaseStateMachine {
    phase: Phase,
    /// Sessions forwarded since entering the current phase
    forwarded: u64,
    production_limit: u64,
    evaluation_limit: u64,
    /// False when the service/testing escape hatch disables auto-advance
    auto_advance: bool,
}

impl PhaseStateMachine {
    pub fn new(
        initial: Phase,
        production_limit: u64,
        evaluation_limit: u64,
        service_flag: bool,
    ) -> Self {
        Self {
            phase: initial,
            forwarded: 0,
            production_limit,
            evaluation_limit,
            auto_advance: !service_flag,
        }
    }

    /// Read-only snapshot of the active phase
    pub fn current(&self) -> Phase {
        self.phase
    }

    /// Sessions forwarded since the current phase began
    pub fn forwarded_in_phase(&self) -> u64 {
        self.forwarded
    }

    /// Record sources a session must assemble under the active phase
    ///
    /// The label is not expected from the field in production.
    pub fn required_sources(&self) -> SourceSet {
        match self.phase {
            Phase::Production => SourceSet::of(&[
                SourceKind::Calendar,
                SourceKind::Environment,
                SourceKind::Helmet,
            ]),
            Phase::Development | Phase::Evaluation => SourceSet::all(),
        }
    }

    /// Count one successfully forwarded session and advance the phase when
    /// its limit is reached
    ///
    /// No-op in development (the operator drives that phase) and when
    /// auto-advance is disabled by the service flag.
    pub fn record_forwarded_session(&mut self) -> Option<PhaseTransition> {
        if self.phase == Phase::Development || !self.auto_advance {
            return None;
        }

        self.forwarded += 1;

        let next = match self.phase {
            Phase::Production if self.forwarded >= self.production_limit => Phase::Evaluation,
            Phase::Evaluation if self.forwarded >= self.evaluation_limit => Phase::Production,
            _ => return None,
        };

        let transition = PhaseTransition {
            from: self.phase,
            to: next,
        };
        self.phase = next;
        self.forwarded = 0;
        Some(transition)
    }

    /// Operator-driven phase change; resets the rolling counter
    ///
    /// This is the only way development is entered or left.
    pub fn set_phase(&mut self, phase: Phase) -> Option<PhaseTransition> {
        if phase == self.phase {
            return None;
        }
        let transition = PhaseTransition {
            from: self.phase,
            to: phase,
        };
        self.phase = phase;
        self.forwarded = 0;
        Some(transition)
    }
}
