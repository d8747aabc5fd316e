//! Ingestion engine
//!
//! Single consumer loop over the inbound channel. The engine exclusively owns
//! the session buffer and the phase state machine, so buffer mutation,
//! completeness checks, and phase-counter updates are serialized without
//! locks. Producers (the transport handlers) only ever touch the channel
//! sender; observers read the published snapshot.
//!
//! Every failure is local to one iteration: a malformed record, a degraded
//! session, or a failed send is logged and the loop moves on. Only channel
//! closure terminates the run.

use chrono::{Duration as ChronoDuration, Utc};
use hmp_common::config::IngestionConfig;
use hmp_common::record::{Record, RecordWire};
use hmp_common::session::LabelMessage;
use hmp_common::Phase;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::{SessionBuffer, StoreOutcome};
use crate::error::IngestError;
use crate::phase::PhaseStateMachine;
use crate::policy::MissingDataPolicy;
use crate::router::SessionRouter;

/// Message consumed by the engine loop
#[derive(Debug)]
pub enum EngineMessage {
    /// An inbound record, unvalidated
    Record(RecordWire),
    /// Operator-driven phase change
    SetPhase(Phase),
}

/// Rolling counters for observability
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EngineStats {
    pub records_received: u64,
    pub records_malformed: u64,
    pub records_duplicate: u64,
    pub sessions_forwarded: u64,
    pub sessions_dropped_missing_data: u64,
    pub sessions_expired: u64,
    pub labels_forwarded: u64,
    pub send_failures: u64,
}

/// Engine state published for the /status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub phase: Phase,
    pub forwarded_in_phase: u64,
    pub buffered_sessions: usize,
    pub stats: EngineStats,
}

/// Orchestrates assembly, policy, phase, and routing for inbound records
pub struct IngestionEngine {
    rx: mpsc::Receiver<EngineMessage>,
    buffer: SessionBuffer,
    policy: MissingDataPolicy,
    phase: PhaseStateMachine,
    router: SessionRouter,
    /// None disables the partial-session eviction sweep
    session_ttl: Option<ChronoDuration>,
    stats: EngineStats,
    snapshot_tx: watch::Sender<EngineSnapshot>,
}

impl IngestionEngine {
    /// Wire up an engine from configuration
    ///
    /// Returns the engine plus a receiver for its published state snapshots.
    pub fn new(
        config: &IngestionConfig,
        rx: mpsc::Receiver<EngineMessage>,
        router: SessionRouter,
    ) -> (Self, watch::Receiver<EngineSnapshot>) {
        let phase = PhaseStateMachine::new(
            config.resolved_initial_phase(),
            config.production_sessions,
            config.evaluation_sessions,
            config.service_flag,
        );
        let session_ttl = match config.session_ttl_seconds {
            0 => None,
            secs => Some(ChronoDuration::seconds(secs as i64)),
        };

        let initial = EngineSnapshot {
            phase: phase.current(),
            forwarded_in_phase: 0,
            buffered_sessions: 0,
            stats: EngineStats::default(),
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let engine = Self {
            rx,
            buffer: SessionBuffer::new(config.duplicate_policy),
            policy: MissingDataPolicy::new(config.missing_samples_threshold_interval),
            phase,
            router,
            session_ttl,
            stats: EngineStats::default(),
            snapshot_tx,
        };
        (engine, snapshot_rx)
    }

    /// Consume the inbound channel until it closes
    ///
    /// Runs for the lifetime of the process; shutdown is dropping all
    /// senders. The eviction sweep shares this task, so buffer access stays
    /// single-consumer.
    pub async fn run(mut self) {
        info!("ingestion engine started in {} phase", self.phase.current());

        let sweep_period = match self.session_ttl {
            Some(ttl) => Duration::from_secs((ttl.num_seconds() as u64 / 4).max(1)),
            None => Duration::from_secs(3600),
        };
        let mut sweep = tokio::time::interval(sweep_period);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick completes immediately; swallow it
        sweep.tick().await;

        loop {
            tokio::select! {
                message = self.rx.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        info!("{}, ingestion engine stopping", IngestError::ChannelClosed);
                        break;
                    }
                },
                _ = sweep.tick(), if self.session_ttl.is_some() => self.sweep_expired(),
            }
            self.publish_snapshot();
        }
    }

    async fn handle_message(&mut self, message: EngineMessage) {
        match message {
            // a failed iteration never stops ingestion of later records
            EngineMessage::Record(wire) => {
                if let Err(e) = self.ingest_record(wire).await {
                    self.note_failure(&e);
                    warn!("{}", e);
                }
            }
            EngineMessage::SetPhase(phase) => {
                if let Some(transition) = self.phase.set_phase(phase) {
                    info!(
                        "operator phase change: {} -> {}",
                        transition.from, transition.to
                    );
                } else {
                    debug!("operator phase change to {} ignored (already active)", phase);
                }
            }
        }
    }

    /// One full ingestion iteration for one inbound record
    async fn ingest_record(&mut self, wire: RecordWire) -> Result<(), IngestError> {
        self.stats.records_received += 1;

        // validate against the expected record shape
        let record =
            Record::parse(wire).map_err(|e| IngestError::MalformedRecord(e.to_string()))?;

        let uuid = record.uuid;
        let source = record.source;
        match self.buffer.store(record) {
            StoreOutcome::Stored => {}
            StoreOutcome::Overwritten => {
                debug!("late {} record for session {} overwrote the stored one", source, uuid);
            }
            StoreOutcome::Ignored => {
                debug!("late {} record for session {} ignored", source, uuid);
            }
            StoreOutcome::Rejected => {
                return Err(IngestError::DuplicateRecord { uuid, kind: source });
            }
        }

        // completeness is judged against the phase active right now; an
        // incomplete session is the normal waiting state, not a failure
        let required = self.phase.required_sources();
        if !self.buffer.is_complete(uuid, required) {
            return Ok(());
        }

        let session = self.buffer.extract_and_remove(uuid)?;

        let (missing, session) = self.policy.mark(session);
        if self.policy.exceeds_threshold(missing) {
            return Err(IngestError::ExcessiveMissingData {
                uuid,
                missing,
                threshold: self.policy.threshold(),
            });
        }

        self.router
            .route_raw_session(&session)
            .await
            .map_err(|e| IngestError::Send { uuid, source: e })?;
        self.stats.sessions_forwarded += 1;
        debug!("raw session {} forwarded to preparation", uuid);

        if self.phase.current() == Phase::Evaluation {
            self.route_label(uuid, session.label.as_deref()).await;
        }

        if let Some(transition) = self.phase.record_forwarded_session() {
            info!("phase transition: {} -> {}", transition.from, transition.to);
        }
        Ok(())
    }

    /// Bump the per-kind counter for a failed iteration
    fn note_failure(&mut self, error: &IngestError) {
        match error {
            IngestError::MalformedRecord(_) => self.stats.records_malformed += 1,
            IngestError::DuplicateRecord { .. } => self.stats.records_duplicate += 1,
            IngestError::ExcessiveMissingData { .. } => {
                self.stats.sessions_dropped_missing_data += 1
            }
            IngestError::Send { .. } => self.stats.send_failures += 1,
            _ => {}
        }
    }

    async fn route_label(&mut self, uuid: Uuid, label: Option<&str>) {
        let label = match label {
            Some(label) => label,
            None => {
                // cannot happen while labels are required for completion in
                // evaluation, but a lost label must not lose the session
                warn!("session {} completed in evaluation without a label", uuid);
                return;
            }
        };
        let message = LabelMessage {
            uuid,
            label: label.to_string(),
        };
        match self.router.route_label(&message).await {
            Ok(()) => {
                self.stats.labels_forwarded += 1;
                debug!("label for session {} forwarded to evaluation", uuid);
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("label for session {} not delivered: {}", uuid, e);
            }
        }
    }

    fn sweep_expired(&mut self) {
        let ttl = match self.session_ttl {
            Some(ttl) => ttl,
            None => return,
        };
        let evicted = self.buffer.evict_expired(ttl, Utc::now());
        if !evicted.is_empty() {
            self.stats.sessions_expired += evicted.len() as u64;
            for uuid in evicted {
                warn!("{}", IngestError::ExpiredSession(uuid));
            }
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(EngineSnapshot {
            phase: self.phase.current(),
            forwarded_in_phase: self.phase.forwarded_in_phase(),
            buffered_sessions: self.buffer.len(),
            stats: self.stats,
        });
    }
}
