//! Integration tests for the ingestion engine loop
//!
//! Drives the engine through its inbound channel, with the downstream
//! Preparation and Evaluation endpoints stubbed by a local capture server.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use hmp_common::config::IngestionConfig;
use hmp_common::record::RecordWire;
use hmp_common::session::{LabelMessage, RawSession, Sample};
use hmp_common::Phase;
use hmp_ig::engine::{EngineMessage, EngineSnapshot, IngestionEngine};
use hmp_ig::router::SessionRouter;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

/// Requests captured by the stub downstream systems
#[derive(Clone, Default)]
struct Captured {
    sessions: Arc<Mutex<Vec<RawSession>>>,
    labels: Arc<Mutex<Vec<LabelMessage>>>,
}

async fn capture_session(
    State(captured): State<Captured>,
    Json(session): Json<RawSession>,
) -> StatusCode {
    captured.sessions.lock().await.push(session);
    StatusCode::OK
}

async fn capture_label(
    State(captured): State<Captured>,
    Json(label): Json<LabelMessage>,
) -> StatusCode {
    captured.labels.lock().await.push(label);
    StatusCode::OK
}

/// Spawn a stub server standing in for both downstream systems
async fn spawn_downstream() -> (SocketAddr, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/raw_session", post(capture_session))
        .route("/label", post(capture_label))
        .with_state(captured.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, captured)
}

struct Harness {
    tx: mpsc::Sender<EngineMessage>,
    snapshot_rx: watch::Receiver<EngineSnapshot>,
    captured: Captured,
}

fn test_config(downstream: SocketAddr) -> IngestionConfig {
    serde_json::from_value(json!({
        "ingestion_port": 5801,
        "preparation_address": downstream.to_string(),
        "evaluation_address": downstream.to_string(),
        "missing_samples_threshold_interval": 2,
        "production_sessions": 2,
        "evaluation_sessions": 2,
    }))
    .unwrap()
}

/// Spawn an engine wired to a fresh stub downstream
async fn spawn_engine(mutate: impl FnOnce(&mut IngestionConfig)) -> Harness {
    let (addr, captured) = spawn_downstream().await;
    let mut config = test_config(addr);
    mutate(&mut config);

    let router = SessionRouter::new(
        &config.preparation_address,
        &config.evaluation_address,
        Duration::from_secs(2),
    )
    .unwrap();
    let (tx, rx) = mpsc::channel(64);
    let (engine, snapshot_rx) = IngestionEngine::new(&config, rx, router);
    tokio::spawn(engine.run());

    Harness {
        tx,
        snapshot_rx,
        captured,
    }
}

fn wire(source: &str, uuid: Uuid, mut value: serde_json::Value) -> EngineMessage {
    value["UUID"] = json!(uuid);
    EngineMessage::Record(RecordWire {
        source: source.to_string(),
        value,
    })
}

impl Harness {
    async fn send(&self, message: EngineMessage) {
        self.tx.send(message).await.unwrap();
    }

    /// Send calendar + environment + helmet (+ labels) for one session
    async fn send_session(&self, uuid: Uuid, eeg: serde_json::Value, label: Option<&str>) {
        self.send(wire("calendar", uuid, json!({"activity": "shopping"})))
            .await;
        self.send(wire("environment", uuid, json!({"environment": "slippery"})))
            .await;
        self.send(wire("helmet", uuid, json!({"eeg_data": eeg}))).await;
        if let Some(label) = label {
            self.send(wire("labels", uuid, json!({"label": label}))).await;
        }
    }

    async fn wait_for_sessions(&self, count: usize) {
        let sessions = self.captured.sessions.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            loop {
                if sessions.lock().await.len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for forwarded sessions");
    }

    async fn wait_for_labels(&self, count: usize) {
        let labels = self.captured.labels.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            loop {
                if labels.lock().await.len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for forwarded labels");
    }

    async fn wait_for_snapshot(&mut self, pred: impl Fn(&EngineSnapshot) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if pred(&self.snapshot_rx.borrow()) {
                    break;
                }
                self.snapshot_rx.changed().await.unwrap();
            }
        })
        .await
        .expect("timed out waiting for engine snapshot");
    }
}

#[tokio::test]
async fn production_session_is_forwarded_without_label() {
    // Scenario A: three records complete a session in production
    let mut harness = spawn_engine(|_| {}).await;
    let uuid = Uuid::new_v4();

    harness.send_session(uuid, json!([1.0, 2.0, 3.0]), None).await;
    harness.wait_for_sessions(1).await;

    let sessions = harness.captured.sessions.lock().await.clone();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].uuid, uuid);
    assert_eq!(sessions[0].activity, "shopping");
    assert_eq!(sessions[0].environment, "slippery");
    assert_eq!(sessions[0].label, None);

    assert!(harness.captured.labels.lock().await.is_empty());
    harness
        .wait_for_snapshot(|s| s.phase == Phase::Production && s.forwarded_in_phase == 1)
        .await;
}

#[tokio::test]
async fn production_limit_advances_to_evaluation() {
    // Scenario B: the second forwarded session reaches the limit
    let mut harness = spawn_engine(|_| {}).await;

    harness
        .send_session(Uuid::new_v4(), json!([1.0]), None)
        .await;
    harness
        .send_session(Uuid::new_v4(), json!([2.0]), None)
        .await;

    harness.wait_for_sessions(2).await;
    harness
        .wait_for_snapshot(|s| s.phase == Phase::Evaluation && s.forwarded_in_phase == 0)
        .await;
}

#[tokio::test]
async fn evaluation_forwards_session_and_label() {
    // Scenario C: in evaluation all four sources are required, and the label
    // goes to the Evaluation System
    let mut harness = spawn_engine(|c| c.evaluation_phase = true).await;
    let uuid = Uuid::new_v4();

    // three sources are not enough in evaluation
    harness.send_session(uuid, json!([1.0, 2.0]), None).await;
    harness
        .wait_for_snapshot(|s| s.buffered_sessions == 1)
        .await;
    assert!(harness.captured.sessions.lock().await.is_empty());

    // the labels record completes the session
    harness
        .send(wire("labels", uuid, json!({"label": "move"})))
        .await;
    harness.wait_for_sessions(1).await;
    harness.wait_for_labels(1).await;

    let sessions = harness.captured.sessions.lock().await.clone();
    assert_eq!(sessions[0].label.as_deref(), Some("move"));

    let labels = harness.captured.labels.lock().await.clone();
    assert_eq!(labels[0], LabelMessage { uuid, label: "move".to_string() });
}

#[tokio::test]
async fn degraded_session_is_dropped_silently() {
    // Scenario D: threshold 2, three missing samples out of ten
    let mut harness = spawn_engine(|_| {}).await;
    let uuid = Uuid::new_v4();

    harness
        .send_session(
            uuid,
            json!([1.0, null, 2.0, null, 3.0, null, 4.0, 5.0, 6.0, 7.0]),
            None,
        )
        .await;

    harness
        .wait_for_snapshot(|s| s.stats.sessions_dropped_missing_data == 1)
        .await;
    assert!(harness.captured.sessions.lock().await.is_empty());
    assert!(harness.captured.labels.lock().await.is_empty());
}

#[tokio::test]
async fn malformed_records_do_not_stop_ingestion() {
    let mut harness = spawn_engine(|_| {}).await;

    harness
        .send(wire("barometer", Uuid::new_v4(), json!({})))
        .await;
    harness
        .send(EngineMessage::Record(RecordWire {
            source: "calendar".to_string(),
            value: json!({"activity": "run"}), // no UUID
        }))
        .await;
    harness
        .wait_for_snapshot(|s| s.stats.records_malformed == 2)
        .await;

    // the loop keeps ingesting afterwards
    harness
        .send_session(Uuid::new_v4(), json!([1.0]), None)
        .await;
    harness.wait_for_sessions(1).await;
}

#[tokio::test]
async fn completed_session_is_never_reemitted() {
    let mut harness = spawn_engine(|_| {}).await;
    let uuid = Uuid::new_v4();

    harness.send_session(uuid, json!([1.0]), None).await;
    harness.wait_for_sessions(1).await;

    // a late record for the same id starts a brand-new entry
    harness
        .send(wire("calendar", uuid, json!({"activity": "cycling"})))
        .await;
    harness
        .wait_for_snapshot(|s| s.buffered_sessions == 1)
        .await;
    assert_eq!(harness.captured.sessions.lock().await.len(), 1);

    // completing the new entry forwards a second, fresh session
    harness
        .send(wire("environment", uuid, json!({"environment": "dry"})))
        .await;
    harness
        .send(wire("helmet", uuid, json!({"eeg_data": [9.0]})))
        .await;
    harness.wait_for_sessions(2).await;

    let sessions = harness.captured.sessions.lock().await.clone();
    assert_eq!(sessions[1].activity, "cycling");
    assert_eq!(sessions[1].eeg_data, vec![Sample::Value(9.0)]);
}

#[tokio::test]
async fn operator_phase_change_controls_counting_and_labels() {
    let mut harness = spawn_engine(|_| {}).await;

    harness.send(EngineMessage::SetPhase(Phase::Development)).await;
    harness
        .wait_for_snapshot(|s| s.phase == Phase::Development)
        .await;

    // development requires the label but never routes it, and never counts
    let uuid = Uuid::new_v4();
    harness.send_session(uuid, json!([1.0]), Some("move")).await;
    harness.wait_for_sessions(1).await;
    assert!(harness.captured.labels.lock().await.is_empty());
    harness
        .wait_for_snapshot(|s| s.phase == Phase::Development && s.forwarded_in_phase == 0)
        .await;

    // hand-off back to evaluation resumes label routing
    harness.send(EngineMessage::SetPhase(Phase::Evaluation)).await;
    harness
        .send_session(Uuid::new_v4(), json!([2.0]), Some("stand"))
        .await;
    harness.wait_for_labels(1).await;
}

#[tokio::test]
async fn service_flag_pins_the_phase() {
    let mut harness = spawn_engine(|c| c.service_flag = true).await;

    for _ in 0..3 {
        harness
            .send_session(Uuid::new_v4(), json!([1.0]), None)
            .await;
    }
    harness.wait_for_sessions(3).await;

    harness
        .wait_for_snapshot(|s| s.stats.sessions_forwarded == 3)
        .await;
    let snapshot = harness.snapshot_rx.borrow().clone();
    assert_eq!(snapshot.phase, Phase::Production);
    assert_eq!(snapshot.forwarded_in_phase, 0);
}

#[tokio::test]
async fn failed_send_loses_the_session_but_not_the_loop() {
    let (live_addr, captured) = spawn_downstream().await;

    // reserve a port, then close it so the preparation send is refused
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let mut config = test_config(live_addr);
    config.preparation_address = dead_addr.to_string();

    let router = SessionRouter::new(
        &config.preparation_address,
        &config.evaluation_address,
        Duration::from_secs(1),
    )
    .unwrap();
    let (tx, rx) = mpsc::channel(64);
    let (engine, snapshot_rx) = IngestionEngine::new(&config, rx, router);
    tokio::spawn(engine.run());
    let mut harness = Harness {
        tx,
        snapshot_rx,
        captured,
    };

    harness
        .send_session(Uuid::new_v4(), json!([1.0]), None)
        .await;
    harness
        .wait_for_snapshot(|s| s.stats.send_failures == 1 && s.stats.sessions_forwarded == 0)
        .await;

    // the loop is still alive and processing control messages
    harness.send(EngineMessage::SetPhase(Phase::Development)).await;
    harness
        .wait_for_snapshot(|s| s.phase == Phase::Development)
        .await;
}
