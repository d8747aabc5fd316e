//! Session router
//!
//! Sends completed raw sessions to the Preparation System and, during
//! evaluation, labels to the Evaluation System. Sends are synchronous with a
//! bounded timeout and are never retried here; a failure is reported to the
//! caller and the session is lost for this attempt.

use hmp_common::session::{LabelMessage, RawSession};
use hmp_common::{Error, Result};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("hmp-ig/", env!("CARGO_PKG_VERSION"));

/// Downstream send failures
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Connection, DNS, or timeout failure before a response arrived
    #[error("network error sending to {target}: {message}")]
    Transport { target: String, message: String },

    /// The endpoint answered with a non-success status
    #[error("{target} replied with status {status}")]
    Status { target: String, status: u16 },
}

/// Routes sessions and labels to the downstream systems
pub struct SessionRouter {
    http_client: reqwest::Client,
    preparation_url: String,
    evaluation_url: String,
}

impl SessionRouter {
    /// Build a router for the configured downstream addresses
    ///
    /// `send_timeout` bounds every downstream call so a dead endpoint cannot
    /// stall correlation of unrelated sessions indefinitely.
    pub fn new(
        preparation_address: &str,
        evaluation_address: &str,
        send_timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(send_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            preparation_url: format!("http://{}/raw_session", preparation_address),
            evaluation_url: format!("http://{}/label", evaluation_address),
        })
    }

    /// Send a raw session to the Preparation System (every phase)
    pub async fn route_raw_session(
        &self,
        session: &RawSession,
    ) -> std::result::Result<(), SendError> {
        debug!("routing raw session {} to preparation", session.uuid);
        self.post_json(&self.preparation_url, session).await
    }

    /// Send a label to the Evaluation System (evaluation phase only; the
    /// phase gate lives in the engine)
    pub async fn route_label(&self, label: &LabelMessage) -> std::result::Result<(), SendError> {
        debug!("routing label for session {} to evaluation", label.uuid);
        self.post_json(&self.evaluation_url, label).await
    }

    async fn post_json<T: serde::Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> std::result::Result<(), SendError> {
        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SendError::Transport {
                target: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SendError::Status {
                target: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
