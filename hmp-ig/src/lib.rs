//! hmp-ig library interface
//!
//! Exposes the ingestion engine and its collaborators for integration
//! testing; the binary in `main.rs` wires them to the inbound HTTP server.

pub mod buffer;
pub mod engine;
pub mod error;
pub mod phase;
pub mod policy;
pub mod router;
pub mod server;

pub use crate::error::{ApiError, ApiResult, IngestError};
