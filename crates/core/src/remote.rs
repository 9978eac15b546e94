//! Remote inventory service boundary.
//!
//! The coordinator only ever talks to the remote side through this trait;
//! the HTTP transport lives in `arborsync-remote`.

use thiserror::Error;

use crate::model::{Tree, TreeId};

/// Error type for remote inventory operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// No API token configured.
    #[error("not authenticated: no API token configured")]
    NotAuthenticated,

    /// Network error (connect, timeout, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// HTTP error with status code and response body.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Replay stopped by the caller's cancellation signal.
    #[error("cancelled before the call was issued")]
    Cancelled,
}

/// Remote service identity, reported by the pre-flight probe.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Mutating operations the reconciliation pipeline replays against the
/// remote inventory, one call per record. Authentication and transport are
/// the implementor's concern.
pub trait InventoryService {
    /// Probe the service; used as a pre-flight connectivity check.
    fn server_info(&self) -> Result<ServerInfo, RemoteError>;

    /// Create one tree; returns the identifier the remote side assigned.
    fn create_tree(&self, tree: &Tree) -> Result<TreeId, RemoteError>;

    fn update_tree(&self, id: TreeId, tree: &Tree) -> Result<(), RemoteError>;

    fn delete_tree(&self, id: TreeId) -> Result<(), RemoteError>;
}
