use thiserror::Error;

/// Failure taxonomy for a chain worker.
///
/// Detection running out of its time budget is deliberately absent: that is a
/// defined `Signal` outcome, not an error. Anything downstream of a single
/// event (detection, composition, dispatch) is logged and counted by the
/// caller and must never halt processing of later events.
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every redundant endpoint failed or timed out for one operation.
    /// Single-endpoint failures are absorbed inside the mesh and never
    /// surface here.
    #[error("All endpoints failed: {0}")]
    Transient(String),

    #[error("Malformed event notification: {0}")]
    MalformedEvent(String),

    #[error("Rejected edge for pool {pool}: {reason}")]
    GraphData { pool: String, reason: String },

    #[error("Strike encoding failed: {0}")]
    Encoding(String),

    #[error("Relay rejected bundle for block {target_block}: {reason}")]
    RelayRejected { target_block: u64, reason: String },

    /// Signing failure. Worker-fatal: the worker shuts down and leaves
    /// restarting to external supervision.
    #[error("Custody failure: {0}")]
    Custody(String),
}
