//! Error types for the Raxol audit engine.
//!
//! Every fallible operation across the workspace returns `AuditResult<T>`.
//! Variants carry a human-readable `reason` so they can be logged or surfaced
//! to callers without further context.

use thiserror::Error;

/// The unified error type for the audit engine.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A file operation on the audit store failed.
    #[error("audit storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A record or document could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Signing, verification, encryption or decryption failed.
    #[error("cryptographic operation failed: {reason}")]
    Crypto { reason: String },

    /// A query could not be answered.
    #[error("query failed: {reason}")]
    QueryFailed { reason: String },

    /// An export could not be produced.
    #[error("export failed: {reason}")]
    ExportFailed { reason: String },

    /// The requested export format or template is not supported.
    #[error("unsupported format '{format}'")]
    UnsupportedFormat { format: String },

    /// A SIEM endpoint rejected or never received the forwarded events.
    #[error("SIEM forwarding failed: {reason}")]
    Siem { reason: String },

    /// The external durable event store rejected an append.
    #[error("event store append failed: {reason}")]
    EventStore { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A component's worker thread is gone and can no longer accept requests.
    #[error("service '{service}' is unavailable")]
    ServiceUnavailable { service: String },

    /// A request to a component did not complete within the caller's deadline.
    #[error("operation '{operation}' timed out after {millis} ms")]
    Timeout { operation: String, millis: u64 },
}

impl AuditError {
    /// Returns true for failures the ingestion path cannot recover from by
    /// retrying on the next flush cycle.
    ///
    /// A full disk or a dead storage worker will not heal on its own, so
    /// these are the only errors `log_*` surfaces to callers.
    pub fn is_catastrophic(&self) -> bool {
        match self {
            AuditError::Io(e) => e.kind() == std::io::ErrorKind::StorageFull,
            AuditError::ServiceUnavailable { .. } => true,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the audit crates.
pub type AuditResult<T> = Result<T, AuditError>;
