//! Error taxonomy for scanning, aggregation and export.
//!
//! Command handlers work with `anyhow::Result`; these typed errors travel
//! inside it so `main` can map them back to a deterministic exit code.

use thiserror::Error;

/// Errors raised by scan sources and the export layer.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The wireless interface cannot be queried at all (missing interface,
    /// missing tool, insufficient privilege). Never retried.
    #[error("wireless adapter unavailable: {reason}")]
    AdapterUnavailable { reason: String },

    /// A capture did not finish within its time budget.
    #[error("capture timed out after {seconds}s")]
    CaptureTimeout { seconds: u64 },

    /// The backend ran but reported a transient failure (busy device, etc.).
    #[error("capture failed: {reason}")]
    CaptureFailed { reason: String },

    /// An export document could not be decoded or failed validation.
    #[error("malformed export document: field `{field}`: {reason}")]
    MalformedExportDocument { field: String, reason: String },

    /// An export document carries a schema version this build cannot read.
    #[error("unsupported schema version: expected {expected}, found {found}")]
    UnsupportedSchemaVersion { expected: u32, found: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    pub fn adapter_unavailable(reason: impl Into<String>) -> Self {
        Self::AdapterUnavailable {
            reason: reason.into(),
        }
    }

    pub fn malformed(field: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::MalformedExportDocument {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    /// True when a poll loop may log this error and carry on with the next cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CaptureTimeout { .. } | Self::CaptureFailed { .. }
        )
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AdapterUnavailable { .. } => 2,
            Self::MalformedExportDocument { .. } => 3,
            Self::UnsupportedSchemaVersion { .. } => 4,
            _ => 1,
        }
    }
}
