//! Error kinds of the ingestion pipeline.
//!
//! Only [`PipelineError::Discovery`] and [`PipelineError::Ledger`] are fatal
//! for a run. Every other kind is caught at the per-document boundary by the
//! orchestrator and turned into a [`DocumentOutcome::Failed`](crate::pipeline::DocumentOutcome).

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source page (or link list) could not be read or parsed.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// Network or read error while fetching one document. `transient` is
    /// false for responses that a retry cannot fix (e.g. HTTP 404).
    #[error("fetch failed for {link}: {reason}")]
    Fetch {
        link: String,
        reason: String,
        transient: bool,
    },

    /// The fetched bytes are not a readable PDF, or page 1 has no text.
    #[error("parse failed for {link}: {reason}")]
    Parse { link: String, reason: String },

    /// The parse stage produced a batch the transformer cannot accept.
    #[error("transformation precondition violated: {0}")]
    TransformationPrecondition(String),

    /// Downstream storage rejected a batch.
    #[error("sink rejected batch: {0}")]
    Sink(String),

    /// Reading or persisting the processed ledger failed.
    #[error("ledger error: {0}")]
    Ledger(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Discovery(_) => ErrorKind::Discovery,
            PipelineError::Fetch { .. } => ErrorKind::Fetch,
            PipelineError::Parse { .. } => ErrorKind::Parse,
            PipelineError::TransformationPrecondition(_) => ErrorKind::TransformationPrecondition,
            PipelineError::Sink(_) => ErrorKind::Sink,
            PipelineError::Ledger(_) => ErrorKind::Ledger,
        }
    }

    /// Whether another attempt could succeed. Used by the backoff loop.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Fetch { transient, .. } => *transient,
            PipelineError::Sink(_) => true,
            _ => false,
        }
    }
}

/// Serializable tag for a [`PipelineError`], used in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Discovery,
    Fetch,
    Parse,
    TransformationPrecondition,
    Sink,
    Ledger,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Discovery => "discovery",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Parse => "parse",
            ErrorKind::TransformationPrecondition => "transformation_precondition",
            ErrorKind::Sink => "sink",
            ErrorKind::Ledger => "ledger",
        };
        f.write_str(s)
    }
}
