//! Error types for event admission, reconciliation and persistence.

use std::io;
use std::path::PathBuf;

use crate::verify::invariants::InvariantViolation;

/// A telemetry event that cannot be admitted because a required field is
/// missing or unusable. The ledger is never touched for such events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("{event}: commodity id is empty")]
    EmptyCommodity { event: &'static str },

    #[error("{event}: mission id must be non-zero")]
    MissingMission { event: &'static str },

    #[error("{event}: {field} must be greater than zero")]
    ZeroQuantity {
        event: &'static str,
        field: &'static str,
    },
}

/// Failure of a single `Reconciler::apply` call. No partial mutation is
/// committed when this is returned.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("malformed event: {0}")]
    Malformed(#[from] EventError),

    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Failure of the snapshot codec on the save path.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("failed to persist ledger to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure to turn a raw journal line into a typed event.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("invalid journal json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{event}: missing or invalid field `{field}`")]
    MissingField {
        event: String,
        field: &'static str,
    },
}
