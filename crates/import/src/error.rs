use serde::Serialize;
use thiserror::Error;

use arborsync_core::{RemoteError, ValidationError};
use arborsync_geo::GeoError;
use arborsync_store::StoreError;

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Input rejection, attributed to the offending row (1-indexed, header
/// excluded) and column. Fully recoverable by fixing the file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("'{0}' is not a CSV file")]
    NotCsv(String),

    #[error("cannot read input: {0}")]
    Io(String),

    #[error("header mismatch: expected [{expected}], found [{found}]")]
    HeaderMismatch { expected: String, found: String },

    #[error("row {row} is malformed: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("row {row}: column '{column}' is missing or empty")]
    MissingField { row: usize, column: String },

    #[error("row {row}: column '{column}' holds '{value}', not a number")]
    InvalidNumber { row: usize, column: String, value: String },
}

// ---------------------------------------------------------------------------
// Run errors
// ---------------------------------------------------------------------------

/// How far the remote replay got before it stopped. Create, update, and
/// delete calls are issued in that order, so the cursor tells an operator
/// exactly which records are mirrored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayProgress {
    pub creates_done: usize,
    pub updates_done: usize,
    pub deletes_done: usize,
}

impl std::fmt::Display for ReplayProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} creates, {} updates, {} deletes",
            self.creates_done, self.updates_done, self.deletes_done
        )
    }
}

/// One reconciliation run fails with exactly one of these; the variant
/// identifies the pipeline stage that stopped the run.
#[derive(Debug, Error)]
pub enum ImportRunError {
    #[error("input rejected: {0}")]
    Input(ParseError),

    #[error("field validation failed: {0}")]
    Validation(ValidationError),

    #[error("reprojection failed: {0}")]
    Transform(GeoError),

    #[error("local persistence failed, transaction rolled back: {0}")]
    Local(StoreError),

    /// Local store committed but the remote replay stopped partway: the
    /// two inventories now disagree. Never folded into a generic failure.
    #[error("reconciliation drift: local store committed, remote replay stopped after {progress}: {source}")]
    Drift { progress: ReplayProgress, source: RemoteError },

    /// Both inventories agree; only the audit batch is missing.
    #[error("audit record could not be written: {0}")]
    Audit(StoreError),
}

impl ImportRunError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Input(_) => Stage::Parsing,
            Self::Validation(_) => Stage::Validating,
            Self::Transform(_) => Stage::Transforming,
            Self::Local(_) => Stage::LocalCommit,
            Self::Drift { .. } => Stage::RemoteReplay,
            Self::Audit(_) => Stage::Audited,
        }
    }
}

/// Pipeline stages, in execution order. A failed run is attributed to the
/// stage it stopped in; there is no automatic retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parsing,
    Transforming,
    Validating,
    Diffing,
    LocalCommit,
    RemoteReplay,
    Audited,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parsing => write!(f, "parsing"),
            Self::Transforming => write!(f, "transforming"),
            Self::Validating => write!(f, "validating"),
            Self::Diffing => write!(f, "diffing"),
            Self::LocalCommit => write!(f, "local-commit"),
            Self::RemoteReplay => write!(f, "remote-replay"),
            Self::Audited => write!(f, "audited"),
        }
    }
}
