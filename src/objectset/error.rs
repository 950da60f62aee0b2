//! Structured failures produced by the revision engine. These are surfaced
//! as conditions rather than propagated as transport errors.

use thiserror::Error;

/// Why an adoption attempt was refused or a phase did not pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RevisionError {
    /// The current controller of the object is not listed in `previous`
    #[error("object {object} is not owned by a previous revision")]
    NotOwnedByPreviousRevision { object: String },

    /// The object already carries this revision number under a different
    /// controller; only reachable when revision ordering was violated
    #[error("object {object} already belongs to revision {revision}")]
    RevisionCollision { object: String, revision: i64 },
}

/// Aggregated probe failures of one phase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("probing failed in phase {phase}: {}", failures.join("; "))]
pub struct PhaseProbingFailed {
    pub phase: String,
    pub failures: Vec<String>,
}
