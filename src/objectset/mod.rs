//! Revision engine: ObjectSet and ObjectDeployment reconcilers plus their
//! supporting pure logic.

pub mod adoption;
pub mod deployment;
pub mod error;
pub mod hash;
pub mod phase;
pub mod previous;
pub mod probes;
pub mod reconciler;

pub use adoption::{check_adoption, AdoptionDecision};
pub use error::{PhaseProbingFailed, RevisionError};
pub use hash::compute_hash;
pub use probes::Prober;
pub use reconciler::ObjectSetContext;
