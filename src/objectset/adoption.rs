//! Pure adoption decision logic, kept free of API I/O so every branch is
//! testable with plain metadata.

use std::collections::HashSet;

use kube::api::ObjectMeta;

use crate::crd::REVISION_ANNOTATION;
use crate::objectset::error::RevisionError;
use crate::owners::controller_uid;

/// Outcome of the adoption check for one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdoptionDecision {
    /// The object is already controlled by this revision, or a newer one
    AlreadySettled,
    /// Controller ownership transfers to this revision
    Adopt,
}

/// Revision number stamped on an object, 0 when absent or unparseable.
pub fn object_revision(meta: &ObjectMeta) -> i64 {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(REVISION_ANNOTATION))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn object_display(meta: &ObjectMeta) -> String {
    match meta.namespace.as_deref() {
        Some(ns) => format!("{}/{}", ns, meta.name.clone().unwrap_or_default()),
        None => meta.name.clone().unwrap_or_default(),
    }
}

/// Decide whether revision `revision` (uid `owner_uid`) may take over the
/// object described by `meta`.
///
/// `previous_uids` holds the uids of every revision listed in `previous`,
/// including uids of remote phases those revisions expose.
pub fn check_adoption(
    owner_uid: &str,
    revision: i64,
    meta: &ObjectMeta,
    previous_uids: &HashSet<String>,
) -> Result<AdoptionDecision, RevisionError> {
    let current_controller = controller_uid(meta);

    if current_controller == Some(owner_uid) {
        return Ok(AdoptionDecision::AlreadySettled);
    }

    let object_revision = object_revision(meta);
    if object_revision > revision {
        // A newer revision already took over; this one backs off
        return Ok(AdoptionDecision::AlreadySettled);
    }

    let owned_by_previous = current_controller
        .is_some_and(|uid| previous_uids.contains(uid));
    if !owned_by_previous {
        return Err(RevisionError::NotOwnedByPreviousRevision {
            object: object_display(meta),
        });
    }

    if object_revision == revision {
        return Err(RevisionError::RevisionCollision {
            object: object_display(meta),
            revision,
        });
    }

    Ok(AdoptionDecision::Adopt)
}
