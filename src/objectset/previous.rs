//! Lookup of previous revisions referenced by an ObjectSet.

use std::collections::HashSet;

use kube::api::Api;
use kube::Client;

use crate::controller::error::Result;
use crate::crd::ObjectSet;

/// Everything the current revision needs to know about its predecessors.
#[derive(Debug, Default)]
pub struct PreviousRevisions {
    /// Uids allowed to hand objects over, including remote phase uids the
    /// predecessors expose
    pub uids: HashSet<String>,

    /// Highest revision number among the predecessors
    pub max_revision: i64,
}

/// Resolve the `previous` references of an ObjectSet. Missing predecessors
/// are skipped; a deleted predecessor can no longer hand anything over.
pub async fn lookup_previous(
    client: &Client,
    namespace: &str,
    object_set: &ObjectSet,
) -> Result<PreviousRevisions> {
    let api: Api<ObjectSet> = Api::namespaced(client.clone(), namespace);
    let mut previous = PreviousRevisions::default();

    for reference in &object_set.spec.previous {
        let Some(predecessor) = api.get_opt(&reference.name).await? else {
            continue;
        };

        if let Some(uid) = &predecessor.metadata.uid {
            previous.uids.insert(uid.clone());
        }
        if let Some(status) = &predecessor.status {
            for remote in &status.remote_phases {
                if let Some(uid) = &remote.uid {
                    previous.uids.insert(uid.clone());
                }
            }
        }
        previous.max_revision = previous.max_revision.max(predecessor.revision());
    }

    Ok(previous)
}

/// Revision number for an ObjectSet: fixed once written to status, derived
/// from the predecessors on first reconcile.
pub fn derive_revision(object_set: &ObjectSet, previous: &PreviousRevisions) -> i64 {
    let existing = object_set.revision();
    if existing > 0 {
        existing
    } else {
        previous.max_revision + 1
    }
}
