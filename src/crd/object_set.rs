use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Annotation carrying the owning revision number on every managed object
pub const REVISION_ANNOTATION: &str = "package-operator.run/revision";

/// Label marking objects as visible to the dynamic cache
pub const CACHE_LABEL: &str = "package-operator.run/cache";

/// Finalizer guaranteeing dynamic watches are released before deletion
pub const CACHE_FINALIZER: &str = "package-operator.run/cached";

/// Condition types reported on ObjectSets and ObjectDeployments
pub mod objectset_conditions {
    pub const AVAILABLE: &str = "Available";
    pub const PAUSED: &str = "Paused";
    pub const ARCHIVED: &str = "Archived";
    pub const SUCCEEDED: &str = "Succeeded";
    pub const PROGRESSING: &str = "Progressing";
}

/// ObjectSet is one immutable revision of a phased object bundle.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "package-operator.run",
    version = "v1alpha1",
    kind = "ObjectSet",
    plural = "objectsets",
    namespaced,
    status = "ObjectSetStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Revision", "type":"integer", "jsonPath":".status.revision"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetSpec {
    /// Active objects are reconciled, Paused ones only observed, Archived
    /// ones torn down
    #[serde(default)]
    pub lifecycle_state: ObjectSetLifecycleState,

    /// Revisions this one may adopt objects from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous: Vec<PreviousRevisionReference>,

    #[serde(flatten)]
    pub template: ObjectSetTemplateSpec,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Default)]
pub enum ObjectSetLifecycleState {
    #[default]
    Active,
    Paused,
    Archived,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviousRevisionReference {
    pub name: String,
}

/// The revision-independent part of an ObjectSet spec, shared with the
/// ObjectDeployment template.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetTemplateSpec {
    /// Ordered apply phases
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<ObjectSetTemplatePhase>,

    /// Probes gating the Available condition
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub availability_probes: Vec<ObjectSetProbe>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetTemplatePhase {
    pub name: String,

    /// Non-empty class delegates the phase to an external phase controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<ObjectSetObject>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetObject {
    /// Full manifest of the object to reconcile
    pub object: serde_json::Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetProbe {
    /// Which objects this probe applies to
    pub selector: ProbeSelector,

    /// All probes must pass for a selected object to count as available
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<Probe>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PackageProbeKindSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageProbeKindSpec {
    #[serde(default)]
    pub group: String,
    pub kind: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ProbeConditionSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_comparison: Option<ProbeFieldComparisonSpec>,
}

/// Passes when a status condition of the given type reports the given value
/// for the object's current generation.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeConditionSpec {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default = "default_condition_status")]
    pub status: String,
}

fn default_condition_status() -> String {
    "True".to_string()
}

/// Passes when two dotted-path fields of the object are equal.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeFieldComparisonSpec {
    pub field_a: String,
    pub field_b: String,
}

/// Reference to an object this revision actively reconciles
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ControlledObjectReference {
    #[serde(default)]
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Reference to an ObjectSetPhase delegated to an external controller
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemotePhaseReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Monotonically increasing revision number, fixed on first reconcile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_phases: Vec<RemotePhaseReference>,

    /// Objects currently controlled by this revision; consulted for archival
    /// safety by the owning ObjectDeployment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controller_of: Vec<ControlledObjectReference>,
}

impl ObjectSet {
    pub fn revision(&self) -> i64 {
        self.status.as_ref().and_then(|s| s.revision).unwrap_or(0)
    }

    pub fn is_archived(&self) -> bool {
        self.spec.lifecycle_state == ObjectSetLifecycleState::Archived
    }

    pub fn is_paused(&self) -> bool {
        self.spec.lifecycle_state == ObjectSetLifecycleState::Paused
    }

    pub fn is_available(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            super::condition::is_condition_true(&s.conditions, objectset_conditions::AVAILABLE)
        })
    }
}
