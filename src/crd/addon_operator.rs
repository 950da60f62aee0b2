use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Name of the cluster-scoped AddonOperator singleton
pub const ADDON_OPERATOR_NAME: &str = "addon-operator";

/// AddonOperator is the cluster-scoped singleton configuring the operator
/// itself: a global pause switch and the OCM connection parameters.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "addons.managed.openshift.io",
    version = "v1alpha1",
    kind = "AddonOperator",
    plural = "addonoperators",
    status = "AddonOperatorStatus",
    printcolumn = r#"{"name":"Paused", "type":"boolean", "jsonPath":".spec.paused"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AddonOperatorSpec {
    /// Pause reconciliation of every Addon on the cluster
    #[serde(default)]
    pub paused: bool,

    /// OCM connection used by the upgrade-policy reporter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocm: Option<AddonOperatorOcm>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonOperatorOcm {
    /// Cluster-specific OCM API base URL
    pub endpoint: String,

    /// Secret holding the `accessToken` used to authenticate against OCM
    pub secret: ClusterSecretReference,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSecretReference {
    pub name: String,
    pub namespace: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Default)]
pub enum AddonOperatorPhase {
    #[default]
    Pending,
    Ready,
    Error,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonOperatorStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<AddonOperatorPhase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<String>,
}
