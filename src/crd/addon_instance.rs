use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Name every AddonInstance is created under in its target namespace
pub const ADDON_INSTANCE_NAME: &str = "addon-instance";

/// Default heartbeat reporting period in seconds
pub const DEFAULT_HEARTBEAT_PERIOD_SECONDS: i64 = 10;

/// AddonInstance is the per-namespace liveness contract between this
/// operator and the addon workload: the workload updates
/// `status.lastHeartbeatTime` at the configured period.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "addons.managed.openshift.io",
    version = "v1alpha1",
    kind = "AddonInstance",
    plural = "addoninstances",
    namespaced,
    status = "AddonInstanceStatus",
    printcolumn = r#"{"name":"Last Heartbeat", "type":"date", "jsonPath":".status.lastHeartbeatTime"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AddonInstanceSpec {
    /// How often the workload is expected to update the heartbeat, in seconds
    #[serde(default = "default_heartbeat_period")]
    pub heartbeat_update_period_seconds: i64,
}

fn default_heartbeat_period() -> i64 {
    DEFAULT_HEARTBEAT_PERIOD_SECONDS
}

impl Default for AddonInstanceSpec {
    fn default() -> Self {
        Self {
            heartbeat_update_period_seconds: DEFAULT_HEARTBEAT_PERIOD_SECONDS,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonInstanceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Written by the addon workload, never by this operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<String>,
}
