use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::condition::Condition;

/// Addon is the Schema for the cluster-scoped addons API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "addons.managed.openshift.io",
    version = "v1alpha1",
    kind = "Addon",
    plural = "addons",
    status = "AddonStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {
    /// Human readable name for the addon
    pub display_name: String,

    /// Namespaces the addon is responsible for
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<AddonNamespace>,

    /// OLM installation parameters
    pub install: Install,

    /// Prometheus federation settings for the addon's own monitoring stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringSpec>,

    /// OCM upgrade policy this addon reports progress against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_policy: Option<AddonUpgradePolicy>,

    /// Pause reconciliation of this addon only
    #[serde(default)]
    pub paused: bool,

    /// What to do when a managed resource already exists with a foreign owner
    #[serde(default)]
    pub resource_adoption_strategy: ResourceAdoptionStrategy,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonNamespace {
    pub name: String,
}

/// How the reconciler treats pre-existing resources that collide with a
/// desired one.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Default)]
pub enum ResourceAdoptionStrategy {
    /// Refuse to touch foreign-owned resources and report `CollidedNamespaces`
    #[default]
    Prevent,
    /// Take ownership of colliding resources by rewriting owner references
    AdoptAll,
}

/// OLM install parameters. The `type` tag selects the OperatorGroup shape;
/// everything else is common to both modes.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(tag = "type")]
pub enum Install {
    /// OperatorGroup targets only the install namespace
    OwnNamespace(InstallSpec),
    /// OperatorGroup targets all namespaces
    AllNamespaces(InstallSpec),
}

impl Install {
    pub fn spec(&self) -> &InstallSpec {
        match self {
            Install::OwnNamespace(spec) | Install::AllNamespaces(spec) => spec,
        }
    }

    pub fn is_own_namespace(&self) -> bool {
        matches!(self, Install::OwnNamespace(_))
    }

    /// The namespace OLM objects are created in.
    pub fn target_namespace(&self) -> &str {
        &self.spec().namespace
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstallSpec {
    /// Namespace the CatalogSource, OperatorGroup and Subscription live in
    pub namespace: String,

    /// Catalog image published for this addon
    pub catalog_source_image: String,

    /// Subscription channel
    pub channel: String,

    /// OLM package name
    pub package_name: String,

    /// Extra environment variables passed through to the Subscription config
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvObject>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvObject {
    pub name: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation: Option<MonitoringFederationSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringFederationSpec {
    /// Namespace the in-addon Prometheus runs in
    pub namespace: String,

    /// Labels selecting the in-addon Prometheus service
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Metric names to federate in addition to firing alerts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_names: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonUpgradePolicy {
    /// Upgrade policy id in OCM
    pub id: String,
}

/// Value reported to the OCM upgrade policy endpoint
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum AddonUpgradePolicyValue {
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "completed")]
    Completed,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonUpgradePolicyStatus {
    pub id: String,
    pub value: AddonUpgradePolicyValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Coarse lifecycle phase, derived from conditions; for kubectl output only
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Default)]
pub enum AddonPhase {
    #[default]
    Pending,
    Ready,
    Terminating,
    Error,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonStatus {
    /// Generation last acted on by the reconciler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<AddonPhase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_policy: Option<AddonUpgradePolicyStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<String>,
}

impl Addon {
    /// Target namespace for OLM objects.
    pub fn target_namespace(&self) -> &str {
        self.spec.install.target_namespace()
    }

    /// Install parameters, or `None` when required fields are empty.
    ///
    /// The install descriptor is a closed sum so the old "unknown type" and
    /// "variant missing" failure modes cannot be represented; only empty
    /// required strings remain checkable.
    pub fn valid_install_spec(&self) -> Option<&InstallSpec> {
        let spec = self.spec.install.spec();
        if spec.namespace.is_empty() || spec.catalog_source_image.is_empty() {
            return None;
        }
        Some(spec)
    }
}
