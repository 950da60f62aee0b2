use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::condition::Condition;
use super::object_set::ObjectSetTemplateSpec;

/// Annotation naming the template hash an ObjectSet was created from
pub const HASH_ANNOTATION: &str = "package-operator.run/hash";

/// Archived revisions kept around when `revisionHistoryLimit` is unset
pub const DEFAULT_REVISION_HISTORY_LIMIT: usize = 10;

/// ObjectDeployment rolls out ObjectSet revisions from a template, one
/// revision per distinct template hash.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "package-operator.run",
    version = "v1alpha1",
    kind = "ObjectDeployment",
    plural = "objectdeployments",
    namespaced,
    status = "ObjectDeploymentStatus",
    printcolumn = r#"{"name":"Hash", "type":"string", "jsonPath":".status.templateHash"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDeploymentSpec {
    /// Selector matching the labels of owned ObjectSets
    pub selector: LabelSelector,

    /// How many archived revisions to retain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_history_limit: Option<i32>,

    pub template: ObjectSetTemplate,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetTemplate {
    #[serde(default)]
    pub metadata: ObjectSetTemplateMeta,

    #[serde(default)]
    pub spec: ObjectSetTemplateSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSetTemplateMeta {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDeploymentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Hash of the currently rolled-out template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_hash: Option<String>,

    /// Bumped each time a distinct template hashes onto an existing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision_count: Option<i32>,
}
