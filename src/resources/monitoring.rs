//! Federation ServiceMonitor generation

use std::collections::BTreeMap;

use kube::api::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{
    Addon, Endpoint, MetricsLabelSelector, MonitoringFederationSpec, NamespaceSelector,
    ServiceMonitor, ServiceMonitorSpec, TlsConfig,
};
use crate::resources::common::{
    federated_service_monitor_name, identity_labels, monitoring_namespace_name, owner_reference,
};

const FEDERATION_PORT: &str = "9090";
const FEDERATION_PATH: &str = "/federate";
const FEDERATION_INTERVAL: &str = "30s";
const SERVING_CERTS_CA_FILE: &str =
    "/etc/prometheus/configmaps/serving-certs-ca-bundle/service-ca.crt";

/// `match[]` query selecting firing alerts plus the configured metric names
pub fn federation_match_params(federation: &MonitoringFederationSpec) -> Vec<String> {
    let mut params = vec![r#"ALERTS{alertstate="firing"}"#.to_string()];
    params.extend(
        federation
            .match_names
            .iter()
            .map(|name| format!(r#"{{__name__="{}"}}"#, name)),
    );
    params
}

/// Generate the ServiceMonitor federating the addon's own Prometheus into
/// cluster monitoring
pub fn generate_federation_service_monitor(
    addon: &Addon,
    federation: &MonitoringFederationSpec,
) -> ServiceMonitor {
    let addon_name = addon.name_any();

    ServiceMonitor {
        metadata: ObjectMeta {
            name: Some(federated_service_monitor_name(&addon_name)),
            namespace: Some(monitoring_namespace_name(&addon_name)),
            labels: Some(identity_labels(&addon_name)),
            owner_references: Some(vec![owner_reference(addon)]),
            ..Default::default()
        },
        spec: ServiceMonitorSpec {
            endpoints: vec![Endpoint {
                port: Some(FEDERATION_PORT.to_string()),
                path: Some(FEDERATION_PATH.to_string()),
                scheme: Some("https".to_string()),
                interval: Some(FEDERATION_INTERVAL.to_string()),
                honor_labels: true,
                params: BTreeMap::from([(
                    "match[]".to_string(),
                    federation_match_params(federation),
                )]),
                tls_config: Some(TlsConfig {
                    ca_file: Some(SERVING_CERTS_CA_FILE.to_string()),
                    server_name: Some(format!("prometheus.{}.svc", federation.namespace)),
                }),
            }],
            namespace_selector: Some(NamespaceSelector {
                match_names: vec![federation.namespace.clone()],
            }),
            selector: MetricsLabelSelector {
                match_labels: federation.match_labels.clone(),
            },
        },
    }
}
