//! Unit tests for resource generators
//!
//! Tests for Namespace, AddonInstance, OLM objects and the federation
//! ServiceMonitor.

use kube::ResourceExt;

use addon_operator::crd::{Install, InstallSpec};
use addon_operator::resources::common::{
    federated_service_monitor_name, has_equal_controller_reference, identity_labels,
    identity_selector, monitoring_namespace_name, owner_reference,
};
use addon_operator::resources::namespace::{
    generate_monitoring_namespace, generate_namespace, is_namespace_active,
    CLUSTER_MONITORING_LABEL,
};
use addon_operator::resources::olm::{
    generate_catalog_source, generate_operator_group, generate_subscription,
    CATALOG_SOURCE_PUBLISHER,
};
use addon_operator::resources::{addon_instance, monitoring};

use crate::builders::AddonBuilder;

mod namespace_tests {
    use super::*;

    #[test]
    fn test_namespace_carries_identity_and_owner() {
        let addon = AddonBuilder::new("my-addon").build();
        let ns = generate_namespace(&addon, "my-addon-ns");

        assert_eq!(ns.name_any(), "my-addon-ns");
        let labels = ns.metadata.labels.as_ref().unwrap();
        assert_eq!(
            labels.get("app.kubernetes.io/managed-by").unwrap(),
            "addon-operator"
        );
        assert_eq!(labels.get("app.kubernetes.io/instance").unwrap(), "my-addon");
        assert!(has_equal_controller_reference(
            &ns.metadata,
            &owner_reference(&addon)
        ));
    }

    #[test]
    fn test_monitoring_namespace_enables_cluster_monitoring() {
        let addon = AddonBuilder::new("my-addon").build();
        let name = monitoring_namespace_name("my-addon");
        assert_eq!(name, "redhat-monitoring-my-addon");

        let ns = generate_monitoring_namespace(&addon, &name);
        let labels = ns.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get(CLUSTER_MONITORING_LABEL).unwrap(), "true");
    }

    #[test]
    fn test_namespace_active_check() {
        let addon = AddonBuilder::new("my-addon").build();
        let mut ns = generate_namespace(&addon, "my-addon-ns");
        assert!(!is_namespace_active(&ns));

        ns.status = Some(k8s_openapi::api::core::v1::NamespaceStatus {
            phase: Some("Active".to_string()),
            ..Default::default()
        });
        assert!(is_namespace_active(&ns));
    }

    #[test]
    fn test_identity_selector_matches_labels() {
        let labels = identity_labels("my-addon");
        let selector = identity_selector("my-addon");
        for (key, value) in &labels {
            assert!(selector.contains(&format!("{}={}", key, value)));
        }
    }
}

mod addon_instance_tests {
    use super::*;
    use addon_operator::crd::DEFAULT_HEARTBEAT_PERIOD_SECONDS;

    #[test]
    fn test_addon_instance_defaults() {
        let addon = AddonBuilder::new("my-addon").build();
        let instance = addon_instance::generate_addon_instance(&addon, "my-addon-ns");

        assert_eq!(instance.name_any(), "addon-instance");
        assert_eq!(instance.namespace().unwrap(), "my-addon-ns");
        assert_eq!(
            instance.spec.heartbeat_update_period_seconds,
            DEFAULT_HEARTBEAT_PERIOD_SECONDS
        );
    }
}

mod olm_tests {
    use super::*;

    #[test]
    fn test_operator_group_targets_own_namespace_only() {
        let addon = AddonBuilder::new("my-addon").build();
        let install = addon.valid_install_spec().unwrap();
        let group = generate_operator_group(&addon, install);

        assert_eq!(group.namespace().unwrap(), "my-addon-ns");
        assert_eq!(group.spec.target_namespaces, vec!["my-addon-ns".to_string()]);
    }

    #[test]
    fn test_operator_group_all_namespaces_has_no_targets() {
        let addon = AddonBuilder::new("my-addon")
            .with_install(Install::AllNamespaces(InstallSpec {
                namespace: "my-addon-ns".to_string(),
                catalog_source_image: "quay.io/osd-addons/reference:sha256".to_string(),
                channel: "alpha".to_string(),
                package_name: "reference-addon".to_string(),
                env: vec![],
            }))
            .build();
        let install = addon.valid_install_spec().unwrap();
        let group = generate_operator_group(&addon, install);

        assert!(group.spec.target_namespaces.is_empty());
    }

    #[test]
    fn test_catalog_source_shape() {
        let addon = AddonBuilder::new("my-addon").build();
        let install = addon.valid_install_spec().unwrap();
        let source = generate_catalog_source(&addon, install);

        assert_eq!(source.name_any(), "my-addon");
        assert_eq!(source.spec.source_type, "grpc");
        assert_eq!(source.spec.publisher.as_deref(), Some(CATALOG_SOURCE_PUBLISHER));
        assert_eq!(source.spec.image, "quay.io/osd-addons/reference:sha256");
        assert_eq!(source.spec.display_name.as_deref(), Some("my-addon"));
    }

    #[test]
    fn test_subscription_points_at_addon_catalog() {
        let addon = AddonBuilder::new("my-addon").build();
        let install = addon.valid_install_spec().unwrap();
        let subscription = generate_subscription(&addon, install);

        assert_eq!(subscription.spec.source, "my-addon");
        assert_eq!(subscription.spec.source_namespace, "my-addon-ns");
        assert_eq!(subscription.spec.name, "reference-addon");
        assert_eq!(subscription.spec.channel, "alpha");
        // Approval mode is cluster-managed; the generator must not set it
        assert_eq!(subscription.spec.install_plan_approval, None);
    }
}

mod monitoring_tests {
    use super::*;

    #[test]
    fn test_federation_service_monitor_endpoint() {
        let addon = AddonBuilder::new("my-addon")
            .with_federation("addon-prometheus")
            .build();
        let federation = addon
            .spec
            .monitoring
            .as_ref()
            .and_then(|m| m.federation.as_ref())
            .unwrap();

        let monitor = monitoring::generate_federation_service_monitor(&addon, federation);
        assert_eq!(monitor.name_any(), federated_service_monitor_name("my-addon"));
        assert_eq!(
            monitor.namespace().unwrap(),
            monitoring_namespace_name("my-addon")
        );

        let endpoint = &monitor.spec.endpoints[0];
        assert_eq!(endpoint.port.as_deref(), Some("9090"));
        assert_eq!(endpoint.path.as_deref(), Some("/federate"));
        assert_eq!(endpoint.scheme.as_deref(), Some("https"));
        assert!(endpoint.honor_labels);

        let matches = endpoint.params.get("match[]").unwrap();
        assert!(matches.contains(&"ALERTS{alertstate=\"firing\"}".to_string()));
        assert!(matches.iter().any(|m| m.contains("addon_health")));
    }

    #[test]
    fn test_federation_targets_prometheus_namespace() {
        let addon = AddonBuilder::new("my-addon")
            .with_federation("addon-prometheus")
            .build();
        let federation = addon
            .spec
            .monitoring
            .as_ref()
            .and_then(|m| m.federation.as_ref())
            .unwrap();

        let monitor = monitoring::generate_federation_service_monitor(&addon, federation);
        let selector = monitor.spec.namespace_selector.as_ref().unwrap();
        assert_eq!(selector.match_names, vec!["addon-prometheus".to_string()]);
    }
}
