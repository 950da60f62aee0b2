//! Test fixtures and builders for Addon resources

use kube::core::ObjectMeta;
use std::collections::BTreeMap;

use addon_operator::crd::{
    Addon, AddonNamespace, AddonSpec, AddonUpgradePolicy, Install, InstallSpec,
    MonitoringFederationSpec, MonitoringSpec, ResourceAdoptionStrategy,
};

/// Builder for Addon test fixtures
pub struct AddonBuilder {
    name: String,
    namespaces: Vec<String>,
    install: Install,
    monitoring: Option<MonitoringSpec>,
    upgrade_policy: Option<AddonUpgradePolicy>,
    paused: bool,
    adoption_strategy: ResourceAdoptionStrategy,
}

impl AddonBuilder {
    /// Create a builder with an OwnNamespace install into `<name>-ns`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespaces: vec![format!("{}-ns", name)],
            install: Install::OwnNamespace(InstallSpec {
                namespace: format!("{}-ns", name),
                catalog_source_image: "quay.io/osd-addons/reference:sha256".to_string(),
                channel: "alpha".to_string(),
                package_name: "reference-addon".to_string(),
                env: vec![],
            }),
            monitoring: None,
            upgrade_policy: None,
            paused: false,
            adoption_strategy: ResourceAdoptionStrategy::Prevent,
        }
    }

    pub fn with_namespaces(mut self, namespaces: &[&str]) -> Self {
        self.namespaces = namespaces.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_install(mut self, install: Install) -> Self {
        self.install = install;
        self
    }

    pub fn with_federation(mut self, prometheus_namespace: &str) -> Self {
        self.monitoring = Some(MonitoringSpec {
            federation: Some(MonitoringFederationSpec {
                namespace: prometheus_namespace.to_string(),
                match_labels: BTreeMap::from([(
                    "app".to_string(),
                    "prometheus".to_string(),
                )]),
                match_names: vec!["addon_health".to_string()],
            }),
        });
        self
    }

    pub fn with_upgrade_policy(mut self, id: &str) -> Self {
        self.upgrade_policy = Some(AddonUpgradePolicy { id: id.to_string() });
        self
    }

    pub fn paused(mut self) -> Self {
        self.paused = true;
        self
    }

    pub fn adopt_all(mut self) -> Self {
        self.adoption_strategy = ResourceAdoptionStrategy::AdoptAll;
        self
    }

    pub fn build(self) -> Addon {
        Addon {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                uid: Some(format!("uid-{}", self.name)),
                generation: Some(1),
                ..Default::default()
            },
            spec: AddonSpec {
                display_name: self.name,
                namespaces: self
                    .namespaces
                    .into_iter()
                    .map(|name| AddonNamespace { name })
                    .collect(),
                install: self.install,
                monitoring: self.monitoring,
                upgrade_policy: self.upgrade_policy,
                paused: self.paused,
                resource_adoption_strategy: self.adoption_strategy,
            },
            status: None,
        }
    }
}
