//! Unit tests for status reporting and install validation

use addon_operator::controller::status::{reasons, StatusReporter};
use addon_operator::crd::{find_condition, is_condition_true, AddonPhase, Install, InstallSpec};

use crate::builders::AddonBuilder;

fn install(namespace: &str, image: &str) -> Install {
    Install::OwnNamespace(InstallSpec {
        namespace: namespace.to_string(),
        catalog_source_image: image.to_string(),
        channel: "alpha".to_string(),
        package_name: "reference-addon".to_string(),
        env: vec![],
    })
}

#[test]
fn test_install_with_empty_namespace_is_invalid() {
    let addon = AddonBuilder::new("my-addon")
        .with_install(install("", "quay.io/osd-addons/reference:sha"))
        .build();
    assert!(addon.valid_install_spec().is_none());
}

#[test]
fn test_install_with_empty_catalog_image_is_invalid() {
    let addon = AddonBuilder::new("my-addon")
        .with_install(install("addon-ns", ""))
        .build();
    assert!(addon.valid_install_spec().is_none());
}

#[test]
fn test_complete_install_is_valid() {
    let addon = AddonBuilder::new("my-addon").build();
    let spec = addon.valid_install_spec().unwrap();
    assert_eq!(spec.package_name, "reference-addon");
}

#[test]
fn test_configuration_error_blocks_availability() {
    let addon = AddonBuilder::new("my-addon").build();
    let mut reporter = StatusReporter::new(&addon);
    reporter.report_configuration_error("install.namespace is empty");

    let status = reporter.into_status();
    let condition = find_condition(&status.conditions, "Available").unwrap();
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason, reasons::CONFIGURATION_ERROR);
    assert_eq!(status.phase, Some(AddonPhase::Error));
}

#[test]
fn test_pipeline_reason_progression() {
    let addon = AddonBuilder::new("my-addon").build();
    let mut reporter = StatusReporter::new(&addon);

    reporter.report_unready_catalog_source("catalog connection is not READY");
    let condition = find_condition(reporter.status().conditions.as_slice(), "Available").unwrap();
    assert_eq!(condition.reason, reasons::UNREADY_CATALOG_SOURCE);

    reporter.report_unready_csv("CSV phase is Pending");
    let condition = find_condition(reporter.status().conditions.as_slice(), "Available").unwrap();
    assert_eq!(condition.reason, reasons::UNREADY_CSV);

    reporter.report_available();
    assert!(is_condition_true(
        reporter.status().conditions.as_slice(),
        "Available"
    ));
    assert_eq!(reporter.status().phase, Some(AddonPhase::Ready));
}

#[test]
fn test_terminating_overrides_available() {
    let addon = AddonBuilder::new("my-addon").build();
    let mut reporter = StatusReporter::new(&addon);
    reporter.report_available();
    reporter.report_terminating();

    let status = reporter.into_status();
    let condition = find_condition(&status.conditions, "Available").unwrap();
    assert_eq!(condition.reason, reasons::TERMINATING);
    assert_eq!(status.phase, Some(AddonPhase::Terminating));
}

#[test]
fn test_pause_reasons_distinguish_scopes() {
    let addon = AddonBuilder::new("my-addon").build();

    let mut reporter = StatusReporter::new(&addon);
    reporter.report_paused(reasons::ADDON_PAUSED, "Reconciliation paused for this addon.");
    let condition = find_condition(reporter.status().conditions.as_slice(), "Paused").unwrap();
    assert_eq!(condition.reason, reasons::ADDON_PAUSED);

    let mut reporter = StatusReporter::new(&addon);
    reporter.report_paused(
        reasons::ADDON_OPERATOR_PAUSED,
        "Reconciliation paused for the whole cluster.",
    );
    let condition = find_condition(reporter.status().conditions.as_slice(), "Paused").unwrap();
    assert_eq!(condition.reason, reasons::ADDON_OPERATOR_PAUSED);
}

#[test]
fn test_observed_generation_tracks_metadata() {
    let mut addon = AddonBuilder::new("my-addon").build();
    addon.metadata.generation = Some(5);

    let reporter = StatusReporter::new(&addon);
    assert_eq!(reporter.status().observed_generation, Some(5));
}
