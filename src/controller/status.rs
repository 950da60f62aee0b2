//! Status and condition reporting for Addon resources
//!
//! Phases stamp conditions on an in-memory working copy of the status; the
//! reconciler commits it exactly once per invocation via the status
//! subresource, relying on `resourceVersion` for optimistic locking.

use kube::api::{Api, PostParams};
use kube::ResourceExt;

use crate::controller::error::Result;
use crate::controller::Context;
use crate::crd::{condition_status, set_condition, Addon, AddonPhase, AddonStatus};

/// Condition types reported on Addons
pub mod condition_types {
    pub const AVAILABLE: &str = "Available";
    pub const PAUSED: &str = "Paused";
}

/// Condition reasons reported on Addons
pub mod reasons {
    pub const FULLY_RECONCILED: &str = "FullyReconciled";
    pub const TERMINATING: &str = "Terminating";
    pub const CONFIGURATION_ERROR: &str = "ConfigurationError";
    pub const ADDON_PAUSED: &str = "AddonPaused";
    pub const ADDON_OPERATOR_PAUSED: &str = "AddonOperatorPaused";
    pub const UNREADY_CATALOG_SOURCE: &str = "UnreadyCatalogSource";
    pub const COLLIDED_NAMESPACES: &str = "CollidedNamespaces";
    pub const UNREADY_NAMESPACES: &str = "UnreadyNamespaces";
    pub const UNREADY_CSV: &str = "UnreadyCSV";
    pub const UNREADY_MONITORING: &str = "UnreadyMonitoring";
}

/// Working copy of an Addon's status for one pipeline execution.
pub struct StatusReporter {
    generation: Option<i64>,
    status: AddonStatus,
}

impl StatusReporter {
    pub fn new(addon: &Addon) -> Self {
        let mut status = addon.status.clone().unwrap_or_default();
        status.observed_generation = addon.metadata.generation;
        Self {
            generation: addon.metadata.generation,
            status,
        }
    }

    pub fn status(&self) -> &AddonStatus {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut AddonStatus {
        &mut self.status
    }

    pub fn into_status(self) -> AddonStatus {
        self.status
    }

    fn set_available(&mut self, value: &str, reason: &str, message: &str) {
        set_condition(
            &mut self.status.conditions,
            self.generation,
            condition_types::AVAILABLE,
            value,
            reason,
            message,
        );
    }

    pub fn report_available(&mut self) {
        self.set_available(
            condition_status::TRUE,
            reasons::FULLY_RECONCILED,
            "Addon has been successfully installed.",
        );
        self.status.phase = Some(AddonPhase::Ready);
    }

    pub fn report_terminating(&mut self) {
        self.set_available(
            condition_status::FALSE,
            reasons::TERMINATING,
            "Addon is being deleted.",
        );
        self.status.phase = Some(AddonPhase::Terminating);
    }

    pub fn report_configuration_error(&mut self, message: &str) {
        self.set_available(condition_status::FALSE, reasons::CONFIGURATION_ERROR, message);
        self.status.phase = Some(AddonPhase::Error);
    }

    pub fn report_collided_namespaces(&mut self, message: &str) {
        self.set_available(condition_status::FALSE, reasons::COLLIDED_NAMESPACES, message);
        self.status.phase = Some(AddonPhase::Pending);
    }

    pub fn report_unready_namespaces(&mut self, unready: &[String]) {
        self.set_available(
            condition_status::FALSE,
            reasons::UNREADY_NAMESPACES,
            &format!("Namespaces not yet in Active phase: {}", unready.join(", ")),
        );
        self.status.phase = Some(AddonPhase::Pending);
    }

    pub fn report_unready_catalog_source(&mut self, message: &str) {
        self.set_available(
            condition_status::FALSE,
            reasons::UNREADY_CATALOG_SOURCE,
            message,
        );
        self.status.phase = Some(AddonPhase::Pending);
    }

    pub fn report_unready_csv(&mut self, message: &str) {
        self.set_available(condition_status::FALSE, reasons::UNREADY_CSV, message);
        self.status.phase = Some(AddonPhase::Pending);
    }

    pub fn report_unready_monitoring(&mut self, message: &str) {
        self.set_available(condition_status::FALSE, reasons::UNREADY_MONITORING, message);
        self.status.phase = Some(AddonPhase::Pending);
    }

    /// Pending while the Subscription has not yet surfaced its CSVs
    pub fn report_pending_subscription(&mut self) {
        self.set_available(
            condition_status::FALSE,
            reasons::UNREADY_CSV,
            "Subscription has not yet resolved an installed CSV.",
        );
        self.status.phase = Some(AddonPhase::Pending);
    }

    pub fn report_paused(&mut self, reason: &str, message: &str) {
        set_condition(
            &mut self.status.conditions,
            self.generation,
            condition_types::PAUSED,
            condition_status::TRUE,
            reason,
            message,
        );
    }

    pub fn clear_paused(&mut self) {
        crate::crd::remove_condition(&mut self.status.conditions, condition_types::PAUSED);
    }
}

/// Commit the working status. Skipped when nothing changed so a quiescent
/// reconcile performs no API writes.
pub async fn commit_status(ctx: &Context, addon: &Addon, status: AddonStatus) -> Result<()> {
    if addon.status.as_ref() == Some(&status) {
        return Ok(());
    }

    let api: Api<Addon> = Api::all(ctx.client.clone());
    let mut updated = addon.clone();
    updated.status = Some(status);

    api.replace_status(
        &addon.name_any(),
        &PostParams::default(),
        serde_json::to_vec(&updated)?,
    )
    .await?;

    Ok(())
}
