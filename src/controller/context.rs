use std::sync::Arc;

use kube::Client;

use crate::controller::runtime::Runtime;
use crate::health::HealthState;

/// Shared context for the Addon-side controllers
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Process-wide shared state (pause flag, OCM handle, CSV remap table)
    pub runtime: Arc<Runtime>,
    /// Health/metrics state, absent in some test setups
    pub health: Option<Arc<HealthState>>,
}

impl Context {
    pub fn new(client: Client, runtime: Arc<Runtime>, health: Option<Arc<HealthState>>) -> Self {
        Self {
            client,
            runtime,
            health,
        }
    }
}
