//! Process-wide state shared between the Addon and AddonOperator
//! controllers, scoped into one value instead of package-level globals.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;

use crate::controller::csv_events::CsvEventTable;
use crate::ocm::OcmClient;

/// Shared controller runtime.
///
/// The pause flag and the OCM handle are written only by the AddonOperator
/// reconciler; Addon reconcilers take read locks for the duration of one
/// pipeline execution.
pub struct Runtime {
    paused: RwLock<bool>,
    ocm: RwLock<Option<Arc<dyn OcmClient>>>,
    pub csv_events: CsvEventTable,
    requeue_all: UnboundedSender<()>,
}

impl Runtime {
    /// Create the runtime plus the stream of requeue-all triggers consumed
    /// by the Addon controller wiring.
    pub fn new() -> (Arc<Self>, UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(Self {
            paused: RwLock::new(false),
            ocm: RwLock::new(None),
            csv_events: CsvEventTable::new(),
            requeue_all: tx,
        });
        (runtime, rx)
    }

    pub async fn is_paused(&self) -> bool {
        *self.paused.read().await
    }

    /// Read lock held for the duration of one pipeline execution, so pause
    /// flips never interleave with a running reconcile.
    pub async fn pause_guard(&self) -> tokio::sync::RwLockReadGuard<'_, bool> {
        self.paused.read().await
    }

    /// Flip the global pause flag. Returns whether the value changed; every
    /// change re-enqueues all Addons.
    pub async fn set_paused(&self, paused: bool) -> bool {
        let mut current = self.paused.write().await;
        if *current == paused {
            return false;
        }
        *current = paused;
        drop(current);
        self.trigger_requeue_all();
        true
    }

    pub async fn ocm_client(&self) -> Option<Arc<dyn OcmClient>> {
        self.ocm.read().await.clone()
    }

    pub async fn has_ocm_client(&self) -> bool {
        self.ocm.read().await.is_some()
    }

    /// Inject the OCM client and re-enqueue all Addons so pending
    /// upgrade-policy reports are delivered.
    pub async fn inject_ocm_client(&self, client: Arc<dyn OcmClient>) {
        *self.ocm.write().await = Some(client);
        self.trigger_requeue_all();
    }

    fn trigger_requeue_all(&self) {
        // Receiver lives as long as the Addon controller; a send error just
        // means shutdown is in progress
        let _ = self.requeue_all.send(());
    }
}
