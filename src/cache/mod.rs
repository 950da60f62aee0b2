//! Lazy per-GVK watch cache for the ObjectSet controllers.
//!
//! Watches are started on first use for each group/version/kind and torn
//! down again when no owner needs them anymore. Cached objects are filtered
//! to those carrying the cache label, so unrelated cluster objects never
//! enter memory.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock as StdRwLock};

use futures::StreamExt;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::controller::error::Result;
use crate::crd::CACHE_LABEL;

/// Cache key identifying one watched kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GvkKey {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl From<&GroupVersionKind> for GvkKey {
    fn from(gvk: &GroupVersionKind) -> Self {
        Self {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
        }
    }
}

type Store = Arc<StdRwLock<HashMap<(String, String), DynamicObject>>>;

struct WatchEntry {
    store: Store,
    owners: HashSet<String>,
    handle: JoinHandle<()>,
}

/// Shared dynamic object cache. One watcher task per kind, started lazily.
pub struct DynamicCache {
    client: Client,
    events: UnboundedSender<()>,
    watches: RwLock<HashMap<GvkKey, WatchEntry>>,
}

impl DynamicCache {
    /// Every cache update is signalled through `events` so the consuming
    /// controller can re-enqueue its resources.
    pub fn new(client: Client, events: UnboundedSender<()>) -> Self {
        Self {
            client,
            events,
            watches: RwLock::new(HashMap::new()),
        }
    }

    /// Register `owner` as interested in the given kind, starting a watcher
    /// when this is the first interest in it.
    pub async fn watch(&self, owner: &str, gvk: &GroupVersionKind) -> Result<()> {
        let key = GvkKey::from(gvk);
        let mut watches = self.watches.write().await;

        if let Some(entry) = watches.get_mut(&key) {
            entry.owners.insert(owner.to_string());
            return Ok(());
        }

        let store: Store = Arc::new(StdRwLock::new(HashMap::new()));
        let handle = spawn_watcher(
            self.client.clone(),
            ApiResource::from_gvk(gvk),
            store.clone(),
            self.events.clone(),
        );

        info!(group = %gvk.group, version = %gvk.version, kind = %gvk.kind, "Started dynamic watch");
        watches.insert(
            key,
            WatchEntry {
                store,
                owners: HashSet::from([owner.to_string()]),
                handle,
            },
        );
        Ok(())
    }

    /// Drop all watch interests held by `owner`, stopping watchers that no
    /// other owner needs.
    pub async fn free(&self, owner: &str) {
        let mut watches = self.watches.write().await;
        watches.retain(|key, entry| {
            entry.owners.remove(owner);
            if entry.owners.is_empty() {
                entry.handle.abort();
                debug!(kind = %key.kind, group = %key.group, "Stopped dynamic watch");
                false
            } else {
                true
            }
        });
    }

    /// Fetch an object, preferring the local store over the API. Objects of
    /// kinds without an active watch fall back to a direct read.
    pub async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let key = GvkKey::from(gvk);

        {
            let watches = self.watches.read().await;
            if let Some(entry) = watches.get(&key) {
                let store = entry
                    .store
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if let Some(obj) = store.get(&(namespace.to_string(), name.to_string())) {
                    return Ok(Some(obj.clone()));
                }
                // A running watch that has not seen the object yet still
                // needs the API read: the informer may lag a just-created
                // object
            }
        }

        let resource = ApiResource::from_gvk(gvk);
        let api: Api<DynamicObject> = if namespace.is_empty() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        };
        Ok(api.get_opt(name).await?)
    }

    #[cfg(test)]
    pub async fn watched_kinds(&self) -> Vec<GvkKey> {
        self.watches.read().await.keys().cloned().collect()
    }
}

fn store_key(obj: &DynamicObject) -> (String, String) {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

fn spawn_watcher(
    client: Client,
    resource: ApiResource,
    store: Store,
    events: UnboundedSender<()>,
) -> JoinHandle<()> {
    let config = watcher::Config::default()
        .labels(CACHE_LABEL)
        .any_semantic();
    let api: Api<DynamicObject> = Api::all_with(client, &resource);

    tokio::spawn(async move {
        let mut stream = std::pin::pin!(watcher(api, config));
        let mut pending_init: HashMap<(String, String), DynamicObject> = HashMap::new();

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Init) => {
                    pending_init.clear();
                }
                Ok(watcher::Event::InitApply(obj)) => {
                    pending_init.insert(store_key(&obj), obj);
                }
                Ok(watcher::Event::InitDone) => {
                    let mut guard = store.write().unwrap_or_else(|p| p.into_inner());
                    *guard = std::mem::take(&mut pending_init);
                    drop(guard);
                    let _ = events.send(());
                }
                Ok(watcher::Event::Apply(obj)) => {
                    let mut guard = store.write().unwrap_or_else(|p| p.into_inner());
                    guard.insert(store_key(&obj), obj);
                    drop(guard);
                    let _ = events.send(());
                }
                Ok(watcher::Event::Delete(obj)) => {
                    let mut guard = store.write().unwrap_or_else(|p| p.into_inner());
                    guard.remove(&store_key(&obj));
                    drop(guard);
                    let _ = events.send(());
                }
                Err(error) => {
                    warn!(kind = %resource.kind, error = %error, "Dynamic watch error, retrying");
                }
            }
        }
    })
}
