use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    hash::Hash,
    sync::{Arc, Mutex},
};

use k8s_openapi::api::core::v1::{Namespace, Secret, Service};
use kube::Resource;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::common::{
    gateway_api::{
        backends::KubeBackend, gateways::Gateway, grpcroutes::GRPCRoute, httproutes::HTTPRoute, inferencepools::InferencePool, listenersets::XListenerSet,
        referencegrants::ReferenceGrant, tcproutes::TCPRoute, tlsroutes::TLSRoute,
    },
    ResourceKey,
};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("state lock is poisoned")]
    LockingError,
}

pub type Revision = u64;

#[derive(Debug)]
struct Versioned<T> {
    revision: Revision,
    item: Arc<T>,
}

impl<T> Clone for Versioned<T> {
    fn clone(&self) -> Self {
        Self {
            revision: self.revision,
            item: Arc::clone(&self.item),
        }
    }
}

/// Copy-on-write map of objects with a revision per item and one for the whole collection.
#[derive(Debug)]
pub struct Collection<T> {
    items: Arc<BTreeMap<ResourceKey, Versioned<T>>>,
    revision: Revision,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            revision: self.revision,
        }
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(BTreeMap::new()),
            revision: 0,
        }
    }
}

impl<T> Collection<T> {
    pub fn get(&self, key: &ResourceKey) -> Option<&Arc<T>> {
        self.items.get(key).map(|v| &v.item)
    }

    pub fn fetch(&self) -> impl Iterator<Item = (&ResourceKey, &Arc<T>)> {
        self.items.iter().map(|(k, v)| (k, &v.item))
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn item_revision(&self, key: &ResourceKey) -> Option<Revision> {
        self.items.get(key).map(|v| v.revision)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: PartialEq> Collection<T> {
    fn upsert(&mut self, key: ResourceKey, item: T, revision: Revision) -> bool {
        if self.items.get(&key).is_some_and(|v| *v.item == item) {
            return false;
        }
        Arc::make_mut(&mut self.items).insert(key, Versioned { revision, item: Arc::new(item) });
        self.revision = revision;
        true
    }

    fn remove(&mut self, key: &ResourceKey, revision: Revision) -> bool {
        if !self.items.contains_key(key) {
            return false;
        }
        Arc::make_mut(&mut self.items).remove(key);
        self.revision = revision;
        true
    }

    fn replace_all(&mut self, items: Vec<(ResourceKey, T)>, revision: Revision) -> bool {
        let mut changed = false;
        let incoming: BTreeMap<ResourceKey, T> = items.into_iter().collect();
        let stale: Vec<ResourceKey> = self.items.keys().filter(|k| !incoming.contains_key(*k)).cloned().collect();
        for key in stale {
            changed |= self.remove(&key, revision);
        }
        for (key, item) in incoming {
            changed |= self.upsert(key, item, revision);
        }
        changed
    }
}

/// Immutable view over every collection the translator reads.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub gateways: Collection<Gateway>,
    pub listener_sets: Collection<XListenerSet>,
    pub http_routes: Collection<HTTPRoute>,
    pub grpc_routes: Collection<GRPCRoute>,
    pub tcp_routes: Collection<TCPRoute>,
    pub tls_routes: Collection<TLSRoute>,
    pub reference_grants: Collection<ReferenceGrant>,
    pub services: Collection<Service>,
    pub secrets: Collection<Secret>,
    pub namespaces: Collection<Namespace>,
    pub inference_pools: Collection<InferencePool>,
    pub backends: Collection<KubeBackend>,
    revision: Revision,
    unsynced: BTreeSet<String>,
}

impl Snapshot {
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// True once every tracked kind has completed its initial list.
    pub fn has_synced(&self) -> bool {
        self.unsynced.is_empty()
    }
}

/// Object types that live in a [`Snapshot`] collection.
pub trait Stored: Resource<DynamicType = ()> + Clone + PartialEq + Send + Sync + 'static {
    fn collection(snapshot: &mut Snapshot) -> &mut Collection<Self>;
}

macro_rules! stored {
    ($($kind:ty => $field:ident),* $(,)?) => {
        $(
            impl Stored for $kind {
                fn collection(snapshot: &mut Snapshot) -> &mut Collection<Self> {
                    &mut snapshot.$field
                }
            }
        )*
    };
}

stored! {
    Gateway => gateways,
    XListenerSet => listener_sets,
    HTTPRoute => http_routes,
    GRPCRoute => grpc_routes,
    TCPRoute => tcp_routes,
    TLSRoute => tls_routes,
    ReferenceGrant => reference_grants,
    Service => services,
    Secret => secrets,
    Namespace => namespaces,
    InferencePool => inference_pools,
    KubeBackend => backends,
}

/// Shared store fed by the watchers.
///
/// Writers bump the global revision only when something actually changed and then notify subscribers.
#[derive(Clone)]
pub struct State {
    snapshot: Arc<Mutex<Snapshot>>,
    notifier: Arc<watch::Sender<Revision>>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        let (notifier, _) = watch::channel(0);
        Self {
            snapshot: Arc::new(Mutex::new(Snapshot::default())),
            notifier: Arc::new(notifier),
        }
    }

    pub fn snapshot(&self) -> Result<Snapshot, StorageError> {
        let lock = self.snapshot.lock().map_err(|_| StorageError::LockingError)?;
        Ok(lock.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<Revision> {
        self.notifier.subscribe()
    }

    pub fn apply<K: Stored>(&self, object: K) -> Result<bool, StorageError> {
        let key = ResourceKey::from_resource(&object);
        self.update(|snapshot, revision| K::collection(snapshot).upsert(key, object, revision))
    }

    pub fn delete<K: Stored>(&self, key: &ResourceKey) -> Result<bool, StorageError> {
        self.update(|snapshot, revision| K::collection(snapshot).remove(key, revision))
    }

    /// Holds back [`Snapshot::has_synced`] until [`State::mark_synced`] is called for this kind.
    pub fn track<K: Stored>(&self) -> Result<(), StorageError> {
        let mut lock = self.snapshot.lock().map_err(|_| StorageError::LockingError)?;
        lock.unsynced.insert(K::kind(&()).into_owned());
        Ok(())
    }

    /// Records that the initial list of this kind is complete and wakes subscribers if that made a difference.
    pub fn mark_synced<K: Stored>(&self) -> Result<bool, StorageError> {
        let kind = K::kind(&());
        let revision = {
            let mut lock = self.snapshot.lock().map_err(|_| StorageError::LockingError)?;
            if !lock.unsynced.remove(kind.as_ref()) {
                return Ok(false);
            }
            debug!("{kind} synced, {} kinds still listing", lock.unsynced.len());
            lock.revision
        };
        self.notifier.send_replace(revision);
        Ok(true)
    }

    /// Replaces a whole collection after a full relist.
    pub fn replace<K: Stored>(&self, objects: Vec<K>) -> Result<bool, StorageError> {
        let items = objects.into_iter().map(|o| (ResourceKey::from_resource(&o), o)).collect();
        self.update(|snapshot, revision| K::collection(snapshot).replace_all(items, revision))
    }

    fn update<F>(&self, f: F) -> Result<bool, StorageError>
    where
        F: FnOnce(&mut Snapshot, Revision) -> bool,
    {
        let revision = {
            let mut lock = self.snapshot.lock().map_err(|_| StorageError::LockingError)?;
            let next = lock.revision + 1;
            if !f(&mut lock, next) {
                return Ok(false);
            }
            lock.revision = next;
            next
        };
        debug!("State revision {revision}");
        self.notifier.send_replace(revision);
        Ok(true)
    }
}

/// Version of everything a derived value was computed from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputVersion(Vec<Revision>);

impl InputVersion {
    pub fn new(revisions: impl IntoIterator<Item = Revision>) -> Self {
        Self(revisions.into_iter().collect())
    }
}

/// Memoized outputs keyed by input identity and version.
pub struct Derived<K, V> {
    cache: Mutex<HashMap<K, (InputVersion, V)>>,
}

impl<K, V> Default for Derived<K, V> {
    fn default() -> Self {
        Self { cache: Mutex::new(HashMap::new()) }
    }
}

impl<K, V> Derived<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn get_or_compute<F>(&self, key: &K, version: &InputVersion, compute: F) -> Result<V, StorageError>
    where
        F: FnOnce() -> V,
    {
        {
            let lock = self.cache.lock().map_err(|_| StorageError::LockingError)?;
            if let Some((cached_version, value)) = lock.get(key) {
                if cached_version == version {
                    return Ok(value.clone());
                }
            }
        }
        let value = compute();
        let mut lock = self.cache.lock().map_err(|_| StorageError::LockingError)?;
        lock.insert(key.clone(), (version.clone(), value.clone()));
        Ok(value)
    }

    /// Drops entries whose inputs disappeared.
    pub fn retain<F>(&self, keep: F) -> Result<(), StorageError>
    where
        F: Fn(&K) -> bool,
    {
        let mut lock = self.cache.lock().map_err(|_| StorageError::LockingError)?;
        lock.retain(|k, _| keep(k));
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.cache.lock().map_err(|_| StorageError::LockingError)?.len())
    }
}
