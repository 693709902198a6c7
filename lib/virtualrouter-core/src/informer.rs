//! Informer adapter over the kube watcher
//!
//! Turns the raw watcher event stream into add/update/delete notifications
//! carrying old and new snapshots, while keeping the reflector store that
//! serves as the local read cache up to date.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use kube::Resource;
use kube_runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube_runtime::watcher;
use tracing::debug;

/// Object removed from the cache
#[derive(Debug, Clone)]
pub enum DeletedObject<K> {
    /// Observed delete, carrying the final state
    Known(Arc<K>),
    /// Missed delete, noticed when a relist no longer contained the object.
    /// Carries the last state the cache held.
    FinalStateUnknown { key: String, obj: Arc<K> },
}

impl<K> DeletedObject<K> {
    /// The deleted object, recovered from the tombstone if needed
    pub fn object(&self) -> &Arc<K> {
        match self {
            DeletedObject::Known(obj) => obj,
            DeletedObject::FinalStateUnknown { obj, .. } => obj,
        }
    }
}

/// Change notification for one object
#[derive(Debug, Clone)]
pub enum Notification<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    Deleted(DeletedObject<K>),
}

/// Feeds watcher events into a reflector store and derives notifications
pub struct Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    writer: Writer<K>,
    reader: Store<K>,
    relisted: Option<HashSet<ObjectRef<K>>>,
}

impl<K> Informer<K>
where
    K: Resource + Clone + Debug + 'static,
    K::DynamicType: Eq + Hash + Clone + Default,
{
    /// Create an informer and the store it keeps in sync
    pub fn new() -> (Self, Store<K>) {
        let (reader, writer) = reflector::store();
        let informer = Self {
            writer,
            reader: reader.clone(),
            relisted: None,
        };
        (informer, reader)
    }

    /// Apply one watcher event to the cache and return the resulting
    /// notifications
    pub fn apply(&mut self, event: watcher::Event<K>) -> Vec<Notification<K>> {
        let notifications = match &event {
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                let obj_ref = ObjectRef::from_obj(obj);
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(obj_ref.clone());
                }
                vec![self.upsert(&obj_ref, obj)]
            }
            watcher::Event::InitDone => {
                let seen = self.relisted.take().unwrap_or_default();
                self.reader
                    .state()
                    .into_iter()
                    .filter(|obj| !seen.contains(&ObjectRef::from_obj(obj.as_ref())))
                    .map(|obj| {
                        let key = cache_key(obj.as_ref());
                        debug!(%key, "Object vanished across relist");
                        Notification::Deleted(DeletedObject::FinalStateUnknown { key, obj })
                    })
                    .collect()
            }
            watcher::Event::Apply(obj) => {
                let obj_ref = ObjectRef::from_obj(obj);
                vec![self.upsert(&obj_ref, obj)]
            }
            watcher::Event::Delete(obj) => {
                vec![Notification::Deleted(DeletedObject::Known(Arc::new(
                    obj.clone(),
                )))]
            }
        };
        self.writer.apply_watcher_event(&event);
        notifications
    }

    fn upsert(&self, obj_ref: &ObjectRef<K>, obj: &K) -> Notification<K> {
        let new = Arc::new(obj.clone());
        match self.reader.get(obj_ref) {
            Some(old) => Notification::Updated { old, new },
            None => Notification::Added(new),
        }
    }
}

fn cache_key<K: Resource>(obj: &K) -> String {
    let meta = obj.meta();
    let name = meta.name.as_deref().unwrap_or_default();
    match meta.namespace.as_deref() {
        Some(namespace) => format!("{}/{}", namespace, name),
        None => name.to_string(),
    }
}
