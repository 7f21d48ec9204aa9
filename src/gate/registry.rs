//! Keyed table of pending approval round-trips.
//!
//! Every entry leaves the table exactly once: through [`RequestRegistry::resolve`],
//! [`RequestRegistry::cancel`] (directly or via [`RequestRegistry::settle`]),
//! or a bulk [`RequestRegistry::take_where`] / [`RequestRegistry::drain`].

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::util::lock;

struct Entry<T, M> {
    resolver: oneshot::Sender<T>,
    meta: M,
}

/// Waiting half of an opened request.
#[derive(Debug)]
pub struct PendingRequest<T> {
    id: String,
    rx: oneshot::Receiver<T>,
}

impl<T> PendingRequest<T> {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// An entry removed in bulk, still holding its resolver.
pub struct TakenRequest<T, M> {
    pub id: String,
    pub meta: M,
    resolver: oneshot::Sender<T>,
}

impl<T, M> TakenRequest<T, M> {
    /// Deliver `value` to the waiter. Returns false if it already went away.
    pub fn resolve(self, value: T) -> bool {
        self.resolver.send(value).is_ok()
    }
}

/// How a wait ended.
#[derive(Debug, PartialEq)]
pub enum Settlement<T, M> {
    Resolved(T),
    /// Cancellation fired first. Carries the metadata when this call removed
    /// the entry.
    Cancelled(Option<M>),
    /// The resolver was dropped without a value.
    Dropped,
}

pub struct RequestRegistry<T, M = ()> {
    entries: Mutex<HashMap<String, Entry<T, M>>>,
}

impl<T, M> Default for RequestRegistry<T, M> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T, M> RequestRegistry<T, M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`. An existing entry with the same id is replaced and its
    /// waiter observes [`Settlement::Dropped`].
    pub fn open(&self, id: impl Into<String>, meta: M) -> PendingRequest<T> {
        let id = id.into();
        let (resolver, rx) = oneshot::channel();
        let replaced = lock(&self.entries).insert(id.clone(), Entry { resolver, meta });
        if replaced.is_some() {
            tracing::warn!(id = %id, "replacing pending request with duplicate id");
        }
        PendingRequest { id, rx }
    }

    /// Resolve `id` with `value`. Unknown ids are a no-op returning `None`.
    pub fn resolve(&self, id: &str, value: T) -> Option<M> {
        let Some(entry) = lock(&self.entries).remove(id) else {
            tracing::warn!(id, "resolve for unknown pending request");
            return None;
        };
        if entry.resolver.send(value).is_err() {
            tracing::debug!(id, "pending request waiter already gone");
        }
        Some(entry.meta)
    }

    /// Remove `id` without a value.
    pub fn cancel(&self, id: &str) -> Option<M> {
        lock(&self.entries).remove(id).map(|entry| entry.meta)
    }

    /// Remove every entry whose metadata matches `predicate`.
    pub fn take_where(&self, mut predicate: impl FnMut(&M) -> bool) -> Vec<TakenRequest<T, M>> {
        let mut entries = lock(&self.entries);
        let ids: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| predicate(&entry.meta))
            .map(|(id, _)| id.clone())
            .collect();
        ids.into_iter()
            .filter_map(|id| {
                entries.remove(&id).map(|entry| TakenRequest {
                    id,
                    meta: entry.meta,
                    resolver: entry.resolver,
                })
            })
            .collect()
    }

    pub fn drain(&self) -> Vec<TakenRequest<T, M>> {
        self.take_where(|_| true)
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.entries).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }

    /// Wait for `request` to be resolved or for `cancel` to fire.
    pub async fn settle(
        &self,
        request: PendingRequest<T>,
        cancel: &CancellationToken,
    ) -> Settlement<T, M> {
        let PendingRequest { id, mut rx } = request;
        tokio::select! {
            biased;
            value = &mut rx => match value {
                Ok(value) => Settlement::Resolved(value),
                Err(_) => Settlement::Dropped,
            },
            _ = cancel.cancelled() => match self.cancel(&id) {
                Some(meta) => {
                    tracing::debug!(id = %id, "pending request cancelled");
                    Settlement::Cancelled(Some(meta))
                }
                // Removed concurrently; a value may already be waiting.
                None => match rx.try_recv() {
                    Ok(value) => Settlement::Resolved(value),
                    Err(_) => Settlement::Cancelled(None),
                },
            },
        }
    }
}

impl<T, M> std::fmt::Debug for RequestRegistry<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("pending", &self.ids())
            .finish()
    }
}
