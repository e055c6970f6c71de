// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-flight execution deduplication.
//!
//! Concurrent calls with the same `(namespace, key)` observe a single
//! execution and its outcome. The entry is dropped as soon as the execution
//! finishes, successfully or not, so the registry never serves stale results:
//! it is a concurrency guard, not a cache.
//!
//! Executions run on their own task and complete even when every caller has
//! gone away. Deduplication is per process.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

/// Failure observed by every caller of a deduplicated execution.
#[derive(Debug)]
pub enum InFlightError<E> {
    /// The runner returned an error. All callers share the same instance.
    Failed(Arc<E>),
    /// The execution task panicked or was cancelled by the runtime.
    Aborted(String),
}

impl<E> Clone for InFlightError<E> {
    fn clone(&self) -> Self {
        match self {
            InFlightError::Failed(err) => InFlightError::Failed(Arc::clone(err)),
            InFlightError::Aborted(msg) => InFlightError::Aborted(msg.clone()),
        }
    }
}

impl<E: fmt::Display> fmt::Display for InFlightError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InFlightError::Failed(err) => err.fmt(f),
            InFlightError::Aborted(msg) => write!(f, "in-flight execution aborted: {msg}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for InFlightError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InFlightError::Failed(err) => err.source(),
            InFlightError::Aborted(_) => None,
        }
    }
}

type SharedExecution<T, E> = Shared<BoxFuture<'static, Result<T, InFlightError<E>>>>;

struct InFlightEntry<T, E> {
    id: u64,
    execution: SharedExecution<T, E>,
}

type EntryMap<T, E> = DashMap<String, InFlightEntry<T, E>>;

/// Removes the registry entry when the execution task ends, including on panic.
struct RemoveOnDrop<T, E> {
    entries: Arc<EntryMap<T, E>>,
    key: String,
    id: u64,
}

impl<T, E> Drop for RemoveOnDrop<T, E> {
    fn drop(&mut self) {
        // Only our own generation; a newer execution may already own the key.
        self.entries.remove_if(&self.key, |_, entry| entry.id == self.id);
    }
}

/// Registry of in-progress executions keyed by `"{namespace}|{key}"`.
///
/// Owned explicitly and shared via `Arc`; there is no global instance.
pub struct InFlightRegistry<T, E> {
    entries: Arc<EntryMap<T, E>>,
    next_id: AtomicU64,
}

impl<T, E> InFlightRegistry<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of executions currently in flight.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an execution for `(namespace, key)` is in flight.
    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        self.entries.contains_key(&composite_key(namespace, key))
    }

    /// Join the in-flight execution for `(namespace, key)`, or start one.
    ///
    /// `runner` is only invoked when no execution is in flight for the key.
    pub async fn run<F, Fut>(
        &self,
        namespace: &str,
        key: &str,
        runner: F,
    ) -> Result<T, InFlightError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let composite = composite_key(namespace, key);
        let execution = match self.entries.entry(composite.clone()) {
            Entry::Occupied(entry) => {
                debug!(key = %composite, "joining in-flight execution");
                entry.get().execution.clone()
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let execution = self.spawn_execution(composite, id, runner());
                slot.insert(InFlightEntry {
                    id,
                    execution: execution.clone(),
                });
                execution
            }
        };
        execution.await
    }

    fn spawn_execution<Fut>(&self, key: String, id: u64, fut: Fut) -> SharedExecution<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        debug!(key = %key, id, "starting in-flight execution");
        let guard = RemoveOnDrop {
            entries: Arc::clone(&self.entries),
            key,
            id,
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            fut.await.map_err(|err| InFlightError::Failed(Arc::new(err)))
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(InFlightError::Aborted(join_err.to_string())),
            }
        }
        .boxed()
        .shared()
    }
}

impl<T, E> Default for InFlightRegistry<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for InFlightRegistry<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightRegistry")
            .field("in_flight", &self.entries.len())
            .finish()
    }
}

fn composite_key(namespace: &str, key: &str) -> String {
    format!("{namespace}|{key}")
}
