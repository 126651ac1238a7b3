//! Resource tracking
//!
//! A composable disposer list. Every feature (and the feature manager itself)
//! owns one `ResourceTracker`; timers, listeners and arbitrary release
//! callbacks registered through it are released together on `cleanup()`, in
//! reverse registration order. Dropping the tracker releases whatever is left.
//! Tasks that finish on their own (a fired timeout, a listener whose channel
//! closed) drop their entry when they finish.
//!
//! Timer and listener helpers spawn tokio tasks and must be called from within
//! a runtime.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

type Disposer = Box<dyn FnOnce() + Send + 'static>;

struct TrackedResource {
    label: String,
    release: Disposer,
}

/// Live entries keyed by registration id. Ids only grow, so key order is
/// registration order.
#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: BTreeMap<u64, TrackedResource>,
    released: bool,
}

impl Registry {
    fn insert(&mut self, label: String, release: Disposer) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, TrackedResource { label, release });
        id
    }
}

/// Owner-scoped list of release callbacks.
pub struct ResourceTracker {
    owner: String,
    registry: Arc<Mutex<Registry>>,
}

impl ResourceTracker {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Register a release callback.
    ///
    /// If the tracker was already cleaned up the callback runs immediately, so
    /// a late registration can never leak.
    pub fn track_resource<F>(&self, label: impl Into<String>, release: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let label = label.into();
        {
            let mut registry = self.registry.lock();
            if !registry.released {
                registry.insert(label, Box::new(release));
                return;
            }
        }
        warn!(
            owner = %self.owner,
            resource = %label,
            "Resource registered after cleanup, releasing immediately"
        );
        release();
    }

    /// Run `task` once after `delay`, unless the tracker is cleaned up first.
    pub fn track_timeout<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_tracked("timeout", async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }

    /// Run `tick` every `period` (first run after one period) until cleanup.
    pub fn track_interval<F, Fut>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_tracked("interval", async move {
            let mut interval = tokio::time::interval(period);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                tick().await;
            }
        });
    }

    /// Subscribe `on_event` to a broadcast channel until cleanup.
    ///
    /// Lagged receivers skip the missed events and keep listening; the
    /// listener ends on its own when the channel closes.
    pub fn add_event_listener<T, F, Fut>(
        &self,
        label: impl Into<String>,
        receiver: broadcast::Receiver<T>,
        on_event: F,
    ) where
        T: Clone + Send + 'static,
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_event_listener_with_lag(label, receiver, on_event, |_| {});
    }

    /// Like [`Self::add_event_listener`], calling `on_lagged` with the number
    /// of dropped events whenever the receiver falls behind the channel.
    pub fn add_event_listener_with_lag<T, F, Fut, L>(
        &self,
        label: impl Into<String>,
        mut receiver: broadcast::Receiver<T>,
        mut on_event: F,
        mut on_lagged: L,
    ) where
        T: Clone + Send + 'static,
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        L: FnMut(u64) + Send + 'static,
    {
        let label = label.into();
        let owner = self.owner.clone();
        let task_label = label.clone();
        self.spawn_tracked(label, async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => on_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            owner = %owner,
                            listener = %task_label,
                            skipped,
                            "Listener lagged behind, events dropped"
                        );
                        on_lagged(skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Spawn `work` and track it until it finishes or is aborted by cleanup.
    fn spawn_tracked<F>(&self, label: impl Into<String>, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        // Held across spawn so the task cannot finish before its entry exists.
        let mut registry = self.registry.lock();
        if registry.released {
            warn!(
                owner = %self.owner,
                resource = %label,
                "Task registered after cleanup, not started"
            );
            return;
        }
        let id = registry.next_id;
        let weak = Arc::downgrade(&self.registry);
        let handle = tokio::spawn(async move {
            work.await;
            if let Some(registry) = weak.upgrade() {
                registry.lock().entries.remove(&id);
            }
        });
        let abort = handle.abort_handle();
        registry.insert(label, Box::new(move || abort.abort()));
    }

    /// Number of live tracked resources.
    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_released(&self) -> bool {
        self.registry.lock().released
    }

    /// Release everything, newest first. Idempotent; returns how many
    /// resources were released by this call.
    pub fn cleanup(&self) -> usize {
        let drained = {
            let mut registry = self.registry.lock();
            registry.released = true;
            std::mem::take(&mut registry.entries)
        };
        let count = drained.len();
        for resource in drained.into_values().rev() {
            debug!(owner = %self.owner, resource = %resource.label, "Releasing resource");
            (resource.release)();
        }
        count
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("owner", &self.owner)
            .field("tracked", &self.len())
            .field("released", &self.is_released())
            .finish()
    }
}
