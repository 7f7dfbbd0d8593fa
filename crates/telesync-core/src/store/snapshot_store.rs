// ── Latest-snapshot store ──
//
// Lock-free reads through `ArcSwapOption`; replacements are whole-value
// swaps. Change notification goes out two ways: synchronous callbacks
// registered with `subscribe()`, and a `watch` channel for async
// consumers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio::sync::watch;

use crate::model::Snapshot;
use crate::stream::SnapshotStream;

type Callback = Arc<dyn Fn(&Arc<Snapshot>) + Send + Sync>;
type Registry = ArcSwap<Vec<(u64, Callback)>>;

/// Holds at most one current [`Snapshot`].
///
/// Readers never observe a partially-built value. Subscribers are invoked
/// in registration order after every replacement; a subscriber registered
/// while a notification is in progress only sees later replacements.
pub struct SnapshotStore {
    current: ArcSwapOption<Snapshot>,
    changes: watch::Sender<Option<Arc<Snapshot>>>,
    subscribers: Arc<Registry>,
    next_id: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            current: ArcSwapOption::empty(),
            changes,
            subscribers: Arc::new(ArcSwap::from_pointee(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// The latest accepted snapshot, if any.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    /// Swap in `next` and notify subscribers.
    ///
    /// Only the reconciliation step calls this; it has already decided
    /// that `next` supersedes the current value.
    pub(crate) fn replace(&self, next: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(next);
        self.current.store(Some(Arc::clone(&next)));
        self.changes.send_replace(Some(Arc::clone(&next)));

        // Iterate a copy taken now: registrations made by a callback land
        // in the live registry and are picked up on the next replacement.
        let snapshot_of_registry = self.subscribers.load_full();
        for (id, callback) in snapshot_of_registry.iter() {
            if !self.is_registered(*id) {
                continue;
            }
            callback(&next);
        }

        next
    }

    /// Register `f` to be called after every accepted replacement.
    ///
    /// The returned [`Subscription`] unregisters on drop.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Arc<Snapshot>) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback = Arc::new(f);
        self.subscribers.rcu(|list| {
            let mut list = Vec::clone(list);
            list.push((id, Arc::clone(&callback)));
            list
        });
        Subscription {
            id,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Async view of the store: current value plus change notification.
    pub fn watch(&self) -> SnapshotStream {
        SnapshotStream::new(self.changes.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load().len()
    }

    fn is_registered(&self, id: u64) -> bool {
        self.subscribers.load().iter().any(|(other, _)| *other == id)
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("current", &self.current.load().as_ref().map(|s| s.sequence()))
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

// ── Subscription handle ──────────────────────────────────────────────

/// Keeps a store callback registered. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Unregister now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let id = self.id;
        registry.rcu(|list| {
            list.iter()
                .filter(|(other, _)| *other != id)
                .cloned()
                .collect::<Vec<_>>()
        });
    }
}
