// ── Reactive snapshot stream ──
//
// Async counterpart to `SnapshotStore::subscribe`, backed by the store's
// `watch` channel.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::Snapshot;

/// A subscription to the store's current snapshot.
///
/// Provides point-in-time access and change notification, either through
/// [`changed()`](Self::changed) or by converting into a `Stream`.
pub struct SnapshotStream {
    current: Option<Arc<Snapshot>>,
    receiver: watch::Receiver<Option<Arc<Snapshot>>>,
}

impl SnapshotStream {
    pub(crate) fn new(receiver: watch::Receiver<Option<Arc<Snapshot>>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> Option<&Arc<Snapshot>> {
        self.current.as_ref()
    }

    /// The latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next replacement.
    /// Returns `None` if the store has been dropped.
    pub async fn changed(&mut self) -> Option<Option<Arc<Snapshot>>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current.clone_from(&snap);
        Some(snap)
    }

    /// Convert into a `Stream` of accepted snapshots.
    ///
    /// Yields the current snapshot first (if any), then each replacement.
    /// Intermediate values may be skipped if the consumer falls behind.
    pub fn into_stream(self) -> SnapshotWatchStream {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct SnapshotWatchStream {
    inner: WatchStream<Option<Arc<Snapshot>>>,
}

impl Stream for SnapshotWatchStream {
    type Item = Arc<Snapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Some(snap)) => return Poll::Ready(Some(snap)),
                // The empty initial value is not a snapshot.
                Some(None) => {}
                None => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;
    use crate::model::{Fields, Source};
    use crate::store::SnapshotStore;

    fn snapshot() -> Snapshot {
        Snapshot::new(Fields::new(), Utc::now(), Source::Pull)
    }

    #[test]
    fn changed_waits_for_a_replacement() {
        let store = SnapshotStore::new();
        let mut stream = store.watch();
        assert!(stream.current().is_none());

        let mut changed = task::spawn(stream.changed());
        assert_pending!(changed.poll());

        store.replace(snapshot());
        assert!(changed.is_woken());
        let next = assert_ready!(changed.poll());
        assert!(next.unwrap().is_some());
        drop(changed);

        assert!(stream.current().is_some());
    }

    #[test]
    fn watch_stream_skips_the_empty_initial_value() {
        let store = SnapshotStore::new();
        let mut stream = task::spawn(store.watch().into_stream());
        assert_pending!(stream.poll_next());

        let accepted = store.replace(snapshot());
        let next = assert_ready!(stream.poll_next()).unwrap();
        assert!(Arc::ptr_eq(&next, &accepted));
    }

    #[test]
    fn dropped_store_ends_the_stream() {
        let store = SnapshotStore::new();
        let mut stream = store.watch();
        drop(store);

        let mut changed = task::spawn(stream.changed());
        assert!(assert_ready!(changed.poll()).is_none());
    }
}
