//! Subscription hub: fan-out of change notifications to viewers.
//!
//! Every subscriber owns a bounded queue of pending plot paths. A queue holds
//! at most one entry per path, carrying the highest version seen, so bursts
//! against a single plot collapse to one notification. When a queue would
//! exceed its capacity it is cleared and the subscriber receives a single
//! [`HubEvent::Resync`] instead. Publishing never waits on a subscriber.
//!
//! Capacity bounds only live notifications. Entries queued by
//! [`Subscription::seed`] are the viewer's starting baseline and never count
//! toward it, however many plots exist.
//!
//! Each subscriber also remembers the last version delivered per path, and
//! never receives a version at or below it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures::Stream;
use serde::Serialize;
use tokio::sync::Notify;

use grimoire_core::{PathPrefix, PlotPath};

/// Default number of distinct pending paths per subscriber.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A plot reached `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub path: PlotPath,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    Changed(ChangeEvent),
    /// The subscriber fell too far behind; refetch the tree.
    Resync,
}

struct Pending {
    version: u64,
    seeded: bool,
}

#[derive(Default)]
struct QueueState {
    order: VecDeque<PlotPath>,
    pending: HashMap<PlotPath, Pending>,
    /// Pending entries that came from live notifications.
    live: usize,
    delivered: HashMap<PlotPath, u64>,
    resync: bool,
    closed: bool,
}

impl QueueState {
    fn is_stale(&self, path: &PlotPath, version: u64) -> bool {
        self.delivered.get(path).is_some_and(|&seen| seen >= version)
    }

    /// Queue `path` at `version`. `capacity` is `None` for seed entries.
    /// Returns `true` when the queue overflowed.
    fn offer(&mut self, path: &PlotPath, version: u64, capacity: Option<usize>) -> bool {
        if self.closed || self.is_stale(path, version) {
            return false;
        }
        if let Some(pending) = self.pending.get_mut(path) {
            pending.version = pending.version.max(version);
            return false;
        }
        match capacity {
            Some(capacity) if self.live >= capacity => {
                self.request_resync();
                return true;
            }
            Some(_) => self.live += 1,
            None => {}
        }
        self.order.push_back(path.clone());
        self.pending.insert(
            path.clone(),
            Pending {
                version,
                seeded: capacity.is_none(),
            },
        );
        false
    }

    fn request_resync(&mut self) {
        self.order.clear();
        self.pending.clear();
        self.live = 0;
        self.resync = true;
    }

    /// Drop everything pending under `prefix` and ask for a resync.
    fn discard(&mut self, prefix: &PathPrefix) {
        if self.closed {
            return;
        }
        let live = &mut self.live;
        self.pending.retain(|path, pending| {
            let keep = !prefix.matches(path);
            if !keep && !pending.seeded {
                *live -= 1;
            }
            keep
        });
        self.order.retain(|path| !prefix.matches(path));
        self.resync = true;
    }

    fn pop(&mut self) -> Option<HubEvent> {
        if self.resync {
            self.resync = false;
            return Some(HubEvent::Resync);
        }
        while let Some(path) = self.order.pop_front() {
            let Some(Pending { version, seeded }) = self.pending.remove(&path) else {
                continue;
            };
            if !seeded {
                self.live -= 1;
            }
            if self.is_stale(&path, version) {
                continue;
            }
            self.delivered.insert(path.clone(), version);
            return Some(HubEvent::Changed(ChangeEvent { path, version }));
        }
        None
    }
}

struct SubscriberQueue {
    prefix: PathPrefix,
    state: Mutex<QueueState>,
    wake: Notify,
}

impl SubscriberQueue {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct HubInner {
    subscribers: RwLock<HashMap<u64, Arc<SubscriberQueue>>>,
    next_id: AtomicU64,
    capacity: usize,
    closed: AtomicBool,
}

/// Registry of live subscriptions. Cheap to clone.
#[derive(Clone)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl SubscriptionHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register interest in every plot under `prefix`.
    ///
    /// The subscription is live as soon as this returns; commits made after
    /// this call are never missed. Call [`Subscription::seed`] with the
    /// store's current versions to cover commits made before it.
    pub fn subscribe(&self, prefix: PathPrefix) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue {
            prefix,
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
        });

        {
            let mut subscribers = self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if self.inner.closed.load(Ordering::Acquire) {
                queue.state().closed = true;
            } else {
                subscribers.insert(id, queue.clone());
            }
        }

        tracing::debug!(subscriber = id, prefix = %queue.prefix, "viewer subscribed");
        Subscription {
            id,
            queue,
            hub: self.inner.clone(),
        }
    }

    /// Record that `path` reached `version` for every matching subscriber.
    pub fn notify(&self, path: &PlotPath, version: u64) {
        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, queue) in subscribers.iter() {
            if !queue.prefix.matches(path) {
                continue;
            }
            let overflowed = queue
                .state()
                .offer(path, version, Some(self.inner.capacity));
            if overflowed {
                tracing::warn!(
                    subscriber = id,
                    capacity = self.inner.capacity,
                    "subscriber queue overflowed, requesting resync"
                );
            }
            queue.wake.notify_one();
        }
    }

    /// The subtree at `prefix` was removed. Every subscriber watching any
    /// part of it drops the pending entries there and receives a
    /// [`HubEvent::Resync`].
    pub fn removed(&self, prefix: &PathPrefix) {
        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for queue in subscribers.values() {
            if queue.prefix.overlaps(prefix) {
                queue.state().discard(prefix);
                queue.wake.notify_one();
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// End every subscription. Pending events are still drained, then each
    /// stream finishes. Later subscriptions are born closed.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let drained: Vec<_> = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (_, queue) in &drained {
            queue.state().closed = true;
            queue.wake.notify_one();
        }
        tracing::info!(subscribers = drained.len(), "subscription hub closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// One viewer's view of the hub. Dropping it unregisters the viewer.
pub struct Subscription {
    id: u64,
    queue: Arc<SubscriberQueue>,
    hub: Arc<HubInner>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("prefix", &self.queue.prefix)
            .finish()
    }
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn prefix(&self) -> &PathPrefix {
        &self.queue.prefix
    }

    /// Queue the current version of each plot. Seeding is not subject to
    /// the capacity bound.
    pub fn seed(&self, current: impl IntoIterator<Item = (PlotPath, u64)>) {
        let mut state = self.queue.state();
        for (path, version) in current {
            if self.queue.prefix.matches(&path) {
                state.offer(&path, version, None);
            }
        }
        drop(state);
        self.queue.wake.notify_one();
    }

    /// Next event without waiting.
    pub fn try_recv(&mut self) -> Option<HubEvent> {
        self.queue.state().pop()
    }

    /// Wait for the next event. Returns `None` once the hub is closed and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        loop {
            {
                let mut state = self.queue.state();
                if let Some(event) = state.pop() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            self.queue.wake.notified().await;
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = HubEvent> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            let event = subscription.recv().await?;
            Some((event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let removed = self
            .hub
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        if removed.is_some() {
            tracing::debug!(subscriber = self.id, "viewer unsubscribed");
        }
    }
}
