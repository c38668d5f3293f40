//! Shared-state provider
//!
//! Creates the shared structures the bridge is built from and tears all of
//! them down in one call. Queues are unbounded tokio mpsc channels whose
//! receiver sits behind an async mutex, so any number of consumers can pull
//! from the same queue and each item is handed to exactly one of them.
//! Maps are `DashMap`s keyed by identifier.

use crate::core::errors::{MuxDemuxError, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Something the provider can tear down at shutdown
trait Teardown: Send + Sync {
    /// Release the structure, returning how many items it still held
    fn teardown(&self) -> usize;
}

struct QueueInner<T> {
    name: String,
    // None once torn down; dropping the only sender wakes blocked consumers
    tx: RwLock<Option<mpsc::UnboundedSender<T>>>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
    len: AtomicUsize,
    closed: AtomicBool,
}

/// Unbounded multi-producer / multi-consumer FIFO queue
pub struct SharedQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for SharedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> SharedQueue<T> {
    fn new(name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(QueueInner {
                name: name.to_string(),
                tx: RwLock::new(Some(tx)),
                rx: Mutex::new(rx),
                len: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Append an item. Never blocks; fails only once the queue is torn down.
    pub fn push(&self, item: T) -> Result<()> {
        let guard = self.inner.tx.read().unwrap_or_else(PoisonError::into_inner);
        let tx = guard
            .as_ref()
            .ok_or_else(|| MuxDemuxError::channel_closed(self.name(), "push"))?;

        self.inner.len.fetch_add(1, Ordering::AcqRel);
        if tx.send(item).is_err() {
            self.inner.take_one();
            return Err(MuxDemuxError::channel_closed(self.name(), "push"));
        }
        Ok(())
    }

    /// Remove the next item, suspending until one is available.
    ///
    /// Concurrent callers are served in the order they started waiting.
    pub async fn pop(&self) -> Result<T> {
        let mut rx = self.inner.rx.lock().await;
        match rx.recv().await {
            // Teardown already counted anything still buffered as discarded
            Some(_) if self.inner.closed.load(Ordering::Acquire) => {
                Err(MuxDemuxError::channel_closed(self.name(), "pop"))
            }
            Some(item) => {
                self.inner.take_one();
                Ok(item)
            }
            None => Err(MuxDemuxError::channel_closed(self.name(), "pop")),
        }
    }

    /// Remove the next item if one is ready.
    ///
    /// Returns `None` when the queue is empty, torn down, or another consumer
    /// is currently parked in `pop` (which only happens on an empty queue).
    pub fn try_pop(&self) -> Option<T> {
        if self.inner.closed.load(Ordering::Acquire) {
            return None;
        }
        let mut rx = self.inner.rx.try_lock().ok()?;
        let item = rx.try_recv().ok()?;
        self.inner.take_one();
        Some(item)
    }

    /// Number of items waiting in the queue
    pub fn len(&self) -> usize {
        self.inner.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl<T> QueueInner<T> {
    /// Decrement the item count, never below zero
    fn take_one(&self) {
        let _ = self
            .len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

impl<T: Send + 'static> Teardown for QueueInner<T> {
    fn teardown(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        self.tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let buffered = self.len.swap(0, Ordering::AcqRel);

        // A consumer parked in `pop` holds the receiver. It will drop
        // whatever is still buffered once it wakes, so count that here.
        match self.rx.try_lock() {
            Ok(mut rx) => {
                rx.close();
                let mut drained = 0;
                while rx.try_recv().is_ok() {
                    drained += 1;
                }
                drained
            }
            Err(_) => buffered,
        }
    }
}

struct MapInner<V> {
    name: String,
    entries: DashMap<String, V>,
}

/// Concurrent identifier -> value map
pub struct SharedMap<V> {
    inner: Arc<MapInner<V>>,
}

impl<V> Clone for SharedMap<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Send + Sync + 'static> SharedMap<V> {
    fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(MapInner {
                name: name.to_string(),
                entries: DashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Insert a value, returning the one it replaced
    pub fn insert(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.inner.entries.insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.entries.remove(key).map(|(_, value)| value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

impl<V: Send + Sync + 'static> Teardown for MapInner<V> {
    fn teardown(&self) -> usize {
        let held = self.entries.len();
        self.entries.clear();
        held
    }
}

/// Items discarded per structure at shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub discarded: Vec<(String, usize)>,
}

impl TeardownReport {
    pub fn total(&self) -> usize {
        self.discarded.iter().map(|(_, count)| count).sum()
    }

    /// Items discarded from the named structure
    pub fn discarded_from(&self, name: &str) -> usize {
        self.discarded
            .iter()
            .find(|(structure, _)| structure == name)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// In-process provider of shared queues and maps
pub struct StateProvider {
    structures: DashMap<String, Arc<dyn Teardown>>,
    is_shutdown: AtomicBool,
}

impl Default for StateProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StateProvider {
    pub fn new() -> Self {
        Self {
            structures: DashMap::new(),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Create a shared FIFO queue. Names must be unique per provider.
    pub fn queue<T: Send + 'static>(&self, name: &str) -> Result<SharedQueue<T>> {
        self.ensure_running(name)?;
        let queue = SharedQueue::new(name);
        self.register(name, queue.inner.clone())?;
        debug!(queue = %name, "Created shared queue");
        Ok(queue)
    }

    /// Create a shared map. Names must be unique per provider.
    pub fn map<V: Send + Sync + 'static>(&self, name: &str) -> Result<SharedMap<V>> {
        self.ensure_running(name)?;
        let map = SharedMap::new(name);
        self.register(name, map.inner.clone())?;
        debug!(map = %name, "Created shared map");
        Ok(map)
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    /// Tear down every structure this provider created.
    ///
    /// Queues stop accepting items and drop whatever they still buffer; maps
    /// are cleared. Later calls find nothing left and return an empty report.
    pub fn shutdown(&self) -> TeardownReport {
        self.is_shutdown.store(true, Ordering::Release);

        let names: Vec<String> = self.structures.iter().map(|e| e.key().clone()).collect();
        let mut report = TeardownReport::default();
        for name in names {
            if let Some((name, structure)) = self.structures.remove(&name) {
                let discarded = structure.teardown();
                if discarded > 0 {
                    warn!(structure = %name, discarded, "Discarded items at shutdown");
                }
                report.discarded.push((name, discarded));
            }
        }
        report.discarded.sort();

        info!(
            structures = report.discarded.len(),
            discarded = report.total(),
            "Shared-state provider shut down"
        );
        report
    }

    fn ensure_running(&self, name: &str) -> Result<()> {
        if self.is_shutdown() {
            return Err(MuxDemuxError::shutdown(format!("state provider ({})", name)));
        }
        Ok(())
    }

    fn register(&self, name: &str, structure: Arc<dyn Teardown>) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.structures.entry(name.to_string()) {
            Entry::Occupied(_) => Err(MuxDemuxError::configuration_field(
                format!("shared structure '{}' already exists", name),
                "name",
            )),
            Entry::Vacant(slot) => {
                slot.insert(structure);
                Ok(())
            }
        }
    }
}
