//! Subscription registry and the per-subscription watch workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::diff::{part_equal, PathExpr};
use crate::error::{InformerError, Result};
use crate::store::{Store, Watcher};
use crate::types::{Change, RawEvent, WatchBatch, WatchFlow};

/// Raw handler for a single-key subscription; decoding happens in the typed
/// bindings layered on top.
pub(crate) type PartHandler = Box<dyn FnMut(Change) -> WatchFlow + Send>;

/// Raw handler for a prefix subscription: receives the full current snapshot
/// of key to raw document text.
pub(crate) type SpecsHandler = Box<dyn FnMut(&HashMap<String, String>) -> WatchFlow + Send>;

struct Registry<W> {
    watchers: HashMap<String, W>,
    closed: bool,
}

/// The informer engine: a table of live subscriptions over one store.
///
/// Registration and cancellation run synchronously under one mutex; the
/// mutex guards only the table and the closed flag, never a watch loop, so
/// neither side ever blocks on event delivery. Each subscription gets its
/// own worker thread that exits when its watch channel closes.
pub struct Informer<S: Store> {
    store: Arc<S>,
    registry: Arc<Mutex<Registry<S::Watcher>>>,
}

impl<S: Store> Informer<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            registry: Arc::new(Mutex::new(Registry {
                watchers: HashMap::new(),
                closed: false,
            })),
        }
    }

    /// Number of live subscriptions.
    pub fn watch_count(&self) -> usize {
        self.registry.lock().watchers.len()
    }

    /// Close every live subscription and permanently shut the engine down.
    /// Further registrations fail with `Closed`.
    pub fn close(&self) {
        let mut registry = self.registry.lock();
        for (_, watcher) in registry.watchers.drain() {
            watcher.close();
        }
        registry.closed = true;
        info!("informer closed");
    }

    /// Idempotently cancel one subscription by its watch key.
    pub(crate) fn cancel(&self, watch_key: &str) {
        cancel_entry(&self.registry, watch_key);
    }

    /// Register a single-key, sub-path-aware subscription.
    ///
    /// The key must exist: the baseline read both validates existence and
    /// anchors the watch stream, so the first event the worker receives is
    /// the baseline value itself.
    pub(crate) fn on_spec_part(
        &self,
        store_key: &str,
        watch_key: String,
        path: PathExpr,
        handler: PartHandler,
    ) -> Result<()> {
        let mut registry = self.registry.lock();
        if registry.closed {
            return Err(InformerError::Closed);
        }
        if registry.watchers.contains_key(&watch_key) {
            debug!("watch key {} already registered", watch_key);
            return Err(InformerError::AlreadyWatched(watch_key));
        }

        let record = self
            .store
            .get_raw(store_key)?
            .ok_or_else(|| InformerError::NotFound(store_key.to_string()))?;

        let watcher = self.store.watcher()?;
        let rx = watcher.watch_from_rev(store_key, record.mod_revision)?;
        registry.watchers.insert(watch_key.clone(), watcher);

        let shared = Arc::clone(&self.registry);
        thread::spawn(move || run_key_watch(shared, watch_key, path, rx, handler));
        Ok(())
    }

    /// Register a prefix-scoped, full-snapshot subscription.
    ///
    /// The watch anchors on the minimum mod-revision among current members,
    /// so nothing committed between the baseline read and the watch start is
    /// missed; already-observed revisions are re-delivered and absorbed by
    /// the snapshot diff. An empty prefix anchors on the read's revision.
    pub(crate) fn on_specs(
        &self,
        store_prefix: &str,
        watch_key: String,
        handler: SpecsHandler,
    ) -> Result<()> {
        let mut registry = self.registry.lock();
        if registry.closed {
            return Err(InformerError::Closed);
        }
        if registry.watchers.contains_key(&watch_key) {
            debug!("watch key {} already registered", watch_key);
            return Err(InformerError::AlreadyWatched(watch_key));
        }

        let view = self.store.get_raw_prefix(store_prefix)?;
        let start_rev = view
            .records
            .values()
            .map(|r| r.mod_revision)
            .min()
            .unwrap_or(view.revision);

        let watcher = self.store.watcher()?;
        let rx = watcher.watch_prefix_from_rev(store_prefix, start_rev)?;
        registry.watchers.insert(watch_key.clone(), watcher);

        let shared = Arc::clone(&self.registry);
        thread::spawn(move || run_prefix_watch(shared, watch_key, rx, handler));
        Ok(())
    }
}

/// Remove and close one subscription. Callback-triggered stops and external
/// cancels race onto this; removing the entry first makes the second call a
/// no-op, so the underlying handle is closed exactly once.
fn cancel_entry<W: Watcher>(registry: &Mutex<Registry<W>>, watch_key: &str) {
    let mut registry = registry.lock();
    if let Some(watcher) = registry.watchers.remove(watch_key) {
        watcher.close();
        debug!("watch key {} cancelled", watch_key);
    }
}

/// Single-key worker: prime, then diff-and-deliver until the channel closes.
///
/// The worker keeps draining after a `Stop` so it never outlives the channel
/// by blocking and never leaks; the channel closes once `cancel_entry` has
/// closed the handle.
fn run_key_watch<W: Watcher>(
    registry: Arc<Mutex<Registry<W>>>,
    watch_key: String,
    path: PathExpr,
    rx: Receiver<RawEvent>,
    mut handler: PartHandler,
) {
    let first = match rx.recv() {
        Ok(event) => event,
        Err(_) => return,
    };

    // Priming: the baseline value arrives as the first event and is
    // delivered unconditionally, seeding the value we diff against.
    let mut last_value = match first {
        RawEvent::Put(record) => {
            let value = record.value.clone();
            if handler(Change::Update(record)).is_stop() {
                cancel_entry(&registry, &watch_key);
            }
            value
        }
        RawEvent::Delete => {
            if handler(Change::Delete).is_stop() {
                cancel_entry(&registry, &watch_key);
            }
            String::new()
        }
    };

    for event in rx.iter() {
        let flow = match event {
            // Deletions are never suppressed.
            RawEvent::Delete => handler(Change::Delete),
            RawEvent::Put(record) => {
                let value = record.value.clone();
                let flow = if part_equal(&path, &last_value, &value) {
                    WatchFlow::Continue
                } else {
                    handler(Change::Update(record))
                };
                // Diff against the latest raw value, delivered or not.
                last_value = value;
                flow
            }
        };

        if flow.is_stop() {
            cancel_entry(&registry, &watch_key);
        }
    }
}

/// Prefix worker: maintain the snapshot, deliver it whole on any change.
fn run_prefix_watch<W: Watcher>(
    registry: Arc<Mutex<Registry<W>>>,
    watch_key: String,
    rx: Receiver<WatchBatch>,
    mut handler: SpecsHandler,
) {
    let mut snapshot: HashMap<String, String> = HashMap::new();

    // Priming: the first batch seeds the snapshot and is delivered
    // unconditionally, even if it matches what the caller already read.
    let first = match rx.recv() {
        Ok(batch) => batch,
        Err(_) => return,
    };
    for (key, event) in first {
        if let RawEvent::Put(record) = event {
            snapshot.insert(key, record.value);
        }
    }
    if handler(&snapshot).is_stop() {
        cancel_entry(&registry, &watch_key);
    }

    for batch in rx.iter() {
        let mut changed = false;

        for (key, event) in batch {
            match event {
                RawEvent::Delete => {
                    snapshot.remove(&key);
                    changed = true;
                    debug!("delete record: {}", key);
                }
                RawEvent::Put(record) => {
                    if snapshot.get(&key).map(String::as_str) == Some(record.value.as_str()) {
                        continue;
                    }
                    debug!("update record: {}, revision: {}", key, record.mod_revision);
                    snapshot.insert(key, record.value);
                    changed = true;
                }
            }
        }

        if changed && handler(&snapshot).is_stop() {
            cancel_entry(&registry, &watch_key);
        }
    }
}
