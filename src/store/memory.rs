//! In-memory revision-versioned store.
//!
//! Backs the test suite and serves as the reference collaborator: a single
//! global revision counter, a map of live records, and a commit history that
//! makes watch-from-revision replay possible. Not durable and not meant to
//! be; the replicated store this stands in for lives outside the crate.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::{PrefixView, Store, Watcher};
use crate::error::Result;
use crate::types::{RawEvent, RawRecord, Revision, WatchBatch};

/// One committed mutation. `value: None` is a deletion.
struct Commit {
    revision: Revision,
    key: String,
    value: Option<String>,
}

struct KeyWatch {
    watcher_id: u64,
    key: String,
    tx: Sender<RawEvent>,
}

struct PrefixWatch {
    watcher_id: u64,
    prefix: String,
    tx: Sender<WatchBatch>,
}

#[derive(Default)]
struct Inner {
    revision: Revision,
    records: BTreeMap<String, RawRecord>,
    history: Vec<Commit>,
    next_watcher_id: u64,
    key_watches: Vec<KeyWatch>,
    prefix_watches: Vec<PrefixWatch>,
}

/// Shared-handle in-memory store. Cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a put and fan it out to live watches. Returns the revision.
    pub fn put(&self, key: &str, value: &str) -> Revision {
        let mut inner = self.inner.lock();
        inner.revision = inner.revision.next();
        let record = RawRecord {
            key: key.to_string(),
            value: value.to_string(),
            mod_revision: inner.revision,
        };
        inner.records.insert(key.to_string(), record.clone());
        inner.history.push(Commit {
            revision: record.mod_revision,
            key: key.to_string(),
            value: Some(value.to_string()),
        });
        inner.notify(key, RawEvent::Put(record.clone()));
        record.mod_revision
    }

    /// Commit a deletion. Deleting an absent key is a no-op.
    pub fn delete(&self, key: &str) -> Option<Revision> {
        let mut inner = self.inner.lock();
        inner.records.remove(key)?;
        inner.revision = inner.revision.next();
        let revision = inner.revision;
        inner.history.push(Commit {
            revision,
            key: key.to_string(),
            value: None,
        });
        inner.notify(key, RawEvent::Delete);
        Some(revision)
    }

    /// The store's current commit revision.
    pub fn revision(&self) -> Revision {
        self.inner.lock().revision
    }
}

impl Inner {
    fn notify(&mut self, key: &str, event: RawEvent) {
        // A receiver gone away just unregisters the watch.
        self.key_watches
            .retain(|w| w.key != key || w.tx.send(event.clone()).is_ok());
        self.prefix_watches.retain(|w| {
            if !key.starts_with(&w.prefix) {
                return true;
            }
            let mut batch = WatchBatch::new();
            batch.insert(key.to_string(), event.clone());
            w.tx.send(batch).is_ok()
        });
    }
}

impl Store for MemoryStore {
    type Watcher = MemoryWatcher;

    fn get_raw(&self, key: &str) -> Result<Option<RawRecord>> {
        Ok(self.inner.lock().records.get(key).cloned())
    }

    fn get_raw_prefix(&self, prefix: &str) -> Result<PrefixView> {
        let inner = self.inner.lock();
        let records = inner
            .records
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(PrefixView {
            revision: inner.revision,
            records,
        })
    }

    fn watcher(&self) -> Result<Self::Watcher> {
        let mut inner = self.inner.lock();
        inner.next_watcher_id += 1;
        Ok(MemoryWatcher {
            id: inner.next_watcher_id,
            inner: Arc::clone(&self.inner),
        })
    }
}

/// Watch handle over a [`MemoryStore`].
pub struct MemoryWatcher {
    id: u64,
    inner: Arc<Mutex<Inner>>,
}

impl Watcher for MemoryWatcher {
    fn watch_from_rev(&self, key: &str, rev: Revision) -> Result<Receiver<RawEvent>> {
        let mut inner = self.inner.lock();
        let (tx, rx) = unbounded();
        // Replay history at or after `rev` before going live; registration
        // and replay happen under one lock so no commit can interleave.
        for commit in &inner.history {
            if commit.key != key || commit.revision < rev {
                continue;
            }
            let event = match &commit.value {
                Some(value) => RawEvent::Put(RawRecord {
                    key: commit.key.clone(),
                    value: value.clone(),
                    mod_revision: commit.revision,
                }),
                None => RawEvent::Delete,
            };
            let _ = tx.send(event);
        }
        inner.key_watches.push(KeyWatch {
            watcher_id: self.id,
            key: key.to_string(),
            tx,
        });
        Ok(rx)
    }

    fn watch_prefix_from_rev(&self, prefix: &str, rev: Revision) -> Result<Receiver<WatchBatch>> {
        let mut inner = self.inner.lock();
        let (tx, rx) = unbounded();
        // Historical replay is compacted into one seed batch: the latest
        // event per key at or after `rev`. Live commits then arrive one
        // batch per transaction.
        let mut seed = WatchBatch::new();
        for commit in &inner.history {
            if commit.revision < rev || !commit.key.starts_with(prefix) {
                continue;
            }
            let event = match &commit.value {
                Some(value) => RawEvent::Put(RawRecord {
                    key: commit.key.clone(),
                    value: value.clone(),
                    mod_revision: commit.revision,
                }),
                None => RawEvent::Delete,
            };
            seed.insert(commit.key.clone(), event);
        }
        if !seed.is_empty() {
            let _ = tx.send(seed);
        }
        inner.prefix_watches.push(PrefixWatch {
            watcher_id: self.id,
            prefix: prefix.to_string(),
            tx,
        });
        Ok(rx)
    }

    fn close(&self) {
        let mut inner = self.inner.lock();
        inner.key_watches.retain(|w| w.watcher_id != self.id);
        inner.prefix_watches.retain(|w| w.watcher_id != self.id);
    }
}

impl Drop for MemoryWatcher {
    fn drop(&mut self) {
        self.close();
    }
}
