//! Raw store collaborator contract.
//!
//! The informer sits on top of a revision-versioned key-value store. The
//! store itself (replication, durability, consensus) is somebody else's
//! problem; this module pins down exactly the read and watch primitives the
//! informer needs, plus an in-memory implementation used by the test suite.

pub mod memory;

pub use memory::{MemoryStore, MemoryWatcher};

use std::collections::HashMap;

use crossbeam_channel::Receiver;

use crate::error::Result;
use crate::types::{RawEvent, RawRecord, Revision, WatchBatch};

/// Point-in-time prefix read: every matching record, plus the store's commit
/// revision at the moment of the read.
///
/// The header revision is what a prefix watch anchors on when the prefix has
/// no members yet; with members, the minimum member mod-revision is used
/// instead so no concurrent mutation slips between read and watch.
#[derive(Clone, Debug)]
pub struct PrefixView {
    pub revision: Revision,
    pub records: HashMap<String, RawRecord>,
}

/// Read and watch primitives of the underlying store.
pub trait Store: Send + Sync + 'static {
    type Watcher: Watcher;

    /// Point read. `None` means the key does not exist.
    fn get_raw(&self, key: &str) -> Result<Option<RawRecord>>;

    /// Point-in-time read of every record under `prefix`.
    fn get_raw_prefix(&self, prefix: &str) -> Result<PrefixView>;

    /// Obtain a fresh watch handle.
    fn watcher(&self) -> Result<Self::Watcher>;
}

/// One watch handle. Closing it closes every channel it handed out.
pub trait Watcher: Send + 'static {
    /// Stream every committed change to `key` at or after `rev`, in commit
    /// order. The channel closes when the handle is closed.
    fn watch_from_rev(&self, key: &str, rev: Revision) -> Result<Receiver<RawEvent>>;

    /// Stream batched changes under `prefix` at or after `rev`, grouped by
    /// committing transaction.
    fn watch_prefix_from_rev(&self, prefix: &str, rev: Revision) -> Result<Receiver<WatchBatch>>;

    /// Idempotent; safe to call from any thread, any number of times.
    fn close(&self);
}
