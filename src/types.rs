//! Core types for the informer.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Store-assigned commit revision.
///
/// Monotonically increasing across the whole store; a watch stream is resumed
/// from a revision without gaps.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Revision(pub u64);

impl Revision {
    pub const MAX: Revision = Revision(u64::MAX);

    pub fn next(self) -> Self {
        Revision(self.0 + 1)
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rev({})", self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored document: key, raw JSON text, and the revision of the commit
/// that last modified it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub key: String,
    pub value: String,
    pub mod_revision: Revision,
}

/// One committed mutation as seen on a raw watch stream.
///
/// `Delete` carries identity only: for a single-key stream the key is the
/// stream's key, for a prefix stream it is the batch map key. First-seen
/// values surface as `Put`; creation is not a distinct tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawEvent {
    Put(RawRecord),
    Delete,
}

/// One transaction's worth of prefix watch events, keyed by store key.
pub type WatchBatch = HashMap<String, RawEvent>;

/// A filtered change delivered to a single-key subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    Update(RawRecord),
    Delete,
}

/// A typed change delivered to a kind-specific subscription callback.
///
/// On `Delete` the document is gone; there is nothing to decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpecChange<T> {
    Update { revision: Revision, spec: T },
    Delete,
}

/// Continuation result returned by every subscription callback.
///
/// `Stop` tears the subscription down; it doubles as application logic and
/// lifecycle control, so it gets a named type rather than a bare bool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchFlow {
    Continue,
    Stop,
}

impl WatchFlow {
    pub fn is_stop(self) -> bool {
        matches!(self, WatchFlow::Stop)
    }
}
