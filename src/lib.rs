//! # Mesh Informer
//!
//! Change-notification core for a service-mesh control plane: turns a raw,
//! revision-versioned key-value store into typed, partial-field-aware
//! subscriptions.
//!
//! ## Core Concepts
//!
//! - **Sub-path diffing**: a single-key watch fires only when the selected
//!   part of the document actually changed
//! - **Prefix snapshots**: a prefix watch maintains a live, deduplicated
//!   snapshot of every member and delivers it whole on any change
//! - **One subscription per watch key**: duplicate registrations fail; the
//!   caller cancels first
//! - **Callback continuation**: every callback returns [`WatchFlow`],
//!   deciding whether the subscription stays alive
//!
//! ## Example
//!
//! ```ignore
//! use mesh_informer::{Informer, MemoryStore, PathExpr, SpecChange, WatchFlow};
//!
//! let informer = Informer::new(store);
//!
//! informer.on_part_of_service_spec("orders", PathExpr::LOAD_BALANCE, |change| {
//!     if let SpecChange::Update { spec, .. } = change {
//!         rebuild_balancer(spec.load_balance);
//!     }
//!     WatchFlow::Continue
//! })?;
//! ```

pub mod diff;
pub mod error;
pub mod informer;
pub mod layout;
pub mod specs;
pub mod store;
pub mod types;

// Re-exports
pub use diff::{part_equal, PathExpr};
pub use error::{InformerError, Result};
pub use informer::Informer;
pub use specs::{
    IngressPath, IngressRule, IngressSpec, LoadBalance, Resilience, ServiceInstanceSpec,
    ServiceInstanceStatus, ServiceSpec, TenantSpec,
};
pub use store::{MemoryStore, MemoryWatcher, PrefixView, Store, Watcher};
pub use types::{Change, RawEvent, RawRecord, Revision, SpecChange, WatchBatch, WatchFlow};
