//! The subscription engine: registry, watch workers, and typed bindings.

mod bindings;
mod engine;

pub use engine::Informer;
