//! Memory implementations for Brandloom.
//!
//! [`AgentMemory`] is the bounded in-process ring each agent reads and
//! writes during a run. The persistence backends implement
//! `brandloom_core::PersistenceGateway` for durable storage.

pub mod in_memory;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use store::AgentMemory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
