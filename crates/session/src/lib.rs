//! Session layer for Brandloom.
//!
//! A [`SessionContext`] owns one [`brandloom_memory::AgentMemory`] per agent,
//! the currently bound chat, the live status sink, and the persistence
//! cursors that keep flushes idempotent. The [`SessionRegistry`] is the
//! single source of truth for which sessions are alive; it is constructed
//! once at startup and passed explicitly to everything that needs it.

pub mod context;
pub mod registry;
pub mod streamer;

pub use context::SessionContext;
pub use registry::SessionRegistry;
pub use streamer::ChannelSink;
