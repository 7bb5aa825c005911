//! # Brandloom Core
//!
//! Domain types, traits, and error definitions for the Brandloom agent
//! orchestration runtime. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod memory;
pub mod model;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentProfile, stock_profiles};
pub use decision::{Decision, DecisionAction, DecisionError, RawDecision};
pub use dispatch::{DispatchResult, Dispatcher};
pub use error::{Error, Result};
pub use event::{StatusEvent, StatusSink};
pub use memory::{ChatMessage, ChatRole, MemoryEntry, PersistenceGateway};
pub use model::{ChatModel, ModelRequest};
pub use tool::{Tool, ToolRegistry};
