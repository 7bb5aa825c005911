//! The Brandloom execution runtime.
//!
//! Every agent is one instance of the same generic loop: build a prompt from
//! the agent's profile and memory, call the model, parse the decision, and
//! either return, invoke a tool, or delegate to a nested agent. The loop
//! lives in [`runner::AgentRuntime`]; tool and agent invocation go through
//! the uniform [`brandloom_core::Dispatcher`] contract; failed dispatches can
//! be run through [`diagnostics`] for one-shot recovery before surfacing.

pub mod diagnostics;
pub mod dispatch;
pub mod prompt;
pub mod runner;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use diagnostics::{
    Diagnosis, DiagnosticsGateway, FailureReport, Issue, ModelDiagnostics, Solution,
    SolutionAction,
};
pub use dispatch::{AgentDispatcher, ToolDispatcher};
pub use prompt::{PromptBuilder, RegistryPromptBuilder, follow_up_prompt};
pub use runner::{AgentReply, AgentRuntime};
