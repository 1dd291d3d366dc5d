//! # codetree
//!
//! A tree of LLM agents mirroring a codebase: one coder per file, one
//! manager per directory, an optional master talking to the human.
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────┐   DELEGATE / FINISH   ┌──────────┐
//!  human │  master  │ <───────────────────> │ manager  │ (root dir)
//!        └──────────┘                       └────┬─────┘
//!                                  DELEGATE      │      results
//!                          ┌─────────────────────┼───────────────┐
//!                          ▼                     ▼               ▼
//!                     ┌─────────┐          ┌──────────┐     ┌─────────┐
//!                     │  coder  │          │ manager  │     │ tester  │
//!                     │ (file)  │          │ (subdir) │     │(scratch)│
//!                     └─────────┘          └──────────┘     └─────────┘
//! ```
//!
//! ## Turn Flow
//! 1. A prompt lands in an agent's inbox (task, child result or plain text)
//! 2. The agent's supervisor renders its prompt and calls the model
//! 3. The reply is parsed as one directive of the agent's dialect
//! 4. The interpreter applies it and queues the follow-up prompt
//! 5. Cross-agent effects (delegation, spawn, results) go through the engine
//!
//! ## Modules
//! - `directive`: the three directive dialects (parse + canonical text)
//! - `agents`: agent state, the arena built from a directory, turn halves
//! - `interpret`: directive semantics per dialect
//! - `orchestrator`: the engine, prompters and the master watchdog
//! - `prompt`: minijinja templates behind `PromptRenderer`
//! - `llm`, `tools`, `human`: model, sandboxed-command and human collaborators

pub mod agents;
pub mod config;
pub mod directive;
pub mod human;
pub mod interpret;
pub mod llm;
pub mod orchestrator;
pub mod project;
pub mod prompt;
pub mod task;
pub mod tools;
pub mod util;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use orchestrator::{Engine, EngineError, Services};
pub use project::ProjectContext;
