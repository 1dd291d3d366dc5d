//! Agents module - the tree of file and directory owners.
//!
//! # Agent Kinds
//! - **Master**: talks to the human, delegates to the root manager
//! - **Manager**: owns a directory and its doc file
//! - **Coder**: owns a single file
//! - **Ephemeral**: tester working in a scratch file, gone after FINISH
//!
//! # Design Principles
//! - Agents are plain state in an arena keyed by [`AgentId`]
//! - Behavior lives in the interpreter and the engine, not in agent objects
//! - At most one turn per agent is in flight (`stall`)

mod state;
mod tree;
pub mod turn;
mod types;

pub use state::{AgentSnapshot, AgentState, ChildLink, CompletedTask, Scratch};
pub use tree::{AgentTree, TreeError};
pub use types::{AgentError, AgentId, AgentKind, ContextEntry, Scope};
