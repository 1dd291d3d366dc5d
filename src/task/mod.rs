//! Task module - the immutable message protocol exchanged between agents.
//!
//! Tasks, delegations and results are plain values. The per-agent inbox is
//! the only mutable channel; nothing here is ever updated in place.

pub mod task;
mod message;

pub use message::{Envelope, Message, ResultMessage, TaskMessage};
pub use task::{Task, TaskId};
