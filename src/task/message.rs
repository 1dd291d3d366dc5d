//! Delegation and result messages.

use serde::{Deserialize, Serialize};

use super::Task;
use crate::agents::AgentId;

/// Parent -> child delegation.
///
/// `sender == None` means the task came from outside the tree (the user or
/// the engine's `run_prompt`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub sender: Option<AgentId>,
    pub recipient: AgentId,
    pub task: Task,
}

/// Child -> parent completion report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub sender: AgentId,
    /// Display name of the reporting agent, used to tag the relayed prompt
    pub sender_name: String,
    pub recipient: Option<AgentId>,
    pub task: Task,
    pub success: bool,
    pub payload: String,
}

impl ResultMessage {
    /// Prompt text relayed to the recipient: `[name] (Task: ...) payload`.
    pub fn relay_text(&self) -> String {
        let status = if self.success { "" } else { "FAILED: " };
        format!(
            "[{}] (Task: {}) {}{}",
            self.sender_name,
            self.task.text(),
            status,
            self.payload
        )
    }
}

/// A protocol message carried by an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Task(TaskMessage),
    Result(ResultMessage),
}

/// What lands in an agent's inbox: prompt text plus an optional message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub prompt: String,
    pub message: Option<Message>,
}

impl Envelope {
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            prompt: text.into(),
            message: None,
        }
    }

    pub fn task(message: TaskMessage) -> Self {
        Self {
            prompt: message.task.text().to_string(),
            message: Some(Message::Task(message)),
        }
    }

    pub fn result(message: ResultMessage) -> Self {
        Self {
            prompt: message.payload.clone(),
            message: Some(Message::Result(message)),
        }
    }
}
