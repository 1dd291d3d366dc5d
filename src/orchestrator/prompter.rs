//! Orchestration prompters: the boundary between inbound envelopes and agent state.
//!
//! Each agent kind has one prompter. It records a delegated task (activating
//! the agent if idle), clears child or helper bookkeeping for a result, tags
//! relayed results with the sender, and always queues the prompt. The return
//! value says whether a turn may start now; the supervisor never starts one
//! while `stall` is set.

use crate::agents::{AgentKind, AgentState};
use crate::task::{Envelope, Message, ResultMessage, TaskMessage};

/// Route `envelope` to the prompter for `state.kind`.
pub fn receive(state: &mut AgentState, envelope: Envelope) -> bool {
    match state.kind {
        AgentKind::Master => master(state, envelope),
        AgentKind::Manager => manager(state, envelope),
        AgentKind::Coder => coder(state, envelope),
        AgentKind::Ephemeral(_) => ephemeral(state, envelope),
    }
}

fn master(state: &mut AgentState, envelope: Envelope) -> bool {
    state.touch();
    let prompt = match envelope.message {
        Some(Message::Task(task)) => take_task(state, task, envelope.prompt),
        Some(Message::Result(result)) => take_result(state, result),
        None => envelope.prompt,
    };
    state.enqueue(prompt)
}

fn manager(state: &mut AgentState, envelope: Envelope) -> bool {
    let prompt = match envelope.message {
        Some(Message::Task(task)) => take_task(state, task, envelope.prompt),
        Some(Message::Result(result)) => take_result(state, result),
        None => envelope.prompt,
    };
    state.enqueue(prompt)
}

fn coder(state: &mut AgentState, envelope: Envelope) -> bool {
    let prompt = match envelope.message {
        Some(Message::Task(task)) => take_task(state, task, envelope.prompt),
        // Coders only hear back from their testers
        Some(Message::Result(result)) => take_result(state, result),
        None => envelope.prompt,
    };
    state.enqueue(prompt)
}

fn ephemeral(state: &mut AgentState, envelope: Envelope) -> bool {
    let prompt = match envelope.message {
        Some(Message::Task(task)) => take_task(state, task, envelope.prompt),
        Some(Message::Result(result)) => {
            tracing::warn!(
                "{} {} got a result from {} it never asked for",
                state.kind,
                state.name,
                result.sender_name
            );
            result.relay_text()
        }
        None => envelope.prompt,
    };
    state.enqueue(prompt)
}

/// Activate on a fresh task; a busy agent just gets the text as one more prompt.
fn take_task(state: &mut AgentState, message: TaskMessage, prompt: String) -> String {
    if state.is_active() {
        tracing::info!(
            "{} {} got another task while active: {}",
            state.kind,
            state.name,
            message.task.text()
        );
        return format!("Additional task: {}", prompt);
    }
    state.activate(message.task, message.sender);
    prompt
}

fn take_result(state: &mut AgentState, result: ResultMessage) -> String {
    if state.active_children.remove(&result.sender).is_some() {
        tracing::info!("{} {} got result from child {}", state.kind, state.name, result.sender_name);
    } else if state.active_ephemeral.remove(&result.sender) {
        tracing::info!("{} {} got result from helper {}", state.kind, state.name, result.sender_name);
    } else {
        tracing::warn!(
            "{} {} got a result from {} which was not tracked as active",
            state.kind,
            state.name,
            result.sender_name
        );
    }
    result.relay_text()
}
