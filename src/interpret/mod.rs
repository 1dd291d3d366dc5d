//! Directive interpretation.
//!
//! `interpret` executes one parsed directive against one agent. Local side
//! effects (files, memory, bookkeeping) happen here; anything that touches
//! another agent comes back as an [`Effect`] for the engine to apply after
//! the turn.
//!
//! Every call leaves at most one follow-up prompt on the agent's queue:
//! `VERB succeeded: ...`, `VERB failed: ...`, or a raw prompt (human replies).
//! WAIT and FINISH succeed silently; the next prompt is whatever result
//! eventually arrives.

mod coder;
mod manager;
mod master;

use std::path::PathBuf;

use crate::agents::{AgentError, AgentId, AgentKind, AgentState, Scratch};
use crate::directive::{Directive, EphemeralKind, SpawnItem, Target};
use crate::human::HumanInterface;
use crate::project::ProjectContext;
use crate::task::Task;
use crate::tools::SandboxedExec;

/// Collaborators a turn may reach.
pub struct TurnEnv<'a> {
    pub project: &'a ProjectContext,
    pub exec: &'a dyn SandboxedExec,
    pub human: &'a dyn HumanInterface,
}

/// Cross-agent consequence of a directive, applied by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Hand `task` to an existing child
    Delegate { child: AgentId, task: Task },
    /// Start a helper agent working in `scratch`
    Spawn {
        id: AgentId,
        kind: EphemeralKind,
        prompt: String,
        scratch: Scratch,
    },
    /// Register a child for a freshly created file or folder
    Adopt {
        id: AgentId,
        kind: AgentKind,
        path: PathBuf,
    },
    /// Drop a child and its whole subtree
    Release { child: AgentId },
    /// Report the finished task to whoever delegated it
    Finish {
        task: Option<Task>,
        origin: Option<AgentId>,
        success: bool,
        payload: String,
    },
}

/// What a directive leaves on the queue.
#[derive(Debug)]
enum FollowUp {
    Silent,
    Succeeded(String),
    Prompt(String),
}

/// Successful outcome of one directive.
#[derive(Debug)]
struct Step {
    follow_up: FollowUp,
    effects: Vec<Effect>,
}

impl Step {
    fn silent() -> Self {
        Self {
            follow_up: FollowUp::Silent,
            effects: Vec::new(),
        }
    }

    fn succeeded(note: impl Into<String>) -> Self {
        Self {
            follow_up: FollowUp::Succeeded(note.into()),
            effects: Vec::new(),
        }
    }

    fn prompt(text: impl Into<String>) -> Self {
        Self {
            follow_up: FollowUp::Prompt(text.into()),
            effects: Vec::new(),
        }
    }

    fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Execute `directive` for `state`, queue its follow-up and return the effects.
pub async fn interpret(state: &mut AgentState, env: &TurnEnv<'_>, directive: Directive) -> Vec<Effect> {
    let verb = directive.verb();
    tracing::debug!("{} {} interpreting {}", state.kind, state.name, verb);

    let outcome = match directive {
        Directive::Coder(d) => coder::interpret(state, env, d).await,
        Directive::Manager(d) => manager::interpret(state, env, d).await,
        Directive::Master(d) => master::interpret(state, env, d).await,
    };

    match outcome {
        Ok(step) => {
            match step.follow_up {
                FollowUp::Silent => {}
                FollowUp::Succeeded(note) => state
                    .prompt_queue
                    .push_back(format!("{} succeeded: {}", verb, note)),
                FollowUp::Prompt(text) => state.prompt_queue.push_back(text),
            }
            step.effects
        }
        Err(e) => {
            tracing::info!("{} {}: {} failed: {}", state.kind, state.name, verb, e);
            state.prompt_queue.push_back(format!("{} failed: {}", verb, e));
            Vec::new()
        }
    }
}

fn not_found(action: &'static str, name: &str) -> AgentError {
    AgentError::io(
        action,
        name,
        std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
    )
}

/// READ: register files (or a folder's doc file) in memory.
fn read(state: &mut AgentState, env: &TurnEnv<'_>, targets: &[Target]) -> Result<Step, AgentError> {
    let base = state.base_dir(env.project);
    let mut resolved = Vec::with_capacity(targets.len());

    for target in targets {
        let path = env.project.resolve(&base, &target.name);
        if !env.project.in_project(&path) {
            return Err(AgentError::Permission(format!(
                "{} is outside the project",
                target.name
            )));
        }
        let path = if target.is_folder {
            if !path.is_dir() {
                return Err(not_found("read folder", &target.name));
            }
            let doc = env.project.doc_path(&path);
            if !doc.is_file() {
                return Err(not_found("read doc file of", &target.name));
            }
            doc
        } else {
            if !path.is_file() {
                return Err(not_found("read", &target.name));
            }
            path
        };
        resolved.push(path);
    }

    let names: Vec<String> = resolved
        .into_iter()
        .map(|path| {
            let name = env.project.display_name(&path);
            state.memory.insert(name.clone(), path);
            name
        })
        .collect();
    Ok(Step::succeeded(format!("added {} to memory", names.join(", "))))
}

/// RUN: allow-list check, then the sandboxed executor.
async fn run(state: &AgentState, env: &TurnEnv<'_>, command: &str) -> Result<Step, AgentError> {
    let config = env.project.config();
    if let Err(reason) = config.policy.check(command) {
        tracing::warn!("{} {} refused `{}`: {}", state.kind, state.name, command, reason);
        return Err(AgentError::Command(format!("Invalid command '{}'", command)));
    }

    let cwd = state.base_dir(env.project);
    tracing::info!("{} {} running `{}`", state.kind, state.name, command);
    let output = env
        .exec
        .run(command, &cwd, config.command_timeout)
        .await
        .map_err(|e| AgentError::Command(e.to_string()))?;

    if output.code == 0 {
        Ok(Step::succeeded(output.fold()))
    } else {
        Err(AgentError::Command(output.fold()))
    }
}

/// SPAWN: create one scratch-backed helper per item.
fn spawn(state: &mut AgentState, env: &TurnEnv<'_>, items: Vec<SpawnItem>) -> Result<Step, AgentError> {
    if state.kind.is_ephemeral() {
        return Err(AgentError::Permission(
            "ephemeral agents cannot spawn helpers".to_string(),
        ));
    }

    let mut effects = Vec::with_capacity(items.len());
    for item in items {
        let scratch = match state.kind {
            AgentKind::Coder => shared_scratch(state, env)?,
            _ => private_scratch(state, env)?,
        };
        let id = AgentId::new();
        state.active_ephemeral.insert(id);
        effects.push(Effect::Spawn {
            id,
            kind: item.kind,
            prompt: item.prompt,
            scratch,
        });
    }

    let count = effects.len();
    tracing::info!("{} {} spawned {} helper(s)", state.kind, state.name, count);
    Ok(Step::succeeded(format!("spawned {} agent(s)", count)).with_effects(effects))
}

/// Scratch file beside the coder's own file, created once and shared by its testers.
fn shared_scratch(state: &mut AgentState, env: &TurnEnv<'_>) -> Result<Scratch, AgentError> {
    let path = match &state.scratch {
        Some(scratch) => scratch.path.clone(),
        None => {
            let file = state
                .scope
                .file()
                .ok_or_else(|| AgentError::Permission("no file owned".to_string()))?;
            env.project.coder_scratch_path(file)
        }
    };
    if !path.exists() {
        std::fs::write(&path, "")
            .map_err(|e| AgentError::io("create", env.project.display_name(&path), e))?;
    }
    env.project.claim_scratch(&path);
    state.scratch = Some(Scratch {
        path: path.clone(),
        owned: true,
    });
    Ok(Scratch { path, owned: false })
}

/// Fresh numbered scratch file in the agent's directory, owned by the helper.
fn private_scratch(state: &AgentState, env: &TurnEnv<'_>) -> Result<Scratch, AgentError> {
    let path = env.project.next_scratch_path(&state.base_dir(env.project));
    std::fs::write(&path, "")
        .map_err(|e| AgentError::io("create", env.project.display_name(&path), e))?;
    env.project.claim_scratch(&path);
    Ok(Scratch { path, owned: true })
}

/// WAIT: idle until a child or helper reports.
fn wait(state: &AgentState) -> Result<Step, AgentError> {
    if state.has_active_work() {
        Ok(Step::silent())
    } else {
        Err(AgentError::Delegation("nothing to wait for".to_string()))
    }
}

/// FINISH for managers, coders and helpers: deactivate and report upwards.
fn finish(state: &mut AgentState, env: &TurnEnv<'_>, prompt: String) -> Result<Step, AgentError> {
    let origin = state.task_origin;
    let task = state.deactivate()?;

    release_scratch(state, env.project);

    let payload = if prompt.trim().is_empty() {
        format!("{} finished", env.project.display_name(&state.base_dir(env.project)))
    } else {
        prompt
    };
    Ok(Step::silent().with_effects([Effect::Finish {
        task,
        origin,
        success: true,
        payload,
    }]))
}

/// Remove the agent's scratch file if it owns it.
pub fn release_scratch(state: &mut AgentState, project: &ProjectContext) {
    if let Some(Scratch { path, owned: true }) = state.scratch.take() {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Removed scratch file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to remove scratch file {}: {}", path.display(), e);
                return;
            }
        }
        project.forget_scratch(&path);
    }
}

/// UPDATE_README / UPDATE_DOCUMENTATION: overwrite the doc file.
fn write_doc(state: &AgentState, env: &TurnEnv<'_>, content: &str) -> Result<Step, AgentError> {
    let doc = state
        .doc_path(env.project)
        .ok_or_else(|| AgentError::Permission("no doc file owned".to_string()))?;
    std::fs::write(&doc, content)
        .map_err(|e| AgentError::io("write", env.project.display_name(&doc), e))?;
    Ok(Step::succeeded(format!(
        "wrote {} bytes to {}",
        content.len(),
        env.project.display_name(&doc)
    )))
}
