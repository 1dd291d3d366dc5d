//! Per-agent mutable state.
//!
//! # Lifecycle
//! `Inactive -> Active(idle) -> Active(stalled) -> Active(idle) -> ... -> Inactive`
//!
//! # Invariants
//! - `stall == true` exactly while a turn (model call + interpretation) is in flight
//! - `deactivate()` never mutates anything when children or helpers are still active
//! - `context`, `memory` and `prompt_queue` only live for one activation

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{AgentError, AgentId, AgentKind, ContextEntry, Scope};
use crate::project::ProjectContext;
use crate::task::{Task, TaskId};

/// A named child in the tree, keyed by its entry name in the parent's directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChildLink {
    pub id: AgentId,
    pub kind: AgentKind,
}

/// Scratch file attached to a coder or a tester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scratch {
    pub path: PathBuf,
    /// Whether this agent removes the file when it is done with it
    pub owned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedTask {
    pub task_id: TaskId,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct AgentState {
    pub id: AgentId,
    pub kind: AgentKind,
    /// Display name relative to the project root
    pub name: String,
    pub scope: Scope,
    pub parent: Option<AgentId>,
    pub children: BTreeMap<String, ChildLink>,
    pub scratch: Option<Scratch>,

    pub prompt_queue: VecDeque<String>,
    pub stall: bool,
    pub context: Vec<ContextEntry>,
    /// Display name -> path; content is re-read on every turn
    pub memory: BTreeMap<String, PathBuf>,

    pub active_task: Option<Task>,
    /// Who delegated the active task; `None` for tasks from outside the tree
    pub task_origin: Option<AgentId>,
    /// Delegated child -> prompt it was given
    pub active_children: HashMap<AgentId, String>,
    pub active_ephemeral: HashSet<AgentId>,
    pub completed: Vec<CompletedTask>,

    pub last_activity: Instant,
    pub consecutive_errors: u32,
}

impl AgentState {
    pub fn new(kind: AgentKind, name: impl Into<String>, scope: Scope, parent: Option<AgentId>) -> Self {
        Self::with_id(AgentId::new(), kind, name, scope, parent)
    }

    /// Build a state for an id chosen ahead of time (agents adopted mid-turn).
    pub fn with_id(
        id: AgentId,
        kind: AgentKind,
        name: impl Into<String>,
        scope: Scope,
        parent: Option<AgentId>,
    ) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            scope,
            parent,
            children: BTreeMap::new(),
            scratch: None,
            prompt_queue: VecDeque::new(),
            stall: false,
            context: Vec::new(),
            memory: BTreeMap::new(),
            active_task: None,
            task_origin: None,
            active_children: HashMap::new(),
            active_ephemeral: HashSet::new(),
            completed: Vec::new(),
            last_activity: Instant::now(),
            consecutive_errors: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_task.is_some()
    }

    /// Whether any delegated child or spawned helper has not reported back yet.
    pub fn has_active_work(&self) -> bool {
        !self.active_children.is_empty() || !self.active_ephemeral.is_empty()
    }

    /// Directory relative paths resolve against.
    pub fn base_dir(&self, project: &ProjectContext) -> PathBuf {
        match &self.scope {
            Scope::Project => project.root().to_path_buf(),
            Scope::Dir(dir) => dir.clone(),
            Scope::File(file) => file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| project.root().to_path_buf()),
        }
    }

    /// Durable note file: directory doc for managers, project documentation for the master.
    pub fn doc_path(&self, project: &ProjectContext) -> Option<PathBuf> {
        match (&self.kind, &self.scope) {
            (AgentKind::Master, _) => Some(project.master_doc_path()),
            (AgentKind::Manager, Scope::Dir(dir)) => Some(project.doc_path(dir)),
            _ => None,
        }
    }

    pub fn child_by_id(&self, id: AgentId) -> Option<(&str, &ChildLink)> {
        self.children
            .iter()
            .find(|(_, link)| link.id == id)
            .map(|(name, link)| (name.as_str(), link))
    }

    /// Record refreshed activity (watchdog input).
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Queue a prompt. Returns whether a turn may start right away.
    pub fn enqueue(&mut self, prompt: impl Into<String>) -> bool {
        self.prompt_queue.push_back(prompt.into());
        !self.stall
    }

    pub fn activate(&mut self, task: Task, origin: Option<AgentId>) {
        tracing::info!("{} {} activated: {}", self.kind, self.name, task.text());
        self.active_task = Some(task);
        self.task_origin = origin;
        self.consecutive_errors = 0;
        self.touch();
    }

    /// End the active task and wipe short-term state.
    ///
    /// # Errors
    /// `AgentError::Delegation` while children or helpers are active; nothing
    /// is modified in that case.
    pub fn deactivate(&mut self) -> Result<Option<Task>, AgentError> {
        if !self.active_children.is_empty() {
            return Err(AgentError::Delegation(format!(
                "{} child agent(s) still active",
                self.active_children.len()
            )));
        }
        if !self.active_ephemeral.is_empty() {
            return Err(AgentError::Delegation(format!(
                "{} ephemeral agent(s) still active",
                self.active_ephemeral.len()
            )));
        }

        let task = self.active_task.take();
        if let Some(task) = &task {
            self.completed.push(CompletedTask {
                task_id: task.id(),
                finished_at: Utc::now(),
            });
        }
        self.task_origin = None;
        self.memory.clear();
        self.context.clear();
        self.prompt_queue.clear();
        self.consecutive_errors = 0;
        tracing::info!("{} {} deactivated", self.kind, self.name);
        Ok(task)
    }
}

/// Read-only view of an agent, safe to hand out while turns run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub kind: AgentKind,
    pub name: String,
    pub parent: Option<AgentId>,
    pub children: Vec<String>,
    pub stall: bool,
    pub active: bool,
    pub prompt_queue: Vec<String>,
    pub context: Vec<ContextEntry>,
    pub memory: Vec<String>,
    pub active_children: Vec<AgentId>,
    pub active_ephemeral: Vec<AgentId>,
    pub completed: Vec<CompletedTask>,
}

impl From<&AgentState> for AgentSnapshot {
    fn from(state: &AgentState) -> Self {
        Self {
            id: state.id,
            kind: state.kind,
            name: state.name.clone(),
            parent: state.parent,
            children: state.children.keys().cloned().collect(),
            stall: state.stall,
            active: state.is_active(),
            prompt_queue: state.prompt_queue.iter().cloned().collect(),
            context: state.context.clone(),
            memory: state.memory.keys().cloned().collect(),
            active_children: state.active_children.keys().copied().collect(),
            active_ephemeral: state.active_ephemeral.iter().copied().collect(),
            completed: state.completed.clone(),
        }
    }
}
