//! Engine: per-agent supervisors over the agent arena.
//!
//! Every agent gets an unbounded inbox and one supervising task. The
//! supervisor hands envelopes to the agent's prompter, then runs turns while
//! prompts are queued, draining the inbox between turns. Turns of one agent
//! are sequential by construction; different agents interleave freely.
//!
//! Tasks sent from outside the tree (`run_prompt`) are awaited through a
//! pending-result map of oneshot senders keyed by task id.

mod prompter;
mod watchdog;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::agents::turn;
use crate::agents::{AgentId, AgentKind, AgentSnapshot, AgentState, AgentTree, ChildLink, Scope};
use crate::directive::quote;
use crate::human::{is_session_end, HumanInterface};
use crate::interpret::{self, Effect, TurnEnv};
use crate::llm::{compose_request, ChatMessage, LlmClient, LlmError};
use crate::project::ProjectContext;
use crate::prompt::PromptRenderer;
use crate::task::{Envelope, ResultMessage, Task, TaskId, TaskMessage};
use crate::tools::SandboxedExec;

use watchdog::Watched;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Agent {0} is already working on a task")]
    Busy(String),

    #[error("A master agent is already attached")]
    MasterAttached,

    #[error("Engine shut down before the task finished")]
    ShutDown,

    #[error("{agent} failed: {payload}")]
    TaskFailed { agent: String, payload: String },
}

/// Collaborators shared by every agent.
#[derive(Clone)]
pub struct Services {
    pub exec: Arc<dyn SandboxedExec>,
    pub human: Arc<dyn HumanInterface>,
    pub renderer: Arc<dyn PromptRenderer>,
}

#[derive(Clone)]
struct Slot {
    state: Arc<Mutex<AgentState>>,
    llm: Arc<dyn LlmClient>,
    inbox: mpsc::UnboundedSender<Envelope>,
}

enum TurnOutcome {
    /// A turn ran; more prompts may be queued
    Ran,
    /// Nothing left to do until the next envelope
    Idle,
    /// The agent is gone (ephemeral after FINISH)
    Retired,
    Cancelled,
}

struct Shared {
    project: Arc<ProjectContext>,
    services: Services,
    slots: RwLock<HashMap<AgentId, Slot>>,
    /// Tasks from outside the tree awaiting their result
    pending: Mutex<HashMap<TaskId, oneshot::Sender<ResultMessage>>>,
    root: AgentId,
    master: RwLock<Option<AgentId>>,
    cancel: CancellationToken,
}

/// Handle to a running agent tree. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Shared>,
}

impl Engine {
    /// Move every agent of `tree` behind a supervisor.
    pub async fn launch(project: Arc<ProjectContext>, tree: AgentTree, services: Services) -> Self {
        let (root, parts) = tree.into_parts();
        let engine = Self {
            inner: Arc::new(Shared {
                project,
                services,
                slots: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                root,
                master: RwLock::new(None),
                cancel: CancellationToken::new(),
            }),
        };

        let count = parts.len();
        for (state, llm) in parts {
            engine.register(state, llm).await;
        }
        tracing::info!("Engine launched with {} agents", count);
        engine
    }

    pub fn root_id(&self) -> AgentId {
        self.inner.root
    }

    pub async fn master_id(&self) -> Option<AgentId> {
        *self.inner.master.read().await
    }

    pub fn project(&self) -> &ProjectContext {
        &self.inner.project
    }

    /// Number of live agents, helpers included.
    pub async fn len(&self) -> usize {
        self.inner.slots.read().await.len()
    }

    pub async fn snapshot(&self, id: AgentId) -> Option<AgentSnapshot> {
        let slot = self.slot(id).await?;
        let state = slot.state.lock().await;
        Some(AgentSnapshot::from(&*state))
    }

    /// Snapshots of every live agent, sorted by name.
    pub async fn snapshots(&self) -> Vec<AgentSnapshot> {
        let slots: Vec<Slot> = self.inner.slots.read().await.values().cloned().collect();
        let mut all = join_all(slots.iter().map(|slot| async move {
            let state = slot.state.lock().await;
            AgentSnapshot::from(&*state)
        }))
        .await;
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Look up an agent by display name.
    pub async fn find(&self, name: &str) -> Option<AgentId> {
        self.snapshots()
            .await
            .into_iter()
            .find(|snapshot| snapshot.name == name)
            .map(|snapshot| snapshot.id)
    }

    /// Queue a plain prompt for `agent` without a task attached.
    pub async fn send_prompt(&self, agent: AgentId, text: impl Into<String>) -> Result<(), EngineError> {
        if self.send(agent, Envelope::prompt(text)).await {
            Ok(())
        } else {
            Err(EngineError::UnknownAgent(agent))
        }
    }

    /// Hand `text` to `agent` as a task from outside the tree and wait for its result.
    ///
    /// # Errors
    /// Unknown or busy agents, shutdown, and tasks that finished unsuccessfully.
    pub async fn run_prompt(&self, agent: AgentId, text: impl Into<String>) -> Result<String, EngineError> {
        let slot = self.slot(agent).await.ok_or(EngineError::UnknownAgent(agent))?;
        {
            let state = slot.state.lock().await;
            if state.is_active() {
                return Err(EngineError::Busy(state.name.clone()));
            }
        }

        let task = Task::new(text);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(task.id(), tx);
        tracing::info!("Submitting task {} to {}", task.id(), agent);

        let envelope = Envelope::task(TaskMessage {
            sender: None,
            recipient: agent,
            task,
        });
        if slot.inbox.send(envelope).is_err() {
            return Err(EngineError::ShutDown);
        }
        drop(slot);

        let result = tokio::select! {
            _ = self.inner.cancel.cancelled() => return Err(EngineError::ShutDown),
            result = rx => result.map_err(|_| EngineError::ShutDown)?,
        };
        if result.success {
            Ok(result.payload)
        } else {
            Err(EngineError::TaskFailed {
                agent: result.sender_name,
                payload: result.payload,
            })
        }
    }

    /// Add a master above the root manager, sharing the root's model client.
    pub async fn attach_master(&self) -> Result<AgentId, EngineError> {
        let root = self
            .slot(self.inner.root)
            .await
            .ok_or(EngineError::UnknownAgent(self.inner.root))?;
        self.attach_master_with(root.llm.clone()).await
    }

    pub async fn attach_master_with(&self, llm: Arc<dyn LlmClient>) -> Result<AgentId, EngineError> {
        let mut master = self.inner.master.write().await;
        if master.is_some() {
            return Err(EngineError::MasterAttached);
        }
        let root_id = self.inner.root;
        let root = self.slot(root_id).await.ok_or(EngineError::UnknownAgent(root_id))?;

        let mut state = AgentState::new(AgentKind::Master, "master", Scope::Project, None);
        let root_name = {
            let mut root_state = root.state.lock().await;
            root_state.parent = Some(state.id);
            root_state.name.clone()
        };
        state.children.insert(
            root_name,
            ChildLink {
                id: root_id,
                kind: AgentKind::Manager,
            },
        );

        let doc = self.inner.project.master_doc_path();
        if !doc.exists() {
            if let Err(e) = std::fs::write(&doc, "") {
                tracing::warn!("Failed to create {}: {}", doc.display(), e);
            }
        }

        let id = state.id;
        self.register(state, llm).await;
        *master = Some(id);
        tracing::info!("Master {} attached above {}", id, root_id);
        Ok(id)
    }

    /// Stop every supervisor and fail pending `run_prompt` calls.
    pub fn shutdown(&self) {
        tracing::info!("Engine shutting down");
        self.inner.cancel.cancel();
    }

    async fn slot(&self, id: AgentId) -> Option<Slot> {
        self.inner.slots.read().await.get(&id).cloned()
    }

    async fn send(&self, target: AgentId, envelope: Envelope) -> bool {
        match self.inner.slots.read().await.get(&target) {
            Some(slot) => slot.inbox.send(envelope).is_ok(),
            None => false,
        }
    }

    async fn register(&self, state: AgentState, llm: Arc<dyn LlmClient>) {
        let id = state.id;
        tracing::debug!("Registering {} {} ({})", state.kind, state.name, id);
        let (tx, rx) = mpsc::unbounded_channel();
        let slot = Slot {
            state: Arc::new(Mutex::new(state)),
            llm,
            inbox: tx,
        };
        self.inner.slots.write().await.insert(id, slot);
        tokio::spawn(supervise(self.clone(), id, rx));
    }

    /// Hand envelopes to the prompter until the inbox is empty.
    async fn deliver(
        &self,
        slot: &Slot,
        first: Option<Envelope>,
        inbox: &mut mpsc::UnboundedReceiver<Envelope>,
    ) -> bool {
        let mut state = slot.state.lock().await;
        let mut ready = false;
        if let Some(envelope) = first {
            ready |= prompter::receive(&mut state, envelope);
        }
        while let Ok(envelope) = inbox.try_recv() {
            ready |= prompter::receive(&mut state, envelope);
        }
        ready || !state.prompt_queue.is_empty()
    }

    async fn run_turn(&self, id: AgentId, slot: &Slot) -> TurnOutcome {
        let project = &self.inner.project;
        let config = project.config();

        let (request, kind) = {
            let mut state = slot.state.lock().await;
            match turn::begin(&mut state, project, self.inner.services.renderer.as_ref()) {
                Ok(Some(request)) => (request, state.kind),
                Ok(None) => return TurnOutcome::Idle,
                Err(e) => {
                    tracing::error!("{} {}: failed to render prompt: {}", state.kind, state.name, e);
                    drop(state);
                    return self.turn_failed(id, slot, e.to_string()).await;
                }
            }
        };

        let (messages, system) = compose_request(slot.llm.as_ref(), &request.system, &request.user);
        let call = slot.llm.generate(&messages, system.as_deref());
        let watched = async {
            if kind == AgentKind::Master {
                watchdog::watch(&slot.state, config.watchdog_interval, call).await
            } else {
                Watched::Done(call.await)
            }
        };
        let result = tokio::select! {
            _ = self.inner.cancel.cancelled() => return TurnOutcome::Cancelled,
            watched = watched => match watched {
                Watched::Done(result) => result,
                Watched::Expired => return self.watchdog_expired(id, slot).await,
            },
        };

        let response = match result {
            Ok(text) => text,
            Err(e) if e.is_provider_signature() => {
                tracing::warn!(
                    "Agent {}: provider refused the turn ({}), backing off {:?}",
                    id,
                    e,
                    config.provider_backoff
                );
                tokio::select! {
                    _ = self.inner.cancel.cancelled() => return TurnOutcome::Cancelled,
                    _ = tokio::time::sleep(config.provider_backoff) => {}
                }
                provider_finish(&e)
            }
            Err(e) => {
                tracing::warn!("Agent {}: model call failed: {}", id, e);
                return self.turn_failed(id, slot, e.to_string()).await;
            }
        };

        let effects = {
            let mut state = slot.state.lock().await;
            state.consecutive_errors = 0;
            let env = TurnEnv {
                project,
                exec: self.inner.services.exec.as_ref(),
                human: self.inner.services.human.as_ref(),
            };
            turn::complete(&mut state, &env, request.prompt, response).await
        };
        self.apply(id, slot, effects).await
    }

    /// Requeue a failed turn as an error prompt, or give up after too many.
    async fn turn_failed(&self, id: AgentId, slot: &Slot, error: String) -> TurnOutcome {
        let max = self.inner.project.config().max_consecutive_errors;
        let mut state = slot.state.lock().await;
        state.stall = false;
        state.consecutive_errors += 1;

        if state.consecutive_errors < max {
            state.prompt_queue.push_back(format!("ERROR: {}", error));
            return TurnOutcome::Ran;
        }

        tracing::error!(
            "{} {} giving up after {} failed turns: {}",
            state.kind,
            state.name,
            state.consecutive_errors,
            error
        );
        state.prompt_queue.clear();
        let origin = state.task_origin;
        match state.deactivate() {
            Ok(task) => {
                interpret::release_scratch(&mut state, &self.inner.project);
                drop(state);
                let effects = vec![Effect::Finish {
                    task,
                    origin,
                    success: false,
                    payload: format!("gave up after {} failed turns: {}", max, error),
                }];
                self.apply(id, slot, effects).await
            }
            Err(e) => {
                tracing::warn!("{} {} cannot stop yet: {}", state.kind, state.name, e);
                TurnOutcome::Idle
            }
        }
    }

    /// The watchdog reset an idle master: ask the human how to continue.
    ///
    /// A reply becomes the next prompt. An ending reply, or a failed ask,
    /// closes the master's task with a failed result so `run_prompt` returns.
    async fn watchdog_expired(&self, id: AgentId, slot: &Slot) -> TurnOutcome {
        let interval = self.inner.project.config().watchdog_interval;
        let question = format!(
            "The master was reset after {:?} without activity. \
            Reply with a new prompt, or `exit` to stop.",
            interval
        );
        let reply = tokio::select! {
            _ = self.inner.cancel.cancelled() => return TurnOutcome::Cancelled,
            reply = self.inner.services.human.ask(&question) => reply,
        };

        let mut state = slot.state.lock().await;
        match reply {
            Ok(reply) if !is_session_end(&reply) => {
                state.touch();
                state.prompt_queue.push_back(reply);
                return TurnOutcome::Ran;
            }
            Ok(_) => tracing::info!("Human ended the master session after a watchdog reset"),
            Err(e) => tracing::error!("Could not reach the human after a watchdog reset: {}", e),
        }

        let origin = state.task_origin;
        match state.deactivate() {
            Ok(task) => {
                drop(state);
                let effects = vec![Effect::Finish {
                    task,
                    origin,
                    success: false,
                    payload: format!("master reset after {:?} without activity", interval),
                }];
                self.apply(id, slot, effects).await
            }
            Err(e) => {
                tracing::warn!("{} {} cannot stop yet: {}", state.kind, state.name, e);
                TurnOutcome::Idle
            }
        }
    }

    async fn apply(&self, id: AgentId, slot: &Slot, effects: Vec<Effect>) -> TurnOutcome {
        let mut outcome = TurnOutcome::Ran;
        for effect in effects {
            match effect {
                Effect::Delegate { child, task } => {
                    let envelope = Envelope::task(TaskMessage {
                        sender: Some(id),
                        recipient: child,
                        task,
                    });
                    if !self.send(child, envelope).await {
                        tracing::warn!("Agent {}: delegation target {} is gone", id, child);
                        let mut state = slot.state.lock().await;
                        state.active_children.remove(&child);
                        state.enqueue("DELEGATE failed: the child agent no longer exists");
                    }
                }
                Effect::Spawn {
                    id: helper,
                    kind,
                    prompt,
                    scratch,
                } => {
                    let name = format!(
                        "{}:{}",
                        kind.as_str().to_lowercase(),
                        self.inner.project.display_name(&scratch.path)
                    );
                    let mut state = AgentState::with_id(
                        helper,
                        AgentKind::Ephemeral(kind),
                        name,
                        Scope::File(scratch.path.clone()),
                        Some(id),
                    );
                    state.scratch = Some(scratch);
                    self.register(state, slot.llm.clone()).await;
                    self.send(
                        helper,
                        Envelope::task(TaskMessage {
                            sender: Some(id),
                            recipient: helper,
                            task: Task::new(prompt),
                        }),
                    )
                    .await;
                }
                Effect::Adopt {
                    id: child,
                    kind,
                    path,
                } => {
                    let scope = match kind {
                        AgentKind::Manager => Scope::Dir(path.clone()),
                        _ => Scope::File(path.clone()),
                    };
                    let name = self.inner.project.display_name(&path);
                    let state = AgentState::with_id(child, kind, name, scope, Some(id));
                    self.register(state, slot.llm.clone()).await;
                }
                Effect::Release { child } => self.release(child).await,
                Effect::Finish {
                    task,
                    origin,
                    success,
                    payload,
                } => {
                    let (kind, name) = {
                        let state = slot.state.lock().await;
                        (state.kind, state.name.clone())
                    };
                    if kind == AgentKind::Manager && self.inner.project.config().refresh_docs {
                        self.refresh_doc(slot, task.as_ref(), &payload).await;
                    }
                    if kind.is_ephemeral() {
                        self.inner.slots.write().await.remove(&id);
                        tracing::info!("{} {} retired", kind, name);
                        outcome = TurnOutcome::Retired;
                    }
                    match task {
                        Some(task) => {
                            self.route(ResultMessage {
                                sender: id,
                                sender_name: name.clone(),
                                recipient: origin,
                                task,
                                success,
                                payload,
                            })
                            .await
                        }
                        None => tracing::debug!("{} {} finished without a task", kind, name),
                    }
                }
            }
        }
        outcome
    }

    /// Deliver a result to the delegating agent or to a pending `run_prompt`.
    async fn route(&self, result: ResultMessage) {
        match result.recipient {
            Some(parent) => {
                let sender = result.sender_name.clone();
                if !self.send(parent, Envelope::result(result)).await {
                    tracing::warn!("Result of {} dropped: agent {} is gone", sender, parent);
                }
            }
            None => {
                let waiter = self.inner.pending.lock().await.remove(&result.task.id());
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => tracing::info!(
                        "{} finished task {} with nobody waiting: {}",
                        result.sender_name,
                        result.task.id(),
                        result.payload
                    ),
                }
            }
        }
    }

    /// Remove `child` and its whole subtree. Dropped inboxes end the supervisors.
    async fn release(&self, child: AgentId) {
        let mut pending = vec![child];
        let mut subtree = Vec::new();
        while let Some(id) = pending.pop() {
            let Some(slot) = self.slot(id).await else {
                continue;
            };
            let state = slot.state.lock().await;
            pending.extend(state.children.values().map(|link| link.id));
            pending.extend(state.active_ephemeral.iter().copied());
            subtree.push(id);
        }

        let mut slots = self.inner.slots.write().await;
        for id in &subtree {
            slots.remove(id);
        }
        tracing::info!("Released {} agent(s) under {}", subtree.len(), child);
    }

    /// Best-effort rewrite of a manager's doc file after a finished task.
    async fn refresh_doc(&self, slot: &Slot, task: Option<&Task>, outcome: &str) {
        let project = &self.inner.project;
        let (doc, vars) = {
            let state = slot.state.lock().await;
            let Some(doc) = state.doc_path(project) else {
                return;
            };
            let mut vars = turn::prompt_vars(&state, project, outcome.to_string());
            vars.task = task.map(|t| t.text().to_string());
            (doc, vars)
        };

        let text = match self.inner.services.renderer.render("doc_update", &vars) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Skipping doc refresh of {}: {}", doc.display(), e);
                return;
            }
        };
        let messages = [ChatMessage::user(text)];
        let response = tokio::select! {
            _ = self.inner.cancel.cancelled() => return,
            response = slot.llm.generate(&messages, None) => response,
        };
        match response {
            Ok(content) => {
                if let Err(e) = std::fs::write(&doc, content.trim()) {
                    tracing::warn!("Failed to write {}: {}", doc.display(), e);
                } else {
                    tracing::debug!("Refreshed {}", doc.display());
                }
            }
            Err(e) => tracing::warn!("Doc refresh of {} failed: {}", doc.display(), e),
        }
    }
}

/// Synthetic response substituted for a turn the provider refused.
fn provider_finish(error: &LlmError) -> String {
    format!(
        "FINISH PROMPT={}",
        quote(&format!(
            "Stopped early: the model provider refused the request ({}). Re-prompt me to continue.",
            error.kind
        ))
    )
}

/// Supervising task of one agent, boxed since supervisors spawn supervisors.
fn supervise(
    engine: Engine,
    id: AgentId,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
) -> BoxFuture<'static, ()> {
    async move {
        let cancel = engine.inner.cancel.clone();
        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => break,
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            let Some(slot) = engine.slot(id).await else {
                break;
            };

            let mut ready = engine.deliver(&slot, Some(envelope), &mut inbox).await;
            while ready {
                match engine.run_turn(id, &slot).await {
                    TurnOutcome::Ran => ready = engine.deliver(&slot, None, &mut inbox).await,
                    TurnOutcome::Idle => ready = false,
                    TurnOutcome::Retired | TurnOutcome::Cancelled => return,
                }
            }
        }
        tracing::debug!("Supervisor of {} stopped", id);
    }
    .boxed()
}
