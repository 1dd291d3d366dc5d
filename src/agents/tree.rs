//! Agent tree construction.
//!
//! The tree is an arena: every [`AgentState`] lives in one map keyed by
//! [`AgentId`], and parent/child relations are stored as ids.
//!
//! # Invariants
//! - Exactly one root manager, owning the project root directory
//! - Every directory is a manager, every regular file a coder
//! - Doc files, engine-created scratch files and ignored entries never become agents
//! - No cycles in parent-child relationships

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use walkdir::WalkDir;

use super::state::{AgentState, ChildLink};
use super::types::{AgentId, AgentKind, Scope};
use crate::llm::LlmClient;
use crate::project::ProjectContext;

/// The agent arena produced at bootstrap, before the engine takes over.
pub struct AgentTree {
    agents: HashMap<AgentId, AgentState>,
    clients: HashMap<AgentId, Arc<dyn LlmClient>>,
    default_client: Arc<dyn LlmClient>,
    root_id: AgentId,
}

impl AgentTree {
    /// Build one agent per directory and file below the project root.
    ///
    /// Missing doc files are created empty on the way.
    ///
    /// # Errors
    /// Walk failures and doc file creation failures.
    pub fn build(project: &ProjectContext, client: Arc<dyn LlmClient>) -> Result<Self, TreeError> {
        let root_dir = project.root().to_path_buf();
        ensure_doc(project, &root_dir)?;

        let root = AgentState::new(
            AgentKind::Manager,
            project.display_name(&root_dir),
            Scope::Dir(root_dir.clone()),
            None,
        );
        let root_id = root.id;

        let mut agents = HashMap::new();
        let mut dirs: HashMap<PathBuf, AgentId> = HashMap::new();
        agents.insert(root_id, root);
        dirs.insert(root_dir.clone(), root_id);

        let walker = WalkDir::new(&root_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || (!ProjectContext::is_ignored(e.path()) && !project.is_scratch(e.path()))
            });

        for entry in walker {
            let entry = entry?;
            let path = entry.path().to_path_buf();
            let is_dir = entry.file_type().is_dir();
            if !is_dir && (!entry.file_type().is_file() || project.is_doc_file(&path)) {
                continue;
            }

            let Some(parent_id) = path.parent().and_then(|p| dirs.get(p)).copied() else {
                continue;
            };

            let (kind, scope) = if is_dir {
                ensure_doc(project, &path)?;
                (AgentKind::Manager, Scope::Dir(path.clone()))
            } else {
                (AgentKind::Coder, Scope::File(path.clone()))
            };

            let state = AgentState::new(kind, project.display_name(&path), scope, Some(parent_id));
            let id = state.id;
            let entry_name = entry.file_name().to_string_lossy().to_string();
            if let Some(parent) = agents.get_mut(&parent_id) {
                parent.children.insert(entry_name, ChildLink { id, kind });
            }
            if is_dir {
                dirs.insert(path, id);
            }
            agents.insert(id, state);
        }

        tracing::info!(
            "Built agent tree for {}: {} agents",
            root_dir.display(),
            agents.len()
        );

        Ok(Self {
            agents,
            clients: HashMap::new(),
            default_client: client,
            root_id,
        })
    }

    pub fn root_id(&self) -> AgentId {
        self.root_id
    }

    pub fn get(&self, id: &AgentId) -> Option<&AgentState> {
        self.agents.get(id)
    }

    /// Look up an agent by display name (`.` for the root, `pkg/a.py` otherwise).
    pub fn find(&self, name: &str) -> Option<AgentId> {
        self.agents
            .values()
            .find(|state| state.name == name)
            .map(|state| state.id)
    }

    /// Display name -> id for every agent.
    pub fn lookup(&self) -> HashMap<String, AgentId> {
        self.agents
            .values()
            .map(|state| (state.name.clone(), state.id))
            .collect()
    }

    /// Give one agent its own model client.
    pub fn set_client(&mut self, id: AgentId, client: Arc<dyn LlmClient>) -> Result<(), TreeError> {
        if !self.agents.contains_key(&id) {
            return Err(TreeError::AgentNotFound(id));
        }
        self.clients.insert(id, client);
        Ok(())
    }

    pub fn client(&self, id: &AgentId) -> Arc<dyn LlmClient> {
        self.clients
            .get(id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_client))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Hand every agent over with its client, root first.
    pub(crate) fn into_parts(mut self) -> (AgentId, Vec<(AgentState, Arc<dyn LlmClient>)>) {
        let mut parts = Vec::with_capacity(self.agents.len());
        if let Some(root) = self.agents.remove(&self.root_id) {
            let client = self.client(&self.root_id);
            parts.push((root, client));
        }
        let ids: Vec<AgentId> = self.agents.keys().copied().collect();
        for id in ids {
            let client = self.client(&id);
            if let Some(state) = self.agents.remove(&id) {
                parts.push((state, client));
            }
        }
        (self.root_id, parts)
    }
}

fn ensure_doc(project: &ProjectContext, dir: &std::path::Path) -> Result<(), TreeError> {
    project.ensure_doc(dir).map(|_| ()).map_err(|source| TreeError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Errors in tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("Failed to walk project: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent not found in tree: {0}")]
    AgentNotFound(AgentId),
}
