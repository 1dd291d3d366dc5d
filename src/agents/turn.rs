//! One agent turn, split around the model call.
//!
//! [`begin`] sets `stall` and renders the prompt; the caller talks to the model
//! without holding the state lock; [`complete`] records the exchange,
//! interprets the response and clears `stall` again.

use super::state::AgentState;
use super::types::{ContextEntry, Scope};
use crate::directive::Directive;
use crate::interpret::{self, Effect, TurnEnv};
use crate::project::ProjectContext;
use crate::prompt::{grammar, FileView, PromptError, PromptRenderer, PromptVars};
use crate::util::build_history_context;

/// Rendered input for one model call.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Queued prompts joined, recorded in the context after the call
    pub prompt: String,
    pub system: String,
    pub user: String,
}

/// Start a turn if prompts are queued.
///
/// # Errors
/// Template failures; `stall` stays untouched in that case.
pub fn begin(
    state: &mut AgentState,
    project: &ProjectContext,
    renderer: &dyn PromptRenderer,
) -> Result<Option<TurnRequest>, PromptError> {
    if state.prompt_queue.is_empty() {
        return Ok(None);
    }

    let prompt = state
        .prompt_queue
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n");
    let vars = prompt_vars(state, project, prompt.clone());
    let system = renderer.render("system", &vars)?;
    let user = renderer.render(state.kind.template(), &vars)?;

    state.stall = true;
    tracing::debug!("{} {} turn started", state.kind, state.name);
    Ok(Some(TurnRequest {
        prompt,
        system,
        user,
    }))
}

/// Finish a turn with the model's `response`.
///
/// The queue is cleared before interpretation, so it ends up holding exactly
/// the follow-up of this turn (one `PARSING FAILED` entry on malformed text).
pub async fn complete(
    state: &mut AgentState,
    env: &TurnEnv<'_>,
    prompt: String,
    response: String,
) -> Vec<Effect> {
    state.context.push(ContextEntry {
        prompt,
        response: response.clone(),
    });
    state.prompt_queue.clear();

    let effects = match Directive::parse(state.kind.dialect(), &response) {
        Ok(directive) => interpret::interpret(state, env, directive).await,
        Err(e) => {
            tracing::warn!("{} {} sent a malformed directive: {}", state.kind, state.name, e);
            state.prompt_queue.push_back(format!("PARSING FAILED: {}", e));
            Vec::new()
        }
    };

    state.stall = false;
    tracing::debug!("{} {} turn finished", state.kind, state.name);
    effects
}

/// Assemble the template variables for `state`.
///
/// Files are read fresh on every turn; vanished files show as `<missing>`.
pub fn prompt_vars(state: &AgentState, project: &ProjectContext, prompt: String) -> PromptVars {
    let own_file = match &state.scope {
        Scope::File(path) => Some(view(project, path)),
        _ => None,
    };
    let doc = state.doc_path(project).map(|path| view(project, &path));
    let memory = state
        .memory
        .iter()
        .map(|(name, path)| FileView {
            name: name.clone(),
            content: read_or_missing(path),
        })
        .collect();
    let children = state
        .children
        .iter()
        .map(|(name, link)| match link.kind {
            super::AgentKind::Manager => format!("FOLDER \"{}\"", name),
            _ => format!("FILE \"{}\"", name),
        })
        .collect();
    let history: Vec<(String, String)> = state
        .context
        .iter()
        .map(|entry| (entry.prompt.clone(), entry.response.clone()))
        .collect();

    let config = project.config();
    PromptVars {
        role: grammar::role(state.kind, &state.name),
        grammar: grammar::grammar(state.kind).to_string(),
        examples: grammar::examples(state.kind).to_string(),
        task: state.active_task.as_ref().map(|t| t.text().to_string()),
        own_file,
        doc,
        memory,
        children,
        tree: project.tree_listing(&state.base_dir(project), config.max_tree_depth),
        prompt,
        context: build_history_context(&history, config.max_context_chars),
    }
}

fn view(project: &ProjectContext, path: &std::path::Path) -> FileView {
    FileView {
        name: project.display_name(path),
        content: read_or_missing(path),
    }
}

fn read_or_missing(path: &std::path::Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|_| "<missing>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;
    use crate::prompt::TemplateRenderer;
    use crate::task::Task;
    use crate::test_support::{project_in, RecordingExec, ScriptedHuman};

    #[tokio::test]
    async fn malformed_response_queues_one_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "original").unwrap();
        let project = project_in(dir.path());
        let renderer = TemplateRenderer::new().unwrap();
        let exec = RecordingExec::new();
        let human = ScriptedHuman::new(Vec::<String>::new());
        let env = TurnEnv {
            project: &project,
            exec: &exec,
            human: &human,
        };

        let mut state = AgentState::new(
            AgentKind::Coder,
            "a.py",
            Scope::File(project.root().join("a.py")),
            None,
        );
        state.activate(Task::new("fix it"), None);
        state.enqueue("fix it");
        state.enqueue("and hurry");

        let request = begin(&mut state, &project, &renderer).unwrap().unwrap();
        assert!(state.stall);
        assert_eq!(request.prompt, "fix it\n\nand hurry");
        assert!(request.user.contains("original"));

        let effects = complete(
            &mut state,
            &env,
            request.prompt,
            "CHANGE CONTENT=\"never closed".into(),
        )
        .await;

        assert!(effects.is_empty());
        assert!(!state.stall);
        assert_eq!(state.prompt_queue.len(), 1);
        assert!(state.prompt_queue[0].starts_with("PARSING FAILED: "));
        assert_eq!(state.context.len(), 1);
        assert_eq!(
            std::fs::read_to_string(project.root().join("a.py")).unwrap(),
            "original"
        );
        assert!(exec.commands().is_empty());
    }

    #[test]
    fn empty_queue_starts_no_turn() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_in(dir.path());
        let renderer = TemplateRenderer::new().unwrap();
        let mut state = AgentState::new(
            AgentKind::Manager,
            ".",
            Scope::Dir(project.root().to_path_buf()),
            None,
        );
        assert!(begin(&mut state, &project, &renderer).unwrap().is_none());
        assert!(!state.stall);
    }

    #[test]
    fn memory_is_read_fresh_every_turn() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.py"), "v1").unwrap();
        let project = project_in(dir.path());
        let mut state = AgentState::new(
            AgentKind::Manager,
            ".",
            Scope::Dir(project.root().to_path_buf()),
            None,
        );
        state.memory.insert("b.py".into(), project.root().join("b.py"));

        let vars = prompt_vars(&state, &project, String::new());
        assert_eq!(vars.memory[0].content, "v1");

        std::fs::write(project.root().join("b.py"), "v2").unwrap();
        let vars = prompt_vars(&state, &project, String::new());
        assert_eq!(vars.memory[0].content, "v2");

        std::fs::remove_file(project.root().join("b.py")).unwrap();
        let vars = prompt_vars(&state, &project, String::new());
        assert_eq!(vars.memory[0].content, "<missing>");
        assert!(vars.doc.is_some());
    }
}
