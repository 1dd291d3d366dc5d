//! Master dialect: the agent between the human and the root manager.

use super::{read, run, spawn, wait, write_doc, Effect, Step, TurnEnv};
use crate::agents::{AgentError, AgentState};
use crate::directive::MasterDirective;
use crate::human::is_session_end;
use crate::task::Task;

pub(super) async fn interpret(
    state: &mut AgentState,
    env: &TurnEnv<'_>,
    directive: MasterDirective,
) -> Result<Step, AgentError> {
    match directive {
        MasterDirective::Read { targets } => {
            state.touch();
            read(state, env, &targets)
        }
        MasterDirective::Delegate { prompt } => {
            state.touch();
            delegate(state, prompt)
        }
        MasterDirective::Spawn { items } => {
            state.touch();
            spawn(state, env, items)
        }
        MasterDirective::Run { command } => {
            state.touch();
            run(state, env, &command).await
        }
        MasterDirective::Wait => wait(state),
        MasterDirective::UpdateDocumentation { content } => write_doc(state, env, &content),
        MasterDirective::Finish { prompt } => finish(state, env, prompt).await,
        MasterDirective::Message { prompt } => {
            let reply = ask(env, &prompt).await?;
            state.touch();
            Ok(Step::succeeded(format!("human replied: {}", reply)))
        }
    }
}

/// DELEGATE: always to the single root manager.
fn delegate(state: &mut AgentState, prompt: String) -> Result<Step, AgentError> {
    let root = state
        .children
        .values()
        .next()
        .copied()
        .ok_or_else(|| AgentError::Delegation("no root agent attached".to_string()))?;

    tracing::info!("master delegating to root: {}", prompt);
    state.active_children.insert(root.id, prompt.clone());
    Ok(Step::succeeded("delegated to root agent").with_effects([Effect::Delegate {
        child: root.id,
        task: Task::new(prompt),
    }]))
}

/// FINISH: hand the turn to the human once the tree is idle.
///
/// The reply becomes the next prompt and the context is kept; an empty,
/// `exit` or `quit` reply ends the session instead.
async fn finish(state: &mut AgentState, env: &TurnEnv<'_>, prompt: String) -> Result<Step, AgentError> {
    if !state.active_children.is_empty() {
        return Err(AgentError::Delegation("root agent still active".to_string()));
    }
    if !state.active_ephemeral.is_empty() {
        return Err(AgentError::Delegation(format!(
            "{} ephemeral agent(s) still active",
            state.active_ephemeral.len()
        )));
    }

    let reply = ask(env, &prompt).await?;
    state.touch();
    if !is_session_end(&reply) {
        return Ok(Step::prompt(reply));
    }

    tracing::info!("Human ended the master session");
    let origin = state.task_origin;
    let task = state.deactivate()?;
    Ok(Step::silent().with_effects([Effect::Finish {
        task,
        origin,
        success: true,
        payload: prompt,
    }]))
}

async fn ask(env: &TurnEnv<'_>, prompt: &str) -> Result<String, AgentError> {
    env.human
        .ask(prompt)
        .await
        .map_err(|e| AgentError::Command(format!("human interface failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::agents::{AgentId, AgentKind, ChildLink, Scope};
    use crate::directive::{Dialect, Directive};
    use crate::interpret::interpret as run_directive;
    use crate::project::ProjectContext;
    use crate::test_support::{project_in, RecordingExec, ScriptedHuman};

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        project: ProjectContext,
        exec: RecordingExec,
        human: ScriptedHuman,
    }

    impl Fixture {
        fn new(replies: &[&str]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let project = project_in(dir.path());
            Self {
                _dir: dir,
                project,
                exec: RecordingExec::new(),
                human: ScriptedHuman::new(replies.iter().map(|r| r.to_string())),
            }
        }

        fn env(&self) -> TurnEnv<'_> {
            TurnEnv {
                project: &self.project,
                exec: &self.exec,
                human: &self.human,
            }
        }
    }

    fn master() -> (AgentState, AgentId) {
        let root = AgentId::new();
        let mut state = AgentState::new(AgentKind::Master, "master", Scope::Project, None);
        state.children.insert(
            ".".into(),
            ChildLink {
                id: root,
                kind: AgentKind::Manager,
            },
        );
        state.activate(Task::new("improve the project"), None);
        (state, root)
    }

    async fn run_text(state: &mut AgentState, env: &TurnEnv<'_>, text: &str) -> Vec<Effect> {
        let directive = Directive::parse(Dialect::Master, text).unwrap();
        run_directive(state, env, directive).await
    }

    #[tokio::test]
    async fn finish_waits_for_the_root_agent() {
        let fx = Fixture::new(&["looks good, now add docs"]);
        let (mut state, root) = master();

        let effects = run_text(&mut state, &fx.env(), "DELEGATE PROMPT=\"add tests\"").await;
        assert_eq!(effects.len(), 1);
        state.prompt_queue.clear();

        let effects = run_text(&mut state, &fx.env(), "FINISH PROMPT=\"All done?\"").await;
        assert!(effects.is_empty());
        assert_eq!(state.prompt_queue[0], "FINISH failed: root agent still active");
        assert!(fx.human.asked().is_empty());

        // root reports back
        state.active_children.remove(&root);
        state.prompt_queue.clear();
        state.context.push(crate::agents::ContextEntry {
            prompt: "p".into(),
            response: "r".into(),
        });

        let effects = run_text(&mut state, &fx.env(), "FINISH PROMPT=\"All done?\"").await;
        assert!(effects.is_empty());
        assert_eq!(fx.human.asked(), vec!["All done?".to_string()]);
        assert_eq!(state.prompt_queue[0], "looks good, now add docs");
        assert_eq!(state.context.len(), 1);
        assert!(state.is_active());
    }

    #[tokio::test]
    async fn exit_reply_ends_the_session() {
        let fx = Fixture::new(&["exit"]);
        let (mut state, _) = master();

        let effects = run_text(&mut state, &fx.env(), "FINISH PROMPT=\"Summary\"").await;
        assert!(!state.is_active());
        match &effects[..] {
            [Effect::Finish {
                origin: None,
                success: true,
                payload,
                ..
            }] => assert_eq!(payload, "Summary"),
            other => panic!("unexpected effects {:?}", other),
        }
    }

    #[tokio::test]
    async fn message_does_not_need_an_idle_tree() {
        let fx = Fixture::new(&["use pytest"]);
        let (mut state, root) = master();
        state.active_children.insert(root, "busy".into());

        run_text(&mut state, &fx.env(), "MESSAGE PROMPT=\"Which test runner?\"").await;
        assert_eq!(
            state.prompt_queue[0],
            "MESSAGE succeeded: human replied: use pytest"
        );
    }

    #[tokio::test]
    async fn activity_is_refreshed_by_delegation() {
        let fx = Fixture::new(&[]);
        let (mut state, _) = master();
        let stale = Instant::now()
            .checked_sub(Duration::from_secs(60))
            .unwrap_or_else(Instant::now);
        state.last_activity = stale;

        run_text(&mut state, &fx.env(), "DELEGATE PROMPT=\"x\"").await;
        assert!(state.last_activity > stale);

        state.last_activity = stale;
        run_text(&mut state, &fx.env(), "UPDATE_DOCUMENTATION CONTENT=\"notes\"").await;
        assert_eq!(state.last_activity, stale);
        assert_eq!(
            std::fs::read_to_string(fx.project.master_doc_path()).unwrap(),
            "notes"
        );
    }
}
