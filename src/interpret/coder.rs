//! Coder dialect: file-owning agents and testers.

use super::{finish, read, run, spawn, wait, Step, TurnEnv};
use crate::agents::{AgentError, AgentState};
use crate::directive::CoderDirective;

pub(super) async fn interpret(
    state: &mut AgentState,
    env: &TurnEnv<'_>,
    directive: CoderDirective,
) -> Result<Step, AgentError> {
    match directive {
        CoderDirective::Read { targets } => read(state, env, &targets),
        CoderDirective::Run { command } => run(state, env, &command).await,
        CoderDirective::Change { content } => change(state, env, &content),
        CoderDirective::Spawn { items } => spawn(state, env, items),
        CoderDirective::Wait => wait(state),
        CoderDirective::Finish { prompt } => finish(state, env, prompt),
    }
}

/// CHANGE: overwrite the agent's own file, nothing else.
fn change(state: &AgentState, env: &TurnEnv<'_>, content: &str) -> Result<Step, AgentError> {
    let file = state
        .scope
        .file()
        .ok_or_else(|| AgentError::Permission("no file owned".to_string()))?;
    std::fs::write(file, content)
        .map_err(|e| AgentError::io("write", env.project.display_name(file), e))?;
    tracing::info!("{} {} rewrote its file ({} bytes)", state.kind, state.name, content.len());
    Ok(Step::succeeded(format!(
        "wrote {} bytes to {}",
        content.len(),
        env.project.display_name(file)
    )))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use crate::agents::{AgentId, AgentKind, Scope, Scratch};
    use crate::directive::{Dialect, Directive, EphemeralKind};
    use crate::interpret::{interpret, Effect, TurnEnv};
    use crate::project::ProjectContext;
    use crate::task::Task;
    use crate::test_support::{project_in, RecordingExec, ScriptedHuman};

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        project: ProjectContext,
        exec: RecordingExec,
        human: ScriptedHuman,
    }

    impl Fixture {
        fn new(files: &[&str]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for file in files {
                let path = dir.path().join(file);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, "").unwrap();
            }
            let project = project_in(dir.path());
            Self {
                _dir: dir,
                project,
                exec: RecordingExec::new(),
                human: ScriptedHuman::new(Vec::<String>::new()),
            }
        }

        fn env(&self) -> TurnEnv<'_> {
            TurnEnv {
                project: &self.project,
                exec: &self.exec,
                human: &self.human,
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.project.root().join(name)
        }

        fn coder(&self, name: &str) -> AgentState {
            let mut state = AgentState::new(AgentKind::Coder, name, Scope::File(self.path(name)), None);
            state.activate(Task::new("work"), Some(AgentId::new()));
            state
        }
    }

    async fn run_text(state: &mut AgentState, env: &TurnEnv<'_>, text: &str) -> Vec<Effect> {
        let directive = Directive::parse(Dialect::Coder, text).unwrap();
        interpret(state, env, directive).await
    }

    #[tokio::test]
    async fn change_overwrites_own_file() {
        let fx = Fixture::new(&["a.py"]);
        let mut state = fx.coder("a.py");
        run_text(&mut state, &fx.env(), "CHANGE CONTENT=\"print(1)\"").await;

        assert_eq!(std::fs::read_to_string(fx.path("a.py")).unwrap(), "print(1)");
        assert!(state.prompt_queue[0].contains("succeeded"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chained_writes_never_reach_the_shell() {
        let fx = Fixture::new(&["pkg/a.py"]);
        let mut state = fx.coder("pkg/a.py");
        let env = TurnEnv {
            project: &fx.project,
            exec: &crate::tools::ShellExec,
            human: &fx.human,
        };
        let command = "echo pwned > ../outside.txt; echo x > b.py";
        run_text(&mut state, &env, &format!("RUN COMMAND=\"{}\"", command)).await;

        assert_eq!(
            state.prompt_queue.back().unwrap(),
            &format!("RUN failed: Invalid command '{}'", command)
        );
        assert!(!fx.path("outside.txt").exists());
        assert!(!fx.path("pkg/b.py").exists());
    }

    #[tokio::test]
    async fn change_without_a_file_is_a_permission_error() {
        let fx = Fixture::new(&[]);
        let mut state = AgentState::new(AgentKind::Coder, "x", Scope::Project, None);
        run_text(&mut state, &fx.env(), "CHANGE CONTENT=\"x\"").await;
        assert_eq!(
            state.prompt_queue[0],
            "CHANGE failed: permission denied: no file owned"
        );
    }

    #[tokio::test]
    async fn testers_share_the_coder_scratch_file() {
        let fx = Fixture::new(&["pkg/util.py"]);
        let mut state = fx.coder("pkg/util.py");
        let effects = run_text(
            &mut state,
            &fx.env(),
            "SPAWN TESTER PROMPT=\"happy path\" TESTER PROMPT=\"errors\"",
        )
        .await;

        let scratch = fx.path("pkg/util_scratch.py");
        assert!(scratch.exists());
        assert!(fx.project.is_scratch(&scratch));
        assert_eq!(effects.len(), 2);
        for effect in &effects {
            match effect {
                Effect::Spawn {
                    id,
                    kind,
                    scratch: s,
                    ..
                } => {
                    assert_eq!(*kind, EphemeralKind::Tester);
                    assert_eq!(
                        s,
                        &Scratch {
                            path: scratch.clone(),
                            owned: false
                        }
                    );
                    assert!(state.active_ephemeral.contains(id));
                }
                other => panic!("unexpected effect {:?}", other),
            }
        }
        assert_eq!(state.scratch.as_ref().map(|s| s.owned), Some(true));
        assert_eq!(state.prompt_queue[0], "SPAWN succeeded: spawned 2 agent(s)");
    }

    #[tokio::test]
    async fn testers_cannot_spawn() {
        let fx = Fixture::new(&["t_scratch_1.py"]);
        let mut state = AgentState::new(
            AgentKind::Ephemeral(EphemeralKind::Tester),
            "tester",
            Scope::File(fx.path("t_scratch_1.py")),
            None,
        );
        let effects = run_text(&mut state, &fx.env(), "SPAWN TESTER PROMPT=\"more\"").await;
        assert!(effects.is_empty());
        assert!(state.prompt_queue[0].starts_with("SPAWN failed"));
    }

    #[tokio::test]
    async fn finish_refused_while_testers_run() {
        let fx = Fixture::new(&["a.py"]);
        let mut state = fx.coder("a.py");
        state.active_ephemeral.insert(AgentId::new());

        let effects = run_text(&mut state, &fx.env(), "FINISH PROMPT=\"done\"").await;
        assert!(effects.is_empty());
        assert!(state.is_active());
        assert_eq!(
            state.prompt_queue[0],
            "FINISH failed: 1 ephemeral agent(s) still active"
        );
    }

    #[tokio::test]
    async fn finish_reports_to_origin_and_removes_owned_scratch() {
        let fx = Fixture::new(&["a.py", "a_scratch.py"]);
        let mut state = fx.coder("a.py");
        let origin = state.task_origin;
        state.scratch = Some(Scratch {
            path: fx.path("a_scratch.py"),
            owned: true,
        });
        fx.project.claim_scratch(&fx.path("a_scratch.py"));

        let effects = run_text(&mut state, &fx.env(), "FINISH PROMPT=\"added validation\"").await;
        assert!(state.prompt_queue.is_empty());
        assert!(!state.is_active());
        assert!(!Path::new(&fx.path("a_scratch.py")).exists());
        assert!(!fx.project.is_scratch(&fx.path("a_scratch.py")));
        match &effects[..] {
            [Effect::Finish {
                task: Some(task),
                origin: o,
                success: true,
                payload,
            }] => {
                assert_eq!(task.text(), "work");
                assert_eq!(*o, origin);
                assert_eq!(payload, "added validation");
            }
            other => panic!("unexpected effects {:?}", other),
        }
    }

    #[tokio::test]
    async fn tester_leaves_shared_scratch_alone() {
        let fx = Fixture::new(&["a.py", "a_scratch.py"]);
        let scratch = fx.path("a_scratch.py");
        let mut state = AgentState::new(
            AgentKind::Ephemeral(EphemeralKind::Tester),
            "tester",
            Scope::File(scratch.clone()),
            None,
        );
        state.scratch = Some(Scratch {
            path: scratch.clone(),
            owned: false,
        });
        state.activate(Task::new("test"), Some(AgentId::new()));

        run_text(&mut state, &fx.env(), "CHANGE CONTENT=\"def test_a(): pass\"").await;
        assert_eq!(std::fs::read_to_string(&scratch).unwrap(), "def test_a(): pass");

        run_text(&mut state, &fx.env(), "FINISH").await;
        assert!(scratch.exists());
    }
}
