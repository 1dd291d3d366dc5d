//! Manager dialect: directory-owning agents.

use std::path::{Component, Path};

use super::{finish, read, run, spawn, wait, write_doc, Effect, Step, TurnEnv};
use crate::agents::{AgentError, AgentId, AgentKind, AgentState, ChildLink};
use crate::directive::{ManagerDirective, Target};
use crate::project::{self, ProjectContext};
use crate::task::Task;

pub(super) async fn interpret(
    state: &mut AgentState,
    env: &TurnEnv<'_>,
    directive: ManagerDirective,
) -> Result<Step, AgentError> {
    match directive {
        ManagerDirective::Create { target, content } => create(state, env, &target, content),
        ManagerDirective::Delete { target } => delete(state, env, &target),
        ManagerDirective::Read { targets } => read(state, env, &targets),
        ManagerDirective::Delegate { assignments } => delegate(state, assignments),
        ManagerDirective::Run { command } => run(state, env, &command).await,
        ManagerDirective::UpdateReadme { content } => write_doc(state, env, &content),
        ManagerDirective::Spawn { items } => spawn(state, env, items),
        ManagerDirective::Wait => wait(state),
        ManagerDirective::Finish { prompt } => finish(state, env, prompt),
    }
}

/// Name of a direct entry of the manager's directory.
fn entry_name(target: &Target) -> Result<String, AgentError> {
    let name = target.name.trim().trim_end_matches('/');
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(entry)), None) => Ok(entry.to_string_lossy().to_string()),
        _ => Err(AgentError::Permission(format!(
            "{} is not a direct entry of this directory; delegate nested work instead",
            target.name
        ))),
    }
}

fn scoped_path(state: &AgentState, project: &ProjectContext, target: &Target) -> Result<(String, std::path::PathBuf), AgentError> {
    let dir = state
        .scope
        .dir()
        .ok_or_else(|| AgentError::Permission("no directory owned".to_string()))?;
    let name = entry_name(target)?;
    let path = project.resolve(dir, &name);
    if !project::contains(dir, &path) || path == project::normalize(dir) {
        return Err(AgentError::Permission(format!(
            "{} is outside {}",
            target.name, state.name
        )));
    }
    if project.is_doc_file(&path) || project.is_scratch(&path) {
        return Err(AgentError::Permission(format!(
            "{} is managed by the engine",
            target.name
        )));
    }
    Ok((name, path))
}

/// CREATE: new file or folder inside the managed directory, adopted as a child.
fn create(
    state: &mut AgentState,
    env: &TurnEnv<'_>,
    target: &Target,
    content: Option<String>,
) -> Result<Step, AgentError> {
    let (name, path) = scoped_path(state, env.project, target)?;
    if path.exists() || state.children.contains_key(&name) {
        return Err(AgentError::io(
            "create",
            &target.name,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "already exists"),
        ));
    }

    let kind = if target.is_folder {
        if content.is_some() {
            return Err(AgentError::Permission(
                "CONTENT can only be given for a FILE".to_string(),
            ));
        }
        std::fs::create_dir(&path).map_err(|e| AgentError::io("create", &target.name, e))?;
        env.project
            .ensure_doc(&path)
            .map_err(|e| AgentError::io("create doc file for", &target.name, e))?;
        AgentKind::Manager
    } else {
        std::fs::write(&path, content.unwrap_or_default())
            .map_err(|e| AgentError::io("create", &target.name, e))?;
        AgentKind::Coder
    };

    let id = AgentId::new();
    state.children.insert(name, ChildLink { id, kind });
    tracing::info!("{} created {} ({})", state.name, target, kind);
    Ok(Step::succeeded(format!("created {}", target)).with_effects([Effect::Adopt { id, kind, path }]))
}

/// DELETE: remove an entry and release its agent subtree.
fn delete(state: &mut AgentState, env: &TurnEnv<'_>, target: &Target) -> Result<Step, AgentError> {
    let (name, path) = scoped_path(state, env.project, target)?;
    if !path.exists() {
        return Err(super::not_found("delete", &target.name));
    }
    if target.is_folder != path.is_dir() {
        let actual = if path.is_dir() { "a folder" } else { "a file" };
        return Err(AgentError::Permission(format!("{} is {}", target.name, actual)));
    }

    let child = state.children.get(&name).copied();
    if let Some(link) = child {
        if state.active_children.contains_key(&link.id) {
            return Err(AgentError::Delegation(format!(
                "{} is still working on a delegated task",
                target.name
            )));
        }
    }

    let removed = if target.is_folder {
        std::fs::remove_dir_all(&path)
    } else {
        std::fs::remove_file(&path)
    };
    removed.map_err(|e| AgentError::io("delete", &target.name, e))?;

    let mut step = Step::succeeded(format!("deleted {}", target));
    if let Some(link) = child {
        state.children.remove(&name);
        step = step.with_effects([Effect::Release { child: link.id }]);
    }
    tracing::info!("{} deleted {}", state.name, target);
    Ok(step)
}

/// DELEGATE: hand each named child its prompt. All names are checked first.
fn delegate(state: &mut AgentState, assignments: Vec<(Target, String)>) -> Result<Step, AgentError> {
    let mut resolved = Vec::with_capacity(assignments.len());
    for (target, prompt) in assignments {
        let name = target.name.trim().trim_end_matches('/');
        let link = state
            .children
            .get(name)
            .copied()
            .ok_or_else(|| AgentError::Delegation(format!("no child named {}", target)))?;
        let is_folder = link.kind == AgentKind::Manager;
        if is_folder != target.is_folder {
            return Err(AgentError::Delegation(format!(
                "{} is a {}",
                name,
                if is_folder { "FOLDER" } else { "FILE" }
            )));
        }
        resolved.push((name.to_string(), link.id, prompt));
    }

    let mut names = Vec::with_capacity(resolved.len());
    let mut effects = Vec::with_capacity(resolved.len());
    for (name, child, prompt) in resolved {
        tracing::info!("{} delegating to {}: {}", state.name, name, prompt);
        state.active_children.insert(child, prompt.clone());
        effects.push(Effect::Delegate {
            child,
            task: Task::new(prompt),
        });
        names.push(name);
    }
    Ok(Step::succeeded(format!("delegated to {}", names.join(", "))).with_effects(effects))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::agents::{Scope, Scratch};
    use crate::directive::{Dialect, Directive};
    use crate::interpret::interpret as run_directive;
    use crate::test_support::{project_in, RecordingExec, ScriptedHuman};

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        project: ProjectContext,
        exec: RecordingExec,
        human: ScriptedHuman,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
            std::fs::write(dir.path().join("a.py"), "x = 1").unwrap();
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

        fn root(&self) -> PathBuf {
            self.project.root().to_path_buf()
        }

        /// Root manager with children `a.py` and `pkg`.
        fn manager(&self) -> AgentState {
            let mut state = AgentState::new(AgentKind::Manager, ".", Scope::Dir(self.root()), None);
            state.children.insert(
                "a.py".into(),
                ChildLink {
                    id: AgentId::new(),
                    kind: AgentKind::Coder,
                },
            );
            state.children.insert(
                "pkg".into(),
                ChildLink {
                    id: AgentId::new(),
                    kind: AgentKind::Manager,
                },
            );
            state.activate(Task::new("organize"), None);
            state
        }
    }

    async fn run_text(state: &mut AgentState, env: &TurnEnv<'_>, text: &str) -> Vec<Effect> {
        let directive = Directive::parse(Dialect::Manager, text).unwrap();
        run_directive(state, env, directive).await
    }

    #[tokio::test]
    async fn delegate_records_active_child() {
        let fx = Fixture::new();
        let mut state = fx.manager();
        let coder = state.children["a.py"].id;

        let effects = run_text(&mut state, &fx.env(), "DELEGATE FILE \"a.py\" PROMPT=\"do X\"").await;
        assert_eq!(state.active_children.get(&coder).map(String::as_str), Some("do X"));
        match &effects[..] {
            [Effect::Delegate { child, task }] => {
                assert_eq!(*child, coder);
                assert_eq!(task.text(), "do X");
            }
            other => panic!("unexpected effects {:?}", other),
        }
        assert_eq!(state.prompt_queue[0], "DELEGATE succeeded: delegated to a.py");
    }

    #[tokio::test]
    async fn delegate_to_unknown_child_records_nothing() {
        let fx = Fixture::new();
        let mut state = fx.manager();
        let effects = run_text(
            &mut state,
            &fx.env(),
            "DELEGATE FILE \"a.py\" PROMPT=\"x\" FILE \"ghost.py\" PROMPT=\"y\"",
        )
        .await;
        assert!(effects.is_empty());
        assert!(state.active_children.is_empty());
        assert!(state.prompt_queue[0].starts_with("DELEGATE failed: no child named"));
    }

    #[tokio::test]
    async fn delete_missing_file_fails_without_changes() {
        let fx = Fixture::new();
        let mut state = fx.manager();
        let before: Vec<_> = std::fs::read_dir(fx.root()).unwrap().map(|e| e.unwrap().path()).collect();

        let effects = run_text(&mut state, &fx.env(), "DELETE FILE \"missing.txt\"").await;
        assert!(effects.is_empty());
        assert!(state.prompt_queue[0].starts_with("DELETE failed"));
        let after: Vec<_> = std::fs::read_dir(fx.root()).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(before.len(), after.len());
    }

    #[tokio::test]
    async fn delete_releases_idle_child() {
        let fx = Fixture::new();
        let mut state = fx.manager();
        let coder = state.children["a.py"].id;

        let effects = run_text(&mut state, &fx.env(), "DELETE FILE \"a.py\"").await;
        assert_eq!(effects, vec![Effect::Release { child: coder }]);
        assert!(!fx.root().join("a.py").exists());
        assert!(!state.children.contains_key("a.py"));
    }

    #[tokio::test]
    async fn delete_refuses_busy_child() {
        let fx = Fixture::new();
        let mut state = fx.manager();
        let coder = state.children["a.py"].id;
        state.active_children.insert(coder, "work".into());

        run_text(&mut state, &fx.env(), "DELETE FILE \"a.py\"").await;
        assert!(fx.root().join("a.py").exists());
        assert!(state.prompt_queue[0].starts_with("DELETE failed"));
    }

    #[tokio::test]
    async fn writes_stay_inside_scope() {
        let fx = Fixture::new();
        let mut state = fx.manager();

        for text in [
            "CREATE FILE \"../escape.py\"",
            "CREATE FILE \"pkg/nested.py\"",
            "DELETE FILE \"../a.py\"",
            "CREATE FILE \"/tmp/abs.py\"",
        ] {
            let effects = run_text(&mut state, &fx.env(), text).await;
            assert!(effects.is_empty(), "{}", text);
        }
        assert!(state
            .prompt_queue
            .iter()
            .all(|p| p.contains("failed: permission denied")));
        assert!(!fx.root().join("pkg/nested.py").exists());
        assert!(!fx.root().parent().unwrap().join("escape.py").exists());
    }

    #[tokio::test]
    async fn create_adopts_new_children() {
        let fx = Fixture::new();
        let mut state = fx.manager();

        let effects = run_text(&mut state, &fx.env(), "CREATE FILE \"b.py\" CONTENT=\"y = 2\"").await;
        assert_eq!(std::fs::read_to_string(fx.root().join("b.py")).unwrap(), "y = 2");
        let link = state.children["b.py"];
        assert_eq!(
            effects,
            vec![Effect::Adopt {
                id: link.id,
                kind: AgentKind::Coder,
                path: fx.root().join("b.py"),
            }]
        );

        let effects = run_text(&mut state, &fx.env(), "CREATE FOLDER \"lib\"").await;
        assert_eq!(effects.len(), 1);
        assert!(fx.root().join("lib/lib_README.md").exists());
        assert_eq!(state.children["lib"].kind, AgentKind::Manager);

        run_text(&mut state, &fx.env(), "CREATE FILE \"b.py\"").await;
        assert!(state.prompt_queue.back().unwrap().starts_with("CREATE failed"));
    }

    #[tokio::test]
    async fn update_readme_overwrites_doc() {
        let fx = Fixture::new();
        let mut state = fx.manager();
        let doc = fx.project.doc_path(&fx.root());
        std::fs::write(&doc, "old notes").unwrap();

        run_text(&mut state, &fx.env(), "UPDATE_README CONTENT=\"new notes\"").await;
        assert_eq!(std::fs::read_to_string(doc).unwrap(), "new notes");
    }

    #[tokio::test]
    async fn manager_testers_get_private_scratch_files() {
        let fx = Fixture::new();
        let mut state = fx.manager();
        let effects = run_text(
            &mut state,
            &fx.env(),
            "SPAWN TESTER PROMPT=\"a\" TESTER PROMPT=\"b\"",
        )
        .await;

        let paths: Vec<Scratch> = effects
            .into_iter()
            .filter_map(|e| match e {
                Effect::Spawn { scratch, .. } => Some(scratch),
                _ => None,
            })
            .collect();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0].path, paths[1].path);
        assert!(paths
            .iter()
            .all(|s| s.owned && s.path.exists() && fx.project.is_scratch(&s.path)));
        assert_eq!(state.active_ephemeral.len(), 2);
    }

    #[tokio::test]
    async fn read_folder_registers_its_doc_file() {
        let fx = Fixture::new();
        fx.project.ensure_doc(&fx.root().join("pkg")).unwrap();
        let mut state = fx.manager();

        run_text(&mut state, &fx.env(), "READ FOLDER \"pkg\"").await;
        assert!(state.memory.contains_key("pkg/pkg_README.md"));

        std::fs::create_dir(fx.root().join("bare")).unwrap();
        run_text(&mut state, &fx.env(), "READ FOLDER \"bare\"").await;
        assert!(state.prompt_queue.back().unwrap().starts_with("READ failed"));
    }

    #[tokio::test]
    async fn finish_with_active_children_is_refused() {
        let fx = Fixture::new();
        let mut state = fx.manager();
        run_text(&mut state, &fx.env(), "DELEGATE FOLDER \"pkg\" PROMPT=\"tidy\"").await;
        state.prompt_queue.clear();

        let effects = run_text(&mut state, &fx.env(), "FINISH PROMPT=\"done\"").await;
        assert!(effects.is_empty());
        assert!(state.is_active());
        assert_eq!(
            state.prompt_queue[0],
            "FINISH failed: 1 child agent(s) still active"
        );

        run_text(&mut state, &fx.env(), "WAIT").await;
        assert_eq!(state.prompt_queue.len(), 1);
    }
}
