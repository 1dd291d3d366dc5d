//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::human::HumanInterface;
use crate::llm::{ChatMessage, LlmClient, LlmError};
use crate::project::ProjectContext;
use crate::tools::{CommandOutput, SandboxedExec};

pub fn test_config() -> Config {
    Config::new("test".to_string(), "test-model".to_string())
}

/// Config with short delays and no doc refresh calls.
pub fn fast_config() -> Config {
    let mut config = test_config();
    config.provider_backoff = Duration::from_millis(10);
    config.refresh_docs = false;
    config
}

pub fn project_in(root: &Path) -> ProjectContext {
    project_with(root, test_config())
}

pub fn project_with(root: &Path, config: Config) -> ProjectContext {
    ProjectContext::new(root, config).expect("test project root")
}

/// Model that replays a fixed list of responses, then hangs.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(responses.into_iter().map(|r| Ok(r.into())))
    }

    pub fn with_results<I>(results: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self::build(results.into_iter().collect(), Duration::ZERO)
    }

    /// Every call takes `delay`, so overlapping calls become observable.
    pub fn slow<I, S>(responses: I, delay: Duration) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(responses.into_iter().map(|r| Ok(r.into())).collect(), delay)
    }

    fn build(script: VecDeque<Result<String, LlmError>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            prompts: Mutex::new(Vec::new()),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// User text of every call so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        _system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(
            messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
        );

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

/// Dispatches each call to the first script whose marker occurs in the user text.
///
/// Lets agents that share one client (a coder and its testers) follow
/// separate scripts. An empty marker matches everything.
pub struct RoutedLlm {
    routes: Vec<(String, Arc<ScriptedLlm>)>,
}

impl RoutedLlm {
    pub fn new<I, S>(routes: I) -> Arc<Self>
    where
        I: IntoIterator<Item = (S, Arc<ScriptedLlm>)>,
        S: Into<String>,
    {
        Arc::new(Self {
            routes: routes.into_iter().map(|(m, llm)| (m.into(), llm)).collect(),
        })
    }
}

#[async_trait]
impl LlmClient for RoutedLlm {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        let text = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        match self.routes.iter().find(|(marker, _)| text.contains(marker.as_str())) {
            Some((_, llm)) => llm.generate(messages, system_prompt).await,
            None => panic!("no scripted route for prompt:\n{}", text),
        }
    }
}

/// Executor that records commands instead of running them.
pub struct RecordingExec {
    output: CommandOutput,
    commands: Mutex<Vec<(String, PathBuf)>>,
}

impl RecordingExec {
    pub fn new() -> Self {
        Self::with_output(CommandOutput {
            stdout: "ok".to_string(),
            stderr: String::new(),
            code: 0,
        })
    }

    pub fn with_output(output: CommandOutput) -> Self {
        Self {
            output,
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<(String, PathBuf)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxedExec for RecordingExec {
    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        _timeout: Duration,
    ) -> anyhow::Result<CommandOutput> {
        self.commands
            .lock()
            .unwrap()
            .push((command.to_string(), cwd.to_path_buf()));
        Ok(self.output.clone())
    }
}

/// Human that answers from a script, then says "exit".
pub struct ScriptedHuman {
    replies: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedHuman {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl HumanInterface for ScriptedHuman {
    async fn ask(&self, message: &str) -> anyhow::Result<String> {
        self.asked.lock().unwrap().push(message.to_string());
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "exit".to_string()))
    }
}
