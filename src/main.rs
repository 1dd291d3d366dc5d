//! codetree - command line entry point
//!
//! Builds the agent tree for a directory and hands it one prompt, either to
//! the root manager directly or through a master that talks to you on stdin.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use codetree::agents::AgentTree;
use codetree::human::StdinHuman;
use codetree::llm::OpenRouterClient;
use codetree::prompt::TemplateRenderer;
use codetree::tools::ShellExec;
use codetree::{Config, Engine, ProjectContext, Services};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "codetree", version, about = "Work on a codebase with a tree of LLM agents")]
struct Cli {
    /// Project root; every file and directory below it gets an agent
    root: PathBuf,

    /// Task for the root agent (or the master's opening prompt)
    prompt: String,

    /// Put a master between you and the root agent
    #[arg(long)]
    master: bool,

    /// Override DEFAULT_MODEL
    #[arg(long)]
    model: Option<String>,

    /// Print every agent's final state as JSON on stderr
    #[arg(long)]
    dump_state: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codetree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(model) = cli.model {
        config.default_model = model;
    }
    info!("Loaded configuration: model={}", config.default_model);

    let client = Arc::new(OpenRouterClient::new(
        config.api_key.clone(),
        config.default_model.clone(),
    ));
    let project = Arc::new(ProjectContext::new(&cli.root, config)?);
    let tree = AgentTree::build(&project, client)?;
    info!("Built {} agents under {}", tree.len(), project.root().display());

    let services = Services {
        exec: Arc::new(ShellExec),
        human: Arc::new(StdinHuman),
        renderer: Arc::new(TemplateRenderer::new()?),
    };
    let engine = Engine::launch(project, tree, services).await;

    let target = if cli.master {
        engine.attach_master().await?
    } else {
        engine.root_id()
    };

    let outcome = tokio::select! {
        result = engine.run_prompt(target, cli.prompt) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            engine.shutdown();
            return Ok(());
        }
    };
    engine.shutdown();

    if cli.dump_state {
        let snapshots = engine.snapshots().await;
        eprintln!("{}", serde_json::to_string_pretty(&snapshots)?);
    }

    let payload = outcome?;
    println!("{}", payload);
    Ok(())
}
