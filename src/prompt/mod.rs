//! Prompt rendering.
//!
//! The engine only assembles a variable bag ([`PromptVars`]); wording lives in
//! templates behind the [`PromptRenderer`] trait. [`TemplateRenderer`] is the
//! bundled minijinja implementation with one template per agent kind plus
//! `system` and `doc_update`.

pub mod grammar;

use minijinja::Environment;
use serde::Serialize;

const SYSTEM_TEMPLATE: &str = include_str!("templates/system.md");
const CODER_TEMPLATE: &str = include_str!("templates/coder.md");
const TESTER_TEMPLATE: &str = include_str!("templates/tester.md");
const MANAGER_TEMPLATE: &str = include_str!("templates/manager.md");
const MASTER_TEMPLATE: &str = include_str!("templates/master.md");
const DOC_UPDATE_TEMPLATE: &str = include_str!("templates/doc_update.md");

/// Template names every renderer must provide.
pub const TEMPLATE_NAMES: &[&str] = &["system", "coder", "tester", "manager", "master", "doc_update"];

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Failed to render template {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

/// A named piece of text shown to the model (file content, doc file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileView {
    pub name: String,
    pub content: String,
}

/// Everything a template may use.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptVars {
    pub role: String,
    pub grammar: String,
    pub examples: String,
    pub task: Option<String>,
    pub own_file: Option<FileView>,
    pub doc: Option<FileView>,
    pub memory: Vec<FileView>,
    pub children: Vec<String>,
    /// Depth-bounded codebase listing
    pub tree: String,
    /// Queued prompts of this turn
    pub prompt: String,
    /// Prior `(prompt, response)` pairs, most recent last
    pub context: String,
}

/// Renders a named template with a variable bag.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, template: &str, vars: &PromptVars) -> Result<String, PromptError>;
}

/// minijinja-backed renderer with the built-in templates.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self, PromptError> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        for (name, source) in [
            ("system", SYSTEM_TEMPLATE),
            ("coder", CODER_TEMPLATE),
            ("tester", TESTER_TEMPLATE),
            ("manager", MANAGER_TEMPLATE),
            ("master", MASTER_TEMPLATE),
            ("doc_update", DOC_UPDATE_TEMPLATE),
        ] {
            env.add_template(name, source)
                .map_err(|source| PromptError::Render {
                    name: name.to_string(),
                    source,
                })?;
        }
        Ok(Self { env })
    }
}

impl PromptRenderer for TemplateRenderer {
    fn render(&self, template: &str, vars: &PromptVars) -> Result<String, PromptError> {
        let tmpl = self
            .env
            .get_template(template)
            .map_err(|_| PromptError::UnknownTemplate(template.to_string()))?;
        tmpl.render(vars).map_err(|source| PromptError::Render {
            name: template.to_string(),
            source,
        })
    }
}
