//! Prompts and the turn executor.
//!
//! A [`Prompt`] binds a name, an instructions [`Template`], a set of plugins
//! and a [`FunctionRegistry`]. Prompts form a tree: plugins and functions a
//! prompt does not own itself are looked up through its ancestors, nearest
//! first. The tree is assembled with a [`PromptBuilder`] and immutable once
//! built; only the conversation history changes afterwards.
pub mod audio;
pub mod builder;
pub mod config;
pub mod middleware;
pub mod stream;
pub mod turn;

pub use builder::PromptBuilder;
pub use config::PromptConfig;
pub use middleware::{FnMiddleware, Middleware, MiddlewareContext};

use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

use crate::errors::{PromptError, PromptResult};
use crate::functions::FunctionRegistry;
use crate::models::message::Message;
use crate::plugins::base::{Plugin, PluginTag};
use crate::templates::{RenderContext, Template, TemplateTag};

pub struct Prompt {
    name: String,
    template: Box<dyn Template>,
    plugins: Vec<Arc<dyn Plugin>>,
    functions: FunctionRegistry,
    children: Vec<Arc<Prompt>>,
    // Up-reference for lookups only; parents own their children
    parent: Weak<Prompt>,
    input_middleware: Vec<Arc<dyn Middleware>>,
    output_middleware: Vec<Arc<dyn Middleware>>,
    config: PromptConfig,
    history: Mutex<Vec<Message>>,
}

impl Prompt {
    pub fn builder<S: Into<String>>(name: S) -> PromptBuilder {
        PromptBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    pub fn template(&self) -> &dyn Template {
        self.template.as_ref()
    }

    /// The parent prompt, if this prompt is nested and the tree is still alive
    pub fn parent(&self) -> Option<Arc<Prompt>> {
        self.parent.upgrade()
    }

    pub fn child(&self, name: &str) -> Option<Arc<Prompt>> {
        self.children.iter().find(|c| c.name == name).cloned()
    }

    pub fn children(&self) -> &[Arc<Prompt>] {
        &self.children
    }

    /// Ancestor names from the root down to this prompt, joined by `:`
    pub fn path(&self) -> String {
        let mut names = vec![self.name.clone()];
        let mut current = self.parent();
        while let Some(prompt) = current {
            names.push(prompt.name.clone());
            current = prompt.parent();
        }
        names.reverse();
        names.join(":")
    }

    /// Nearest plugin, walking up from this prompt, that satisfies `pred`
    fn find_plugin<P>(&self, pred: P) -> Option<Arc<dyn Plugin>>
    where
        P: Fn(&dyn Plugin) -> bool,
    {
        if let Some(plugin) = self.plugins.iter().find(|p| pred(p.as_ref())) {
            return Some(plugin.clone());
        }
        let mut current = self.parent();
        while let Some(prompt) = current {
            if let Some(plugin) = prompt.plugins.iter().find(|p| pred(p.as_ref())) {
                return Some(plugin.clone());
            }
            current = prompt.parent();
        }
        None
    }

    /// Resolve a plugin by name through this prompt and its ancestors
    pub fn plugin(&self, name: &str) -> PromptResult<Arc<dyn Plugin>> {
        self.find_plugin(|p| p.name() == name)
            .ok_or_else(|| PromptError::PluginNotFound(name.to_string()))
    }

    /// Resolve the nearest plugin advertising `tag`
    pub fn plugin_with_tag(&self, tag: PluginTag) -> PromptResult<Arc<dyn Plugin>> {
        self.find_plugin(|p| p.has_tag(tag))
            .ok_or_else(|| PromptError::PluginNotFound(tag.to_string()))
    }

    /// Own functions followed by inherited ones a nearer prompt does not shadow
    pub fn functions(&self) -> FunctionRegistry {
        let mut functions = self.functions.clone();
        let mut current = self.parent();
        while let Some(prompt) = current {
            functions.inherit(&prompt.functions);
            current = prompt.parent();
        }
        functions
    }

    /// Execute a visible function directly. Handler failures come back as `null`.
    pub async fn call(&self, name: &str, args: Value) -> PromptResult<Value> {
        self.functions().call(name, args).await
    }

    /// The system instructions for the default text plugin
    pub fn render(&self) -> PromptResult<String> {
        let plugin = self.find_plugin(|p| p.has_tag(PluginTag::Text));
        self.instructions(plugin.as_deref(), &self.functions())
    }

    /// Render the template and, when `plugin` cannot take functions natively
    /// but the template grammar can call them, describe the functions in prose.
    pub(crate) fn instructions(
        &self,
        plugin: Option<&dyn Plugin>,
        functions: &FunctionRegistry,
    ) -> PromptResult<String> {
        let rendered = self
            .template
            .render(&RenderContext::new().with_functions(functions))?;

        let native = plugin.is_some_and(|p| p.has_tag(PluginTag::Functions));
        if native || functions.is_empty() || !self.template.has_tag(TemplateTag::Functions) {
            return Ok(rendered);
        }

        let mut sections = vec![rendered];
        sections.extend(self.template.usage_hint().map(str::to_string));
        sections.push(functions.catalogue());
        Ok(sections
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// Snapshot of the conversation so far
    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }

    /// Forget the conversation. The next turn starts from fresh instructions.
    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field("name", &self.name)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("functions", &self.functions)
            .field("children", &self.children)
            .field("config", &self.config)
            .finish()
    }
}
