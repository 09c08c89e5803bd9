use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

use super::config::PromptConfig;
use super::middleware::Middleware;
use super::Prompt;
use crate::functions::FunctionRegistry;
use crate::plugins::base::Plugin;
use crate::templates::string::StringTemplate;
use crate::templates::Template;

/// Assembles a [`Prompt`] and its children. Nothing is shared until
/// [`PromptBuilder::build`] freezes the whole tree.
pub struct PromptBuilder {
    name: String,
    template: Box<dyn Template>,
    plugins: Vec<Arc<dyn Plugin>>,
    functions: FunctionRegistry,
    children: Vec<PromptBuilder>,
    input_middleware: Vec<Arc<dyn Middleware>>,
    output_middleware: Vec<Arc<dyn Middleware>>,
    config: PromptConfig,
}

impl PromptBuilder {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            template: Box::new(StringTemplate::default()),
            plugins: Vec::new(),
            functions: FunctionRegistry::new(),
            children: Vec::new(),
            input_middleware: Vec::new(),
            output_middleware: Vec::new(),
            config: PromptConfig::default(),
        }
    }

    pub fn template<T: Template + 'static>(mut self, template: T) -> Self {
        self.template = Box::new(template);
        self
    }

    /// Attach a backend. A plugin with the same name replaces the earlier one.
    pub fn plugin<P: Plugin + 'static>(self, plugin: P) -> Self {
        self.shared_plugin(Arc::new(plugin))
    }

    /// Attach a backend that is also used elsewhere
    pub fn shared_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        match self.plugins.iter_mut().find(|p| p.name() == plugin.name()) {
            Some(existing) => *existing = plugin,
            None => self.plugins.push(plugin),
        }
        self
    }

    /// Register a function on this prompt. Its children see it too unless
    /// they register one of the same name.
    pub fn function<N, D, F, Fut, T>(
        mut self,
        name: N,
        description: D,
        parameters: Option<Value>,
        handler: F,
    ) -> Self
    where
        N: Into<String>,
        D: Into<String>,
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Serialize + 'static,
    {
        self.functions.register(name, description, parameters, handler);
        self
    }

    /// Nest `child` under this prompt. A child of the same name is replaced.
    pub fn prompt(mut self, child: PromptBuilder) -> Self {
        match self.children.iter_mut().find(|c| c.name == child.name) {
            Some(existing) => *existing = child,
            None => self.children.push(child),
        }
        self
    }

    pub fn use_input<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.input_middleware.push(Arc::new(middleware));
        self
    }

    pub fn use_output<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.output_middleware.push(Arc::new(middleware));
        self
    }

    pub fn config(mut self, config: PromptConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Arc<Prompt> {
        self.build_under(Weak::new())
    }

    fn build_under(self, parent: Weak<Prompt>) -> Arc<Prompt> {
        Arc::new_cyclic(|this| Prompt {
            name: self.name,
            template: self.template,
            plugins: self.plugins,
            functions: self.functions,
            children: self
                .children
                .into_iter()
                .map(|child| child.build_under(this.clone()))
                .collect(),
            parent,
            input_middleware: self.input_middleware,
            output_middleware: self.output_middleware,
            config: self.config,
            history: Mutex::new(Vec::new()),
        })
    }
}
