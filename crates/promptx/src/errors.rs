use thiserror::Error;

/// Failure to turn template source into text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// The source could not be parsed. While streaming this usually means
    /// an expression has not been closed yet.
    #[error("Template syntax error: {0}")]
    Syntax(String),

    /// The source parsed but could not be evaluated.
    #[error("Template render error: {0}")]
    Render(String),
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Plugin {plugin} does not support {operation}")]
    Unsupported { plugin: String, operation: String },

    #[error("Invalid arguments for function call {id}: {reason}")]
    InvalidArguments { id: String, reason: String },

    #[error("Turn exceeded {0} plugin invocations")]
    TooManyRounds(usize),

    #[error("Plugin failed: {0}")]
    Plugin(#[source] anyhow::Error),

    #[error("Middleware failed: {0}")]
    Middleware(#[source] anyhow::Error),
}

impl PromptError {
    /// Wrap a plugin failure, recovering a `PromptError` that was raised
    /// inside the plugin's streaming callback and carried through `anyhow`.
    pub fn from_plugin(err: anyhow::Error) -> Self {
        match err.downcast::<PromptError>() {
            Ok(inner) => inner,
            Err(err) => PromptError::Plugin(err),
        }
    }
}

pub type PromptResult<T> = Result<T, PromptError>;
