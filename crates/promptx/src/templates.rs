//! Instruction templates.
//!
//! A [`Template`] turns source text into the text sent to, or shown from, a
//! model. Templates advertise capabilities through [`TemplateTag`]s; the
//! prompt reads the tag set instead of probing for behaviour.
pub mod string;
pub mod tera;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::errors::TemplateError;
use crate::functions::FunctionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TemplateTag {
    /// The template grammar can call a registered function by name
    Functions,
}

/// What to render. Without `src` the template renders its own instructions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderContext<'a> {
    pub src: Option<&'a str>,
    pub functions: Option<&'a FunctionRegistry>,
}

impl<'a> RenderContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_src(mut self, src: &'a str) -> Self {
        self.src = Some(src);
        self
    }

    pub fn with_functions(mut self, functions: &'a FunctionRegistry) -> Self {
        self.functions = Some(functions);
        self
    }
}

pub trait Template: Send + Sync {
    fn tags(&self) -> &[TemplateTag];

    fn has_tag(&self, tag: TemplateTag) -> bool {
        self.tags().contains(&tag)
    }

    fn render(&self, ctx: &RenderContext<'_>) -> Result<String, TemplateError>;

    /// Prose appended to the instructions when the model has to express
    /// function calls in this template's grammar.
    fn usage_hint(&self) -> Option<&str> {
        None
    }
}

/// Outcome of rendering a partially streamed buffer
#[derive(Debug, Clone, PartialEq)]
pub enum RenderAttempt {
    Rendered(String),
    /// The buffer does not render yet; more input may complete it
    Incomplete(TemplateError),
}

/// Render `src` without treating failure as an error. A truncated stream
/// fragment and a genuinely broken expression look the same here, so both
/// come back as [`RenderAttempt::Incomplete`].
pub fn try_render(
    template: &dyn Template,
    src: &str,
    functions: &FunctionRegistry,
) -> RenderAttempt {
    let ctx = RenderContext::new().with_src(src).with_functions(functions);
    match template.render(&ctx) {
        Ok(rendered) => RenderAttempt::Rendered(rendered),
        Err(err) => RenderAttempt::Incomplete(err),
    }
}
