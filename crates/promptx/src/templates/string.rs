use super::{RenderContext, Template, TemplateTag};
use crate::errors::TemplateError;

/// Passes text through untouched. Has no function support, so a prompt
/// using it never injects a function catalogue.
#[derive(Debug, Clone, Default)]
pub struct StringTemplate {
    src: String,
}

impl StringTemplate {
    pub fn new<S: Into<String>>(src: S) -> Self {
        Self { src: src.into() }
    }
}

impl Template for StringTemplate {
    fn tags(&self) -> &[TemplateTag] {
        &[]
    }

    fn render(&self, ctx: &RenderContext<'_>) -> Result<String, TemplateError> {
        Ok(ctx.src.unwrap_or(&self.src).to_string())
    }
}
