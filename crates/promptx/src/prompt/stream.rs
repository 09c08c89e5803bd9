use tracing::{debug, trace, warn};

use crate::errors::PromptResult;
use crate::functions::FunctionRegistry;
use crate::templates::{try_render, RenderAttempt, Template};

/// Re-renders streamed model text through a template.
///
/// Chunks accumulate in a pending buffer until the buffer renders; the
/// rendered text is then emitted and the buffer cleared. Text that stops
/// mid-expression is therefore held back until the expression closes.
pub struct ChunkRenderer<'a> {
    template: &'a dyn Template,
    functions: &'a FunctionRegistry,
    pending: String,
    max_pending_bytes: Option<usize>,
}

impl<'a> ChunkRenderer<'a> {
    pub fn new(
        template: &'a dyn Template,
        functions: &'a FunctionRegistry,
        max_pending_bytes: Option<usize>,
    ) -> Self {
        Self {
            template,
            functions,
            pending: String::new(),
            max_pending_bytes,
        }
    }

    /// Buffer `chunk` and return the rendered buffer if it is complete.
    /// Fails only when the buffer outgrows `max_pending_bytes`.
    pub fn push(&mut self, chunk: &str) -> PromptResult<Option<String>> {
        self.pending.push_str(chunk);

        match try_render(self.template, &self.pending, self.functions) {
            RenderAttempt::Rendered(rendered) => {
                debug!(bytes = self.pending.len(), "flushing rendered chunk");
                self.pending.clear();
                Ok(Some(rendered))
            }
            RenderAttempt::Incomplete(err) => {
                if let Some(max) = self.max_pending_bytes {
                    if self.pending.len() > max {
                        return Err(err.into());
                    }
                }
                trace!(bytes = self.pending.len(), error = %err, "buffering incomplete chunk");
                Ok(None)
            }
        }
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Last attempt at the leftover buffer once the stream has ended
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        match try_render(self.template, &self.pending, self.functions) {
            RenderAttempt::Rendered(rendered) => Some(rendered),
            RenderAttempt::Incomplete(err) => {
                warn!(
                    bytes = self.pending.len(),
                    error = %err,
                    "stream ended with unrendered output"
                );
                None
            }
        }
    }
}
