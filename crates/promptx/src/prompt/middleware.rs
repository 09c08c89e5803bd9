use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::{PromptError, PromptResult};
use crate::models::message::Message;

/// What a middleware sees: the message it may rewrite and the history it
/// will be added to.
pub struct MiddlewareContext<'a> {
    /// Path of the prompt running the turn
    pub prompt: &'a str,
    pub message: &'a mut Message,
    pub history: &'a [Message],
}

/// A transform over the user message before a turn, or the model message
/// after it. Middleware runs in registration order, each awaited in turn.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: MiddlewareContext<'_>) -> Result<()>;
}

/// Adapts a synchronous closure into a [`Middleware`]
pub struct FnMiddleware<F>(F);

impl<F> FnMiddleware<F>
where
    F: Fn(&mut Message) -> Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut Message) -> Result<()> + Send + Sync,
{
    async fn handle(&self, ctx: MiddlewareContext<'_>) -> Result<()> {
        (self.0)(ctx.message)
    }
}

pub(crate) async fn run_all(
    middleware: &[Arc<dyn Middleware>],
    prompt: &str,
    message: &mut Message,
    history: &[Message],
) -> PromptResult<()> {
    for m in middleware {
        m.handle(MiddlewareContext {
            prompt,
            message: &mut *message,
            history,
        })
        .await
        .map_err(PromptError::Middleware)?;
    }
    Ok(())
}
