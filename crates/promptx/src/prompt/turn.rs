use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

use super::middleware;
use super::stream::ChunkRenderer;
use super::Prompt;
use crate::errors::{PromptError, PromptResult};
use crate::functions::{Function, FunctionRegistry};
use crate::models::content::Content;
use crate::models::function::FunctionCall;
use crate::models::message::Message;
use crate::plugins::base::{Plugin, PluginTag, TextParams};
use crate::templates::RenderContext;

/// Receives rendered output as it streams
pub type TextCallback<'a> = &'a mut (dyn FnMut(&str) + Send);

impl Prompt {
    /// Run one conversation turn on the nearest plugin tagged `text`.
    ///
    /// The model's reply is rendered through the prompt's template before it
    /// is returned. With `on_chunk`, rendered output is also delivered while
    /// the plugin streams; text ending inside an unfinished template
    /// expression is held back until the expression completes. Function calls
    /// requested by the model are executed and fed back until the model
    /// answers without calling anything.
    pub async fn text<C: Into<Content>>(
        &self,
        input: C,
        on_chunk: Option<TextCallback<'_>>,
    ) -> PromptResult<String> {
        let plugin = self.plugin_with_tag(PluginTag::Text)?;
        self.turn(plugin, input.into(), on_chunk).await
    }

    /// Like [`Prompt::text`], on the plugin named `plugin`
    pub async fn text_with<C: Into<Content>>(
        &self,
        plugin: &str,
        input: C,
        on_chunk: Option<TextCallback<'_>>,
    ) -> PromptResult<String> {
        let plugin = self.plugin(plugin)?;
        self.turn(plugin, input.into(), on_chunk).await
    }

    async fn turn(
        &self,
        plugin: Arc<dyn Plugin>,
        input: Content,
        on_chunk: Option<TextCallback<'_>>,
    ) -> PromptResult<String> {
        let path = self.path();
        let span = info_span!("turn", prompt = %path, plugin = plugin.name());
        self.run_turn(&path, plugin.as_ref(), input, on_chunk)
            .instrument(span)
            .await
    }

    async fn run_turn(
        &self,
        path: &str,
        plugin: &dyn Plugin,
        input: Content,
        mut on_chunk: Option<TextCallback<'_>>,
    ) -> PromptResult<String> {
        let functions = self.functions();
        let definitions = functions.definitions();

        // Held for the whole turn so turns on one prompt never interleave
        let mut history = self.history.lock().await;
        if history.is_empty() {
            let instructions = self.instructions(Some(plugin), &functions)?;
            history.push(Message::system(instructions));
        }

        let input = if self.config.trim_input {
            input.trimmed()
        } else {
            input
        };
        let mut message = Message::user(input);
        middleware::run_all(&self.input_middleware, path, &mut message, &history).await?;

        let mut outbound = Some(message);
        let mut rounds = 0;
        loop {
            if let Some(max) = self.config.max_rounds {
                if rounds >= max {
                    return Err(PromptError::TooManyRounds(max));
                }
            }
            rounds += 1;

            let params = TextParams {
                message: outbound.as_ref(),
                history: &history,
                functions: &definitions,
            };
            let mut reply = self
                .invoke(plugin, params, &functions, on_chunk.as_deref_mut())
                .await?;
            history.extend(outbound.take());

            if !reply.has_function_calls() {
                middleware::run_all(&self.output_middleware, path, &mut reply, &history).await?;
                let content = reply.text().unwrap_or_default();
                history.push(reply);

                let ctx = RenderContext::new()
                    .with_src(&content)
                    .with_functions(&functions);
                return Ok(self.template.render(&ctx)?);
            }

            let calls = reply.function_calls().to_vec();
            history.push(reply);

            let results = self.execute(&functions, &calls).await?;
            for (call, result) in calls.iter().zip(results) {
                history.push(Message::function(&call.id, result));
            }
        }
    }

    /// One plugin invocation, re-rendering streamed chunks when the caller
    /// wants them
    async fn invoke(
        &self,
        plugin: &dyn Plugin,
        params: TextParams<'_>,
        functions: &FunctionRegistry,
        on_chunk: Option<&mut (dyn FnMut(&str) + Send + '_)>,
    ) -> PromptResult<Message> {
        debug!(
            plugin = plugin.name(),
            history = params.history.len(),
            outbound = params.message.is_some(),
            "invoking plugin"
        );

        let Some(on_chunk) = on_chunk else {
            return plugin
                .text(params, None)
                .await
                .map_err(PromptError::from_plugin);
        };

        let mut renderer = ChunkRenderer::new(
            self.template.as_ref(),
            functions,
            self.config.max_pending_bytes,
        );
        let mut forward = |chunk: &Message| -> anyhow::Result<()> {
            if let Some(text) = chunk.text() {
                if let Some(rendered) = renderer.push(&text)? {
                    on_chunk(&rendered);
                }
            }
            Ok(())
        };

        let reply = plugin
            .text(params, Some(&mut forward))
            .await
            .map_err(PromptError::from_plugin)?;

        if let Some(rest) = renderer.finish() {
            on_chunk(&rest);
        }
        Ok(reply)
    }

    /// Run the calls of one model message. Every call is resolved before any
    /// handler runs; results come back in call order, serialized as JSON.
    async fn execute(
        &self,
        functions: &FunctionRegistry,
        calls: &[FunctionCall],
    ) -> PromptResult<Vec<String>> {
        let resolved = calls
            .iter()
            .map(|call| {
                functions
                    .get(&call.name)
                    .map(|function| (function.clone(), call))
                    .ok_or_else(|| PromptError::FunctionNotFound(call.name.clone()))
            })
            .collect::<PromptResult<Vec<(Arc<Function>, &FunctionCall)>>>()?;

        debug!(
            calls = resolved.len(),
            concurrent = self.config.concurrent_functions,
            "dispatching function calls"
        );

        let results = if self.config.concurrent_functions {
            let futures: Vec<_> = resolved
                .iter()
                .map(|(function, call)| function.invoke(call.arguments.clone()))
                .collect();
            join_all(futures).await
        } else {
            let mut results = Vec::with_capacity(resolved.len());
            for (function, call) in &resolved {
                results.push(function.invoke(call.arguments.clone()).await);
            }
            results
        };

        Ok(results.iter().map(|value| value.to_string()).collect())
    }
}
