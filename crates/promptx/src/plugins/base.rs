use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::errors::PromptError;
use crate::models::function::FunctionDef;
use crate::models::message::Message;

/// Native capabilities a plugin advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PluginTag {
    /// Receives a function catalogue and emits structured function calls
    Functions,
    Text,
    Audio,
    Image,
    Video,
}

/// Callback receiving partial `model` messages while a plugin streams.
/// Returning an error aborts the plugin call with that error.
pub type ChunkCallback<'a> = &'a mut (dyn FnMut(&Message) -> Result<()> + Send);

/// Input to one model invocation
#[derive(Debug, Clone, Copy)]
pub struct TextParams<'a> {
    /// The new outbound message, if any. Absent when continuing after function results.
    pub message: Option<&'a Message>,
    /// Conversation so far, not including `message`
    pub history: &'a [Message],
    /// Functions the model may call
    pub functions: &'a [FunctionDef],
}

impl<'a> TextParams<'a> {
    /// History followed by the outbound message
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = self.history.to_vec();
        messages.extend(self.message.cloned());
        messages
    }
}

#[derive(Debug, Clone)]
pub struct AudioToTextParams {
    pub data: Vec<u8>,
    /// Audio container, e.g. `mp3` or `wav`
    pub format: String,
    pub lang: Option<String>,
    /// Guidance for the transcription. Prompts fill this with their instructions when unset.
    pub prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TextToAudioParams {
    pub text: String,
    pub format: String,
    pub voice: String,
}

fn unsupported(plugin: &str, operation: &str) -> anyhow::Error {
    PromptError::Unsupported {
        plugin: plugin.to_string(),
        operation: operation.to_string(),
    }
    .into()
}

/// Base trait for model backends (OpenAI, local servers, etc)
///
/// A plugin performs a single model invocation per call. It never runs
/// function handlers: function calls come back on the returned message and
/// the prompt executes them.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn tags(&self) -> &[PluginTag];

    fn has_tag(&self, tag: PluginTag) -> bool {
        self.tags().contains(&tag)
    }

    /// Generate the next model message. Streaming plugins call `on_chunk`
    /// with each partial message, in order, before returning the accumulated one.
    async fn text(
        &self,
        _params: TextParams<'_>,
        _on_chunk: Option<ChunkCallback<'_>>,
    ) -> Result<Message> {
        Err(unsupported(self.name(), "text"))
    }

    async fn audio_to_text(&self, _params: AudioToTextParams) -> Result<String> {
        Err(unsupported(self.name(), "audio_to_text"))
    }

    async fn text_to_audio(&self, _params: TextToAudioParams) -> Result<Vec<u8>> {
        Err(unsupported(self.name(), "text_to_audio"))
    }
}
