use tracing::{debug, info_span, Instrument};

use super::Prompt;
use crate::errors::{PromptError, PromptResult};
use crate::plugins::base::{AudioToTextParams, PluginTag, TextToAudioParams};
use crate::templates::RenderContext;

impl Prompt {
    /// Transcribe audio with the nearest plugin tagged `audio`.
    ///
    /// Without an explicit transcription prompt the plugin is guided by this
    /// prompt's instructions. The transcript is rendered through the template.
    pub async fn audio_to_text(&self, mut params: AudioToTextParams) -> PromptResult<String> {
        let plugin = self.plugin_with_tag(PluginTag::Audio)?;
        let functions = self.functions();

        if params.prompt.is_none() {
            params.prompt = Some(self.instructions(Some(plugin.as_ref()), &functions)?);
        }

        let span = info_span!("audio_to_text", prompt = %self.path(), plugin = plugin.name());
        let transcript = async {
            debug!(bytes = params.data.len(), format = %params.format, "transcribing");
            plugin.audio_to_text(params).await
        }
        .instrument(span)
        .await
        .map_err(PromptError::from_plugin)?;

        let ctx = RenderContext::new()
            .with_src(&transcript)
            .with_functions(&functions);
        Ok(self.template.render(&ctx)?)
    }

    /// Synthesize speech with the nearest plugin tagged `audio`
    pub async fn text_to_audio(&self, params: TextToAudioParams) -> PromptResult<Vec<u8>> {
        let plugin = self.plugin_with_tag(PluginTag::Audio)?;
        let span = info_span!("text_to_audio", prompt = %self.path(), plugin = plugin.name());
        plugin
            .text_to_audio(params)
            .instrument(span)
            .await
            .map_err(PromptError::from_plugin)
    }
}
