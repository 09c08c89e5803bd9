use anyhow::{anyhow, Result};
use std::env;

pub const OPENAI_HOST: &str = "https://api.openai.com";

pub trait PluginConfig {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self>
    where
        Self: Sized;

    /// Helper function to get environment variables with error handling
    fn get_env(key: &str, required: bool, default: Option<String>) -> Result<Option<String>> {
        match env::var(key) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) if !required => Ok(default),
            Err(env::VarError::NotPresent) => Err(anyhow!(
                "Environment variable '{}' is required but not set.",
                key
            )),
            Err(e) => Err(e.into()),
        }
    }
}

/// Chat completions against the OpenAI API or any compatible server
#[derive(Debug, Clone)]
pub struct OpenAiTextConfig {
    pub name: Option<String>,
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub stream: bool,
    pub temperature: Option<f32>,
}

impl OpenAiTextConfig {
    pub fn new<H, K, M>(host: H, api_key: K, model: M) -> Self
    where
        H: Into<String>,
        K: Into<String>,
        M: Into<String>,
    {
        Self {
            name: None,
            host: host.into(),
            api_key: api_key.into(),
            model: model.into(),
            stream: false,
            temperature: None,
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl PluginConfig for OpenAiTextConfig {
    fn from_env() -> Result<Self> {
        let host = Self::get_env("OPENAI_HOST", false, Some(OPENAI_HOST.to_string()))?
            .unwrap_or_else(|| OPENAI_HOST.to_string());
        let api_key = Self::get_env("OPENAI_API_KEY", true, None)?
            .ok_or_else(|| anyhow!("OpenAI API key must be set"))?;
        let model = Self::get_env("OPENAI_MODEL", true, None)?
            .ok_or_else(|| anyhow!("OpenAI model must be set"))?;

        let stream = Self::get_env("OPENAI_STREAM", false, Some("false".to_string()))?
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let temperature = Self::get_env("OPENAI_TEMPERATURE", false, None)?
            .map(|s| s.parse::<f32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid OPENAI_TEMPERATURE: {}", e))?;

        let mut config = Self::new(host, api_key, model).with_stream(stream);
        config.temperature = temperature;
        Ok(config)
    }
}

/// Transcription and speech synthesis against the OpenAI audio endpoints
#[derive(Debug, Clone)]
pub struct OpenAiAudioConfig {
    pub name: Option<String>,
    pub host: String,
    pub api_key: String,
    pub model: String,
}

impl OpenAiAudioConfig {
    pub fn new<H, K, M>(host: H, api_key: K, model: M) -> Self
    where
        H: Into<String>,
        K: Into<String>,
        M: Into<String>,
    {
        Self {
            name: None,
            host: host.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

impl PluginConfig for OpenAiAudioConfig {
    fn from_env() -> Result<Self> {
        let host = Self::get_env("OPENAI_HOST", false, Some(OPENAI_HOST.to_string()))?
            .unwrap_or_else(|| OPENAI_HOST.to_string());
        let api_key = Self::get_env("OPENAI_API_KEY", true, None)?
            .ok_or_else(|| anyhow!("OpenAI API key must be set"))?;
        let model = Self::get_env("OPENAI_AUDIO_MODEL", false, Some("whisper-1".to_string()))?
            .unwrap_or_else(|| "whisper-1".to_string());

        Ok(Self::new(host, api_key, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_missing() {
        let key = "PROMPTX_TEST_SURELY_UNSET_VARIABLE";
        assert!(OpenAiTextConfig::get_env(key, true, None).is_err());
        assert_eq!(
            OpenAiTextConfig::get_env(key, false, Some("fallback".to_string())).unwrap(),
            Some("fallback".to_string())
        );
    }

    #[test]
    fn test_builder() {
        let config = OpenAiTextConfig::new(OPENAI_HOST, "key", "gpt-4o")
            .with_stream(true)
            .with_temperature(0.2)
            .with_name("lights");

        assert!(config.stream);
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.name.as_deref(), Some("lights"));
    }
}
