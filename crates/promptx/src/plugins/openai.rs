use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, trace};

use super::base::{
    AudioToTextParams, ChunkCallback, Plugin, PluginTag, TextParams, TextToAudioParams,
};
use super::configs::{OpenAiAudioConfig, OpenAiTextConfig};
use super::stream::FunctionCallAccumulator;
use super::utils::{functions_to_openai_spec, messages_to_openai_spec, openai_response_to_message};
use crate::models::message::Message;

fn build_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(600)) // 10 minutes timeout
        .build()?)
}

async fn post(
    client: &Client,
    host: &str,
    api_key: &str,
    path: &str,
    body: RequestBody,
) -> Result<Response> {
    let url = format!("{}{}", host.trim_end_matches('/'), path);
    let request = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", api_key));

    let response = match body {
        RequestBody::Json(payload) => request.json(&payload).send().await?,
        RequestBody::Multipart(form) => request.multipart(form).send().await?,
    };

    match response.status() {
        StatusCode::OK => Ok(response),
        status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
            error!(%url, %status, "server error");
            Err(anyhow!("Server error: {}", status))
        }
        status => {
            let text = response.text().await.unwrap_or_default();
            error!(%url, %status, "request failed");
            Err(anyhow!("Request failed: {}\nResponse: {}", status, text))
        }
    }
}

enum RequestBody {
    Json(Value),
    Multipart(Form),
}

/// Text generation through the chat completions endpoint. Works with any
/// server speaking the same protocol (llama.cpp, vLLM, ...) via `host`.
pub struct OpenAiTextPlugin {
    name: String,
    client: Client,
    config: OpenAiTextConfig,
}

impl OpenAiTextPlugin {
    const TAGS: &'static [PluginTag] = &[PluginTag::Functions, PluginTag::Text];

    pub fn new(config: OpenAiTextConfig) -> Result<Self> {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("openai:text:{}", config.model));

        Ok(Self {
            name,
            client: build_client()?,
            config,
        })
    }

    fn payload(&self, params: &TextParams<'_>) -> Result<Value> {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_openai_spec(&params.messages()),
            "stream": self.config.stream,
        });

        let tools = functions_to_openai_spec(params.functions)?;
        if !tools.is_empty() {
            payload["tools"] = json!(tools);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        Ok(payload)
    }

    async fn read_stream(
        &self,
        mut response: Response,
        mut on_chunk: Option<ChunkCallback<'_>>,
    ) -> Result<Message> {
        let mut text = String::new();
        let mut calls = FunctionCallAccumulator::new();
        // Network chunks may end inside a character; only whole lines are decoded
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;

        while let Some(bytes) = response.chunk().await? {
            buffer.extend_from_slice(&bytes);

            while let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
                let line = std::str::from_utf8(&line)?.trim();
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                if line == "data: [DONE]" {
                    done = true;
                    break;
                }
                let Some(data) = line.strip_prefix("data: ") else {
                    trace!(line, "ignoring non-data line");
                    continue;
                };

                let chunk: Value = serde_json::from_str(data)?;
                let delta = &chunk["choices"][0]["delta"];

                if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
                    for (position, call) in tool_calls.iter().enumerate() {
                        let index = call["index"]
                            .as_u64()
                            .map(|i| i as usize)
                            .unwrap_or(position);
                        calls.push(
                            index,
                            call["id"].as_str(),
                            call["function"]["name"].as_str(),
                            call["function"]["arguments"].as_str(),
                        );
                    }
                }

                if let Some(content) = delta.get("content").and_then(Value::as_str) {
                    if !content.is_empty() {
                        text.push_str(content);
                        if let Some(on_chunk) = on_chunk.as_deref_mut() {
                            on_chunk(&Message::model().with_text(content))?;
                        }
                    }
                }
            }

            if done {
                break;
            }
        }

        let mut message = Message::model();
        if !text.is_empty() {
            message = message.with_text(text);
        }
        for call in calls.finish()? {
            message = message.with_function_call(call);
        }
        Ok(message)
    }
}

#[async_trait]
impl Plugin for OpenAiTextPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &[PluginTag] {
        Self::TAGS
    }

    async fn text(
        &self,
        params: TextParams<'_>,
        on_chunk: Option<ChunkCallback<'_>>,
    ) -> Result<Message> {
        let payload = self.payload(&params)?;
        debug!(plugin = %self.name, stream = self.config.stream, "sending chat completion");

        let response = post(
            &self.client,
            &self.config.host,
            &self.config.api_key,
            "/v1/chat/completions",
            RequestBody::Json(payload),
        )
        .await?;

        if self.config.stream {
            return self.read_stream(response, on_chunk).await;
        }

        let body: Value = response.json().await?;
        if let Some(err) = body.get("error") {
            return Err(anyhow!("OpenAI API error: {}", err));
        }
        openai_response_to_message(&body)
    }
}

/// Speech to text and text to speech through the audio endpoints
pub struct OpenAiAudioPlugin {
    name: String,
    client: Client,
    config: OpenAiAudioConfig,
}

impl OpenAiAudioPlugin {
    const TAGS: &'static [PluginTag] = &[PluginTag::Audio];

    pub fn new(config: OpenAiAudioConfig) -> Result<Self> {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("openai:audio:{}", config.model));

        Ok(Self {
            name,
            client: build_client()?,
            config,
        })
    }
}

#[async_trait]
impl Plugin for OpenAiAudioPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &[PluginTag] {
        Self::TAGS
    }

    async fn audio_to_text(&self, params: AudioToTextParams) -> Result<String> {
        let file = Part::bytes(params.data)
            .file_name(format!("temp.{}", params.format))
            .mime_str(&format!("audio/{}", params.format))?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.config.model.clone());
        if let Some(lang) = params.lang {
            form = form.text("language", lang);
        }
        if let Some(prompt) = params.prompt {
            form = form.text("prompt", prompt);
        }

        let response = post(
            &self.client,
            &self.config.host,
            &self.config.api_key,
            "/v1/audio/transcriptions",
            RequestBody::Multipart(form),
        )
        .await?;

        let body: Value = response.json().await?;
        body.get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("No text in transcription response"))
    }

    async fn text_to_audio(&self, params: TextToAudioParams) -> Result<Vec<u8>> {
        let payload = json!({
            "model": self.config.model,
            "input": params.text,
            "voice": params.voice,
            "response_format": params.format,
        });

        let response = post(
            &self.client,
            &self.config.host,
            &self.config.api_key,
            "/v1/audio/speech",
            RequestBody::Json(payload),
        )
        .await?;

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::function::{FunctionCall, FunctionDef};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server(path_str: &str, response: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(path_str))
            .and(header("Authorization", "Bearer test_api_key"))
            .respond_with(response)
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn text_plugin(server: &MockServer, stream: bool) -> OpenAiTextPlugin {
        let config = OpenAiTextConfig::new(server.uri(), "test_api_key", "gpt-4o")
            .with_stream(stream)
            .with_temperature(0.7);
        OpenAiTextPlugin::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_text_basic() -> Result<()> {
        let body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello! How can I assist you today?",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }]
        });
        let server = setup_mock_server(
            "/v1/chat/completions",
            ResponseTemplate::new(200).set_body_json(body),
        )
        .await;
        let plugin = text_plugin(&server, false);

        let history = vec![Message::system("You are a helpful assistant.")];
        let message = Message::user("Hello?");
        let reply = plugin
            .text(
                TextParams {
                    message: Some(&message),
                    history: &history,
                    functions: &[],
                },
                None,
            )
            .await?;

        assert_eq!(
            reply.text().as_deref(),
            Some("Hello! How can I assist you today?")
        );
        assert!(!reply.has_function_calls());
        assert_eq!(plugin.name(), "openai:text:gpt-4o");
        Ok(())
    }

    #[tokio::test]
    async fn test_text_sends_tools() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "tools": [{"type": "function", "function": {"name": "lights_on"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_123",
                            "type": "function",
                            "function": {"name": "lights_on", "arguments": "{}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&mock_server)
            .await;

        let plugin = text_plugin(&mock_server, false);
        let functions = vec![FunctionDef::new("lights_on", "turns the lights on", None)];
        let message = Message::user("turn the lights on");
        let reply = plugin
            .text(
                TextParams {
                    message: Some(&message),
                    history: &[],
                    functions: &functions,
                },
                None,
            )
            .await?;

        assert_eq!(
            reply.function_calls(),
            &[FunctionCall::new("call_123", "lights_on", json!({}))]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_text_streaming() -> Result<()> {
        let sse = [
            r#"data: {"choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"The lights "}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"are off."}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            "data: [DONE]",
            "",
        ]
        .join("\n\n");
        let server = setup_mock_server(
            "/v1/chat/completions",
            ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"),
        )
        .await;
        let plugin = text_plugin(&server, true);

        let mut chunks = Vec::new();
        let mut on_chunk = |chunk: &Message| -> Result<()> {
            chunks.push(chunk.text().unwrap_or_default());
            Ok(())
        };
        let message = Message::user("are the lights on?");
        let reply = plugin
            .text(
                TextParams {
                    message: Some(&message),
                    history: &[],
                    functions: &[],
                },
                Some(&mut on_chunk),
            )
            .await?;

        assert_eq!(chunks, vec!["The lights ", "are off."]);
        assert_eq!(reply.text().as_deref(), Some("The lights are off."));
        Ok(())
    }

    #[tokio::test]
    async fn test_text_streaming_tool_call_deltas() -> Result<()> {
        let sse = [
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"set_color","arguments":""}}]}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"color\":"}}]}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"red\"}"}}]}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
            "data: [DONE]",
            "",
        ]
        .join("\n\n");
        let server = setup_mock_server(
            "/v1/chat/completions",
            ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"),
        )
        .await;
        let plugin = text_plugin(&server, true);

        let reply = plugin
            .text(
                TextParams {
                    message: None,
                    history: &[Message::user("make it red")],
                    functions: &[],
                },
                None,
            )
            .await?;

        assert_eq!(reply.text(), None);
        assert_eq!(
            reply.function_calls(),
            &[FunctionCall::new("call_1", "set_color", json!({"color": "red"}))]
        );
        Ok(())
    }

    /// Serve one chunked SSE response, writing `body` as two separate chunks
    /// split at byte `split`
    async fn split_sse_server(body: Vec<u8>, split: usize) -> Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            let header_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
            let length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            while request.len() < header_end + length {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                      transfer-encoding: chunked\r\nconnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for part in [&body[..split], &body[split..]] {
                socket
                    .write_all(format!("{:x}\r\n", part.len()).as_bytes())
                    .await
                    .unwrap();
                socket.write_all(part).await.unwrap();
                socket.write_all(b"\r\n").await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
            socket.flush().await.unwrap();
        });

        Ok(format!("http://{}", addr))
    }

    #[tokio::test]
    async fn test_text_streaming_multibyte_split_across_chunks() -> Result<()> {
        let body = [
            r#"data: {"choices":[{"index":0,"delta":{"content":"café"}}]}"#,
            "data: [DONE]",
            "",
        ]
        .join("\n\n")
        .into_bytes();
        // split between the two bytes of 'é'
        let split = body.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let host = split_sse_server(body, split).await?;

        let config = OpenAiTextConfig::new(host, "test_api_key", "gpt-4o").with_stream(true);
        let plugin = OpenAiTextPlugin::new(config)?;

        let mut chunks = Vec::new();
        let mut on_chunk = |chunk: &Message| -> Result<()> {
            chunks.push(chunk.text().unwrap_or_default());
            Ok(())
        };
        let message = Message::user("order a coffee");
        let reply = plugin
            .text(
                TextParams {
                    message: Some(&message),
                    history: &[],
                    functions: &[],
                },
                Some(&mut on_chunk),
            )
            .await?;

        assert_eq!(chunks, vec!["café"]);
        assert_eq!(reply.text().as_deref(), Some("café"));
        Ok(())
    }

    #[tokio::test]
    async fn test_text_server_error() {
        let server = setup_mock_server(
            "/v1/chat/completions",
            ResponseTemplate::new(500),
        )
        .await;
        let plugin = text_plugin(&server, false);

        let result = plugin
            .text(
                TextParams {
                    message: None,
                    history: &[],
                    functions: &[],
                },
                None,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_audio_to_text() -> Result<()> {
        let server = setup_mock_server(
            "/v1/audio/transcriptions",
            ResponseTemplate::new(200).set_body_json(json!({"text": "turn the lights on"})),
        )
        .await;
        let plugin = OpenAiAudioPlugin::new(OpenAiAudioConfig::new(
            server.uri(),
            "test_api_key",
            "whisper-1",
        ))?;

        let text = plugin
            .audio_to_text(AudioToTextParams {
                data: vec![0, 1, 2, 3],
                format: "mp3".to_string(),
                lang: Some("en".to_string()),
                prompt: None,
            })
            .await?;
        assert_eq!(text, "turn the lights on");
        Ok(())
    }

    #[tokio::test]
    async fn test_text_to_audio() -> Result<()> {
        let server = setup_mock_server(
            "/v1/audio/speech",
            ResponseTemplate::new(200).set_body_bytes(vec![7u8, 8, 9]),
        )
        .await;
        let plugin = OpenAiAudioPlugin::new(OpenAiAudioConfig::new(
            server.uri(),
            "test_api_key",
            "tts-1",
        ))?;

        let audio = plugin
            .text_to_audio(TextToAudioParams {
                text: "the lights are on".to_string(),
                format: "mp3".to_string(),
                voice: "alloy".to_string(),
            })
            .await?;
        assert_eq!(audio, vec![7, 8, 9]);
        assert!(plugin.has_tag(PluginTag::Audio));
        Ok(())
    }
}
