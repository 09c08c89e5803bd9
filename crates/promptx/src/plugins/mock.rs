use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::plugins::base::{ChunkCallback, Plugin, PluginTag, TextParams};

/// A scripted reply: chunks streamed through the callback, then the final message
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub chunks: Vec<String>,
    pub message: Message,
}

impl MockResponse {
    /// Reply with `message` without streaming
    pub fn message(message: Message) -> Self {
        Self {
            chunks: Vec::new(),
            message,
        }
    }

    /// Stream `chunks` and reply with a model message holding their concatenation
    pub fn streamed(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            message: Message::model().with_text(chunks.concat()),
        }
    }
}

/// A mock plugin that returns pre-configured responses for testing
#[derive(Clone)]
pub struct MockPlugin {
    name: String,
    tags: Vec<PluginTag>,
    responses: Arc<Mutex<Vec<MockResponse>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockPlugin {
    /// Create a new mock plugin with a sequence of responses
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            tags: vec![PluginTag::Text],
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tags(mut self, tags: &[PluginTag]) -> Self {
        self.tags = tags.to_vec();
        self
    }

    /// The messages each invocation received, outbound message last
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &[PluginTag] {
        &self.tags
    }

    async fn text(
        &self,
        params: TextParams<'_>,
        on_chunk: Option<ChunkCallback<'_>>,
    ) -> Result<Message> {
        self.requests.lock().unwrap().push(params.messages());

        let response = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                // Return empty response if no more pre-configured responses
                MockResponse::message(Message::model().with_text(""))
            } else {
                responses.remove(0)
            }
        };

        if let Some(on_chunk) = on_chunk {
            for chunk in &response.chunks {
                on_chunk(&Message::model().with_text(chunk))?;
            }
        }

        Ok(response.message)
    }
}
