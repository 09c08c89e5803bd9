use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};

use super::stream::FunctionCallAccumulator;
use crate::models::content::{Content, ContentPart};
use crate::models::function::FunctionDef;
use crate::models::message::Message;

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| match message {
            Message::System { content } => json!({
                "role": "system",
                "content": content.to_text(),
            }),
            Message::User { content } => json!({
                "role": "user",
                "content": content_to_openai_spec(content),
            }),
            Message::Model {
                content,
                function_calls,
            } => {
                let mut converted = json!({
                    "role": "assistant",
                    "content": content,
                });
                if !function_calls.is_empty() {
                    converted["tool_calls"] = function_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                }
                converted
            }
            Message::Function {
                content,
                function_id,
            } => json!({
                "role": "tool",
                "content": content.as_deref().unwrap_or("null"),
                "tool_call_id": function_id,
            }),
        })
        .collect()
}

fn content_to_openai_spec(content: &Content) -> Value {
    match content {
        Content::Text(text) => json!(text),
        Content::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({"type": "text", "text": text}),
                ContentPart::ImageUrl { image_url } => json!({
                    "type": "image_url",
                    "image_url": {"url": image_url}
                }),
            })
            .collect(),
    }
}

/// Convert internal function definitions to OpenAI's API tool specification
pub fn functions_to_openai_spec(functions: &[FunctionDef]) -> Result<Vec<Value>> {
    let mut names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for function in functions {
        if !is_valid_function_name(&function.name) {
            return Err(anyhow!(
                "Function name '{}' must match the regex [a-zA-Z0-9_-]+",
                function.name
            ));
        }
        if !names.insert(&function.name) {
            return Err(anyhow!("Duplicate function name: {}", function.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": function.name,
                "description": function.description,
                "parameters": function.parameters,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = &response["choices"][0]["message"];
    let mut message = Message::model();

    if let Some(text) = original.get("content").and_then(Value::as_str) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(Value::as_array) {
        let mut calls = FunctionCallAccumulator::new();
        for (index, tool_call) in tool_calls.iter().enumerate() {
            calls.push(
                index,
                tool_call["id"].as_str(),
                tool_call["function"]["name"].as_str(),
                tool_call["function"]["arguments"].as_str(),
            );
        }
        for call in calls.finish()? {
            message = message.with_function_call(call);
        }
    }

    Ok(message)
}

fn is_valid_function_name(name: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9_-]+$")
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}
