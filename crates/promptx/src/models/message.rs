use super::content::Content;
use super::function::FunctionCall;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    System,
    User,
    Model,
    Function,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
/// A message to or from a model
pub enum Message {
    System {
        content: Content,
    },
    User {
        content: Content,
    },
    Model {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        function_calls: Vec<FunctionCall>,
    },
    Function {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        function_id: String,
    },
}

impl Message {
    pub fn system<C: Into<Content>>(content: C) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user<C: Into<Content>>(content: C) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Create an empty model message
    pub fn model() -> Self {
        Message::Model {
            content: None,
            function_calls: Vec::new(),
        }
    }

    /// Create a function result message correlated to the call `function_id`
    pub fn function<I: Into<String>, S: Into<String>>(function_id: I, content: S) -> Self {
        Message::Function {
            content: Some(content.into()),
            function_id: function_id.into(),
        }
    }

    /// Append text to a model message. Other roles are returned unchanged.
    pub fn with_text<S: AsRef<str>>(mut self, text: S) -> Self {
        if let Message::Model { content, .. } = &mut self {
            content
                .get_or_insert_with(String::new)
                .push_str(text.as_ref());
        }
        self
    }

    /// Add a function call to a model message. Other roles are returned unchanged.
    pub fn with_function_call(mut self, call: FunctionCall) -> Self {
        if let Message::Model { function_calls, .. } = &mut self {
            function_calls.push(call);
        }
        self
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Model { .. } => Role::Model,
            Message::Function { .. } => Role::Function,
        }
    }

    /// The textual content of the message, if any
    pub fn text(&self) -> Option<String> {
        match self {
            Message::System { content } | Message::User { content } => Some(content.to_text()),
            Message::Model { content, .. } | Message::Function { content, .. } => content.clone(),
        }
    }

    /// Replace the textual content of the message. Image parts are kept.
    pub fn set_text<S: Into<String>>(&mut self, text: S) {
        let text = text.into();
        match self {
            Message::System { content } | Message::User { content } => content.set_text(text),
            Message::Model { content, .. } | Message::Function { content, .. } => {
                *content = Some(text)
            }
        }
    }

    pub fn function_calls(&self) -> &[FunctionCall] {
        match self {
            Message::Model { function_calls, .. } => function_calls,
            _ => &[],
        }
    }

    pub fn has_function_calls(&self) -> bool {
        !self.function_calls().is_empty()
    }

    /// Check that every function message answers a call made by the closest
    /// preceding model message. Returns the offending function id otherwise.
    pub fn validate_sequence(messages: &[Message]) -> Result<(), String> {
        let mut calls: &[FunctionCall] = &[];
        for message in messages {
            match message {
                Message::Model { function_calls, .. } => calls = function_calls,
                Message::Function { function_id, .. } => {
                    if !calls.iter().any(|call| &call.id == function_id) {
                        return Err(function_id.clone());
                    }
                }
                _ => calls = &[],
            }
        }
        Ok(())
    }
}
