use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// One part of a multimodal user or system message
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: String },
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url<S: Into<String>>(url: S) -> Self {
        ContentPart::ImageUrl {
            image_url: url.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// Content carried by user and system messages: either plain text or a list of parts
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// The text of this content, with text parts joined by newlines and
    /// image parts skipped.
    pub fn to_text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(ContentPart::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Trim surrounding whitespace from plain text content. Parts are left untouched.
    pub fn trimmed(self) -> Self {
        match self {
            Content::Text(text) => Content::Text(text.trim().to_string()),
            parts => parts,
        }
    }

    /// Replace the text with `text`. For parts, the first text part takes the
    /// new text, later text parts are dropped and image parts stay in place.
    pub fn set_text(&mut self, text: String) {
        match self {
            Content::Text(current) => *current = text,
            Content::Parts(parts) => {
                let mut text = Some(text);
                parts.retain_mut(|part| match part {
                    ContentPart::Text { text: current } => match text.take() {
                        Some(new) => {
                            *current = new;
                            true
                        }
                        None => false,
                    },
                    ContentPart::ImageUrl { .. } => true,
                });
                if let Some(text) = text {
                    parts.insert(0, ContentPart::Text { text });
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(text) => text.is_empty(),
            Content::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<Vec<ContentPart>> for Content {
    fn from(parts: Vec<ContentPart>) -> Self {
        Content::Parts(parts)
    }
}
