use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Chat role. Roles the service sends that are not modelled are carried as
/// their raw string so reply turns round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Other(raw) => raw.as_str(),
        }
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other(raw),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a multimodal message. Only a part whose sole key is `image`
/// or `text` becomes the typed variant; anything else is kept whole in
/// `Other` so assistant turns round-trip verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContentPart {
    Image { image: String },
    Text { text: String },
    Other(Map<String, Value>),
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        if map.len() == 1 {
            if let Some(Value::String(image)) = map.get("image") {
                return Ok(ContentPart::Image {
                    image: image.clone(),
                });
            }
            if let Some(Value::String(text)) = map.get("text") {
                return Ok(ContentPart::Text { text: text.clone() });
            }
        }
        Ok(ContentPart::Other(map))
    }
}

impl ContentPart {
    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::Image { image: url.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::Other(map) => map.get("text").and_then(Value::as_str),
            ContentPart::Image { .. } => None,
        }
    }

    pub fn as_image(&self) -> Option<&str> {
        match self {
            ContentPart::Image { image } => Some(image.as_str()),
            ContentPart::Other(map) => map.get("image").and_then(Value::as_str),
            ContentPart::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTurn {
    pub role: Role,
    pub content: MessageContent,
}

impl MessageTurn {
    pub fn user_image_prompt(image_url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::image(image_url),
                ContentPart::text(prompt),
            ]),
        }
    }

    pub fn system_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn text_segments(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(text) => vec![text.as_str()],
            MessageContent::Parts(parts) => parts.iter().filter_map(ContentPart::as_text).collect(),
        }
    }

    pub fn image_urls(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => {
                parts.iter().filter_map(ContentPart::as_image).collect()
            }
        }
    }
}
