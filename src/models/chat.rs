use serde::{ Serialize, Deserialize };

/// Who produced one turn of a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Bot,
    Human,
}

/// One turn of a conversation. Immutable once appended to history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speech {
    pub speaker: Speaker,
    pub text: String,
}

/// Ordered conversation history, replayed verbatim to the model on every call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub history: Vec<Speech>,
}

/// Transport encoding of one relay request: a JSON-encoded [`Conversation`]
/// plus a decimal temperature string. Accepted as a JSON body or as query
/// parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConverseParams {
    pub conversation: String,
    pub temperature: String,
}

/// Role-tagged line sent upstream. Built fresh per request, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}
