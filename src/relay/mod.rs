//! Shared request validation and upstream message construction, used by both
//! the query-parameter and JSON-body transports of the converse endpoint.

use crate::llm::UpstreamError;
use crate::models::chat::{ ChatMessage, Conversation, ConverseParams, Speaker };
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid conversation")]
    InvalidConversation,
    #[error("Invalid temperature")]
    InvalidTemperature,
    #[error("{0}")]
    Upstream(#[from] UpstreamError),
}

impl RelayError {
    /// JSON body returned to the caller alongside a 400 status.
    pub fn to_body(&self) -> serde_json::Value {
        match self {
            RelayError::Upstream(UpstreamError::Api { status, body }) =>
                json!({
                    "message": self.to_string(),
                    "status": status,
                    "body": body,
                }),
            _ => json!({ "message": self.to_string() }),
        }
    }
}

/// A validated, upstream-ready request.
#[derive(Debug)]
pub struct PreparedRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Decode the JSON-encoded conversation. A payload that is not an object, is
/// null, or has no `history` field is rejected; an empty history is legal.
pub fn parse_conversation(raw: &str) -> Result<Conversation, RelayError> {
    serde_json::from_str(raw).map_err(|_| RelayError::InvalidConversation)
}

/// Parse the temperature string. Must be a finite number in [0, 1] inclusive.
pub fn parse_temperature(raw: &str) -> Result<f32, RelayError> {
    let temperature: f32 = raw.trim().parse().map_err(|_| RelayError::InvalidTemperature)?;
    if !temperature.is_finite() || !(0.0..=1.0).contains(&temperature) {
        return Err(RelayError::InvalidTemperature);
    }
    Ok(temperature)
}

/// One fixed leading system entry carrying the persona prompt, then one
/// role-tagged entry per speech in original order. No reordering, truncation
/// or deduplication: the full history is replayed on every call.
pub fn build_messages(persona: &str, conversation: &Conversation) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new("system", persona)];
    for speech in &conversation.history {
        let role = match speech.speaker {
            Speaker::Human => "user",
            Speaker::Bot => "assistant",
        };
        messages.push(ChatMessage::new(role, speech.text.clone()));
    }
    messages
}

/// Validate one raw request and construct the upstream message list. No
/// upstream call is made here; rejection happens before any network effect.
pub fn prepare(persona: &str, params: &ConverseParams) -> Result<PreparedRequest, RelayError> {
    let conversation = parse_conversation(&params.conversation)?;
    let temperature = parse_temperature(&params.temperature)?;
    Ok(PreparedRequest {
        messages: build_messages(persona, &conversation),
        temperature,
    })
}
