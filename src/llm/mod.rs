pub mod openai;

use crate::cli::Args;
use crate::models::chat::ChatMessage;
use async_trait::async_trait;
use axum::body::Bytes;
use futures::Stream;
use std::error::Error as StdError;
use std::pin::Pin;
use thiserror::Error;

/// Fixed ceiling on generated tokens per completion.
pub const MAX_COMPLETION_TOKENS: u32 = 1024;

/// Raw upstream bytes, forwarded to the caller without transformation.
pub type ByteStream = Pin<
    Box<dyn Stream<Item = Result<Bytes, Box<dyn StdError + Send + Sync>>> + Send>
>;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream connection failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned status {status}")]
    Api {
        status: u16,
        body: String,
    },
}

/// The upstream chat-completion capability, behind a seam so tests can
/// substitute a double.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Invoke the upstream model in streaming mode and hand back its raw
    /// event-stream bytes. A single failed attempt is terminal.
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32
    ) -> Result<ByteStream, UpstreamError>;
}

/// Immutable upstream client settings, collected once at startup and passed
/// explicitly to the client constructor.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl UpstreamConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            api_key: args.chat_api_key.clone(),
            model: args.chat_model.clone(),
            base_url: args.chat_base_url.clone(),
        }
    }
}
