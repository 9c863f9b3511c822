use async_trait::async_trait;
use futures::TryStreamExt;
use log::error;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::Serialize;
use std::error::Error as StdError;

use super::{ ByteStream, CompletionClient, UpstreamConfig, UpstreamError, MAX_COMPLETION_TOKENS };
use crate::models::chat::ChatMessage;

/// OpenAI-style chat-completions client. Always requests streaming mode; the
/// response body is handed back untouched for byte-for-byte relaying.
pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

impl OpenAIChatClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAIChatClient {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32
    ) -> Result<ByteStream, UpstreamError> {
        let url = self.base_url.trim_end_matches('/').to_string();

        let req = OpenAIChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature,
            stream: true,
        };

        let resp = self.http.post(&url).json(&req).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Upstream completion failed with status {}: {}", status, body);
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(resp.bytes_stream().map_err(|e| Box::new(e) as _)))
    }
}
