//! Drives one streamed turn against a running relay: append the human turn,
//! open the stream, feed reassembled event lines to the consumer, and commit
//! the finished bot turn on close.

use crate::consumer::{ sse_data, SseLineBuffer, StreamConsumer, DONE_MARKER };
use crate::models::chat::{ Conversation, ConverseParams, Speaker, Speech };
use futures::StreamExt;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("A stream is already open for this conversation")]
    Busy,
    #[error("Failed to encode request payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Relay rejected the request ({status}): {message}")]
    Relay {
        status: u16,
        message: String,
    },
    #[error("Stream failed: {0}")]
    Stream(String),
}

#[derive(Deserialize)]
struct RelayRejection {
    message: String,
}

/// One conversation against one relay. The conversation list is mutated only
/// by the append-human (on send) and append-bot (on close) transitions.
pub struct ChatSession {
    http: reqwest::Client,
    converse_url: String,
    consumer: StreamConsumer,
    pub conversation: Conversation,
}

impl ChatSession {
    pub fn new(relay_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            converse_url: format!("{}/api/converse", relay_url.trim_end_matches('/')),
            consumer: StreamConsumer::new(),
            conversation: Conversation::default(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.consumer.is_streaming()
    }

    /// Abandon a cancelled stream. Dropping the `send` future mid-stream is
    /// the only cancellation path; it leaves the consumer mid-stream with
    /// the busy guard engaged, and the partially streamed text uncommitted.
    /// Resetting discards that partial text and permits a new submission.
    pub fn reset(&mut self) {
        self.consumer.reset();
    }

    /// Send one prompt and stream the reply, invoking `on_delta` for each
    /// appended fragment. On success exactly one bot turn is committed; on
    /// any failure the partial reply is discarded and only the human turn
    /// remains in history.
    pub async fn send<F>(
        &mut self,
        prompt: &str,
        temperature: &str,
        mut on_delta: F
    ) -> Result<(), ClientError>
        where F: FnMut(&str)
    {
        if self.consumer.is_streaming() {
            return Err(ClientError::Busy);
        }

        self.conversation.history.push(Speech {
            speaker: Speaker::Human,
            text: prompt.to_string(),
        });

        let params = ConverseParams {
            conversation: serde_json::to_string(&self.conversation)?,
            temperature: temperature.to_string(),
        };

        let resp = self.http.post(&self.converse_url).json(&params).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json
                ::from_str::<RelayRejection>(&body)
                .map(|r| r.message)
                .unwrap_or(body);
            self.consumer.on_error(&message);
            return Err(ClientError::Relay {
                status: status.as_u16(),
                message,
            });
        }

        self.consumer.open();
        let mut lines = SseLineBuffer::new();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.consumer.on_error(&e.to_string());
                    return Err(ClientError::Stream(e.to_string()));
                }
            };

            for line in lines.push(&bytes) {
                let Some(data) = sse_data(&line) else {
                    continue;
                };
                if data == DONE_MARKER {
                    self.commit();
                    return Ok(());
                }
                if let Some(delta) = self.consumer.on_chunk(data) {
                    on_delta(&delta);
                }
            }
        }

        // Connection closed without an explicit end-of-stream marker; treat
        // it as a normal close, as a browser EventSource does.
        self.commit();
        Ok(())
    }

    fn commit(&mut self) {
        let speech = self.consumer.on_close();
        self.conversation.history.push(speech);
    }
}
