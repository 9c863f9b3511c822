use async_trait::async_trait;
use axum::body::{ to_bytes, Body, Bytes };
use axum::http::{ header::CONTENT_TYPE, Request, StatusCode };
use converse_relay::client::{ ChatSession, ClientError };
use converse_relay::llm::{ ByteStream, CompletionClient, UpstreamError };
use converse_relay::models::chat::{ ChatMessage, Speaker };
use converse_relay::server::api::{ app, AppState };
use futures::{ stream, StreamExt };
use std::error::Error as StdError;
use std::io;
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tokio::time::timeout;
use tower::ServiceExt;

const PERSONA: &str = "You are a test persona.";

enum Behavior {
    /// Replay the canned chunks and end the stream.
    Stream,
    /// Reject without streaming, as on a non-success upstream status.
    Fail(u16, &'static str),
    /// Replay the canned chunks, then fail the byte stream mid-body.
    AbortAfterChunks,
    /// First call: emit one delta then hang forever. Later calls: `Stream`.
    StallOnce,
}

/// Test double for the upstream provider: records every invocation and
/// replays canned bytes per its configured behavior.
struct MockUpstream {
    calls: AtomicUsize,
    captured: Mutex<Vec<(Vec<ChatMessage>, f32)>>,
    chunks: Vec<&'static str>,
    behavior: Behavior,
    stalled: AtomicBool,
}

type ChunkResult = Result<Bytes, Box<dyn StdError + Send + Sync>>;

impl MockUpstream {
    fn with_behavior(chunks: Vec<&'static str>, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            captured: Mutex::new(Vec::new()),
            chunks,
            behavior,
            stalled: AtomicBool::new(false),
        })
    }

    fn streaming(chunks: Vec<&'static str>) -> Arc<Self> {
        Self::with_behavior(chunks, Behavior::Stream)
    }

    fn failing(status: u16, body: &'static str) -> Arc<Self> {
        Self::with_behavior(Vec::new(), Behavior::Fail(status, body))
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn ok_chunks(&self) -> Vec<ChunkResult> {
        self.chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect()
    }
}

#[async_trait]
impl CompletionClient for MockUpstream {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32
    ) -> Result<ByteStream, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.captured.lock().unwrap().push((messages, temperature));

        match self.behavior {
            Behavior::Fail(status, body) =>
                Err(UpstreamError::Api {
                    status,
                    body: body.to_string(),
                }),
            Behavior::Stream => Ok(Box::pin(stream::iter(self.ok_chunks()))),
            Behavior::AbortAfterChunks => {
                let items = self.ok_chunks();
                // Delay the abort so the response head and the canned chunks
                // flush to the client before the connection resets; an
                // immediate error tears the connection down before the client
                // ever reads the headers.
                let delayed_err = stream::once(async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Err(
                        Box::new(io::Error::from(io::ErrorKind::ConnectionReset)) as Box<
                            dyn StdError + Send + Sync
                        >
                    )
                });
                Ok(Box::pin(stream::iter(items).chain(delayed_err)))
            }
            Behavior::StallOnce => {
                if self.stalled.swap(true, Ordering::SeqCst) {
                    Ok(Box::pin(stream::iter(self.ok_chunks())))
                } else {
                    let first: Vec<ChunkResult> = vec![
                        Ok(
                            Bytes::from_static(
                                b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n"
                            )
                        )
                    ];
                    Ok(Box::pin(stream::iter(first).chain(stream::pending())))
                }
            }
        }
    }
}

fn post_request(conversation: &str, temperature: &str) -> Request<Body> {
    let body = serde_json::json!({
        "conversation": conversation,
        "temperature": temperature,
    });
    Request::builder()
        .method("POST")
        .uri("/api/converse")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Bind the relay on an ephemeral port and return its base URL.
async fn serve(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state).into_make_service()).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn pineapple_scenario_streams_upstream_bytes_unmodified() {
    let upstream = MockUpstream::streaming(vec![
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"I disagree\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" entirely.\"}}]}\n\ndata: [DONE]\n\n",
    ]);
    let router = app(AppState::new(upstream.clone(), PERSONA));

    let conversation = r#"{"history":[{"speaker":"human","text":"Pineapple on pizza?"}]}"#;
    let response = router.oneshot(post_request(conversation, "0.7")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[CONTENT_TYPE], "text/event-stream;charset=utf-8");
    assert_eq!(headers["cache-control"], "no-cache, no-transform");
    assert_eq!(headers["x-accel-buffering"], "no");
    assert_eq!(headers["access-control-allow-origin"], "*");

    // The upstream double saw the persona plus the replayed history.
    assert_eq!(upstream.call_count(), 1);
    let captured = upstream.captured.lock().unwrap();
    let (messages, temperature) = &captured[0];
    assert_eq!(*temperature, 0.7);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], ChatMessage::new("system", PERSONA));
    assert_eq!(messages[1], ChatMessage::new("user", "Pineapple on pizza?"));
    drop(captured);

    // Body is the upstream stream, forwarded byte-for-byte.
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let expected: String = [
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"I disagree\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" entirely.\"}}]}\n\ndata: [DONE]\n\n",
    ].concat();
    assert_eq!(body.as_ref(), expected.as_bytes());
}

#[tokio::test]
async fn out_of_range_temperature_is_rejected_before_any_upstream_call() {
    let upstream = MockUpstream::streaming(vec![]);
    let router = app(AppState::new(upstream.clone(), PERSONA));

    let response = router
        .oneshot(post_request(r#"{"history":[]}"#, "1.5")).await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, serde_json::json!({ "message": "Invalid temperature" }));
    assert_eq!(upstream.call_count(), 0);
}

#[tokio::test]
async fn malformed_conversation_is_rejected_before_any_upstream_call() {
    let upstream = MockUpstream::streaming(vec![]);
    let router = app(AppState::new(upstream.clone(), PERSONA));

    for conversation in ["not json", "null", "{}"] {
        let response = router
            .clone()
            .oneshot(post_request(conversation, "0.7")).await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({ "message": "Invalid conversation" }));
    }
    assert_eq!(upstream.call_count(), 0);
}

#[tokio::test]
async fn query_parameter_transport_matches_body_transport() {
    let upstream = MockUpstream::streaming(vec!["data: [DONE]\n\n"]);
    let router = app(AppState::new(upstream.clone(), PERSONA));

    let conversation = r#"{"history":[{"speaker":"human","text":"hello"}]}"#;
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("conversation", conversation)
        .append_pair("temperature", "0.3")
        .finish();
    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/converse?{}", query))
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream;charset=utf-8");

    assert_eq!(upstream.call_count(), 1);
    let captured = upstream.captured.lock().unwrap();
    let (messages, temperature) = &captured[0];
    assert_eq!(*temperature, 0.3);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1], ChatMessage::new("user", "hello"));
}

#[tokio::test]
async fn upstream_failure_surfaces_as_serialized_error() {
    let upstream = MockUpstream::failing(401, "{\"error\":\"bad key\"}");
    let router = app(AppState::new(upstream.clone(), PERSONA));

    let response = router
        .oneshot(post_request(r#"{"history":[]}"#, "0.7")).await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(upstream.call_count(), 1);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["message"], "upstream returned status 401");
    assert_eq!(value["status"], 401);
    assert_eq!(value["body"], "{\"error\":\"bad key\"}");
}

#[tokio::test]
async fn chat_session_commits_bot_turn_on_done() {
    let upstream = MockUpstream::streaming(vec![
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"I disagree\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" entirely.\"}}]}\n\ndata: [DONE]\n\n",
    ]);
    let url = serve(AppState::new(upstream.clone(), PERSONA)).await;

    let mut session = ChatSession::new(&url);
    let mut rendered = String::new();
    session
        .send("Pineapple on pizza?", "0.7", |delta| rendered.push_str(delta)).await
        .unwrap();

    assert_eq!(rendered, "I disagree entirely.");
    assert!(!session.is_streaming());
    let history = &session.conversation.history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].speaker, Speaker::Human);
    assert_eq!(history[0].text, "Pineapple on pizza?");
    assert_eq!(history[1].speaker, Speaker::Bot);
    assert_eq!(history[1].text, "I disagree entirely.");
}

#[tokio::test]
async fn chat_session_surfaces_relay_rejection_and_keeps_human_turn() {
    let upstream = MockUpstream::streaming(vec![]);
    let url = serve(AppState::new(upstream.clone(), PERSONA)).await;

    let mut session = ChatSession::new(&url);
    let result = session.send("hello", "1.5", |_| {}).await;

    match result {
        Err(ClientError::Relay { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid temperature");
        }
        other => panic!("expected relay rejection, got {:?}", other),
    }
    assert!(!session.is_streaming());
    assert_eq!(upstream.call_count(), 0);

    // The human turn stays in history; no bot turn was committed.
    let history = &session.conversation.history;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].speaker, Speaker::Human);
}

#[tokio::test]
async fn chat_session_mid_stream_failure_discards_partial_reply() {
    let upstream = MockUpstream::with_behavior(
        vec!["data: {\"choices\":[{\"delta\":{\"content\":\"partial output\"}}]}\n\n"],
        Behavior::AbortAfterChunks
    );
    let url = serve(AppState::new(upstream.clone(), PERSONA)).await;

    let mut session = ChatSession::new(&url);
    let result = session.send("hello", "0.7", |_| {}).await;

    assert!(matches!(result, Err(ClientError::Stream(_))));
    assert!(!session.is_streaming());

    // Partial bot output is never appended to history.
    let history = &session.conversation.history;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].speaker, Speaker::Human);
}

#[tokio::test]
async fn cancelled_stream_trips_busy_guard_until_reset() {
    let upstream = MockUpstream::with_behavior(
        vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"hello\"}}]}\n\n",
            "data: [DONE]\n\n"
        ],
        Behavior::StallOnce
    );
    let url = serve(AppState::new(upstream.clone(), PERSONA)).await;

    let mut session = ChatSession::new(&url);

    // Dropping the send future mid-stream is the cancellation path; the
    // consumer is left mid-stream and the partial text uncommitted.
    let cancelled = timeout(Duration::from_millis(500), session.send("hi", "0.5", |_| {})).await;
    assert!(cancelled.is_err());
    assert!(session.is_streaming());

    // A new submission is refused while the previous stream is open, and
    // does not append a human turn.
    assert!(matches!(session.send("again", "0.5", |_| {}).await, Err(ClientError::Busy)));
    assert_eq!(session.conversation.history.len(), 1);

    session.reset();
    assert!(!session.is_streaming());

    session.send("again", "0.5", |_| {}).await.unwrap();
    assert_eq!(upstream.call_count(), 2);
    let history = &session.conversation.history;
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].text, "again");
    assert_eq!(history[2].speaker, Speaker::Bot);
    assert_eq!(history[2].text, "hello");
}
