use crate::llm::CompletionClient;
use crate::relay::{ self, RelayError };
use crate::models::chat::ConverseParams;
use std::sync::Arc;
use axum::{
    routing::get,
    Router,
    extract::{ State, Query },
    body::Body,
    http::{ header::{ HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_TYPE }, HeaderMap, StatusCode },
    response::{ IntoResponse, Response },
    Json,
};
use once_cell::sync::Lazy;
use tower_http::cors::{ Any, CorsLayer };
use log::error;

/// Headers declared on every successful streaming response. The CORS layer
/// adds `Access-Control-Allow-Origin: *` on top of these.
pub static STREAM_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream;charset=utf-8"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no")
    );
    headers
});

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn CompletionClient>,
    pub persona: Arc<str>,
}

impl AppState {
    pub fn new(client: Arc<dyn CompletionClient>, persona: &str) -> Self {
        Self {
            client,
            persona: Arc::from(persona),
        }
    }
}

/// The full application: one parameterized converse handler mounted for both
/// the query-parameter and JSON-body transports, behind an allow-any CORS
/// layer.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/converse", get(converse_query).post(converse_body))
        .layer(cors)
        .with_state(state)
}

async fn converse_query(
    State(state): State<AppState>,
    Query(params): Query<ConverseParams>
) -> Response {
    converse(state, params).await
}

async fn converse_body(
    State(state): State<AppState>,
    Json(params): Json<ConverseParams>
) -> Response {
    converse(state, params).await
}

/// Validate, construct the upstream message list, then relay the upstream
/// byte stream to the caller untransformed. The relay holds no conversation
/// memory between requests.
async fn converse(state: AppState, params: ConverseParams) -> Response {
    let prepared = match relay::prepare(&state.persona, &params) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("Rejecting converse request: {}", e);
            return rejection(e);
        }
    };

    match state.client.stream_chat(prepared.messages, prepared.temperature).await {
        Ok(stream) => {
            let mut response = Response::new(Body::from_stream(stream));
            *response.status_mut() = StatusCode::OK;
            response.headers_mut().extend(STREAM_HEADERS.clone());
            response
        }
        Err(e) => {
            error!("Upstream call failed: {}", e);
            rejection(RelayError::from(e))
        }
    }
}

fn rejection(error: RelayError) -> Response {
    (StatusCode::BAD_REQUEST, Json(error.to_body())).into_response()
}
