use crate::assets;
use crate::config::GatewayConfig;
use crate::credentials::resolve_bearer_token;
use crate::error::{GatewayError, Result};
use crate::translate::anthropic_types::{MessagesRequest, StreamEvent};
use crate::upstream;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub client: reqwest::Client,
    /// Fallback credential, resolved once at startup.
    pub default_token: Option<String>,
}

impl AppState {
    pub fn new(config: GatewayConfig, client: reqwest::Client) -> Self {
        let default_token = config.resolve_default_token();
        Self {
            config,
            client,
            default_token,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/messages", post(handle_messages).fallback(not_found))
        .route("/", get(|| page(assets::HTML, assets::INDEX_HTML)).fallback(not_found))
        .route("/terms", get(|| page(assets::HTML, assets::TERMS_HTML)).fallback(not_found))
        .route(
            "/privacy",
            get(|| page(assets::HTML, assets::PRIVACY_HTML)).fallback(not_found),
        )
        .route(
            "/install.sh",
            get(|| page(assets::SHELL_SCRIPT, assets::INSTALL_SH)).fallback(not_found),
        )
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let req: MessagesRequest = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "Failed to parse request");
        GatewayError::invalid_request(format!("Invalid request body: {e}"))
    })?;

    let token = resolve_bearer_token(&headers, state.default_token.as_deref())?;

    info!(
        model = %req.model,
        stream = req.is_streaming(),
        messages = req.messages.len(),
        "Request"
    );

    if req.is_streaming() {
        let events = upstream::stream(&req, &token, &state.config, &state.client).await?;
        Ok(sse_response(events))
    } else {
        let message = upstream::complete(&req, &token, &state.config, &state.client).await?;
        Ok(Json(message).into_response())
    }
}

fn sse_response(events: upstream::EventStream) -> Response {
    let sse_events = events.map(|event| -> std::result::Result<Event, Infallible> {
        Ok(to_sse_event(&event))
    });

    let keep_alive = KeepAlive::default().event(to_sse_event(&StreamEvent::Ping));

    let mut response = Sse::new(sse_events).keep_alive(keep_alive).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

fn to_sse_event(event: &StreamEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().event(event.event_name()).data(json),
        Err(e) => {
            error!(error = %e, event = event.event_name(), "Failed to serialise stream event");
            Event::default()
                .event("error")
                .data(r#"{"type":"error","error":{"type":"api_error","message":"serialisation failure"}}"#)
        }
    }
}

async fn page(content_type: &'static str, body: &'static str) -> Response {
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}
