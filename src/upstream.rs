use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::translate::anthropic_types::{MessagesRequest, MessagesResponse, StreamEvent};
use crate::translate::openai_types::{ChatCompletionRequest, ChatCompletionResponse, StreamFrame};
use crate::translate::request::anthropic_to_openai;
use crate::translate::response::openai_to_anthropic;
use crate::translate::streaming::StreamTranslator;

use eventsource_stream::Eventsource;
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use tracing::{debug, info, warn};

/// Anthropic events for one streamed response, produced as upstream chunks arrive.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Forward a non-streaming request and translate the completion back.
pub async fn complete(
    req: &MessagesRequest,
    token: &str,
    config: &GatewayConfig,
    client: &reqwest::Client,
) -> Result<MessagesResponse> {
    let openai_req = anthropic_to_openai(req);
    let response = send(&openai_req, token, config, client).await?;

    let body = response.bytes().await?;
    let completion: ChatCompletionResponse = serde_json::from_slice(&body).map_err(|e| {
        GatewayError::translation(format!(
            "Failed to parse upstream response: {}. Body: {}",
            e,
            truncate(&String::from_utf8_lossy(&body), 300)
        ))
    })?;

    let message = openai_to_anthropic(&completion, &req.model)?;

    info!(
        input_tokens = message.usage.input_tokens,
        output_tokens = message.usage.output_tokens,
        stop_reason = ?message.stop_reason,
        "Completed"
    );

    Ok(message)
}

/// Forward a streaming request. Upstream failures before any byte of the body
/// arrives come back as `GatewayError::Upstream`; everything later is reported
/// inside the returned stream.
pub async fn stream(
    req: &MessagesRequest,
    token: &str,
    config: &GatewayConfig,
    client: &reqwest::Client,
) -> Result<EventStream> {
    let openai_req = anthropic_to_openai(req);
    let response = send(&openai_req, token, config, client).await?;

    Ok(Box::pin(translate_sse(
        response.bytes_stream(),
        req.model.clone(),
    )))
}

async fn send(
    openai_req: &ChatCompletionRequest,
    token: &str,
    config: &GatewayConfig,
    client: &reqwest::Client,
) -> Result<reqwest::Response> {
    let url = config.completions_url();

    info!(
        url = %url,
        model = %openai_req.model,
        stream = openai_req.stream.unwrap_or(false),
        messages = openai_req.messages.len(),
        "POST upstream"
    );

    let response = client
        .post(&url)
        .bearer_auth(token)
        .json(openai_req)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        let preview = String::from_utf8_lossy(&body);

        warn!(
            status = status.as_u16(),
            body = truncate(&preview, 300),
            "Upstream error, relaying to client"
        );

        return Err(GatewayError::Upstream {
            status,
            content_type,
            body,
        });
    }

    debug!(status = status.as_u16(), "Upstream accepted request");
    Ok(response)
}

/// Decode an upstream SSE byte stream and translate it into Anthropic events.
///
/// Pull-based: nothing is read from `byte_stream` until the returned stream is
/// polled, and dropping the returned stream drops the upstream body with it.
pub fn translate_sse<S, B, E>(
    byte_stream: S,
    model: String,
) -> impl Stream<Item = StreamEvent> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut translator = StreamTranslator::new(&model);
        let frames = byte_stream.eventsource();
        futures::pin_mut!(frames);

        loop {
            let frame = match frames.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    warn!(error = %e, "Upstream stream failed");
                    for event in translator.abort(format!("upstream stream failed: {e}")) {
                        yield event;
                    }
                    break;
                }
                None => {
                    for event in translator.finish() {
                        yield event;
                    }
                    break;
                }
            };

            let data = frame.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                for event in translator.finish() {
                    yield event;
                }
                break;
            }

            match serde_json::from_str::<StreamFrame>(data) {
                Ok(StreamFrame::Chunk(chunk)) => {
                    for event in translator.process_chunk(&chunk) {
                        yield event;
                    }
                }
                Ok(StreamFrame::Error { error }) => {
                    warn!(message = %error.message, "Upstream reported an error mid-stream");
                    for event in translator.abort(format!("upstream error: {}", error.message)) {
                        yield event;
                    }
                    break;
                }
                Err(e) => {
                    warn!(error = %e, frame = truncate(data, 200), "Malformed upstream frame");
                    for event in translator.abort(format!("malformed upstream frame: {e}")) {
                        yield event;
                    }
                    break;
                }
            }
        }

        let summary = translator.message();
        info!(
            blocks = summary.content.len(),
            output_tokens = summary.usage.output_tokens,
            stop_reason = ?summary.stop_reason,
            "Stream completed"
        );
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
