use super::anthropic_types::{MessagesResponse, ResponseContentBlock, Usage};
use super::openai_types::{ChatCompletionResponse, ChatToolCall};
use super::stop_reason::StopReason;
use crate::error::{GatewayError, Result};

/// Translate an `OpenAI` chat completion into an Anthropic Messages response.
///
/// `requested_model` is echoed back instead of whatever model the upstream reports.
/// Zero choices, or tool-call arguments that are not JSON, are translation errors.
pub fn openai_to_anthropic(
    resp: &ChatCompletionResponse,
    requested_model: &str,
) -> Result<MessagesResponse> {
    let choice = resp
        .choices
        .first()
        .ok_or_else(|| GatewayError::translation("upstream response contained no choices"))?;

    let mut content: Vec<ResponseContentBlock> = Vec::new();

    if let Some(text) = choice.message.content.as_deref().filter(|t| !t.is_empty()) {
        content.push(ResponseContentBlock::Text {
            text: text.to_string(),
        });
    }

    for tc in choice.message.tool_calls.iter().flatten() {
        content.push(tool_use_block(tc)?);
    }

    let usage = resp.usage.map_or_else(Usage::default, |u| Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    Ok(MessagesResponse {
        id: message_id(&resp.id),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: requested_model.to_string(),
        stop_reason: Some(StopReason::from_finish_reason(
            choice.finish_reason.as_deref(),
        )),
        stop_sequence: None,
        usage,
    })
}

fn tool_use_block(tc: &ChatToolCall) -> Result<ResponseContentBlock> {
    let raw = tc.function.arguments.trim();
    let input = if raw.is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(raw).map_err(|e| {
            GatewayError::translation(format!(
                "tool call '{}' ({}) has unparsable arguments: {}",
                tc.function.name, tc.id, e
            ))
        })?
    };

    Ok(ResponseContentBlock::ToolUse {
        id: tc.id.clone(),
        name: tc.function.name.clone(),
        input,
    })
}

/// Reuse the upstream completion id, reshaped to look like an Anthropic id.
fn message_id(upstream_id: &str) -> String {
    let bare = upstream_id.trim_start_matches("chatcmpl-");
    if bare.is_empty() {
        format!("msg_{}", uuid::Uuid::new_v4().simple())
    } else {
        format!("msg_{bare}")
    }
}
