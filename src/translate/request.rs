//! Translate Anthropic Messages API requests into `OpenAI` Chat Completions requests.
//!
//! A single Anthropic message can expand into several `OpenAI` messages: each
//! `tool_result` block becomes its own `tool`-role message, emitted in authored
//! order relative to the surrounding text.

use super::anthropic_types::{
    ContentBlock, Message, MessagesRequest, Role, Tool, ToolChoice, ToolResultContent,
};
use super::openai_types::{
    ChatCompletionRequest, ChatContent, ChatFunction, ChatFunctionName, ChatMessage, ChatTool,
    ChatToolCall, ChatToolCallFunction, ChatToolChoice, ChatToolChoiceFunction, ContentPart,
    ImageUrlDetail, StreamOptions,
};

/// Translate an Anthropic Messages API request into an `OpenAI` Chat Completions request.
///
/// Pure: the model name and sampling parameters pass through untouched.
pub fn anthropic_to_openai(req: &MessagesRequest) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);

    if let Some(ref system) = req.system {
        messages.push(ChatMessage::text("system", system.as_text()));
    }

    for msg in &req.messages {
        messages.extend(translate_message(msg));
    }

    let tools = req
        .tools
        .as_ref()
        .map(|tools| tools.iter().map(translate_tool).collect());

    let tool_choice = req.tool_choice.as_ref().map(translate_tool_choice);
    let parallel_tool_calls = req
        .tool_choice
        .as_ref()
        .filter(|tc| tc.disables_parallel_tool_use())
        .map(|_| false);

    let stream_options = req.stream.filter(|s| *s).map(|_| StreamOptions {
        include_usage: true,
    });

    let user = req.metadata.as_ref().and_then(|m| m.user_id.clone());

    ChatCompletionRequest {
        model: req.model.clone(),
        messages,
        max_tokens: Some(req.max_tokens),
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        stream_options,
        tools,
        tool_choice,
        parallel_tool_calls,
        stop: req.stop_sequences.clone(),
        user,
    }
}

fn translate_message(msg: &Message) -> Vec<ChatMessage> {
    let blocks = msg.content.blocks();

    match msg.role {
        Role::User => translate_user_message(&blocks),
        Role::Assistant => vec![translate_assistant_message(&blocks)],
    }
}

/// Text and images accumulate into one user message; a `tool_result` flushes
/// whatever has accumulated and is emitted as its own `tool` message.
fn translate_user_message(blocks: &[ContentBlock]) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    let mut parts: Vec<ContentPart> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => {
                parts.push(ContentPart::Text { text: text.clone() });
            }
            ContentBlock::Image { source } => {
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrlDetail {
                        url: format!("data:{};base64,{}", source.media_type, source.data),
                    },
                });
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                if !parts.is_empty() {
                    messages.push(user_message(std::mem::take(&mut parts)));
                }
                messages.push(ChatMessage::tool_result(
                    tool_use_id.clone(),
                    tool_result_to_string(content.as_ref(), *is_error),
                ));
            }
            ContentBlock::ToolUse { .. }
            | ContentBlock::Thinking { .. }
            | ContentBlock::RedactedThinking { .. } => {}
        }
    }

    if !parts.is_empty() || messages.is_empty() {
        messages.push(user_message(parts));
    }

    messages
}

fn translate_assistant_message(blocks: &[ContentBlock]) -> ChatMessage {
    let mut text = String::new();
    let mut tool_calls: Vec<ChatToolCall> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ChatToolCall {
                    id: id.clone(),
                    call_type: "function".to_string(),
                    function: ChatToolCallFunction {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                });
            }
            ContentBlock::Image { .. }
            | ContentBlock::ToolResult { .. }
            | ContentBlock::Thinking { .. }
            | ContentBlock::RedactedThinking { .. } => {}
        }
    }

    // Chat completions wants `content: null` rather than "" alongside tool calls.
    let content = if text.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(ChatContent::Text(text))
    };

    ChatMessage {
        role: Role::Assistant.as_str().to_string(),
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    }
}

/// Text-only content collapses to the plain-string form, concatenated in order.
fn user_message(parts: Vec<ContentPart>) -> ChatMessage {
    let text_only = parts.iter().all(|p| matches!(p, ContentPart::Text { .. }));

    if text_only {
        let text: String = parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect();
        return ChatMessage::text("user", text);
    }

    ChatMessage {
        role: Role::User.as_str().to_string(),
        content: Some(ChatContent::Parts(parts)),
        tool_calls: None,
        tool_call_id: None,
    }
}

fn tool_result_to_string(content: Option<&ToolResultContent>, is_error: Option<bool>) -> String {
    let prefix = if is_error == Some(true) { "ERROR: " } else { "" };

    let body = match content {
        Some(ToolResultContent::Text(t)) => t.clone(),
        Some(ToolResultContent::Blocks(blocks)) => {
            let texts: Option<Vec<&str>> = blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect();

            // Anything richer than plain text goes through as JSON.
            match texts {
                Some(texts) => texts.join("\n"),
                None => serde_json::to_string(blocks).unwrap_or_default(),
            }
        }
        None => String::new(),
    };

    format!("{prefix}{body}")
}

fn translate_tool(tool: &Tool) -> ChatTool {
    ChatTool {
        tool_type: "function".to_string(),
        function: ChatFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        },
    }
}

fn translate_tool_choice(tc: &ToolChoice) -> ChatToolChoice {
    match tc {
        ToolChoice::Auto { .. } => ChatToolChoice::Mode("auto".to_string()),
        ToolChoice::Any { .. } => ChatToolChoice::Mode("required".to_string()),
        ToolChoice::None {} => ChatToolChoice::Mode("none".to_string()),
        ToolChoice::Tool { name, .. } => ChatToolChoice::Function(ChatToolChoiceFunction {
            choice_type: "function".to_string(),
            function: ChatFunctionName { name: name.clone() },
        }),
    }
}
