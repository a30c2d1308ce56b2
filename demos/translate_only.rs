//! Use the translation layer without a server.
//!
//! Usage:
//!   `cargo run --example translate_only`

use anthropic_gateway::translate::anthropic_types::{
    ContentBlock, Message, MessageContent, MessagesRequest, SystemContent,
};
use anthropic_gateway::translate::openai_types::{
    ChatCompletionChunk, ChatCompletionResponse, ChatUsage, Choice, ChoiceMessage, ChunkChoice,
    ChunkDelta,
};
use anthropic_gateway::translate::request::anthropic_to_openai;
use anthropic_gateway::translate::response::openai_to_anthropic;
use anthropic_gateway::translate::streaming::StreamTranslator;

fn main() -> anyhow::Result<()> {
    let mut anthropic_req = MessagesRequest::new(
        "anthropic/claude-sonnet-4",
        1024,
        vec![
            Message::user(MessageContent::Text(
                "What is the capital of France?".to_string(),
            )),
            Message::assistant(MessageContent::Text(
                "The capital of France is Paris.".to_string(),
            )),
            Message::user(MessageContent::Blocks(vec![ContentBlock::Text {
                text: "And Germany?".to_string(),
            }])),
        ],
    );
    anthropic_req.system = Some(SystemContent::Text(
        "You are a geography expert. Be concise.".to_string(),
    ));
    anthropic_req.stream = Some(true);
    anthropic_req.temperature = Some(0.7);

    let openai_req = anthropic_to_openai(&anthropic_req);

    println!("=== Translated request (chat completions) ===");
    println!("{}", serde_json::to_string_pretty(&openai_req)?);

    let openai_resp = ChatCompletionResponse {
        id: "chatcmpl-demo".to_string(),
        model: "anthropic/claude-sonnet-4".to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: Some("assistant".to_string()),
                content: Some("The capital of Germany is Berlin.".to_string()),
                tool_calls: None,
            },
            finish_reason: Some("stop".to_string()),
        }],
        usage: Some(ChatUsage {
            prompt_tokens: 42,
            completion_tokens: 8,
            total_tokens: 50,
        }),
    };

    let anthropic_resp = openai_to_anthropic(&openai_resp, &anthropic_req.model)?;

    println!();
    println!("=== Translated response (Anthropic) ===");
    println!("{}", serde_json::to_string_pretty(&anthropic_resp)?);

    println!();
    println!("=== Streaming translation ===");
    let mut translator = StreamTranslator::new(&anthropic_req.model);
    let pieces = [Some("The capital "), Some("is Berlin."), None];

    for piece in pieces {
        let chunk = ChatCompletionChunk {
            id: "chatcmpl-demo".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    content: piece.map(str::to_string),
                    ..ChunkDelta::default()
                },
                finish_reason: piece.is_none().then(|| "stop".to_string()),
            }],
            ..ChatCompletionChunk::default()
        };
        for event in translator.process_chunk(&chunk) {
            println!("event: {}", event.event_name());
            println!("data: {}", serde_json::to_string(&event)?);
            println!();
        }
    }
    for event in translator.finish() {
        println!("event: {}", event.event_name());
        println!("data: {}", serde_json::to_string(&event)?);
        println!();
    }

    Ok(())
}
