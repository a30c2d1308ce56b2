//! State machine for translating `OpenAI` streaming chunks into Anthropic SSE events.
//!
//! The [`StreamTranslator`] consumes `ChatCompletionChunk`s one at a time and returns
//! the Anthropic events each chunk justifies, so callers can flush them immediately.
//!
//! Anthropic content blocks are strictly sequential: a block is started, receives
//! deltas, and is stopped before the next one starts. Upstream tool-call fragments
//! are keyed by `(choice index, tool_call index)`; each key is assigned the next
//! free Anthropic index when its block is started, so emitted indices are always
//! `0, 1, 2, ...` regardless of how the upstream numbers its tool calls.
//!
//! Upstreams may interleave fragments of parallel tool calls. While one `tool_use`
//! block is open, a newly seen call is queued and its fragments are buffered; when
//! the open block closes, queued calls are emitted in first-seen order, each as a
//! start, a single `input_json_delta` with the buffered arguments, and a stop.
//! `reasoning_content` deltas are not forwarded.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::anthropic_types::{
    Delta, DeltaUsage, MessageDeltaBody, MessagesResponse, ResponseContentBlock, StreamEvent, Usage,
};
use super::openai_types::{ChatCompletionChunk, ChatUsage, ChunkToolCall};
use super::stop_reason::StopReason;

#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse { id: String, name: String },
}

/// One emitted content block and everything streamed into it so far.
#[derive(Debug, Clone)]
struct BlockState {
    kind: BlockKind,
    buffer: String,
}

impl BlockState {
    fn start_payload(&self) -> ResponseContentBlock {
        match self.kind {
            BlockKind::Text => ResponseContentBlock::Text {
                text: String::new(),
            },
            BlockKind::ToolUse { ref id, ref name } => ResponseContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: serde_json::Value::Object(serde_json::Map::new()),
            },
        }
    }

    fn tool_id(&self) -> Option<&str> {
        match self.kind {
            BlockKind::ToolUse { ref id, .. } => Some(id),
            BlockKind::Text => None,
        }
    }
}

/// A tool call first seen while another `tool_use` block was open. It is
/// buffered whole and emitted as a complete block once that block closes.
#[derive(Debug, Clone)]
struct PendingCall {
    key: (u32, u32),
    id: String,
    name: String,
    arguments: String,
}

/// State machine that translates `OpenAI` streaming chunks into Anthropic SSE events.
///
/// One translator serves exactly one stream:
///
/// ```
/// use anthropic_gateway::translate::streaming::StreamTranslator;
/// # let openai_chunks: Vec<anthropic_gateway::translate::openai_types::ChatCompletionChunk> = Vec::new();
///
/// let mut translator = StreamTranslator::new("claude-sonnet-4-20250514");
/// for chunk in &openai_chunks {
///     let events = translator.process_chunk(chunk);
///     // flush each event to the client
///     # drop(events);
/// }
/// let final_events = translator.finish();
/// assert_eq!(final_events.last().map(|e| e.event_name()), Some("message_stop"));
/// ```
#[derive(Debug)]
pub struct StreamTranslator {
    model: String,
    msg_id: String,
    started: bool,
    finished: bool,
    blocks: Vec<BlockState>,
    open_index: Option<usize>,
    tool_indices: HashMap<(u32, u32), usize>,
    pending: Vec<PendingCall>,
    usage: Option<ChatUsage>,
    finish_reason: Option<StopReason>,
}

impl StreamTranslator {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            msg_id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            started: false,
            finished: false,
            blocks: Vec::new(),
            open_index: None,
            tool_indices: HashMap::new(),
            pending: Vec::new(),
            usage: None,
            finish_reason: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Process a single upstream chunk, returning zero or more Anthropic events.
    pub fn process_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();

        if !self.started {
            events.push(self.message_start());
            self.started = true;
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        for choice in &chunk.choices {
            if let Some(text) = choice.delta.content.as_deref().filter(|s| !s.is_empty()) {
                self.push_text(text, &mut events);
            }

            if let Some(reasoning) = choice.delta.reasoning_content.as_deref() {
                debug!(bytes = reasoning.len(), "reasoning_content dropped");
            }

            for tc in choice.delta.tool_calls.iter().flatten() {
                self.push_tool_fragment(choice.index, tc, &mut events);
            }

            if let Some(reason) = choice.finish_reason.as_deref() {
                self.close_open_block(&mut events);
                self.finish_reason = Some(StopReason::from_finish_reason(Some(reason)));
            }
        }

        events
    }

    /// Close the message after the upstream stream ended cleanly.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();
        if !self.started {
            events.push(self.message_start());
            self.started = true;
        }

        self.close_open_block(&mut events);
        events.push(self.message_delta(self.finish_reason.unwrap_or(StopReason::EndTurn)));
        events.push(StreamEvent::MessageStop);
        events
    }

    /// Terminate the message after an upstream failure.
    ///
    /// Events already emitted stay valid; the message is closed best-effort with
    /// `end_turn` and an `error` event ends the stream. No `message_stop` follows.
    pub fn abort(&mut self, message: impl Into<String>) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();
        if self.started {
            self.close_open_block(&mut events);
            events.push(self.message_delta(StopReason::EndTurn));
        }
        events.push(StreamEvent::api_error(message));
        events
    }

    /// The message as accumulated so far, with each block's streamed content joined.
    ///
    /// Tool arguments that are not (yet) valid JSON are reported as a JSON string.
    pub fn message(&self) -> MessagesResponse {
        let mut message = MessagesResponse::empty(self.msg_id.clone(), self.model.clone());
        message.content = self
            .blocks
            .iter()
            .map(|block| match block.kind {
                BlockKind::Text => ResponseContentBlock::Text {
                    text: block.buffer.clone(),
                },
                BlockKind::ToolUse { ref id, ref name } => ResponseContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: parse_arguments(&block.buffer),
                },
            })
            .chain(self.pending.iter().map(|call| ResponseContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: parse_arguments(&call.arguments),
            }))
            .collect();
        message.stop_reason = self.finish_reason;
        if let Some(usage) = self.usage {
            message.usage = Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            };
        }
        message
    }

    fn push_text(&mut self, text: &str, events: &mut Vec<StreamEvent>) {
        let index = match self.open_index {
            Some(i) if self.blocks[i].kind == BlockKind::Text => i,
            _ => {
                self.close_open_block(events);
                self.open_block(BlockKind::Text, events)
            }
        };

        self.blocks[index].buffer.push_str(text);
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: Delta::TextDelta {
                text: text.to_string(),
            },
        });
    }

    fn push_tool_fragment(
        &mut self,
        choice_index: u32,
        tc: &ChunkToolCall,
        events: &mut Vec<StreamEvent>,
    ) {
        let key = (choice_index, tc.index);
        let fragment_id = tc.id.as_deref().filter(|id| !id.is_empty());
        let fragment_name = tc
            .function
            .as_ref()
            .and_then(|f| f.name.as_deref())
            .filter(|n| !n.is_empty());
        let args = tc
            .function
            .as_ref()
            .and_then(|f| f.arguments.as_deref())
            .unwrap_or("");

        // Some upstreams reuse index 0 for every parallel call; a new id means a new call.
        let same_call = |id: &str| fragment_id.map_or(true, |f| f == id);

        // Queued calls are always newer than emitted blocks for the same key.
        if let Some(pos) = self.pending.iter().rposition(|p| p.key == key) {
            if same_call(&self.pending[pos].id) {
                let call = &mut self.pending[pos];
                if call.name.is_empty() {
                    if let Some(name) = fragment_name {
                        call.name = name.to_string();
                    }
                }
                call.arguments.push_str(args);
                return;
            }
        } else if let Some(&index) = self.tool_indices.get(&key) {
            if same_call(self.blocks[index].tool_id().unwrap_or_default()) {
                self.append_arguments(index, tc.index, args, events);
                return;
            }
        }

        let id = fragment_id.map_or_else(
            || format!("toolu_{}", uuid::Uuid::new_v4().simple()),
            str::to_string,
        );
        let name = fragment_name.unwrap_or_default().to_string();

        if self.open_tool_block().is_some() {
            debug!(upstream_index = tc.index, id = %id, "tool call queued behind open tool_use block");
            self.pending.push(PendingCall {
                key,
                id,
                name,
                arguments: args.to_string(),
            });
            return;
        }

        self.close_open_block(events);
        let index = self.open_block(BlockKind::ToolUse { id, name }, events);
        self.tool_indices.insert(key, index);
        self.append_arguments(index, tc.index, args, events);
    }

    fn append_arguments(
        &mut self,
        index: usize,
        upstream_index: u32,
        args: &str,
        events: &mut Vec<StreamEvent>,
    ) {
        if args.is_empty() {
            return;
        }
        self.blocks[index].buffer.push_str(args);

        if self.open_index == Some(index) {
            events.push(StreamEvent::ContentBlockDelta {
                index,
                delta: Delta::InputJsonDelta {
                    partial_json: args.to_string(),
                },
            });
        } else {
            warn!(
                index,
                upstream_index,
                "argument fragment for an already closed tool_use block; kept in summary only"
            );
        }
    }

    fn open_tool_block(&self) -> Option<usize> {
        self.open_index
            .filter(|&i| matches!(self.blocks[i].kind, BlockKind::ToolUse { .. }))
    }

    fn open_block(&mut self, kind: BlockKind, events: &mut Vec<StreamEvent>) -> usize {
        let index = self.blocks.len();
        let block = BlockState {
            kind,
            buffer: String::new(),
        };

        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block: block.start_payload(),
        });
        self.blocks.push(block);
        self.open_index = Some(index);
        index
    }

    /// Stop the open block, then emit every queued tool call in first-seen order.
    fn close_open_block(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some(index) = self.open_index.take() {
            debug!(index, bytes = self.blocks[index].buffer.len(), "content block closed");
            events.push(StreamEvent::ContentBlockStop { index });
        }

        for call in std::mem::take(&mut self.pending) {
            let index = self.open_block(
                BlockKind::ToolUse {
                    id: call.id,
                    name: call.name,
                },
                events,
            );
            self.tool_indices.insert(call.key, index);
            if !call.arguments.is_empty() {
                events.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: Delta::InputJsonDelta {
                        partial_json: call.arguments.clone(),
                    },
                });
                self.blocks[index].buffer = call.arguments;
            }
            self.open_index = None;
            events.push(StreamEvent::ContentBlockStop { index });
        }
    }

    fn message_start(&self) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessagesResponse::empty(self.msg_id.clone(), self.model.clone()),
        }
    }

    fn message_delta(&self, stop_reason: StopReason) -> StreamEvent {
        StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason),
                stop_sequence: None,
            },
            usage: DeltaUsage {
                input_tokens: self.usage.map(|u| u.prompt_tokens),
                output_tokens: self.usage.map_or(0, |u| u.completion_tokens),
            },
        }
    }
}

fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
