//! API translation between Anthropic and `OpenAI` formats.
//!
//! Converts requests, responses, and streaming events between the two API
//! formats. All translation functions are pure (no I/O); the stream translator
//! keeps state for exactly one stream.

pub mod anthropic_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod stop_reason;
pub mod streaming;
