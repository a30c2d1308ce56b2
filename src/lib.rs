//! Serve Anthropic Messages API clients from any OpenAI-compatible backend.
//!
//! The [`translate`] module holds the protocol translation and is free of I/O;
//! [`server`] and [`upstream`] wire it to HTTP.

pub mod assets;
pub mod config;
pub mod credentials;
pub mod error;
pub mod server;
pub mod translate;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use server::{build_router, AppState};
