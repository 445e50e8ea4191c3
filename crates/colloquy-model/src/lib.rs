//! Language-model backend interface.
//!
//! The rest of the server treats the model as an opaque
//! `generate(messages) -> text` capability. Only the error taxonomy leaks
//! out: transient failures (timeout, connect, 429, 5xx) let the
//! orchestrator substitute its deterministic fallback reply instead of
//! failing the request.

pub mod client;
pub mod http;

pub use client::{
    ChatMessage, Generation, GenerateOptions, ModelClient, ModelError, MsgRole,
};
pub use http::HttpModelClient;
