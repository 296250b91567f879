pub mod ollama;

use serde::{Deserialize, Serialize};

/// One streamed fragment of a generation, handed to the caller as it
/// arrives. `done` is set once, on the final notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}
