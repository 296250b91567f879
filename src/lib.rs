pub mod doc_processor;
pub mod llm;
pub mod prompt;
pub mod retrieval;
pub mod store;

#[cfg(test)]
pub mod testutil;

pub use llm::ollama::OllamaClient;
pub use store::models::{Conversation, Message, Role};
pub use store::SessionStore;
