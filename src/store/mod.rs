pub mod models;

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{info, warn};
use uuid::Uuid;

use crate::doc_processor::{chunk_text, DocError, DEFAULT_MAX_CHARS};
use crate::llm::ollama::OllamaClient;
use crate::llm::{LlmError, StreamChunk};
use crate::prompt::build_prompt;
use crate::retrieval::{top_chunks, DEFAULT_TOP_K};

use models::{
    Chunk, Conversation, ConversationSummary, DocumentContext, Fingerprint, Message, Role,
};

/// Seeded assistant message every new conversation starts with.
pub const GREETING: &str = "Hello! How can I help you today?";

const TITLE_CHARS: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no conversation with id {0}")]
    UnknownConversation(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Result of offering a file to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Text was extracted and chunked; the conversation now answers from it.
    Attached { chunk_count: usize },
    /// Same file as the last upload, nothing to do.
    Unchanged,
    /// Extraction produced nothing usable; any prior document is kept.
    Failed,
}

#[derive(Debug, Default)]
struct Inner {
    conversations: HashMap<String, Conversation>,
    active: Option<String>,
}

/// In-memory conversation state for one run: every conversation, its
/// messages and attached document, and which one the user is looking at.
///
/// All state sits behind one `Mutex`; the lock is never held across an
/// await.
#[derive(Debug)]
pub struct SessionStore {
    max_chunk_chars: usize,
    top_k: usize,
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new(max_chunk_chars: usize, top_k: usize) -> Self {
        SessionStore {
            max_chunk_chars,
            top_k,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Start a fresh conversation, seeded with the greeting, and make it
    /// the active one.
    pub fn create(&self) -> Conversation {
        let conversation = Conversation {
            id: Uuid::now_v7().to_string(),
            messages: vec![Message::assistant(GREETING)],
            document: None,
            last_upload: None,
        };

        let mut inner = self.inner.lock().unwrap();
        inner
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        inner.active = Some(conversation.id.clone());
        info!(id = %conversation.id, "created conversation");
        conversation
    }

    /// Offer an uploaded file to a conversation.
    ///
    /// `extract` is only invoked when the fingerprint differs from the
    /// last upload, so re-offering the same file does no work. On
    /// success the conversation's document is replaced wholesale and the
    /// upload acknowledgement pair is appended. On failure a notice is
    /// appended, any prior document stays attached, and the fingerprint
    /// is still recorded so the same failing file is not retried.
    pub fn attach_document<F>(
        &self,
        id: &str,
        name: &str,
        fingerprint: Fingerprint,
        extract: F,
    ) -> Result<AttachOutcome, StoreError>
    where
        F: FnOnce() -> Result<String, DocError>,
    {
        let mut inner = self.inner.lock().unwrap();
        let conversation = inner
            .conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))?;

        if conversation.last_upload.as_ref() == Some(&fingerprint) {
            return Ok(AttachOutcome::Unchanged);
        }
        conversation.last_upload = Some(fingerprint.clone());

        let text = match extract() {
            Ok(text) => text,
            Err(err) => {
                warn!(file = name, error = %err, "text extraction failed");
                String::new()
            }
        };

        if text.is_empty() {
            conversation
                .messages
                .push(Message::assistant("Failed to extract text from this file."));
            return Ok(AttachOutcome::Failed);
        }

        let chunks: Vec<Chunk> = chunk_text(&text, self.max_chunk_chars)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk { index, text })
            .collect();
        let chunk_count = chunks.len();

        conversation.document = Some(DocumentContext {
            fingerprint,
            text,
            chunks,
        });
        conversation
            .messages
            .push(Message::user(format!("I uploaded {}", name)));
        conversation.messages.push(Message::assistant(format!(
            "File processed. Extracted {} chunks.",
            chunk_count
        )));

        info!(id, file = name, chunk_count, "attached document");
        Ok(AttachOutcome::Attached { chunk_count })
    }

    /// Answer a query against the conversation's document.
    ///
    /// Retrieves the top chunks, builds the grounding prompt, and streams
    /// the generation through `on_delta`. The user query and the answer
    /// are appended as a pair only once generation succeeds; a failed
    /// call leaves the history exactly as it was.
    pub async fn ask(
        &self,
        id: &str,
        query: &str,
        client: &OllamaClient,
        model: &str,
        on_delta: impl Fn(StreamChunk) + Send,
    ) -> Result<String, StoreError> {
        let prompt = {
            let inner = self.inner.lock().unwrap();
            let conversation = inner
                .conversations
                .get(id)
                .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))?;

            let chunks = conversation
                .document
                .as_ref()
                .map(|doc| doc.chunks.as_slice())
                .unwrap_or(&[]);
            let top = top_chunks(query, chunks, self.top_k);
            let texts: Vec<&str> = top.iter().map(|chunk| chunk.text.as_str()).collect();
            build_prompt(&texts, query)
        }; // lock released here

        let answer = client.generate(model, &prompt, on_delta).await?;

        let mut inner = self.inner.lock().unwrap();
        let conversation = inner
            .conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))?;
        conversation.messages.push(Message::user(query));
        conversation
            .messages
            .push(Message::assistant(answer.clone()));

        Ok(answer)
    }

    /// Summaries of every conversation, most recent first.
    pub fn list_conversations(&self) -> Vec<ConversationSummary> {
        let inner = self.inner.lock().unwrap();
        let mut summaries: Vec<ConversationSummary> = inner
            .conversations
            .values()
            .map(|conversation| ConversationSummary {
                id: conversation.id.clone(),
                title: derive_title(&conversation.messages),
                message_count: conversation.messages.len(),
            })
            .collect();
        // v7 ids embed their creation time, so id order is recency order.
        summaries.sort_by(|a, b| b.id.cmp(&a.id));
        summaries
    }

    pub fn switch_to(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.conversations.contains_key(id) {
            return Err(StoreError::UnknownConversation(id.to_string()));
        }
        inner.active = Some(id.to_string());
        Ok(())
    }

    pub fn active_id(&self) -> Option<String> {
        self.inner.lock().unwrap().active.clone()
    }

    /// Snapshot of a conversation's history for rendering.
    pub fn messages(&self, id: &str) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .conversations
            .get(id)
            .map(|conversation| conversation.messages.clone())
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        SessionStore::new(DEFAULT_MAX_CHARS, DEFAULT_TOP_K)
    }
}

/// First user message truncated for the sidebar, or a placeholder.
fn derive_title(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|message| message.role == Role::User)
        .map(|message| {
            let truncated: String = message.content.chars().take(TITLE_CHARS).collect();
            format!("{}...", truncated)
        })
        .unwrap_or_else(|| "New Chat".to_string())
}
