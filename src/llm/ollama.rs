use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LlmError, StreamChunk};

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "tinyllama";

/// Client for a local Ollama server's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    host: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// One NDJSON record of a generate stream. Only the text fragment
/// matters here; records without one deserialize to an empty fragment.
#[derive(Debug, Deserialize)]
struct GenerateRecord {
    #[serde(default)]
    response: String,
}

impl OllamaClient {
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into().trim_end_matches('/').to_string();
        OllamaClient {
            host,
            client: reqwest::Client::new(),
        }
    }

    /// Stream a completion for `prompt`, invoking `on_chunk` for every
    /// text fragment as it arrives and once more with `done` set.
    ///
    /// Returns the full accumulated response text. Malformed stream
    /// records are skipped rather than failing the whole generation.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        on_chunk: impl Fn(StreamChunk) + Send,
    ) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.host);
        let body = GenerateRequest { model, prompt };

        debug!(model, prompt_chars = prompt.chars().count(), "requesting generation");

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, message });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full_text = String::new();

        while let Some(item) = stream.next().await {
            let bytes = item?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].to_string();
                buffer.drain(..=pos);
                append_fragment(&line, &mut full_text, &on_chunk);
            }
        }

        // A final record may arrive without a trailing newline.
        append_fragment(&buffer, &mut full_text, &on_chunk);

        on_chunk(StreamChunk {
            delta: String::new(),
            done: true,
        });

        Ok(full_text)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        OllamaClient::new(DEFAULT_HOST)
    }
}

/// Parse one stream line and forward its fragment. Blank lines, records
/// without a fragment, and lines that fail to parse are all skipped.
fn append_fragment(line: &str, full_text: &mut String, on_chunk: &impl Fn(StreamChunk)) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if let Ok(record) = serde_json::from_str::<GenerateRecord>(line) {
        if record.response.is_empty() {
            return;
        }
        full_text.push_str(&record.response);
        on_chunk(StreamChunk {
            delta: record.response,
            done: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::testutil::{spawn_generate_server, unreachable_host};

    #[test]
    fn test_append_fragment_accumulates_text() {
        let deltas = Mutex::new(Vec::new());
        let mut full = String::new();
        let on_chunk = |chunk: StreamChunk| deltas.lock().unwrap().push(chunk.delta);

        append_fragment(r#"{"response":"Hel"}"#, &mut full, &on_chunk);
        append_fragment(r#"{"response":"lo","done":false}"#, &mut full, &on_chunk);

        assert_eq!(full, "Hello");
        assert_eq!(*deltas.lock().unwrap(), vec!["Hel", "lo"]);
    }

    #[test]
    fn test_append_fragment_skips_malformed_lines() {
        let mut full = String::new();
        append_fragment("not json at all", &mut full, &|_| {});
        append_fragment(r#"{"response": 42}"#, &mut full, &|_| {});
        assert_eq!(full, "");
    }

    #[test]
    fn test_append_fragment_skips_records_without_text() {
        let mut full = String::new();
        append_fragment(r#"{"done":true,"total_duration":12345}"#, &mut full, &|_| {});
        append_fragment("", &mut full, &|_| {});
        assert_eq!(full, "");
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            model: "tinyllama",
            prompt: "hi",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"model": "tinyllama", "prompt": "hi"})
        );
    }

    #[test]
    fn test_host_trailing_slash_is_trimmed() {
        let client = OllamaClient::new("http://localhost:11434/");
        assert_eq!(client.host, "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_generate_accumulates_streamed_fragments() {
        let ndjson = concat!(
            r#"{"model":"tinyllama","response":"The ","done":false}"#,
            "\n",
            r#"{"model":"tinyllama","response":"answer.","done":false}"#,
            "\n",
            r#"{"model":"tinyllama","response":"","done":true}"#,
            "\n",
        );
        let (host, request_body) = spawn_generate_server("200 OK", ndjson).await;

        let deltas = Mutex::new(Vec::new());
        let client = OllamaClient::new(&host);
        let full = client
            .generate("tinyllama", "question", |chunk: StreamChunk| {
                deltas.lock().unwrap().push((chunk.delta, chunk.done));
            })
            .await
            .unwrap();

        assert_eq!(full, "The answer.");
        let deltas = deltas.into_inner().unwrap();
        assert_eq!(
            deltas,
            vec![
                ("The ".to_string(), false),
                ("answer.".to_string(), false),
                (String::new(), true),
            ]
        );

        let sent: serde_json::Value =
            serde_json::from_str(&request_body.await.unwrap()).unwrap();
        assert_eq!(sent, serde_json::json!({"model": "tinyllama", "prompt": "question"}));
    }

    #[tokio::test]
    async fn test_generate_tolerates_garbage_records() {
        let ndjson = concat!(
            r#"{"response":"ok"}"#,
            "\n",
            "<<<broken>>>\n",
            r#"{"done":true}"#,
            "\n",
        );
        let (host, _request_body) = spawn_generate_server("200 OK", ndjson).await;

        let client = OllamaClient::new(&host);
        let full = client.generate("tinyllama", "q", |_| {}).await.unwrap();
        assert_eq!(full, "ok");
    }

    #[tokio::test]
    async fn test_generate_reads_unterminated_final_record() {
        let ndjson = concat!(
            r#"{"response":"almost "}"#,
            "\n",
            r#"{"response":"done"}"#,
        );
        let (host, _request_body) = spawn_generate_server("200 OK", ndjson).await;

        let client = OllamaClient::new(&host);
        let full = client.generate("tinyllama", "q", |_| {}).await.unwrap();
        assert_eq!(full, "almost done");
    }

    #[tokio::test]
    async fn test_generate_surfaces_api_errors() {
        let (host, _request_body) = spawn_generate_server(
            "500 Internal Server Error",
            r#"{"error":"model not found"}"#,
        )
        .await;

        let client = OllamaClient::new(&host);
        let err = client.generate("missing", "q", |_| {}).await.unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("model not found"));
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_surfaces_connection_errors() {
        let client = OllamaClient::new(unreachable_host().await);
        let err = client.generate("tinyllama", "q", |_| {}).await.unwrap_err();
        assert!(matches!(err, LlmError::Http(_)));
    }

    /// Needs a running Ollama server with the default model pulled.
    #[tokio::test]
    #[ignore]
    async fn test_generate_against_live_server() {
        let client = OllamaClient::new(DEFAULT_HOST);
        let full = client
            .generate(DEFAULT_MODEL, "Reply with one word: hello", |_| {})
            .await
            .unwrap();
        assert!(!full.is_empty());
    }
}
