use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use docchat::doc_processor::{self, MediaType, DEFAULT_MAX_CHARS};
use docchat::llm::ollama::{DEFAULT_HOST, DEFAULT_MODEL};
use docchat::retrieval::DEFAULT_TOP_K;
use docchat::store::models::{Fingerprint, Message};
use docchat::store::AttachOutcome;
use docchat::{OllamaClient, SessionStore};

/// Chat with your documents from the terminal, answered by a local model.
#[derive(Debug, Parser)]
#[command(name = "docchat", version, about)]
struct Args {
    /// Ollama server generation requests go to
    #[arg(long, env = "DOCCHAT_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Model used for generation
    #[arg(long, env = "DOCCHAT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Chunk size budget in characters
    #[arg(long, default_value_t = DEFAULT_MAX_CHARS)]
    chunk_chars: usize,

    /// Number of chunks retrieved per query
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,
}

const HELP: &str = "\
Commands:
  /new            start a new conversation
  /list           list conversations, most recent first
  /open <n>       switch to conversation <n> from /list
  /upload <path>  attach a document (txt, md, pdf, docx)
  /help           show this help
  /quit           exit
Anything else is asked against the attached document.";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let store = SessionStore::new(args.chunk_chars, args.top_k);
    let client = OllamaClient::new(&args.host);

    println!("docchat - type /help for commands");
    let conversation = store.create();
    render_history(&conversation.messages);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt_marker();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/new" => {
                let conversation = store.create();
                render_history(&conversation.messages);
            }
            "/list" => render_listing(&store),
            "/open" => handle_open(&store, rest),
            "/upload" => handle_upload(&store, rest),
            _ if command.starts_with('/') => println!("Unknown command. Type /help."),
            _ => handle_query(&store, &client, &args.model, line).await,
        }
        prompt_marker();
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn prompt_marker() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn render_history(messages: &[Message]) {
    for message in messages {
        println!("[{}] {}", message.role, message.content);
    }
}

fn render_listing(store: &SessionStore) {
    let active = store.active_id();
    for (position, summary) in store.list_conversations().iter().enumerate() {
        let marker = if Some(&summary.id) == active.as_ref() {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:>2}. {} ({} messages)",
            marker,
            position + 1,
            summary.title,
            summary.message_count
        );
    }
}

fn handle_open(store: &SessionStore, arg: &str) {
    let Ok(position) = arg.parse::<usize>() else {
        println!("Usage: /open <number from /list>");
        return;
    };
    let summaries = store.list_conversations();
    let Some(summary) = position.checked_sub(1).and_then(|i| summaries.get(i)) else {
        println!("No conversation {} in the list.", position);
        return;
    };
    match store
        .switch_to(&summary.id)
        .and_then(|_| store.messages(&summary.id))
    {
        Ok(messages) => render_history(&messages),
        Err(err) => println!("{}", err),
    }
}

fn handle_upload(store: &SessionStore, path_arg: &str) {
    if path_arg.is_empty() {
        println!("Usage: /upload <path>");
        return;
    }
    let Some(id) = store.active_id() else {
        println!("No active conversation. Use /new first.");
        return;
    };

    let path = PathBuf::from(path_arg);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            println!("Cannot read {}: {}", path.display(), err);
            return;
        }
    };
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let media_type = MediaType::from_path(&path)
        .map(|m| m.as_mime())
        .unwrap_or("application/octet-stream");
    let fingerprint = Fingerprint {
        name: name.clone(),
        size: bytes.len() as u64,
    };

    let outcome = store.attach_document(&id, &name, fingerprint, || {
        doc_processor::extract_text(media_type, &bytes)
    });
    match outcome {
        Ok(AttachOutcome::Attached { chunk_count }) => {
            println!("File processed. Extracted {} chunks.", chunk_count);
        }
        Ok(AttachOutcome::Unchanged) => println!("{} is already attached.", name),
        Ok(AttachOutcome::Failed) => println!("Failed to extract text from this file."),
        Err(err) => println!("Upload failed: {}", err),
    }
}

async fn handle_query(store: &SessionStore, client: &OllamaClient, model: &str, query: &str) {
    let Some(id) = store.active_id() else {
        println!("No active conversation. Use /new first.");
        return;
    };

    let result = store
        .ask(&id, query, client, model, |chunk| {
            if !chunk.delta.is_empty() {
                print!("{}", chunk.delta);
                let _ = std::io::stdout().flush();
            }
        })
        .await;

    match result {
        Ok(_) => println!(),
        Err(err) => println!("\nGeneration failed: {}", err),
    }
}
