use std::path::Path;

/// Default chunk budget, in characters.
pub const DEFAULT_MAX_CHARS: usize = 1000;

/// Media types the extraction pipeline recognizes. Anything else is
/// reported as unsupported rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    PlainText,
    Markdown,
    Pdf,
    Docx,
}

impl MediaType {
    /// Resolve a declared MIME type, e.g. from a file picker.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "text/plain" => Some(MediaType::PlainText),
            "text/markdown" => Some(MediaType::Markdown),
            "application/pdf" => Some(MediaType::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(MediaType::Docx)
            }
            _ => None,
        }
    }

    /// Resolve from a file extension when no MIME type was declared.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|e| e.to_str())?.to_lowercase();
        match ext.as_str() {
            "txt" => Some(MediaType::PlainText),
            "md" | "markdown" => Some(MediaType::Markdown),
            "pdf" => Some(MediaType::Pdf),
            "docx" => Some(MediaType::Docx),
            _ => None,
        }
    }

    pub fn as_mime(&self) -> &'static str {
        match self {
            MediaType::PlainText => "text/plain",
            MediaType::Markdown => "text/markdown",
            MediaType::Pdf => "application/pdf",
            MediaType::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("unsupported media type: {0}")]
    Unsupported(String),
    #[error("file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("PDF parse error: {0}")]
    Pdf(String),
    #[error("DOCX parse error: {0}")]
    Docx(String),
}

/// Extract plain text from an uploaded file's bytes, dispatching on the
/// declared media type.
pub fn extract_text(media_type: &str, bytes: &[u8]) -> Result<String, DocError> {
    match MediaType::from_mime(media_type) {
        Some(MediaType::PlainText) | Some(MediaType::Markdown) => {
            Ok(String::from_utf8(bytes.to_vec())?)
        }
        Some(MediaType::Pdf) => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| DocError::Pdf(e.to_string()))
        }
        Some(MediaType::Docx) => extract_docx_text(bytes),
        None => Err(DocError::Unsupported(media_type.to_string())),
    }
}

/// Join the paragraph text of a DOCX body, one line per paragraph.
fn extract_docx_text(bytes: &[u8]) -> Result<String, DocError> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| DocError::Docx(e.to_string()))?;
    let paragraphs: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            docx_rs::DocumentChild::Paragraph(p) => Some(p.raw_text()),
            _ => None,
        })
        .collect();
    Ok(paragraphs.join("\n"))
}

/// Split text into retrieval chunks of at most `max_chars` characters.
///
/// Paragraphs (newline-delimited) are accumulated greedily; a chunk is
/// flushed, trimmed, once the next paragraph would reach the budget.
/// A single paragraph longer than the budget is emitted whole as one
/// oversized chunk rather than split mid-paragraph.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize; // chars, not bytes

    for para in text.split('\n') {
        let para_len = para.chars().count();
        if current_len + para_len >= max_chars && !current.is_empty() {
            let flushed = current.trim();
            if !flushed.is_empty() {
                chunks.push(flushed.to_string());
            }
            current.clear();
            current_len = 0;
        }
        current.push_str(para);
        current.push('\n');
        current_len += para_len + 1;
    }

    let last = current.trim();
    if !last.is_empty() {
        chunks.push(last.to_string());
    }

    chunks
}
