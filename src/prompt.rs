/// Assemble the grounding prompt sent to the model: retrieved context
/// first, then the user's question, then the instruction to answer from
/// the context alone.
pub fn build_prompt(context_chunks: &[&str], query: &str) -> String {
    let context_text = context_chunks.join("\n\n");
    format!(
        "Context:\n{}\n\nUser Query:\n{}\n\nAnswer based only on the context above.",
        context_text, query
    )
}
