use crate::store::models::Chunk;

/// Default number of chunks handed to the prompt assembler.
pub const DEFAULT_TOP_K: usize = 3;

/// Rank chunks by how often the query occurs in them, case-insensitively,
/// and return references to the best `k`.
///
/// Sorting is stable on a descending score, so chunks with equal scores
/// keep their document order. Chunks that never contain the query score
/// zero but are still eligible; an empty query matches nothing.
pub fn top_chunks<'a>(query: &str, chunks: &'a [Chunk], k: usize) -> Vec<&'a Chunk> {
    if query.is_empty() || chunks.is_empty() || k == 0 {
        return Vec::new();
    }

    let needle = query.to_lowercase();
    let mut scored: Vec<(usize, &Chunk)> = chunks
        .iter()
        .map(|chunk| (occurrences(&chunk.text.to_lowercase(), &needle), chunk))
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(k).map(|(_, chunk)| chunk).collect()
}

/// Count non-overlapping occurrences of `needle` in `haystack`.
fn occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
