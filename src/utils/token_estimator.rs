//! Deterministic token-count heuristic shared by chunk-budgeting (C3),
//! context-ceiling truncation (C6), and history-capping (C7). Deterministic
//! by construction, as invariant 8 (determinism of formatting) requires the
//! context formatter's inputs to be pure.

use crate::models::{ChatMessage, DocumentChunk};

/// Estimate tokens from text using a word-count heuristic: ~1.3 tokens per
/// word plus a small fixed overhead for formatting/special tokens.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let words = text.split_whitespace().count();
    ((words as f64 * 1.3) + 5.0).ceil() as usize
}

pub fn estimate_chunks_tokens(chunks: &[DocumentChunk]) -> usize {
    chunks.iter().map(|chunk| estimate_tokens(&chunk.chunk_text)).sum()
}

pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

pub fn would_exceed_limit(current_tokens: usize, new_text: &str, max_tokens: usize) -> bool {
    let new_tokens = estimate_tokens(new_text);
    current_tokens + new_tokens > max_tokens
}

pub fn estimate_system_tokens(system_prompt: &str, context: &str) -> usize {
    estimate_tokens(system_prompt) + estimate_tokens(context) + 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimation_in_plausible_range() {
        let text = "this is a test document that contains some information";
        let tokens = estimate_tokens(text);
        assert!(tokens >= 13 && tokens <= 20);
    }

    #[test]
    fn empty_string_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn deterministic_for_equal_inputs() {
        let text = "the quick brown fox jumps over the lazy dog";
        assert_eq!(estimate_tokens(text), estimate_tokens(text));
    }

    #[test]
    fn would_exceed_detects_overflow() {
        let current = 1000;
        let text = "word ".repeat(500);
        assert!(would_exceed_limit(current, &text, 1500));
        assert!(!would_exceed_limit(current, &text, 2000));
    }
}
