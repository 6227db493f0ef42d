//! Chunking step of C3 (spec §4.3 step 3): target `target_chars` per chunk
//! with `overlap_chars` overlap, breaking at a sentence boundary when one
//! falls within ±100 characters of the target split point, else at a word
//! boundary, else at the hard split. Capped at `max_chunks`; when the text
//! would produce more, the first `max_chunks` are kept and the last one is
//! marked `truncated`.

const BOUNDARY_SEARCH_WINDOW: usize = 100;
const WORD_BOUNDARY_SEARCH_WINDOW: usize = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    /// Char offset into the normalized source text.
    pub start: usize,
    pub end: usize,
    /// Set on the last kept chunk when the document produced more chunks
    /// than `max_chunks` allows.
    pub truncated: bool,
}

pub struct Chunker {
    pub target_chars: usize,
    pub overlap_chars: usize,
    pub max_chunks: usize,
}

impl Chunker {
    pub fn new(target_chars: usize, overlap_chars: usize, max_chunks: usize) -> Self {
        Self {
            target_chars,
            overlap_chars,
            max_chunks,
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len == 0 {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < len {
            if chunks.len() >= self.max_chunks {
                break;
            }

            let target_end = (start + self.target_chars).min(len);
            let end = if target_end >= len {
                len
            } else {
                self.split_point(&chars, target_end)
            };

            let end = end.max(start + 1).min(len);
            chunks.push(TextChunk {
                text: chars[start..end].iter().collect(),
                start,
                end,
                truncated: false,
            });

            if end >= len {
                break;
            }

            let next_start = end.saturating_sub(self.overlap_chars);
            start = if next_start > start { next_start } else { end };
        }

        let produced_more = start < len || chunks.len() > self.max_chunks;
        if produced_more {
            if let Some(last) = chunks.last_mut() {
                last.truncated = true;
            }
        }

        chunks
    }

    fn split_point(&self, chars: &[char], target: usize) -> usize {
        if let Some(idx) = Self::nearest(chars, target, BOUNDARY_SEARCH_WINDOW, Self::is_sentence_boundary) {
            return idx;
        }
        if let Some(idx) = Self::nearest(chars, target, WORD_BOUNDARY_SEARCH_WINDOW, Self::is_word_boundary) {
            return idx;
        }
        target
    }

    fn nearest(
        chars: &[char],
        target: usize,
        max_distance: usize,
        is_boundary: impl Fn(&[char], usize) -> bool,
    ) -> Option<usize> {
        for distance in 0..=max_distance {
            let forward = target + distance;
            if forward < chars.len() && is_boundary(chars, forward) {
                return Some(forward);
            }
            if distance <= target {
                let backward = target - distance;
                if is_boundary(chars, backward) {
                    return Some(backward);
                }
            }
        }
        None
    }

    fn is_sentence_boundary(chars: &[char], idx: usize) -> bool {
        if idx < 2 || idx > chars.len() {
            return false;
        }
        let terminator = chars[idx - 2];
        let is_terminator = matches!(terminator, '.' | '!' | '?');
        let is_para_break = terminator == '\n' && chars[idx - 1] == '\n';
        (is_terminator && chars[idx - 1] == ' ') || is_para_break
    }

    fn is_word_boundary(chars: &[char], idx: usize) -> bool {
        if idx == 0 || idx == chars.len() {
            return true;
        }
        chars[idx - 1].is_whitespace() || chars[idx].is_whitespace()
    }
}
