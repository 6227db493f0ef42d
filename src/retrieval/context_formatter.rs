//! C6 Context Formatter (spec §4.6): a pure function turning a
//! `ContextBlock` into the text injected ahead of the user's turn. Fixed
//! section order (documents, prior messages, global patterns), per-hit
//! truncation, and a total-length ceiling with lowest-priority hits dropped
//! first.

use std::fmt::Write as _;

use crate::models::retrieval::{ContextBlock, RetrievalHit};

/// Per-hit payload truncation (§4.6).
const MAX_HIT_CHARS: usize = 1_200;

pub struct ContextFormatter;

impl ContextFormatter {
    /// Renders `block` to at most `max_chars` characters. Empty sections are
    /// omitted entirely; within a non-empty section every hit keeps its
    /// `[index]` position even if a later hit is dropped for space.
    pub fn format(block: &ContextBlock, max_chars: usize) -> String {
        let mut out = String::new();
        let mut index = 1usize;

        index = Self::render_section(&mut out, "documents", &block.documents, index, max_chars);
        index = Self::render_section(&mut out, "prior_messages", &block.prior_messages, index, max_chars);
        Self::render_section(&mut out, "global_patterns", &block.global_patterns, index, max_chars);

        out
    }

    fn render_section(
        out: &mut String,
        header: &str,
        hits: &[RetrievalHit],
        mut index: usize,
        max_chars: usize,
    ) -> usize {
        if hits.is_empty() {
            return index;
        }

        let header_line = format!("# {header}\n");
        if out.len() + header_line.len() > max_chars {
            return index;
        }
        out.push_str(&header_line);

        for hit in hits {
            let line = Self::render_hit(index, hit);
            if out.len() + line.len() > max_chars {
                break;
            }
            out.push_str(&line);
            index += 1;
        }

        index
    }

    fn render_hit(index: usize, hit: &RetrievalHit) -> String {
        let mut payload: String = hit.text.chars().take(MAX_HIT_CHARS).collect();
        if hit.text.chars().count() > MAX_HIT_CHARS {
            payload.push_str("...");
        }

        let mut line = String::new();
        let _ = write!(
            line,
            "[{index}] source={} similarity={:.2} {payload}\n",
            hit.source_label(),
            hit.similarity,
        );
        line
    }
}
