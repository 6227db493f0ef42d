use serde_json::Value;

/// Where a retrieval hit came from. Closed set, matched exhaustively at use
/// sites per the design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOrigin {
    Message,
    Document,
    Global,
}

impl HitOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Document => "document",
            Self::Global => "global",
        }
    }
}

/// In-memory composite result of one similarity search. Owned by the retrieval
/// orchestrator (C5) for the duration of one turn; never persisted.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub origin: HitOrigin,
    /// Cosine similarity in [0, 1].
    pub similarity: f32,
    pub text: String,
    pub metadata: Value,
    /// Present for message hits; used by the session-isolation audit.
    pub session_id: Option<i64>,
    /// Present for document hits; used for tie-breaking and the
    /// "introduction context" convention at the store layer.
    pub chunk_index: Option<i32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl RetrievalHit {
    /// A stable label for C6's `source=` field: filename for documents, role
    /// for messages, category for global patterns. Falls back to the origin
    /// name if the expected metadata key is absent.
    pub fn source_label(&self) -> String {
        let key = match self.origin {
            HitOrigin::Document => "filename",
            HitOrigin::Message => "role",
            HitOrigin::Global => "category",
        };
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| self.origin.as_str().to_owned())
    }
}

/// The three sections C6 renders, in fixed order, each already capped and
/// filtered by C5. Acyclic: ContextBlock -> sections -> hits.
#[derive(Debug, Clone, Default)]
pub struct ContextBlock {
    pub documents: Vec<RetrievalHit>,
    pub prior_messages: Vec<RetrievalHit>,
    pub global_patterns: Vec<RetrievalHit>,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.prior_messages.is_empty() && self.global_patterns.is_empty()
    }

    pub fn total_hits(&self) -> usize {
        self.documents.len() + self.prior_messages.len() + self.global_patterns.len()
    }
}
