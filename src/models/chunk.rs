use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Supported document types for ingestion. Closed set: anything else is
/// `OrchestratorError::UnsupportedFormat` at the ingestor boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Docx,
    Txt,
    Md,
}

impl DocumentType {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            "text/plain" => Some(Self::Txt),
            "text/markdown" => Some(Self::Md),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            "md" => Some(Self::Md),
            _ => None,
        }
    }
}

/// A single persisted, embedded slice of a document. Created exclusively by the
/// document ingestor (C3); never mutated after creation; destroyed only by
/// cascading deletion of its owning asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: i64,
    pub asset_id: i64,
    pub user_id: i64,
    pub project_id: Option<i64>,
    pub document_type: DocumentType,
    /// 0-based, dense within `asset_id`.
    pub chunk_index: i32,
    /// Target ~1,000 characters with sentence/word-boundary snapping; see
    /// the ingestor's chunker.
    pub chunk_text: String,
    pub embedding: Vec<f32>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl DocumentChunk {
    /// The idempotency business key per spec §4.2: a second insert sharing this
    /// key with an existing row is a no-op.
    pub fn business_key(&self) -> (i64, i32) {
        (self.asset_id, self.chunk_index)
    }
}
