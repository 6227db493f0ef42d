use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

use crate::models::{HitOrigin, RetrievalHit};

/// Row shape returned by the `similar_messages` store RPC.
#[derive(Debug, FromRow)]
pub struct MessageHitRow {
    pub message_id: i64,
    pub session_id: i64,
    pub role: String,
    pub content_snippet: String,
    pub similarity: f32,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl From<MessageHitRow> for RetrievalHit {
    fn from(row: MessageHitRow) -> Self {
        RetrievalHit {
            origin: HitOrigin::Message,
            similarity: row.similarity,
            text: row.content_snippet,
            metadata: row.metadata,
            session_id: Some(row.session_id),
            chunk_index: None,
            created_at: row.created_at,
        }
    }
}

/// Row shape returned by the `similar_documents` store RPC.
#[derive(Debug, FromRow)]
pub struct DocumentHitRow {
    pub chunk_id: i64,
    pub chunk_index: i32,
    pub chunk_text: String,
    pub similarity: f32,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl From<DocumentHitRow> for RetrievalHit {
    fn from(row: DocumentHitRow) -> Self {
        RetrievalHit {
            origin: HitOrigin::Document,
            similarity: row.similarity,
            text: row.chunk_text,
            metadata: row.metadata,
            session_id: None,
            chunk_index: Some(row.chunk_index),
            created_at: row.created_at,
        }
    }
}

/// Row shape returned by the `similar_global` store RPC.
#[derive(Debug, FromRow)]
pub struct GlobalHitRow {
    pub knowledge_id: i64,
    pub example_text: String,
    pub similarity: f32,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl From<GlobalHitRow> for RetrievalHit {
    fn from(row: GlobalHitRow) -> Self {
        RetrievalHit {
            origin: HitOrigin::Global,
            similarity: row.similarity,
            text: row.example_text,
            metadata: row.metadata,
            session_id: None,
            chunk_index: None,
            created_at: row.created_at,
        }
    }
}
