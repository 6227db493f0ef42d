use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::chat::Role;

/// A persisted embedding of one chat message. Inserted exclusively by the
/// background ingester (C9) after a turn completes; never mutated; destroyed
/// when the owning session is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEmbedding {
    pub embedding_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub project_id: Option<i64>,
    /// Always populated: every retrieval may be session-scoped.
    pub session_id: i64,
    pub role: Role,
    /// First ≤500 chars of the message, for display/debug only.
    pub content_snippet: String,
    pub embedding: Vec<f32>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl MessageEmbedding {
    pub fn business_key(&self) -> i64 {
        self.message_id
    }

    pub fn snippet(content: &str) -> String {
        content.chars().take(500).collect()
    }
}
