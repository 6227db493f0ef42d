use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tenant-agnostic, read-only curated pattern. Seeded by an offline process out
/// of this crate's scope; read-only in the hot path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalKnowledge {
    pub knowledge_id: i64,
    pub category: String,
    pub pattern_type: String,
    pub example_text: String,
    pub description: String,
    /// In [0, 1]. Default 0.7 when not otherwise specified.
    pub quality_score: f32,
    pub tags: Vec<String>,
    pub embedding: Vec<f32>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GlobalKnowledge {
    pub const DEFAULT_QUALITY_SCORE: f32 = 0.7;

    pub fn business_key(&self) -> i64 {
        self.knowledge_id
    }
}
