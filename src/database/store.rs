use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DocumentChunk, GlobalKnowledge, MessageEmbedding, RetrievalHit};

/// The vector-capable relational store contract (C2), per spec §4.2 and §6.
/// Three read RPCs, three idempotent writes. Implementations must never error
/// on "no hit" — only on a genuinely unreachable store or a shape mismatch.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Session-scoped search over message embeddings. `session_id` is the
    /// authoritative isolation filter; callers additionally audit results
    /// (see the retrieval orchestrator) as defense in depth.
    async fn similar_messages(
        &self,
        q_vec: &[f32],
        user_id: i64,
        project_id: Option<i64>,
        session_id: Option<i64>,
        k: i32,
        threshold: f32,
    ) -> Result<Vec<RetrievalHit>>;

    async fn similar_documents(
        &self,
        q_vec: &[f32],
        user_id: i64,
        project_id: Option<i64>,
        k: i32,
        threshold: f32,
    ) -> Result<Vec<RetrievalHit>>;

    async fn similar_global(
        &self,
        q_vec: &[f32],
        k: i32,
        threshold: f32,
        min_quality: f32,
    ) -> Result<Vec<RetrievalHit>>;

    /// Idempotent on `(asset_id, chunk_index)`.
    async fn insert_document_chunk(&self, chunk: &DocumentChunk) -> Result<()>;

    /// Idempotent on `message_id`.
    async fn insert_message_embedding(&self, message: &MessageEmbedding) -> Result<()>;

    /// Idempotent on `knowledge_id`.
    async fn insert_global_knowledge(&self, knowledge: &GlobalKnowledge) -> Result<()>;

    /// Best-effort metadata touch, independent of message insertion (see
    /// design notes on session-timestamp atomicity).
    async fn touch_session(&self, session_id: i64) -> Result<()>;

    /// Cascades deletion of all chunks belonging to the asset.
    async fn delete_asset(&self, asset_id: i64) -> Result<()>;
}
