use async_trait::async_trait;
use pgvector::Vector;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::models::{DocumentHitRow, GlobalHitRow, MessageHitRow};
use super::pool::DbPool;
use super::store::VectorStore;
use crate::error::{OrchestratorError, Result};
use crate::models::{DocumentChunk, GlobalKnowledge, MessageEmbedding, RetrievalHit};
use crate::utils::limiters::Limiters;

/// `VectorStore` backed by Postgres + pgvector, calling the three similarity
/// RPCs named in spec §6 and performing idempotent single-row inserts —
/// there is no cross-row transactionality in this adapter (spec §5: "There
/// are none; all writes are single-row idempotent inserts").
pub struct PgVectorStore {
    pool: DbPool,
    limiters: Arc<Limiters>,
}

impl PgVectorStore {
    pub fn new(pool: DbPool, limiters: Arc<Limiters>) -> Self {
        Self { pool, limiters }
    }

    async fn acquire_search(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        let (permit, wait) =
            Limiters::acquire_timed(self.limiters.db_search.clone(), self.limiters.acquire_timeout, "db_search")
                .await?;
        debug!(wait_ms = wait.as_millis() as u64, op = "db_search", "wait_queue");
        Ok(permit)
    }

    /// Only a connection-level failure (pool exhausted, network down) degrades
    /// to `StoreUnreachable`, which C5 silently treats as "no hits for that
    /// source." A `Database` error with a SQLSTATE code means the RPC call
    /// itself is malformed (wrong arity, wrong types, a constraint violation)
    /// — that's a programmer-visible `Invariant`, not a transient condition,
    /// so it isn't allowed to masquerade as an empty result forever.
    fn classify(err: sqlx::Error, op: &str) -> OrchestratorError {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                OrchestratorError::StoreUnreachable(format!("{op}: {err}")).log()
            }
            _ => OrchestratorError::Invariant(format!("{op}: unexpected store shape: {err}")).log(),
        }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    #[instrument(skip(self, q_vec))]
    async fn similar_messages(
        &self,
        q_vec: &[f32],
        user_id: i64,
        project_id: Option<i64>,
        session_id: Option<i64>,
        k: i32,
        threshold: f32,
    ) -> Result<Vec<RetrievalHit>> {
        let _permit = self.acquire_search().await?;
        let vector = Vector::from(q_vec.to_vec());
        let rows = sqlx::query_as::<_, MessageHitRow>(
            r#"SELECT message_id, session_id, role, content_snippet, similarity, metadata, created_at
               FROM similar_messages($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(vector)
        .bind(user_id)
        .bind(project_id)
        .bind(session_id)
        .bind(k)
        .bind(threshold)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(|e| Self::classify(e, "similar_messages"))?;

        debug!(hits = rows.len(), "similar_messages");
        Ok(rows.into_iter().map(RetrievalHit::from).collect())
    }

    #[instrument(skip(self, q_vec))]
    async fn similar_documents(
        &self,
        q_vec: &[f32],
        user_id: i64,
        project_id: Option<i64>,
        k: i32,
        threshold: f32,
    ) -> Result<Vec<RetrievalHit>> {
        let _permit = self.acquire_search().await?;
        let vector = Vector::from(q_vec.to_vec());
        let rows = sqlx::query_as::<_, DocumentHitRow>(
            r#"SELECT chunk_id, chunk_index, chunk_text, similarity, metadata, created_at
               FROM similar_documents($1, $2, $3, $4, $5)"#,
        )
        .bind(vector)
        .bind(user_id)
        .bind(project_id)
        .bind(k)
        .bind(threshold)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(|e| Self::classify(e, "similar_documents"))?;

        debug!(hits = rows.len(), "similar_documents");
        Ok(rows.into_iter().map(RetrievalHit::from).collect())
    }

    #[instrument(skip(self, q_vec))]
    async fn similar_global(
        &self,
        q_vec: &[f32],
        k: i32,
        threshold: f32,
        min_quality: f32,
    ) -> Result<Vec<RetrievalHit>> {
        let _permit = self.acquire_search().await?;
        let vector = Vector::from(q_vec.to_vec());
        let rows = sqlx::query_as::<_, GlobalHitRow>(
            r#"SELECT knowledge_id, example_text, similarity, metadata, created_at
               FROM similar_global($1, $2, $3, $4)"#,
        )
        .bind(vector)
        .bind(k)
        .bind(threshold)
        .bind(min_quality)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(|e| Self::classify(e, "similar_global"))?;

        debug!(hits = rows.len(), "similar_global");
        Ok(rows.into_iter().map(RetrievalHit::from).collect())
    }

    #[instrument(skip(self, chunk), fields(asset_id = chunk.asset_id, chunk_index = chunk.chunk_index))]
    async fn insert_document_chunk(&self, chunk: &DocumentChunk) -> Result<()> {
        let vector = Vector::from(chunk.embedding.clone());
        sqlx::query(
            r#"INSERT INTO document_chunks
                (chunk_id, asset_id, user_id, project_id, document_type, chunk_index,
                 chunk_text, embedding, metadata, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               ON CONFLICT (asset_id, chunk_index) DO NOTHING"#,
        )
        .bind(chunk.chunk_id)
        .bind(chunk.asset_id)
        .bind(chunk.user_id)
        .bind(chunk.project_id)
        .bind(serde_json::to_value(chunk.document_type).unwrap_or_default())
        .bind(chunk.chunk_index)
        .bind(&chunk.chunk_text)
        .bind(vector)
        .bind(&chunk.metadata)
        .bind(chunk.created_at)
        .execute(self.pool.get_pool())
        .await
        .map_err(|e| Self::classify(e, "insert_document_chunk"))?;

        Ok(())
    }

    #[instrument(skip(self, message), fields(message_id = message.message_id))]
    async fn insert_message_embedding(&self, message: &MessageEmbedding) -> Result<()> {
        let vector = Vector::from(message.embedding.clone());
        sqlx::query(
            r#"INSERT INTO message_embeddings
                (embedding_id, message_id, user_id, project_id, session_id, role,
                 content_snippet, embedding, metadata, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               ON CONFLICT (message_id) DO NOTHING"#,
        )
        .bind(message.embedding_id)
        .bind(message.message_id)
        .bind(message.user_id)
        .bind(message.project_id)
        .bind(message.session_id)
        .bind(message.role.as_str())
        .bind(&message.content_snippet)
        .bind(vector)
        .bind(&message.metadata)
        .bind(message.created_at)
        .execute(self.pool.get_pool())
        .await
        .map_err(|e| Self::classify(e, "insert_message_embedding"))?;

        Ok(())
    }

    #[instrument(skip(self, knowledge), fields(knowledge_id = knowledge.knowledge_id))]
    async fn insert_global_knowledge(&self, knowledge: &GlobalKnowledge) -> Result<()> {
        let vector = Vector::from(knowledge.embedding.clone());
        sqlx::query(
            r#"INSERT INTO global_knowledge
                (knowledge_id, category, pattern_type, example_text, description,
                 quality_score, tags, embedding, metadata, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
               ON CONFLICT (knowledge_id) DO NOTHING"#,
        )
        .bind(knowledge.knowledge_id)
        .bind(&knowledge.category)
        .bind(&knowledge.pattern_type)
        .bind(&knowledge.example_text)
        .bind(&knowledge.description)
        .bind(knowledge.quality_score)
        .bind(&knowledge.tags)
        .bind(vector)
        .bind(&knowledge.metadata)
        .bind(knowledge.created_at)
        .bind(knowledge.updated_at)
        .execute(self.pool.get_pool())
        .await
        .map_err(|e| Self::classify(e, "insert_global_knowledge"))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn touch_session(&self, session_id: i64) -> Result<()> {
        sqlx::query("UPDATE sessions SET last_message_at = now() WHERE session_id = $1")
            .bind(session_id)
            .execute(self.pool.get_pool())
            .await
            .map_err(|e| Self::classify(e, "touch_session"))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_asset(&self, asset_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM document_chunks WHERE asset_id = $1")
            .bind(asset_id)
            .execute(self.pool.get_pool())
            .await
            .map_err(|e| Self::classify(e, "delete_asset"))?;

        Ok(())
    }
}
