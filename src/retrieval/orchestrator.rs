//! C5 Retrieval Orchestrator (spec §4.5): expand the query, embed it once,
//! fan out to the three stores in parallel under one shared deadline, audit
//! session isolation, filter near-duplicates, cap, and return a
//! `ContextBlock` in fixed section order. Never turn-fatal: any source that
//! errors or misses the deadline degrades to an empty list for that source.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use crate::config::settings::{RetrievalConfig, SessionConfig};
use crate::database::store::VectorStore;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::logging::{ActivityLog, ActivityLogger, ActivityStatus, ActivityType};
use crate::models::chat::{ChatMessage, Role};
use crate::models::retrieval::{ContextBlock, RetrievalHit};
use crate::query_expander;

/// Hard cap on how much recent history is appended to the query before
/// embedding, so a long conversation can't blow out the embedding input.
const HISTORY_BIAS_MAX_CHARS: usize = 500;

/// Post-filter caps, independent of the `k` passed to each store (§4.5: a
/// store may return up to `k` hits, but only this many survive filtering).
const MAX_DOCUMENT_HITS: usize = 10;
const MAX_MESSAGE_HITS: usize = 6;
const MAX_GLOBAL_HITS: usize = 3;

/// Characters of a hit's text hashed for the diversity filter.
const DIVERSITY_PREFIX_CHARS: usize = 100;

pub struct RetrievalOrchestrator {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    retrieval: RetrievalConfig,
    session: SessionConfig,
    activity_log: ActivityLogger,
}

impl RetrievalOrchestrator {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        retrieval: RetrievalConfig,
        session: SessionConfig,
        activity_log: ActivityLogger,
    ) -> Self {
        Self {
            store,
            embedder,
            retrieval,
            session,
            activity_log,
        }
    }

    #[instrument(skip(self, user_text, history), fields(user_id, session_id))]
    pub async fn retrieve(
        &self,
        user_text: &str,
        user_id: i64,
        session_id: i64,
        project_id: Option<i64>,
        history: &[ChatMessage],
    ) -> ContextBlock {
        let expanded = query_expander::expand(user_text);
        let query = self.build_query(&expanded, history);

        let embedding = match self.embedder.embed(user_id, &query).await {
            Ok(v) => v,
            Err(e) => {
                self.activity_log.log_async(
                    ActivityLog::builder(session_id, user_id, ActivityType::RetrievalSkipped)
                        .status(ActivityStatus::Warning)
                        .error(e.to_string(), "embedding_failure")
                        .build(),
                );
                e.log();
                return ContextBlock::default();
            }
        };

        let deadline = Duration::from_millis(self.retrieval.deadline_ms);

        let (doc_hits, msg_hits, global_hits) = tokio::join!(
            self.search_documents(&embedding, user_id, project_id, deadline),
            self.search_messages(&embedding, user_id, project_id, session_id, deadline),
            self.search_global(&embedding, deadline),
        );

        let msg_hits = self.audit_session_isolation(msg_hits, session_id);

        let doc_hits = Self::dedup(doc_hits, MAX_DOCUMENT_HITS);
        let msg_hits = Self::dedup(msg_hits, MAX_MESSAGE_HITS);
        let global_hits = Self::dedup(global_hits, MAX_GLOBAL_HITS);

        let block = ContextBlock {
            documents: doc_hits,
            prior_messages: msg_hits,
            global_patterns: global_hits,
        };

        self.activity_log.log_async(
            ActivityLog::builder(session_id, user_id, ActivityType::RetrievalExecuted)
                .status(ActivityStatus::Success)
                .token_count(block.total_hits() as i32)
                .build(),
        );

        block
    }

    /// Biases the expanded query with up to `HISTORY_BIAS_MAX_CHARS` of the
    /// last user turn in `history`, so retrieval isn't limited to the bare
    /// current turn.
    fn build_query(&self, expanded: &str, history: &[ChatMessage]) -> String {
        let last_user_turn = history.iter().rev().find(|m| m.role == Role::User);
        match last_user_turn {
            Some(m) => {
                let bias: String = m.content.chars().take(HISTORY_BIAS_MAX_CHARS).collect();
                if bias.is_empty() {
                    expanded.to_string()
                } else {
                    format!("{expanded} {bias}")
                }
            }
            None => expanded.to_string(),
        }
    }

    async fn search_documents(
        &self,
        embedding: &[f32],
        user_id: i64,
        project_id: Option<i64>,
        deadline: Duration,
    ) -> Vec<RetrievalHit> {
        let fut = self.store.similar_documents(
            embedding,
            user_id,
            project_id,
            self.retrieval.doc_k,
            self.retrieval.threshold,
        );
        Self::under_deadline(fut, deadline, "similar_documents").await
    }

    async fn search_messages(
        &self,
        embedding: &[f32],
        user_id: i64,
        project_id: Option<i64>,
        session_id: i64,
        deadline: Duration,
    ) -> Vec<RetrievalHit> {
        let fut = self.store.similar_messages(
            embedding,
            user_id,
            project_id,
            Some(session_id),
            self.retrieval.msg_k,
            self.retrieval.threshold,
        );
        Self::under_deadline(fut, deadline, "similar_messages").await
    }

    async fn search_global(&self, embedding: &[f32], deadline: Duration) -> Vec<RetrievalHit> {
        let fut = self.store.similar_global(
            embedding,
            self.retrieval.global_k,
            self.retrieval.threshold,
            self.retrieval.global_min_quality,
        );
        Self::under_deadline(fut, deadline, "similar_global").await
    }

    async fn under_deadline(
        fut: impl std::future::Future<Output = Result<Vec<RetrievalHit>>>,
        deadline: Duration,
        op: &'static str,
    ) -> Vec<RetrievalHit> {
        match tokio::time::timeout(deadline, fut).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                e.log();
                Vec::new()
            }
            Err(_) => {
                warn!(op, "retrieval source missed deadline");
                Vec::new()
            }
        }
    }

    /// Defense in depth (§4.5 step 5): drop any message hit whose
    /// `session_id` doesn't match the requesting session, even though the
    /// store query already filtered on it.
    fn audit_session_isolation(&self, hits: Vec<RetrievalHit>, session_id: i64) -> Vec<RetrievalHit> {
        if !self.session.enforce_isolation {
            return hits;
        }
        hits.into_iter()
            .filter(|h| match h.session_id {
                Some(sid) => sid == session_id,
                None => {
                    warn!("message hit missing session_id during isolation audit; dropping");
                    false
                }
            })
            .collect()
    }

    /// Drops hits whose leading text hashes to a value already seen (highest
    /// similarity wins, since hits are expected to arrive sorted by the
    /// store), then caps to `max`.
    fn dedup(hits: Vec<RetrievalHit>, max: usize) -> Vec<RetrievalHit> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::with_capacity(max);
        for hit in hits {
            let prefix: String = hit.text.chars().take(DIVERSITY_PREFIX_CHARS).collect();
            let mut hasher = DefaultHasher::new();
            prefix.hash(&mut hasher);
            let key = hasher.finish();
            if seen.insert(key) {
                out.push(hit);
                if out.len() >= max {
                    break;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    use crate::error::OrchestratorError;
    use crate::models::retrieval::HitOrigin;
    use crate::models::{DocumentChunk, GlobalKnowledge, MessageEmbedding};

    fn hit(origin: HitOrigin, text: &str, session_id: Option<i64>) -> RetrievalHit {
        RetrievalHit {
            origin,
            similarity: 0.9,
            text: text.to_string(),
            metadata: json!({}),
            session_id,
            chunk_index: None,
            created_at: Utc::now(),
        }
    }

    struct StubStore {
        messages: Vec<RetrievalHit>,
        documents: Vec<RetrievalHit>,
        global: Vec<RetrievalHit>,
    }

    #[async_trait]
    impl VectorStore for StubStore {
        async fn similar_messages(
            &self,
            _: &[f32],
            _: i64,
            _: Option<i64>,
            _: Option<i64>,
            _: i32,
            _: f32,
        ) -> Result<Vec<RetrievalHit>> {
            Ok(self.messages.clone())
        }
        async fn similar_documents(
            &self,
            _: &[f32],
            _: i64,
            _: Option<i64>,
            _: i32,
            _: f32,
        ) -> Result<Vec<RetrievalHit>> {
            Ok(self.documents.clone())
        }
        async fn similar_global(&self, _: &[f32], _: i32, _: f32, _: f32) -> Result<Vec<RetrievalHit>> {
            Ok(self.global.clone())
        }
        async fn insert_document_chunk(&self, _: &DocumentChunk) -> Result<()> {
            Ok(())
        }
        async fn insert_message_embedding(&self, _: &MessageEmbedding) -> Result<()> {
            Ok(())
        }
        async fn insert_global_knowledge(&self, _: &GlobalKnowledge) -> Result<()> {
            Ok(())
        }
        async fn touch_session(&self, _: i64) -> Result<()> {
            Ok(())
        }
        async fn delete_asset(&self, _: i64) -> Result<()> {
            Ok(())
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        async fn embed(&self, _: i64, _: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
        async fn embed_batch(&self, _: i64, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingClient for FailingEmbedder {
        async fn embed(&self, _: i64, _: &str) -> Result<Vec<f32>> {
            Err(OrchestratorError::ProviderPermanent("down".into()))
        }
        async fn embed_batch(&self, _: i64, _: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(OrchestratorError::ProviderPermanent("down".into()))
        }
    }

    fn retrieval_config() -> RetrievalConfig {
        RetrievalConfig {
            doc_k: 15,
            msg_k: 6,
            global_k: 3,
            threshold: 0.10,
            global_min_quality: 0.60,
            deadline_ms: 5000,
        }
    }

    /// A logger whose pool never actually connects; fine for these tests
    /// since they only assert on `ContextBlock` contents, not on what
    /// reaches `tbl_activity_logs`.
    fn test_activity_logger() -> ActivityLogger {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/test")
            .expect("lazy pool");
        ActivityLogger::new(pool, crate::logging::LoggerConfig::default())
    }

    #[tokio::test]
    async fn embedding_failure_yields_empty_context_block() {
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(StubStore { messages: vec![], documents: vec![], global: vec![] }),
            Arc::new(FailingEmbedder),
            retrieval_config(),
            SessionConfig { enforce_isolation: true },
            test_activity_logger(),
        );
        let block = orchestrator.retrieve("hi", 1, 1, None, &[]).await;
        assert!(block.is_empty());
    }

    #[tokio::test]
    async fn cross_session_message_hits_are_dropped() {
        let store = StubStore {
            messages: vec![hit(HitOrigin::Message, "leaked", Some(999))],
            documents: vec![],
            global: vec![],
        };
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(store),
            Arc::new(StubEmbedder),
            retrieval_config(),
            SessionConfig { enforce_isolation: true },
            test_activity_logger(),
        );
        let block = orchestrator.retrieve("hi", 1, 42, None, &[]).await;
        assert!(block.prior_messages.is_empty());
    }

    #[tokio::test]
    async fn near_duplicate_hits_are_deduplicated() {
        let store = StubStore {
            messages: vec![],
            documents: vec![
                hit(HitOrigin::Document, "identical leading text here", None),
                hit(HitOrigin::Document, "identical leading text here", None),
            ],
            global: vec![],
        };
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(store),
            Arc::new(StubEmbedder),
            retrieval_config(),
            SessionConfig { enforce_isolation: true },
            test_activity_logger(),
        );
        let block = orchestrator.retrieve("hi", 1, 1, None, &[]).await;
        assert_eq!(block.documents.len(), 1);
    }

    #[tokio::test]
    async fn caps_are_enforced_after_filtering() {
        let documents = (0..20)
            .map(|i| hit(HitOrigin::Document, &format!("unique document body number {i}"), None))
            .collect();
        let store = StubStore { messages: vec![], documents, global: vec![] };
        let orchestrator = RetrievalOrchestrator::new(
            Arc::new(store),
            Arc::new(StubEmbedder),
            retrieval_config(),
            SessionConfig { enforce_isolation: true },
            test_activity_logger(),
        );
        let block = orchestrator.retrieve("hi", 1, 1, None, &[]).await;
        assert_eq!(block.documents.len(), MAX_DOCUMENT_HITS);
    }
}
