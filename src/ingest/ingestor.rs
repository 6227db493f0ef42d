//! C3 Document Ingestor: extract -> normalize -> chunk -> embed -> persist
//! (spec §4.3). Chunk inserts are individually committed, not wrapped in a
//! transaction: a persistence failure partway through an asset yields a
//! partial success rather than a rollback, per spec's no-rollback semantics.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::config::settings::ChunkingConfig;
use crate::database::store::VectorStore;
use crate::embedding::EmbeddingClient;
use crate::error::{OrchestratorError, Result};
use crate::logging::{ActivityLog, ActivityLogger, ActivityStatus, ActivityType};
use crate::models::chunk::{DocumentChunk, DocumentType};
use crate::utils::backoff::{retry_transient, DEFAULT_ATTEMPTS, DEFAULT_BASE};

use super::chunker::Chunker;
use super::parser::DocumentParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub chunks_written: usize,
    pub truncated: bool,
}

pub struct DocumentIngestor {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    target_chars: usize,
    overlap_chars: usize,
    max_chunks: usize,
    activity_log: ActivityLogger,
}

impl DocumentIngestor {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        config: &ChunkingConfig,
        activity_log: ActivityLogger,
    ) -> Self {
        Self {
            store,
            embedder,
            target_chars: config.target_chars,
            overlap_chars: config.overlap_chars,
            max_chunks: config.max_chunks_per_doc,
            activity_log,
        }
    }

    /// Ingests one asset's bytes. Tolerant of at-most-once invocation per
    /// asset: rows are idempotent on `(asset_id, chunk_index)`, so a retried
    /// call after a partial prior failure simply resumes overwriting the
    /// same keys as no-ops up to the point it previously stopped.
    #[instrument(skip(self, file_bytes), fields(asset_id, user_id, bytes = file_bytes.len()))]
    pub async fn ingest(
        &self,
        asset_id: i64,
        user_id: i64,
        project_id: Option<i64>,
        file_bytes: &[u8],
        filename: &str,
        content_type: &str,
    ) -> Result<IngestOutcome> {
        let document_type = DocumentType::from_content_type(content_type)
            .or_else(|| {
                let ext = filename.rsplit('.').next().unwrap_or("");
                DocumentType::from_extension(ext)
            })
            .ok_or_else(|| OrchestratorError::unsupported_format(content_type).log())?;

        let parsed = DocumentParser::parse(file_bytes, document_type)?;
        let normalized = normalize(&parsed.text);

        if normalized.trim().is_empty() {
            warn!(asset_id, "document produced no extractable text");
            return Ok(IngestOutcome {
                chunks_written: 0,
                truncated: false,
            });
        }

        let chunker = Chunker::new(self.target_chars, self.overlap_chars, self.max_chunks);
        let chunks = chunker.chunk(&normalized);
        let truncated = chunks.last().map(|c| c.truncated).unwrap_or(false);

        let mut chunks_written = 0usize;
        for (index, chunk) in chunks.iter().enumerate() {
            let embedding = match self.embedder.embed(user_id, &chunk.text).await {
                Ok(v) => v,
                Err(e) => {
                    e.log();
                    warn!(asset_id, chunks_written, "aborting ingestion after embedding failure");
                    break;
                }
            };

            let record = DocumentChunk {
                chunk_id: 0,
                asset_id,
                user_id,
                project_id,
                document_type,
                chunk_index: index as i32,
                chunk_text: chunk.text.clone(),
                embedding,
                metadata: json!({ "filename": filename }),
                created_at: Utc::now(),
            };

            let insert = retry_transient(DEFAULT_ATTEMPTS, DEFAULT_BASE, || {
                self.store.insert_document_chunk(&record)
            })
            .await;
            if let Err(e) = insert {
                e.log();
                warn!(asset_id, chunks_written, "aborting ingestion after persistence failure");
                break;
            }
            chunks_written += 1;
        }

        info!(asset_id, chunks_written, total_chunks = chunks.len(), truncated, "ingestion finished");

        let status = if chunks_written == chunks.len() {
            ActivityStatus::Success
        } else {
            ActivityStatus::Warning
        };
        self.activity_log.log_async(
            ActivityLog::builder(0, user_id, ActivityType::ProcessingStage)
                .status(status)
                .document_id(asset_id)
                .token_count(chunks_written as i32)
                .build(),
        );

        Ok(IngestOutcome {
            chunks_written,
            truncated,
        })
    }

    /// Cascading removal of a previously ingested asset.
    pub async fn remove(&self, asset_id: i64, user_id: i64) -> Result<()> {
        let result = self.store.delete_asset(asset_id).await;
        let log = ActivityLog::builder(0, user_id, ActivityType::CascadeDeletion).document_id(asset_id);
        self.activity_log.log_async(match &result {
            Ok(()) => log.build(),
            Err(e) => log.error(e.to_string(), "delete_asset").build(),
        });
        result
    }
}

/// Collapses runs of horizontal whitespace while preserving paragraph
/// breaks (blank lines), so the chunker's sentence/paragraph boundary
/// detection still has something to find.
fn normalize(text: &str) -> String {
    let paragraphs: Vec<String> = text
        .split("\n\n")
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect();
    paragraphs.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::models::{GlobalKnowledge, MessageEmbedding, RetrievalHit};

    #[test]
    fn normalize_collapses_whitespace_but_keeps_paragraphs() {
        let text = "Hello   world.\n\n\nSecond   paragraph.";
        let normalized = normalize(text);
        assert_eq!(normalized, "Hello world.\n\nSecond paragraph.");
    }

    struct StubStore {
        insert_calls: AtomicUsize,
        fail_after: usize,
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
            Ok(Vec::new())
        }

        async fn similar_documents(
            &self,
            _: &[f32],
            _: i64,
            _: Option<i64>,
            _: i32,
            _: f32,
        ) -> Result<Vec<RetrievalHit>> {
            Ok(Vec::new())
        }

        async fn similar_global(&self, _: &[f32], _: i32, _: f32, _: f32) -> Result<Vec<RetrievalHit>> {
            Ok(Vec::new())
        }

        async fn insert_document_chunk(&self, _: &DocumentChunk) -> Result<()> {
            let n = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.fail_after {
                return Err(OrchestratorError::StoreUnreachable("down".into()));
            }
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

    struct StubEmbedder {
        dim: usize,
        calls: Mutex<usize>,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        async fn embed(&self, _: i64, _: &str) -> Result<Vec<f32>> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if self.fail_on_call == Some(*calls) {
                return Err(OrchestratorError::ProviderTransient("down".into()));
            }
            Ok(vec![0.0; self.dim])
        }

        async fn embed_batch(&self, user_id: i64, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for t in texts {
                out.push(self.embed(user_id, t).await?);
            }
            Ok(out)
        }
    }

    fn config() -> ChunkingConfig {
        ChunkingConfig {
            target_chars: 50,
            overlap_chars: 0,
            max_chunks_per_doc: 50,
        }
    }

    /// A lazily-connected pool never touches the network, so `ActivityLogger`'s
    /// worker only blocks on a real send if a test actually flushes a log.
    fn test_activity_logger() -> ActivityLogger {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/test")
            .expect("lazy pool");
        ActivityLogger::new(pool, crate::logging::LoggerConfig::default())
    }

    #[tokio::test]
    async fn empty_document_yields_zero_chunks_written() {
        let ingestor = DocumentIngestor::new(
            Arc::new(StubStore { insert_calls: AtomicUsize::new(0), fail_after: usize::MAX }),
            Arc::new(StubEmbedder { dim: 4, calls: Mutex::new(0), fail_on_call: None }),
            &config(),
            test_activity_logger(),
        );
        let outcome = ingestor.ingest(1, 1, None, b"   \n\n  ", "empty.txt", "text/plain").await.unwrap();
        assert_eq!(outcome.chunks_written, 0);
    }

    #[tokio::test]
    async fn unsupported_content_type_fails_before_any_write() {
        let ingestor = DocumentIngestor::new(
            Arc::new(StubStore { insert_calls: AtomicUsize::new(0), fail_after: usize::MAX }),
            Arc::new(StubEmbedder { dim: 4, calls: Mutex::new(0), fail_on_call: None }),
            &config(),
            test_activity_logger(),
        );
        let err = ingestor
            .ingest(1, 1, None, b"hi", "file.exe", "application/x-executable")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn persistence_failure_yields_partial_success_not_rollback() {
        let text = "word ".repeat(200);
        let ingestor = DocumentIngestor::new(
            Arc::new(StubStore { insert_calls: AtomicUsize::new(0), fail_after: 2 }),
            Arc::new(StubEmbedder { dim: 4, calls: Mutex::new(0), fail_on_call: None }),
            &config(),
            test_activity_logger(),
        );
        let outcome = ingestor
            .ingest(1, 1, None, text.as_bytes(), "big.txt", "text/plain")
            .await
            .unwrap();
        assert_eq!(outcome.chunks_written, 2);
    }

    #[tokio::test]
    async fn embedding_failure_aborts_after_current_batch() {
        let text = "word ".repeat(200);
        let ingestor = DocumentIngestor::new(
            Arc::new(StubStore { insert_calls: AtomicUsize::new(0), fail_after: usize::MAX }),
            Arc::new(StubEmbedder { dim: 4, calls: Mutex::new(0), fail_on_call: Some(3) }),
            &config(),
            test_activity_logger(),
        );
        let outcome = ingestor
            .ingest(1, 1, None, text.as_bytes(), "big.txt", "text/plain")
            .await
            .unwrap();
        assert_eq!(outcome.chunks_written, 2);
    }
}
