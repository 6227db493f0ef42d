//! C9 Background Ingester (spec §4.9): fire-and-forget post-stream work.
//! Scheduled only after the caller has already sent its response terminator,
//! so none of this can extend observed turn latency. Each task runs under
//! its own deadline, independent of the other two; a timeout is logged and
//! the task dropped, never surfaced to the turn that triggered it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{instrument, warn};

use crate::database::store::VectorStore;
use crate::embedding::EmbeddingClient;
use crate::models::chat::Role;
use crate::models::message::MessageEmbedding;

const TASK_DEADLINE: Duration = Duration::from_millis(3_000);

pub struct BackgroundIngester {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
}

impl BackgroundIngester {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { store, embedder }
    }

    /// Spawns the three independent post-turn tasks and returns immediately;
    /// none of the returned `JoinHandle`s need to be awaited by the caller.
    #[instrument(skip(self, user_text, assistant_text), fields(session_id, user_id))]
    pub fn spawn_turn(
        &self,
        user_id: i64,
        session_id: i64,
        project_id: Option<i64>,
        user_message_id: i64,
        assistant_message_id: i64,
        user_text: String,
        assistant_text: String,
    ) {
        self.spawn_embed_message(user_id, session_id, project_id, user_message_id, Role::User, user_text);
        self.spawn_embed_message(
            user_id,
            session_id,
            project_id,
            assistant_message_id,
            Role::Assistant,
            assistant_text,
        );
        self.spawn_touch_session(session_id);
    }

    fn spawn_embed_message(
        &self,
        user_id: i64,
        session_id: i64,
        project_id: Option<i64>,
        message_id: i64,
        role: Role,
        content: String,
    ) {
        let store = self.store.clone();
        let embedder = self.embedder.clone();

        tokio::spawn(async move {
            let task = async {
                let embedding = embedder.embed(user_id, &content).await?;
                let record = MessageEmbedding {
                    embedding_id: 0,
                    message_id,
                    user_id,
                    project_id,
                    session_id,
                    role,
                    content_snippet: MessageEmbedding::snippet(&content),
                    embedding,
                    metadata: json!({}),
                    created_at: Utc::now(),
                };
                store.insert_message_embedding(&record).await
            };

            match tokio::time::timeout(TASK_DEADLINE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    e.log();
                }
                Err(_) => {
                    warn!(message_id, "message embedding ingestion missed its deadline");
                }
            }
        });
    }

    fn spawn_touch_session(&self, session_id: i64) {
        let store = self.store.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(TASK_DEADLINE, store.touch_session(session_id)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    e.log();
                }
                Err(_) => {
                    warn!(session_id, "session touch missed its deadline");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::sleep;

    use crate::error::Result;
    use crate::models::{DocumentChunk, GlobalKnowledge, RetrievalHit};

    struct RecordingStore {
        inserted: Mutex<Vec<i64>>,
        touched: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
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
            Ok(())
        }
        async fn insert_message_embedding(&self, m: &MessageEmbedding) -> Result<()> {
            self.inserted.lock().unwrap().push(m.message_id);
            Ok(())
        }
        async fn insert_global_knowledge(&self, _: &GlobalKnowledge) -> Result<()> {
            Ok(())
        }
        async fn touch_session(&self, _: i64) -> Result<()> {
            self.touched.fetch_add(1, Ordering::SeqCst);
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
            Ok(vec![0.0; 4])
        }
        async fn embed_batch(&self, _: i64, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
    }

    #[tokio::test]
    async fn spawn_turn_persists_both_messages_and_touches_session() {
        let store = Arc::new(RecordingStore { inserted: Mutex::new(Vec::new()), touched: AtomicUsize::new(0) });
        let ingester = BackgroundIngester::new(store.clone(), Arc::new(StubEmbedder));

        ingester.spawn_turn(1, 10, None, 100, 101, "hi".into(), "hello!".into());

        sleep(Duration::from_millis(50)).await;

        let inserted = store.inserted.lock().unwrap().clone();
        assert!(inserted.contains(&100));
        assert!(inserted.contains(&101));
        assert_eq!(store.touched.load(Ordering::SeqCst), 1);
    }
}
