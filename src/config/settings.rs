use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::models::EMBEDDING_DIM;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub chunking: ChunkingConfig,
    pub web_search: WebSearchConfig,
    pub session: SessionConfig,
    pub limits: LimitsConfig,
    pub logging: LoggingConfig,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Must equal 1536; validated at startup.
    pub dim: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub stream_deadline_ms: u64,
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    pub doc_k: i32,
    pub msg_k: i32,
    pub global_k: i32,
    pub threshold: f32,
    pub global_min_quality: f32,
    pub deadline_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContextConfig {
    pub max_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    pub target_chars: usize,
    pub overlap_chars: usize,
    pub max_chunks_per_doc: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebSearchConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub force_triggers: Vec<String>,
}

impl WebSearchConfig {
    /// Derived from presence of an API key, per spec §6.
    pub fn enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    pub enforce_isolation: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LimitsConfig {
    pub embedding_concurrency: usize,
    pub db_search_concurrency: usize,
    pub llm_generate_concurrency: usize,
    pub acquire_timeout_ms: u64,
    pub embedding_rate_per_minute: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub activity_queue_capacity: usize,
    pub activity_batch_size: usize,
    pub activity_batch_timeout_ms: u64,
    pub activity_worker_count: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    pub main_system_prompt: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| OrchestratorError::ConfigInvalid(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| OrchestratorError::ConfigInvalid(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.embedding.dim != EMBEDDING_DIM {
            return Err(OrchestratorError::ConfigInvalid(format!(
                "embedding.dim must equal {EMBEDDING_DIM}, got {}",
                self.embedding.dim
            ))
            .log());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings(dim: usize) -> Settings {
        Settings {
            database: DatabaseConfig {
                url: "postgres://localhost/test".into(),
                pool_max_size: 10,
                pool_timeout_seconds: 5,
            },
            embedding: EmbeddingConfig {
                model: "text-embedding".into(),
                base_url: "http://localhost:8000".into(),
                api_key: None,
                dim,
            },
            generation: GenerationConfig {
                base_url: "http://localhost:8001".into(),
                api_key: None,
                model: "chat".into(),
                stream_deadline_ms: 120_000,
                max_tokens: 6000,
            },
            retrieval: RetrievalConfig {
                doc_k: 15,
                msg_k: 6,
                global_k: 3,
                threshold: 0.10,
                global_min_quality: 0.60,
                deadline_ms: 5000,
            },
            context: ContextConfig { max_chars: 16_000 },
            chunking: ChunkingConfig {
                target_chars: 1000,
                overlap_chars: 200,
                max_chunks_per_doc: 50,
            },
            web_search: WebSearchConfig {
                base_url: "http://localhost:8002".into(),
                api_key: None,
                force_triggers: vec!["search for".into()],
            },
            session: SessionConfig {
                enforce_isolation: true,
            },
            limits: LimitsConfig {
                embedding_concurrency: 8,
                db_search_concurrency: 8,
                llm_generate_concurrency: 8,
                acquire_timeout_ms: 2000,
                embedding_rate_per_minute: 600,
            },
            logging: LoggingConfig {
                activity_queue_capacity: 10_000,
                activity_batch_size: 100,
                activity_batch_timeout_ms: 1000,
                activity_worker_count: 2,
            },
            prompts: PromptsConfig {
                main_system_prompt: "You are a helpful assistant.".into(),
            },
        }
    }

    #[test]
    fn rejects_wrong_dimension() {
        let settings = base_settings(768);
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfigInvalid(_)));
    }

    #[test]
    fn accepts_correct_dimension() {
        let settings = base_settings(1536);
        assert!(settings.validate().is_ok());
    }
}
