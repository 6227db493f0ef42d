use thiserror::Error;

/// The closed set of error kinds for the orchestrator, per the sum-type guidance in
/// the design notes: callers match exhaustively rather than treating this as an
/// open-ended error bag.
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    /// Fatal at startup. Configuration failed validation (e.g. embedding dimension
    /// mismatch) before any request could be served.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A provider (embedding, chat, web search) failed in a way that is expected to
    /// succeed on retry: network errors, 5xx, 429. Retried with backoff at the call
    /// site; this variant is only returned once retries are exhausted.
    #[error("provider transient failure: {0}")]
    ProviderTransient(String),

    /// A provider failed in a way retrying will not fix (4xx other than 429, schema
    /// mismatch). Surfaced to the caller; the turn fails but the session survives.
    #[error("provider permanent failure: {0}")]
    ProviderPermanent(String),

    /// The vector store could not be reached for one source. C5 treats this
    /// per-source (empty list for that source); it is never turn-fatal.
    #[error("store unreachable: {0}")]
    StoreUnreachable(String),

    /// A wall-clock deadline elapsed. Cooperative: consumed by C5 (empty list for
    /// the source that missed the deadline) or by C7 (a stream-end event).
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// C3 only: no extractor is available for the asset's content type. Reported
    /// against the asset; the chat path is unaffected.
    #[error("unsupported document format: {content_type}")]
    UnsupportedFormat { content_type: String },

    /// A precondition the caller was responsible for upholding was violated (e.g.
    /// a null session_id reaching retrieval). Programmer error, fatal for the turn,
    /// logged loudly.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl OrchestratorError {
    pub fn unsupported_format(content_type: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            content_type: content_type.into(),
        }
    }

    /// Classify and log at the point of creation, mirroring the embedded-logging
    /// convention this codebase already uses in its HTTP error type: callers build
    /// the error through this constructor rather than logging separately at every
    /// call site.
    pub fn log(self) -> Self {
        match &self {
            Self::ConfigInvalid(msg) => tracing::error!(kind = "config_invalid", %msg),
            Self::ProviderTransient(msg) => tracing::warn!(kind = "provider_transient", %msg),
            Self::ProviderPermanent(msg) => tracing::error!(kind = "provider_permanent", %msg),
            Self::StoreUnreachable(msg) => tracing::warn!(kind = "store_unreachable", %msg),
            Self::DeadlineExceeded(msg) => tracing::warn!(kind = "deadline_exceeded", %msg),
            Self::UnsupportedFormat { content_type } => {
                tracing::warn!(kind = "unsupported_format", %content_type)
            }
            Self::Invariant(msg) => tracing::error!(kind = "invariant", %msg),
        }
        self
    }

    /// True for errors C5 degrades to an empty result for rather than failing the
    /// turn: store-side and deadline failures on a single source.
    pub fn is_degradable(&self) -> bool {
        matches!(self, Self::StoreUnreachable(_) | Self::DeadlineExceeded(_))
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
