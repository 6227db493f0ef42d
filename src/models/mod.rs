pub mod chat;
pub mod chunk;
pub mod knowledge;
pub mod message;
pub mod retrieval;

pub use chat::{ChatMessage, Role, ToolCallRequest, ToolResult, TurnRequest};
pub use chunk::DocumentChunk;
pub use knowledge::GlobalKnowledge;
pub use message::MessageEmbedding;
pub use retrieval::{ContextBlock, HitOrigin, RetrievalHit};

/// Embedding vector dimension. Fixed per spec; validated at startup against
/// configuration rather than hard-coded at call sites.
pub const EMBEDDING_DIM: usize = 1536;
