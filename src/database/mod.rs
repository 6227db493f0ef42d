pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use pool::DbPool;
pub use repository::PgVectorStore;
pub use store::VectorStore;
