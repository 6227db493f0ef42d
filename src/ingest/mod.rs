pub mod chunker;
pub mod ingestor;
pub mod parser;

pub use ingestor::{DocumentIngestor, IngestOutcome};
pub use parser::{DocumentParser, ParsedDocument};
