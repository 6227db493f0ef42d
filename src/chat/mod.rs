pub mod generator;
pub mod provider;
pub mod web_search;

pub use generator::{ChatEvent, ChatGenerator};
pub use provider::{ChatCompletionProvider, HttpChatProvider, StreamEvent, ToolSpec};
pub use web_search::{HttpWebSearchProvider, SearchResult, WebSearchProvider};
