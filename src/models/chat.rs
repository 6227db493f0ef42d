use serde::{Deserialize, Serialize};

/// Closed set of message roles, shared by `ChatMessage` and `MessageEmbedding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// A single turn submitted by the caller, as described in spec §2's data-flow
/// paragraph.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub user_id: i64,
    pub session_id: i64,
    pub project_id: Option<i64>,
    pub user_text: String,
    pub history: Vec<ChatMessage>,
    pub enable_web_search: Option<bool>,
}

impl TurnRequest {
    pub fn web_search_requested(&self) -> bool {
        self.enable_web_search.unwrap_or(true)
    }
}

/// A structured tool invocation emitted by the chat-completion provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The textual result fed back to the model for a given tool call id.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
}
