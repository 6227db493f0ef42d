//! C7 Chat Generator (spec §4.7): assembles the message list, streams the
//! model's reply, and runs at most one tool round trip. State machine:
//!
//! ```text
//! [Start] -> build_messages -> [AwaitingLLM]
//!   [AwaitingLLM] --text delta--> [Streaming] --...--> [Done]
//!   [AwaitingLLM] --tool call-->  [ToolRun] --tool result--> [AwaitingLLM] (tools disabled)
//! ```
//!
//! A transient provider failure before any text has been emitted triggers
//! one whole-turn retry; after the first delta it ends the stream instead,
//! since content already sent to the caller can't be unsent.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::instrument;

use crate::config::settings::{GenerationConfig, PromptsConfig, WebSearchConfig};
use crate::error::OrchestratorError;
use crate::logging::{ActivityLog, ActivityLogger, ActivityStatus, ActivityType};
use crate::models::chat::{ChatMessage, TurnRequest};
use crate::models::retrieval::ContextBlock;
use crate::retrieval::ContextFormatter;
use crate::utils::token_estimator;

use super::provider::{ChatCompletionProvider, StreamEvent, ToolSpec};
use super::web_search::WebSearchProvider;

/// Rough ceiling on how many tokens of prior history are carried into a
/// turn; oldest messages are dropped first. Paired with `estimate_tokens`'s
/// determinism so the same history always yields the same truncation.
const HISTORY_TOKEN_BUDGET: usize = 4_000;

const CONTEXT_MAX_CHARS: usize = 16_000;

const WEB_SEARCH_TOOL_NAME: &str = "internet_search";

#[derive(Debug, Clone)]
pub enum ChatEvent {
    TextDelta(String),
    ToolInvoked { name: String },
    Done { text: String },
    Error(String),
}

pub struct ChatGenerator {
    provider: Arc<dyn ChatCompletionProvider>,
    web_search: Arc<dyn WebSearchProvider>,
    prompts: PromptsConfig,
    web_search_config: WebSearchConfig,
    generation: GenerationConfig,
    activity_log: ActivityLogger,
}

impl ChatGenerator {
    pub fn new(
        provider: Arc<dyn ChatCompletionProvider>,
        web_search: Arc<dyn WebSearchProvider>,
        prompts: PromptsConfig,
        web_search_config: WebSearchConfig,
        generation: GenerationConfig,
        activity_log: ActivityLogger,
    ) -> Self {
        Self {
            provider,
            web_search,
            prompts,
            web_search_config,
            generation,
            activity_log,
        }
    }

    #[instrument(skip(self, request, context), fields(user_id = request.user_id, session_id = request.session_id))]
    pub fn generate(
        &self,
        request: TurnRequest,
        context: ContextBlock,
    ) -> BoxStream<'static, ChatEvent> {
        let messages = self.build_messages(&request, &context);
        let tools = self.tool_specs(&request);
        let force_tool = self.forced_tool(&request);

        let provider = self.provider.clone();
        let web_search = self.web_search.clone();
        let activity_log = self.activity_log.clone();
        let user_id = request.user_id;
        let session_id = request.session_id;

        activity_log.log_async(
            ActivityLog::builder(session_id, user_id, ActivityType::RequestReceived)
                .status(ActivityStatus::Info)
                .message(request.user_text.clone())
                .build(),
        );

        async_stream::stream! {
            let mut messages = messages;
            let mut tools = tools;
            let mut force_tool = force_tool;
            let mut tool_used = false;
            let mut emitted_any_text = false;
            let mut full_text = String::new();
            let mut attempts_without_output = 0u32;

            loop {
                let stream_result = provider
                    .stream_completion(messages.clone(), tools.clone(), force_tool.take())
                    .await;

                let mut stream = match stream_result {
                    Ok(s) => s,
                    Err(e) => {
                        if !emitted_any_text && attempts_without_output == 0 && e_is_transient(&e) {
                            attempts_without_output += 1;
                            continue;
                        }
                        e.log();
                        activity_log.log_async(
                            ActivityLog::builder(session_id, user_id, ActivityType::LlmError)
                                .error(e.to_string(), "stream_completion")
                                .build(),
                        );
                        yield ChatEvent::Error(e.to_string());
                        return;
                    }
                };

                let mut saw_tool_call = None;
                let mut stream_failed = false;

                while let Some(item) = stream.next().await {
                    match item {
                        Ok(StreamEvent::TextDelta(delta)) => {
                            emitted_any_text = true;
                            full_text.push_str(&delta);
                            yield ChatEvent::TextDelta(delta);
                        }
                        Ok(StreamEvent::ToolCall(call)) => {
                            saw_tool_call = Some(call);
                        }
                        Ok(StreamEvent::Done) => break,
                        Err(e) => {
                            stream_failed = true;
                            if !emitted_any_text && attempts_without_output == 0 && e_is_transient(&e) {
                                attempts_without_output += 1;
                            } else {
                                e.log();
                                activity_log.log_async(
                                    ActivityLog::builder(session_id, user_id, ActivityType::LlmError)
                                        .error(e.to_string(), "stream_delta")
                                        .build(),
                                );
                                yield ChatEvent::Error(e.to_string());
                                return;
                            }
                            break;
                        }
                    }
                }

                if stream_failed && attempts_without_output > 0 && !emitted_any_text {
                    continue;
                }

                let Some(call) = saw_tool_call else {
                    activity_log.log_async(
                        ActivityLog::builder(session_id, user_id, ActivityType::MessageSent)
                            .response(full_text.clone())
                            .build(),
                    );
                    yield ChatEvent::Done { text: full_text };
                    return;
                };

                if tool_used || call.name != WEB_SEARCH_TOOL_NAME {
                    messages.push(ChatMessage::assistant(format!(
                        "tool '{}' was not invoked: at most one tool call is permitted per turn",
                        call.name
                    )));
                    tools = None;
                    continue;
                }

                tool_used = true;
                yield ChatEvent::ToolInvoked { name: call.name.clone() };

                let query = call
                    .arguments
                    .get("query")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();

                let results = web_search.search(&query, 5).await;
                let tool_text = if results.is_empty() {
                    "no results, or the search provider was unavailable".to_string()
                } else {
                    results
                        .iter()
                        .map(|r| format!("- {} ({})\n  {}", r.title, r.url, r.snippet))
                        .collect::<Vec<_>>()
                        .join("\n")
                };

                messages.push(ChatMessage::assistant(format!(
                    "[internet_search result for \"{query}\"]\n{tool_text}"
                )));
                tools = None;
            }
        }
        .boxed()
    }

    fn build_messages(&self, request: &TurnRequest, context: &ContextBlock) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        messages.push(ChatMessage::system(self.prompts.main_system_prompt.clone()));

        if !context.is_empty() {
            let rendered = ContextFormatter::format(context, CONTEXT_MAX_CHARS);
            messages.push(ChatMessage::system(rendered));
        }

        let kept = self.capped_history(&request.history);
        if kept.len() < request.history.len() {
            self.activity_log.log_async(
                ActivityLog::builder(request.session_id, request.user_id, ActivityType::SlidingWindowEnforced)
                    .status(ActivityStatus::Warning)
                    .token_count(HISTORY_TOKEN_BUDGET as i32)
                    .build(),
            );
        }
        messages.extend(kept);
        messages.push(ChatMessage::user(request.user_text.clone()));
        messages
    }

    /// Drops the oldest history messages until the remainder fits the
    /// budget, keeping the most recent turns intact.
    fn capped_history(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut kept: Vec<ChatMessage> = Vec::new();
        let mut tokens = 0usize;

        for message in history.iter().rev() {
            let cost = token_estimator::estimate_tokens(&message.content);
            if tokens + cost > HISTORY_TOKEN_BUDGET {
                break;
            }
            tokens += cost;
            kept.push(message.clone());
        }

        kept.reverse();
        kept
    }

    fn tool_specs(&self, request: &TurnRequest) -> Option<Vec<ToolSpec>> {
        if !request.web_search_requested() || !self.web_search_config.enabled() {
            return None;
        }
        Some(vec![ToolSpec {
            name: WEB_SEARCH_TOOL_NAME.to_string(),
            description: "Search the public internet for current information".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "the search query" }
                },
                "required": ["query"]
            }),
        }])
    }

    /// Only forces the tool when it's actually advertised: a caller-text
    /// trigger match is moot if `tool_specs` already decided not to offer the
    /// tool this turn (disabled, or explicitly opted out via the request).
    fn forced_tool(&self, request: &TurnRequest) -> Option<String> {
        if !request.web_search_requested() || !self.web_search_config.enabled() {
            return None;
        }
        let lowered = request.user_text.to_lowercase();
        let triggered = self
            .web_search_config
            .force_triggers
            .iter()
            .any(|t| lowered.contains(&t.to_lowercase()));
        if triggered {
            Some(WEB_SEARCH_TOOL_NAME.to_string())
        } else {
            None
        }
    }
}

fn e_is_transient(e: &OrchestratorError) -> bool {
    matches!(e, OrchestratorError::ProviderTransient(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{GenerationConfig, PromptsConfig, WebSearchConfig};

    fn generation_config() -> GenerationConfig {
        GenerationConfig {
            base_url: "http://localhost".into(),
            api_key: None,
            model: "chat".into(),
            stream_deadline_ms: 120_000,
            max_tokens: 4_000,
        }
    }

    fn web_search_config(enabled: bool) -> WebSearchConfig {
        WebSearchConfig {
            base_url: "http://localhost".into(),
            api_key: if enabled { Some("key".into()) } else { None },
            force_triggers: vec!["search for".into()],
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

    #[test]
    fn tool_not_advertised_when_web_search_disabled() {
        use crate::chat::web_search::{SearchResult, WebSearchProvider};
        use async_trait::async_trait;

        struct NoopProvider;
        #[async_trait]
        impl ChatCompletionProvider for NoopProvider {
            async fn stream_completion(
                &self,
                _: Vec<ChatMessage>,
                _: Option<Vec<ToolSpec>>,
                _: Option<String>,
            ) -> crate::error::Result<BoxStream<'static, crate::error::Result<StreamEvent>>> {
                unreachable!()
            }
        }
        struct NoopSearch;
        #[async_trait]
        impl WebSearchProvider for NoopSearch {
            async fn search(&self, _: &str, _: usize) -> Vec<SearchResult> {
                Vec::new()
            }
        }

        let generator = ChatGenerator::new(
            Arc::new(NoopProvider),
            Arc::new(NoopSearch),
            PromptsConfig { main_system_prompt: "you are an assistant".into() },
            web_search_config(false),
            generation_config(),
            test_activity_logger(),
        );

        let request = TurnRequest {
            user_id: 1,
            session_id: 1,
            project_id: None,
            user_text: "hello".into(),
            history: vec![],
            enable_web_search: None,
        };
        assert!(generator.tool_specs(&request).is_none());
    }

    #[test]
    fn capped_history_keeps_most_recent_messages() {
        use crate::chat::web_search::{SearchResult, WebSearchProvider};
        use async_trait::async_trait;

        struct NoopProvider;
        #[async_trait]
        impl ChatCompletionProvider for NoopProvider {
            async fn stream_completion(
                &self,
                _: Vec<ChatMessage>,
                _: Option<Vec<ToolSpec>>,
                _: Option<String>,
            ) -> crate::error::Result<BoxStream<'static, crate::error::Result<StreamEvent>>> {
                unreachable!()
            }
        }
        struct NoopSearch;
        #[async_trait]
        impl WebSearchProvider for NoopSearch {
            async fn search(&self, _: &str, _: usize) -> Vec<SearchResult> {
                Vec::new()
            }
        }

        let generator = ChatGenerator::new(
            Arc::new(NoopProvider),
            Arc::new(NoopSearch),
            PromptsConfig { main_system_prompt: "sys".into() },
            web_search_config(true),
            generation_config(),
            test_activity_logger(),
        );

        let huge = "word ".repeat(HISTORY_TOKEN_BUDGET * 10);
        let history = vec![ChatMessage::user(huge), ChatMessage::assistant("recent reply")];
        let kept = generator.capped_history(&history);
        assert_eq!(kept.last().unwrap().content, "recent reply");
        assert!(kept.len() < history.len());
    }
}
