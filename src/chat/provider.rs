//! HTTP chat-completion client for C7: builds the wire request (including
//! OpenAI-style tool schemas and forced tool-choice), streams the SSE
//! response, and reassembles fragmented `tool_calls` deltas into whole
//! `ToolCallRequest`s before they reach the generator.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::settings::GenerationConfig;
use crate::error::{OrchestratorError, Result};
use crate::models::chat::{ChatMessage, ToolCallRequest};
use crate::utils::limiters::Limiters;

/// A tool advertised to the model, in OpenAI function-calling shape.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    fn to_wire(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta(String),
    ToolCall(ToolCallRequest),
    Done,
}

#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    async fn stream_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSpec>>,
        force_tool: Option<String>,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;
}

pub struct HttpChatProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: usize,
    limiters: Arc<Limiters>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
struct ChunkFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChunkToolCall {
    index: usize,
    id: Option<String>,
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize, Default)]
struct ChunkChoice {
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamChunk {
    choices: Vec<ChunkChoice>,
}

impl HttpChatProvider {
    pub fn new(config: &GenerationConfig, limiters: Arc<Limiters>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_millis(config.stream_deadline_ms))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            limiters,
        }
    }
}

#[async_trait]
impl ChatCompletionProvider for HttpChatProvider {
    #[instrument(skip(self, messages, tools), fields(messages = messages.len()))]
    async fn stream_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolSpec>>,
        force_tool: Option<String>,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.llm_generate.clone(),
            self.limiters.acquire_timeout,
            "llm_generate",
        )
        .await?;
        debug!(wait_ms = wait.as_millis() as u64, op = "llm_generate", "wait_queue");

        let wire_messages = messages
            .into_iter()
            .map(|m| WireMessage {
                role: m.role.as_str().to_string(),
                content: m.content,
            })
            .collect();

        let tool_choice = force_tool.map(|name| {
            serde_json::json!({ "type": "function", "function": { "name": name } })
        });

        let request = WireRequest {
            model: self.model.clone(),
            messages: wire_messages,
            max_tokens: self.max_tokens,
            temperature: 0.7,
            stream: true,
            tools: tools.map(|ts| ts.iter().map(ToolSpec::to_wire).collect()),
            tool_choice,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| OrchestratorError::ProviderTransient(format!("chat request failed: {e}")).log())?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::ProviderTransient(format!("chat provider {status}: {body}")).log());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::ProviderPermanent(format!("chat provider {status}: {body}")).log());
        }

        Ok(parse_sse_stream(response.bytes_stream()).boxed())
    }
}

/// Turns a byte stream of `"data: {json}\n\n"` frames into `StreamEvent`s,
/// accumulating fragmented `tool_calls` by their wire `index` and flushing
/// them as complete `ToolCallRequest`s once the provider signals
/// `finish_reason: "tool_calls"` or the stream ends.
fn parse_sse_stream(
    mut bytes_stream: impl futures::Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>>
        + Send
        + Unpin
        + 'static,
) -> impl futures::Stream<Item = Result<StreamEvent>> + Send + 'static {
    async_stream::stream! {
        let mut pending: BTreeMap<usize, (Option<String>, String, String)> = BTreeMap::new();

        loop {
            match bytes_stream.next().await {
                Some(Ok(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    for line in text.lines() {
                        let Some(payload) = line.strip_prefix("data: ") else { continue };
                        if payload == "[DONE]" {
                            for (_, (id, name, arguments)) in std::mem::take(&mut pending) {
                                yield Ok(StreamEvent::ToolCall(ToolCallRequest {
                                    call_id: id.unwrap_or_default(),
                                    name,
                                    arguments: serde_json::from_str(&arguments).unwrap_or(Value::Null),
                                }));
                            }
                            yield Ok(StreamEvent::Done);
                            return;
                        }

                        let chunk: StreamChunk = match serde_json::from_str(payload) {
                            Ok(c) => c,
                            Err(_) => continue,
                        };

                        let Some(choice) = chunk.choices.into_iter().next() else { continue };

                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                yield Ok(StreamEvent::TextDelta(content));
                            }
                        }

                        if let Some(tool_calls) = choice.delta.tool_calls {
                            for tc in tool_calls {
                                let entry = pending.entry(tc.index).or_insert_with(|| {
                                    (None, String::new(), String::new())
                                });
                                if let Some(id) = tc.id {
                                    entry.0 = Some(id);
                                }
                                if let Some(function) = tc.function {
                                    if let Some(name) = function.name {
                                        entry.1.push_str(&name);
                                    }
                                    if let Some(arguments) = function.arguments {
                                        entry.2.push_str(&arguments);
                                    }
                                }
                            }
                        }

                        if choice.finish_reason.as_deref() == Some("tool_calls") {
                            for (_, (id, name, arguments)) in std::mem::take(&mut pending) {
                                yield Ok(StreamEvent::ToolCall(ToolCallRequest {
                                    call_id: id.unwrap_or_default(),
                                    name,
                                    arguments: serde_json::from_str(&arguments).unwrap_or(Value::Null),
                                }));
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    yield Err(OrchestratorError::ProviderTransient(format!("stream error: {e}")).log());
                    return;
                }
                None => {
                    for (_, (id, name, arguments)) in std::mem::take(&mut pending) {
                        yield Ok(StreamEvent::ToolCall(ToolCallRequest {
                            call_id: id.unwrap_or_default(),
                            name,
                            arguments: serde_json::from_str(&arguments).unwrap_or(Value::Null),
                        }));
                    }
                    yield Ok(StreamEvent::Done);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_spec_renders_openai_function_shape() {
        let spec = ToolSpec {
            name: "internet_search".into(),
            description: "search the web".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        };
        let wire = spec.to_wire();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "internet_search");
    }
}
