//! Language model abstraction plus the two implementations the agents use:
//! a scripted stub and Google's Gemini `generateContent` API.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::AgentDirective;
use crate::config::AgentConfig;
use crate::error::{Result, WeatherError};
use crate::message::{Message, Role, ToolCall};
use crate::tool::ToolDescriptor;

/// Result of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Minimal abstraction around a chat completion provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ModelCompletion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> WeatherError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return WeatherError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    WeatherError::LanguageModel(format!("{provider} request failed with {status}: {body}"))
}

/// Replays scripted replies. A reply that parses as a directive
/// (`{"action":"respond",...}` or `{"action":"call_tool",...}`) is turned into
/// the matching completion; anything else is returned as plain text.
pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete_chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<ModelCompletion> {
        let raw = self
            .responses
            .lock()
            .map_err(|_| WeatherError::LanguageModel("StubModel poisoned".into()))?
            .pop_front()
            .ok_or_else(|| {
                WeatherError::LanguageModel("StubModel ran out of scripted responses".into())
            })?;

        match serde_json::from_str::<AgentDirective>(&raw) {
            Ok(AgentDirective::Respond { content }) => Ok(ModelCompletion {
                content: Some(content),
                tool_calls: Vec::new(),
            }),
            Ok(AgentDirective::CallTool { name, arguments }) => Ok(ModelCompletion {
                content: None,
                tool_calls: vec![ToolCall {
                    id: None,
                    name,
                    arguments,
                }],
            }),
            Err(_) => Ok(ModelCompletion {
                content: Some(raw),
                tool_calls: Vec::new(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn from_config(cfg: &AgentConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                WeatherError::LanguageModel(
                    "missing Gemini API key; set GOOGLE_API_KEY or [agent].api_key".into(),
                )
            })?;
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|err| WeatherError::LanguageModel(format!("http client error: {err}")))?,
            model: cfg.model.clone(),
            api_key,
            endpoint: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ModelCompletion> {
        let payload = gemini_request(messages, tools);
        debug!(model = %self.model, messages = messages.len(), "calling gemini");

        let resp = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.endpoint, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| WeatherError::LanguageModel(format!("Gemini request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "gemini"));
        }

        let parsed: GeminiResponse = resp.json().await.map_err(|err| {
            WeatherError::LanguageModel(format!("Gemini response parse error: {err}"))
        })?;
        Ok(parse_gemini_response(parsed))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

fn gemini_request(messages: &[Message], tools: &[ToolDescriptor]) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let contents: Vec<GeminiContent> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|message| {
            let (role, part) = match (message.role, &message.tool_call, &message.tool_result) {
                (Role::Assistant, Some(call), _) => (
                    "model",
                    GeminiPart {
                        function_call: Some(GeminiFunctionCall {
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }),
                        ..GeminiPart::default()
                    },
                ),
                (Role::Tool, _, Some(result)) => (
                    "user",
                    GeminiPart {
                        function_response: Some(GeminiFunctionResponse {
                            name: result.name.clone(),
                            // the API only accepts an object here
                            response: match &result.output {
                                Value::Object(_) => result.output.clone(),
                                other => json!({ "result": other }),
                            },
                        }),
                        ..GeminiPart::default()
                    },
                ),
                (Role::Assistant, None, _) => ("model", text_part(&message.content)),
                _ => ("user", text_part(&message.content)),
            };
            GeminiContent {
                role: Some(role.to_string()),
                parts: vec![part],
            }
        })
        .collect();

    let mut payload = json!({ "contents": contents });
    if !system.is_empty() {
        payload["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
    }
    if !tools.is_empty() {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema(),
                })
            })
            .collect();
        payload["tools"] = json!([{ "functionDeclarations": declarations }]);
    }
    payload
}

fn text_part(text: &str) -> GeminiPart {
    GeminiPart {
        text: Some(text.to_string()),
        ..GeminiPart::default()
    }
}

fn parse_gemini_response(parsed: GeminiResponse) -> ModelCompletion {
    let parts = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|cand| cand.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        if let Some(chunk) = part.text {
            text.push_str(&chunk);
        }
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCall {
                id: None,
                name: call.name,
                arguments: call.args,
            });
        }
    }

    ModelCompletion {
        content: if text.is_empty() { None } else { Some(text) },
        tool_calls,
    }
}
