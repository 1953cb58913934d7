//! Tool descriptors, results and the registry that dispatches calls to them.
//!
//! The registry is shared by both ways of exposing tools: the MCP server
//! answers `tools/list` and `tools/call` from it, and the agent loop invokes
//! it directly when the model asks for a function call.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{Result, WeatherError};

/// Named arguments of a single tool call, as they arrive on the wire.
pub type ToolArguments = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
}

impl ParamType {
    fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
        }
    }

    /// Integers may also arrive as strings of digits.
    fn coerce(self, value: Value) -> std::result::Result<Value, String> {
        match (self, value) {
            (ParamType::String, value @ Value::String(_)) => Ok(value),
            (ParamType::String, other) => Err(format!("must be a string, got {other}")),
            (ParamType::Integer, Value::Number(n)) => n
                .as_i64()
                .map(Value::from)
                .ok_or_else(|| format!("must be an integer, got {n}")),
            (ParamType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("must be an integer, got \"{s}\"")),
            (ParamType::Integer, other) => Err(format!("must be an integer, got {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

/// Static metadata describing a tool: its name, purpose and arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn required(mut self, name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        self.parameters.push(ParamSpec {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        self.parameters.push(ParamSpec {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        });
        self
    }

    /// JSON Schema advertised as the tool's `inputSchema`.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.kind.as_str(),
                    "description": param.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Checks `arguments` against the declared parameters and normalizes
    /// their types. Unknown keys and missing required keys are rejected.
    pub fn validate(&self, mut arguments: ToolArguments) -> Result<ToolArguments> {
        if let Some(unknown) = arguments
            .keys()
            .find(|key| !self.parameters.iter().any(|p| &p.name == *key))
        {
            return Err(WeatherError::invalid_arguments(
                &self.name,
                format!("unexpected argument `{unknown}`"),
            ));
        }

        for param in &self.parameters {
            let present = matches!(arguments.get(&param.name), Some(v) if !v.is_null());
            if !present {
                arguments.remove(&param.name);
                if param.required {
                    return Err(WeatherError::invalid_arguments(
                        &self.name,
                        format!("missing required argument `{}`", param.name),
                    ));
                }
                continue;
            }

            if let Some(value) = arguments.get_mut(&param.name) {
                let coerced = param.kind.coerce(value.take()).map_err(|reason| {
                    WeatherError::invalid_arguments(
                        &self.name,
                        format!("argument `{}` {reason}", param.name),
                    )
                })?;
                *value = coerced;
            }
        }

        Ok(arguments)
    }
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { report: String },
    Error {
        #[serde(rename = "error_message")]
        message: String,
    },
}

impl ToolResult {
    pub fn success(report: impl Into<String>) -> Self {
        ToolResult::Success {
            report: report.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolResult::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    /// Report or error message; the wire does not tell them apart.
    pub fn into_text(self) -> String {
        match self {
            ToolResult::Success { report } => report,
            ToolResult::Error { message } => message,
        }
    }
}

/// A `tools/call` request: the tool name and its named arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(rename = "name")]
    pub tool_name: String,
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl RequestEnvelope {
    pub fn new(tool_name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
    Image {
        data: String,
        #[serde(rename = "mimeType", default)]
        mime_type: Option<String>,
    },
    Resource { resource: Value },
}

/// A `tools/call` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub content: Vec<Content>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ResponseEnvelope {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// All fragments joined by newlines, non-text fragments as placeholders.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|item| match item {
                Content::Text { text } => text.clone(),
                Content::Image { .. } => "[image]".to_string(),
                Content::Resource { resource } => format!("[Resource: {resource}]"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// `arguments` have already been validated against the descriptor.
    async fn call(&self, arguments: ToolArguments) -> Result<ToolResult>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}

/// Tools in registration order, addressable by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Registering a name twice replaces the earlier tool in place.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| Arc::clone(&self.tools[slot]))
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|tool| tool.descriptor().clone())
            .collect()
    }

    /// Resolves, validates and runs a tool, returning its tagged result.
    pub async fn invoke(&self, name: &str, arguments: ToolArguments) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| WeatherError::ToolNotFound(name.to_string()))?;
        let arguments = tool.descriptor().validate(arguments)?;

        match AssertUnwindSafe(tool.call(arguments)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(WeatherError::ToolInvocation {
                name: name.to_string(),
                source: panic_message(panic).into(),
            }),
        }
    }

    /// Dispatch boundary: never fails, every outcome becomes a text fragment.
    pub async fn call_tool(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let RequestEnvelope {
            tool_name,
            arguments,
        } = request;
        debug!(tool = %tool_name, "dispatching tool call");

        match self.invoke(&tool_name, arguments).await {
            Ok(result) => ResponseEnvelope::text(result.into_text()),
            Err(WeatherError::ToolNotFound(name)) => {
                warn!(tool = %name, "unknown tool requested");
                ResponseEnvelope::text(format!("Tool '{name}' not implemented."))
            }
            Err(err) => {
                warn!(tool = %tool_name, error = %err, "tool call failed");
                ResponseEnvelope::text(format!("Failed to execute tool '{tool_name}': {err}"))
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("tool panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("tool panicked: {msg}")
    } else {
        "tool panicked".to_string()
    }
}
