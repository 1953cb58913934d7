//! MCP (Model Context Protocol) wire types and the client side of the
//! weather tool server.
//!
//! Messages are JSON-RPC 2.0 objects, one per line. The client speaks to a
//! server through an [`McpTransport`]; [`StdioTransport`] launches the server
//! as a subprocess, [`LineTransport`] works over any pair of byte streams.
//!
//! # Example
//! ```rust,ignore
//! use weather_mcp::mcp::{McpClient, McpTools, StdioTransport};
//!
//! let transport = StdioTransport::spawn("weather-mcp-server", &[])?;
//! let tools = McpTools::new(McpClient::new(transport));
//! let mut registry = ToolRegistry::new();
//! tools.register_tools(&mut registry).await?;
//! ```

use std::ffi::OsStr;
use std::fmt;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, WeatherError};
use crate::tool::{
    ParamType, ResponseEnvelope, Tool, ToolArguments, ToolDescriptor, ToolRegistry, ToolResult,
};

pub const JSONRPC_VERSION: &str = "2.0";
/// Version the client asks for during `initialize`.
pub const CLIENT_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// ─────────────────────────────────────────────────────────────────────────────
// JSON-RPC envelope
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// A request, or a notification when `id` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// `null` when the request could not be parsed.
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// MCP payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl From<&ToolDescriptor> for ToolDefinition {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: Some(descriptor.description.clone()),
            input_schema: descriptor.input_schema(),
        }
    }
}

impl ToolDefinition {
    /// Rebuilds a local descriptor from the advertised JSON Schema. Only
    /// `string` and `integer` properties are understood.
    pub fn to_descriptor(&self) -> Result<ToolDescriptor> {
        let description = self
            .description
            .clone()
            .unwrap_or_else(|| format!("MCP tool: {}", self.name));
        let mut descriptor = ToolDescriptor::new(&self.name, description);

        let required: Vec<&str> = self.input_schema["required"]
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        if let Some(properties) = self.input_schema["properties"].as_object() {
            for (name, schema) in properties {
                let kind: ParamType = serde_json::from_value(schema["type"].clone()).map_err(|_| {
                    WeatherError::Mcp(format!(
                        "tool `{}` has unsupported type {} for `{name}`",
                        self.name, schema["type"]
                    ))
                })?;
                let about = schema["description"].as_str().unwrap_or_default();
                descriptor = if required.contains(&name.as_str()) {
                    descriptor.required(name, kind, about)
                } else {
                    descriptor.optional(name, kind, about)
                };
            }
        }

        Ok(descriptor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transports
// ─────────────────────────────────────────────────────────────────────────────

/// Transport layer for MCP communication
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for the response carrying its id.
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Send a notification; nothing is read back.
    async fn notify(&self, notification: JsonRpcRequest) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Newline-delimited JSON-RPC over an arbitrary reader/writer pair.
pub struct LineTransport<R, W> {
    reader: Mutex<BufReader<R>>,
    writer: Mutex<W>,
    request_id: AtomicU64,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
            request_id: AtomicU64::new(1),
        }
    }

    async fn write_message(&self, message: &JsonRpcRequest) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| WeatherError::Mcp(format!("failed to write to MCP server: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| WeatherError::Mcp(format!("failed to flush: {e}")))
    }

    /// Reads until the response for `id`, skipping anything the server
    /// initiated on its own.
    async fn read_response(&self, id: &RequestId) -> Result<JsonRpcResponse> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| WeatherError::Mcp(format!("failed to read from MCP server: {e}")))?;
            if read == 0 {
                return Err(WeatherError::Mcp(format!(
                    "MCP server closed the connection before answering request {id}"
                )));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let message: Value = serde_json::from_str(trimmed)
                .map_err(|e| WeatherError::Mcp(format!("failed to parse response: {e}")))?;
            if message.get("method").is_some() {
                debug!(method = %message["method"], "skipping server-initiated message");
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(message)
                .map_err(|e| WeatherError::Mcp(format!("failed to parse response: {e}")))?;
            if response.id.as_ref() == Some(id) {
                return Ok(response);
            }
            debug!(id = ?response.id, expected = %id, "skipping unrelated response");
        }
    }
}

#[async_trait]
impl<R, W> McpTransport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let id = RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst) as i64);
        request.id = Some(id.clone());
        self.write_message(&request).await?;
        self.read_response(&id).await
    }

    async fn notify(&self, mut notification: JsonRpcRequest) -> Result<()> {
        notification.id = None;
        self.write_message(&notification).await
    }

    async fn close(&self) -> Result<()> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|e| WeatherError::Mcp(format!("failed to close MCP stream: {e}")))
    }
}

/// Transport that communicates with an MCP server launched as a subprocess.
pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    lines: LineTransport<ChildStdout, ChildStdin>,
}

impl StdioTransport {
    /// Launch `program` with piped stdin/stdout. Its stderr is inherited so
    /// server logs stay visible.
    pub fn spawn<S: AsRef<OsStr>>(program: impl AsRef<OsStr>, args: &[S]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WeatherError::Mcp(format!("failed to spawn MCP server: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WeatherError::Mcp("MCP server stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WeatherError::Mcp("MCP server stdout not available".into()))?;

        Ok(Self {
            child: Mutex::new(Some(child)),
            lines: LineTransport::new(stdout, stdin),
        })
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        self.lines.send(request).await
    }

    async fn notify(&self, notification: JsonRpcRequest) -> Result<()> {
        self.lines.notify(notification).await
    }

    /// Closes stdin so the server sees end of input, then reaps it.
    async fn close(&self) -> Result<()> {
        if let Err(err) = self.lines.close().await {
            debug!(error = %err, "MCP server stdin already closed");
        }

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(%status, "MCP server exited");
            }
            Err(_) => {
                warn!("MCP server did not exit after end of input, killing it");
                child
                    .kill()
                    .await
                    .map_err(|e| WeatherError::Mcp(format!("failed to kill MCP server: {e}")))?;
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MCP Client
// ─────────────────────────────────────────────────────────────────────────────

/// MCP client for connecting to MCP servers
pub struct McpClient<T: McpTransport> {
    transport: T,
    initialized: Option<InitializeResult>,
}

impl<T: McpTransport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            initialized: None,
        }
    }

    /// Performs the `initialize` handshake once and sends
    /// `notifications/initialized`.
    pub async fn initialize(&mut self) -> Result<&ServerInfo> {
        if self.initialized.is_none() {
            let params = json!({
                "protocolVersion": CLIENT_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                }
            });
            let result: InitializeResult = self.request("initialize", Some(params)).await?;
            debug!(
                server = %result.server_info.name,
                protocol = %result.protocol_version,
                "MCP session initialized"
            );
            self.transport
                .notify(JsonRpcRequest::new("notifications/initialized", None))
                .await?;
            self.initialized = Some(result);
        }

        self.server_info()
            .ok_or_else(|| WeatherError::Mcp("server info not available".into()))
    }

    pub async fn ping(&mut self) -> Result<()> {
        self.ensure_initialized().await?;
        let _: Value = self.request("ping", None).await?;
        Ok(())
    }

    pub async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>> {
        self.ensure_initialized().await?;
        let result: ListToolsResult = self.request("tools/list", None).await?;
        Ok(result.tools)
    }

    pub async fn call_tool(&mut self, name: &str, arguments: ToolArguments) -> Result<ResponseEnvelope> {
        self.ensure_initialized().await?;
        let params = json!({ "name": name, "arguments": arguments });
        self.request("tools/call", Some(params)).await
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.is_some()
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.initialized.as_ref().map(|init| &init.server_info)
    }

    /// Protocol version the server agreed to.
    pub fn protocol_version(&self) -> Option<&str> {
        self.initialized
            .as_ref()
            .map(|init| init.protocol_version.as_str())
    }

    async fn ensure_initialized(&mut self) -> Result<()> {
        if self.initialized.is_none() {
            self.initialize().await?;
        }
        Ok(())
    }

    async fn request<R: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<R> {
        let response = self
            .transport
            .send(JsonRpcRequest::new(method, params))
            .await?;

        if let Some(error) = response.error {
            return Err(WeatherError::Mcp(format!(
                "{method} failed: {} ({})",
                error.message, error.code
            )));
        }

        serde_json::from_value(response.result.unwrap_or_else(|| json!({})))
            .map_err(|e| WeatherError::Mcp(format!("failed to parse {method} result: {e}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote tools
// ─────────────────────────────────────────────────────────────────────────────

/// Mounts the tools of a remote MCP server into a local [`ToolRegistry`].
pub struct McpTools<T: McpTransport + 'static> {
    client: Arc<Mutex<McpClient<T>>>,
    tool_prefix: Option<String>,
}

impl<T: McpTransport + 'static> McpTools<T> {
    pub fn new(client: McpClient<T>) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
            tool_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tool_prefix = Some(prefix.into());
        self
    }

    /// Registers every remote tool whose schema can be understood and returns
    /// how many were added.
    pub async fn register_tools(&self, registry: &mut ToolRegistry) -> Result<usize> {
        let definitions = self.client.lock().await.list_tools().await?;

        let mut count = 0;
        for definition in definitions {
            let mut descriptor = match definition.to_descriptor() {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    warn!(tool = %definition.name, error = %err, "skipping remote tool");
                    continue;
                }
            };
            if let Some(prefix) = &self.tool_prefix {
                descriptor.name = format!("{prefix}_{}", definition.name);
            }

            registry.register(RemoteTool {
                descriptor,
                remote_name: definition.name,
                client: Arc::clone(&self.client),
            });
            count += 1;
        }

        Ok(count)
    }

    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.client.lock().await.server_info().cloned()
    }

    pub async fn close(&self) -> Result<()> {
        self.client.lock().await.close().await
    }
}

/// A tool living on the MCP server, called through the shared client.
struct RemoteTool<T: McpTransport + 'static> {
    descriptor: ToolDescriptor,
    remote_name: String,
    client: Arc<Mutex<McpClient<T>>>,
}

#[async_trait]
impl<T: McpTransport + 'static> Tool for RemoteTool<T> {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: ToolArguments) -> Result<ToolResult> {
        let response = self
            .client
            .lock()
            .await
            .call_tool(&self.remote_name, arguments)
            .await?;

        let text = response.joined_text();
        if response.is_error {
            Ok(ToolResult::error(text))
        } else {
            Ok(ToolResult::success(text))
        }
    }
}
