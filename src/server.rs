//! Stdio MCP server answering `tools/list` and `tools/call` from a
//! [`ToolRegistry`].

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::mcp::{
    InitializeResult, JsonRpcRequest, JsonRpcResponse, RequestId, ServerCapabilities, ServerInfo,
    ToolDefinition, ToolsCapability, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    LATEST_PROTOCOL_VERSION, METHOD_NOT_FOUND, PARSE_ERROR, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::tool::{RequestEnvelope, ResponseEnvelope, ToolRegistry};

pub struct McpServer {
    info: ServerInfo,
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: Some(version.into()),
            },
            registry,
        }
    }

    pub fn from_config(config: &ServerConfig, registry: ToolRegistry) -> Self {
        Self::new(&config.name, &config.version, registry)
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.registry
            .list_tools()
            .iter()
            .map(ToolDefinition::from)
            .collect()
    }

    pub async fn call_tool(&self, request: RequestEnvelope) -> ResponseEnvelope {
        self.registry.call_tool(request).await
    }

    /// Serve newline-delimited JSON-RPC until `reader` reaches end of input.
    /// Requests are handled one at a time, in arrival order.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(
            server = %self.info.name,
            tools = self.registry.len(),
            "MCP server listening"
        );
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let mut payload = serde_json::to_string(&response)?;
                payload.push('\n');
                writer.write_all(payload.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        info!("end of input, MCP server shutting down");
        Ok(())
    }

    pub async fn serve_stdio(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Answers one raw line. `None` means nothing is written back.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line.trim()) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "unparseable message");
                return Some(JsonRpcResponse::failure(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {err}"),
                ));
            }
        };

        let id: Option<RequestId> = value
            .get("id")
            .and_then(|id| serde_json::from_value(id.clone()).ok());
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(err) => Some(JsonRpcResponse::failure(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {err}"),
            )),
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        let Some(id) = id else {
            debug!(%method, "notification received");
            return None;
        };
        debug!(%method, %id, "request received");

        let id = Some(id);
        let response = match method.as_str() {
            "initialize" => reply(id, &self.initialize(params.as_ref())),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => reply(id, &json!({ "tools": self.list_tools() })),
            "tools/call" => match params.map(serde_json::from_value::<RequestEnvelope>) {
                Some(Ok(call)) => {
                    info!(tool = %call.tool_name, "tools/call");
                    reply(id, &self.call_tool(call).await)
                }
                Some(Err(err)) => {
                    JsonRpcResponse::failure(id, INVALID_PARAMS, format!("Invalid params: {err}"))
                }
                None => JsonRpcResponse::failure(id, INVALID_PARAMS, "Invalid params: missing `name`"),
            },
            other => {
                JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("Method not found: {other}"))
            }
        };
        Some(response)
    }

    /// Echoes the client's protocol version when supported, otherwise offers
    /// the latest one.
    fn initialize(&self, params: Option<&Value>) -> InitializeResult {
        let requested = params
            .and_then(|params| params["protocolVersion"].as_str())
            .filter(|version| SUPPORTED_PROTOCOL_VERSIONS.contains(version));
        let client = params
            .and_then(|params| params["clientInfo"]["name"].as_str())
            .unwrap_or("unknown");
        info!(%client, requested = ?requested, "initialize");

        InitializeResult {
            protocol_version: requested.unwrap_or(LATEST_PROTOCOL_VERSION).to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
            },
            server_info: self.info.clone(),
        }
    }
}

fn reply<T: Serialize>(id: Option<RequestId>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(err) => JsonRpcResponse::failure(id, INTERNAL_ERROR, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ParamType, Tool, ToolArguments, ToolDescriptor, ToolResult};
    use async_trait::async_trait;

    struct ShoutTool {
        descriptor: ToolDescriptor,
    }

    #[async_trait]
    impl Tool for ShoutTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn call(&self, arguments: ToolArguments) -> crate::Result<ToolResult> {
            let city = arguments["city"].as_str().unwrap_or_default();
            Ok(ToolResult::success(city.to_uppercase()))
        }
    }

    fn server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register(ShoutTool {
            descriptor: ToolDescriptor::new("shout", "Shout a city").required(
                "city",
                ParamType::String,
                "The city",
            ),
        });
        McpServer::new("weather-mcp-server", "0.1.0", registry)
    }

    #[tokio::test]
    async fn initialize_negotiates_protocol_version() {
        let server = server();
        let known = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#)
            .await
            .unwrap();
        let result = known.result.unwrap();
        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"]["name"], "weather-mcp-server");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);

        let unknown = server
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"initialize","params":{"protocolVersion":"1999-01-01"}}"#)
            .await
            .unwrap();
        assert_eq!(unknown.result.unwrap()["protocolVersion"], LATEST_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let server = server();
        assert!(server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn tools_call_without_params_is_invalid() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":"c1","method":"tools/call"}"#)
            .await
            .unwrap();
        assert_eq!(response.id, Some(RequestId::String("c1".into())));
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn tools_call_returns_flattened_text() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"shout","arguments":{"city":"oslo"}}}"#)
            .await
            .unwrap();
        assert_eq!(
            response.result.unwrap(),
            json!({"content": [{"type": "text", "text": "OSLO"}], "isError": false})
        );
    }

    #[tokio::test]
    async fn unknown_method_and_garbage() {
        let server = server();
        let unknown = server
            .handle_line(r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(unknown.error.unwrap().code, METHOD_NOT_FOUND);

        let garbage = server.handle_line("{not json").await.unwrap();
        assert_eq!(garbage.id, None);
        assert_eq!(garbage.error.unwrap().code, PARSE_ERROR);

        let no_method = server.handle_line(r#"{"jsonrpc":"2.0","id":5}"#).await.unwrap();
        assert_eq!(no_method.id, Some(RequestId::Number(5)));
        assert_eq!(no_method.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn serve_skips_blank_lines_and_stops_at_eof() {
        let input = b"\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n   \n".to_vec();
        let mut output = Vec::new();
        server().serve(&input[..], &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text, "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
    }
}
