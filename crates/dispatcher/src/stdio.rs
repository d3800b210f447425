//! Child-process sessions speaking newline-delimited JSON-RPC 2.0.
//!
//! The handshake is `initialize` → `notifications/initialized` →
//! `tools/list` (following `nextCursor`), after which `tools/call` requests
//! are forwarded one at a time. The child's stderr is inherited so server
//! logs reach the operator's terminal.

use crate::schema::params_from_schema;
use async_trait::async_trait;
use cortex_core::error::TransportError;
use cortex_core::session::{SessionConfig, SessionConnector, ToolSession};
use cortex_core::tool::{ToolDescriptor, ToolResult};
use serde_json::{Value, json};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

const PROTOCOL_VERSION: &str = "2025-06-18";
const METHOD_NOT_FOUND: i64 = -32601;

/// Spawns `[[servers]]` entries as child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessConnector;

#[async_trait]
impl SessionConnector for ProcessConnector {
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn ToolSession>, TransportError> {
        Ok(Box::new(StdioSession::spawn(config)?))
    }
}

/// One tool server behind a pair of pipes.
pub struct StdioSession {
    id: String,
    child: Option<Child>,
    writer: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
    reader: Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>,
    next_id: u64,
}

impl StdioSession {
    pub fn spawn(config: &SessionConfig) -> Result<Self, TransportError> {
        let spawn_error = |reason: String| TransportError::Spawn {
            session: config.id.clone(),
            reason,
        };

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &config.cwd {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| spawn_error(format!("{}: {e}", config.command)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("failed to capture stdout".into()))?;

        debug!(session = %config.id, command = %config.command, "Spawned tool server");
        let mut session = Self::from_pipes(&config.id, stdout, stdin);
        session.child = Some(child);
        Ok(session)
    }

    /// Build a session over arbitrary pipes, e.g. an in-memory duplex.
    pub fn from_pipes<R, W>(id: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Self {
            id: id.into(),
            child: None,
            writer: BufWriter::new(writer),
            reader: BufReader::new(reader).lines(),
            next_id: 1,
        }
    }

    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(message).map_err(|e| TransportError::Protocol(e.to_string()))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<(), TransportError> {
        self.send(&json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await
    }

    /// Send a request and wait for its response. Server-initiated requests
    /// and notifications that arrive meanwhile are handled inline; responses
    /// to older ids (abandoned after a timeout) are dropped.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await?;

        loop {
            let Some(line) = self.reader.next_line().await? else {
                return Err(TransportError::Closed);
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let message: Value = match serde_json::from_str(trimmed) {
                Ok(value) => value,
                Err(_) => {
                    debug!(session = %self.id, line = trimmed, "Skipping non-JSON output");
                    continue;
                }
            };

            let method_name = message.get("method").and_then(Value::as_str).map(String::from);
            match (message.get("id"), method_name) {
                (Some(request_id), Some(method)) => {
                    let request_id = request_id.clone();
                    self.answer_server_request(request_id, &method).await?;
                }
                (None, Some(method)) => {
                    debug!(session = %self.id, method = %method, "Server notification");
                }
                (Some(response_id), None) => {
                    if response_id.as_u64() != Some(id) {
                        debug!(session = %self.id, stale = %response_id, "Dropping stale response");
                        continue;
                    }
                    if let Some(error) = message.get("error") {
                        return Err(TransportError::Rpc {
                            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                            message: error
                                .get("message")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown error")
                                .to_string(),
                        });
                    }
                    return Ok(message.get("result").cloned().unwrap_or(Value::Null));
                }
                (None, None) => {
                    warn!(session = %self.id, "Ignoring message without id or method");
                }
            }
        }
    }

    async fn answer_server_request(&mut self, id: Value, method: &str) -> Result<(), TransportError> {
        let reply = if method == "ping" {
            json!({"jsonrpc": "2.0", "id": id, "result": {}})
        } else {
            debug!(session = %self.id, method, "Rejecting server request");
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": METHOD_NOT_FOUND, "message": format!("method not supported: {method}")}
            })
        };
        self.send(&reply).await
    }
}

#[async_trait]
impl ToolSession for StdioSession {
    async fn initialize(&mut self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {}
        });
        let init = self.request("initialize", params).await?;
        if let Some(server) = init.get("serverInfo").and_then(|info| info.get("name")) {
            debug!(session = %self.id, server = %server, "Server identified");
        }
        self.notify("notifications/initialized", json!({})).await?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(cursor) => json!({"cursor": cursor}),
                None => json!({}),
            };
            let page = self.request("tools/list", params).await?;
            let entries = page
                .get("tools")
                .and_then(Value::as_array)
                .ok_or_else(|| TransportError::Protocol("tools/list result has no 'tools' array".into()))?;
            tools.extend(entries.iter().filter_map(descriptor_from_listing));

            cursor = page.get("nextCursor").and_then(Value::as_str).map(String::from);
            if cursor.is_none() {
                break;
            }
        }
        Ok(tools)
    }

    async fn call(&mut self, tool: &str, arguments: Value) -> Result<ToolResult, TransportError> {
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        match self
            .request("tools/call", json!({"name": tool, "arguments": arguments}))
            .await
        {
            Ok(result) => Ok(result_from_response(&result)),
            // The server answered; the tool failed, the channel did not
            Err(TransportError::Rpc { code, message }) => {
                Ok(ToolResult::error(format!("error {code}: {message}")))
            }
            Err(e) => Err(e),
        }
    }

    async fn close(&mut self) {
        let _ = self.writer.shutdown().await;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!(session = %self.id, error = %e, "Tool server already exited");
            }
        }
    }
}

fn descriptor_from_listing(entry: &Value) -> Option<ToolDescriptor> {
    let name = entry.get("name").and_then(Value::as_str)?;
    let usage = entry
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim();
    let mut descriptor = ToolDescriptor::new(name, usage);
    if let Some(schema) = entry.get("inputSchema") {
        descriptor.params = params_from_schema(schema);
    }
    Some(descriptor)
}

fn result_from_response(result: &Value) -> ToolResult {
    let text: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let payload = if !text.is_empty() {
        text.join("\n")
    } else if let Some(structured) = result.get("structuredContent") {
        structured.to_string()
    } else {
        String::new()
    };

    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        ToolResult::error(payload)
    } else {
        ToolResult::ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::tool::{ParamType, ToolStatus};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};

    /// A scripted server on the far end of an in-memory pipe. Each incoming
    /// request is answered by whatever `respond` returns, possibly nothing.
    fn fake_server<F>(respond: F) -> StdioSession
    where
        F: Fn(&Value) -> Vec<Value> + Send + 'static,
    {
        let (client_read, mut server_write): (DuplexStream, DuplexStream) = duplex(64 * 1024);
        let (server_read, client_write) = duplex(64 * 1024);

        tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(message) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                for reply in respond(&message) {
                    let mut out = reply.to_string();
                    out.push('\n');
                    if server_write.write_all(out.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        });

        StdioSession::from_pipes("fake", client_read, client_write)
    }

    fn reply(request: &Value, result: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": request["id"], "result": result})
    }

    fn gmail_server(request: &Value) -> Vec<Value> {
        match request["method"].as_str() {
            Some("initialize") => vec![reply(request, json!({"serverInfo": {"name": "gmail"}}))],
            Some("tools/list") if request["params"].get("cursor").is_none() => vec![reply(
                request,
                json!({
                    "tools": [{
                        "name": "send_email",
                        "description": "Send an email",
                        "inputSchema": {
                            "type": "object",
                            "properties": {"to": {"type": "string"}, "subject": {"type": "string"}},
                            "required": ["to"]
                        }
                    }],
                    "nextCursor": "page2"
                }),
            )],
            Some("tools/list") => vec![reply(
                request,
                json!({"tools": [{"name": "get_updates", "description": "Fetch unread mail"}]}),
            )],
            Some("tools/call") if request["params"]["name"] == "send_email" => vec![
                json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {}}),
                reply(request, json!({"content": [{"type": "text", "text": "sent"}]})),
            ],
            Some("tools/call") => vec![reply(
                request,
                json!({"content": [{"type": "text", "text": "mailbox locked"}], "isError": true}),
            )],
            _ => Vec::new(),
        }
    }

    #[tokio::test]
    async fn handshake_collects_all_pages() {
        let mut session = fake_server(gmail_server);
        let tools = session.initialize().await.unwrap();

        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "send_email");
        assert_eq!(tools[0].usage, "Send an email");
        assert_eq!(tools[0].params[0].kind, ParamType::String);
        assert!(tools[0].params[0].required);
        assert_eq!(tools[1].name, "get_updates");
        assert!(tools[1].params.is_empty());
    }

    #[tokio::test]
    async fn call_joins_text_and_skips_notifications() {
        let mut session = fake_server(gmail_server);
        session.initialize().await.unwrap();

        let result = session.call("send_email", json!({"to": "a@b.c"})).await.unwrap();
        assert_eq!(result.status, ToolStatus::Ok);
        assert_eq!(result.payload, "sent");
    }

    #[tokio::test]
    async fn is_error_maps_to_error_status() {
        let mut session = fake_server(gmail_server);
        session.initialize().await.unwrap();

        let result = session.call("get_updates", Value::Null).await.unwrap();
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(result.payload, "mailbox locked");
    }

    #[tokio::test]
    async fn rpc_error_on_call_is_a_tool_error() {
        let mut session = fake_server(|request| {
            vec![json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": {"code": -32602, "message": "bad params"}
            })]
        });
        let result = session.call("anything", json!({})).await.unwrap();
        assert!(!result.is_ok());
        assert!(result.payload.contains("bad params"));
    }

    #[tokio::test]
    async fn server_ping_is_answered() {
        let mut session = fake_server(|request| match request["method"].as_str() {
            Some("tools/call") => vec![
                json!({"jsonrpc": "2.0", "id": "srv-1", "method": "ping"}),
                reply(request, json!({"content": [{"type": "text", "text": "pong"}]})),
            ],
            _ => Vec::new(),
        });
        let result = session.call("echo", json!({})).await.unwrap();
        assert_eq!(result.payload, "pong");
    }

    #[tokio::test]
    async fn eof_is_a_closed_channel() {
        let (client_read, server_write) = duplex(1024);
        let (_server_read, client_write) = duplex(1024);
        drop(server_write);
        let mut session = StdioSession::from_pipes("gone", client_read, client_write);

        let err = session.call("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn spawning_a_missing_binary_fails() {
        let config = SessionConfig::new("ghost", "/nonexistent/cortex-tool-server");
        let err = ProcessConnector.connect(&config).await.err().unwrap();
        assert!(matches!(err, TransportError::Spawn { ref session, .. } if session == "ghost"));
    }

    #[test]
    fn structured_content_is_used_without_text() {
        let result = result_from_response(&json!({"structuredContent": {"sum": 8}}));
        assert_eq!(result.payload, r#"{"sum":8}"#);
    }
}
