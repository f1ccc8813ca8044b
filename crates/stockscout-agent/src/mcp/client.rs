// ABOUTME: MCP client speaking newline-delimited JSON-RPC 2.0 to a child process over stdio.
// ABOUTME: Spawns the server, performs the initialize handshake, and correlates responses by id.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};

use super::types::*;
use crate::config::ToolProviderConfig;

type PendingMap = HashMap<u64, oneshot::Sender<JsonRpcResponse>>;

/// Client for a single MCP server running as a child process.
pub struct McpClient {
    server: String,
    process: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    request_id: AtomicU64,
    pending: Arc<Mutex<PendingMap>>,
    /// Set by the reader task once the server's stdout closes.
    closed: Arc<AtomicBool>,
    server_info: Option<ImplementationInfo>,
}

impl McpClient {
    /// Spawn the server process and complete the initialize handshake.
    pub async fn connect(config: &ToolProviderConfig) -> Result<Self, McpError> {
        tracing::info!(
            server = %config.name,
            command = %config.command,
            args = ?config.args,
            "starting tool provider"
        );

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::Transport(format!("failed to spawn '{}': {}", config.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("failed to capture stdout".to_string()))?;

        let mut client = Self {
            server: config.name.clone(),
            process: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            request_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
            server_info: None,
        };
        client.spawn_reader(stdout);

        let params = InitializeParams {
            protocol_version: config.protocol_version.clone(),
            capabilities: json!({}),
            client_info: ImplementationInfo {
                name: "stockscout".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let result = client
            .send_request(
                "initialize",
                Some(serde_json::to_value(params)?),
                Some(config.handshake_timeout),
            )
            .await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("invalid initialize result: {}", e)))?;

        client.notify("notifications/initialized", None).await?;

        tracing::info!(
            server = %client.server,
            server_name = %init.server_info.name,
            server_version = %init.server_info.version,
            protocol = %init.protocol_version,
            "tool provider initialized"
        );
        client.server_info = Some(init.server_info);

        Ok(client)
    }

    pub fn server_info(&self) -> Option<&ImplementationInfo> {
        self.server_info.as_ref()
    }

    /// List every tool the server offers, following pagination cursors.
    pub async fn list_tools(&self, timeout: Option<Duration>) -> Result<Vec<McpTool>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = ListToolsParams { cursor };
            let result = self
                .send_request("tools/list", Some(serde_json::to_value(params)?), timeout)
                .await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| McpError::Protocol(format!("invalid tools/list result: {}", e)))?;

            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(server = %self.server, count = tools.len(), "listed tools");
        Ok(tools)
    }

    /// Invoke a tool. Waits as long as the server takes.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        tracing::debug!(server = %self.server, tool = %name, "calling tool");

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .send_request("tools/call", Some(serde_json::to_value(params)?), None)
            .await?;

        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("invalid tools/call result: {}", e)))
    }

    /// Close stdin and stop the server process.
    pub async fn shutdown(&self) {
        tracing::debug!(server = %self.server, "stopping tool provider");

        if let Some(mut stdin) = self.stdin.lock().await.take() {
            let _ = stdin.shutdown().await;
        }
        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }

    async fn write_line(&self, payload: &impl serde::Serialize) -> Result<(), McpError> {
        let mut line = serde_json::to_string(payload)?;
        line.push('\n');

        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| McpError::Transport("stdin not available".to_string()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notification = JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        };
        self.write_line(&notification).await
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, McpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(McpError::Closed);
            }
            pending.insert(id, tx);
        }

        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        };
        if let Err(e) = self.write_line(&request).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let response = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.lock().await.remove(&id);
                    tracing::warn!(server = %self.server, method = %method, "request timed out");
                    return Err(McpError::Timeout(method.to_string()));
                }
            },
            None => rx.await,
        }
        .map_err(|_| McpError::Closed)?;

        if let Some(error) = response.error {
            return Err(McpError::Server {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| McpError::Protocol(format!("missing result for '{}'", method)))
    }

    fn spawn_reader(&self, stdout: ChildStdout) {
        let pending = Arc::clone(&self.pending);
        let closed = Arc::clone(&self.closed);
        let server = self.server.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).split(b'\n');

            loop {
                let segment = match lines.next_segment().await {
                    Ok(Some(segment)) => segment,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(server = %server, error = %e, "failed to read tool provider output");
                        break;
                    }
                };
                let line = segment.trim_ascii();
                if line.is_empty() {
                    continue;
                }

                // Non-UTF-8 or non-JSON lines are noise, not the end of the stream.
                let value: Value = match serde_json::from_slice(line) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::debug!(server = %server, error = %e, "ignoring non-JSON output");
                        continue;
                    }
                };

                if let Some(method) = value.get("method").and_then(|m| m.as_str()) {
                    tracing::debug!(server = %server, method = %method, "ignoring server-initiated message");
                    continue;
                }

                match serde_json::from_value::<JsonRpcResponse>(value) {
                    Ok(response) => match response.id.as_u64() {
                        Some(id) => {
                            if let Some(tx) = pending.lock().await.remove(&id) {
                                let _ = tx.send(response);
                            } else {
                                tracing::warn!(server = %server, id, "response for unknown request");
                            }
                        }
                        None => {
                            tracing::warn!(server = %server, id = %response.id, "response with non-numeric id");
                        }
                    },
                    Err(e) => {
                        tracing::warn!(server = %server, error = %e, "failed to parse JSON-RPC response");
                    }
                }
            }

            closed.store(true, Ordering::SeqCst);
            // Dropping the senders wakes every waiter with Closed.
            pending.lock().await.clear();
            tracing::debug!(server = %server, "tool provider stdout closed");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config(command: &str, args: &[&str]) -> ToolProviderConfig {
        ToolProviderConfig {
            name: "test".to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
            protocol_version: "2024-11-05".to_string(),
            handshake_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn connect_fails_when_command_missing() {
        let result = McpClient::connect(&config("stockscout-no-such-binary", &[])).await;
        assert!(matches!(result, Err(McpError::Transport(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn connect_fails_when_server_exits() {
        let result = McpClient::connect(&config("sh", &["-c", "exit 0"])).await;
        assert!(result.is_err(), "handshake against an exiting process must fail");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn connect_times_out_on_silent_server() {
        let mut cfg = config("sh", &["-c", "sleep 5"]);
        cfg.handshake_timeout = Duration::from_millis(200);
        let result = McpClient::connect(&cfg).await;
        assert!(matches!(result, Err(McpError::Timeout(m)) if m == "initialize"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_output_is_skipped() {
        let script = r#"
read line
printf '\377\376 not utf-8\n'
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"1"}}}'
read line
read line
printf '\377 still not utf-8\n'
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"search_engine"}]}}'
read line
"#;
        let client = McpClient::connect(&config("sh", &["-c", script])).await.unwrap();
        let tools = client.list_tools(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "search_engine");
        client.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn connect_lists_and_calls_tools() {
        let script = r#"
read line
echo '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}'
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"fake","version":"9.9"}}}'
read line
read line
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"search_engine","inputSchema":{"type":"object"}}],"nextCursor":"p2"}}'
read line
echo '{"jsonrpc":"2.0","id":3,"result":{"tools":[{"name":"scrape_as_markdown","description":"Scrape a page"}]}}'
read line
echo '{"jsonrpc":"2.0","id":4,"result":{"content":[{"type":"text","text":"RELIANCE 2950"}]}}'
read line
"#;
        let client = McpClient::connect(&config("sh", &["-c", script])).await.unwrap();
        assert_eq!(client.server_info().map(|i| i.name.as_str()), Some("fake"));

        let tools = client.list_tools(Some(Duration::from_secs(5))).await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["search_engine", "scrape_as_markdown"]);

        let result = client
            .call_tool("search_engine", serde_json::json!({"query": "RELIANCE"}))
            .await
            .unwrap();
        assert!(matches!(&result.content[0], ToolContent::Text { text } if text == "RELIANCE 2950"));

        client.shutdown().await;
    }
}
