//! JSON-RPC tool calls over a [`Transport`].
//!
//! Every call holds the call gate for its full write-then-read exchange, so
//! concurrent callers never interleave bytes on the wire and each response is
//! read by the caller that sent the matching request.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::Mutex;

use super::session::{ProcessSession, SessionState};
use super::{frame, McpError, JSONRPC_VERSION, TOOLS_CALL_METHOD};
use crate::config::ServerConfig;

/// The two byte streams a JSON-RPC conversation runs over
pub trait Transport: Send {
    type Writer: AsyncWrite + Unpin + Send;
    type Reader: AsyncBufRead + Unpin + Send;

    /// Borrow both ends of an active channel
    fn channel(&mut self) -> Result<(&mut Self::Writer, &mut Self::Reader), McpError>;

    /// Record that the wire is in an unknown state after a protocol failure
    fn mark_broken(&mut self) {}
}

/// Anything able to invoke a named tool with JSON arguments
#[async_trait]
pub trait ToolCaller: Send + Sync {
    async fn call_tool(&self, name: &str, arguments: Map<String, Value>)
        -> Result<Value, McpError>;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: ToolCallParams<'a>,
    id: u64,
}

#[derive(Serialize)]
struct ToolCallParams<'a> {
    name: &'a str,
    arguments: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
}

struct Gate<T> {
    transport: T,
    next_id: u64,
}

/// Correlates tool calls and responses on one transport.
///
/// Request ids start at 1 and increase by one per call for the lifetime of
/// the client.
pub struct RpcClient<T> {
    gate: Mutex<Gate<T>>,
}

/// Client bound to a tool server child process
pub type McpClient = RpcClient<ProcessSession>;

impl<T: Transport> RpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            gate: Mutex::new(Gate {
                transport,
                next_id: 1,
            }),
        }
    }

    /// Invoke a tool and return the `result` member of its response
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, McpError> {
        let mut guard = self.gate.lock().await;
        let gate = &mut *guard;

        let (writer, reader) = gate.transport.channel()?;
        let id = gate.next_id;
        gate.next_id += 1;

        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            method: TOOLS_CALL_METHOD,
            params: ToolCallParams {
                name,
                arguments: &arguments,
            },
            id,
        };
        tracing::debug!("Calling MCP tool '{}' (id {})", name, id);

        match exchange(writer, reader, &request).await {
            Err(e) if e.is_protocol_failure() => {
                tracing::error!("MCP protocol failure during '{}': {}", name, e);
                gate.transport.mark_broken();
                Err(e)
            }
            other => other,
        }
    }
}

async fn exchange<W, R>(
    writer: &mut W,
    reader: &mut R,
    request: &RpcRequest<'_>,
) -> Result<Value, McpError>
where
    W: AsyncWrite + Unpin + ?Sized,
    R: AsyncBufRead + Unpin + ?Sized,
{
    let payload = serde_json::to_value(request)?;
    frame::write_frame(writer, &payload).await?;

    let response = loop {
        let message = frame::read_frame(reader).await?;
        if let Some(method) = message.get("method") {
            tracing::debug!("Skipping server-initiated message: {}", method);
            continue;
        }
        break serde_json::from_value::<RpcResponse>(message)
            .map_err(|e| McpError::Protocol(format!("invalid response envelope: {}", e)))?;
    };

    if let Some(id) = response.id.as_u64() {
        if id != request.id {
            return Err(McpError::Protocol(format!(
                "response id {} does not match request id {}",
                id, request.id
            )));
        }
    }

    if let Some(error) = response.error {
        return Err(McpError::Tool {
            tool: request.params.name.to_string(),
            code: error.code,
            message: error.message.unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    Ok(response.result)
}

#[async_trait]
impl<T: Transport + 'static> ToolCaller for RpcClient<T> {
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, McpError> {
        RpcClient::call_tool(self, name, arguments).await
    }
}

impl RpcClient<ProcessSession> {
    pub fn from_config(config: ServerConfig) -> Self {
        Self::new(ProcessSession::new(config))
    }

    pub async fn start(&self) -> Result<(), McpError> {
        self.gate.lock().await.transport.start().await
    }

    pub async fn stop(&self) {
        self.gate.lock().await.transport.stop().await
    }

    pub async fn state(&self) -> SessionState {
        self.gate.lock().await.transport.state()
    }

    pub async fn pid(&self) -> Option<u32> {
        self.gate.lock().await.transport.pid()
    }

    /// Run `work` between `start` and `stop`.
    ///
    /// The server is stopped whether `work` succeeds or fails. If the
    /// returned future is dropped midway, the child is killed.
    pub async fn scoped<Fut, R, E>(&self, work: Fut) -> Result<R, E>
    where
        Fut: Future<Output = Result<R, E>>,
        E: From<McpError>,
    {
        let guard = KillOnDrop {
            client: self,
            armed: true,
        };

        let result = match self.start().await {
            Ok(()) => work.await,
            Err(e) => Err(E::from(e)),
        };
        self.stop().await;

        guard.disarm();
        result
    }
}

struct KillOnDrop<'a> {
    client: &'a McpClient,
    armed: bool,
}

impl KillOnDrop<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for KillOnDrop<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.client.gate.try_lock() {
            Ok(mut gate) => gate.transport.kill_now(),
            Err(_) => tracing::warn!("MCP session busy while cancelled; child is killed on drop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
    use tokio::task::JoinHandle;

    /// Writer that keeps a copy of every byte sent
    struct RecordingWriter {
        inner: DuplexStream,
        log: Arc<StdMutex<Vec<u8>>>,
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
            if let Poll::Ready(Ok(n)) = &poll {
                self.log.lock().unwrap().extend_from_slice(&buf[..*n]);
            }
            poll
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    struct DuplexTransport {
        writer: RecordingWriter,
        reader: BufReader<DuplexStream>,
        broken: bool,
    }

    impl Transport for DuplexTransport {
        type Writer = RecordingWriter;
        type Reader = BufReader<DuplexStream>;

        fn channel(&mut self) -> Result<(&mut RecordingWriter, &mut BufReader<DuplexStream>), McpError> {
            if self.broken {
                return Err(McpError::Broken);
            }
            Ok((&mut self.writer, &mut self.reader))
        }

        fn mark_broken(&mut self) {
            self.broken = true;
        }
    }

    /// Fake tool server. Behaviour depends on the tool name.
    async fn serve(mut reader: BufReader<DuplexStream>, mut writer: DuplexStream) -> Vec<u64> {
        let mut seen = Vec::new();
        while let Ok(request) = frame::read_frame(&mut reader).await {
            let id = request["id"].as_u64().unwrap();
            seen.push(id);
            let tool = request["params"]["name"].as_str().unwrap_or_default().to_string();
            let ok = json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"tool": tool, "echo": request["params"]["arguments"].clone()}
            });
            tokio::time::sleep(Duration::from_millis(2)).await;

            match tool.as_str() {
                "explode" => {
                    let reply = json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32602, "message": "unknown paper"}
                    });
                    frame::write_frame(&mut writer, &reply).await.unwrap();
                }
                "raw" => {
                    let line = format!("{}\n", ok);
                    writer.write_all(line.as_bytes()).await.unwrap();
                }
                "chatty" => {
                    let note = json!({
                        "jsonrpc": "2.0",
                        "method": "notifications/message",
                        "params": {"level": "info", "data": "downloading"}
                    });
                    frame::write_frame(&mut writer, &note).await.unwrap();
                    frame::write_frame(&mut writer, &ok).await.unwrap();
                }
                "confused" => {
                    let reply = json!({"jsonrpc": "2.0", "id": id + 100, "result": {}});
                    frame::write_frame(&mut writer, &reply).await.unwrap();
                }
                "oversized" => {
                    writer
                        .write_all(b"Content-Length: 18446744073709551615\r\n\r\n{}")
                        .await
                        .unwrap();
                }
                "hangup" => break,
                _ => frame::write_frame(&mut writer, &ok).await.unwrap(),
            }
        }
        seen
    }

    fn connect() -> (
        RpcClient<DuplexTransport>,
        Arc<StdMutex<Vec<u8>>>,
        JoinHandle<Vec<u64>>,
    ) {
        let (client_out, server_in) = tokio::io::duplex(64 * 1024);
        let (server_out, client_in) = tokio::io::duplex(64 * 1024);
        let log = Arc::new(StdMutex::new(Vec::new()));

        let server = tokio::spawn(serve(BufReader::new(server_in), server_out));
        let transport = DuplexTransport {
            writer: RecordingWriter {
                inner: client_out,
                log: Arc::clone(&log),
            },
            reader: BufReader::new(client_in),
            broken: false,
        };
        (RpcClient::new(transport), log, server)
    }

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_ids_increase_from_one() {
        let (client, _log, server) = connect();

        for n in 0..5 {
            let result = client
                .call_tool("search_papers", args(&[("n", json!(n))]))
                .await
                .unwrap();
            assert_eq!(result["tool"], "search_papers");
            assert_eq!(result["echo"]["n"], n);
        }

        drop(client);
        assert_eq!(server.await.unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_concurrent_calls_do_not_interleave() {
        let (client, log, server) = connect();
        let client = Arc::new(client);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let client = Arc::clone(&client);
                tokio::spawn(async move {
                    let name = format!("tool-{}", i);
                    let result = client
                        .call_tool(&name, args(&[("i", json!(i))]))
                        .await
                        .unwrap();
                    (name, result)
                })
            })
            .collect();

        for handle in handles {
            let (name, result) = handle.await.unwrap();
            assert_eq!(result["tool"], name.as_str());
        }

        drop(client);
        let seen: BTreeSet<u64> = server.await.unwrap().into_iter().collect();
        assert_eq!(seen, (1..=8).collect::<BTreeSet<u64>>());

        // every byte written parses back as whole frames in sequence
        let bytes = log.lock().unwrap().clone();
        let mut reader = BufReader::new(bytes.as_slice());
        let mut ids = BTreeSet::new();
        for _ in 0..8 {
            let request = frame::read_frame(&mut reader).await.unwrap();
            assert_eq!(request["jsonrpc"], "2.0");
            assert_eq!(request["method"], "tools/call");
            ids.insert(request["id"].as_u64().unwrap());
        }
        assert_eq!(ids, (1..=8).collect::<BTreeSet<u64>>());
        assert!(matches!(
            frame::read_frame(&mut reader).await,
            Err(McpError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_tool_error_keeps_session_usable() {
        let (client, _log, server) = connect();

        let err = client.call_tool("explode", Map::new()).await.unwrap_err();
        match err {
            McpError::Tool {
                tool,
                code,
                message,
            } => {
                assert_eq!(tool, "explode");
                assert_eq!(code, -32602);
                assert_eq!(message, "unknown paper");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let result = client.call_tool("list_papers", Map::new()).await.unwrap();
        assert_eq!(result["tool"], "list_papers");

        // the failed call still used up id 1
        drop(client);
        assert_eq!(server.await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_oversized_frame_breaks_session() {
        let (client, _log, _server) = connect();

        let err = client.call_tool("oversized", Map::new()).await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)), "got {err:?}");

        let err = client.call_tool("list_papers", Map::new()).await.unwrap_err();
        assert!(matches!(err, McpError::Broken), "got {err:?}");
    }

    #[tokio::test]
    async fn test_headerless_response_accepted() {
        let (client, _log, _server) = connect();
        let result = client.call_tool("raw", Map::new()).await.unwrap();
        assert_eq!(result["tool"], "raw");
    }

    #[tokio::test]
    async fn test_notifications_are_skipped() {
        let (client, _log, _server) = connect();
        let result = client.call_tool("chatty", Map::new()).await.unwrap();
        assert_eq!(result["tool"], "chatty");

        let result = client.call_tool("after", Map::new()).await.unwrap();
        assert_eq!(result["tool"], "after");
    }

    #[tokio::test]
    async fn test_hangup_breaks_session() {
        let (client, _log, _server) = connect();

        let err = client.call_tool("hangup", Map::new()).await.unwrap_err();
        assert!(matches!(err, McpError::ConnectionClosed));

        let err = client.call_tool("search_papers", Map::new()).await.unwrap_err();
        assert!(matches!(err, McpError::Broken));
    }

    #[tokio::test]
    async fn test_mismatched_id_is_protocol_failure() {
        let (client, _log, _server) = connect();

        let err = client.call_tool("confused", Map::new()).await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(ref m) if m.contains("does not match")));
        assert!(matches!(
            client.call_tool("search_papers", Map::new()).await,
            Err(McpError::Broken)
        ));
    }

    #[tokio::test]
    async fn test_call_before_start_is_rejected() {
        let client = McpClient::from_config(ServerConfig::new("cat"));
        assert_eq!(client.state().await, SessionState::Stopped);

        let err = client.call_tool("search_papers", Map::new()).await.unwrap_err();
        assert!(matches!(err, McpError::NotActive));
        assert_eq!(client.pid().await, None);
    }
}
