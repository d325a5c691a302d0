//! Transport over a child process's stdin/stdout.
//!
//! A writer task drains an unbounded channel into the child's stdin and a
//! reader task decodes Content-Length frames from its stdout. When stdout
//! ends the close listener learns that the server is gone.
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::mpsc;

use crate::error::LspError;
use crate::transport::{
    frame_message, parse_message, CloseListener, JsonRpcMessage, MessageListener, Transport,
};

type SharedListener = Arc<Mutex<Option<MessageListener>>>;
type SharedCloseSlot = Arc<Mutex<CloseSlot>>;

/// Close listener plus what happened before one was registered.
#[derive(Default)]
struct CloseSlot {
    listener: Option<CloseListener>,
    /// Set once stdout ended.
    gone: Option<String>,
    /// Set by [`Transport::close`]; the listener is never called after it.
    closed: bool,
}

/// A language server spawned as a child process speaking LSP over stdio.
pub struct StdioTransport {
    command: String,
    writer_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    listener: SharedListener,
    on_close: SharedCloseSlot,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Spawn `command` with `args` and start the reader and writer tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(command: &str, args: &[String]) -> Result<Self, LspError> {
        let mut child = TokioCommand::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LspError::SpawnFailed(format!("{command}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::SpawnFailed("could not capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::SpawnFailed("could not capture stdout".into()))?;

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(frame) = writer_rx.recv().await {
                if stdin.write_all(&frame).await.is_err() || stdin.flush().await.is_err() {
                    tracing::warn!("language server stdin closed");
                    break;
                }
            }
        });

        let listener: SharedListener = Arc::new(Mutex::new(None));
        let on_close: SharedCloseSlot = Arc::new(Mutex::new(CloseSlot::default()));
        tokio::spawn({
            let listener = listener.clone();
            let on_close = on_close.clone();
            async move {
                let reason = read_loop(stdout, listener).await;
                let notify = on_close.lock().ok().and_then(|mut slot| {
                    slot.gone = Some(reason.clone());
                    if slot.closed {
                        None
                    } else {
                        slot.listener.take()
                    }
                });
                if let Some(notify) = notify {
                    notify(reason);
                }
            }
        });

        tracing::info!(command, pid = ?child.id(), "spawned language server");
        Ok(Self {
            command: command.to_string(),
            writer_tx: Mutex::new(Some(writer_tx)),
            listener,
            on_close,
            child: Mutex::new(Some(child)),
        })
    }

    /// The command this transport was spawned with.
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Transport for StdioTransport {
    fn send(&self, message: &JsonRpcMessage) -> Result<(), LspError> {
        let body = message.to_json();
        tracing::debug!(target: "codepad_lsp::wire", "--> {body}");
        let guard = self
            .writer_tx
            .lock()
            .map_err(|_| LspError::Transport("writer lock poisoned".into()))?;
        let tx = guard
            .as_ref()
            .ok_or_else(|| LspError::Transport("transport closed".into()))?;
        tx.send(frame_message(&body))
            .map_err(|_| LspError::Transport("language server stdin closed".into()))
    }

    fn set_listener(&self, listener: MessageListener) {
        if let Ok(mut slot) = self.listener.lock() {
            *slot = Some(listener);
        }
    }

    fn set_close_listener(&self, listener: CloseListener) {
        let gone = {
            let Ok(mut slot) = self.on_close.lock() else {
                return;
            };
            if slot.closed {
                return;
            }
            match slot.gone.clone() {
                Some(reason) => Some(reason),
                None => {
                    slot.listener = Some(listener.clone());
                    None
                }
            }
        };
        if let Some(reason) = gone {
            listener(reason);
        }
    }

    fn close(&self) {
        if let Ok(mut slot) = self.on_close.lock() {
            slot.closed = true;
            slot.listener.take();
        }
        if let Ok(mut tx) = self.writer_tx.lock() {
            tx.take();
        }
        let child = self.child.lock().ok().and_then(|mut c| c.take());
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                tracing::debug!("language server already exited: {e}");
            }
        }
        tracing::info!(command = %self.command, "closed stdio transport");
    }
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("command", &self.command)
            .finish()
    }
}

/// Decode frames from `stdout` until EOF, handing each message to the
/// current listener. Returns why reading stopped.
async fn read_loop<R>(stdout: R, listener: SharedListener) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    loop {
        let length = match read_header(&mut reader).await {
            Ok(Some(length)) => length,
            Ok(None) => {
                tracing::info!("language server closed stdout");
                return "language server exited".to_string();
            }
            Err(e) => {
                tracing::warn!("reading from language server failed: {e}");
                return format!("reading from language server failed: {e}");
            }
        };

        let mut body = vec![0u8; length];
        if let Err(e) = reader.read_exact(&mut body).await {
            tracing::warn!("truncated message body: {e}");
            return format!("truncated message body: {e}");
        }
        let Ok(body) = String::from_utf8(body) else {
            tracing::warn!("dropping non UTF-8 message body");
            continue;
        };
        tracing::debug!(target: "codepad_lsp::wire", "<-- {body}");

        let message = match parse_message(&body) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("dropping malformed message: {e}");
                continue;
            }
        };

        let current = listener.lock().ok().and_then(|l| l.clone());
        match current {
            Some(deliver) => deliver(message),
            None => tracing::debug!("no listener registered, dropping message"),
        }
    }
}

/// Read header lines up to the blank separator. `Ok(None)` at EOF.
async fn read_header<R>(reader: &mut BufReader<R>) -> std::io::Result<Option<usize>>
where
    R: AsyncRead + Unpin,
{
    let mut content_length = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if content_length.is_some() {
                return Ok(content_length);
            }
            continue;
        }
        if let Some(value) = trimmed.strip_prefix("Content-Length:") {
            content_length = value.trim().parse().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting_listener() -> (SharedListener, Arc<Mutex<Vec<JsonRpcMessage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: MessageListener = Arc::new(move |m: JsonRpcMessage| sink.lock().unwrap().push(m));
        (Arc::new(Mutex::new(Some(listener))), seen)
    }

    #[tokio::test]
    async fn read_loop_decodes_consecutive_frames() {
        let (mut server, client) = tokio::io::duplex(1024);
        let (listener, seen) = collecting_listener();
        let reader = tokio::spawn(read_loop(client, listener));

        let mut bytes = frame_message(r#"{"jsonrpc":"2.0","id":1,"result":null}"#);
        bytes.extend(frame_message(
            r#"{"jsonrpc":"2.0","method":"window/logMessage","params":{"type":3,"message":"hi"}}"#,
        ));
        server.write_all(&bytes).await.unwrap();
        drop(server);
        assert_eq!(reader.await.unwrap(), "language server exited");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], JsonRpcMessage::Response { .. }));
        assert_eq!(seen[1].method(), Some("window/logMessage"));
    }

    #[tokio::test]
    async fn read_loop_skips_malformed_bodies() {
        let (mut server, client) = tokio::io::duplex(1024);
        let (listener, seen) = collecting_listener();
        let reader = tokio::spawn(read_loop(client, listener));

        let mut bytes = frame_message("{not json");
        bytes.extend(frame_message(r#"{"jsonrpc":"2.0","method":"ok"}"#));
        server.write_all(&bytes).await.unwrap();
        drop(server);
        reader.await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method(), Some("ok"));
    }

    #[tokio::test]
    async fn read_loop_reports_truncated_body() {
        let (mut server, client) = tokio::io::duplex(1024);
        let (listener, seen) = collecting_listener();
        let reader = tokio::spawn(read_loop(client, listener));

        server
            .write_all(b"Content-Length: 40\r\n\r\n{\"jsonrpc\"")
            .await
            .unwrap();
        drop(server);
        assert!(reader.await.unwrap().starts_with("truncated message body"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_header_accepts_extra_headers() {
        let input: &[u8] = b"Content-Type: application/vscode-jsonrpc\r\nContent-Length: 7\r\n\r\n";
        let mut reader = BufReader::new(input);
        assert_eq!(read_header(&mut reader).await.unwrap(), Some(7));
        assert_eq!(read_header(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn spawn_nonexistent_command_fails() {
        let err = StdioTransport::spawn("definitely-not-a-real-command-xyz", &[]).unwrap_err();
        match err {
            LspError::SpawnFailed(msg) => assert!(msg.contains("definitely-not-a-real-command-xyz")),
            other => panic!("expected SpawnFailed, got: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn send_after_close_fails() {
        let transport = StdioTransport::spawn("cat", &[]).unwrap();
        assert_eq!(transport.command(), "cat");
        transport
            .send(&JsonRpcMessage::notification("initialized", serde_json::json!({})))
            .unwrap();
        transport.close();
        let err = transport
            .send(&JsonRpcMessage::notification("exit", serde_json::Value::Null))
            .unwrap_err();
        assert!(matches!(err, LspError::Transport(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exiting_child_fires_close_listener() {
        let transport = StdioTransport::spawn("true", &[]).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.set_close_listener(Arc::new(move |reason: String| {
            let _ = tx.send(reason);
        }));
        let reason = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, "language server exited");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn late_close_listener_learns_of_earlier_exit() {
        let transport = StdioTransport::spawn("true", &[]).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.set_close_listener(Arc::new(move |reason: String| {
            let _ = tx.send(reason);
        }));
        let reason = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, "language server exited");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn close_does_not_fire_close_listener() {
        let transport = StdioTransport::spawn("cat", &[]).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.set_close_listener(Arc::new(move |reason: String| {
            let _ = tx.send(reason);
        }));
        transport.close();
        let fired = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv()).await;
        assert!(!matches!(fired, Ok(Some(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn echoing_child_round_trips_frames() {
        let transport = StdioTransport::spawn("cat", &[]).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.set_listener(Arc::new(move |m: JsonRpcMessage| {
            let _ = tx.send(m);
        }));
        let msg = JsonRpcMessage::request(5_i64, "textDocument/hover", serde_json::json!({}));
        transport.send(&msg).unwrap();
        let echoed = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, msg);
        transport.close();
    }
}
