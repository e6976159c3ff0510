//! Line-oriented JSON IPC channel to the media player.
//!
//! Frames are UTF-8 JSON objects terminated by `\n`. The endpoint is a
//! named pipe on Windows and a filesystem socket elsewhere. Responses are
//! matched by `request_id`; unsolicited event frames are discarded.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::trace;

use crate::errors::PlayerError;

/// Process-wide request counter; uniqueness is all that matters.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

const CONNECT_POLL_STEP: Duration = Duration::from_millis(200);
const READ_CHUNK: usize = 4096;

#[cfg(unix)]
type Stream = tokio::net::UnixStream;
#[cfg(windows)]
type Stream = tokio::net::windows::named_pipe::NamedPipeClient;

/// An open channel plus its receive buffer.
#[derive(Debug)]
pub struct IpcChannel {
    stream: Stream,
    buffer: Vec<u8>,
}

impl IpcChannel {
    /// Poll the endpoint until it accepts a connection or `timeout`
    /// elapses. The player creates the endpoint asynchronously after
    /// spawn, so early attempts are expected to fail.
    pub async fn connect(path: &Path, timeout: Duration) -> Result<Self, PlayerError> {
        let deadline = Instant::now() + timeout;
        loop {
            match Self::connect_once(path).await {
                Ok(stream) => {
                    return Ok(Self {
                        stream,
                        buffer: Vec::new(),
                    });
                }
                Err(_) if Instant::now() < deadline => {
                    tokio::time::sleep(CONNECT_POLL_STEP).await;
                }
                Err(_) => {
                    return Err(PlayerError::IpcUnavailable {
                        path: path.to_path_buf(),
                    });
                }
            }
        }
    }

    #[cfg(unix)]
    async fn connect_once(path: &Path) -> std::io::Result<Stream> {
        tokio::net::UnixStream::connect(path).await
    }

    #[cfg(windows)]
    async fn connect_once(path: &Path) -> std::io::Result<Stream> {
        tokio::net::windows::named_pipe::ClientOptions::new().open(path)
    }

    /// Write one frame, newline-terminated.
    pub async fn send(&mut self, frame: &Value) -> Result<(), PlayerError> {
        let mut line = serde_json::to_vec(frame)
            .map_err(|e| PlayerError::protocol(format!("unencodable frame: {e}")))?;
        line.push(b'\n');
        self.stream.write_all(&line).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read frames until one carries `request_id`, or the deadline passes.
    ///
    /// Non-matching frames are player events and are dropped.
    pub async fn recv_response(
        &mut self,
        request_id: u64,
        timeout: Duration,
    ) -> Result<Value, PlayerError> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(line) = self.take_line() {
                match serde_json::from_slice::<Value>(&line) {
                    Ok(frame) => {
                        if frame.get("request_id").and_then(Value::as_u64) == Some(request_id) {
                            return Ok(frame);
                        }
                        trace!("Discarding player event frame");
                    }
                    Err(e) => {
                        return Err(PlayerError::protocol(format!("bad frame: {e}")));
                    }
                }
            }

            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or_else(|| PlayerError::protocol("response timeout"))?;
            let mut chunk = [0u8; READ_CHUNK];
            let read = tokio::time::timeout(remaining, self.stream.read(&mut chunk))
                .await
                .map_err(|_| PlayerError::protocol("response timeout"))??;
            if read == 0 {
                return Err(PlayerError::protocol("channel closed"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Pop one complete line from the receive buffer.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let newline = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
        line.pop();
        Some(line)
    }
}

/// Remove a leftover socket file from a previous run. Named pipes clean up
/// with their owning process, so this is a no-op on Windows.
pub async fn remove_stale_endpoint(path: &Path) {
    #[cfg(unix)]
    {
        let _ = tokio::fs::remove_file(path).await;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique_and_increasing() {
        let a = next_request_id();
        let b = next_request_id();
        assert!(b > a);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn responses_match_by_request_id() {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("player.sock");
        let listener = tokio::net::UnixListener::bind(&sock).unwrap();

        // Fake player: answers each command with an event frame first,
        // then the real response.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let frame: Value = serde_json::from_str(&line).unwrap();
                let Some(id) = frame.get("request_id").and_then(Value::as_u64) else {
                    continue;
                };
                write_half
                    .write_all(b"{\"event\":\"playback-restart\"}\n")
                    .await
                    .unwrap();
                let response =
                    serde_json::json!({"request_id": id, "error": "success", "data": true});
                let mut body = serde_json::to_vec(&response).unwrap();
                body.push(b'\n');
                write_half.write_all(&body).await.unwrap();
            }
        });

        let mut channel = IpcChannel::connect(&sock, Duration::from_secs(2))
            .await
            .unwrap();
        let id = next_request_id();
        channel
            .send(&serde_json::json!({
                "command": ["get_property", "idle-active"],
                "request_id": id,
            }))
            .await
            .unwrap();
        let response = channel
            .recv_response(id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response["error"], "success");
        assert_eq!(response["data"], true);

        server.abort();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn connect_times_out_without_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.sock");
        let result = IpcChannel::connect(&missing, Duration::from_millis(300)).await;
        assert!(matches!(result, Err(PlayerError::IpcUnavailable { .. })));
    }
}
