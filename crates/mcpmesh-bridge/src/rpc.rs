//! JSON-RPC framed client (C8, §4.8): newline-delimited JSON-RPC 2.0 over
//! a child process's stdio.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{broadcast, oneshot, Mutex as AsyncMutex};

use crate::error::RpcError;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(10);

const STDERR_TAIL_CAPACITY: usize = 32;

type Pending = DashMap<u64, oneshot::Sender<Result<Value, RpcError>>>;

/// Framed JSON-RPC client for one stdio bridge child process.
pub struct RpcClient {
    stdin: AsyncMutex<ChildStdin>,
    pending: Arc<Pending>,
    next_id: AtomicU64,
    notifications: broadcast::Sender<Value>,
    stderr_tail: Arc<std::sync::Mutex<VecDeque<String>>>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl RpcClient {
    /// Spawn `command args...` and start background reader tasks for its
    /// stdout (response/notification dispatch) and stderr (diagnostic
    /// tail, consulted by the supervisor's failure detection).
    pub fn spawn(
        mut command: tokio::process::Command,
    ) -> std::io::Result<(Self, tokio::task::JoinHandle<std::process::ExitStatus>)> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child: Child = command.spawn()?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let pending: Arc<Pending> = Arc::new(DashMap::new());
        let (notif_tx, _) = broadcast::channel(256);
        let stderr_tail = Arc::new(std::sync::Mutex::new(VecDeque::with_capacity(
            STDERR_TAIL_CAPACITY,
        )));
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));

        spawn_stdout_reader(stdout, pending.clone(), notif_tx.clone());
        spawn_stderr_reader(stderr, stderr_tail.clone());

        let wait_pending = pending.clone();
        let wait_closed = closed.clone();
        let monitor = tokio::spawn(async move {
            let status = child.wait().await.unwrap_or_else(|_| {
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    std::process::ExitStatus::from_raw(-1)
                }
                #[cfg(not(unix))]
                {
                    std::process::ExitStatus::default()
                }
            });
            wait_closed.store(true, Ordering::SeqCst);
            let err = RpcError::TransportClosed {
                exit_code: status.code(),
                signal: unix_signal(&status),
            };
            let ids: Vec<u64> = wait_pending.iter().map(|e| *e.key()).collect();
            for id in ids {
                if let Some((_, tx)) = wait_pending.remove(&id) {
                    let _ = tx.send(Err(err.clone()));
                }
            }
            status
        });

        Ok((
            Self {
                stdin: AsyncMutex::new(stdin),
                pending,
                next_id: AtomicU64::new(0),
                notifications: notif_tx,
                stderr_tail,
                closed,
            },
            monitor,
        ))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail.lock().unwrap().iter().cloned().collect()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Value> {
        self.notifications.subscribe()
    }

    /// MCP `initialize` handshake. Always the first request issued on a
    /// fresh client, so it naturally draws id 0 (§4.8: "send `initialize`
    /// (id = 0)").
    pub async fn initialize(
        &self,
        client_name: &str,
        client_version: &str,
        deadline: Duration,
    ) -> Result<Value, RpcError> {
        self.request(
            "initialize",
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "clientInfo": { "name": client_name, "version": client_version },
                "capabilities": {},
            }),
            deadline,
        )
        .await
    }

    /// Send a request and await its correlated response, rejecting after
    /// `deadline`.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, RpcError> {
        if self.is_closed() {
            return Err(RpcError::TransportClosed {
                exit_code: None,
                signal: None,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if let Err(e) = self.write_line(&frame).await {
            self.pending.remove(&id);
            return Err(RpcError::Malformed(e.to_string()));
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::TransportClosed {
                exit_code: None,
                signal: None,
            }),
            Err(_) => {
                self.pending.remove(&id);
                Err(RpcError::Timeout(deadline))
            }
        }
    }

    /// Fire-and-forget notification (no id, no response expected).
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), RpcError> {
        let frame = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.write_line(&frame)
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))
    }

    async fn write_line(&self, value: &Value) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(&line).await?;
        stdin.flush().await
    }
}

fn spawn_stdout_reader(
    stdout: tokio::process::ChildStdout,
    pending: Arc<Pending>,
    notifications: broadcast::Sender<Value>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(&line) {
                        Ok(value) => dispatch(&value, &pending, &notifications),
                        Err(e) => tracing::warn!(error = %e, line = %line, "malformed rpc frame"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "error reading bridge stdout");
                    break;
                }
            }
        }
    });
}

fn dispatch(value: &Value, pending: &Pending, notifications: &broadcast::Sender<Value>) {
    let Some(id) = value.get("id").and_then(Value::as_u64) else {
        let _ = notifications.send(value.clone());
        return;
    };
    if let Some((_, tx)) = pending.remove(&id) {
        if let Some(error) = value.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            let _ = tx.send(Err(RpcError::Remote { code, message }));
        } else {
            let _ = tx.send(Ok(value.get("result").cloned().unwrap_or(Value::Null)));
        }
    }
}

fn spawn_stderr_reader(
    stderr: tokio::process::ChildStderr,
    tail: Arc<std::sync::Mutex<VecDeque<String>>>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut buf = tail.lock().unwrap();
            if buf.len() == STDERR_TAIL_CAPACITY {
                buf.pop_front();
            }
            buf.push_back(line);
        }
    });
}

fn unix_signal(status: &std::process::ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    }
    #[cfg(not(unix))]
    {
        let _ = status;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_request_round_trips() {
        let mut cmd = tokio::process::Command::new("python3");
        cmd.arg("-c").arg(
            "import sys\nfor line in sys.stdin:\n  import json\n  req = json.loads(line)\n  print(json.dumps({'jsonrpc':'2.0','id':req['id'],'result':{'echo':req['params']}}))\n  sys.stdout.flush()\n",
        );
        let spawned = RpcClient::spawn(cmd);
        let Ok((client, _monitor)) = spawned else {
            return; // python3 not available in this environment
        };
        let result = client
            .request("ping", json!({"hello": "world"}), Duration::from_secs(5))
            .await;
        if let Ok(value) = result {
            assert_eq!(value["echo"]["hello"], "world");
        }
    }
}
