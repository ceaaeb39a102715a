//! MCP bridge supervisor (C7, §4.7): state machine managing external
//! bridge processes/connections, with dedup, circular-reference
//! detection, and sticky failure memoization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::Value;

use crate::error::RpcError;
use crate::identity::identifier;
use crate::manifest::{BridgeManifest, BridgeManifestEntry};
use crate::rpc::RpcClient;

use crate::http_client::HttpRpcClient;

/// Well-known launchers that are assumed present without a PATH check
/// (§4.7: "Well-known launchers (npx, node, npm) skip the existence
/// check").
const KNOWN_LAUNCHERS: &[&str] = &["npx", "node", "npm"];

const STARTUP_SOFT_DEADLINE: Duration = Duration::from_secs(1);
const STARTUP_HARD_DEADLINE: Duration = Duration::from_secs(10);

const BAD_STDERR_PATTERNS: &[&str] = &[
    "could not determine executable",
    "npm error",
    "command not found",
    "ENOENT",
];

/// Lifecycle state of one bridge. `absent` is represented by the
/// identifier's simple non-presence in the supervisor's map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeState {
    Starting,
    Ready,
    Failed(String),
    Stopped,
}

pub enum BridgeClient {
    Stdio {
        client: Arc<RpcClient>,
        monitor: tokio::task::JoinHandle<std::process::ExitStatus>,
    },
    Http(Arc<HttpRpcClient>),
}

impl BridgeClient {
    /// Forward one JSON-RPC request to whichever transport backs this
    /// bridge, so callers (the C10 multiplexer) don't need to match on
    /// the transport kind.
    pub async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, crate::error::RpcError> {
        match self {
            Self::Stdio { client, .. } => client.request(method, params, deadline).await,
            Self::Http(client) => client.request(method, params, deadline).await,
        }
    }
}

pub struct Bridge {
    pub name: String,
    pub identifier: String,
    pub state: RwLock<BridgeState>,
    pub client: BridgeClient,
    pub tools: RwLock<Option<Vec<mcpmesh_core::spec::ToolSpec>>>,
}

impl Bridge {
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), BridgeState::Ready)
    }
}

/// What happened when the supervisor tried to ensure one manifest entry
/// is live.
pub enum EnsureOutcome {
    Coalesced { identifier: String },
    Started { identifier: String },
    Circular { chain: String },
    Failed { identifier: String, reason: String },
}

#[derive(Default)]
pub struct BridgeSupervisor {
    bridges: DashMap<String, Arc<Bridge>>,
    loading_chain: Mutex<Vec<String>>,
    failed_this_epoch: DashMap<String, String>,
}

impl BridgeSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bridge(&self, identifier: &str) -> Option<Arc<Bridge>> {
        self.bridges.get(identifier).map(|e| e.clone())
    }

    pub fn ready_bridges(&self) -> Vec<Arc<Bridge>> {
        self.bridges
            .iter()
            .filter(|e| e.is_ready())
            .map(|e| e.clone())
            .collect()
    }

    /// Clear sticky failures and reset all tracked state — called when
    /// the manifest changes (§4.7: "A manifest change clears the failed
    /// set").
    pub fn reset_epoch(&self) {
        self.failed_this_epoch.clear();
    }

    /// Stop every live bridge, transitioning to `Stopped`. Pending RPCs
    /// are rejected by the transport's own termination handling once the
    /// process/connection actually closes.
    pub fn stop_all(&self) {
        for entry in self.bridges.iter() {
            *entry.state.write() = BridgeState::Stopped;
        }
        self.bridges.clear();
    }

    /// Ensure every non-disabled entry in `manifest` has a live bridge,
    /// applying dedup and circular-reference detection.
    pub async fn ensure_all(&self, manifest: &BridgeManifest) -> Vec<EnsureOutcome> {
        let mut outcomes = Vec::new();
        for (name, entry) in &manifest.mcp_servers {
            if entry.is_disabled() {
                continue;
            }
            outcomes.push(self.ensure_one(name, entry).await);
        }
        outcomes
    }

    async fn ensure_one(&self, name: &str, entry: &BridgeManifestEntry) -> EnsureOutcome {
        let id = identifier(entry);

        if let Some(existing) = self.bridges.get(&id) {
            if existing.is_ready() {
                tracing::debug!(bridge = name, identifier = %id, "coalescing duplicate bridge");
                return EnsureOutcome::Coalesced { identifier: id };
            }
        }

        if let Some(reason) = self.failed_this_epoch.get(&id) {
            return EnsureOutcome::Failed {
                identifier: id,
                reason: reason.clone(),
            };
        }

        {
            let mut chain = self.loading_chain.lock();
            if chain.contains(&id) {
                let chain_str = chain.join(" -> ");
                tracing::warn!(chain = %chain_str, "circular bridge reference refused");
                return EnsureOutcome::Circular { chain: chain_str };
            }
            chain.push(id.clone());
        }

        let result = self.launch(name, entry, &id).await;

        self.loading_chain.lock().retain(|x| x != &id);

        match result {
            Ok(()) => EnsureOutcome::Started { identifier: id },
            Err(reason) => {
                self.failed_this_epoch.insert(id.clone(), reason.clone());
                self.bridges.insert(
                    id.clone(),
                    Arc::new(Bridge {
                        name: name.to_string(),
                        identifier: id.clone(),
                        state: RwLock::new(BridgeState::Failed(reason.clone())),
                        client: BridgeClient::Http(Arc::new(HttpRpcClient::new(""))),
                        tools: RwLock::new(None),
                    }),
                );
                EnsureOutcome::Failed {
                    identifier: id,
                    reason,
                }
            }
        }
    }

    async fn launch(
        &self,
        name: &str,
        entry: &BridgeManifestEntry,
        id: &str,
    ) -> Result<(), String> {
        match entry {
            BridgeManifestEntry::Http { url, .. } => self.launch_http(name, url, id).await,
            BridgeManifestEntry::Stdio {
                command,
                args,
                cwd,
                env,
                ..
            } => self.launch_stdio(name, command, args, cwd.as_deref(), env, id).await,
        }
    }

    async fn launch_http(&self, name: &str, url: &str, id: &str) -> Result<(), String> {
        let client = Arc::new(HttpRpcClient::new(url));
        let bridge = Arc::new(Bridge {
            name: name.to_string(),
            identifier: id.to_string(),
            state: RwLock::new(BridgeState::Starting),
            client: BridgeClient::Http(client.clone()),
            tools: RwLock::new(None),
        });
        self.bridges.insert(id.to_string(), bridge.clone());

        match await_handshake(
            name,
            client.initialize("mcpmesh", env!("CARGO_PKG_VERSION"), STARTUP_HARD_DEADLINE),
        )
        .await
        {
            Ok(_) => {
                *bridge.state.write() = BridgeState::Ready;
                Ok(())
            }
            Err(e) => {
                let reason = format!("http bridge '{name}' handshake failed: {e}");
                *bridge.state.write() = BridgeState::Failed(reason.clone());
                Err(reason)
            }
        }
    }

    async fn launch_stdio(
        &self,
        name: &str,
        command: &str,
        args: &[String],
        cwd: Option<&str>,
        explicit_env: &HashMap<String, String>,
        id: &str,
    ) -> Result<(), String> {
        if !is_valid_command_name(command) {
            return Err(format!("bridge '{name}' command name is invalid: {command:?}"));
        }

        if !KNOWN_LAUNCHERS.contains(&command) && which::which(command).is_err() {
            return Err(format!(
                "bridge '{name}' command '{command}' not found in PATH; use the binary directly"
            ));
        }

        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in bridge_env(name, explicit_env) {
            cmd.env(k, v);
        }

        let (client, monitor) = RpcClient::spawn(cmd)
            .map_err(|e| format!("bridge '{name}' failed to spawn '{command}': {e}"))?;
        let client = Arc::new(client);

        let bridge = Arc::new(Bridge {
            name: name.to_string(),
            identifier: id.to_string(),
            state: RwLock::new(BridgeState::Starting),
            client: BridgeClient::Stdio {
                client: client.clone(),
                monitor,
            },
            tools: RwLock::new(None),
        });
        self.bridges.insert(id.to_string(), bridge.clone());

        match await_handshake(
            name,
            client.initialize("mcpmesh", env!("CARGO_PKG_VERSION"), STARTUP_HARD_DEADLINE),
        )
        .await
        {
            Ok(_) => {
                *bridge.state.write() = BridgeState::Ready;
                Ok(())
            }
            Err(e) => {
                let tail = client.stderr_tail();
                let hint = diagnose(&tail);
                let reason = match hint {
                    Some(hint) => format!("bridge '{name}' failed to start: {e} ({hint})"),
                    None => format!("bridge '{name}' failed to start: {e}"),
                };
                *bridge.state.write() = BridgeState::Failed(reason.clone());
                Err(reason)
            }
        }
    }
}

fn is_valid_command_name(command: &str) -> bool {
    let re = Regex::new(r"^[A-Za-z0-9_-]+$").expect("static pattern is valid");
    re.is_match(command)
}

fn diagnose(stderr_tail: &[String]) -> Option<&'static str> {
    let joined = stderr_tail.join("\n");
    BAD_STDERR_PATTERNS
        .iter()
        .find(|pattern| joined.contains(*pattern))
        .copied()
}

/// Translate `MCPMESH_BRIDGE.<name>.<KEY>` environment variables into the
/// bridge's child environment as `<KEY_UPPER>`, overridden by any
/// explicit `env` entries from the manifest (§4.7 environment mapping).
fn bridge_env(name: &str, explicit_env: &HashMap<String, String>) -> HashMap<String, String> {
    let prefix = format!("MCPMESH_BRIDGE.{}.", name.to_ascii_lowercase());
    let mut out = HashMap::new();
    for (key, value) in std::env::vars() {
        if let Some(suffix) = key.strip_prefix(&prefix) {
            out.insert(suffix.to_ascii_uppercase(), value);
        }
    }
    for (key, value) in explicit_env {
        out.insert(key.clone(), value.clone());
    }
    out
}

/// Await a handshake up to `STARTUP_HARD_DEADLINE`, warning once it runs
/// past `STARTUP_SOFT_DEADLINE` rather than cutting it off (§4.7:
/// "completes within the startup deadline (default 1 s soft, 10 s hard)").
async fn await_handshake(
    name: &str,
    init: impl std::future::Future<Output = Result<Value, RpcError>>,
) -> Result<Value, RpcError> {
    tokio::pin!(init);
    match tokio::time::timeout(STARTUP_SOFT_DEADLINE, &mut init).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                bridge = name,
                soft_deadline_secs = STARTUP_SOFT_DEADLINE.as_secs(),
                "bridge handshake exceeded soft deadline; still waiting up to the hard deadline"
            );
            init.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_name_validation() {
        assert!(is_valid_command_name("npx"));
        assert!(is_valid_command_name("my-server_v2"));
        assert!(!is_valid_command_name("rm -rf /"));
        assert!(!is_valid_command_name("./server.sh"));
    }

    #[test]
    fn bridge_env_prefix_maps_and_explicit_wins() {
        std::env::set_var("MCPMESH_BRIDGE.x.API_KEY", "from-env");
        let mut explicit = HashMap::new();
        explicit.insert("API_KEY".to_string(), "from-manifest".to_string());
        let mapped = bridge_env("x", &explicit);
        assert_eq!(mapped.get("API_KEY"), Some(&"from-manifest".to_string()));
        std::env::remove_var("MCPMESH_BRIDGE.x.API_KEY");
    }

    #[test]
    fn diagnose_matches_known_bad_patterns() {
        let tail = vec!["npm error could not resolve dependency".to_string()];
        assert_eq!(diagnose(&tail), Some("npm error"));
        assert_eq!(diagnose(&["all good".to_string()]), None);
    }

    #[tokio::test]
    async fn circular_reference_is_refused() {
        let supervisor = BridgeSupervisor::new();
        {
            let mut chain = supervisor.loading_chain.lock();
            chain.push("stdio:deadbeefdeadbeef".to_string());
        }
        let entry = BridgeManifestEntry::Stdio {
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "mcp-x@1".to_string()],
            cwd: None,
            env: HashMap::new(),
            disabled: false,
        };
        // Force the same identifier by asserting the hash is deterministic
        // for this input, then simulate the chain already containing it.
        let id = identifier(&entry);
        supervisor.loading_chain.lock().push(id.clone());
        let outcome = supervisor.ensure_one("dup", &entry).await;
        assert!(matches!(outcome, EnsureOutcome::Circular { .. }));
    }
}
