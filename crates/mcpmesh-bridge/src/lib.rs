//! External MCP bridge supervisor (C7), framed JSON-RPC stdio client
//! (C8), HTTP JSON-RPC client, and argument schema adapter (C9).

pub mod adapter;
pub mod error;
pub mod http_client;
pub mod identity;
pub mod manifest;
pub mod rpc;
pub mod supervisor;

pub use adapter::{click_adapter, AdapterFn, SchemaAdapterTable};
pub use error::{BridgeError, Result, RpcError};
pub use http_client::HttpRpcClient;
pub use identity::identifier;
pub use manifest::{parse_manifest, resolve_manifest_path, BridgeManifest, BridgeManifestEntry};
pub use rpc::RpcClient;
pub use supervisor::{Bridge, BridgeClient, BridgeState, BridgeSupervisor, EnsureOutcome};
