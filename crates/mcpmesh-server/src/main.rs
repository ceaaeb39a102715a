//! Entry point: wires discovery, the bridge supervisor, the MCP
//! multiplexer, and the HTTP surface together, then serves either a TCP
//! listener or (`--stdio`/`STDIO_MODE`) an MCP stdio loop.

mod cli;
mod http;
mod mcp_stdio;
mod state;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context as _;
use clap::Parser as _;

use mcpmesh_bridge::{
    click_adapter, resolve_manifest_path, BridgeManifest, BridgeSupervisor, SchemaAdapterTable,
};
use mcpmesh_core::config::DEFAULT_BRIDGE_MANIFEST_NAME;
use mcpmesh_core::middleware::MiddlewareStack;
use mcpmesh_core::spec::ServerInfo;
use mcpmesh_discovery::{DiscoveryEngine, DylibHandlerLoader, HotReloadWatcher, RouteRegistry};
use mcpmesh_mcp::{CacheManager, CacheWatcher, Multiplexer};

use cli::Cli;
use state::AppState;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(code) = run(config).await {
        std::process::exit(code);
    }
}

async fn run(config: mcpmesh_core::config::Config) -> Result<(), i32> {
    let config = Arc::new(config);

    let loader = Arc::new(DylibHandlerLoader::new());
    let engine = Arc::new(DiscoveryEngine::new(config.api_path.clone(), loader.clone()));
    let registry = Arc::new(RouteRegistry::new());
    let middleware: Arc<MiddlewareStack> = Arc::new(MiddlewareStack::new());
    let middleware_sink: Arc<dyn mcpmesh_core::middleware::MiddlewareSink> = middleware.clone();

    let initial = engine
        .full_scan(middleware_sink.as_ref())
        .map_err(|e| {
            tracing::error!(error = %e, "initial discovery scan failed");
            1
        })?
        .build();
    tracing::info!(
        routes = initial.len(),
        errors = initial.errors().len(),
        "discovery complete"
    );
    registry.publish(initial);

    let _discovery_watcher = HotReloadWatcher::spawn(
        config.api_path.clone(),
        engine.clone(),
        registry.clone(),
        middleware_sink.clone(),
        mcpmesh_discovery::DEFAULT_DEBOUNCE,
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "could not start discovery hot-reload watcher");
        0
    })
    .ok();

    let bridges = Arc::new(BridgeSupervisor::new());
    let cwd = std::env::current_dir().unwrap_or_else(|_| ".".into());
    if let Some(manifest_path) =
        resolve_manifest_path(&config.bridge_config_path, &cwd, DEFAULT_BRIDGE_MANIFEST_NAME)
    {
        match load_bridge_manifest(&manifest_path) {
            Ok(manifest) => {
                let outcomes = bridges.ensure_all(&manifest).await;
                for outcome in &outcomes {
                    log_bridge_outcome(outcome);
                }
            }
            Err(e) => tracing::warn!(
                path = %manifest_path.display(),
                error = format!("{e:#}"),
                "failed to read or parse bridge manifest; continuing without bridges"
            ),
        }
    } else {
        tracing::info!("no bridge manifest resolved; bridging disabled");
    }

    let cache = CacheManager::new(config.mcp_base_path.join("prompts"), config.mcp_base_path.join("resources"));
    let _cache_watcher = CacheWatcher::spawn(cache.clone()).ok();

    let server_info = ServerInfo {
        name: "mcpmesh".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let mut adapters = SchemaAdapterTable::new();
    adapters.register("click", click_adapter);

    let mux = Arc::new(Multiplexer::new(
        registry.clone(),
        bridges.clone(),
        adapters,
        cache,
        None,
        server_info,
    ));

    let reload_engine = engine.clone();
    let reload_registry = registry.clone();
    let reload_sink = middleware_sink.clone();
    let reload: Arc<state::ReloadFn> = Arc::new(move |files| {
        let previous = reload_registry.snapshot();
        let builder = reload_engine.rescan_files(&previous, &files, reload_sink.as_ref());
        reload_registry.publish(builder.build());
    });

    let app_state = AppState {
        config: config.clone(),
        registry: registry.clone(),
        middleware,
        bridges: bridges.clone(),
        mux: mux.clone(),
        reload,
        started_at: Instant::now(),
        discovery_root: config.api_path.clone(),
    };

    if config.stdio_mode {
        tracing::info!("serving MCP over stdio");
        if let Err(e) = mcp_stdio::serve(&mux).await {
            tracing::error!(error = %e, "stdio MCP loop ended with an error");
        }
        bridges.stop_all();
        return Ok(());
    }

    let router = http::router(app_state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::timeout::TimeoutLayer::new(Duration::from_secs(30)));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind HTTP listener");
            return Err(1);
        }
    };
    tracing::info!(addr = %addr, "listening");

    let shutdown_bridges = bridges.clone();
    let serve_result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    shutdown_bridges.stop_all();

    if let Err(e) = serve_result {
        tracing::error!(error = %e, "HTTP server exited with an error");
        return Err(1);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

/// Read and parse a bridge manifest, attaching the path to any failure so
/// the caller's log line carries a full cause chain instead of a bare
/// `ToString`.
fn load_bridge_manifest(path: &Path) -> anyhow::Result<BridgeManifest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading bridge manifest at {}", path.display()))?;
    mcpmesh_bridge::parse_manifest(&contents)
        .with_context(|| format!("parsing bridge manifest at {}", path.display()))
}

fn log_bridge_outcome(outcome: &mcpmesh_bridge::EnsureOutcome) {
    use mcpmesh_bridge::EnsureOutcome::*;
    match outcome {
        Coalesced { identifier } => tracing::debug!(%identifier, "bridge coalesced"),
        Started { identifier } => tracing::info!(%identifier, "bridge started"),
        Circular { chain } => tracing::warn!(%chain, "circular bridge reference refused"),
        Failed { identifier, reason } => {
            tracing::warn!(%identifier, %reason, "bridge failed to start")
        }
    }
}
