//! Gateway HTTP server: shared state, router, and graceful shutdown.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use super::{admin, browse, routes};
use crate::auth::{
    AccessGate, GithubClient, PermissionLookup, PermissionResolver, SessionDecoder, TtlCache,
};
use crate::cgi::CgiBridge;
use crate::config::{self, Config};
use crate::exec::{ProcessRunner, SystemRunner};
use crate::init;
use crate::taxonomy::{Lifecycle, TaxonomyVolume};

/// Shared state for the gateway (lifecycle, bridge, access gate, secrets).
#[derive(Clone)]
pub struct GatewayState {
    /// Port reported by the health check.
    pub port: u16,
    pub lifecycle: Lifecycle,
    pub bridge: CgiBridge,
    pub gate: AccessGate,
    pub sessions: SessionDecoder,
    /// When None, admin routes reject every call.
    pub admin_secret: Option<Arc<str>>,
    /// Tool binary relative to a taxonomy directory.
    pub tool_path: PathBuf,
    /// Public URL root handed to the tool as `RLTBL_ROOT` (taxonomy name appended).
    pub rltbl_root: Option<String>,
}

impl GatewayState {
    /// Build the state from config. The runner and permission lookup are injected so tests can
    /// substitute fakes; [`run_gateway`] passes [`SystemRunner`] and [`GithubClient`].
    pub fn new(
        config: &Config,
        volume: TaxonomyVolume,
        runner: Arc<dyn ProcessRunner>,
        lookup: Arc<dyn PermissionLookup>,
    ) -> Self {
        let taxonomies = &config.taxonomies;
        let cache = Arc::new(TtlCache::new(
            std::time::Duration::from_secs(config.auth.permission_cache_ttl_secs),
            config.auth.permission_cache_capacity,
        ));
        let resolver = PermissionResolver::new(lookup, cache);
        Self {
            port: config.gateway.port,
            lifecycle: Lifecycle::new(volume, runner.clone(), taxonomies.database_marker()),
            bridge: CgiBridge::new(runner, taxonomies.tool_timeout()),
            gate: AccessGate::new(resolver, taxonomies.no_access_policy),
            sessions: SessionDecoder::new(config::resolve_token_secret(config)),
            admin_secret: config::resolve_admin_secret(config).map(Arc::from),
            tool_path: taxonomies.tool_path(),
            rltbl_root: config::resolve_rltbl_root(config),
        }
    }
}

/// Routes under the URL prefix (empty prefix mounts them at the root).
pub fn router(state: GatewayState, url_prefix: &str) -> Router {
    let routes = Router::new()
        .route("/", get(health_http))
        .route(
            "/browser/:taxonomy",
            get(browse::browse_root).post(browse::browse_root),
        )
        .route(
            "/browser/:taxonomy/*path",
            get(browse::browse_path).post(browse::browse_path),
        )
        .route("/init_taxonomy/:taxonomy", get(routes::init_taxonomy))
        .route("/add_taxonomy", post(routes::add_taxonomy))
        .route(
            "/check_permissions/:org/:repo/:user",
            get(routes::check_permissions),
        )
        .route("/session_info/:repo_name", get(routes::session_info))
        .route("/api/taxonomies", get(routes::list_taxonomies))
        .route("/init_taxonomies", post(admin::init_taxonomies))
        .route("/reload_taxonomy", post(admin::reload_taxonomy))
        .route("/update_taxonomies", post(admin::update_taxonomies))
        .with_state(state);
    if url_prefix.is_empty() {
        routes
    } else {
        Router::new().nest(url_prefix, routes)
    }
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
/// Requires the taxonomies volume to exist (`tdt-api init` or TAXONOMIES_VOLUME).
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    let volume_dir = init::require_initialized(&config_path, &config)?;
    let volume = TaxonomyVolume::open(&volume_dir)?;
    if config::resolve_admin_secret(&config).is_none() {
        log::warn!("no admin secret configured (ADMIN_SECRET); admin routes will reject all calls");
    }
    if config::resolve_token_secret(&config).is_none() {
        log::warn!("no token secret configured (TOKEN_SECRET); every caller is anonymous");
    }
    let github = Arc::new(GithubClient::new(
        config.auth.github_api_url.clone(),
        config::resolve_github_token(&config),
    ));
    let state = GatewayState::new(&config, volume, Arc::new(SystemRunner), github);
    let url_prefix = config::resolve_url_prefix(&config);

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!(
        "gateway listening on {} (prefix {:?}, volume {})",
        bind_addr,
        url_prefix,
        volume_dir.display()
    );
    serve(listener, state, &url_prefix).await
}

/// Serve on an already bound listener until SIGINT/SIGTERM.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: GatewayState,
    url_prefix: &str,
) -> Result<()> {
    axum::serve(listener, router(state, url_prefix))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// In-flight requests drain; running tool subprocesses finish or hit their timeout.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON.
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
    }))
}
