//! # Relay Server
//!
//! Startup order:
//! 1. connect the response cache when caching is enabled
//! 2. seed the playlist allow-list from the CMS (fatal on failure)
//! 3. build the upstream relay and the router, plus `/metrics` when a
//!    Prometheus recorder is given
//! 4. serve until SIGINT or SIGTERM, letting in-flight requests finish

use super::routes::{build_router, metrics_router, AppState};
use crate::allowlist::{AllowListValidator, CmsClient, PlaylistSource};
use crate::caching::{CacheLayerState, CacheProvider};
use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::relay::{VideoRelay, YouTubeRelay};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, instrument};

/// The relay HTTP server
pub struct RelayServer {
    app: Router,
    bind_addr: SocketAddr,
}

impl RelayServer {
    /// Build every component from configuration
    #[instrument(skip(config, metrics), fields(app_name = %config.app_name))]
    pub async fn new(config: &GatewayConfig, metrics: Option<PrometheusHandle>) -> GatewayResult<Self> {
        let cache = if config.cache.enabled {
            let redis = config
                .redis
                .as_ref()
                .ok_or_else(|| GatewayError::config("cache is enabled but there is no redis configuration"))?;
            let topology = redis.topology()?;
            let provider = CacheProvider::connect(&topology).await?;
            info!(backend = provider.backend_name(), "response cache ready");
            Some(Arc::new(provider))
        } else {
            info!("response cache disabled");
            None
        };

        let source: Arc<dyn PlaylistSource> = Arc::new(CmsClient::new(config.cms_url.clone()));
        let allowlist = AllowListValidator::seeded(
            config.whitelists.channel_ids.clone(),
            config.whitelists.playlist_ids.clone(),
            source,
            config.refresh_cooldown,
        )
        .await
        .map_err(|e| GatewayError::AllowList {
            message: format!("failed to seed playlist allow-list: {}", e),
        })?;

        let relay: Arc<dyn VideoRelay> = Arc::new(YouTubeRelay::new(config.api_key.clone()));

        Self::from_parts(config, cache, Arc::new(allowlist), relay, metrics)
    }

    /// Assemble a server from already built components
    pub fn from_parts(
        config: &GatewayConfig,
        cache: Option<Arc<CacheProvider>>,
        allowlist: Arc<AllowListValidator>,
        relay: Arc<dyn VideoRelay>,
        metrics: Option<PrometheusHandle>,
    ) -> GatewayResult<Self> {
        let cache_layer = cache
            .filter(|_| config.cache.enabled)
            .map(|provider| CacheLayerState::new(provider, config.app_name.clone(), config.cache.clone()));

        let mut app = build_router(AppState { relay, allowlist }, cache_layer);
        if let Some(handle) = metrics {
            app = app.merge(metrics_router(handle));
        }

        Ok(Self {
            app,
            bind_addr: config.bind_address()?,
        })
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Serve until a shutdown signal arrives
    pub async fn run(self) -> GatewayResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind relay server to {}: {}", self.bind_addr, e))
        })?;
        info!(address = %self.bind_addr, "yt-relay listening");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::internal(format!("Relay server error: {}", e)))?;

        info!("yt-relay stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
