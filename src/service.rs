use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::Settings,
    error::Result,
    geo::{CountryResolver, GeoCache, IpWhoIsResolver},
    limiter::RateLimiter,
    metrics::Metrics,
    sweeper::spawn_sweeper,
};

/// Shared handles given to request handlers
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub geo: Arc<GeoCache>,
    pub metrics: Arc<Metrics>,
    pub hash_salt: Arc<str>,
}

/// Owns the admission limiter, the geo cache and their eviction tasks
pub struct EdgeService {
    state: AppState,
    shutdown: CancellationToken,
    sweepers: Vec<JoinHandle<()>>,
}

impl EdgeService {
    /// Build the service with the ipwho.is resolver configured in `settings`
    pub fn from_settings(settings: &Settings, metrics: Arc<Metrics>) -> Result<Self> {
        let resolver = IpWhoIsResolver::new(&settings.geo.endpoint, settings.geo.lookup_timeout())?;
        Ok(Self::start(settings, Arc::new(resolver), metrics))
    }

    /// Build the components and spawn their sweepers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        settings: &Settings,
        resolver: Arc<dyn CountryResolver>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let limiter = Arc::new(
            RateLimiter::new(
                settings.rate_limit.requests_per_minute,
                settings.rate_limit.idle_ttl(),
            )
            .with_metrics(metrics.clone()),
        );

        let geo = Arc::new(
            GeoCache::new(resolver, settings.geo.ttl())
                .with_lookup_timeout(settings.geo.lookup_timeout())
                .with_metrics(metrics.clone()),
        );

        let shutdown = CancellationToken::new();
        let sweepers = vec![
            spawn_sweeper(
                limiter.clone(),
                settings.rate_limit.sweep_interval(),
                shutdown.child_token(),
            ),
            spawn_sweeper(geo.clone(), settings.geo.sweep_interval(), shutdown.child_token()),
        ];

        info!(
            requests_per_minute = settings.rate_limit.requests_per_minute,
            geo_ttl = ?settings.geo.ttl(),
            "Edge service started"
        );

        Self {
            state: AppState {
                limiter,
                geo,
                metrics,
                hash_salt: Arc::from(settings.click.hash_salt.as_str()),
            },
            shutdown,
            sweepers,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.state.limiter
    }

    pub fn geo(&self) -> &Arc<GeoCache> {
        &self.state.geo
    }

    /// Stop the sweepers and wait for them to exit
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for sweeper in self.sweepers {
            if let Err(e) = sweeper.await {
                warn!("Sweeper task ended abnormally: {}", e);
            }
        }
        info!("Edge service stopped");
    }
}
