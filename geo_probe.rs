// Diagnostic probe for the geo-IP path
// Run this with: cargo run --bin geo_probe -- 8.8.8.8 1.1.1.1

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shorty_edge::{GeoCache, IpWhoIsResolver, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load(std::env::var("CONFIG_PATH").ok().as_deref())?;
    let ips: Vec<String> = std::env::args().skip(1).collect();
    if ips.is_empty() {
        warn!("No addresses given; usage: geo_probe <ip> [<ip> ...]");
        return Ok(());
    }

    info!(
        "Probing {} with a {:?} lookup timeout",
        settings.geo.endpoint,
        settings.geo.lookup_timeout()
    );

    let resolver = IpWhoIsResolver::new(&settings.geo.endpoint, settings.geo.lookup_timeout())?;
    let cache = GeoCache::new(Arc::new(resolver), settings.geo.ttl())
        .with_lookup_timeout(settings.geo.lookup_timeout());

    // The second pass should be served entirely from cache
    for pass in ["cold", "warm"] {
        let pass_start = Instant::now();
        for ip in &ips {
            let started = Instant::now();
            let country = cache.lookup_country(ip).await;
            let shown = if country.is_empty() { "unknown" } else { country.as_str() };
            info!("[{}] {} -> {} in {:?}", pass, ip, shown, started.elapsed());
        }
        info!("[{}] pass finished in {:?}", pass, pass_start.elapsed());
    }

    info!("{} entries cached", cache.len());
    Ok(())
}
