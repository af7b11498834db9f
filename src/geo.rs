use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, ShortyError},
    ip::public_ip,
    metrics::Metrics,
    sweeper::Sweep,
    utils::{system_clock, Clock},
};

/// Default upper bound on a single external lookup
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Default public geo-IP endpoint
pub const DEFAULT_ENDPOINT: &str = "https://ipwho.is";

/// Resolves an IP address to a country code over the network
#[async_trait]
pub trait CountryResolver: Send + Sync {
    /// Return the raw country code reported for `ip`
    async fn resolve(&self, ip: IpAddr) -> Result<String>;
}

#[derive(Debug, Clone)]
struct GeoCacheEntry {
    country: String,
    expires: Instant,
}

/// TTL cache of IP to ISO 3166-1 alpha-2 country code
///
/// An empty string means the address was private, unparseable, or could not
/// be resolved. Unresolvable results are cached like any other so a failing
/// upstream is asked at most once per TTL per address.
///
/// Concurrent misses for the same address are not coalesced; each caller may
/// issue its own lookup and the last one to finish wins the cache slot.
pub struct GeoCache {
    entries: Mutex<HashMap<IpAddr, GeoCacheEntry>>,
    resolver: Arc<dyn CountryResolver>,
    ttl: Duration,
    lookup_timeout: Duration,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
}

impl GeoCache {
    pub fn new(resolver: Arc<dyn CountryResolver>, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            resolver,
            ttl,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            clock: system_clock(),
            metrics: None,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Country code for `ip`, or an empty string when unknown
    pub async fn lookup_country(&self, ip: &str) -> String {
        let Some(addr) = public_ip(ip) else {
            return String::new();
        };

        if let Some(country) = self.cached(&addr) {
            if let Some(metrics) = &self.metrics {
                metrics.record_geo_cache_hit();
            }
            return country;
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_geo_cache_miss();
        }

        // Lock is not held here; the resolver call may take up to the timeout.
        let country = self.fetch(addr).await;

        let expires = self.clock.now() + self.ttl;
        let tracked = {
            let mut entries = self.lock();
            entries.insert(
                addr,
                GeoCacheEntry {
                    country: country.clone(),
                    expires,
                },
            );
            entries.len()
        };
        if let Some(metrics) = &self.metrics {
            metrics.set_geo_cache_entries(tracked);
        }

        country
    }

    fn cached(&self, addr: &IpAddr) -> Option<String> {
        let now = self.clock.now();
        self.lock()
            .get(addr)
            .filter(|entry| now < entry.expires)
            .map(|entry| entry.country.clone())
    }

    async fn fetch(&self, addr: IpAddr) -> String {
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(self.lookup_timeout, self.resolver.resolve(addr)).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_geo_lookup_duration(started.elapsed().as_secs_f64());
        }

        let country = match outcome {
            Ok(Ok(code)) => normalize_country(&code),
            Ok(Err(e)) => {
                warn!(ip = %addr, error = %e, "Geo lookup failed");
                String::new()
            }
            Err(_) => {
                warn!(ip = %addr, timeout = ?self.lookup_timeout, "Geo lookup timed out");
                String::new()
            }
        };

        if country.is_empty() {
            if let Some(metrics) = &self.metrics {
                metrics.record_geo_lookup_failure();
            }
        } else {
            debug!(ip = %addr, country = %country, "Geo lookup resolved");
        }

        country
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires);
        let removed = before - entries.len();
        let tracked = entries.len();
        drop(entries);

        if let Some(metrics) = &self.metrics {
            metrics.record_geo_evicted_entries(removed);
            metrics.set_geo_cache_entries(tracked);
        }
        if removed > 0 {
            info!(removed, tracked, "Evicted expired geo cache entries");
        }

        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, GeoCacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sweep for GeoCache {
    fn name(&self) -> &'static str {
        "geo-cache"
    }

    fn sweep(&self) -> usize {
        GeoCache::sweep(self)
    }
}

/// Upper-case a two-letter code; anything else becomes unknown
fn normalize_country(code: &str) -> String {
    let code = code.trim().to_uppercase();
    if code.chars().count() == 2 {
        code
    } else {
        String::new()
    }
}

/// Resolver backed by the ipwho.is JSON API
pub struct IpWhoIsResolver {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct IpWhoIsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    country_code: String,
    #[serde(default)]
    message: Option<String>,
}

impl IpWhoIsResolver {
    /// Build a resolver for `endpoint`, e.g. `https://ipwho.is`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(ShortyError::Config(
                "Geo endpoint must not be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl CountryResolver for IpWhoIsResolver {
    async fn resolve(&self, ip: IpAddr) -> Result<String> {
        let url = format!("{}/{}", self.endpoint, ip);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShortyError::Lookup(format!(
                "{} returned status {}",
                url, status
            )));
        }

        let body: IpWhoIsResponse = response.json().await?;
        if !body.success {
            return Err(ShortyError::Lookup(
                body.message
                    .unwrap_or_else(|| "lookup was not successful".to_string()),
            ));
        }

        Ok(body.country_code)
    }
}
