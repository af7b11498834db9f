use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Registry};
use std::sync::Arc;

/// Metrics collector for the edge service
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Admission metrics
    admitted_requests: Counter,
    denied_requests: Counter,
    active_buckets: Gauge,
    evicted_buckets: Counter,

    // Geo cache metrics
    geo_cache_hits: Counter,
    geo_cache_misses: Counter,
    geo_lookup_failures: Counter,
    geo_cache_entries: Gauge,
    geo_evicted_entries: Counter,
    geo_lookup_duration: Histogram,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let admitted_requests = Counter::new(
            "ratelimit_admitted_total",
            "Number of requests admitted by the rate limiter",
        )?;

        let denied_requests = Counter::new(
            "ratelimit_denied_total",
            "Number of requests rejected by the rate limiter",
        )?;

        let active_buckets = Gauge::new(
            "ratelimit_buckets",
            "Number of client token buckets currently tracked",
        )?;

        let evicted_buckets = Counter::new(
            "ratelimit_buckets_evicted_total",
            "Number of idle token buckets removed by the sweeper",
        )?;

        let geo_cache_hits = Counter::new("geo_cache_hits_total", "Number of geo cache hits")?;

        let geo_cache_misses =
            Counter::new("geo_cache_misses_total", "Number of geo cache misses")?;

        let geo_lookup_failures = Counter::new(
            "geo_lookup_failures_total",
            "Number of external geo lookups that resolved to unknown",
        )?;

        let geo_cache_entries = Gauge::new(
            "geo_cache_entries",
            "Number of entries currently held in the geo cache",
        )?;

        let geo_evicted_entries = Counter::new(
            "geo_cache_entries_evicted_total",
            "Number of expired geo cache entries removed by the sweeper",
        )?;

        let geo_lookup_duration = Histogram::with_opts(HistogramOpts::new(
            "geo_lookup_duration_seconds",
            "Duration of external geo lookups in seconds",
        ))?;

        registry.register(Box::new(admitted_requests.clone()))?;
        registry.register(Box::new(denied_requests.clone()))?;
        registry.register(Box::new(active_buckets.clone()))?;
        registry.register(Box::new(evicted_buckets.clone()))?;
        registry.register(Box::new(geo_cache_hits.clone()))?;
        registry.register(Box::new(geo_cache_misses.clone()))?;
        registry.register(Box::new(geo_lookup_failures.clone()))?;
        registry.register(Box::new(geo_cache_entries.clone()))?;
        registry.register(Box::new(geo_evicted_entries.clone()))?;
        registry.register(Box::new(geo_lookup_duration.clone()))?;

        Ok(Self {
            registry,
            admitted_requests,
            denied_requests,
            active_buckets,
            evicted_buckets,
            geo_cache_hits,
            geo_cache_misses,
            geo_lookup_failures,
            geo_cache_entries,
            geo_evicted_entries,
            geo_lookup_duration,
        })
    }

    /// Get the Prometheus registry for this metrics instance
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_admitted(&self) {
        self.admitted_requests.inc();
    }

    pub fn record_denied(&self) {
        self.denied_requests.inc();
    }

    pub fn set_active_buckets(&self, count: usize) {
        self.active_buckets.set(count as f64);
    }

    pub fn record_evicted_buckets(&self, count: usize) {
        self.evicted_buckets.inc_by(count as f64);
    }

    pub fn record_geo_cache_hit(&self) {
        self.geo_cache_hits.inc();
    }

    pub fn record_geo_cache_miss(&self) {
        self.geo_cache_misses.inc();
    }

    pub fn record_geo_lookup_failure(&self) {
        self.geo_lookup_failures.inc();
    }

    pub fn set_geo_cache_entries(&self, count: usize) {
        self.geo_cache_entries.set(count as f64);
    }

    pub fn record_geo_evicted_entries(&self, count: usize) {
        self.geo_evicted_entries.inc_by(count as f64);
    }

    /// Record how long an external lookup took
    pub fn record_geo_lookup_duration(&self, duration_seconds: f64) {
        self.geo_lookup_duration.observe(duration_seconds);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode(&self) -> prometheus::Result<String> {
        prometheus::TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();

        metrics.record_admitted();
        metrics.record_denied();
        metrics.set_active_buckets(3);
        metrics.record_evicted_buckets(2);
        metrics.record_geo_cache_hit();
        metrics.record_geo_cache_miss();
        metrics.record_geo_lookup_failure();
        metrics.record_geo_lookup_duration(0.25);
    }

    #[test]
    fn test_metrics_gathering() {
        let metrics = Metrics::new().unwrap();

        metrics.record_denied();
        metrics.record_denied();

        let families = metrics.registry().gather();
        let denied = families
            .iter()
            .find(|f| f.get_name() == "ratelimit_denied_total")
            .expect("denied counter registered");
        assert_eq!(denied.get_metric()[0].get_counter().get_value(), 2.0);
    }

    #[test]
    fn test_encode_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.record_geo_cache_hit();

        let text = metrics.encode().unwrap();
        assert!(text.contains("geo_cache_hits_total 1"));
    }
}
