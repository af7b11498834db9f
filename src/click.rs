//! Visitor attribution for click events.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;

use crate::{geo::GeoCache, ip::client_ip, utils::truncate_chars};

/// Longest referrer or user agent kept on a click record
pub const MAX_HEADER_CHARS: usize = 512;

/// What the click-recording path stores about a visitor
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClickContext {
    pub ip_hash: String,
    /// Two-letter country code, empty when unknown
    pub country: String,
    pub referrer: String,
    pub user_agent: String,
    pub recorded_at: DateTime<Utc>,
}

impl ClickContext {
    /// Gather attribution for the current request.
    ///
    /// The raw IP never leaves this function; only its salted hash is kept.
    pub async fn capture(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        geo: &GeoCache,
        salt: &str,
    ) -> Self {
        let ip = client_ip(headers, peer);
        let country = geo.lookup_country(&ip).await;

        Self {
            ip_hash: hash_ip(&ip, salt),
            country,
            referrer: header_text(headers, header::REFERER),
            user_agent: header_text(headers, header::USER_AGENT),
            recorded_at: Utc::now(),
        }
    }
}

/// Hex SHA-256 of `ip|salt`
pub fn hash_ip(ip: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip);
    hasher.update("|");
    hasher.update(salt);
    format!("{:x}", hasher.finalize())
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| truncate_chars(v, MAX_HEADER_CHARS))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::geo::CountryResolver;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedResolver(&'static str);

    #[async_trait]
    impl CountryResolver for FixedResolver {
        async fn resolve(&self, _ip: IpAddr) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn geo() -> GeoCache {
        GeoCache::new(Arc::new(FixedResolver("NL")), Duration::from_secs(60))
    }

    #[test]
    fn test_hash_ip_is_salted_and_stable() {
        let a = hash_ip("8.8.8.8", "salt");
        assert_eq!(a.len(), 64);
        assert_eq!(a, hash_ip("8.8.8.8", "salt"));
        assert_ne!(a, hash_ip("8.8.8.8", "pepper"));
        assert_ne!(a, hash_ip("8.8.4.4", "salt"));
    }

    #[tokio::test]
    async fn test_capture_public_visitor() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("145.100.0.1"));
        headers.insert(header::REFERER, HeaderValue::from_static("https://news.example"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));

        let ctx = ClickContext::capture(&headers, None, &geo(), "s").await;
        assert_eq!(ctx.country, "NL");
        assert_eq!(ctx.ip_hash, hash_ip("145.100.0.1", "s"));
        assert_eq!(ctx.referrer, "https://news.example");
        assert_eq!(ctx.user_agent, "curl/8.0");
    }

    #[tokio::test]
    async fn test_capture_private_peer_has_no_country() {
        let peer: SocketAddr = "192.168.0.10:5555".parse().unwrap();
        let ctx = ClickContext::capture(&HeaderMap::new(), Some(peer), &geo(), "s").await;

        assert_eq!(ctx.country, "");
        assert_eq!(ctx.ip_hash, hash_ip("192.168.0.10", "s"));
        assert!(ctx.referrer.is_empty());
    }

    #[tokio::test]
    async fn test_long_user_agent_is_truncated() {
        let long = "x".repeat(MAX_HEADER_CHARS + 100);
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_str(&long).unwrap());

        let ctx = ClickContext::capture(&headers, None, &geo(), "s").await;
        assert_eq!(ctx.user_agent.len(), MAX_HEADER_CHARS);
    }
}
