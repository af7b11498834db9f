//! Shorty Edge
//!
//! Admission control and geo-IP attribution for a URL shortener.
//! A per-client token bucket limiter guards mutating routes, and a TTL cache
//! in front of an external geo-IP service tags click events with a country.
//! Both keep their state in memory and shed it with background sweepers.

pub mod click;
pub mod config;
pub mod error;
pub mod geo;
pub mod ip;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod service;
pub mod sweeper;
pub mod utils;

// Re-export main types
pub use config::Settings;
pub use error::{Result, ShortyError};
pub use geo::{CountryResolver, GeoCache, IpWhoIsResolver};
pub use limiter::{Decision, RateLimiter};
pub use service::{AppState, EdgeService};
