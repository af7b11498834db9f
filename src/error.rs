use thiserror::Error;

/// Result type for edge service operations
pub type Result<T> = std::result::Result<T, ShortyError>;

/// Errors that can occur in the edge service
///
/// Admission checks and country lookups never surface these to request
/// handlers; they show up in configuration loading, resolver implementations
/// and server startup.
#[derive(Error, Debug)]
pub enum ShortyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),

    #[error("Geo lookup error: {0}")]
    Lookup(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
