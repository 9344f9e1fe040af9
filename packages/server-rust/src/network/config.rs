//! HTTP-facing configuration for the promise engine's demo host.

use std::time::Duration;

/// Bind address, CORS policy, and request-timeout settings for the HTTP
/// front end. Does not cover TLS or connection-level tuning — this host
/// terminates plain HTTP behind whatever reverse proxy a deployment fronts
/// it with.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a request to complete.
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
        }
    }
}
