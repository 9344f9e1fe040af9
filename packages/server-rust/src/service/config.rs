//! Process-level configuration: bind address and the tunables that govern
//! retry, locking, and salvage cadence.
//!
//! Every field is settable from the command line or its `env` variable, in
//! that precedence order, with a production-sane default so a bare `clap`
//! invocation with no flags still starts something reasonable.

use std::time::Duration;

use clap::Parser;

use crate::network::HttpConfig;

/// Top-level configuration for the `promise-server` binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "promise-server", about = "Durable at-least-once promise execution over a partitioned document store")]
pub struct PromiseEngineConfig {
    /// Address the HTTP server binds to.
    #[arg(long, env = "PROMISE_SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port the HTTP server listens on. 0 lets the OS assign one.
    #[arg(long, env = "PROMISE_SERVER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Allowed CORS origins, comma-separated. `*` allows any origin.
    #[arg(long, env = "PROMISE_SERVER_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Maximum time a request may take before the server times it out.
    #[arg(long, env = "PROMISE_SERVER_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Average delay, in seconds, between the salvager's drain passes.
    /// Each pass jitters by up to a quarter of this value in either
    /// direction so concurrently started nodes don't all poll in lockstep.
    #[arg(long, env = "PROMISE_SALVAGER_AVERAGE_DELAY_SECS", default_value_t = 60)]
    pub salvager_average_delay_secs: u64,

    /// Maximum number of due promises fetched per salvager page.
    #[arg(long, env = "PROMISE_SALVAGER_BATCH_SIZE", default_value_t = 10)]
    pub salvager_batch_size: usize,

    /// Graceful shutdown drain timeout, in seconds.
    #[arg(long, env = "PROMISE_SERVER_SHUTDOWN_TIMEOUT_SECS", default_value_t = 30)]
    pub shutdown_timeout_secs: u64,
}

impl PromiseEngineConfig {
    /// Builds the HTTP-facing subset of this configuration.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Graceful shutdown drain timeout as a [`Duration`].
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for PromiseEngineConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            salvager_average_delay_secs: 60,
            salvager_batch_size: 10,
            shutdown_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_constants() {
        let config = PromiseEngineConfig::default();
        assert_eq!(config.salvager_average_delay_secs, 60);
        assert_eq!(config.salvager_batch_size, 10);
    }

    #[test]
    fn http_config_derives_from_top_level_fields() {
        let mut config = PromiseEngineConfig::default();
        config.host = "127.0.0.1".to_string();
        config.port = 9000;
        let http = config.http_config();
        assert_eq!(http.host, "127.0.0.1");
        assert_eq!(http.port, 9000);
        assert_eq!(http.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn parses_from_explicit_args() {
        let config = PromiseEngineConfig::parse_from([
            "promise-server",
            "--host",
            "10.0.0.1",
            "--port",
            "9100",
            "--cors-origins",
            "https://a.example,https://b.example",
        ]);
        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 9100);
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
    }
}
