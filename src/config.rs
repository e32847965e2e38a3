use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub broker_addr: String,
    pub db_uri: String,
    pub db_name: String,
    pub embedding_provider_key: Option<String>,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub port: u16,
    pub metrics_port: u16,
    pub log_level: String,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    pub cors_origins: Vec<String>,
    pub shutdown_grace_ms: u64,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment variables, loading a `.env`
    /// file first if present (development convenience).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            broker_addr: env_or("BROKER_ADDR", "memory://local"),
            db_uri: env::var("DB_URI").context("DB_URI must be set")?,
            db_name: env_or("DB_NAME", "mech_dispatch"),
            embedding_provider_key: env::var("EMBEDDING_PROVIDER_KEY").ok(),
            embedding_model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimensions: env_or("EMBEDDING_DIMENSIONS", "1536")
                .parse()
                .context("EMBEDDING_DIMENSIONS must be a valid number")?,
            port: env_or("PORT", "8080").parse().context("PORT must be a valid number")?,
            metrics_port: env_or("METRICS_PORT", "9090")
                .parse()
                .context("METRICS_PORT must be a valid number")?,
            log_level: env_or("LOG_LEVEL", "info"),
            rate_limit_window_ms: env_or("RATE_LIMIT_WINDOW_MS", "60000")
                .parse()
                .context("RATE_LIMIT_WINDOW_MS must be a valid number")?,
            rate_limit_max_requests: env_or("RATE_LIMIT_MAX_REQUESTS", "100")
                .parse()
                .context("RATE_LIMIT_MAX_REQUESTS must be a valid number")?,
            cors_origins: env_or("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            shutdown_grace_ms: env_or("SHUTDOWN_GRACE_MS", "30000")
                .parse()
                .context("SHUTDOWN_GRACE_MS must be a valid number")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_origins_splits_on_comma() {
        std::env::set_var("DB_URI", "postgres://x/y");
        std::env::set_var("CORS_ORIGINS", "https://a.example, https://b.example");
        let config = Config::from_env().unwrap();
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
    }
}
