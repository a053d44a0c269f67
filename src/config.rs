use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: SocketAddr,
    pub call_timeout: Duration,
    pub db_max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let redis_url =
            lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());
        let http_addr = lookup("HTTP_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("HTTP_ADDR must be a socket address")?;
        let call_timeout_ms = lookup("CALL_TIMEOUT_MS")
            .map(|raw| raw.parse::<u64>())
            .transpose()
            .context("CALL_TIMEOUT_MS must be an integer")?
            .unwrap_or(3_000);
        let db_max_connections = lookup("DB_MAX_CONNECTIONS")
            .map(|raw| raw.parse::<u32>())
            .transpose()
            .context("DB_MAX_CONNECTIONS must be an integer")?
            .unwrap_or(5);

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
            call_timeout: Duration::from_millis(call_timeout_ms),
            db_max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_is_set() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/db")]))
                .unwrap();
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.call_timeout, Duration::from_secs(3));
        assert_eq!(config.db_max_connections, 5);
    }

    #[test]
    fn database_url_is_required() {
        assert!(AppConfig::from_lookup(lookup_from(&[])).is_err());
    }

    #[test]
    fn rejects_malformed_timeout() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/db"),
            ("CALL_TIMEOUT_MS", "soon"),
        ]));
        assert!(result.is_err());
    }
}
