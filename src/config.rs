use anyhow::{Context, Result};
use std::env;

/// Service configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Unset runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub port: u16,
    pub db_max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            nats_url: non_empty("NATS_URL"),
            port: non_empty("PORT")
                .unwrap_or_else(|| "8083".to_string())
                .parse()
                .context("PORT must be a valid port number")?,
            db_max_connections: non_empty("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("DB_MAX_CONNECTIONS must be a positive number")?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.port, 8083);
        assert_eq!(c.db_max_connections, 10);
        assert!(c.database_url.is_none());
        assert_eq!(c.bind_address(), "0.0.0.0:8083");
    }

    #[test]
    fn test_overrides() {
        let c = config(&[("PORT", "9000"), ("DATABASE_URL", "postgres://localhost/catalog"), ("NATS_URL", " ")]).unwrap();
        assert_eq!(c.port, 9000);
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/catalog"));
        assert!(c.nats_url.is_none());
    }

    #[test]
    fn test_invalid_port() {
        assert!(config(&[("PORT", "http")]).is_err());
    }
}
