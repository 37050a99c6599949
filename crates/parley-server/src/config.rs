use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Secrets that ship in sample env files and must never reach production.
const PLACEHOLDER_SECRETS: [&str; 3] = ["dev-secret-change-me", "change-me", "secret"];

/// Server settings, read from `PARLEY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub push_endpoint: Option<String>,
    pub push_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = non_empty("PARLEY_JWT_SECRET").context("PARLEY_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PARLEY_JWT_SECRET is still a placeholder value");
        }

        let port = match non_empty("PARLEY_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("PARLEY_PORT is not a valid port: {}", port))?,
            None => 3000,
        };

        Ok(Self {
            jwt_secret,
            jwt_issuer: non_empty("PARLEY_JWT_ISSUER"),
            db_path: PathBuf::from(non_empty("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into())),
            host: non_empty("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            push_endpoint: non_empty("PARLEY_PUSH_ENDPOINT"),
            push_key: non_empty("PARLEY_PUSH_KEY"),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().with_context(|| format!("invalid listen address {}", addr))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = load(&[("PARLEY_JWT_SECRET", "a-real-secret")]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("parley.db"));
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
        assert!(config.jwt_issuer.is_none());
        assert!(config.push_endpoint.is_none());
    }

    #[test]
    fn secret_is_required_and_placeholders_rejected() {
        assert!(load(&[]).is_err());
        assert!(load(&[("PARLEY_JWT_SECRET", "  ")]).is_err());
        assert!(load(&[("PARLEY_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("PARLEY_JWT_SECRET", "s3cret"),
            ("PARLEY_PORT", "8080"),
            ("PARLEY_HOST", "127.0.0.1"),
            ("PARLEY_PUSH_ENDPOINT", "https://push.example/send"),
        ])
        .unwrap();
        assert_eq!(config.addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.push_endpoint.as_deref(), Some("https://push.example/send"));
        assert!(load(&[("PARLEY_JWT_SECRET", "s3cret"), ("PARLEY_PORT", "http")]).is_err());
    }
}
