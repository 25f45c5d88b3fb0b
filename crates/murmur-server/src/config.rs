use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

/// Placeholder JWT secrets that should never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    /// Channels created at startup if missing. Always contains `lobby`.
    pub channels: Vec<String>,
    pub lobby: String,
    pub strict_targets: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = get("MURMUR_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("MURMUR_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("MURMUR_PORT must be a port number")?;
        let db_path: PathBuf = get("MURMUR_DB_PATH").unwrap_or_else(|| "murmur.db".into()).into();

        let jwt_secret = get("MURMUR_JWT_SECRET").unwrap_or_default();
        let jwt_secret = if jwt_secret.is_empty() {
            warn!("MURMUR_JWT_SECRET is unset, falling back to a development secret");
            "dev-secret-change-me".to_string()
        } else {
            if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
                warn!("MURMUR_JWT_SECRET is still a placeholder, set a random value");
            }
            jwt_secret
        };

        let ttl_hours: i64 = get("MURMUR_TOKEN_TTL_HOURS")
            .unwrap_or_else(|| "24".into())
            .parse()
            .context("MURMUR_TOKEN_TTL_HOURS must be a whole number of hours")?;
        anyhow::ensure!(ttl_hours > 0, "MURMUR_TOKEN_TTL_HOURS must be positive");

        let lobby = get("MURMUR_LOBBY_CHANNEL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "General".into());

        let mut channels: Vec<String> = get("MURMUR_CHANNELS")
            .unwrap_or_else(|| "General,Random".into())
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();
        if !channels.contains(&lobby) {
            channels.insert(0, lobby.clone());
        }
        let mut seen = HashSet::new();
        channels.retain(|name| seen.insert(name.clone()));

        let strict_targets = match get("MURMUR_STRICT_TARGETS") {
            None => true,
            Some(v) => parse_bool(&v)
                .with_context(|| format!("MURMUR_STRICT_TARGETS: expected true/false, got {:?}", v))?,
        };

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            token_ttl: chrono::Duration::hours(ttl_hours),
            channels,
            lobby,
            strict_targets,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
