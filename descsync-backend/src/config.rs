use std::env;
use std::str::FromStr;

use crate::composer::DEFAULT_SEPARATOR;
use crate::pipeline::DEFAULT_REBUILD_CONCURRENCY;
use crate::sync::{DEFAULT_SYNC_LEASE_SECS, DEFAULT_SYNC_SCHEDULE};
use crate::vault::DEFAULT_REFRESH_MARGIN_SECS;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Process-wide secret the vault derives token keys from
    pub token_encryption_secret: String,
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
    pub oauth_redirect_uri: String,
    pub oauth_token_url: Option<String>,
    pub platform_api_base_url: Option<String>,
    pub analytics_api_base_url: Option<String>,
    pub sync_schedule: String,
    /// Seconds before an unfinished `syncing` claim may be taken over
    pub sync_lease_secs: i64,
    pub token_refresh_margin_secs: i64,
    pub rebuild_concurrency: usize,
    /// Joins composed templates; `\n` escapes are expanded
    pub description_separator: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("oauth_client_id", &self.oauth_client_id)
            .field("oauth_redirect_uri", &self.oauth_redirect_uri)
            .field("sync_schedule", &self.sync_schedule)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| format!("{} must be set", key))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            port: parse_or(&lookup, "PORT", 8080)?,
            database_url: optional("DATABASE_URL").unwrap_or_else(|| "./.db/descsync.db".to_string()),
            token_encryption_secret: required("TOKEN_ENCRYPTION_SECRET")?,
            oauth_client_id: required("OAUTH_CLIENT_ID")?,
            oauth_client_secret: required("OAUTH_CLIENT_SECRET")?,
            oauth_redirect_uri: required("OAUTH_REDIRECT_URI")?,
            oauth_token_url: optional("OAUTH_TOKEN_URL"),
            platform_api_base_url: optional("PLATFORM_API_BASE_URL"),
            analytics_api_base_url: optional("ANALYTICS_API_BASE_URL"),
            sync_schedule: optional("SYNC_SCHEDULE").unwrap_or_else(|| DEFAULT_SYNC_SCHEDULE.to_string()),
            sync_lease_secs: parse_or(&lookup, "SYNC_LEASE_SECS", DEFAULT_SYNC_LEASE_SECS)?,
            token_refresh_margin_secs: parse_or(
                &lookup,
                "TOKEN_REFRESH_MARGIN_SECS",
                DEFAULT_REFRESH_MARGIN_SECS,
            )?,
            rebuild_concurrency: parse_or(&lookup, "REBUILD_CONCURRENCY", DEFAULT_REBUILD_CONCURRENCY)?,
            description_separator: lookup("DESCRIPTION_SEPARATOR")
                .map(|raw| raw.replace("\\n", "\n"))
                .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
        })
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, String> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} must be a valid number, got '{}'", key, raw)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("TOKEN_ENCRYPTION_SECRET", "0123456789abcdef0123"),
        ("OAUTH_CLIENT_ID", "client"),
        ("OAUTH_CLIENT_SECRET", "secret"),
        ("OAUTH_REDIRECT_URI", "http://localhost/callback"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url, "./.db/descsync.db");
        assert_eq!(config.sync_schedule, DEFAULT_SYNC_SCHEDULE);
        assert_eq!(config.sync_lease_secs, 1800);
        assert_eq!(config.token_refresh_margin_secs, 60);
        assert_eq!(config.rebuild_concurrency, 4);
        assert!(config.oauth_token_url.is_none());
        assert_eq!(config.description_separator, DEFAULT_SEPARATOR);
    }

    #[test]
    fn test_separator_expands_newlines() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DESCRIPTION_SEPARATOR", "\\n---\\n"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.description_separator, "\n---\n");
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        let err = Config::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert!(err.contains("TOKEN_ENCRYPTION_SECRET"));
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "eighty"));
        assert!(Config::from_lookup(lookup(&pairs)).unwrap_err().contains("PORT"));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("0123456789abcdef0123"));
        assert!(!printed.contains("\"secret\""));
    }
}
