use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::publisher::RetryPolicy;

/// Centralized application configuration.
/// Combines `EHR_STORE_*` environment variables and CLI arguments; CLI wins.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Hex-encoded 32-byte master key. Bucket keys are derived from it.
    pub master_key: Option<String>,
    pub publish_initial_backoff_ms: u64,
    pub publish_max_backoff_ms: u64,
    /// `0` waits for outstanding events forever on shutdown.
    pub publish_drain_timeout_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Encrypted, versioned health-record object store")]
pub struct Args {
    /// Host to bind to (overrides EHR_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides EHR_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where sealed payloads are stored (overrides EHR_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides EHR_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Hex master key (overrides EHR_STORE_MASTER_KEY)
    #[arg(long)]
    pub master_key: Option<String>,

    /// Initial retry backoff for change events (overrides EHR_STORE_PUBLISH_INITIAL_BACKOFF_MS)
    #[arg(long)]
    pub publish_initial_backoff_ms: Option<u64>,

    /// Maximum retry backoff for change events (overrides EHR_STORE_PUBLISH_MAX_BACKOFF_MS)
    #[arg(long)]
    pub publish_max_backoff_ms: Option<u64>,

    /// Shutdown drain timeout (overrides EHR_STORE_PUBLISH_DRAIN_TIMEOUT_SECS)
    #[arg(long)]
    pub publish_drain_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge `args` over values found through `lookup`, then over defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<(Self, bool)> {
        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| lookup("EHR_STORE_HOST").unwrap_or_else(|| "0.0.0.0".into())),
            port: pick(args.port, &lookup, "EHR_STORE_PORT", 3000)?,
            storage_dir: args.storage_dir.unwrap_or_else(|| {
                lookup("EHR_STORE_STORAGE_DIR").unwrap_or_else(|| "./data/objects".into())
            }),
            database_url: args.database_url.unwrap_or_else(|| {
                lookup("EHR_STORE_DATABASE_URL")
                    .unwrap_or_else(|| "sqlite://./data/meta/ehr_store.db".into())
            }),
            master_key: args.master_key.or_else(|| lookup("EHR_STORE_MASTER_KEY")),
            publish_initial_backoff_ms: pick(
                args.publish_initial_backoff_ms,
                &lookup,
                "EHR_STORE_PUBLISH_INITIAL_BACKOFF_MS",
                100,
            )?,
            publish_max_backoff_ms: pick(
                args.publish_max_backoff_ms,
                &lookup,
                "EHR_STORE_PUBLISH_MAX_BACKOFF_MS",
                30_000,
            )?,
            publish_drain_timeout_secs: pick(
                args.publish_drain_timeout_secs,
                &lookup,
                "EHR_STORE_PUBLISH_DRAIN_TIMEOUT_SECS",
                30,
            )?,
        };

        if cfg.publish_initial_backoff_ms > cfg.publish_max_backoff_ms {
            anyhow::bail!(
                "publish initial backoff ({} ms) exceeds max backoff ({} ms)",
                cfg.publish_initial_backoff_ms,
                cfg.publish_max_backoff_ms
            );
        }

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(self.publish_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.publish_max_backoff_ms),
            drain_timeout: match self.publish_drain_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

fn pick<T>(
    arg: Option<T>,
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(value) = arg {
        return Ok(value);
    }
    match lookup(name) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_without_env_or_args() {
        let (cfg, migrate) = AppConfig::resolve(Args::default(), lookup_from(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.storage_dir, "./data/objects");
        assert!(cfg.master_key.is_none());
        assert!(!migrate);
        assert_eq!(cfg.retry_policy().drain_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn args_override_env() {
        let args = Args {
            port: Some(8080),
            migrate: true,
            ..Args::default()
        };
        let env = lookup_from(&[("EHR_STORE_PORT", "9000"), ("EHR_STORE_HOST", "127.0.0.1")]);
        let (cfg, migrate) = AppConfig::resolve(args, env).unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert!(migrate);
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let env = lookup_from(&[("EHR_STORE_PORT", "not-a-port")]);
        let err = AppConfig::resolve(Args::default(), env).unwrap_err();
        assert!(err.to_string().contains("EHR_STORE_PORT"));
    }

    #[test]
    fn zero_drain_timeout_waits_forever() {
        let env = lookup_from(&[("EHR_STORE_PUBLISH_DRAIN_TIMEOUT_SECS", "0")]);
        let (cfg, _) = AppConfig::resolve(Args::default(), env).unwrap();
        assert_eq!(cfg.retry_policy().drain_timeout, None);
    }

    #[test]
    fn backoff_bounds_are_checked() {
        let env = lookup_from(&[
            ("EHR_STORE_PUBLISH_INITIAL_BACKOFF_MS", "5000"),
            ("EHR_STORE_PUBLISH_MAX_BACKOFF_MS", "10"),
        ]);
        assert!(AppConfig::resolve(Args::default(), env).is_err());
    }
}
