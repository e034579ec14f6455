//! Server configuration from the environment

use crate::db::PoolConfig;
use crate::runtime::DEFAULT_MAX_TURNS;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: expected {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Settings read once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub pool: PoolConfig,
    pub max_turns: u32,
    /// Optional file overriding the planner instructions
    pub planner_prompt_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("META_PROMPTER_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".meta-prompter").join("checkpoints.db")
            },
            PathBuf::from,
        );

        let defaults = PoolConfig::default();
        let acquire_secs = parse(
            &lookup,
            "META_PROMPTER_DB_ACQUIRE_TIMEOUT_SECS",
            defaults.acquire_timeout.as_secs(),
            "whole seconds",
        )?;
        let pool = PoolConfig {
            max_connections: parse(
                &lookup,
                "META_PROMPTER_DB_POOL_SIZE",
                defaults.max_connections,
                "a connection count",
            )?
            .max(1),
            acquire_timeout: Duration::from_secs(acquire_secs),
        };

        Ok(Self {
            db_path,
            port: parse(&lookup, "META_PROMPTER_PORT", DEFAULT_PORT, "a port number")?,
            pool,
            // Zero would end every conversation before the planner runs
            max_turns: parse(&lookup, "META_PROMPTER_MAX_TURNS", DEFAULT_MAX_TURNS, "a turn count")?
                .max(1),
            planner_prompt_path: lookup("META_PROMPTER_PLANNER_PROMPT").map(PathBuf::from),
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            value,
            expected,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("HOME", "/home/me")]).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/home/me/.meta-prompter/checkpoints.db"));
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.max_turns, 15);
        assert_eq!(cfg.pool, PoolConfig::default());
        assert_eq!(cfg.planner_prompt_path, None);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("META_PROMPTER_DB_PATH", "/data/cp.db"),
            ("META_PROMPTER_PORT", "8080"),
            ("META_PROMPTER_DB_POOL_SIZE", "4"),
            ("META_PROMPTER_DB_ACQUIRE_TIMEOUT_SECS", "2"),
            ("META_PROMPTER_MAX_TURNS", " 5 "),
            ("META_PROMPTER_PLANNER_PROMPT", "/etc/planner.txt"),
        ])
        .unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/data/cp.db"));
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.pool.max_connections, 4);
        assert_eq!(cfg.pool.acquire_timeout, Duration::from_secs(2));
        assert_eq!(cfg.max_turns, 5);
        assert_eq!(cfg.planner_prompt_path, Some(PathBuf::from("/etc/planner.txt")));
    }

    #[test]
    fn test_zero_turns_is_clamped() {
        assert_eq!(config(&[("META_PROMPTER_MAX_TURNS", "0")]).unwrap().max_turns, 1);
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = config(&[("META_PROMPTER_PORT", "eighty")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "META_PROMPTER_PORT",
                value: "eighty".to_string(),
                expected: "a port number",
            }
        );
    }
}
