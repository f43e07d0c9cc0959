use crate::datasource::indexer::DEFAULT_EVENT_LIMIT;
use crate::datasource::ViewTarget;
use crate::domain::ObjectId;
use crate::engine::RetryPolicy;
use crate::orchestration::ReconcileRequest;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub chain_rpc_url: String,
    pub indexer_url: String,
    pub view_target: ViewTarget,
    pub index_event_limit: usize,
    pub retry_policy: RetryPolicy,
    pub refresh_interval: Duration,
    pub tick_interval: Duration,
    pub require_index_share_match: bool,
    pub seed: Option<ReconcileRequest>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parsed<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), format!("must be {}", expected)))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parsed::<u16>(&env_map, "PORT", "8080", "a valid u16")?;
        let chain_rpc_url = required(&env_map, "CHAIN_RPC_URL")?;
        let indexer_url = required(&env_map, "INDEXER_URL")?;

        let package = ObjectId::parse(&required(&env_map, "VIEW_PACKAGE")?).map_err(|e| {
            ConfigError::InvalidValue("VIEW_PACKAGE".to_string(), e.to_string())
        })?;
        let module = env_map
            .get("VIEW_MODULE")
            .cloned()
            .unwrap_or_else(|| "lending_view".to_string());
        let function = env_map
            .get("VIEW_FUNCTION")
            .cloned()
            .unwrap_or_else(|| "supply_balance".to_string());

        let index_event_limit = parsed::<usize>(
            &env_map,
            "INDEX_EVENT_LIMIT",
            &DEFAULT_EVENT_LIMIT.to_string(),
            "a positive integer",
        )?;
        if index_event_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "INDEX_EVENT_LIMIT".to_string(),
                "must be a positive integer".to_string(),
            ));
        }

        let retry_policy = parse_retry_policy(&env_map)?;

        let refresh_interval = Duration::from_millis(parsed::<u64>(
            &env_map,
            "REFRESH_INTERVAL_MS",
            "15000",
            "a duration in milliseconds",
        )?);
        let tick_interval = Duration::from_millis(parsed::<u64>(
            &env_map,
            "TICK_INTERVAL_MS",
            "250",
            "a duration in milliseconds",
        )?);
        for (key, interval) in [
            ("REFRESH_INTERVAL_MS", refresh_interval),
            ("TICK_INTERVAL_MS", tick_interval),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
        }

        let require_index_share_match = match env_map
            .get("REQUIRE_INDEX_SHARE_MATCH")
            .map(|s| s.as_str())
            .unwrap_or("false")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "REQUIRE_INDEX_SHARE_MATCH".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let seed = parse_seed_file(&env_map)?;

        Ok(Config {
            port,
            chain_rpc_url,
            indexer_url,
            view_target: ViewTarget::new(package, module, function),
            index_event_limit,
            retry_policy,
            refresh_interval,
            tick_interval,
            require_index_share_match,
            seed,
        })
    }
}

fn parse_retry_policy(env_map: &HashMap<String, String>) -> Result<RetryPolicy, ConfigError> {
    let defaults = RetryPolicy::default();
    let policy = RetryPolicy {
        base_delay_ms: parsed(
            env_map,
            "RETRY_BASE_MS",
            &defaults.base_delay_ms.to_string(),
            "a duration in milliseconds",
        )?,
        factor: parsed(env_map, "RETRY_FACTOR", &defaults.factor.to_string(), "a number")?,
        max_delay_ms: parsed(
            env_map,
            "RETRY_MAX_DELAY_MS",
            &defaults.max_delay_ms.to_string(),
            "a duration in milliseconds",
        )?,
        max_attempts: parsed(
            env_map,
            "RETRY_MAX_ATTEMPTS",
            &defaults.max_attempts.to_string(),
            "a positive integer",
        )?,
    };

    if !policy.factor.is_finite() || policy.factor < 1.0 {
        return Err(ConfigError::InvalidValue(
            "RETRY_FACTOR".to_string(),
            "must be a finite number >= 1".to_string(),
        ));
    }
    if policy.max_attempts == 0 {
        return Err(ConfigError::InvalidValue(
            "RETRY_MAX_ATTEMPTS".to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(policy)
}

fn parse_seed_file(
    env_map: &HashMap<String, String>,
) -> Result<Option<ReconcileRequest>, ConfigError> {
    let Some(file_path) = env_map.get("POSITIONS_FILE") else {
        return Ok(None);
    };
    let content = std::fs::read_to_string(file_path).map_err(|_| {
        ConfigError::InvalidValue(
            "POSITIONS_FILE".to_string(),
            "file not found or unreadable".to_string(),
        )
    })?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue("POSITIONS_FILE".to_string(), e.to_string()))
}
