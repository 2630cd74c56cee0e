use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

#[cfg(test)]
use std::sync::{LazyLock, Mutex};

#[cfg(test)]
pub(crate) static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Process-wide configuration, loaded once from the environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    db_path: DbPath,
    labeler_base_url: String,
    labeler_api_key: Option<String>,
    labeler_timeout: Duration,
    labeler_max_retries: usize,
    labeler_backoff_base_ms: u64,
    labeler_backoff_cap_ms: u64,
    pipeline_max_age_hours: i64,
    pipeline_batch_limit: i64,
    refiner_interval_secs: Option<u64>,
    ner_tokenizer_path: String,
}

/// Resolved database location. `Memory` is the explicit fallback when the
/// configured filesystem path turns out to be unwritable at store-open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbPath {
    File(String),
    Memory,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Loads configuration from the environment, applying the defaults named in §4.10.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a required variable is missing or a value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr(
            "HTTP_BIND",
            &format!(
                "0.0.0.0:{}",
                env::var("PORT").unwrap_or_else(|_| "3001".to_string())
            ),
        )?;
        let db_path = resolve_db_path();
        let labeler_base_url = env_var("LABELER_BASE_URL")?;
        let labeler_api_key = env::var("EXTERNAL_LABELER_API_KEY").ok();
        let labeler_timeout = Duration::from_millis(parse_u64("LABELER_TIMEOUT_MS", 10_000)?);
        let labeler_max_retries = parse_usize("LABELER_MAX_RETRIES", 3)?;
        let labeler_backoff_base_ms = parse_u64("LABELER_BACKOFF_BASE_MS", 500)?;
        let labeler_backoff_cap_ms = parse_u64("LABELER_BACKOFF_CAP_MS", 4_000)?;
        let pipeline_max_age_hours = parse_i64("PIPELINE_MAX_AGE_HOURS", 72)?;
        let pipeline_batch_limit = parse_i64("PIPELINE_BATCH_LIMIT", 50)?;
        let refiner_interval_secs = match env::var("REFINER_INTERVAL_SECS") {
            Ok(raw) => Some(raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
                name: "REFINER_INTERVAL_SECS",
                source: anyhow::Error::new(error),
            })?),
            Err(_) => None,
        };
        let ner_tokenizer_path = env::var("NER_TOKENIZER_PATH")
            .unwrap_or_else(|_| "./models/ner-tokenizer.json".to_string());

        Ok(Self {
            http_bind,
            db_path,
            labeler_base_url,
            labeler_api_key,
            labeler_timeout,
            labeler_max_retries,
            labeler_backoff_base_ms,
            labeler_backoff_cap_ms,
            pipeline_max_age_hours,
            pipeline_batch_limit,
            refiner_interval_secs,
            ner_tokenizer_path,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn db_path(&self) -> &DbPath {
        &self.db_path
    }

    #[must_use]
    pub fn labeler_base_url(&self) -> &str {
        &self.labeler_base_url
    }

    #[must_use]
    pub fn labeler_api_key(&self) -> Option<&str> {
        self.labeler_api_key.as_deref()
    }

    #[must_use]
    pub fn labeler_timeout(&self) -> Duration {
        self.labeler_timeout
    }

    #[must_use]
    pub fn labeler_max_retries(&self) -> usize {
        self.labeler_max_retries
    }

    #[must_use]
    pub fn labeler_backoff_base_ms(&self) -> u64 {
        self.labeler_backoff_base_ms
    }

    #[must_use]
    pub fn labeler_backoff_cap_ms(&self) -> u64 {
        self.labeler_backoff_cap_ms
    }

    #[must_use]
    pub fn pipeline_max_age_hours(&self) -> i64 {
        self.pipeline_max_age_hours
    }

    #[must_use]
    pub fn pipeline_batch_limit(&self) -> i64 {
        self.pipeline_batch_limit
    }

    #[must_use]
    pub fn refiner_interval_secs(&self) -> Option<u64> {
        self.refiner_interval_secs
    }

    #[must_use]
    pub fn ner_tokenizer_path(&self) -> &str {
        &self.ner_tokenizer_path
    }
}

/// `DB_PATH` wins when set; otherwise `NODE_ENV=production` selects a `/tmp`-backed
/// path, matching the contract in §6. The actual read-only-filesystem fallback to
/// an in-memory store happens at store-open time (§4.10), not here.
fn resolve_db_path() -> DbPath {
    if let Ok(path) = env::var("DB_PATH") {
        return DbPath::File(path);
    }
    if env::var("NODE_ENV").as_deref() == Ok("production") {
        return DbPath::File("/tmp/nirpaksh.sqlite3".to_string());
    }
    DbPath::File("./nirpaksh.sqlite3".to_string())
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_i64(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<i64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}
