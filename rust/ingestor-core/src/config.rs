//! Typed configuration for the pipeline (C1).
//!
//! [`SystemConfig`] and [`JobConfig`] are the only configuration surfaces
//! the pipeline accepts: there is no free-form lookup, and every recognized
//! option is an enumerated field. Secrets (`DATABENTO_API_KEY`,
//! `TIMESCALEDB_*`) are read from the environment only and never appear in
//! these structs — see [`SystemConfig::from_env_and_file`].

use std::{env, fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::enums::SymbolType;
use crate::error::{Error, Result};

/// Exponential backoff shape and which HTTP statuses trigger a retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Upper bound on per-call retries.
    pub max_attempts: u32,
    /// Initial delay before the first retry.
    pub base_delay_ms: u64,
    /// Ceiling on the computed delay, regardless of attempt count.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub multiplier: f64,
    /// HTTP statuses that trigger a retry rather than an abort.
    pub retry_on_status: Vec<u16>,
    /// If `true`, a server-advertised `Retry-After` overrides the computed delay.
    pub respect_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            retry_on_status: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }
}

impl RetryConfig {
    /// The base delay as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// The maximum delay as a [`Duration`].
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Returns `true` if `status` is in [`Self::retry_on_status`].
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }
}

/// Strictness of field mapping and validation, and the quarantine discipline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// If `false`, columns not named in a schema mapping are tolerated
    /// rather than rejected at config-load time.
    pub strict_mode: bool,
    /// If `false`, any validation failure is fatal instead of quarantined.
    pub quarantine_enabled: bool,
    /// Caps the number of quarantined records per batch before the batch
    /// (and its chunk) is aborted as [`Error::FatalCap`].
    pub max_errors_per_batch: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            quarantine_enabled: true,
            max_errors_per_batch: 500,
        }
    }
}

/// Per-job chunk width.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Width, in days, of each chunk passed to the vendor adapter.
    pub chunk_days: u32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_days: 10 }
    }
}

/// System-wide settings shared by every job in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Retry/backoff shape for vendor calls.
    pub retry: RetryConfig,
    /// Validation strictness and quarantine behavior.
    pub validation: ValidationConfig,
    /// Default chunk width, overridable per job.
    pub chunking: ChunkingConfig,
    /// Number of days a quarantine entry is retained before pruning.
    pub quarantine_retention_days: u32,
    /// Base directory for the default file-based quarantine sink.
    pub quarantine_dir: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            validation: ValidationConfig::default(),
            chunking: ChunkingConfig::default(),
            quarantine_retention_days: 30,
            quarantine_dir: "dlq".to_owned(),
        }
    }
}

impl SystemConfig {
    /// Loads a [`SystemConfig`] from a YAML file, falling back to defaults
    /// for any field the file omits.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the file cannot be read or does not
    /// parse as valid YAML.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("could not read config file {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid config YAML in {}: {e}", path.display())))
    }

    /// Reads the vendor API key from `DATABENTO_API_KEY`.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the variable is unset.
    pub fn api_key_from_env() -> Result<String> {
        env::var("DATABENTO_API_KEY")
            .map_err(|_| Error::Config("DATABENTO_API_KEY is not set".to_owned()))
    }

    /// Reads the `TIMESCALEDB_{HOST,PORT,DB,USER,PASSWORD}` variables and
    /// assembles a Postgres connection string.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if any required variable is unset.
    pub fn database_url_from_env() -> Result<String> {
        let get = |name: &str| {
            env::var(name)
                .map_err(|_| Error::Config(format!("{name} is not set")))
        };
        let host = get("TIMESCALEDB_HOST")?;
        let port = get("TIMESCALEDB_PORT")?;
        let db = get("TIMESCALEDB_DB")?;
        let user = get("TIMESCALEDB_USER")?;
        let password = get("TIMESCALEDB_PASSWORD")?;
        Ok(format!("postgres://{user}:{password}@{host}:{port}/{db}"))
    }
}

/// An immutable, accepted ingestion job.
///
/// Construct via [`JobConfig::new`], which validates `start_date <= end_date`
/// and that `symbols` is non-empty; once built, a `JobConfig` cannot be
/// mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// A human-readable job name, used to key quarantine entries.
    pub name: String,
    /// The vendor to fetch from. Only `"databento"` is currently supported.
    pub vendor: String,
    /// The vendor dataset code, e.g. `GLBX.MDP3`.
    pub dataset: String,
    /// The vendor schema code, e.g. `ohlcv-1d` or `trades`.
    pub schema: String,
    /// The symbols to fetch, in the symbology named by [`Self::symbol_type`].
    pub symbols: Vec<String>,
    /// How [`Self::symbols`] should be interpreted by the vendor.
    pub symbol_type: SymbolType,
    /// The inclusive start of the date range, `YYYY-MM-DD`.
    pub start_date: time::Date,
    /// The inclusive end of the date range, `YYYY-MM-DD`.
    pub end_date: time::Date,
    /// Width, in days, of each chunk. Falls back to
    /// [`ChunkingConfig::chunk_days`] when unset.
    #[serde(default)]
    pub chunk_days: Option<u32>,
    /// If `true`, whole chunks containing no trading day are skipped.
    #[serde(default)]
    pub calendar_filter: bool,
}

impl JobConfig {
    /// Builds a [`JobConfig`], rejecting an empty symbol list or an
    /// inverted date range.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `symbols` is empty or `start_date >
    /// end_date`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        vendor: impl Into<String>,
        dataset: impl Into<String>,
        schema: impl Into<String>,
        symbols: Vec<String>,
        symbol_type: SymbolType,
        start_date: time::Date,
        end_date: time::Date,
    ) -> Result<Self> {
        if symbols.is_empty() {
            return Err(Error::Config("job has no symbols".to_owned()));
        }
        if start_date > end_date {
            return Err(Error::Config(format!(
                "start_date {start_date} is after end_date {end_date}"
            )));
        }
        Ok(Self {
            name: name.into(),
            vendor: vendor.into(),
            dataset: dataset.into(),
            schema: schema.into(),
            symbols,
            symbol_type,
            start_date,
            end_date,
            chunk_days: None,
            calendar_filter: false,
        })
    }

    /// Resolves the effective chunk width: [`Self::chunk_days`] if set,
    /// else the system default.
    pub fn effective_chunk_days(&self, system: &SystemConfig) -> u32 {
        self.chunk_days.unwrap_or(system.chunking.chunk_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn rejects_empty_symbols() {
        let result = JobConfig::new(
            "job",
            "databento",
            "GLBX.MDP3",
            "ohlcv-1d",
            vec![],
            SymbolType::Continuous,
            date!(2024 - 01 - 01),
            date!(2024 - 01 - 02),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn rejects_inverted_date_range() {
        let result = JobConfig::new(
            "job",
            "databento",
            "GLBX.MDP3",
            "ohlcv-1d",
            vec!["ES.c.0".to_owned()],
            SymbolType::Continuous,
            date!(2024 - 01 - 10),
            date!(2024 - 01 - 01),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn default_retry_config_retries_on_rate_limit_and_server_errors() {
        let retry = RetryConfig::default();
        for status in [429, 500, 502, 503, 504] {
            assert!(retry.is_retryable_status(status));
        }
        assert!(!retry.is_retryable_status(404));
    }

    #[test]
    fn effective_chunk_days_falls_back_to_system_default() {
        let job = JobConfig::new(
            "job",
            "databento",
            "GLBX.MDP3",
            "ohlcv-1d",
            vec!["ES.c.0".to_owned()],
            SymbolType::Continuous,
            date!(2024 - 01 - 01),
            date!(2024 - 01 - 02),
        )
        .unwrap();
        let system = SystemConfig::default();
        assert_eq!(job.effective_chunk_days(&system), system.chunking.chunk_days);
    }
}
