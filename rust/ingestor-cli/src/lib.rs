//! Command-line surface over `ingestor-core` (§6): `ingest` runs one job,
//! `query` reads persisted data back out, `list-jobs` enumerates the jobs
//! file, and `status` checks that the vendor key and database are reachable.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ingestor_core::enums::SymbolType;
use ingestor_core::rules::RuleEngineConfig;
use ingestor_core::{JobConfig, SystemConfig};
use serde::Deserialize;
use time::Date;

/// Parses a `YYYY-MM-DD` date, the only date shape accepted on the
/// command line.
fn parse_date(s: &str) -> std::result::Result<Date, String> {
    Date::parse(s, time::macros::format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("'{s}' is not a valid YYYY-MM-DD date: {e}"))
}

/// Loads, runs, and queries historical market data ingestion jobs.
#[derive(Debug, Parser)]
#[clap(name = "ingestor", version, about)]
pub struct Cli {
    /// The subcommand to run.
    #[clap(subcommand)]
    pub command: Command,
}

/// The CLI's subcommands (§6).
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs one ingestion job end to end.
    Ingest(IngestArgs),
    /// Reads persisted data back out of storage.
    Query(QueryArgs),
    /// Lists the jobs declared in the jobs file.
    ListJobs {
        /// Path to the pipeline config file (system settings and jobs).
        #[clap(long, value_name = "FILE")]
        api: PathBuf,
    },
    /// Checks that the vendor API key and database are configured and
    /// reachable.
    Status,
}

/// Arguments for `ingest`.
#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Path to the pipeline config file (system settings and jobs).
    #[clap(long, value_name = "FILE")]
    pub api: Option<PathBuf>,
    /// Runs the named job from the jobs file instead of one assembled from
    /// the flags below.
    #[clap(long)]
    pub job: Option<String>,
    /// The vendor dataset code, e.g. `GLBX.MDP3`. Required without `--job`.
    #[clap(long)]
    pub dataset: Option<String>,
    /// The vendor schema code, e.g. `ohlcv-1d` or `trades`. Required
    /// without `--job`.
    #[clap(long)]
    pub schema: Option<String>,
    /// Symbols to ingest, comma-delimited or repeated. Required without
    /// `--job`.
    #[clap(long, value_delimiter = ',')]
    pub symbols: Vec<String>,
    /// How `--symbols` is interpreted by the vendor.
    #[clap(long = "stype-in", default_value = "continuous")]
    pub stype_in: String,
    /// Inclusive start date, `YYYY-MM-DD`. Required without `--job`.
    #[clap(long = "start-date", value_parser = parse_date)]
    pub start_date: Option<Date>,
    /// Inclusive end date, `YYYY-MM-DD`. Required without `--job`.
    #[clap(long = "end-date", value_parser = parse_date)]
    pub end_date: Option<Date>,
    /// Re-runs the job even if its chunks were already loaded.
    ///
    /// The storage loader's upsert is idempotent regardless; this flag only
    /// suppresses the "already run" operator confirmation prompt some
    /// deployments wire up around this CLI.
    #[clap(long)]
    pub force: bool,
}

/// Output format for `query`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// A human-readable aligned table.
    Table,
    /// Comma-separated values.
    Csv,
    /// Newline-delimited JSON, one compact JSON array per row.
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutputFormat::Table => "table",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        };
        f.write_str(s)
    }
}

/// Arguments for `query`.
#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Path to the pipeline config file, for database connection reuse.
    #[clap(long, value_name = "FILE")]
    pub api: Option<PathBuf>,
    /// The vendor schema code to read, e.g. `ohlcv-1d` or `trades`.
    #[clap(long)]
    pub schema: String,
    /// The dataset the symbols were ingested under.
    #[clap(long)]
    pub dataset: String,
    /// Symbols to read, comma-delimited or repeated.
    #[clap(long, value_delimiter = ',')]
    pub symbols: Vec<String>,
    /// Inclusive start date, `YYYY-MM-DD`.
    #[clap(long = "start-date", value_parser = parse_date)]
    pub start_date: Date,
    /// Inclusive end date, `YYYY-MM-DD`.
    #[clap(long = "end-date", value_parser = parse_date)]
    pub end_date: Date,
    /// How to render the result.
    #[clap(long = "output-format", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
    /// Writes the result to a file instead of standard output.
    #[clap(long = "output-file", value_name = "FILE")]
    pub output_file: Option<PathBuf>,
    /// Caps the number of rows returned.
    #[clap(long, default_value_t = 10_000)]
    pub limit: usize,
}

/// A system config file paired with the jobs and rule mappings it declares,
/// the shape read by `--api`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PipelineConfigFile {
    /// Retry, validation, and chunking defaults.
    pub system: SystemConfig,
    /// Named jobs available to `ingest --job` and `list-jobs`.
    pub jobs: Vec<JobConfig>,
    /// The rule engine's per-schema field mappings.
    pub rules: RuleEngineConfig,
}

impl Default for PipelineConfigFile {
    fn default() -> Self {
        Self {
            system: SystemConfig::default(),
            jobs: Vec::new(),
            rules: RuleEngineConfig::default(),
        }
    }
}

impl PipelineConfigFile {
    /// Loads a pipeline config file from `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read pipeline config {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("invalid pipeline config YAML in {}", path.display()))
    }

    /// Finds a job by name.
    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

/// Builds a [`JobConfig`] from `args`, either by looking up `--job` in
/// `config`'s jobs file or by assembling one from the explicit flags.
///
/// # Errors
/// Returns an error if neither `--job` nor the full set of explicit flags
/// was given, or if the named job isn't in the config file.
pub fn resolve_job(args: &IngestArgs, config: Option<&PipelineConfigFile>) -> Result<JobConfig> {
    if let Some(name) = &args.job {
        let config = config.context("--job requires --api to point at a pipeline config file")?;
        return config
            .job(name)
            .cloned()
            .with_context(|| format!("no job named '{name}' in the pipeline config file"));
    }

    let dataset = args.dataset.clone().context("--dataset is required without --job")?;
    let schema = args.schema.clone().context("--schema is required without --job")?;
    anyhow::ensure!(!args.symbols.is_empty(), "--symbols is required without --job");
    let start_date = args.start_date.context("--start-date is required without --job")?;
    let end_date = args.end_date.context("--end-date is required without --job")?;
    let symbol_type: SymbolType = args
        .stype_in
        .parse()
        .with_context(|| format!("--stype-in '{}' is not a recognized symbol type", args.stype_in))?;

    let job = JobConfig::new(
        format!("{dataset}-{schema}-adhoc"),
        "databento",
        dataset,
        schema,
        args.symbols.clone(),
        symbol_type,
        start_date,
        end_date,
    )?;
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn ingest_args_with_job(job: &str) -> IngestArgs {
        IngestArgs {
            api: None,
            job: Some(job.to_owned()),
            dataset: None,
            schema: None,
            symbols: vec![],
            stype_in: "continuous".to_owned(),
            start_date: None,
            end_date: None,
            force: false,
        }
    }

    #[test]
    fn resolve_job_looks_up_named_job_in_config() {
        let job = JobConfig::new(
            "nightly-es",
            "databento",
            "GLBX.MDP3",
            "ohlcv-1d",
            vec!["ES.c.0".to_owned()],
            SymbolType::Continuous,
            date!(2024 - 01 - 01),
            date!(2024 - 01 - 02),
        )
        .unwrap();
        let config = PipelineConfigFile {
            system: SystemConfig::default(),
            jobs: vec![job],
            rules: RuleEngineConfig::default(),
        };
        let resolved = resolve_job(&ingest_args_with_job("nightly-es"), Some(&config)).unwrap();
        assert_eq!(resolved.name, "nightly-es");
    }

    #[test]
    fn resolve_job_errors_when_job_not_found() {
        let config = PipelineConfigFile::default();
        let result = resolve_job(&ingest_args_with_job("missing"), Some(&config));
        assert!(result.is_err());
    }

    #[test]
    fn resolve_job_errors_without_job_or_api() {
        let result = resolve_job(&ingest_args_with_job("nightly-es"), None);
        assert!(result.is_err());
    }

    #[test]
    fn resolve_job_builds_adhoc_job_from_explicit_flags() {
        let args = IngestArgs {
            api: None,
            job: None,
            dataset: Some("GLBX.MDP3".to_owned()),
            schema: Some("trades".to_owned()),
            symbols: vec!["ES.c.0".to_owned()],
            stype_in: "continuous".to_owned(),
            start_date: Some(date!(2024 - 01 - 01)),
            end_date: Some(date!(2024 - 01 - 02)),
            force: false,
        };
        let resolved = resolve_job(&args, None).unwrap();
        assert_eq!(resolved.dataset, "GLBX.MDP3");
    }
}
