use std::fs::File;
use std::io::{self, BufWriter, Write as _};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use ingestor_core::adapter::databento::DatabentoAdapter;
use ingestor_core::enums::Schema;
use ingestor_core::error::UserFacing;
use ingestor_core::orchestrator::PipelineOrchestrator;
use ingestor_core::query::QueryEngine;
use ingestor_core::quarantine::FileQuarantineSink;
use ingestor_core::rules::RuleEngine;
use ingestor_core::storage::StorageLoader;
use ingestor_core::symbol_map::SymbolMap;
use ingestor_core::SystemConfig;
use ingestor_cli::{resolve_job, Cli, Command, IngestArgs, OutputFormat, PipelineConfigFile, QueryArgs};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest(args) => ingest(args).await,
        Command::Query(args) => query(args).await,
        Command::ListJobs { api } => list_jobs(api),
        Command::Status => status().await,
    }
}

async fn ingest(args: IngestArgs) -> Result<()> {
    let pipeline_config = args
        .api
        .as_ref()
        .map(PipelineConfigFile::load)
        .transpose()?;
    let job = resolve_job(&args, pipeline_config.as_ref())?;
    let system = pipeline_config
        .as_ref()
        .map(|c| c.system.clone())
        .unwrap_or_default();
    let rules = pipeline_config
        .map(|c| c.rules)
        .unwrap_or_default();

    let pool = connect_pool().await?;
    let storage = StorageLoader::new(pool.clone());
    storage
        .ensure_schema()
        .await
        .context("could not ensure target schema exists")?;

    let api_key = SystemConfig::api_key_from_env().map_err(|e| anyhow::anyhow!("{}", UserFacing(&e)))?;
    let adapter = Arc::new(DatabentoAdapter::new(api_key, system.retry.clone()));
    let quarantine = Arc::new(FileQuarantineSink::new(system.quarantine_dir.clone()));
    let rule_engine = RuleEngine::new(rules, system.validation.strict_mode)
        .map_err(|e| anyhow::anyhow!("{}", UserFacing(&e)))?;
    let symbol_map = SymbolMap::new(pool);

    let orchestrator =
        PipelineOrchestrator::new(adapter, rule_engine, quarantine, storage, system, symbol_map);
    let stats = orchestrator
        .run(&job)
        .await
        .map_err(|e| anyhow::anyhow!("{}", UserFacing(&e)))?;

    println!(
        "job '{}' finished: {:?} ({}/{} chunks, {} fetched, {} loaded, {} quarantined)",
        job.name,
        stats.status,
        stats.chunks_completed,
        stats.chunks_total,
        stats.records_fetched,
        stats.records_loaded,
        stats.records_quarantined,
    );
    Ok(())
}

async fn query(args: QueryArgs) -> Result<()> {
    let pool = connect_pool().await?;
    let engine = QueryEngine::new(pool);
    let schema = Schema::from_str(&args.schema).map_err(|e| anyhow::anyhow!("{}", UserFacing(&e)))?;

    let resolved = engine
        .resolve_symbols(&args.dataset, &args.symbols)
        .await
        .map_err(|e| anyhow::anyhow!("{}", UserFacing(&e)))?;
    let missing: Vec<&String> = args.symbols.iter().filter(|s| !resolved.contains_key(s.as_str())).collect();
    anyhow::ensure!(
        missing.is_empty(),
        "unknown symbol(s): {}",
        missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
    );

    let start = args.start_date.midnight().assume_utc();
    let end = args
        .end_date
        .next_day()
        .unwrap_or(args.end_date)
        .midnight()
        .assume_utc()
        - time::Duration::nanoseconds(1);

    let mut rows = Vec::new();
    for instrument_id in resolved.values() {
        let mut chunk = engine
            .query(&schema, *instrument_id as i32, start, end)
            .await
            .map_err(|e| anyhow::anyhow!("{}", UserFacing(&e)))?;
        rows.append(&mut chunk);
        if rows.len() >= args.limit {
            break;
        }
    }
    rows.truncate(args.limit);

    let columns = ingestor_core::storage::table_def(&schema)
        .columns
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();

    let mut out: Box<dyn io::Write> = match &args.output_file {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("could not create output file {}", path.display())
        })?)),
        None => Box::new(io::stdout().lock()),
    };

    render(&mut *out, &columns, &rows, args.output_format)?;
    Ok(())
}

fn render(
    out: &mut dyn io::Write,
    columns: &[&str],
    rows: &[ingestor_core::query::QueryRow],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(columns)?;
            for row in rows {
                writer.write_record(row.to_csv_fields(columns))?;
            }
            writer.flush()?;
        }
        OutputFormat::Json => {
            for row in rows {
                let fields = row.to_csv_fields(columns);
                writeln!(out, "{}", serde_json::to_string(&fields)?)?;
            }
        }
        OutputFormat::Table => {
            writeln!(out, "{}", columns.join("\t"))?;
            for row in rows {
                writeln!(out, "{}", row.to_csv_fields(columns).join("\t"))?;
            }
        }
    }
    Ok(())
}

fn list_jobs(api: std::path::PathBuf) -> Result<()> {
    let config = PipelineConfigFile::load(&api)?;
    if config.jobs.is_empty() {
        println!("no jobs configured in {}", api.display());
        return Ok(());
    }
    for job in &config.jobs {
        println!(
            "{}\t{}\t{}\t{}..{}",
            job.name, job.dataset, job.schema, job.start_date, job.end_date
        );
    }
    Ok(())
}

async fn status() -> Result<()> {
    let mut healthy = true;

    match SystemConfig::api_key_from_env() {
        Ok(_) => println!("vendor API key: configured"),
        Err(e) => {
            healthy = false;
            println!("vendor API key: {}", UserFacing(&e));
        }
    }

    match connect_pool().await {
        Ok(pool) => {
            match sqlx::query("SELECT 1").execute(&pool).await {
                Ok(_) => println!("database: reachable"),
                Err(e) => {
                    healthy = false;
                    println!("database: unreachable ({e})");
                }
            }
        }
        Err(e) => {
            healthy = false;
            println!("database: {e}");
        }
    }

    anyhow::ensure!(healthy, "one or more dependencies are unhealthy");
    Ok(())
}

async fn connect_pool() -> Result<sqlx::PgPool> {
    let url = SystemConfig::database_url_from_env().map_err(|e| anyhow::anyhow!("{}", UserFacing(&e)))?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .context("could not connect to the database")
}
