//! Quarantine Sink (C6, §4.5): where rejected records go instead of
//! aborting the job, and how long they are kept.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::record::TypedRecord;
use crate::standardized::StandardizedRecord;

/// Which pipeline stage rejected a record, per §3/§7's propagation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineStage {
    /// Rejected while decoding a raw vendor record into a [`TypedRecord`].
    Pydantic,
    /// Rejected by a Rule Engine transformation (§4.3).
    Transform,
    /// Rejected by the Schema Validator's business checks (§4.4).
    Validate,
    /// Rejected (batch rolled back) by the Storage Loader (§4.6).
    Load,
}

/// One rejected record, serialized for the quarantine sink.
#[derive(Debug, Clone, Serialize)]
pub struct QuarantineEntry {
    /// The job that produced this record.
    pub job_name: String,
    /// The schema the record belonged to.
    pub schema: String,
    /// The stage of the pipeline that rejected this record.
    pub stage: QuarantineStage,
    /// The name of the violated rule, when the rejecting error carries one.
    pub rule_name: Option<String>,
    /// The violated rule or error kind's message.
    pub reason: String,
    /// The record's fields, rendered as a debug string.
    ///
    /// Kept as text rather than re-serializing [`TypedRecord`] field-by-field:
    /// a quarantine entry exists so a human can inspect why a record was
    /// rejected, not to be replayed back into the pipeline automatically.
    pub record_debug: String,
    /// When this entry was quarantined.
    #[serde(with = "time::serde::rfc3339")]
    pub quarantined_at: OffsetDateTime,
}

impl QuarantineEntry {
    /// Builds an entry from an already-rendered record snapshot, the stage
    /// that rejected it, and the error that rejected it. The general-purpose
    /// constructor: decode failures have no [`TypedRecord`] to snapshot (the
    /// decode itself is what failed), so they build one directly from the
    /// raw vendor line via this constructor rather than [`Self::for_record`].
    pub fn new(
        job_name: &str,
        schema: impl Into<String>,
        stage: QuarantineStage,
        record_debug: impl Into<String>,
        error: &Error,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            job_name: job_name.to_owned(),
            schema: schema.into(),
            stage,
            rule_name: rule_name_of(error),
            reason: error.to_string(),
            record_debug: record_debug.into(),
            quarantined_at: now,
        }
    }

    /// Builds an entry from a rejected [`TypedRecord`] and the error that
    /// rejected it, at `stage`.
    pub fn for_record(
        job_name: &str,
        stage: QuarantineStage,
        record: &TypedRecord,
        error: &Error,
        now: OffsetDateTime,
    ) -> Self {
        Self::new(job_name, record.schema().code(), stage, format!("{record:?}"), error, now)
    }

    /// Builds an entry from a rejected, already-mapped [`StandardizedRecord`]
    /// and the error that rejected it, at `stage` (used by load-failure
    /// quarantining, where the original [`TypedRecord`] is no longer held).
    pub fn for_standardized(
        job_name: &str,
        stage: QuarantineStage,
        record: &StandardizedRecord,
        error: &Error,
        now: OffsetDateTime,
    ) -> Self {
        Self::new(job_name, record.schema.code(), stage, format!("{record:?}"), error, now)
    }
}

fn rule_name_of(error: &Error) -> Option<String> {
    match error {
        Error::Transform { rule_name, .. } | Error::Validate { rule_name, .. } => {
            Some(rule_name.clone())
        }
        _ => None,
    }
}

/// Where quarantined records are written.
///
/// Implementors decide the physical sink (file, object store, a quarantine
/// table); the orchestrator only ever calls [`QuarantineSink::write_batch`]
/// once per chunk and [`QuarantineSink::prune`] between jobs.
#[async_trait]
pub trait QuarantineSink: Send + Sync {
    /// Persists `entries`, produced by one chunk's validation pass.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the sink itself cannot be written to.
    async fn write_batch(&self, entries: &[QuarantineEntry]) -> Result<()>;

    /// Deletes entries older than `retention_days`, relative to `today`.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if pruning fails.
    async fn prune(&self, retention_days: u32, today: Date) -> Result<()>;
}

/// The default quarantine sink: one newline-delimited JSON file per job per
/// day, under `<base_dir>/<job_name>/<date>.ndjson`.
pub struct FileQuarantineSink {
    base_dir: PathBuf,
}

impl FileQuarantineSink {
    /// Creates a sink rooted at `base_dir` (typically
    /// [`crate::config::SystemConfig::quarantine_dir`]).
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn day_path(&self, job_name: &str, day: Date) -> PathBuf {
        self.base_dir.join(job_name).join(format!("{day}.ndjson"))
    }
}

#[async_trait]
impl QuarantineSink for FileQuarantineSink {
    async fn write_batch(&self, entries: &[QuarantineEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        for entry in entries {
            let day = entry.quarantined_at.date();
            let path = self.day_path(&entry.job_name, day);
            append_line(&path, entry)?;
        }
        info!(count = entries.len(), "wrote quarantine entries");
        Ok(())
    }

    async fn prune(&self, retention_days: u32, today: Date) -> Result<()> {
        let cutoff = today - time::Duration::days(retention_days as i64);
        let Ok(job_dirs) = fs::read_dir(&self.base_dir) else {
            return Ok(());
        };
        for job_dir in job_dirs.flatten() {
            let Ok(files) = fs::read_dir(job_dir.path()) else {
                continue;
            };
            for file in files.flatten() {
                if let Some(day) = file_day(&file.path()) {
                    if day < cutoff {
                        if let Err(e) = fs::remove_file(file.path()) {
                            warn!(path = %file.path().display(), error = %e, "failed to prune quarantine file");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn append_line(path: &Path, entry: &QuarantineEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("could not create quarantine dir: {e}")))?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::Config(format!("could not open quarantine file: {e}")))?;
    let line = serde_json::to_string(entry)
        .map_err(|e| Error::Config(format!("could not serialize quarantine entry: {e}")))?;
    writeln!(file, "{line}").map_err(|e| Error::Config(format!("could not write quarantine file: {e}")))
}

fn file_day(path: &Path) -> Option<Date> {
    let stem = path.file_stem()?.to_str()?;
    Date::parse(stem, time::macros::format_description!("[year]-[month]-[day]")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_common, sample_ts};
    use crate::record::{Ohlcv, TypedRecord};
    use crate::enums::Granularity;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn sample_entry(job_name: &str, now: OffsetDateTime) -> QuarantineEntry {
        let record = TypedRecord::Ohlcv(Ohlcv {
            common: sample_common(1, "ES.c.0"),
            granularity: Granularity::Day1,
            open: dec!(1),
            high: dec!(2),
            low: dec!(1),
            close: dec!(1),
            volume: 1,
            trade_count: None,
        });
        QuarantineEntry::for_record(job_name, QuarantineStage::Validate, &record, &Error::Validate {
            rule_name: "ohlcv_consistency".to_owned(),
            detail: "test".to_owned(),
        }, now)
    }

    #[tokio::test]
    async fn write_batch_creates_one_file_per_day() {
        let dir = tempdir().unwrap();
        let sink = FileQuarantineSink::new(dir.path());
        let entries = vec![sample_entry("job1", sample_ts())];
        sink.write_batch(&entries).await.unwrap();
        let path = sink.day_path("job1", sample_ts().date());
        assert!(path.exists());
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[tokio::test]
    async fn write_batch_is_a_noop_for_empty_input() {
        let dir = tempdir().unwrap();
        let sink = FileQuarantineSink::new(dir.path());
        sink.write_batch(&[]).await.unwrap();
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn prune_removes_files_older_than_retention() {
        let dir = tempdir().unwrap();
        let sink = FileQuarantineSink::new(dir.path());
        let old_day = sample_ts().date() - time::Duration::days(60);
        let old_entry = sample_entry("job1", sample_ts().replace_date(old_day));
        sink.write_batch(&[old_entry]).await.unwrap();
        let recent_entry = sample_entry("job1", sample_ts());
        sink.write_batch(&[recent_entry]).await.unwrap();

        sink.prune(30, sample_ts().date()).await.unwrap();

        assert!(!sink.day_path("job1", old_day).exists());
        assert!(sink.day_path("job1", sample_ts().date()).exists());
    }
}
