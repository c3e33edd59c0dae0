//! Orchestrator (C8, §4.7): drives one job chunk by chunk through fetch,
//! map, validate, and load, tracking each chunk's state and the job's
//! aggregate stats.
//!
//! Only a [`Disposition::Fatal`] error stops the job outright; every other
//! error a chunk produces is absorbed into a quarantine entry (or, if it
//! escapes [`Self::run_chunk`] unresolved, logged) and the job moves on to
//! the next chunk.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::adapter::{plan_chunks, DateChunk, DecodeFailure, VendorAdapter};
use crate::config::{JobConfig, SystemConfig};
use crate::error::{Disposition, Error, Result};
use crate::quarantine::{QuarantineEntry, QuarantineSink, QuarantineStage};
use crate::record::TypedRecord;
use crate::rules::{MapOutcome, RuleEngine};
use crate::standardized::StandardizedRecord;
use crate::storage::StorageLoader;
use crate::symbol_map::SymbolMap;
use crate::validate;

/// The state of one chunk as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Selected by [`plan_chunks`] but not yet started.
    Planned,
    /// Fetching raw records from the vendor adapter.
    Fetching,
    /// Mapping accepted records through the rule engine.
    Transforming,
    /// Checking business invariants and repairing symbols.
    Validating,
    /// Upserting standardized records into storage.
    Loading,
    /// Every record in the chunk loaded cleanly.
    Done,
    /// The chunk loaded, but with some records quarantined.
    QuarantinedPartial,
    /// The chunk could not be completed.
    Failed,
}

/// The overall status of a job run, rolled up from its chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Every chunk reached [`ChunkState::Done`].
    Done,
    /// At least one chunk quarantined records, but none failed outright.
    QuarantinedPartial,
    /// At least one chunk hit a fatal error and the job stopped.
    Failed,
}

/// Aggregate counters for a job run, returned by [`PipelineOrchestrator::run`].
#[derive(Debug, Clone)]
pub struct JobRunStats {
    /// Total chunks planned for this job.
    pub chunks_total: usize,
    /// Chunks that finished in [`ChunkState::Done`] or
    /// [`ChunkState::QuarantinedPartial`].
    pub chunks_completed: usize,
    /// Chunks that could not be completed at all.
    pub chunks_failed: usize,
    /// Records fetched from the vendor across every chunk.
    pub records_fetched: usize,
    /// Records successfully upserted into storage.
    pub records_loaded: usize,
    /// Records routed to the quarantine sink.
    pub records_quarantined: usize,
    /// The job's rolled-up status.
    pub status: JobStatus,
}

impl JobRunStats {
    fn new(chunks_total: usize) -> Self {
        Self {
            chunks_total,
            chunks_completed: 0,
            chunks_failed: 0,
            records_fetched: 0,
            records_loaded: 0,
            records_quarantined: 0,
            status: JobStatus::Done,
        }
    }

    fn absorb_chunk(&mut self, fetched: usize, loaded: usize, quarantined: usize) {
        self.chunks_completed += 1;
        self.records_fetched += fetched;
        self.records_loaded += loaded;
        self.records_quarantined += quarantined;
        if quarantined > 0 && self.status == JobStatus::Done {
            self.status = JobStatus::QuarantinedPartial;
        }
    }

    fn absorb_chunk_failure(&mut self) {
        self.chunks_failed += 1;
        if self.status == JobStatus::Done {
            self.status = JobStatus::QuarantinedPartial;
        }
    }
}

/// Drives a job's planned chunks through the pipeline in order, accumulating
/// [`JobRunStats`] and writing quarantine entries as records fail decode,
/// transform, validate, or load.
pub struct PipelineOrchestrator {
    adapter: Arc<dyn VendorAdapter>,
    rules: RuleEngine,
    quarantine: Arc<dyn QuarantineSink>,
    storage: StorageLoader,
    system: SystemConfig,
    symbol_map: Mutex<SymbolMap>,
}

impl PipelineOrchestrator {
    /// Wires together the adapter, rule engine, quarantine sink, storage
    /// loader, and symbol map that will drive every chunk of a job.
    pub fn new(
        adapter: Arc<dyn VendorAdapter>,
        rules: RuleEngine,
        quarantine: Arc<dyn QuarantineSink>,
        storage: StorageLoader,
        system: SystemConfig,
        symbol_map: SymbolMap,
    ) -> Self {
        Self {
            adapter,
            rules,
            quarantine,
            storage,
            system,
            symbol_map: Mutex::new(symbol_map),
        }
    }

    /// Runs every planned chunk of `job` in order, stopping only at the
    /// first chunk whose error is [`Disposition::Fatal`]; any other chunk
    /// error is logged and the job moves on to the next chunk.
    ///
    /// # Errors
    /// Propagates the triggering chunk's error once it is [`Disposition::Fatal`];
    /// the job is marked `Failed` and stops, per §4.7.
    pub async fn run(&self, job: &JobConfig) -> Result<JobRunStats> {
        let chunks = plan_chunks(job, job.effective_chunk_days(&self.system));
        let mut stats = JobRunStats::new(chunks.len());
        info!(job = %job.name, chunks = chunks.len(), "starting job");

        for chunk in chunks {
            match self.run_chunk(job, chunk).await {
                Ok((fetched, loaded, quarantined)) => {
                    stats.absorb_chunk(fetched, loaded, quarantined);
                }
                Err(e) if is_fatal(&e) => {
                    error!(job = %job.name, start = %chunk.start, end = %chunk.end, error = %e, "chunk failed fatally, stopping job");
                    stats.status = JobStatus::Failed;
                    return Err(e);
                }
                Err(e) => {
                    warn!(job = %job.name, start = %chunk.start, end = %chunk.end, error = %e, "chunk failed, continuing to next chunk");
                    stats.absorb_chunk_failure();
                }
            }
        }

        info!(job = %job.name, status = ?stats.status, "job finished");
        Ok(stats)
    }

    /// Runs one chunk through fetch, validate, map, and load.
    ///
    /// Returns `(fetched, loaded, quarantined)` record counts. Decode
    /// failures (§4.2 step 3), transform violations (§4.3), and load
    /// failures (§4.6/§7) are all quarantined here rather than propagated;
    /// only a [`Disposition::Fatal`] error (a bad job/symbol config, an
    /// exhausted error cap, or a cancellation) escapes this function.
    async fn run_chunk(&self, job: &JobConfig, chunk: DateChunk) -> Result<(usize, usize, usize)> {
        let raw = self.adapter.fetch_chunk(job, chunk).await?;
        let fetched = raw.records.len();
        let mut quarantined = 0;

        if !raw.decode_failures.is_empty() {
            quarantined += raw.decode_failures.len();
            self.write_decode_quarantine(job, &raw.decode_failures).await;
        }

        let outcome = validate::validate_batch(raw.records, &job.symbols, &self.system.validation)?;
        if !outcome.rejected.is_empty() {
            quarantined += outcome.rejected.len();
            self.write_quarantine(job, QuarantineStage::Validate, &outcome.rejected).await;
        }

        self.sync_symbol_map(job, &outcome.accepted).await;

        let (mapped, violations) = self.map_accepted(&outcome.accepted)?;
        if !violations.is_empty() {
            quarantined += violations.len();
            self.write_quarantine(job, QuarantineStage::Transform, &violations).await;
        }

        let loaded = if mapped.is_empty() {
            0
        } else {
            match self.storage.load_batch(&mapped).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    quarantined += mapped.len();
                    self.write_load_quarantine(job, &mapped, &e).await;
                    0
                }
            }
        };

        Ok((fetched, loaded, quarantined))
    }

    /// Upserts `(raw_symbol, instrument_id)` pairs observed on `accepted`
    /// into `instrument_mapping`, so `query`'s symbol-to-`instrument_id`
    /// lookup (§4.8) has something to resolve against. Every schema carries
    /// both fields once repaired, not just `Definition` records, so this
    /// keeps the mapping current a chunk at a time rather than waiting on a
    /// vendor reference-data refresh.
    async fn sync_symbol_map(&self, job: &JobConfig, accepted: &[TypedRecord]) {
        let mut map = self.symbol_map.lock().await;
        for record in accepted {
            let common = record.common();
            if let (Some(id), Some(symbol)) = (common.instrument_id, &common.symbol) {
                if let Err(e) = map.upsert(&job.dataset, id, symbol).await {
                    warn!(job = %job.name, symbol = %symbol, error = %e, "failed to upsert symbol mapping");
                }
            }
        }
    }

    /// Maps `accepted` through the rule engine, splitting into records that
    /// mapped cleanly and `(record, error)` pairs for transform violations
    /// that `global_settings.skip_validation_errors` allows to continue.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if no mapping is configured for a record's
    /// schema, and propagates a transform violation when
    /// `skip_validation_errors` is `false`, aborting the rest of this batch.
    fn map_accepted(
        &self,
        accepted: &[TypedRecord],
    ) -> Result<(Vec<StandardizedRecord>, Vec<(TypedRecord, Error)>)> {
        let mut mapped = Vec::with_capacity(accepted.len());
        let mut violations = Vec::new();
        for record in accepted {
            match self.rules.apply(record)? {
                MapOutcome::Mapped(standardized) => mapped.push(standardized),
                MapOutcome::Violated(error) => violations.push((record.clone(), error)),
            }
        }
        Ok((mapped, violations))
    }

    async fn write_decode_quarantine(&self, job: &JobConfig, failures: &[DecodeFailure]) {
        let now = time::OffsetDateTime::now_utc();
        let entries: Vec<QuarantineEntry> = failures
            .iter()
            .map(|f| {
                QuarantineEntry::new(&job.name, job.schema.clone(), QuarantineStage::Pydantic, f.raw.clone(), &f.error, now)
            })
            .collect();
        self.flush_quarantine(job, entries).await;
    }

    async fn write_quarantine(&self, job: &JobConfig, stage: QuarantineStage, rejected: &[(TypedRecord, Error)]) {
        let now = time::OffsetDateTime::now_utc();
        let entries: Vec<QuarantineEntry> = rejected
            .iter()
            .map(|(record, error)| QuarantineEntry::for_record(&job.name, stage, record, error, now))
            .collect();
        self.flush_quarantine(job, entries).await;
    }

    async fn write_load_quarantine(&self, job: &JobConfig, batch: &[StandardizedRecord], error: &Error) {
        let now = time::OffsetDateTime::now_utc();
        let entries: Vec<QuarantineEntry> = batch
            .iter()
            .map(|record| QuarantineEntry::for_standardized(&job.name, QuarantineStage::Load, record, error, now))
            .collect();
        self.flush_quarantine(job, entries).await;
    }

    async fn flush_quarantine(&self, job: &JobConfig, entries: Vec<QuarantineEntry>) {
        if let Err(e) = self.quarantine.write_batch(&entries).await {
            warn!(job = %job.name, error = %e, "failed to write quarantine entries");
        }
    }
}

/// Helper asserting an [`Error`]'s disposition at a call site that only
/// proceeds on a non-fatal classification.
pub fn is_fatal(error: &Error) -> bool {
    error.disposition() == Disposition::Fatal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_run_stats_starts_done_and_degrades_on_first_quarantine() {
        let mut stats = JobRunStats::new(3);
        assert_eq!(stats.status, JobStatus::Done);
        stats.absorb_chunk(10, 10, 0);
        assert_eq!(stats.status, JobStatus::Done);
        stats.absorb_chunk(10, 8, 2);
        assert_eq!(stats.status, JobStatus::QuarantinedPartial);
        assert_eq!(stats.chunks_completed, 2);
        assert_eq!(stats.records_loaded, 18);
    }

    #[test]
    fn a_failed_chunk_degrades_status_without_stopping_the_count() {
        let mut stats = JobRunStats::new(2);
        stats.absorb_chunk_failure();
        assert_eq!(stats.status, JobStatus::QuarantinedPartial);
        assert_eq!(stats.chunks_failed, 1);
    }

    #[test]
    fn is_fatal_matches_the_error_disposition_table() {
        assert!(is_fatal(&Error::Config("x".to_owned())));
        assert!(!is_fatal(&Error::VendorRequest {
            status: 503,
            body: String::new(),
        }));
        assert!(!is_fatal(&Error::Transform {
            rule_name: "r".to_owned(),
            detail: "d".to_owned(),
        }));
    }
}
