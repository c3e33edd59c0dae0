//! Vendor Adapter (C3, §4.1): fetches raw records for one date chunk of a
//! job and decodes them into [`TypedRecord`]s, with retry and chunk
//! planning shared across vendors.

pub mod chunk;
pub mod databento;
pub mod decode;
pub mod retry;

pub use chunk::{plan_chunks, DateChunk};
pub use retry::{execute_with_retry, Attempt};

use async_trait::async_trait;

use crate::config::JobConfig;
use crate::error::{Error, Result};
use crate::record::TypedRecord;

/// One raw vendor line that failed to decode, kept verbatim so it can be
/// quarantined (stage=pydantic, §4.2 step 3) without aborting the rest of
/// the chunk.
pub struct DecodeFailure {
    /// The raw vendor line (or other record snapshot) that failed to decode.
    pub raw: String,
    /// The decode error.
    pub error: Error,
}

/// The result of fetching one date chunk: every record that decoded
/// cleanly, plus every line that didn't.
#[derive(Default)]
pub struct FetchOutcome {
    /// Records decoded successfully, in vendor response order.
    pub records: Vec<TypedRecord>,
    /// Lines that failed to decode, each paired with its error.
    pub decode_failures: Vec<DecodeFailure>,
}

/// A vendor-specific client capable of fetching one date chunk of a job.
///
/// Implementors own their own HTTP client, authentication, and retry/backoff
/// policy; [`crate::orchestrator::PipelineOrchestrator`] only calls
/// [`VendorAdapter::fetch_chunk`] once per planned [`DateChunk`].
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    /// Fetches every record for `job`'s symbols within `chunk`, decoding
    /// each line independently: one malformed record is collected into
    /// [`FetchOutcome::decode_failures`] rather than aborting the fetch.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::VendorRequest`] or
    /// [`crate::error::Error::TransientIo`] if the vendor call itself
    /// ultimately fails.
    async fn fetch_chunk(&self, job: &JobConfig, chunk: DateChunk) -> Result<FetchOutcome>;
}
