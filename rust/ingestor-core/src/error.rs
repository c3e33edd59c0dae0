//! The error kinds that can occur anywhere in the ingestion pipeline.

use std::fmt;

/// A result alias using this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The disposition of an [`Error`]: whether the pipeline can recover locally,
/// route the offending record to quarantine and continue, or must abort the
/// job with a non-zero exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Recovered internally (e.g. a retried transient I/O error).
    Recovered,
    /// The triggering record was quarantined; the pipeline continues.
    Quarantined,
    /// The job is marked `FAILED` and exits non-zero.
    Fatal,
}

/// Errors that can occur while loading configuration, fetching from the
/// vendor, mapping and validating records, or loading into storage.
///
/// Each variant corresponds to one row of the error-kind table in the
/// ingestion spec (§7): [`Error::Config`] and [`Error::Auth`] are always
/// fatal at load time, [`Error::Decode`]/[`Error::Transform`]/[`Error::Validate`]
/// are recovered by quarantining, [`Error::Load`] rolls back its batch and
/// quarantines it, and [`Error::FatalCap`]/[`Error::Cancelled`] terminate the
/// job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing key, invalid YAML, or a rule/mapping referencing an unknown
    /// target column. Fatal at config-load time.
    #[error("configuration error: {0}")]
    Config(String),

    /// The vendor rejected the request's credentials.
    #[error("vendor authentication failed: {0}")]
    Auth(String),

    /// A transient network condition (connection reset, timeout, or a status
    /// in `retry.retry_on_status`) that was not resolved within
    /// `retry.max_attempts`.
    #[error("transient I/O error after {attempts} attempts: {source}")]
    TransientIo {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The vendor returned a non-retryable HTTP status.
    #[error("vendor request failed with status {status}: {body}")]
    VendorRequest {
        /// The HTTP status code returned by the vendor.
        status: u16,
        /// The response body, if any, truncated for display.
        body: String,
    },

    /// A raw vendor record could not be decoded into a [`crate::record::TypedRecord`].
    #[error("failed to decode record for schema {schema}: {detail}")]
    Decode {
        /// The schema being decoded.
        schema: String,
        /// A human-readable description of the decode failure.
        detail: String,
    },

    /// A field mapping or declarative rule was violated while transforming a
    /// record into a [`crate::standardized::StandardizedRecord`].
    #[error("transform rule '{rule_name}' violated: {detail}")]
    Transform {
        /// The name of the violated rule.
        rule_name: String,
        /// A human-readable description of the violation.
        detail: String,
    },

    /// A business-rule or dtype-coercion check failed during validation.
    #[error("validation rule '{rule_name}' violated: {detail}")]
    Validate {
        /// The name of the violated rule.
        rule_name: String,
        /// A human-readable description of the violation.
        detail: String,
    },

    /// A storage-layer error: a dialect error or a natural-key constraint
    /// violation. The triggering batch is rolled back and quarantined.
    #[error("storage load failed: {0}")]
    Load(#[source] sqlx::Error),

    /// A symbol could not be resolved to an `instrument_id` via the
    /// `instrument_mapping` table.
    #[error("could not resolve symbol(s): {0:?}")]
    SymbolResolution(Vec<String>),

    /// The number of quarantined records in a batch exceeded
    /// `validation.max_errors_per_batch`; the job is marked `FAILED`.
    #[error("error cap exceeded: {errors} errors in a batch of {batch_size} (max {max})")]
    FatalCap {
        /// The number of errors observed.
        errors: usize,
        /// The size of the offending batch.
        batch_size: usize,
        /// The configured cap.
        max: usize,
    },

    /// A user cancel signal or job-level timeout interrupted the run at a
    /// suspension point. No partial chunk writes are observable.
    #[error("job cancelled")]
    Cancelled,
}

impl Error {
    /// Returns how this error should be handled by the component that
    /// observed it, per the disposition table in §7 of the spec.
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::Config(_) | Error::Auth(_) | Error::FatalCap { .. } => Disposition::Fatal,
            Error::Cancelled => Disposition::Fatal,
            Error::Decode { .. } | Error::Transform { .. } | Error::Validate { .. } => {
                Disposition::Quarantined
            }
            Error::Load(_) => Disposition::Quarantined,
            Error::TransientIo { .. } | Error::VendorRequest { .. } => Disposition::Recovered,
            Error::SymbolResolution(_) => Disposition::Fatal,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Load(e)
    }
}

/// A terse, operator-facing rendering of an [`Error`] suitable for CLI
/// output; internals like SQL text or backtraces are left out and should be
/// logged separately via `tracing`.
pub struct UserFacing<'a>(pub &'a Error);

impl fmt::Display for UserFacing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Auth(_) => write!(f, "authentication failed; check DATABENTO_API_KEY"),
            Error::SymbolResolution(symbols) => {
                write!(f, "unknown symbol(s): {}", symbols.join(", "))
            }
            Error::FatalCap { errors, max, .. } => {
                write!(f, "too many validation errors ({errors} > {max})")
            }
            Error::Cancelled => write!(f, "cancelled"),
            other => write!(f, "{other}"),
        }
    }
}
