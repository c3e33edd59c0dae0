//! Schema Validator (C5, §4.4): per-record business invariant checks and
//! symbol repair, with a batch-level error cap that turns into a fatal
//! abort rather than quarantining without limit.

pub mod checks;
pub mod dtype;

pub use checks::check_record;
pub use dtype::repair_symbol;

use crate::config::ValidationConfig;
use crate::error::{Error, Result};
use crate::record::TypedRecord;

/// The outcome of validating one batch: records that passed, and records
/// that were rejected along with the error that rejected them.
pub struct BatchOutcome {
    /// Records that passed every check, in their original order.
    pub accepted: Vec<TypedRecord>,
    /// Records that failed a check, paired with the failing error, for the
    /// quarantine sink.
    pub rejected: Vec<(TypedRecord, Error)>,
}

/// Repairs symbols, checks business invariants, and splits `records` into
/// accepted and rejected, enforcing `config.max_errors_per_batch`.
///
/// # Errors
/// Returns [`Error::FatalCap`] if the number of rejected records exceeds
/// `config.max_errors_per_batch`.
pub fn validate_batch(
    mut records: Vec<TypedRecord>,
    requested_symbols: &[String],
    config: &ValidationConfig,
) -> Result<BatchOutcome> {
    let batch_size = records.len();
    let mut accepted = Vec::with_capacity(batch_size);
    let mut rejected = Vec::new();

    for mut record in records.drain(..) {
        dtype::repair_symbol(&mut record, requested_symbols);
        match checks::check_record(&record) {
            Ok(()) => accepted.push(record),
            Err(e) => rejected.push((record, e)),
        }
        if !config.quarantine_enabled && !rejected.is_empty() {
            let (_, e) = rejected.pop().unwrap();
            return Err(e);
        }
        if rejected.len() > config.max_errors_per_batch {
            return Err(Error::FatalCap {
                errors: rejected.len(),
                batch_size,
                max: config.max_errors_per_batch,
            });
        }
    }
    Ok(BatchOutcome { accepted, rejected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_records;

    #[test]
    fn accepts_every_sample_record() {
        let outcome =
            validate_batch(sample_records(), &["ES.c.0".to_owned()], &ValidationConfig::default())
                .unwrap();
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.accepted.len(), sample_records().len());
    }

    #[test]
    fn exceeding_the_cap_is_fatal() {
        let mut records = sample_records();
        let TypedRecord::Ohlcv(mut bad) = records.remove(0) else {
            panic!("expected ohlcv");
        };
        bad.high = bad.low;
        let all_bad: Vec<_> = std::iter::repeat_with(|| TypedRecord::Ohlcv(bad.clone()))
            .take(3)
            .collect();
        let config = ValidationConfig {
            max_errors_per_batch: 1,
            ..ValidationConfig::default()
        };
        let result = validate_batch(all_bad, &[], &config);
        assert!(matches!(result, Err(Error::FatalCap { .. })));
    }

    #[test]
    fn disabling_quarantine_fails_fast_on_first_bad_record() {
        let mut records = sample_records();
        let TypedRecord::Ohlcv(mut bad) = records.remove(0) else {
            panic!("expected ohlcv");
        };
        bad.high = bad.low;
        let config = ValidationConfig {
            quarantine_enabled: false,
            ..ValidationConfig::default()
        };
        let result = validate_batch(vec![TypedRecord::Ohlcv(bad)], &[], &config);
        assert!(matches!(result, Err(Error::Validate { .. })));
    }
}
