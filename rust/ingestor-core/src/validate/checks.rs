//! Per-schema business invariant checks (§3, §4.4), dispatched over a
//! [`TypedRecord`] by delegating to each record type's own `is_consistent`.

use crate::error::{Error, Result};
use crate::record::{methods::require_utc, TypedRecord};

/// Checks that `record` is UTC-normalized and satisfies its schema's
/// business invariants.
///
/// # Errors
/// Returns [`Error::Validate`] describing the first invariant violated.
pub fn check_record(record: &TypedRecord) -> Result<()> {
    let schema_code = record.schema().code();
    require_utc(record.common().ts_event, &schema_code).map_err(|_| Error::Validate {
        rule_name: "utc_normalized".to_owned(),
        detail: format!("{} ts_event is not UTC-normalized", schema_code),
    })?;

    let consistent = match record {
        TypedRecord::Ohlcv(bar) => bar.is_consistent(),
        TypedRecord::Trade(trade) => trade.is_consistent(),
        TypedRecord::Tbbo(tbbo) => tbbo.is_consistent(),
        TypedRecord::Statistic(stat) => stat.is_consistent(),
        TypedRecord::Definition(def) => def.is_consistent(),
    };
    if consistent {
        Ok(())
    } else {
        Err(Error::Validate {
            rule_name: format!("{schema_code}_consistency"),
            detail: "record failed its schema's business invariant check".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_records;

    #[test]
    fn every_sample_record_passes() {
        for record in sample_records() {
            check_record(&record).unwrap();
        }
    }

    #[test]
    fn inconsistent_ohlcv_bar_fails() {
        let mut records = sample_records();
        let TypedRecord::Ohlcv(bar) = records.remove(0) else {
            panic!("expected ohlcv first");
        };
        let mut bad = bar;
        bad.high = bad.low;
        assert!(check_record(&TypedRecord::Ohlcv(bad)).is_err());
    }
}
