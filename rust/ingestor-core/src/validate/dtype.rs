//! Symbol repair (§4.2, §4.4): some vendor payloads omit `symbol` on
//! per-record data and only carry it on the request envelope. When a job
//! requests exactly one raw symbol, a record missing its own symbol can be
//! repaired unambiguously; with more than one, repair would guess, so it is
//! left to fail symbol resolution instead.

use crate::record::TypedRecord;

/// Fills in `record`'s `symbol` from `requested_symbols` if it is missing
/// and exactly one symbol was requested. No-op otherwise.
pub fn repair_symbol(record: &mut TypedRecord, requested_symbols: &[String]) {
    let common = record.common_mut();
    if common.symbol.is_none() {
        if let [only] = requested_symbols {
            common.symbol = Some(only.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_common;
    use crate::record::{Ohlcv, Trade};
    use crate::enums::{Granularity, Side};
    use rust_decimal_macros::dec;

    fn bare_trade() -> TypedRecord {
        let mut common = sample_common(1, "ES.c.0");
        common.symbol = None;
        TypedRecord::Trade(Trade {
            common,
            price: dec!(1),
            size: 1,
            side: Side::Bid,
            sequence: None,
            depth: None,
        })
    }

    #[test]
    fn repairs_symbol_when_job_has_exactly_one() {
        let mut record = bare_trade();
        repair_symbol(&mut record, &["ES.c.0".to_owned()]);
        assert_eq!(record.common().symbol.as_deref(), Some("ES.c.0"));
    }

    #[test]
    fn does_not_guess_with_multiple_symbols() {
        let mut record = bare_trade();
        repair_symbol(&mut record, &["ES.c.0".to_owned(), "NQ.c.0".to_owned()]);
        assert!(record.common().symbol.is_none());
    }

    #[test]
    fn leaves_present_symbol_untouched() {
        let mut record = TypedRecord::Ohlcv(Ohlcv {
            common: sample_common(1, "ES.c.0"),
            granularity: Granularity::Day1,
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: 1,
            trade_count: None,
        });
        repair_symbol(&mut record, &[]);
        assert_eq!(record.common().symbol.as_deref(), Some("ES.c.0"));
    }
}
