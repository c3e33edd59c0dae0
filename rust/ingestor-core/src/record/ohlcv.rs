use rust_decimal::Decimal;

use crate::enums::{Granularity, Schema};
use crate::record::{Record, RecordCommon};

/// Open, high, low, close, and volume over a fixed interval.
///
/// Invariant (§3, checked by [`crate::validate`]): `high >= max(open, close,
/// low)`, `low <= min(open, close, high)`, `volume >= 0`.
///
/// Unlike the other record types, `Ohlcv`'s schema depends on its
/// [`Granularity`] field, so [`Record`] is implemented by hand rather than
/// derived.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Ohlcv {
    /// Fields shared by every record.
    pub common: RecordCommon,
    /// The bar width.
    pub granularity: Granularity,
    /// The opening price of the interval.
    pub open: Decimal,
    /// The highest trade price of the interval.
    pub high: Decimal,
    /// The lowest trade price of the interval.
    pub low: Decimal,
    /// The closing price of the interval.
    pub close: Decimal,
    /// The total traded volume of the interval. Never negative.
    pub volume: u64,
    /// The number of individual trades that made up the bar, when the
    /// vendor provides it.
    pub trade_count: Option<i64>,
}

impl Record for Ohlcv {
    fn schema(&self) -> Schema {
        Schema::Ohlcv(self.granularity)
    }

    fn common(&self) -> &RecordCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut RecordCommon {
        &mut self.common
    }
}

impl Ohlcv {
    /// Checks the §3/§4.4 OHLCV business invariants.
    pub fn is_consistent(&self) -> bool {
        self.open > Decimal::ZERO
            && self.high > Decimal::ZERO
            && self.low > Decimal::ZERO
            && self.close > Decimal::ZERO
            && self.high >= self.open.max(self.close).max(self.low)
            && self.low <= self.open.min(self.close).min(self.high)
    }

    /// The natural key used to deduplicate on upsert: `(instrument_id,
    /// ts_event, granularity)`.
    pub fn natural_key(&self) -> Option<(u32, time::OffsetDateTime, Granularity)> {
        self.common
            .instrument_id
            .map(|id| (id, self.common.ts_event, self.granularity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_ts;
    use rust_decimal_macros::dec;

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Ohlcv {
        Ohlcv {
            common: RecordCommon::new(sample_ts()),
            granularity: Granularity::Day1,
            open,
            high,
            low,
            close,
            volume: 100,
            trade_count: Some(12),
        }
    }

    #[test]
    fn consistent_bar_passes() {
        let bar = bar(dec!(10), dec!(12), dec!(9), dec!(11));
        assert!(bar.is_consistent());
    }

    #[test]
    fn high_below_close_is_rejected() {
        let bar = bar(dec!(10), dec!(10.5), dec!(9), dec!(11));
        assert!(!bar.is_consistent());
    }

    #[test]
    fn low_above_open_is_rejected() {
        let bar = bar(dec!(10), dec!(12), dec!(10.5), dec!(11));
        assert!(!bar.is_consistent());
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let bar = bar(dec!(0), dec!(12), dec!(9), dec!(11));
        assert!(!bar.is_consistent());
    }
}
