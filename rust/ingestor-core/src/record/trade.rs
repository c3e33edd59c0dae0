use rust_decimal::Decimal;

use crate::enums::{Schema, Side};
use crate::record::{Record, RecordCommon};

/// A single trade print (§3).
#[derive(Debug, Clone, PartialEq, ingestor_macros::SchemaRecord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[schema_record(schema = "trades")]
pub struct Trade {
    /// Fields shared by every record.
    pub common: RecordCommon,
    /// The trade price.
    pub price: Decimal,
    /// The trade size. Never negative.
    pub size: u64,
    /// The aggressor side, when the vendor publishes it.
    pub side: Side,
    /// A vendor-assigned sequence number, used to detect vendor-side
    /// duplicate publication independent of `ts_event`.
    pub sequence: Option<u64>,
    /// The book level this print was matched at, when the vendor publishes
    /// depth-of-book trade data. `None` for top-of-book-only schemas.
    pub depth: Option<u32>,
}

impl Trade {
    /// Checks the §3/§4.4 trade business invariants: a positive price and a
    /// non-zero size.
    pub fn is_consistent(&self) -> bool {
        self.price > Decimal::ZERO && self.size > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_ts;
    use rust_decimal_macros::dec;

    #[test]
    fn zero_size_trade_is_rejected() {
        let trade = Trade {
            common: RecordCommon::new(sample_ts()),
            price: dec!(100),
            size: 0,
            side: Side::Bid,
            sequence: Some(1),
            depth: None,
        };
        assert!(!trade.is_consistent());
    }

    #[test]
    fn schema_is_trades() {
        let trade = Trade {
            common: RecordCommon::new(sample_ts()),
            price: dec!(100),
            size: 1,
            side: Side::Ask,
            sequence: None,
            depth: Some(0),
        };
        assert_eq!(trade.schema(), Schema::Trades);
    }
}
