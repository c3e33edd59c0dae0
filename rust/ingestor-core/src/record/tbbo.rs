use rust_decimal::Decimal;

use crate::enums::Side;
use crate::record::RecordCommon;

/// A trade print paired with the best bid/offer immediately preceding it (§3).
#[derive(Debug, Clone, PartialEq, ingestor_macros::SchemaRecord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[schema_record(schema = "tbbo")]
pub struct Tbbo {
    /// Fields shared by every record.
    pub common: RecordCommon,
    /// The trade price.
    pub price: Decimal,
    /// The trade size. Never negative.
    pub size: u64,
    /// The aggressor side.
    pub side: Side,
    /// The best bid price at event time, if resting liquidity existed.
    pub bid_price: Option<Decimal>,
    /// The best bid size at event time.
    pub bid_size: Option<u64>,
    /// The best ask price at event time, if resting liquidity existed.
    pub ask_price: Option<Decimal>,
    /// The best ask size at event time.
    pub ask_size: Option<u64>,
}

impl Tbbo {
    /// Checks the §3/§4.4 TBBO business invariants: a positive trade price
    /// and size, and `bid_price <= ask_price` whenever both quote sides are
    /// present.
    pub fn is_consistent(&self) -> bool {
        let quote_crossed = matches!(
            (self.bid_price, self.ask_price),
            (Some(bid), Some(ask)) if bid > ask
        );
        self.price > Decimal::ZERO && self.size > 0 && !quote_crossed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_ts;
    use rust_decimal_macros::dec;

    fn sample(bid: Option<Decimal>, ask: Option<Decimal>) -> Tbbo {
        Tbbo {
            common: RecordCommon::new(sample_ts()),
            price: dec!(100),
            size: 1,
            side: Side::Bid,
            bid_price: bid,
            bid_size: bid.map(|_| 10),
            ask_price: ask,
            ask_size: ask.map(|_| 10),
        }
    }

    #[test]
    fn crossed_quote_is_rejected() {
        let tbbo = sample(Some(dec!(101)), Some(dec!(100)));
        assert!(!tbbo.is_consistent());
    }

    #[test]
    fn uncrossed_quote_passes() {
        let tbbo = sample(Some(dec!(99)), Some(dec!(100)));
        assert!(tbbo.is_consistent());
    }

    #[test]
    fn one_sided_quote_passes() {
        let tbbo = sample(None, Some(dec!(100)));
        assert!(tbbo.is_consistent());
    }
}
