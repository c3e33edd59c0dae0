use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::enums::UpdateAction;
use crate::error::Error;
use crate::record::RecordCommon;

/// The kind of exchange-published statistic carried by a [`Statistic`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatType {
    /// The exchange's official settlement price.
    SettlementPrice,
    /// Open interest at the close of the session.
    OpenInterest,
    /// The session's opening price.
    OpeningPrice,
    /// A daily high/low price limit imposed by the exchange.
    PriceLimit,
    /// Cleared volume for the session.
    ClearedVolume,
}

impl FromStr for StatType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "settlement_price" => Ok(StatType::SettlementPrice),
            "open_interest" => Ok(StatType::OpenInterest),
            "opening_price" => Ok(StatType::OpeningPrice),
            "price_limit" => Ok(StatType::PriceLimit),
            "cleared_volume" => Ok(StatType::ClearedVolume),
            other => Err(Error::Decode {
                schema: "statistics".to_owned(),
                detail: format!("unrecognized stat_type '{other}'"),
            }),
        }
    }
}

impl Display for StatType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatType::SettlementPrice => "settlement_price",
            StatType::OpenInterest => "open_interest",
            StatType::OpeningPrice => "opening_price",
            StatType::PriceLimit => "price_limit",
            StatType::ClearedVolume => "cleared_volume",
        };
        f.write_str(s)
    }
}

/// An exchange-published statistic, e.g. a settlement price or open interest
/// figure (§3).
#[derive(Debug, Clone, PartialEq, ingestor_macros::SchemaRecord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[schema_record(schema = "statistics")]
pub struct Statistic {
    /// Fields shared by every record.
    pub common: RecordCommon,
    /// The kind of statistic.
    pub stat_type: StatType,
    /// Whether this is a new value or a retraction of a previously
    /// published one.
    pub update_action: UpdateAction,
    /// The statistic's price value, when applicable (e.g. settlement price).
    pub price: Option<Decimal>,
    /// The statistic's quantity value, when applicable (e.g. open interest).
    pub quantity: Option<i64>,
    /// The business date (not necessarily `ts_event`'s date) this statistic
    /// refers to.
    pub ts_ref: Option<OffsetDateTime>,
}

impl Statistic {
    /// Checks the §3/§4.4 statistic business invariants: the field implied
    /// by `stat_type` is populated, `price` is positive when present, and
    /// `quantity` is non-negative when present.
    pub fn is_consistent(&self) -> bool {
        let shape_ok = match self.stat_type {
            StatType::SettlementPrice | StatType::OpeningPrice | StatType::PriceLimit => {
                self.price.is_some()
            }
            StatType::OpenInterest | StatType::ClearedVolume => self.quantity.is_some(),
        };
        shape_ok
            && self.price.map_or(true, |p| p > Decimal::ZERO)
            && self.quantity.map_or(true, |q| q >= 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_ts;

    #[test]
    fn settlement_price_without_a_price_is_inconsistent() {
        let stat = Statistic {
            common: RecordCommon::new(sample_ts()),
            stat_type: StatType::SettlementPrice,
            update_action: UpdateAction::New,
            price: None,
            quantity: None,
            ts_ref: None,
        };
        assert!(!stat.is_consistent());
    }

    #[test]
    fn open_interest_with_a_quantity_is_consistent() {
        let stat = Statistic {
            common: RecordCommon::new(sample_ts()),
            stat_type: StatType::OpenInterest,
            update_action: UpdateAction::New,
            price: None,
            quantity: Some(1_000),
            ts_ref: None,
        };
        assert!(stat.is_consistent());
    }

    #[test]
    fn negative_settlement_price_is_inconsistent() {
        let stat = Statistic {
            common: RecordCommon::new(sample_ts()),
            stat_type: StatType::SettlementPrice,
            update_action: UpdateAction::New,
            price: Some(-rust_decimal_macros::dec!(1)),
            quantity: None,
            ts_ref: None,
        };
        assert!(!stat.is_consistent());
    }

    #[test]
    fn negative_open_interest_is_inconsistent() {
        let stat = Statistic {
            common: RecordCommon::new(sample_ts()),
            stat_type: StatType::OpenInterest,
            update_action: UpdateAction::New,
            price: None,
            quantity: Some(-1),
            ts_ref: None,
        };
        assert!(!stat.is_consistent());
    }

    #[test]
    fn stat_type_round_trips_through_str() {
        for stat_type in [
            StatType::SettlementPrice,
            StatType::OpenInterest,
            StatType::OpeningPrice,
            StatType::PriceLimit,
            StatType::ClearedVolume,
        ] {
            assert_eq!(StatType::from_str(&stat_type.to_string()).unwrap(), stat_type);
        }
    }
}
