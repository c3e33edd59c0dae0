use std::collections::HashMap;

use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};

use crate::enums::InstrumentClass;
use crate::record::RecordCommon;

/// One leg of a multi-leg instrument (a spread or combination), as carried
/// by [`Definition::legs`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DefinitionLeg {
    /// The resolved `instrument_id` of the leg instrument, when known.
    pub instrument_id: Option<u32>,
    /// The leg's raw vendor symbol.
    pub raw_symbol: String,
    /// The leg's signed weighting ratio within the parent instrument (e.g.
    /// `1` and `-1` for a calendar spread's two legs).
    pub ratio: Decimal,
}

/// Instrument reference data (§3): the descriptive, slowly-changing record
/// that identifies a tradable instrument rather than an event on it.
///
/// The vendor publishes on the order of sixty descriptive fields per
/// instrument. The ones with dedicated business meaning used elsewhere in
/// the pipeline (symbol resolution, option pricing, spread decomposition)
/// are named fields; the remainder are kept verbatim in [`Self::extra`]
/// rather than silently dropped.
#[derive(Debug, Clone, PartialEq, ingestor_macros::SchemaRecord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[schema_record(schema = "definition")]
pub struct Definition {
    /// Fields shared by every record.
    pub common: RecordCommon,
    /// The vendor's raw, exchange-native symbol.
    pub raw_symbol: String,
    /// The instrument class.
    pub instrument_class: InstrumentClass,
    /// The dataset this instrument is published under, e.g. `GLBX.MDP3`.
    pub dataset: String,
    /// The exchange or venue code.
    pub exchange: String,
    /// The underlying asset code, e.g. `ES` for the E-mini S&P 500 future.
    pub asset: String,
    /// The currency the instrument is denominated in.
    pub currency: String,
    /// The smallest allowed increment between quoted prices.
    pub min_price_increment: Option<Decimal>,
    /// The scale factor between the vendor's fixed-point price encoding and
    /// a displayable decimal price.
    pub display_factor: Option<Decimal>,
    /// The contract size multiplier applied to price to get notional value.
    pub unit_of_measure_qty: Option<Decimal>,
    /// The date this instrument becomes active for trading.
    pub activation_date: Option<Date>,
    /// The date this instrument stops trading.
    pub expiration_date: Option<Date>,
    /// The strike price, for options.
    pub strike_price: Option<Decimal>,
    /// The put/call indicator's underlying option type, redundant with
    /// [`InstrumentClass::is_option`] but published directly by some vendors.
    pub put_call: Option<char>,
    /// The number of legs in a spread; `0` for an outright instrument.
    pub leg_count: u32,
    /// The legs making up a multi-leg instrument. Populated if and only if
    /// `leg_count > 0`.
    pub legs: Vec<DefinitionLeg>,
    /// The timestamp this definition record was published, distinct from
    /// `common.ts_event` which records the originating event.
    pub ts_recv: Option<OffsetDateTime>,
    /// Every vendor-published descriptive field not given a named slot
    /// above, keyed by the vendor's original field name.
    pub extra: HashMap<String, String>,
}

impl Definition {
    /// Checks the §3/§4.4 definition business invariants: a positive
    /// `min_price_increment`/`display_factor`/`unit_of_measure_qty` where
    /// present, `activation_date <= expiration_date` where both are
    /// present, and a spread (`leg_count > 0`) carrying exactly that many
    /// legs.
    pub fn is_consistent(&self) -> bool {
        let positive = |d: Option<Decimal>| d.map_or(true, |v| v > Decimal::ZERO);
        positive(self.min_price_increment)
            && positive(self.display_factor)
            && positive(self.unit_of_measure_qty)
            && match (self.activation_date, self.expiration_date) {
                (Some(a), Some(e)) => a <= e,
                _ => true,
            }
            && self.leg_count as usize == self.legs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_ts;

    fn base() -> Definition {
        Definition {
            common: RecordCommon::new(sample_ts()),
            raw_symbol: "ESZ4".to_owned(),
            instrument_class: InstrumentClass::Future,
            dataset: "GLBX.MDP3".to_owned(),
            exchange: "XCME".to_owned(),
            asset: "ES".to_owned(),
            currency: "USD".to_owned(),
            min_price_increment: None,
            display_factor: None,
            unit_of_measure_qty: None,
            activation_date: None,
            expiration_date: None,
            strike_price: None,
            put_call: None,
            leg_count: 0,
            legs: vec![],
            ts_recv: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn outright_with_no_legs_is_consistent() {
        assert!(base().is_consistent());
    }

    #[test]
    fn spread_missing_legs_is_inconsistent() {
        let mut def = base();
        def.leg_count = 2;
        assert!(!def.is_consistent());
    }

    #[test]
    fn spread_with_matching_legs_is_consistent() {
        let mut def = base();
        def.leg_count = 2;
        def.legs = vec![
            DefinitionLeg {
                instrument_id: Some(1),
                raw_symbol: "ESZ4".to_owned(),
                ratio: Decimal::ONE,
            },
            DefinitionLeg {
                instrument_id: Some(2),
                raw_symbol: "ESH5".to_owned(),
                ratio: -Decimal::ONE,
            },
        ];
        assert!(def.is_consistent());
    }

    #[test]
    fn negative_min_price_increment_is_inconsistent() {
        let mut def = base();
        def.min_price_increment = Some(-Decimal::ONE);
        assert!(!def.is_consistent());
    }

    #[test]
    fn zero_display_factor_is_inconsistent() {
        let mut def = base();
        def.display_factor = Some(Decimal::ZERO);
        assert!(!def.is_consistent());
    }

    #[test]
    fn activation_after_expiration_is_inconsistent() {
        use time::macros::date;
        let mut def = base();
        def.activation_date = Some(date!(2024 - 06 - 01));
        def.expiration_date = Some(date!(2024 - 01 - 01));
        assert!(!def.is_consistent());
    }

    #[test]
    fn activation_on_or_before_expiration_is_consistent() {
        use time::macros::date;
        let mut def = base();
        def.activation_date = Some(date!(2024 - 01 - 01));
        def.expiration_date = Some(date!(2024 - 06 - 01));
        assert!(def.is_consistent());
    }
}
