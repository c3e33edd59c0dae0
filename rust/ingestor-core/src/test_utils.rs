//! Test-only fixtures shared across this crate's unit tests.

use time::macros::datetime;
use time::OffsetDateTime;

use crate::config::{RetryConfig, SystemConfig, ValidationConfig};
use crate::enums::SymbolType;
use crate::record::{Definition, Ohlcv, RecordCommon, Statistic, Tbbo, Trade, TypedRecord};

/// A fixed, UTC-normalized timestamp used anywhere a test needs a valid
/// `ts_event` but doesn't care about the particular value.
pub fn sample_ts() -> OffsetDateTime {
    datetime!(2024-03-04 14:30:00 UTC)
}

/// A [`RecordCommon`] with a resolved instrument ID and symbol, as a record
/// would carry downstream of symbol resolution.
pub fn sample_common(instrument_id: u32, symbol: &str) -> RecordCommon {
    RecordCommon {
        ts_event: sample_ts(),
        instrument_id: Some(instrument_id),
        symbol: Some(symbol.to_owned()),
    }
}

/// A minimal, internally consistent [`JobConfig`](crate::config::JobConfig)
/// for the `ES.c.0` continuous contract over a single day.
pub fn sample_job_config() -> crate::config::JobConfig {
    use time::macros::date;
    crate::config::JobConfig::new(
        "es-daily-bars",
        "databento",
        "GLBX.MDP3",
        "ohlcv-1d",
        vec!["ES.c.0".to_owned()],
        SymbolType::Continuous,
        date!(2024 - 01 - 01),
        date!(2024 - 01 - 02),
    )
    .expect("sample job config is valid")
}

/// A [`SystemConfig`] with retries disabled, for tests that exercise
/// `Error::disposition` paths without waiting out a real backoff.
pub fn sample_system_config_no_retry() -> SystemConfig {
    SystemConfig {
        retry: RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        },
        validation: ValidationConfig::default(),
        ..SystemConfig::default()
    }
}

/// One sample [`TypedRecord`] per schema, in an arbitrary but fixed order;
/// useful for exercising code that must handle every variant.
pub fn sample_records() -> Vec<TypedRecord> {
    use rust_decimal_macros::dec;

    vec![
        TypedRecord::Ohlcv(Ohlcv {
            common: sample_common(1, "ES.c.0"),
            granularity: crate::enums::Granularity::Day1,
            open: dec!(5000),
            high: dec!(5050),
            low: dec!(4980),
            close: dec!(5020),
            volume: 150_000,
            trade_count: Some(42_000),
        }),
        TypedRecord::Trade(Trade {
            common: sample_common(1, "ES.c.0"),
            price: dec!(5020),
            size: 4,
            side: crate::enums::Side::Bid,
            sequence: Some(1),
            depth: Some(0),
        }),
        TypedRecord::Tbbo(Tbbo {
            common: sample_common(1, "ES.c.0"),
            price: dec!(5020),
            size: 4,
            side: crate::enums::Side::Bid,
            bid_price: Some(dec!(5019.75)),
            bid_size: Some(10),
            ask_price: Some(dec!(5020.25)),
            ask_size: Some(12),
        }),
        TypedRecord::Statistic(Statistic {
            common: sample_common(1, "ES.c.0"),
            stat_type: crate::record::StatType::SettlementPrice,
            update_action: crate::enums::UpdateAction::New,
            price: Some(dec!(5020)),
            quantity: None,
            ts_ref: Some(sample_ts()),
        }),
        TypedRecord::Definition(Box::new(Definition {
            common: sample_common(1, "ESZ4"),
            raw_symbol: "ESZ4".to_owned(),
            instrument_class: crate::enums::InstrumentClass::Future,
            dataset: "GLBX.MDP3".to_owned(),
            exchange: "XCME".to_owned(),
            asset: "ES".to_owned(),
            currency: "USD".to_owned(),
            min_price_increment: Some(dec!(0.25)),
            display_factor: Some(dec!(1)),
            unit_of_measure_qty: Some(dec!(50)),
            activation_date: None,
            expiration_date: None,
            strike_price: None,
            put_call: None,
            leg_count: 0,
            legs: vec![],
            ts_recv: Some(sample_ts()),
            extra: Default::default(),
        })),
    ]
}
