//! Enums shared across record types, config, and the rule engine.

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The side of the market for a trade or resting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Side {
    /// A sell order or sell aggressor in a trade.
    Ask = b'A',
    /// A buy order or a buy aggressor in a trade.
    Bid = b'B',
    /// No side specified by the vendor.
    #[default]
    None = b'N',
}

impl From<Side> for char {
    fn from(side: Side) -> Self {
        u8::from(side) as char
    }
}

impl FromStr for Side {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Side::Ask),
            "B" => Ok(Side::Bid),
            "N" => Ok(Side::None),
            other => Err(crate::Error::Decode {
                schema: "side".to_owned(),
                detail: format!("unrecognized side '{other}'"),
            }),
        }
    }
}

/// The kind of change applied by a [`crate::record::Statistic`] or
/// [`crate::record::Definition`] update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum UpdateAction {
    /// A new record.
    New = 1,
    /// A removal of a previously published record.
    Delete = 2,
}

/// The class of a tradable instrument, as carried by [`crate::record::Definition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum InstrumentClass {
    /// A bond.
    Bond = b'B',
    /// A call option.
    Call = b'C',
    /// A future.
    Future = b'F',
    /// A stock.
    Stock = b'K',
    /// A spread composed of multiple instrument classes.
    MixedSpread = b'M',
    /// A put option.
    Put = b'P',
    /// A spread composed of futures.
    FutureSpread = b'S',
    /// A spread composed of options.
    OptionSpread = b'T',
    /// A foreign exchange spot.
    FxSpot = b'X',
}

impl InstrumentClass {
    /// Returns `true` if the instrument class is a type of option.
    ///
    /// Excludes [`Self::MixedSpread`], which may include options.
    pub fn is_option(&self) -> bool {
        matches!(self, Self::Call | Self::Put | Self::OptionSpread)
    }
}

/// The granularity of an OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Granularity {
    /// One-second bars.
    Second1,
    /// One-minute bars.
    Minute1,
    /// Five-minute bars.
    Minute5,
    /// Fifteen-minute bars.
    Minute15,
    /// One-hour bars.
    Hour1,
    /// One-day bars, aligned to the UTC date.
    Day1,
}

impl Granularity {
    /// The vendor schema code used to request this granularity, e.g. `ohlcv-1m`.
    pub fn schema_code(&self) -> &'static str {
        match self {
            Granularity::Second1 => "ohlcv-1s",
            Granularity::Minute1 => "ohlcv-1m",
            Granularity::Minute5 => "ohlcv-5m",
            Granularity::Minute15 => "ohlcv-15m",
            Granularity::Hour1 => "ohlcv-1h",
            Granularity::Day1 => "ohlcv-1d",
        }
    }
}

impl FromStr for Granularity {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ohlcv-1s" | "1s" => Ok(Granularity::Second1),
            "ohlcv-1m" | "1m" => Ok(Granularity::Minute1),
            "ohlcv-5m" | "5m" => Ok(Granularity::Minute5),
            "ohlcv-15m" | "15m" => Ok(Granularity::Minute15),
            "ohlcv-1h" | "1h" => Ok(Granularity::Hour1),
            "ohlcv-1d" | "1d" => Ok(Granularity::Day1),
            other => Err(crate::Error::Config(format!(
                "unrecognized OHLCV granularity '{other}'"
            ))),
        }
    }
}

impl Display for Granularity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_code())
    }
}

/// The record schema requested from the vendor and mapped onto a target
/// table by the rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Schema {
    /// Open, high, low, close, and volume bars.
    Ohlcv(Granularity),
    /// Individual trade prints.
    Trades,
    /// Trades with the best bid/offer immediately before the trade.
    Tbbo,
    /// Exchange-published statistics (settlement price, open interest, ...).
    Statistics,
    /// Instrument reference data.
    Definition,
}

impl Schema {
    /// The vendor schema code, e.g. `ohlcv-1d` or `tbbo`.
    pub fn code(&self) -> String {
        match self {
            Schema::Ohlcv(g) => g.schema_code().to_owned(),
            Schema::Trades => "trades".to_owned(),
            Schema::Tbbo => "tbbo".to_owned(),
            Schema::Statistics => "statistics".to_owned(),
            Schema::Definition => "definition".to_owned(),
        }
    }

    /// The target table this schema's standardized records are loaded into.
    pub fn target_table(&self) -> &'static str {
        match self {
            Schema::Ohlcv(_) => "ohlcv",
            Schema::Trades => "trades",
            Schema::Tbbo => "tbbo",
            Schema::Statistics => "statistics",
            Schema::Definition => "definitions",
        }
    }
}

impl FromStr for Schema {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trades" => Ok(Schema::Trades),
            "tbbo" => Ok(Schema::Tbbo),
            "statistics" => Ok(Schema::Statistics),
            "definition" => Ok(Schema::Definition),
            other => Granularity::from_str(other).map(Schema::Ohlcv),
        }
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// How a job's symbols are interpreted by the vendor's symbology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SymbolType {
    /// A Databento-specific symbology where one symbol tracks a rolling
    /// front-month contract, e.g. `ES.c.0`.
    Continuous,
    /// A Databento-specific symbology referring to a product family by one
    /// parent symbol, e.g. `ES.FUT`.
    Parent,
    /// The vendor's original, exchange-assigned symbol.
    Native,
    /// A numeric instrument ID assigned by the vendor.
    InstrumentId,
}

impl FromStr for SymbolType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continuous" => Ok(SymbolType::Continuous),
            "parent" => Ok(SymbolType::Parent),
            "native" => Ok(SymbolType::Native),
            "instrument_id" => Ok(SymbolType::InstrumentId),
            other => Err(crate::Error::Config(format!(
                "unrecognized symbol_type '{other}'"
            ))),
        }
    }
}

impl Display for SymbolType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            SymbolType::Continuous => "continuous",
            SymbolType::Parent => "parent",
            SymbolType::Native => "native",
            SymbolType::InstrumentId => "instrument_id",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_round_trips_through_char() {
        for side in [Side::Ask, Side::Bid, Side::None] {
            let c: char = side.into();
            assert_eq!(Side::from_str(&c.to_string()).unwrap(), side);
        }
    }

    #[test]
    fn schema_round_trips_through_code() {
        let schemas = [
            Schema::Ohlcv(Granularity::Day1),
            Schema::Trades,
            Schema::Tbbo,
            Schema::Statistics,
            Schema::Definition,
        ];
        for schema in schemas {
            assert_eq!(Schema::from_str(&schema.code()).unwrap(), schema);
        }
    }

    #[test]
    fn unrecognized_schema_is_a_config_error() {
        assert!(matches!(
            Schema::from_str("mbo"),
            Err(crate::Error::Config(_))
        ));
    }
}
