//! Market data record types, one per ingested [`Schema`](crate::enums::Schema),
//! and the [`TypedRecord`] sum type over them (§3).

mod definition;
pub(crate) mod methods;
mod ohlcv;
mod statistic;
mod tbbo;
mod trade;

use time::OffsetDateTime;

pub use definition::{Definition, DefinitionLeg};
pub use ohlcv::Ohlcv;
pub use statistic::{StatType, Statistic};
pub use tbbo::Tbbo;
pub use trade::Trade;

use crate::enums::Schema;

/// Fields common to every [`TypedRecord`] variant, decoded off of every
/// vendor payload regardless of schema (§3).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RecordCommon {
    /// The event timestamp. Always UTC-normalized by the adapter; a naive
    /// timestamp can never reach this field.
    pub ts_event: OffsetDateTime,
    /// The vendor-assigned numeric instrument ID, once resolved.
    ///
    /// May be `None` immediately after decode for payloads where the
    /// vendor only carries a raw symbol; resolved later by the Rule Engine
    /// or the storage loader's `instrument_mapping` lookup.
    pub instrument_id: Option<u32>,
    /// The human-readable symbol.
    ///
    /// May be absent on per-record payloads for certain schemas (a vendor
    /// quirk, see §4.2); repaired from the job's symbols when unambiguous.
    pub symbol: Option<String>,
}

impl RecordCommon {
    /// Creates a new [`RecordCommon`] with no symbol or instrument ID yet
    /// resolved.
    pub fn new(ts_event: OffsetDateTime) -> Self {
        Self {
            ts_event,
            instrument_id: None,
            symbol: None,
        }
    }
}

/// A decoded, schema-tagged market data record (§3).
///
/// `TypedRecord` only exists in-flight between the adapter and the rule
/// engine; nothing downstream of [`crate::standardized::StandardizedRecord`]
/// sees it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TypedRecord {
    /// An OHLCV bar. See [`Ohlcv`].
    Ohlcv(Ohlcv),
    /// A trade print. See [`Trade`].
    Trade(Trade),
    /// A trade with the best bid/offer at event time. See [`Tbbo`].
    Tbbo(Tbbo),
    /// An exchange-published statistic. See [`Statistic`].
    Statistic(Statistic),
    /// Instrument reference data. See [`Definition`].
    Definition(Box<Definition>),
}

/// Implemented by every record struct that makes up a [`TypedRecord`]
/// variant; analogous to `dbn::record::Record` but schema-tagged rather
/// than rtype-tagged.
///
/// [`ingestor_macros::SchemaRecord`] derives this for each variant struct so
/// the `schema()`/`natural_key_parts()` boilerplate doesn't have to be
/// hand-written per schema.
pub trait Record {
    /// The schema this record belongs to.
    fn schema(&self) -> Schema;

    /// Fields shared by every record.
    fn common(&self) -> &RecordCommon;

    /// Fields shared by every record, mutably — used by the symbol-repair
    /// contract (§4.2, §4.4).
    fn common_mut(&mut self) -> &mut RecordCommon;
}

impl TypedRecord {
    /// Fields shared by every record, regardless of variant.
    pub fn common(&self) -> &RecordCommon {
        match self {
            TypedRecord::Ohlcv(r) => r.common(),
            TypedRecord::Trade(r) => r.common(),
            TypedRecord::Tbbo(r) => r.common(),
            TypedRecord::Statistic(r) => r.common(),
            TypedRecord::Definition(r) => r.common(),
        }
    }

    /// Fields shared by every record, mutably.
    pub fn common_mut(&mut self) -> &mut RecordCommon {
        match self {
            TypedRecord::Ohlcv(r) => r.common_mut(),
            TypedRecord::Trade(r) => r.common_mut(),
            TypedRecord::Tbbo(r) => r.common_mut(),
            TypedRecord::Statistic(r) => r.common_mut(),
            TypedRecord::Definition(r) => r.common_mut(),
        }
    }

    /// The schema this record belongs to.
    pub fn schema(&self) -> Schema {
        match self {
            TypedRecord::Ohlcv(r) => r.schema(),
            TypedRecord::Trade(r) => r.schema(),
            TypedRecord::Tbbo(r) => r.schema(),
            TypedRecord::Statistic(r) => r.schema(),
            TypedRecord::Definition(r) => r.schema(),
        }
    }
}
