//! Decodes one NDJSON line from the vendor's historical API into a
//! [`TypedRecord`] (§4.1, §4.3).
//!
//! The vendor publishes one JSON object per record, timestamps as RFC 3339
//! strings and monetary fields as decimal strings to avoid floating-point
//! round-off; this module is the single place those conventions are known.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value as Json;
use time::OffsetDateTime;

use crate::enums::{Granularity, InstrumentClass, Schema, Side, UpdateAction};
use crate::error::{Error, Result};
use crate::record::{
    Definition, DefinitionLeg, Ohlcv, RecordCommon, StatType, Statistic, Tbbo, Trade, TypedRecord,
};

/// Decodes one vendor JSON record for `schema`.
///
/// # Errors
/// Returns [`Error::Decode`] if a required field is missing or malformed.
pub fn decode_record(schema: &Schema, raw: &Json) -> Result<TypedRecord> {
    let schema_label = schema.code();
    let obj = raw.as_object().ok_or_else(|| Error::Decode {
        schema: schema_label.clone(),
        detail: "expected a JSON object".to_owned(),
    })?;

    let ts_event = ts_field(obj, "ts_event", &schema_label)?;
    let instrument_id = opt_u32(obj, "instrument_id");
    let symbol = opt_str(obj, "symbol").map(str::to_owned);
    let common = RecordCommon {
        ts_event,
        instrument_id,
        symbol,
    };

    match schema {
        Schema::Ohlcv(granularity) => decode_ohlcv(obj, common, *granularity, &schema_label),
        Schema::Trades => decode_trade(obj, common, &schema_label),
        Schema::Tbbo => decode_tbbo(obj, common, &schema_label),
        Schema::Statistics => decode_statistic(obj, common, &schema_label),
        Schema::Definition => decode_definition(obj, common, &schema_label),
    }
}

type Obj = serde_json::Map<String, Json>;

fn req_str<'a>(obj: &'a Obj, field: &str, schema: &str) -> Result<&'a str> {
    obj.get(field).and_then(Json::as_str).ok_or_else(|| Error::Decode {
        schema: schema.to_owned(),
        detail: format!("missing or non-string field '{field}'"),
    })
}

fn opt_str<'a>(obj: &'a Obj, field: &str) -> Option<&'a str> {
    obj.get(field).and_then(Json::as_str)
}

fn opt_u32(obj: &Obj, field: &str) -> Option<u32> {
    obj.get(field).and_then(Json::as_u64).map(|v| v as u32)
}

fn opt_u64(obj: &Obj, field: &str) -> Option<u64> {
    obj.get(field).and_then(Json::as_u64)
}

fn opt_i64(obj: &Obj, field: &str) -> Option<i64> {
    obj.get(field).and_then(Json::as_i64)
}

fn req_u64(obj: &Obj, field: &str, schema: &str) -> Result<u64> {
    opt_u64(obj, field).ok_or_else(|| Error::Decode {
        schema: schema.to_owned(),
        detail: format!("missing or non-integer field '{field}'"),
    })
}

fn req_decimal(obj: &Obj, field: &str, schema: &str) -> Result<Decimal> {
    let text = req_str(obj, field, schema)?;
    Decimal::from_str(text).map_err(|e| Error::Decode {
        schema: schema.to_owned(),
        detail: format!("field '{field}' is not a decimal: {e}"),
    })
}

fn opt_decimal(obj: &Obj, field: &str) -> Option<Decimal> {
    opt_str(obj, field).and_then(|s| Decimal::from_str(s).ok())
}

fn ts_field(obj: &Obj, field: &str, schema: &str) -> Result<OffsetDateTime> {
    let text = req_str(obj, field, schema)?;
    let ts = OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339)
        .map_err(|e| Error::Decode {
            schema: schema.to_owned(),
            detail: format!("field '{field}' is not RFC 3339: {e}"),
        })?;
    Ok(ts.to_offset(time::UtcOffset::UTC))
}

fn opt_ts_field(obj: &Obj, field: &str) -> Option<OffsetDateTime> {
    let text = opt_str(obj, field)?;
    let ts = OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339).ok()?;
    Some(ts.to_offset(time::UtcOffset::UTC))
}

fn opt_date_field(obj: &Obj, field: &str) -> Option<time::Date> {
    let text = opt_str(obj, field)?;
    time::Date::parse(
        text,
        time::macros::format_description!("[year]-[month]-[day]"),
    )
    .ok()
}

fn req_side(obj: &Obj, schema: &str) -> Result<Side> {
    match opt_str(obj, "side") {
        Some(s) => Side::from_str(s),
        None => Ok(Side::None),
    }
    .map_err(|_| Error::Decode {
        schema: schema.to_owned(),
        detail: "invalid 'side' field".to_owned(),
    })
}

fn decode_ohlcv(
    obj: &Obj,
    common: RecordCommon,
    granularity: Granularity,
    schema: &str,
) -> Result<TypedRecord> {
    Ok(TypedRecord::Ohlcv(Ohlcv {
        common,
        granularity,
        open: req_decimal(obj, "open", schema)?,
        high: req_decimal(obj, "high", schema)?,
        low: req_decimal(obj, "low", schema)?,
        close: req_decimal(obj, "close", schema)?,
        volume: req_u64(obj, "volume", schema)?,
        trade_count: opt_i64(obj, "trade_count"),
    }))
}

fn decode_trade(obj: &Obj, common: RecordCommon, schema: &str) -> Result<TypedRecord> {
    Ok(TypedRecord::Trade(Trade {
        common,
        price: req_decimal(obj, "price", schema)?,
        size: req_u64(obj, "size", schema)?,
        side: req_side(obj, schema)?,
        sequence: opt_u64(obj, "sequence"),
        depth: opt_u32(obj, "depth"),
    }))
}

fn decode_tbbo(obj: &Obj, common: RecordCommon, schema: &str) -> Result<TypedRecord> {
    Ok(TypedRecord::Tbbo(Tbbo {
        common,
        price: req_decimal(obj, "price", schema)?,
        size: req_u64(obj, "size", schema)?,
        side: req_side(obj, schema)?,
        bid_price: opt_decimal(obj, "bid_price"),
        bid_size: opt_u64(obj, "bid_size"),
        ask_price: opt_decimal(obj, "ask_price"),
        ask_size: opt_u64(obj, "ask_size"),
    }))
}

fn decode_statistic(obj: &Obj, common: RecordCommon, schema: &str) -> Result<TypedRecord> {
    let stat_type = StatType::from_str(req_str(obj, "stat_type", schema)?)?;
    let update_action = match opt_str(obj, "update_action") {
        Some("delete") => UpdateAction::Delete,
        _ => UpdateAction::New,
    };
    Ok(TypedRecord::Statistic(Statistic {
        common,
        stat_type,
        update_action,
        price: opt_decimal(obj, "price"),
        quantity: opt_i64(obj, "quantity"),
        ts_ref: opt_ts_field(obj, "ts_ref"),
    }))
}

fn decode_definition(obj: &Obj, common: RecordCommon, schema: &str) -> Result<TypedRecord> {
    let instrument_class = InstrumentClass::try_from(
        req_str(obj, "instrument_class", schema)?
            .bytes()
            .next()
            .unwrap_or(b'?'),
    )
    .map_err(|_| Error::Decode {
        schema: schema.to_owned(),
        detail: "invalid 'instrument_class' field".to_owned(),
    })?;

    let leg_count = obj
        .get("leg_count")
        .and_then(Json::as_u64)
        .unwrap_or(0) as u32;
    let legs = obj
        .get("legs")
        .and_then(Json::as_array)
        .map(|arr| arr.iter().map(decode_leg).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();

    let mut extra = HashMap::new();
    const KNOWN: &[&str] = &[
        "ts_event", "instrument_id", "symbol", "raw_symbol", "instrument_class", "dataset",
        "exchange", "asset", "currency", "min_price_increment", "display_factor",
        "unit_of_measure_qty", "activation_date", "expiration_date", "strike_price", "put_call",
        "leg_count", "legs", "ts_recv",
    ];
    for (key, value) in obj {
        if !KNOWN.contains(&key.as_str()) {
            extra.insert(key.clone(), value.to_string());
        }
    }

    Ok(TypedRecord::Definition(Box::new(Definition {
        common,
        raw_symbol: req_str(obj, "raw_symbol", schema)?.to_owned(),
        instrument_class,
        dataset: req_str(obj, "dataset", schema)?.to_owned(),
        exchange: req_str(obj, "exchange", schema)?.to_owned(),
        asset: req_str(obj, "asset", schema)?.to_owned(),
        currency: req_str(obj, "currency", schema)?.to_owned(),
        min_price_increment: opt_decimal(obj, "min_price_increment"),
        display_factor: opt_decimal(obj, "display_factor"),
        unit_of_measure_qty: opt_decimal(obj, "unit_of_measure_qty"),
        activation_date: opt_date_field(obj, "activation_date"),
        expiration_date: opt_date_field(obj, "expiration_date"),
        strike_price: opt_decimal(obj, "strike_price"),
        put_call: opt_str(obj, "put_call").and_then(|s| s.chars().next()),
        leg_count,
        legs,
        ts_recv: opt_ts_field(obj, "ts_recv"),
        extra,
    })))
}

fn decode_leg(value: &Json) -> Result<DefinitionLeg> {
    let obj = value.as_object().ok_or_else(|| Error::Decode {
        schema: "definition".to_owned(),
        detail: "leg entry is not an object".to_owned(),
    })?;
    Ok(DefinitionLeg {
        instrument_id: opt_u32(obj, "instrument_id"),
        raw_symbol: req_str(obj, "raw_symbol", "definition")?.to_owned(),
        ratio: req_decimal(obj, "ratio", "definition")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_a_trade() {
        let raw = json!({
            "ts_event": "2024-03-04T14:30:00Z",
            "instrument_id": 1,
            "symbol": "ES.c.0",
            "price": "5020.25",
            "size": 4,
            "side": "B",
        });
        let record = decode_record(&Schema::Trades, &raw).unwrap();
        let TypedRecord::Trade(trade) = record else {
            panic!("expected a trade");
        };
        assert_eq!(trade.size, 4);
        assert_eq!(trade.side, Side::Bid);
    }

    #[test]
    fn missing_required_field_is_a_decode_error() {
        let raw = json!({ "ts_event": "2024-03-04T14:30:00Z" });
        assert!(matches!(
            decode_record(&Schema::Trades, &raw),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn naive_timestamp_is_rejected() {
        let raw = json!({ "ts_event": "not-a-timestamp" });
        assert!(matches!(
            decode_record(&Schema::Trades, &raw),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn decodes_definition_with_unknown_fields_kept_in_extra() {
        let raw = json!({
            "ts_event": "2024-03-04T14:30:00Z",
            "raw_symbol": "ESZ4",
            "instrument_class": "F",
            "dataset": "GLBX.MDP3",
            "exchange": "XCME",
            "asset": "ES",
            "currency": "USD",
            "leg_count": 0,
            "vendor_specific_flag": "Y",
        });
        let record = decode_record(&Schema::Definition, &raw).unwrap();
        let TypedRecord::Definition(def) = record else {
            panic!("expected a definition");
        };
        assert_eq!(def.extra.get("vendor_specific_flag").map(String::as_str), Some("\"Y\""));
    }
}
