//! Helpers shared by more than one record type's consistency check, kept
//! separate from the per-schema modules so [`crate::validate::checks`] has a
//! single place to pull them from.

use time::{OffsetDateTime, UtcOffset};

use crate::error::{Error, Result};

/// Rejects a timestamp that is not normalized to UTC.
///
/// The adapter decode path (§4.3) is required to normalize every vendor
/// timestamp before it reaches a [`super::RecordCommon`]; this is the single
/// choke point that enforces it rather than trusting every call site.
pub fn require_utc(ts: OffsetDateTime, schema: &str) -> Result<OffsetDateTime> {
    if ts.offset() == UtcOffset::UTC {
        Ok(ts)
    } else {
        Err(Error::Decode {
            schema: schema.to_owned(),
            detail: format!("timestamp {ts} is not UTC-normalized"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_ts;

    #[test]
    fn utc_timestamp_is_accepted() {
        assert!(require_utc(sample_ts(), "trades").is_ok());
    }

    #[test]
    fn offset_timestamp_is_rejected() {
        let offset = sample_ts().replace_offset(UtcOffset::from_hms(5, 0, 0).unwrap());
        assert!(require_utc(offset, "trades").is_err());
    }
}
