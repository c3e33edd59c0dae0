//! Splits a job's date range into vendor-request-sized chunks (§4.1).

use time::{Date, Duration};

use crate::config::JobConfig;

/// An inclusive `[start, end]` date range to request from the vendor in one
/// call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateChunk {
    /// The inclusive start date.
    pub start: Date,
    /// The inclusive end date.
    pub end: Date,
}

/// Splits `job`'s `[start_date, end_date]` into chunks of at most
/// `chunk_days` days each, in chronological order.
///
/// If `job.calendar_filter` is set, chunks that fall entirely on a weekend
/// are dropped; this is a coarse filter, not an exchange calendar, and only
/// catches whole-chunk gaps.
pub fn plan_chunks(job: &JobConfig, chunk_days: u32) -> Vec<DateChunk> {
    let chunk_days = chunk_days.max(1) as i64;
    let mut chunks = Vec::new();
    let mut cursor = job.start_date;
    while cursor <= job.end_date {
        let end = (cursor + Duration::days(chunk_days - 1)).min(job.end_date);
        let chunk = DateChunk { start: cursor, end };
        if !(job.calendar_filter && is_weekend_only(chunk)) {
            chunks.push(chunk);
        }
        cursor = end + Duration::days(1);
    }
    chunks
}

fn is_weekend_only(chunk: DateChunk) -> bool {
    use time::Weekday::*;
    let mut day = chunk.start;
    while day <= chunk.end {
        if !matches!(day.weekday(), Saturday | Sunday) {
            return false;
        }
        day = day.saturating_add(Duration::days(1));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::SymbolType;
    use time::macros::date;

    fn job(start: Date, end: Date, calendar_filter: bool) -> JobConfig {
        let mut job = JobConfig::new(
            "job",
            "databento",
            "GLBX.MDP3",
            "ohlcv-1d",
            vec!["ES.c.0".to_owned()],
            SymbolType::Continuous,
            start,
            end,
        )
        .unwrap();
        job.calendar_filter = calendar_filter;
        job
    }

    #[test]
    fn splits_evenly_when_range_is_a_multiple_of_chunk_days() {
        let job = job(date!(2024 - 01 - 01), date!(2024 - 01 - 10), false);
        let chunks = plan_chunks(&job, 5);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].start, date!(2024 - 01 - 01));
        assert_eq!(chunks[0].end, date!(2024 - 01 - 05));
        assert_eq!(chunks[1].start, date!(2024 - 01 - 06));
        assert_eq!(chunks[1].end, date!(2024 - 01 - 10));
    }

    #[test]
    fn final_chunk_is_clamped_to_end_date() {
        let job = job(date!(2024 - 01 - 01), date!(2024 - 01 - 07), false);
        let chunks = plan_chunks(&job, 5);
        assert_eq!(chunks.last().unwrap().end, date!(2024 - 01 - 07));
    }

    #[test]
    fn single_day_range_produces_one_chunk() {
        let job = job(date!(2024 - 01 - 01), date!(2024 - 01 - 01), false);
        let chunks = plan_chunks(&job, 10);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn weekend_only_chunk_is_dropped_when_calendar_filter_is_set() {
        // 2024-01-06 and 2024-01-07 are a Saturday and Sunday.
        let job = job(date!(2024 - 01 - 06), date!(2024 - 01 - 07), true);
        let chunks = plan_chunks(&job, 2);
        assert!(chunks.is_empty());
    }
}
