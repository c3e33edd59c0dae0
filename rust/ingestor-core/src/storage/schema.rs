//! DDL for the time-partitioned target tables (§4.6).
//!
//! Every schema's table is declared `PARTITION BY RANGE (ts_event)`; this
//! module only creates the parent table and monthly child partitions, never
//! drops or alters one.

use time::Date;

use crate::enums::Schema;
use crate::error::Result;

/// The column list and primary key for one target table, used both to
/// generate its `CREATE TABLE` statement and to build the storage loader's
/// upsert.
pub struct TableDef {
    /// The target table name.
    pub name: &'static str,
    /// `(column, SQL type)` pairs, in declaration order.
    pub columns: &'static [(&'static str, &'static str)],
    /// Columns forming the natural key used for `ON CONFLICT`.
    pub natural_key: &'static [&'static str],
}

/// Returns the [`TableDef`] for `schema`'s target table.
pub fn table_def(schema: &Schema) -> TableDef {
    match schema {
        Schema::Ohlcv(_) => TableDef {
            name: "ohlcv",
            columns: &[
                ("ts_event", "timestamptz"),
                ("instrument_id", "integer"),
                ("symbol", "text"),
                ("granularity", "text"),
                ("open", "numeric"),
                ("high", "numeric"),
                ("low", "numeric"),
                ("close", "numeric"),
                ("volume", "bigint"),
                ("trade_count", "bigint"),
            ],
            natural_key: &["ts_event", "instrument_id", "granularity"],
        },
        Schema::Trades => TableDef {
            name: "trades",
            columns: &[
                ("ts_event", "timestamptz"),
                ("instrument_id", "integer"),
                ("symbol", "text"),
                ("price", "numeric"),
                ("size", "bigint"),
                ("side", "text"),
                ("sequence", "bigint"),
            ],
            natural_key: &["ts_event", "instrument_id", "sequence"],
        },
        Schema::Tbbo => TableDef {
            name: "tbbo",
            columns: &[
                ("ts_event", "timestamptz"),
                ("instrument_id", "integer"),
                ("symbol", "text"),
                ("price", "numeric"),
                ("size", "bigint"),
                ("side", "text"),
                ("bid_price", "numeric"),
                ("bid_size", "bigint"),
                ("ask_price", "numeric"),
                ("ask_size", "bigint"),
            ],
            natural_key: &["ts_event", "instrument_id"],
        },
        Schema::Statistics => TableDef {
            name: "statistics",
            columns: &[
                ("ts_event", "timestamptz"),
                ("instrument_id", "integer"),
                ("symbol", "text"),
                ("stat_type", "text"),
                ("update_action", "text"),
                ("price", "numeric"),
                ("quantity", "bigint"),
                ("ts_ref", "timestamptz"),
            ],
            natural_key: &["ts_event", "instrument_id", "stat_type"],
        },
        Schema::Definition => TableDef {
            name: "definitions",
            columns: &[
                ("ts_event", "timestamptz"),
                ("instrument_id", "integer"),
                ("symbol", "text"),
                ("raw_symbol", "text"),
                ("instrument_class", "text"),
                ("dataset", "text"),
                ("exchange", "text"),
                ("asset", "text"),
                ("currency", "text"),
                ("strike_price", "numeric"),
                ("put_call", "text"),
                ("leg_count", "integer"),
            ],
            natural_key: &["instrument_id", "dataset"],
        },
    }
}

/// Renders `CREATE TABLE IF NOT EXISTS` for every known target table plus
/// `instrument_mapping`, partitioned by `ts_event` where the table has one.
pub fn create_all_statements() -> Vec<String> {
    let schemas = [
        Schema::Ohlcv(crate::enums::Granularity::Day1),
        Schema::Trades,
        Schema::Tbbo,
        Schema::Statistics,
        Schema::Definition,
    ];
    let mut statements: Vec<String> = schemas.iter().map(create_table_statement).collect();
    statements.push(
        "CREATE TABLE IF NOT EXISTS instrument_mapping ( \
            dataset text NOT NULL, \
            raw_symbol text NOT NULL, \
            instrument_id integer NOT NULL, \
            PRIMARY KEY (dataset, raw_symbol) \
        )"
        .to_owned(),
    );
    statements
}

fn create_table_statement(schema: &Schema) -> String {
    let def = table_def(schema);
    let columns = def
        .columns
        .iter()
        .map(|(name, ty)| format!("{name} {ty}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}, ts_event)) PARTITION BY RANGE (ts_event)",
        def.name,
        columns,
        def.natural_key.iter().filter(|c| **c != "ts_event").cloned().collect::<Vec<_>>().join(", "),
    )
}

/// Renders a `CREATE TABLE IF NOT EXISTS ... PARTITION OF` statement for the
/// calendar month containing `day`.
pub fn create_partition_statement(table: &str, day: Date) -> String {
    let start = Date::from_calendar_date(day.year(), day.month(), 1).expect("valid month start");
    let end = month_after(start);
    format!(
        "CREATE TABLE IF NOT EXISTS {table}_{year:04}{month:02} PARTITION OF {table} \
         FOR VALUES FROM ('{start}') TO ('{end}')",
        year = start.year(),
        month = u8::from(start.month()),
    )
}

fn month_after(start: Date) -> Date {
    let (year, month) = (start.year(), u8::from(start.month()));
    if month == 12 {
        Date::from_calendar_date(year + 1, time::Month::January, 1).expect("valid date")
    } else {
        let next = time::Month::try_from(month + 1).expect("valid month");
        Date::from_calendar_date(year, next, 1).expect("valid date")
    }
}

/// Statements needed before any record for `schema` on `day` can be loaded:
/// the parent table, and that day's monthly partition.
pub fn ensure_statements(schema: &Schema, day: Date) -> Result<Vec<String>> {
    let def = table_def(schema);
    Ok(vec![
        create_table_statement(schema),
        create_partition_statement(def.name, day),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn partition_statement_spans_one_calendar_month() {
        let stmt = create_partition_statement("trades", date!(2024 - 03 - 15));
        assert!(stmt.contains("FROM ('2024-03-01')"));
        assert!(stmt.contains("TO ('2024-04-01')"));
    }

    #[test]
    fn december_partition_rolls_into_next_year() {
        let stmt = create_partition_statement("trades", date!(2024 - 12 - 05));
        assert!(stmt.contains("TO ('2025-01-01')"));
    }

    #[test]
    fn create_all_statements_covers_every_schema_and_instrument_mapping() {
        let statements = create_all_statements();
        assert_eq!(statements.len(), 6);
        assert!(statements.iter().any(|s| s.contains("instrument_mapping")));
    }
}
