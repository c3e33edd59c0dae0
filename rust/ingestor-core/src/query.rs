//! Read path (C9, §4.8): queries a target table back out as
//! [`StandardizedRecord`]-shaped rows, lists known symbols, and resolves
//! symbols to `instrument_id`s.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use time::OffsetDateTime;

use crate::enums::Schema;
use crate::error::Result;
use crate::standardized::ColumnValue;
use crate::storage::table_def;

/// One row read back from a target table, with the same column shape as
/// [`crate::standardized::StandardizedRecord`] so query results and ingested
/// records can share a CSV projection in the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    /// The mapped column values, keyed by column name, in table order.
    pub columns: BTreeMap<String, ColumnValue>,
}

impl QueryRow {
    /// Renders this row as one CSV record, in `column_order`.
    pub fn to_csv_fields(&self, column_order: &[&str]) -> Vec<String> {
        column_order
            .iter()
            .map(|col| match self.columns.get(*col) {
                Some(ColumnValue::Int(v)) => v.to_string(),
                Some(ColumnValue::Decimal(v)) => v.to_string(),
                Some(ColumnValue::Text(v)) => v.clone(),
                Some(ColumnValue::Timestamp(v)) => v
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default(),
                Some(ColumnValue::Bool(v)) => v.to_string(),
                Some(ColumnValue::Null) | None => String::new(),
            })
            .collect()
    }
}

/// Reads standardized records and symbol metadata back out of storage.
pub struct QueryEngine {
    pool: PgPool,
}

impl QueryEngine {
    /// Wraps an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Selects every row of `schema`'s target table for `instrument_id`
    /// within `[start, end]`, ordered by `ts_event`.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::Load`] on a query failure.
    pub async fn query(
        &self,
        schema: &Schema,
        instrument_id: i32,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<QueryRow>> {
        let def = table_def(schema);
        let column_list = def.columns.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", ");
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {column_list} FROM {} WHERE instrument_id = ",
            def.name
        ));
        qb.push_bind(instrument_id);
        qb.push(" AND ts_event >= ");
        qb.push_bind(start);
        qb.push(" AND ts_event <= ");
        qb.push_bind(end);
        qb.push(" ORDER BY ts_event");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(|row| decode_row(row, &def)).collect()
    }

    /// Lists every distinct `raw_symbol` ingested for `dataset`.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::Load`] on a query failure.
    pub async fn available_symbols(&self, dataset: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT raw_symbol FROM instrument_mapping WHERE dataset = $1 ORDER BY raw_symbol",
        )
        .bind(dataset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("raw_symbol"))
            .collect())
    }

    /// Resolves `raw_symbols` to their `instrument_id`s for `dataset`,
    /// returning only the symbols that were found.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::Load`] on a query failure.
    pub async fn resolve_symbols(
        &self,
        dataset: &str,
        raw_symbols: &[String],
    ) -> Result<BTreeMap<String, u32>> {
        if raw_symbols.is_empty() {
            return Ok(BTreeMap::new());
        }
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT raw_symbol, instrument_id FROM instrument_mapping WHERE dataset = ",
        );
        qb.push_bind(dataset);
        qb.push(" AND raw_symbol IN (");
        let mut separated = qb.separated(", ");
        for symbol in raw_symbols {
            separated.push_bind(symbol.clone());
        }
        separated.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get::<String, _>("raw_symbol"),
                    row.get::<i32, _>("instrument_id") as u32,
                )
            })
            .collect())
    }
}

fn decode_row(row: &sqlx::postgres::PgRow, def: &crate::storage::TableDef) -> Result<QueryRow> {
    let mut columns = BTreeMap::new();
    for (name, ty) in def.columns {
        let value = match *ty {
            "bigint" => row
                .try_get::<Option<i64>, _>(*name)
                .unwrap_or(None)
                .map(ColumnValue::Int)
                .unwrap_or(ColumnValue::Null),
            "integer" => row
                .try_get::<Option<i32>, _>(*name)
                .unwrap_or(None)
                .map(|v| ColumnValue::Int(v as i64))
                .unwrap_or(ColumnValue::Null),
            "numeric" => row
                .try_get::<Option<Decimal>, _>(*name)
                .unwrap_or(None)
                .map(ColumnValue::Decimal)
                .unwrap_or(ColumnValue::Null),
            "timestamptz" => row
                .try_get::<Option<OffsetDateTime>, _>(*name)
                .unwrap_or(None)
                .map(ColumnValue::Timestamp)
                .unwrap_or(ColumnValue::Null),
            _ => row
                .try_get::<Option<String>, _>(*name)
                .unwrap_or(None)
                .map(ColumnValue::Text)
                .unwrap_or(ColumnValue::Null),
        };
        columns.insert((*name).to_owned(), value);
    }
    Ok(QueryRow { columns })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_fields_render_in_requested_column_order_with_blanks_for_missing() {
        let mut columns = BTreeMap::new();
        columns.insert("price".to_owned(), ColumnValue::Decimal(Decimal::new(5025, 2)));
        columns.insert("side".to_owned(), ColumnValue::Text("B".to_owned()));
        let row = QueryRow { columns };
        let fields = row.to_csv_fields(&["side", "price", "sequence"]);
        assert_eq!(fields, vec!["B".to_owned(), "50.25".to_owned(), String::new()]);
    }
}
