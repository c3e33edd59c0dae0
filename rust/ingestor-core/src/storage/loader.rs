//! Storage Loader (C7, §4.6): idempotent batch upserts into the
//! time-partitioned target tables.

use std::collections::BTreeSet;

use sqlx::{PgPool, Postgres, QueryBuilder};
use time::Date;
use tracing::info;

use crate::error::Result;
use crate::standardized::{ColumnValue, StandardizedRecord};
use crate::storage::schema::{self, table_def};

/// The maximum number of rows folded into a single multi-row `INSERT`.
const MAX_BATCH_ROWS: usize = 500;

/// Loads [`StandardizedRecord`]s into Postgres (or a Postgres-compatible
/// dialect, e.g. TimescaleDB), upserting on each table's natural key so a
/// re-ingested chunk overwrites rather than duplicates.
pub struct StorageLoader {
    pool: PgPool,
}

impl StorageLoader {
    /// Wraps an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates every target table and `instrument_mapping` if they don't
    /// already exist.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::Load`] if any `CREATE TABLE` fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in schema::create_all_statements() {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Upserts `records`, which must all share one [`crate::enums::Schema`]
    /// (the orchestrator groups a chunk's output by schema before calling
    /// this). Rows are chunked into batches of at most
    /// [`MAX_BATCH_ROWS`] to keep the generated statement's parameter
    /// count well under Postgres's limit.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::Load`] if the upsert statement fails;
    /// the whole batch's transaction is rolled back.
    pub async fn load_batch(&self, records: &[StandardizedRecord]) -> Result<usize> {
        let Some(first) = records.first() else {
            return Ok(0);
        };
        let def = table_def(&first.schema);
        let mut loaded = 0;

        for batch in records.chunks(MAX_BATCH_ROWS) {
            let mut tx = self.pool.begin().await?;

            for day in partition_months(batch) {
                for statement in schema::ensure_statements(&first.schema, day)? {
                    sqlx::query(&statement).execute(&mut *tx).await?;
                }
            }

            let column_list = def.columns.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", ");
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({column_list}) ", def.name));

            qb.push_values(batch.iter(), |mut row, record| {
                for (name, _ty) in def.columns {
                    match record.get(name).unwrap_or(&ColumnValue::Null) {
                        ColumnValue::Int(v) => {
                            row.push_bind(*v);
                        }
                        ColumnValue::Decimal(v) => {
                            row.push_bind(*v);
                        }
                        ColumnValue::Text(v) => {
                            row.push_bind(v.clone());
                        }
                        ColumnValue::Timestamp(v) => {
                            row.push_bind(*v);
                        }
                        ColumnValue::Bool(v) => {
                            row.push_bind(*v);
                        }
                        ColumnValue::Null => {
                            row.push("NULL");
                        }
                    }
                }
            });

            qb.push(format!(" ON CONFLICT ({}) DO UPDATE SET ", def.natural_key.join(", ")));
            let update_columns = def
                .columns
                .iter()
                .map(|(name, _)| *name)
                .filter(|name| !def.natural_key.contains(name))
                .collect::<Vec<_>>();
            for (i, name) in update_columns.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                qb.push(format!("{name} = EXCLUDED.{name}"));
            }

            qb.build().execute(&mut *tx).await?;
            tx.commit().await?;
            loaded += batch.len();
        }

        info!(table = def.name, count = loaded, "loaded batch");
        Ok(loaded)
    }
}

/// Every distinct calendar month touched by `batch`'s `ts_event` column,
/// normalized to that month's first day so [`schema::ensure_statements`] is
/// called at most once per month rather than once per row.
fn partition_months(batch: &[StandardizedRecord]) -> BTreeSet<Date> {
    batch
        .iter()
        .filter_map(|record| match record.get("ts_event") {
            Some(ColumnValue::Timestamp(ts)) => {
                let day = ts.date();
                Date::from_calendar_date(day.year(), day.month(), 1).ok()
            }
            _ => None,
        })
        .collect()
}

// Exercised against a live Postgres in the workspace's docker-compose
// integration suite, not here; `schema::tests` covers the DDL generation
// this module depends on without a database.
