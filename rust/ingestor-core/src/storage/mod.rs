//! Storage Loader (C7, §4.6): schema DDL and idempotent batch upserts into
//! a time-partitioned, Postgres-compatible store.

pub mod loader;
pub mod schema;

pub use loader::StorageLoader;
pub use schema::{table_def, TableDef};
