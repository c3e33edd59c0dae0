//! Re-exports this crate's derive macros.

pub use ingestor_macros::SchemaRecord;
