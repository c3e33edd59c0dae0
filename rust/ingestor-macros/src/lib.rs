//! Derive macros for `ingestor-core`'s record types.

mod schema_record;
mod utils;

use proc_macro::TokenStream;

/// Derives [`ingestor_core::record::Record`] for a record struct with a
/// fixed schema.
///
/// Requires a `common: RecordCommon` field and a
/// `#[schema_record(schema = "...")]` attribute naming one of `trades`,
/// `tbbo`, `statistics`, or `definition`. `Ohlcv`'s schema depends on its
/// `granularity` field and implements `Record` by hand instead.
#[proc_macro_derive(SchemaRecord, attributes(schema_record))]
pub fn derive_schema_record(input: TokenStream) -> TokenStream {
    schema_record::derive_impl(input)
}
