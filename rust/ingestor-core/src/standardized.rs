//! The Rule Engine's output type (§4.3): a [`TypedRecord`](crate::record::TypedRecord)
//! with its fields renamed and reshaped onto the target table's columns.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::enums::Schema;

/// A single mapped column value.
///
/// Intentionally not `serde_json::Value`: a rule that maps a vendor field
/// onto the wrong SQL type should fail loudly in [`crate::validate`] rather
/// than silently coerce through JSON's number/string duck typing (the exact
/// hazard §9 calls out).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ColumnValue {
    /// A signed 64-bit integer column.
    Int(i64),
    /// An arbitrary-precision decimal column.
    Decimal(Decimal),
    /// A text column.
    Text(String),
    /// A UTC timestamp column.
    Timestamp(OffsetDateTime),
    /// A boolean column.
    Bool(bool),
    /// An explicit SQL `NULL`.
    Null,
}

impl ColumnValue {
    /// Returns `true` if this value is [`ColumnValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// Returns the inner [`Decimal`], or `None` if this isn't a decimal
    /// column.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            ColumnValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the inner [`i64`], or `None` if this isn't an integer column.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ColumnValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the inner `&str`, or `None` if this isn't a text column.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A record after field mapping, ready for [`crate::validate`] and then
/// [`crate::storage`].
///
/// `columns` is ordered (`BTreeMap`) so the storage loader can build a
/// deterministic, cacheable `INSERT` statement per `target_table` rather
/// than rebuilding column order per row.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StandardizedRecord {
    /// The schema the source record belonged to.
    pub schema: Schema,
    /// The table this record is loaded into.
    pub target_table: &'static str,
    /// The mapped column values, keyed by target column name.
    pub columns: BTreeMap<String, ColumnValue>,
}

impl StandardizedRecord {
    /// Creates an empty standardized record for `schema`, with
    /// `target_table` taken from [`Schema::target_table`].
    pub fn new(schema: Schema) -> Self {
        Self {
            target_table: schema.target_table(),
            schema,
            columns: BTreeMap::new(),
        }
    }

    /// Sets `column` to `value`, returning `self` for chaining from the rule
    /// engine's field-by-field mapping loop.
    pub fn with_column(mut self, column: impl Into<String>, value: ColumnValue) -> Self {
        self.columns.insert(column.into(), value);
        self
    }

    /// Returns the value mapped onto `column`, if any.
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns.get(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn with_column_overwrites_existing_value() {
        let rec = StandardizedRecord::new(Schema::Trades)
            .with_column("price", ColumnValue::Decimal(dec!(1)))
            .with_column("price", ColumnValue::Decimal(dec!(2)));
        assert_eq!(rec.get("price").and_then(ColumnValue::as_decimal), Some(dec!(2)));
    }

    #[test]
    fn target_table_follows_schema() {
        let rec = StandardizedRecord::new(Schema::Definition);
        assert_eq!(rec.target_table, "definitions");
    }
}
