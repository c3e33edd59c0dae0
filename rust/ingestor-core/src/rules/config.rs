//! The declarative YAML shape of a rule set (§4.3): one [`SchemaMapping`]
//! per ingested schema, field mappings and defaults that build a
//! [`crate::standardized::StandardizedRecord`], named boolean
//! [`TransformationRule`]s that validate it, plus schema-keyed
//! [`ConditionalMapping`]s and settings shared across every schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named boolean validation rule (§4.3): either per-field (`fields` lists
/// the source fields `value` is bound to in turn, one evaluation per field)
/// or global (`fields` empty, evaluated once with the full record in scope
/// and no `value` binding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationRule {
    /// Source fields this rule is evaluated against, binding `value` to each
    /// in turn. Empty means a global rule.
    #[serde(default)]
    pub fields: Vec<String>,
    /// A boolean [`crate::rules::eval`] expression; `false` is a violation.
    pub rule: String,
}

/// A mapping applied after [`SchemaMapping::field_mappings`] when `when`
/// evaluates to `true` against the full record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalMapping {
    /// A boolean [`crate::rules::eval`] expression.
    pub when: String,
    /// Additional `source_attr -> target_column` renames applied when
    /// [`Self::when`] holds.
    pub field_mappings: HashMap<String, String>,
}

/// The full mapping configuration for one ingested schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaMapping {
    /// The [`crate::record::TypedRecord`] variant this mapping applies to,
    /// e.g. `Trade`. Informational: the rule engine already dispatches by
    /// schema code before looking up a mapping, so this is not re-checked.
    #[serde(default)]
    pub source_model: String,
    /// The target table identifier, e.g. `trades`.
    pub target_schema: String,
    /// `source_attr -> target_column` renames, applied after
    /// [`Self::defaults`].
    #[serde(default)]
    pub field_mappings: HashMap<String, String>,
    /// Named boolean validation rules; a violation's disposition is decided
    /// by `global_settings.skip_validation_errors`.
    #[serde(default)]
    pub transformations: HashMap<String, TransformationRule>,
    /// Literal values stamped onto a target column before
    /// [`Self::field_mappings`] is applied, so a mapping for the same column
    /// overrides its default rather than the reverse.
    #[serde(default)]
    pub defaults: HashMap<String, serde_yaml::Value>,
}

/// Settings shared by every schema's mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    /// The timezone every mapped timestamp is normalized to. Only `"UTC"` is
    /// meaningful today; [`crate::standardized`] stores `OffsetDateTime`
    /// values that are already UTC by construction.
    pub timezone_normalization: String,
    /// Decimal places a mapped price column is rounded to.
    pub price_precision: u32,
    /// If `true`, a transformation rule violation is quarantined
    /// (stage=transform) and the record dropped rather than aborting the
    /// batch.
    pub skip_validation_errors: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            timezone_normalization: "UTC".to_owned(),
            price_precision: 8,
            skip_validation_errors: true,
        }
    }
}

/// The top-level rule engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleEngineConfig {
    /// Per-schema mappings, keyed by schema code (e.g. `trades`, `ohlcv-1d`).
    pub schema_mappings: HashMap<String, SchemaMapping>,
    /// Conditional mappings, keyed by schema code, applied after
    /// `field_mappings`.
    pub conditional_mappings: HashMap<String, Vec<ConditionalMapping>>,
    /// Settings shared across every schema's mapping.
    pub global_settings: GlobalSettings,
}

impl RuleEngineConfig {
    /// Loads a [`RuleEngineConfig`] from a YAML string.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the YAML does not parse.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("invalid rule engine YAML: {e}")))
    }

    /// Returns the mapping for `schema_code`, if configured.
    pub fn mapping_for(&self, schema_code: &str) -> Option<&SchemaMapping> {
        self.schema_mappings.get(schema_code)
    }

    /// Returns the conditional mappings configured for `schema_code`, in
    /// declaration order, or an empty slice if none are configured.
    pub fn conditional_mappings_for(&self, schema_code: &str) -> &[ConditionalMapping] {
        self.conditional_mappings
            .get(schema_code)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_yaml() {
        let yaml = r#"
schema_mappings:
  trades:
    source_model: Trade
    target_schema: trades
    field_mappings:
      price: price
      size: size
"#;
        let config = RuleEngineConfig::from_yaml(yaml).unwrap();
        assert!(config.mapping_for("trades").is_some());
        assert!(config.mapping_for("tbbo").is_none());
        assert!(config.global_settings.skip_validation_errors);
    }

    #[test]
    fn loads_conditional_mappings_and_global_settings() {
        let yaml = r#"
schema_mappings:
  trades:
    source_model: Trade
    target_schema: trades
    field_mappings:
      price: price
conditional_mappings:
  trades:
    - when: "size > 0"
      field_mappings:
        size: size
global_settings:
  timezone_normalization: UTC
  price_precision: 4
  skip_validation_errors: false
"#;
        let config = RuleEngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.conditional_mappings_for("trades").len(), 1);
        assert!(config.conditional_mappings_for("tbbo").is_empty());
        assert_eq!(config.global_settings.price_precision, 4);
        assert!(!config.global_settings.skip_validation_errors);
    }
}
