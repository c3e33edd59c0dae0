//! The Rule Engine (C4, §4.3): maps a decoded [`TypedRecord`] onto a
//! [`StandardizedRecord`] using a declarative, per-schema [`SchemaMapping`],
//! then checks its named [`config::TransformationRule`]s.

pub mod config;
pub mod eval;

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;

pub use config::{ConditionalMapping, GlobalSettings, RuleEngineConfig, SchemaMapping, TransformationRule};
pub use eval::{Env, Expr, Value};

use crate::enums::Schema;
use crate::error::{Error, Result};
use crate::record::TypedRecord;
use crate::standardized::{ColumnValue, StandardizedRecord};
use crate::storage::table_def;

/// The result of mapping one [`TypedRecord`]: either a completed
/// [`StandardizedRecord`], or a transformation rule violation that
/// `global_settings.skip_validation_errors` allows to be quarantined rather
/// than aborting the whole batch.
pub enum MapOutcome {
    /// The record mapped cleanly, with no transformation rule violated.
    Mapped(StandardizedRecord),
    /// A transformation rule was violated, and `skip_validation_errors` is
    /// `true`; the caller should quarantine (stage=transform) and move on.
    Violated(Error),
}

/// One schema's mapping, compiled once at construction so `apply` never
/// re-parses a rule expression.
struct CompiledMapping {
    field_mappings: HashMap<String, String>,
    defaults: Vec<(String, ColumnValue)>,
    conditional: Vec<(Expr, HashMap<String, String>)>,
    transformations: Vec<(String, Vec<String>, Expr)>,
}

/// Maps [`TypedRecord`]s onto [`StandardizedRecord`]s per the loaded
/// [`RuleEngineConfig`].
pub struct RuleEngine {
    config: RuleEngineConfig,
    compiled: HashMap<String, CompiledMapping>,
}

impl RuleEngine {
    /// Builds a rule engine from a loaded configuration, compiling every
    /// rule expression and checking that every mapped or defaulted column
    /// actually exists on its target table.
    ///
    /// When `strict_mode` is `true`, every known column of a schema's
    /// target table must have explicit provenance (a `field_mappings`,
    /// `defaults`, or `conditional_mappings` entry); when `false`, gaps are
    /// tolerated and left `NULL` at load time.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if a schema code doesn't parse, a mapping
    /// key names a column absent from the target table, a rule or
    /// condition's expression fails to parse, or (under `strict_mode`) a
    /// known column has no provenance.
    pub fn new(config: RuleEngineConfig, strict_mode: bool) -> Result<Self> {
        let mut compiled = HashMap::with_capacity(config.schema_mappings.len());
        for (schema_code, mapping) in &config.schema_mappings {
            let schema = Schema::from_str(schema_code)?;
            let known: Vec<&str> = table_def(&schema).columns.iter().map(|(name, _)| *name).collect();

            let defaults = mapping
                .defaults
                .iter()
                .map(|(column, value)| Ok((column.clone(), yaml_to_column(value)?)))
                .collect::<Result<Vec<_>>>()?;

            let conditional = config
                .conditional_mappings_for(schema_code)
                .iter()
                .map(|c| Ok((Expr::parse(&c.when)?, c.field_mappings.clone())))
                .collect::<Result<Vec<_>>>()?;

            let transformations = mapping
                .transformations
                .iter()
                .map(|(name, rule)| Ok((name.clone(), rule.fields.clone(), Expr::parse(&rule.rule)?)))
                .collect::<Result<Vec<_>>>()?;

            let mut provided: Vec<&str> = mapping.field_mappings.values().map(String::as_str).collect();
            provided.extend(defaults.iter().map(|(c, _)| c.as_str()));
            provided.extend(conditional.iter().flat_map(|(_, fm)| fm.values().map(String::as_str)));

            for column in &provided {
                if !known.contains(column) {
                    return Err(Error::Config(format!(
                        "schema '{schema_code}' maps unknown column '{column}'"
                    )));
                }
            }
            if strict_mode {
                for column in &known {
                    if !provided.contains(column) {
                        return Err(Error::Config(format!(
                            "schema '{schema_code}' has no provenance for column '{column}' under strict_mode"
                        )));
                    }
                }
            }

            compiled.insert(
                schema_code.clone(),
                CompiledMapping {
                    field_mappings: mapping.field_mappings.clone(),
                    defaults,
                    conditional,
                    transformations,
                },
            );
        }
        Ok(Self { config, compiled })
    }

    /// Applies the configured mapping for `record`'s schema: `defaults`,
    /// then `field_mappings`, then `conditional_mappings`, then every
    /// `transformations` rule.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if no mapping is configured for the
    /// record's schema, and [`Error::Transform`] if a rule expression
    /// references an unknown field, or if a violated rule's
    /// `skip_validation_errors` is `false`.
    pub fn apply(&self, record: &TypedRecord) -> Result<MapOutcome> {
        let schema = record.schema();
        let code = schema.code();
        let compiled = self
            .compiled
            .get(&code)
            .ok_or_else(|| Error::Config(format!("no rule mapping configured for schema '{schema}'")))?;
        let env = record_env(record);

        let mut out = StandardizedRecord::new(schema);
        for (column, value) in &compiled.defaults {
            out = out.with_column(column.clone(), value.clone());
        }
        for (src, dst) in &compiled.field_mappings {
            out = out.with_column(dst.clone(), field_value(&env, src));
        }
        for (when, field_mappings) in &compiled.conditional {
            if matches!(when.eval(&env)?, Value::Bool(true)) {
                for (src, dst) in field_mappings {
                    out = out.with_column(dst.clone(), field_value(&env, src));
                }
            }
        }

        match self.check_transformations(compiled, &env)? {
            Some(violation) if self.config.global_settings.skip_validation_errors => {
                Ok(MapOutcome::Violated(violation))
            }
            Some(violation) => Err(violation),
            None => Ok(MapOutcome::Mapped(out)),
        }
    }

    fn check_transformations(&self, compiled: &CompiledMapping, env: &Env) -> Result<Option<Error>> {
        for (rule_name, fields, expr) in &compiled.transformations {
            if fields.is_empty() {
                if !eval_rule_bool(expr, env, rule_name)? {
                    return Ok(Some(Error::Transform {
                        rule_name: rule_name.clone(),
                        detail: "rule evaluated to false".to_owned(),
                    }));
                }
                continue;
            }
            for field in fields {
                let mut field_env = env.clone();
                field_env.insert("value".to_owned(), env.get(field).cloned().unwrap_or(Value::Null));
                if !eval_rule_bool(expr, &field_env, rule_name)? {
                    return Ok(Some(Error::Transform {
                        rule_name: rule_name.clone(),
                        detail: format!("field '{field}' failed rule"),
                    }));
                }
            }
        }
        Ok(None)
    }
}

fn field_value(env: &Env, field: &str) -> ColumnValue {
    ColumnValue::from(env.get(field).cloned().unwrap_or(Value::Null))
}

fn eval_rule_bool(expr: &Expr, env: &Env, rule_name: &str) -> Result<bool> {
    match expr.eval(env)? {
        Value::Bool(b) => Ok(b),
        other => Err(Error::Transform {
            rule_name: rule_name.to_owned(),
            detail: format!("rule produced {other:?}, expected a boolean"),
        }),
    }
}

fn yaml_to_column(value: &serde_yaml::Value) -> Result<ColumnValue> {
    match value {
        serde_yaml::Value::Null => Ok(ColumnValue::Null),
        serde_yaml::Value::Bool(b) => Ok(ColumnValue::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(ColumnValue::Int(i))
            } else {
                Decimal::from_str(&n.to_string())
                    .map(ColumnValue::Decimal)
                    .map_err(|e| Error::Config(format!("invalid numeric default '{n}': {e}")))
            }
        }
        serde_yaml::Value::String(s) => Ok(ColumnValue::Text(s.clone())),
        other => Err(Error::Config(format!("unsupported default value {other:?}"))),
    }
}

/// Flattens a [`TypedRecord`]'s fields into an [`Env`] keyed by field name,
/// the only surface rule expressions and field mappings can see.
fn record_env(record: &TypedRecord) -> Env {
    let mut env: Env = HashMap::new();
    let common = record.common();
    env.insert("ts_event".to_owned(), Value::Timestamp(common.ts_event));
    env.insert(
        "instrument_id".to_owned(),
        common
            .instrument_id
            .map(|id| Value::Int(id as i64))
            .unwrap_or(Value::Null),
    );
    env.insert(
        "symbol".to_owned(),
        common
            .symbol
            .clone()
            .map(Value::Text)
            .unwrap_or(Value::Null),
    );

    let opt_decimal = |d: Option<Decimal>| d.map(Value::Decimal).unwrap_or(Value::Null);
    let opt_int = |i: Option<i64>| i.map(Value::Int).unwrap_or(Value::Null);

    match record {
        TypedRecord::Ohlcv(bar) => {
            env.insert("granularity".to_owned(), Value::Text(bar.granularity.to_string()));
            env.insert("open".to_owned(), Value::Decimal(bar.open));
            env.insert("high".to_owned(), Value::Decimal(bar.high));
            env.insert("low".to_owned(), Value::Decimal(bar.low));
            env.insert("close".to_owned(), Value::Decimal(bar.close));
            env.insert("volume".to_owned(), Value::Int(bar.volume as i64));
            env.insert("trade_count".to_owned(), opt_int(bar.trade_count));
        }
        TypedRecord::Trade(trade) => {
            env.insert("price".to_owned(), Value::Decimal(trade.price));
            env.insert("size".to_owned(), Value::Int(trade.size as i64));
            env.insert("side".to_owned(), Value::Text(char::from(trade.side).to_string()));
            env.insert("depth".to_owned(), opt_int(trade.depth.map(|d| d as i64)));
            env.insert("sequence".to_owned(), opt_int(trade.sequence.map(|s| s as i64)));
        }
        TypedRecord::Tbbo(tbbo) => {
            env.insert("price".to_owned(), Value::Decimal(tbbo.price));
            env.insert("size".to_owned(), Value::Int(tbbo.size as i64));
            env.insert("side".to_owned(), Value::Text(char::from(tbbo.side).to_string()));
            env.insert("bid_price".to_owned(), opt_decimal(tbbo.bid_price));
            env.insert("bid_size".to_owned(), opt_int(tbbo.bid_size.map(|s| s as i64)));
            env.insert("ask_price".to_owned(), opt_decimal(tbbo.ask_price));
            env.insert("ask_size".to_owned(), opt_int(tbbo.ask_size.map(|s| s as i64)));
        }
        TypedRecord::Statistic(stat) => {
            env.insert("stat_type".to_owned(), Value::Text(stat.stat_type.to_string()));
            env.insert(
                "update_action".to_owned(),
                Value::Int(u8::from(stat.update_action) as i64),
            );
            env.insert("price".to_owned(), opt_decimal(stat.price));
            env.insert("quantity".to_owned(), opt_int(stat.quantity));
            env.insert(
                "ts_ref".to_owned(),
                stat.ts_ref.map(Value::Timestamp).unwrap_or(Value::Null),
            );
        }
        TypedRecord::Definition(def) => {
            env.insert("raw_symbol".to_owned(), Value::Text(def.raw_symbol.clone()));
            env.insert("dataset".to_owned(), Value::Text(def.dataset.clone()));
            env.insert("exchange".to_owned(), Value::Text(def.exchange.clone()));
            env.insert("asset".to_owned(), Value::Text(def.asset.clone()));
            env.insert("currency".to_owned(), Value::Text(def.currency.clone()));
            env.insert(
                "min_price_increment".to_owned(),
                opt_decimal(def.min_price_increment),
            );
            env.insert("display_factor".to_owned(), opt_decimal(def.display_factor));
            env.insert("strike_price".to_owned(), opt_decimal(def.strike_price));
            env.insert("leg_count".to_owned(), Value::Int(def.leg_count as i64));
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_records;

    fn trades_config(skip_validation_errors: bool) -> RuleEngineConfig {
        RuleEngineConfig::from_yaml(&format!(
            r#"
schema_mappings:
  trades:
    source_model: Trade
    target_schema: trades
    field_mappings:
      price: price
      size: size
      side: side
      sequence: sequence
    transformations:
      positive_price:
        fields: [price]
        rule: "value > 0"
global_settings:
  skip_validation_errors: {skip_validation_errors}
"#
        ))
        .unwrap()
    }

    fn sample_trade() -> TypedRecord {
        sample_records()
            .into_iter()
            .find(|r| matches!(r, TypedRecord::Trade(_)))
            .unwrap()
    }

    #[test]
    fn maps_trade_via_field_mappings() {
        let engine = RuleEngine::new(trades_config(true), false).unwrap();
        match engine.apply(&sample_trade()).unwrap() {
            MapOutcome::Mapped(mapped) => {
                assert!(mapped.get("price").is_some());
                assert!(mapped.get("side").is_some());
            }
            MapOutcome::Violated(e) => panic!("expected a mapped record, got violation: {e}"),
        }
    }

    #[test]
    fn violated_rule_is_quarantined_when_skip_validation_errors() {
        let config = trades_config(true);
        let engine = RuleEngine::new(config, false).unwrap();
        let TypedRecord::Trade(mut trade) = sample_trade() else {
            unreachable!()
        };
        trade.price = rust_decimal_macros::dec!(-1);
        match engine.apply(&TypedRecord::Trade(trade)).unwrap() {
            MapOutcome::Violated(Error::Transform { rule_name, .. }) => {
                assert_eq!(rule_name, "positive_price");
            }
            _ => panic!("expected a violation"),
        }
    }

    #[test]
    fn violated_rule_aborts_when_skip_validation_errors_is_false() {
        let config = trades_config(false);
        let engine = RuleEngine::new(config, false).unwrap();
        let TypedRecord::Trade(mut trade) = sample_trade() else {
            unreachable!()
        };
        trade.price = rust_decimal_macros::dec!(-1);
        assert!(matches!(
            engine.apply(&TypedRecord::Trade(trade)),
            Err(Error::Transform { .. })
        ));
    }

    #[test]
    fn unmapped_schema_is_a_config_error() {
        let engine = RuleEngine::new(RuleEngineConfig::default(), false).unwrap();
        assert!(matches!(engine.apply(&sample_trade()), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_target_column_is_rejected_at_construction() {
        let config = RuleEngineConfig::from_yaml(
            r#"
schema_mappings:
  trades:
    source_model: Trade
    target_schema: trades
    field_mappings:
      price: not_a_real_column
"#,
        )
        .unwrap();
        assert!(matches!(RuleEngine::new(config, false), Err(Error::Config(_))));
    }

    #[test]
    fn strict_mode_requires_every_known_column_to_have_provenance() {
        let config = trades_config(true);
        assert!(matches!(RuleEngine::new(config.clone(), true), Err(Error::Config(_))));
        assert!(RuleEngine::new(config, false).is_ok());
    }
}
