//! Resolves vendor symbols to the `instrument_id` the storage layer uses as
//! its foreign key, backed by the `instrument_mapping` table (§4.2).
//!
//! Generalizes `dbn`'s in-memory `PitSymbolMap`/`TsSymbolMap` (built once
//! from a decoded metadata header) into a cache fronting a live Postgres
//! table: a job resolves its configured symbols once at startup, and any
//! `Definition` record seen mid-job both updates the cache and upserts the
//! row so later jobs resolve without a vendor round trip.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::error::{Error, Result};

/// An in-memory, bidirectional snapshot of `instrument_id <-> raw_symbol`,
/// scoped to the symbols a single job cares about.
///
/// Mirrors the shape of `dbn::symbol_map::PitSymbolMap`: point-in-time,
/// not time-partitioned, since within one job run an instrument's raw
/// symbol does not change.
#[derive(Debug, Clone, Default)]
struct SymbolCache {
    by_symbol: HashMap<String, u32>,
    by_id: HashMap<u32, String>,
}

impl SymbolCache {
    fn insert(&mut self, instrument_id: u32, raw_symbol: &str) {
        self.by_symbol.insert(raw_symbol.to_owned(), instrument_id);
        self.by_id.insert(instrument_id, raw_symbol.to_owned());
    }
}

/// A resolver from vendor symbols to `instrument_id`, backed by the
/// `instrument_mapping` table.
pub struct SymbolMap {
    pool: PgPool,
    cache: SymbolCache,
}

impl SymbolMap {
    /// Creates an empty map over `pool`. Call [`Self::preload`] or
    /// [`Self::resolve`] to populate it.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: SymbolCache::default(),
        }
    }

    /// Looks up `raw_symbol`'s `instrument_id`, consulting the in-memory
    /// cache before falling back to `instrument_mapping`.
    ///
    /// # Errors
    /// Returns [`Error::SymbolResolution`] if no mapping exists for
    /// `raw_symbol` in `dataset`, and [`Error::Load`] on a database error.
    pub async fn resolve(&mut self, dataset: &str, raw_symbol: &str) -> Result<u32> {
        if let Some(&id) = self.cache.by_symbol.get(raw_symbol) {
            return Ok(id);
        }
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT instrument_id FROM instrument_mapping WHERE dataset = $1 AND raw_symbol = $2",
        )
        .bind(dataset)
        .bind(raw_symbol)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((id,)) => {
                let id = id as u32;
                self.cache.insert(id, raw_symbol);
                Ok(id)
            }
            None => Err(Error::SymbolResolution(vec![raw_symbol.to_owned()])),
        }
    }

    /// Resolves every symbol in `raw_symbols`, collecting every unresolved
    /// one into a single [`Error::SymbolResolution`] rather than failing on
    /// the first miss, so an operator sees the whole gap at once.
    pub async fn resolve_many(
        &mut self,
        dataset: &str,
        raw_symbols: &[String],
    ) -> Result<Vec<u32>> {
        let mut resolved = Vec::with_capacity(raw_symbols.len());
        let mut missing = Vec::new();
        for symbol in raw_symbols {
            match self.resolve(dataset, symbol).await {
                Ok(id) => resolved.push(id),
                Err(Error::SymbolResolution(mut syms)) => missing.append(&mut syms),
                Err(other) => return Err(other),
            }
        }
        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(Error::SymbolResolution(missing))
        }
    }

    /// Looks up the raw symbol for a previously resolved `instrument_id`,
    /// using only the in-memory cache (no database round trip).
    pub fn symbol_for(&self, instrument_id: u32) -> Option<&str> {
        self.cache.by_id.get(&instrument_id).map(String::as_str)
    }

    /// Upserts a vendor-confirmed mapping, as observed in a [`crate::record::Definition`]
    /// record, into both `instrument_mapping` and the in-memory cache.
    ///
    /// # Errors
    /// Returns [`Error::Load`] on a database error.
    pub async fn upsert(&mut self, dataset: &str, instrument_id: u32, raw_symbol: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO instrument_mapping (dataset, raw_symbol, instrument_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (dataset, raw_symbol) DO UPDATE SET instrument_id = EXCLUDED.instrument_id",
        )
        .bind(dataset)
        .bind(raw_symbol)
        .bind(instrument_id as i32)
        .execute(&self.pool)
        .await?;
        self.cache.insert(instrument_id, raw_symbol);
        Ok(())
    }

    /// The number of mappings currently cached in memory.
    pub fn cached_len(&self) -> usize {
        self.cache.by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_is_bidirectional() {
        let mut cache = SymbolCache::default();
        cache.insert(123, "ES.c.0");
        assert_eq!(cache.by_symbol.get("ES.c.0"), Some(&123));
        assert_eq!(cache.by_id.get(&123).map(String::as_str), Some("ES.c.0"));
    }

    #[test]
    fn reinserting_an_id_overwrites_the_old_symbol() {
        let mut cache = SymbolCache::default();
        cache.insert(123, "ES.c.0");
        cache.insert(123, "ES.c.1");
        assert_eq!(cache.by_id.get(&123).map(String::as_str), Some("ES.c.1"));
        assert!(!cache.by_symbol.contains_key("ES.c.0"));
    }
}
