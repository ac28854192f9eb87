//! In-memory table adapter backed by ordered maps.
//!
//! Rows live in a `BTreeMap` keyed by position, so ordered scans come out of
//! the map's own iteration order. Intended for tests and benchmarks; shares
//! tables between engines exactly like a real backend when the same adapter
//! instance is handed to both.

use crate::adapter::{table_name, AggregateColumn, TableAdapter};
use crate::error::{Result, StoreError};
use crate::model::{RawBucket, ScalarValue};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard};

/// One bucket row: shared columns plus one `(count, value)` pair per
/// aggregate that has written to it.
#[derive(Debug, Clone)]
struct MemRow {
    parent_position: i64,
    lower: ScalarValue,
    upper: ScalarValue,
    pairs: HashMap<String, (i64, ScalarValue)>,
}

#[derive(Debug, Default)]
struct MemTable {
    aggregates: Vec<AggregateColumn>,
    rows: BTreeMap<i64, MemRow>,
}

impl MemTable {
    fn raw_bucket(&self, position: i64, row: &MemRow, aggregate: &str) -> RawBucket {
        let (count, value) = row
            .pairs
            .get(aggregate)
            .cloned()
            .unwrap_or((0, ScalarValue::Null));
        RawBucket {
            position,
            parent_position: row.parent_position,
            count,
            value,
            lower: row.lower.clone(),
            upper: row.upper.clone(),
        }
    }
}

/// A [`TableAdapter`] holding all rank tables in process memory.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    tables: Mutex<HashMap<String, MemTable>>,
}

impl MemoryAdapter {
    /// Creates an empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, MemTable>>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::adapter("memory adapter lock poisoned"))
    }
}

fn missing_table(name: &str) -> StoreError {
    StoreError::adapter(format!("no such table: {name}"))
}

impl TableAdapter for MemoryAdapter {
    fn ensure_table(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        _key_type: &str,
        aggregates: &[AggregateColumn],
    ) -> Result<bool> {
        let name = table_name(group, rank, rank_count);
        let mut tables = self.lock()?;
        if tables.contains_key(&name) {
            return Ok(false);
        }
        tables.insert(
            name,
            MemTable {
                aggregates: aggregates.to_vec(),
                rows: BTreeMap::new(),
            },
        );
        Ok(true)
    }

    fn write_at(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        aggregate: &str,
        parent_position: i64,
        position: i64,
        count: i64,
        value: &ScalarValue,
        lower: &ScalarValue,
        upper: &ScalarValue,
    ) -> Result<()> {
        let name = table_name(group, rank, rank_count);
        let mut tables = self.lock()?;
        let table = tables.get_mut(&name).ok_or_else(|| missing_table(&name))?;
        let row = table.rows.entry(position).or_insert_with(|| MemRow {
            parent_position,
            lower: lower.clone(),
            upper: upper.clone(),
            pairs: HashMap::new(),
        });
        row.parent_position = parent_position;
        row.lower = lower.clone();
        row.upper = upper.clone();
        row.pairs
            .insert(aggregate.to_string(), (count, value.clone()));
        Ok(())
    }

    fn read_at(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        aggregate: &str,
        position: i64,
    ) -> Result<Option<RawBucket>> {
        let name = table_name(group, rank, rank_count);
        let tables = self.lock()?;
        let table = tables.get(&name).ok_or_else(|| missing_table(&name))?;
        Ok(table
            .rows
            .get(&position)
            .map(|row| table.raw_bucket(position, row, aggregate)))
    }

    fn read_range(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        aggregate: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<RawBucket>> {
        let name = table_name(group, rank, rank_count);
        let tables = self.lock()?;
        let table = tables.get(&name).ok_or_else(|| missing_table(&name))?;
        Ok(table
            .rows
            .range(start..=end)
            .map(|(&position, row)| table.raw_bucket(position, row, aggregate))
            .collect())
    }

    fn read_children(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        aggregate: &str,
        parent_position: i64,
    ) -> Result<Vec<RawBucket>> {
        let name = table_name(group, rank, rank_count);
        let tables = self.lock()?;
        let table = tables.get(&name).ok_or_else(|| missing_table(&name))?;
        Ok(table
            .rows
            .iter()
            .filter(|(_, row)| row.parent_position == parent_position)
            .map(|(&position, row)| table.raw_bucket(position, row, aggregate))
            .collect())
    }

    fn max_position(&self, group: &str, rank: u32, rank_count: u32) -> i64 {
        let name = table_name(group, rank, rank_count);
        let Ok(tables) = self.tables.lock() else {
            return 0;
        };
        tables
            .get(&name)
            .and_then(|table| table.rows.keys().next_back().copied())
            .unwrap_or(0)
    }

    fn dump_rank(&self, group: &str, rank: u32, rank_count: u32) -> Result<String> {
        let name = table_name(group, rank, rank_count);
        let tables = self.lock()?;
        let table = tables.get(&name).ok_or_else(|| missing_table(&name))?;
        let mut out = format!("table {name} ({} rows)\n", table.rows.len());
        for (&position, row) in &table.rows {
            let _ = write!(
                out,
                "  position={position} parent={} lower={} upper={}",
                row.parent_position, row.lower, row.upper
            );
            for agg in &table.aggregates {
                let (count, value) = row
                    .pairs
                    .get(&agg.column)
                    .cloned()
                    .unwrap_or((0, ScalarValue::Null));
                let _ = write!(out, " {}=(count={count}, value={value})", agg.column);
            }
            out.push('\n');
        }
        Ok(out)
    }

    fn drop_table(&self, group: &str, rank: u32, rank_count: u32) -> Result<()> {
        let name = table_name(group, rank, rank_count);
        self.lock()?.remove(&name);
        Ok(())
    }
}
