//! Reference SQL adapter.
//!
//! Persists rank tables in a SQLite database file through `rusqlite`. The
//! emitted DDL/DML sticks to the portable subset shared with PostgreSQL
//! (`INT8` columns, `INSERT ... ON CONFLICT (position) DO UPDATE` upserts),
//! so the statements double as the reference for any SQL dialect.
//!
//! Each call opens a fresh connection and closes it on return; the adapter
//! itself holds only the database path. Identifiers are sanitized before they
//! are interpolated into statements, and all values are bound positionally.

use crate::adapter::{column_name, sanitize_identifier, table_name, AggregateColumn, TableAdapter};
use crate::error::{Result, StoreError};
use crate::model::{RawBucket, ScalarValue};
use rusqlite::types::{ToSqlOutput, Type, Value, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use std::fmt::Write as _;
use std::path::PathBuf;

impl ToSql for ScalarValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            ScalarValue::Null => ToSqlOutput::Owned(Value::Null),
            ScalarValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            ScalarValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            ScalarValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

/// Reads one dynamically typed column from a row.
fn scalar_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<ScalarValue> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => ScalarValue::Null,
        ValueRef::Integer(v) => ScalarValue::Integer(v),
        ValueRef::Real(v) => ScalarValue::Real(v),
        ValueRef::Text(v) => ScalarValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(_) => {
            return Err(rusqlite::Error::InvalidColumnType(
                idx,
                "blob column in bucket row".to_string(),
                Type::Blob,
            ))
        }
    })
}

/// Maps a bucket-row `SELECT` (position, parent_position, count, value,
/// lower_bound, upper_bound) to a [`RawBucket`].
fn bucket_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawBucket> {
    Ok(RawBucket {
        position: row.get(0)?,
        parent_position: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
        count: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
        value: scalar_at(row, 3)?,
        lower: scalar_at(row, 4)?,
        upper: scalar_at(row, 5)?,
    })
}

fn db_err(context: String, err: rusqlite::Error) -> StoreError {
    StoreError::adapter_with(context, err)
}

/// A [`TableAdapter`] persisting rank tables in a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteAdapter {
    path: PathBuf,
}

impl SqliteAdapter {
    /// Creates an adapter for the database at `path`.
    ///
    /// The file is created lazily on the first call that opens a connection.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The database file path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .map_err(|e| db_err(format!("open database {}", self.path.display()), e))
    }

    fn select_sql(table: &str, stem: &str, predicate: &str) -> String {
        format!(
            "SELECT position, parent_position, {stem}_count, {stem}_value, \
             lower_bound, upper_bound FROM {table} {predicate}"
        )
    }
}

impl TableAdapter for SqliteAdapter {
    fn ensure_table(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        key_type: &str,
        aggregates: &[AggregateColumn],
    ) -> Result<bool> {
        let table = table_name(group, rank, rank_count);
        let conn = self.connect()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_err(format!("probe table {table}"), e))?;
        if existing.is_some() {
            return Ok(false);
        }

        let key_type = sanitize_identifier(key_type);
        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             position INT8 PRIMARY KEY NOT NULL, \
             parent_position INT8, \
             lower_bound {key_type}, \
             upper_bound {key_type}"
        );
        for aggregate in aggregates {
            let stem = column_name(&aggregate.column);
            let storage = sanitize_identifier(&aggregate.storage_type);
            let _ = write!(ddl, ", {stem}_count INT8, {stem}_value {storage}");
        }
        ddl.push(')');
        conn.execute(&ddl, [])
            .map_err(|e| db_err(format!("create table {table}"), e))?;
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS {table}_parent_position \
                 ON {table} (parent_position)"
            ),
            [],
        )
        .map_err(|e| db_err(format!("index table {table}"), e))?;
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
        let table = table_name(group, rank, rank_count);
        let stem = column_name(aggregate);
        let sql = format!(
            "INSERT INTO {table} \
             (position, parent_position, lower_bound, upper_bound, {stem}_count, {stem}_value) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT (position) DO UPDATE SET \
             parent_position = excluded.parent_position, \
             lower_bound = excluded.lower_bound, \
             upper_bound = excluded.upper_bound, \
             {stem}_count = excluded.{stem}_count, \
             {stem}_value = excluded.{stem}_value"
        );
        let conn = self.connect()?;
        conn.execute(
            &sql,
            params![position, parent_position, lower, upper, count, value],
        )
        .map_err(|e| db_err(format!("upsert {table} position {position}"), e))?;
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
        let table = table_name(group, rank, rank_count);
        let sql = Self::select_sql(&table, &column_name(aggregate), "WHERE position = ?1");
        let conn = self.connect()?;
        conn.query_row(&sql, params![position], bucket_from_row)
            .optional()
            .map_err(|e| db_err(format!("read {table} position {position}"), e))
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
        let table = table_name(group, rank, rank_count);
        let sql = Self::select_sql(
            &table,
            &column_name(aggregate),
            "WHERE position >= ?1 AND position <= ?2 ORDER BY position ASC",
        );
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| db_err(format!("scan {table}"), e))?;
        let rows = stmt
            .query_map(params![start, end], bucket_from_row)
            .map_err(|e| db_err(format!("scan {table}"), e))?;
        let mut buckets = Vec::new();
        for row in rows {
            buckets.push(row.map_err(|e| db_err(format!("scan {table}"), e))?);
        }
        Ok(buckets)
    }

    fn read_children(
        &self,
        group: &str,
        rank: u32,
        rank_count: u32,
        aggregate: &str,
        parent_position: i64,
    ) -> Result<Vec<RawBucket>> {
        let table = table_name(group, rank, rank_count);
        let sql = Self::select_sql(
            &table,
            &column_name(aggregate),
            "WHERE parent_position = ?1 ORDER BY position ASC",
        );
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| db_err(format!("scan children of {table}"), e))?;
        let rows = stmt
            .query_map(params![parent_position], bucket_from_row)
            .map_err(|e| db_err(format!("scan children of {table}"), e))?;
        let mut buckets = Vec::new();
        for row in rows {
            buckets.push(row.map_err(|e| db_err(format!("scan children of {table}"), e))?);
        }
        Ok(buckets)
    }

    fn max_position(&self, group: &str, rank: u32, rank_count: u32) -> i64 {
        // Runs against brand-new tables during engine construction; any
        // failure, including a missing table, reads as empty.
        let table = table_name(group, rank, rank_count);
        let Ok(conn) = Connection::open(&self.path) else {
            return 0;
        };
        conn.query_row(&format!("SELECT MAX(position) FROM {table}"), [], |row| {
            row.get::<_, Option<i64>>(0)
        })
        .unwrap_or(None)
        .unwrap_or(0)
    }

    fn dump_rank(&self, group: &str, rank: u32, rank_count: u32) -> Result<String> {
        let table = table_name(group, rank, rank_count);
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {table} ORDER BY position ASC"))
            .map_err(|e| db_err(format!("dump {table}"), e))?;
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let mut rows = stmt
            .query([])
            .map_err(|e| db_err(format!("dump {table}"), e))?;
        let mut out = format!("table {table}\n");
        while let Some(row) = rows
            .next()
            .map_err(|e| db_err(format!("dump {table}"), e))?
        {
            out.push(' ');
            for (idx, name) in names.iter().enumerate() {
                let value = scalar_at(row, idx).map_err(|e| db_err(format!("dump {table}"), e))?;
                let _ = write!(out, " {name}={value}");
            }
            out.push('\n');
        }
        Ok(out)
    }

    fn drop_table(&self, group: &str, rank: u32, rank_count: u32) -> Result<()> {
        let table = table_name(group, rank, rank_count);
        let conn = self.connect()?;
        conn.execute(&format!("DROP TABLE IF EXISTS {table}"), [])
            .map_err(|e| db_err(format!("drop table {table}"), e))?;
        Ok(())
    }
}
