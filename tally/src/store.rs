//! The embedded relational store.
//!
//! Wraps a single SQLite connection that is held for the process lifetime
//! and used sequentially for schema operations, ingestion and report
//! queries.

use std::path::{Path, PathBuf};

use log::debug;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Statement, Transaction};
use serde_json::{Number, Value as JsonValue};

use crate::Error;

/// Header and rows of one executed query. Column values are mapped to JSON
/// values (NULL to null, INTEGER and REAL to numbers, TEXT to strings) so
/// they can flow straight into a render context.
#[derive(Debug)]
pub struct QueryResult {
    pub header: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

/// Provides an interface for the SQLite database holding the loaded tables.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the database at the given location. A `file:` prefix
    /// on the locator is accepted and stripped.
    pub fn open(db_uri: &str) -> Result<Self, Error> {
        let path = PathBuf::from(db_uri.strip_prefix("file:").unwrap_or(db_uri));
        debug!("Using database at '{}'", path.display());
        let conn = Connection::open(&path)?;
        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Open a transient in-memory database.
    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
        })
    }

    /// The path of the backing database file, if there is one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Execute a single statement that returns no rows.
    pub fn execute(&self, sql: &str) -> Result<usize, Error> {
        debug!("Executing statement '{}'", sql);
        Ok(self.conn.execute(sql, [])?)
    }

    /// Prepare a statement for repeated execution.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>, Error> {
        Ok(self.conn.prepare(sql)?)
    }

    /// Begin a transaction. The store stays borrowed immutably, so prepared
    /// statements remain usable while the transaction is open.
    pub fn transaction(&self) -> Result<Transaction<'_>, Error> {
        Ok(self.conn.unchecked_transaction()?)
    }

    /// The names of all tables currently in the database.
    pub fn tables(&self) -> Result<Vec<String>, Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, rusqlite::Error>>()?;
        Ok(names)
    }

    /// Execute a query and collect its header and rows.
    pub fn query(&self, sql: &str) -> Result<QueryResult, Error> {
        debug!("Executing query '{}'", sql);
        let mut stmt = self.conn.prepare(sql)?;
        let header: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let column_count = header.len();
        let mut out = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(column_count);
            for i in 0..column_count {
                record.push(json_value(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(QueryResult {
            header,
            rows: out,
        })
    }
}

fn json_value(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::Number(Number::from(i)),
        ValueRef::Real(f) => Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
        // Blobs have no representation in a render context.
        ValueRef::Blob(_) => JsonValue::Null,
    }
}
