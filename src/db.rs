use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::dataset;
use crate::record::{FieldValue, ProductRecord};

const DB_PATH: &str = "data/products.sqlite";

pub const PRODUCTS_TABLE: &str = "products";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

/// Pre-declared columns only. Everything else arrives via reconciliation.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS products (
            id             INTEGER PRIMARY KEY,
            title          TEXT,
            price          REAL,
            price_currency TEXT,
            product_link   TEXT
        );
        ",
    )?;
    Ok(())
}

// ── Schema reconciliation ──

/// Current column names of `table`, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Add a column for every batch key the table lacks. The column type comes
/// from the first value observed for that key in this batch (scan order:
/// record order, then key order within the record); once a column exists
/// its type is never revisited. Columns are only ever added.
pub fn add_missing_columns(
    conn: &Connection,
    table: &str,
    batch: &[ProductRecord],
) -> Result<usize> {
    let mut known: HashSet<String> = table_columns(conn, table)?.into_iter().collect();
    let mut added = 0;

    for record in batch {
        for (key, value) in record {
            if known.contains(key) {
                continue;
            }
            let column_type = column_type(value);
            conn.execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(table),
                    quote_ident(key),
                    column_type
                ),
                [],
            )?;
            info!("added column {} ({}) to {}", key, column_type, table);
            known.insert(key.clone());
            added += 1;
        }
    }
    Ok(added)
}

fn column_type(value: &FieldValue) -> &'static str {
    match value {
        FieldValue::Int(_) => "INTEGER",
        FieldValue::Float(_) => "REAL",
        _ => "TEXT",
    }
}

// ── Loading ──

/// Insert each record as one row, in batch order, inside one transaction.
/// Runs after reconciliation, so every key already has a column. No dedup:
/// re-loading the same snapshot inserts duplicate rows.
pub fn insert_records(conn: &Connection, table: &str, batch: &[ProductRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0;
    for record in batch {
        if record.is_empty() {
            continue;
        }
        let columns: Vec<String> = record.keys().map(|k| quote_ident(k)).collect();
        let placeholders: Vec<String> = (1..=record.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders.join(", ")
        );
        tx.execute(&sql, rusqlite::params_from_iter(record.values().map(sql_value)))?;
        inserted += 1;
    }
    tx.commit()?;
    Ok(inserted)
}

fn sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Int(i) => Value::Integer(*i),
        FieldValue::Float(f) => Value::Real(*f),
        FieldValue::Text(t) => Value::Text(t.clone()),
    }
}

/// Load a crawl snapshot into `table`: reconcile the schema first, then
/// insert. Schema changes fully land before the first row does. "No data"
/// (missing, malformed, or empty snapshot) skips both phases quietly.
pub fn add_data_to_table(conn: &Connection, table: &str, path: &Path) -> Result<()> {
    let batch = match dataset::read_snapshot(path) {
        Some(batch) => batch,
        None => {
            warn!("no data to add from {}", path.display());
            return Ok(());
        }
    };
    let added = add_missing_columns(conn, table, &batch)?;
    let inserted = insert_records(conn, table, &batch)?;
    info!(
        "loaded {} rows ({} new columns) from {}",
        inserted,
        added,
        path.display()
    );
    Ok(())
}

// Column names come from scraped markup, so they go into SQL quoted.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ── Stats ──

pub struct Stats {
    pub rows: usize,
    pub columns: Vec<String>,
}

pub fn get_stats(conn: &Connection, table: &str) -> Result<Stats> {
    let rows: usize = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |r| r.get(0),
    )?;
    let columns = table_columns(conn, table)?;
    Ok(Stats { rows, columns })
}
