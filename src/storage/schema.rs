//! Schema definition and record queries.
//!
//! The writer and the reader pool share these helpers; every function takes
//! a plain `&Connection`, so a `Transaction` can be passed through deref.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::time::Duration;

use crate::error::StoreError;
use crate::record::{Filter, Order, Record};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply pragmas for the write connection.
///
/// WAL lets readers keep a stable snapshot while the writer commits;
/// `synchronous=FULL` makes every commit durable before it is acknowledged.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.execute_batch(
        r#"
        PRAGMA synchronous = FULL;
        PRAGMA temp_store = MEMORY;
        "#,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)
}

/// Apply pragmas for pooled read connections.
pub fn apply_reader_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA query_only = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)
}

/// Create tables and indexes if they do not exist.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            identifier  TEXT PRIMARY KEY NOT NULL,
            updated_at  INTEGER NOT NULL,
            updated_day TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_records_updated
            ON records (updated_at, identifier);

        CREATE TABLE IF NOT EXISTS store_meta (
            id      INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        INSERT OR IGNORE INTO store_meta (id, version) VALUES (1, 0);
        "#,
    )
}

/// Current commit version.
pub fn read_version(conn: &Connection) -> rusqlite::Result<u64> {
    conn.query_row("SELECT version FROM store_meta WHERE id = 1", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|v| v as u64)
}

/// Increment the commit version and return the new value.
pub fn bump_version(conn: &Connection) -> rusqlite::Result<u64> {
    conn.query_row(
        "UPDATE store_meta SET version = version + 1 WHERE id = 1 RETURNING version",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map(|v| v as u64)
}

fn filter_clause(filter: &Filter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(day) = &filter.day {
        conditions.push("updated_day = ?");
        values.push(Value::Text(day.clone()));
    }
    if let Some(since) = filter.updated_since {
        conditions.push("updated_at >= ?");
        values.push(Value::Integer(since.timestamp_millis()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

fn order_clause(order: Order) -> &'static str {
    match order {
        Order::Newest => "updated_at DESC, identifier DESC",
        Order::Oldest => "updated_at ASC, identifier ASC",
    }
}

/// Count records matching `filter`.
pub fn count_records(conn: &Connection, filter: &Filter) -> Result<u64, StoreError> {
    let (clause, values) = filter_clause(filter);
    let sql = format!("SELECT COUNT(*) FROM records{clause}");
    let count: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
    Ok(count as u64)
}

/// Fetch a window of records in a total order.
///
/// `limit = None` reads to the end of the result set. An offset beyond
/// `i64::MAX` is past any table, so it yields no records.
pub fn fetch_records(
    conn: &Connection,
    filter: &Filter,
    order: Order,
    offset: usize,
    limit: Option<usize>,
) -> Result<Vec<Record>, StoreError> {
    let Ok(offset) = i64::try_from(offset) else {
        return Ok(Vec::new());
    };
    // SQLite reads a negative LIMIT as "no limit".
    let limit = limit.and_then(|l| i64::try_from(l).ok()).unwrap_or(-1);

    let (clause, mut values) = filter_clause(filter);
    let sql = format!(
        "SELECT identifier, updated_at, updated_day FROM records{clause} ORDER BY {} LIMIT ? OFFSET ?",
        order_clause(order)
    );
    values.push(Value::Integer(limit));
    values.push(Value::Integer(offset));

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, at, day)| Record::from_row(&id, at, day))
        .collect()
}

/// Insert new records. A duplicate identifier fails with a validation error.
pub fn insert_records(conn: &Connection, records: &[Record]) -> Result<usize, StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO records (identifier, updated_at, updated_day) VALUES (?1, ?2, ?3)",
    )?;
    for record in records {
        stmt.execute(params![
            record.identifier().to_string(),
            record.updated_at().timestamp_millis(),
            record.updated_day(),
        ])?;
    }
    Ok(records.len())
}

/// Overwrite the timestamp columns of existing records.
///
/// Every record must already exist; records are never created by an update.
pub fn update_records(conn: &Connection, records: &[Record]) -> Result<usize, StoreError> {
    let mut stmt = conn.prepare_cached(
        "UPDATE records SET updated_at = ?1, updated_day = ?2 WHERE identifier = ?3",
    )?;
    for record in records {
        let changed = stmt.execute(params![
            record.updated_at().timestamp_millis(),
            record.updated_day(),
            record.identifier().to_string(),
        ])?;
        if changed == 0 {
            return Err(StoreError::Validation(format!(
                "record {} does not exist",
                record.identifier()
            )));
        }
    }
    Ok(records.len())
}
