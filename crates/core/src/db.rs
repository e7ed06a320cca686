//! Shared SQLite helpers for the store implementations.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use serde::de::DeserializeOwned;

/// How long a writer waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) a database file with the pragmas every store relies on.
pub(crate) fn open(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

/// Open a private in-memory database (tests).
pub(crate) fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// Format a timestamp for storage. Fixed precision keeps text comparison
/// consistent with time order.
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 timestamp column.
pub(crate) fn timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("invalid timestamp {:?}: {}", raw, e)))
}

/// Parse an optional RFC 3339 timestamp column.
pub(crate) fn optional_timestamp(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| timestamp(idx, &s)).transpose()
}

/// Parse a text column holding an enum's string form.
pub(crate) fn parsed<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

/// Parse a JSON text column.
pub(crate) fn json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| conversion_error(idx, e.to_string()))
}
