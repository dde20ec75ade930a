//! Row-level accessors over the store. Year-scoped functions take the year id
//! explicitly; the IPC layer decides which year that is.

pub mod attendance;
pub mod classes;
pub mod grades;
pub mod payments;
pub mod schedules;
pub mod students;
pub mod teachers;

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// True when a `SELECT 1 ...` query yields a row.
pub fn row_exists(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> anyhow::Result<bool> {
    let found = conn
        .query_row(sql, params, |r| r.get::<_, i64>(0))
        .optional()?;
    Ok(found.is_some())
}

/// Trims and drops empty strings.
pub fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
