//! Academic years and the process-wide active year.
//!
//! Years follow the September-to-August convention: the year id is
//! `"{start}-{start+1}"`, starting on 1 September and ending on 31 August.
//! The active year lives only in process memory; it is resolved lazily on
//! first read and changed by an explicit switch.

use chrono::{Datelike, Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// First month of a school year.
pub const SCHOOL_YEAR_START_MONTH: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub closed: bool,
}

impl AcademicYear {
    pub fn starting(start_year: i32) -> Self {
        let end_year = start_year + 1;
        Self {
            id: format!("{}-{}", start_year, end_year),
            name: format!("Année scolaire {}-{}", start_year, end_year),
            start_date: format!("{}-09-01", start_year),
            end_date: format!("{}-08-31", end_year),
            closed: false,
        }
    }

    pub fn start_year(&self) -> Option<i32> {
        parse_year_id(&self.id)
    }

    /// Inclusive date-range membership on ISO `YYYY-MM-DD` strings.
    pub fn contains_date(&self, date: &str) -> bool {
        let day = date.get(..10).unwrap_or(date);
        day >= self.start_date.as_str() && day <= self.end_date.as_str()
    }
}

/// Start year of the school year that `day` falls in.
pub fn school_year_start_for(day: NaiveDate) -> i32 {
    if day.month() >= SCHOOL_YEAR_START_MONTH {
        day.year()
    } else {
        day.year() - 1
    }
}

pub fn default_year_for(day: NaiveDate) -> AcademicYear {
    AcademicYear::starting(school_year_start_for(day))
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Accepts only well-formed ids (`"2024-2025"`), returning the start year.
pub fn parse_year_id(id: &str) -> Option<i32> {
    let (a, b) = id.trim().split_once('-')?;
    if a.len() != 4 || b.len() != 4 {
        return None;
    }
    let start = a.parse::<i32>().ok()?;
    let end = b.parse::<i32>().ok()?;
    (end == start + 1).then_some(start)
}

fn row_to_year(r: &rusqlite::Row<'_>) -> rusqlite::Result<AcademicYear> {
    Ok(AcademicYear {
        id: r.get(0)?,
        name: r.get(1)?,
        start_date: r.get(2)?,
        end_date: r.get(3)?,
        closed: r.get::<_, i64>(4)? != 0,
    })
}

pub fn list_years(conn: &Connection) -> anyhow::Result<Vec<AcademicYear>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, start_date, end_date, closed
         FROM academic_years
         ORDER BY start_date, id",
    )?;
    let years = stmt
        .query_map([], row_to_year)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(years)
}

pub fn get_year(conn: &Connection, id: &str) -> anyhow::Result<Option<AcademicYear>> {
    let y = conn
        .query_row(
            "SELECT id, name, start_date, end_date, closed FROM academic_years WHERE id = ?",
            [id],
            row_to_year,
        )
        .optional()?;
    Ok(y)
}

pub fn latest_year(conn: &Connection) -> anyhow::Result<Option<AcademicYear>> {
    Ok(list_years(conn)?.pop())
}

/// Inserts `year` unless its id already exists. Returns whether a row was written.
pub fn insert_year_if_missing(conn: &Connection, year: &AcademicYear) -> anyhow::Result<bool> {
    let n = conn.execute(
        "INSERT INTO academic_years(id, name, start_date, end_date, closed)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO NOTHING",
        (
            &year.id,
            &year.name,
            &year.start_date,
            &year.end_date,
            year.closed as i64,
        ),
    )?;
    Ok(n > 0)
}

/// Makes sure at least one year exists and returns the earliest one.
pub fn ensure_default_year(conn: &Connection, day: NaiveDate) -> anyhow::Result<AcademicYear> {
    let years = list_years(conn)?;
    if let Some(first) = years.into_iter().next() {
        return Ok(first);
    }
    let y = default_year_for(day);
    insert_year_if_missing(conn, &y)?;
    tracing::info!(year_id = %y.id, "created default academic year");
    Ok(y)
}

pub fn set_year_closed(conn: &Connection, id: &str, closed: bool) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE academic_years SET closed = ? WHERE id = ?",
        (closed as i64, id),
    )?;
    Ok(n > 0)
}

/// Year that follows the latest existing one, or the default year for `day`
/// when nothing exists yet.
pub fn next_year(conn: &Connection, day: NaiveDate) -> anyhow::Result<AcademicYear> {
    match latest_year(conn)?.and_then(|y| y.start_year()) {
        Some(start) => Ok(AcademicYear::starting(start + 1)),
        None => Ok(default_year_for(day)),
    }
}

/// Holds the single active year id for this process.
#[derive(Debug, Default)]
pub struct YearRegistry {
    active: Option<String>,
}

impl YearRegistry {
    pub fn peek(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Resolves the active year, creating the default year on an empty store.
    pub fn active_year_id(&mut self, conn: &Connection) -> anyhow::Result<String> {
        if let Some(id) = &self.active {
            return Ok(id.clone());
        }
        let y = ensure_default_year(conn, today())?;
        self.active = Some(y.id.clone());
        Ok(y.id)
    }

    /// Returns true when the active year actually changed.
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.active.as_deref() == Some(id) {
            return false;
        }
        self.active = Some(id.to_string());
        true
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn september_starts_a_new_year() {
        assert_eq!(default_year_for(d(2024, 9, 1)).id, "2024-2025");
        assert_eq!(default_year_for(d(2024, 12, 31)).id, "2024-2025");
        assert_eq!(default_year_for(d(2025, 8, 31)).id, "2024-2025");
        assert_eq!(default_year_for(d(2025, 1, 15)).id, "2024-2025");
    }

    #[test]
    fn default_year_fields() {
        let y = AcademicYear::starting(2025);
        assert_eq!(y.id, "2025-2026");
        assert_eq!(y.name, "Année scolaire 2025-2026");
        assert_eq!(y.start_date, "2025-09-01");
        assert_eq!(y.end_date, "2026-08-31");
        assert!(!y.closed);
        assert_eq!(y.start_year(), Some(2025));
    }

    #[test]
    fn parse_year_id_rejects_malformed() {
        assert_eq!(parse_year_id("2024-2025"), Some(2024));
        assert_eq!(parse_year_id("2024-2026"), None);
        assert_eq!(parse_year_id("24-25"), None);
        assert_eq!(parse_year_id("abcd-efgh"), None);
    }

    #[test]
    fn contains_date_is_inclusive() {
        let y = AcademicYear::starting(2024);
        assert!(y.contains_date("2024-09-01"));
        assert!(y.contains_date("2025-08-31T10:00:00Z"));
        assert!(!y.contains_date("2024-08-31"));
        assert!(!y.contains_date("2025-09-01"));
    }

    #[test]
    fn registry_reports_changes_only() {
        let mut reg = YearRegistry::default();
        assert_eq!(reg.peek(), None);
        assert!(reg.set_active("2024-2025"));
        assert!(!reg.set_active("2024-2025"));
        assert!(reg.set_active("2025-2026"));
        reg.clear();
        assert_eq!(reg.peek(), None);
    }
}
