use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::now_rfc3339;

/// Per-student status of one session. Wire values follow the school's
/// vocabulary; `late` and `expelled` are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttendanceStatus {
    #[default]
    #[serde(rename = "present")]
    Present,
    #[serde(rename = "absent")]
    Absent,
    #[serde(rename = "retard", alias = "late")]
    Late,
    #[serde(rename = "renvoi", alias = "expelled")]
    Expelled,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "retard",
            AttendanceStatus::Expelled => "renvoi",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "retard" | "late" => Some(AttendanceStatus::Late),
            "renvoi" | "expelled" => Some(AttendanceStatus::Expelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub student_id: String,
    #[serde(default)]
    pub status: AttendanceStatus,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub date: String,
    pub class_id: String,
    pub schedule_block_id: String,
    pub entries: Vec<AttendanceEntry>,
    pub locked: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialDayType {
    Holiday,
    Celebration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialDay {
    #[serde(default)]
    pub id: String,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: SpecialDayType,
    #[serde(default)]
    pub applies_to_all: bool,
    #[serde(default)]
    pub class_ids: Vec<String>,
}

impl SpecialDay {
    pub fn applies_to(&self, class_id: &str) -> bool {
        self.applies_to_all || self.class_ids.iter().any(|c| c == class_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSettings {
    #[serde(default)]
    pub lock_future_days: bool,
    #[serde(default)]
    pub specials: Vec<SpecialDay>,
}

impl AttendanceSettings {
    pub fn special_for(&self, date: &str, class_id: &str) -> Option<&SpecialDay> {
        self.specials
            .iter()
            .find(|s| s.date == date && s.applies_to(class_id))
    }
}

pub fn record_id(class_id: &str, schedule_block_id: &str, date: &str) -> String {
    format!("{}-{}-{}", class_id, schedule_block_id, date)
}

pub fn get_record(
    conn: &Connection,
    year_id: &str,
    class_id: &str,
    schedule_block_id: &str,
    date: &str,
) -> anyhow::Result<Option<AttendanceRecord>> {
    let head = conn
        .query_row(
            "SELECT id, locked, created_at FROM attendance_records
             WHERE year_id = ? AND class_id = ? AND schedule_block_id = ? AND date = ?",
            (year_id, class_id, schedule_block_id, date),
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)? != 0,
                    r.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((id, locked, created_at)) = head else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT student_id, status, comment FROM attendance_entries WHERE record_id = ? ORDER BY student_id",
    )?;
    let entries = stmt
        .query_map([&id], |r| {
            let status: String = r.get(1)?;
            Ok(AttendanceEntry {
                student_id: r.get(0)?,
                status: AttendanceStatus::parse(&status).unwrap_or_default(),
                comment: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(AttendanceRecord {
        id,
        date: date.to_string(),
        class_id: class_id.to_string(),
        schedule_block_id: schedule_block_id.to_string(),
        entries,
        locked,
        created_at,
    }))
}

/// Upserts a session and replaces its entries. Returns the stored id.
pub fn save_record(
    conn: &Connection,
    year_id: &str,
    class_id: &str,
    schedule_block_id: &str,
    date: &str,
    entries: &[AttendanceEntry],
) -> anyhow::Result<String> {
    let id = record_id(class_id, schedule_block_id, date);
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO attendance_records(id, year_id, class_id, schedule_block_id, date, locked, created_at)
         VALUES(?, ?, ?, ?, ?, 0, ?)
         ON CONFLICT(id) DO UPDATE SET created_at = excluded.created_at",
        (&id, year_id, class_id, schedule_block_id, date, now_rfc3339()),
    )
    .context("failed to upsert attendance_records")?;
    tx.execute("DELETE FROM attendance_entries WHERE record_id = ?", [&id])
        .context("failed to delete from attendance_entries")?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO attendance_entries(record_id, student_id, status, comment)
             VALUES(?, ?, ?, ?)",
        )?;
        for e in entries {
            stmt.execute((&id, &e.student_id, e.status.as_str(), &e.comment))
                .context("failed to insert attendance_entries")?;
        }
    }
    tx.commit()?;
    Ok(id)
}

pub fn set_locked(
    conn: &Connection,
    year_id: &str,
    class_id: &str,
    schedule_block_id: &str,
    date: &str,
    locked: bool,
) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE attendance_records SET locked = ?
         WHERE year_id = ? AND class_id = ? AND schedule_block_id = ? AND date = ?",
        (locked as i64, year_id, class_id, schedule_block_id, date),
    )?;
    Ok(n > 0)
}

/// Every (date, status) recorded for a student in a year between two
/// inclusive ISO dates.
pub fn student_statuses(
    conn: &Connection,
    year_id: &str,
    student_id: &str,
    from: &str,
    to: &str,
) -> anyhow::Result<Vec<(String, AttendanceStatus)>> {
    let mut stmt = conn.prepare(
        "SELECT r.date, e.status
         FROM attendance_entries e
         JOIN attendance_records r ON r.id = e.record_id
         WHERE r.year_id = ? AND e.student_id = ? AND r.date >= ? AND r.date <= ?
         ORDER BY r.date",
    )?;
    let rows = stmt
        .query_map((year_id, student_id, from, to), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(date, s)| AttendanceStatus::parse(&s).map(|st| (date, st)))
        .collect())
}

pub fn load_settings(conn: &Connection, year_id: &str) -> anyhow::Result<AttendanceSettings> {
    let row = conn
        .query_row(
            "SELECT lock_future_days, specials FROM attendance_settings WHERE year_id = ?",
            [year_id],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)),
        )
        .optional()?;
    let Some((lock, specials)) = row else {
        return Ok(AttendanceSettings::default());
    };
    // A damaged specials column falls back to no special days.
    let specials: Vec<SpecialDay> = serde_json::from_str(&specials).unwrap_or_else(|e| {
        tracing::warn!(year_id, error = %e, "unreadable attendance specials");
        Vec::new()
    });
    Ok(AttendanceSettings {
        lock_future_days: lock != 0,
        specials,
    })
}

pub fn save_settings(
    conn: &Connection,
    year_id: &str,
    settings: &AttendanceSettings,
) -> anyhow::Result<()> {
    let specials = serde_json::to_string(&settings.specials)?;
    conn.execute(
        "INSERT INTO attendance_settings(year_id, lock_future_days, specials)
         VALUES(?, ?, ?)
         ON CONFLICT(year_id) DO UPDATE SET
           lock_future_days = excluded.lock_future_days,
           specials = excluded.specials",
        (year_id, settings.lock_future_days as i64, specials),
    )?;
    Ok(())
}
