use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{new_id, row_exists};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    #[serde(default)]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

fn row_to_teacher(r: &rusqlite::Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: r.get(0)?,
        first_name: r.get(1)?,
        last_name: r.get(2)?,
        email: r.get(3)?,
        phone: r.get(4)?,
        subject: r.get(5)?,
    })
}

pub fn list_teachers(conn: &Connection) -> anyhow::Result<Vec<Teacher>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, email, phone, subject
         FROM teachers
         ORDER BY last_name, first_name",
    )?;
    let rows = stmt
        .query_map([], row_to_teacher)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_teacher(conn: &Connection, id: &str) -> anyhow::Result<Option<Teacher>> {
    let t = conn
        .query_row(
            "SELECT id, first_name, last_name, email, phone, subject FROM teachers WHERE id = ?",
            [id],
            row_to_teacher,
        )
        .optional()?;
    Ok(t)
}

pub fn teacher_exists(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    row_exists(conn, "SELECT 1 FROM teachers WHERE id = ?", [id])
}

pub fn upsert_teacher(conn: &Connection, teacher: &Teacher) -> anyhow::Result<Teacher> {
    let mut t = teacher.clone();
    if t.id.trim().is_empty() {
        t.id = new_id();
    }
    conn.execute(
        "INSERT INTO teachers(id, first_name, last_name, email, phone, subject)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           first_name = excluded.first_name,
           last_name = excluded.last_name,
           email = excluded.email,
           phone = excluded.phone,
           subject = excluded.subject",
        (&t.id, &t.first_name, &t.last_name, &t.email, &t.phone, &t.subject),
    )?;
    Ok(t)
}

/// Removes a teacher with their assignments, schedule blocks and the
/// attendance taken in those blocks, and clears them as main teacher of any
/// class. Returns false when unknown.
pub fn delete_teacher(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    if !teacher_exists(conn, id)? {
        return Ok(false);
    }
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM teacher_assignments WHERE teacher_id = ?", [id])
        .context("failed to delete from teacher_assignments")?;
    tx.execute(
        "DELETE FROM attendance_entries WHERE record_id IN (
           SELECT id FROM attendance_records WHERE schedule_block_id IN (
             SELECT id FROM schedules WHERE teacher_id = ?))",
        [id],
    )
    .context("failed to delete from attendance_entries")?;
    tx.execute(
        "DELETE FROM attendance_records WHERE schedule_block_id IN (
           SELECT id FROM schedules WHERE teacher_id = ?)",
        [id],
    )
    .context("failed to delete from attendance_records")?;
    tx.execute("DELETE FROM schedules WHERE teacher_id = ?", [id])
        .context("failed to delete from schedules")?;
    tx.execute(
        "UPDATE classes SET main_teacher_id = NULL WHERE main_teacher_id = ?",
        [id],
    )
    .context("failed to update classes")?;
    tx.execute("DELETE FROM teachers WHERE id = ?", [id])
        .context("failed to delete from teachers")?;
    tx.commit()?;
    Ok(true)
}

fn assignment_id(teacher_id: &str, year_id: &str) -> String {
    format!("assignment_{}_{}", teacher_id, year_id)
}

pub fn assigned_teacher_ids(conn: &Connection, year_id: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT teacher_id FROM teacher_assignments WHERE year_id = ? ORDER BY teacher_id",
    )?;
    let rows = stmt
        .query_map([year_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn is_teacher_assigned(conn: &Connection, teacher_id: &str, year_id: &str) -> anyhow::Result<bool> {
    row_exists(
        conn,
        "SELECT 1 FROM teacher_assignments WHERE teacher_id = ? AND year_id = ? LIMIT 1",
        (teacher_id, year_id),
    )
}

pub fn set_teacher_assigned(
    conn: &Connection,
    teacher_id: &str,
    assigned: bool,
    year_id: &str,
) -> anyhow::Result<()> {
    if assigned {
        conn.execute(
            "INSERT INTO teacher_assignments(id, teacher_id, year_id)
             VALUES(?, ?, ?)
             ON CONFLICT DO NOTHING",
            (assignment_id(teacher_id, year_id), teacher_id, year_id),
        )?;
    } else {
        conn.execute(
            "DELETE FROM teacher_assignments WHERE teacher_id = ? AND year_id = ?",
            (teacher_id, year_id),
        )?;
    }
    Ok(())
}

/// Replaces the set of teachers active in `year_id`. Duplicate ids collapse.
pub fn save_assigned_teacher_ids(
    conn: &Connection,
    ids: &[String],
    year_id: &str,
) -> anyhow::Result<usize> {
    let unique: BTreeSet<&str> = ids.iter().map(|s| s.as_str()).collect();
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM teacher_assignments WHERE year_id = ?", [year_id])?;
    {
        let mut stmt =
            tx.prepare("INSERT INTO teacher_assignments(id, teacher_id, year_id) VALUES(?, ?, ?)")?;
        for teacher_id in &unique {
            stmt.execute((assignment_id(teacher_id, year_id), teacher_id, year_id))?;
        }
    }
    tx.commit()?;
    Ok(unique.len())
}
