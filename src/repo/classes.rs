use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{new_id, row_exists};

/// Capacity reported for classes that never had one set.
pub const DEFAULT_CAPACITY: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassItem {
    pub id: String,
    pub year_id: String,
    pub name: String,
    pub level: Option<String>,
    pub capacity: i64,
    pub main_teacher_id: Option<String>,
    pub student_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInput {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub main_teacher_id: Option<String>,
}

const CLASS_SELECT: &str = "SELECT
       c.id,
       c.year_id,
       c.name,
       c.level,
       c.capacity,
       c.main_teacher_id,
       (SELECT COUNT(*) FROM enrollments e WHERE e.class_id = c.id AND e.year_id = c.year_id) AS student_count
     FROM classes c";

fn row_to_class(r: &rusqlite::Row<'_>) -> rusqlite::Result<ClassItem> {
    Ok(ClassItem {
        id: r.get(0)?,
        year_id: r.get(1)?,
        name: r.get(2)?,
        level: r.get::<_, Option<String>>(3)?.filter(|s| !s.is_empty()),
        capacity: r.get::<_, Option<i64>>(4)?.unwrap_or(DEFAULT_CAPACITY),
        main_teacher_id: r.get(5)?,
        student_count: r.get(6)?,
    })
}

pub fn list_classes(conn: &Connection, year_id: &str) -> anyhow::Result<Vec<ClassItem>> {
    let sql = format!("{} WHERE c.year_id = ? ORDER BY c.name", CLASS_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([year_id], row_to_class)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_class(conn: &Connection, year_id: &str, id: &str) -> anyhow::Result<Option<ClassItem>> {
    let sql = format!("{} WHERE c.year_id = ? AND c.id = ?", CLASS_SELECT);
    let c = conn
        .query_row(&sql, (year_id, id), row_to_class)
        .optional()?;
    Ok(c)
}

pub fn class_exists(conn: &Connection, year_id: &str, id: &str) -> anyhow::Result<bool> {
    row_exists(
        conn,
        "SELECT 1 FROM classes WHERE year_id = ? AND id = ?",
        (year_id, id),
    )
}

pub fn create_class(conn: &Connection, year_id: &str, input: &ClassInput) -> anyhow::Result<ClassItem> {
    let id = input
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_id);
    conn.execute(
        "INSERT INTO classes(id, year_id, name, level, capacity, main_teacher_id)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            year_id,
            input.name.trim(),
            &input.level,
            input.capacity,
            &input.main_teacher_id,
        ),
    )?;
    get_class(conn, year_id, &id)?.context("class vanished after insert")
}

pub fn update_class(
    conn: &Connection,
    year_id: &str,
    id: &str,
    input: &ClassInput,
) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE classes
         SET name = ?, level = ?, capacity = ?, main_teacher_id = ?
         WHERE id = ? AND year_id = ?",
        (
            input.name.trim(),
            &input.level,
            input.capacity,
            &input.main_teacher_id,
            id,
            year_id,
        ),
    )?;
    Ok(n > 0)
}

/// Deletes a class of one year with its schedules, subject configuration,
/// grades, attendance, fee row and enrollments. Payments are kept.
pub fn delete_class(conn: &Connection, year_id: &str, id: &str) -> anyhow::Result<bool> {
    if !class_exists(conn, year_id, id)? {
        return Ok(false);
    }
    let tx = conn.unchecked_transaction()?;

    // Dependency order; child tables first.
    let steps: [(&str, &str); 10] = [
        (
            "attendance_entries",
            "DELETE FROM attendance_entries WHERE record_id IN (
               SELECT id FROM attendance_records WHERE year_id = ?1 AND class_id = ?2
             )",
        ),
        (
            "attendance_records",
            "DELETE FROM attendance_records WHERE year_id = ?1 AND class_id = ?2",
        ),
        (
            "grades",
            "DELETE FROM grades WHERE year_id = ?1 AND class_id = ?2",
        ),
        (
            "class_subject_students",
            "DELETE FROM class_subject_students WHERE config_id IN (
               SELECT id FROM class_subjects WHERE year_id = ?1 AND class_id = ?2
             )",
        ),
        (
            "class_subject_items",
            "DELETE FROM class_subject_items WHERE config_id IN (
               SELECT id FROM class_subjects WHERE year_id = ?1 AND class_id = ?2
             )",
        ),
        (
            "class_subjects",
            "DELETE FROM class_subjects WHERE year_id = ?1 AND class_id = ?2",
        ),
        (
            "schedules",
            "DELETE FROM schedules WHERE year_id = ?1 AND class_id = ?2",
        ),
        (
            "fees_per_class",
            "DELETE FROM fees_per_class WHERE year_id = ?1 AND class_id = ?2",
        ),
        (
            "enrollments",
            "DELETE FROM enrollments WHERE year_id = ?1 AND class_id = ?2",
        ),
        (
            "classes",
            "DELETE FROM classes WHERE year_id = ?1 AND id = ?2",
        ),
    ];
    for (table, sql) in steps {
        tx.execute(sql, (year_id, id))
            .with_context(|| format!("failed to delete from {}", table))?;
    }
    tx.commit()?;
    Ok(true)
}
