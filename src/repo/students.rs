use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{new_id, now_rfc3339, row_exists};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default)]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub birth_place: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    #[default]
    Active,
    Transferred,
    Graduated,
    Left,
}

impl EnrollmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Transferred => "transferred",
            EnrollmentStatus::Graduated => "graduated",
            EnrollmentStatus::Left => "left",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(EnrollmentStatus::Active),
            "transferred" => Some(EnrollmentStatus::Transferred),
            "graduated" => Some(EnrollmentStatus::Graduated),
            "left" => Some(EnrollmentStatus::Left),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub student_id: String,
    #[serde(default)]
    pub year_id: String,
    pub class_id: String,
    #[serde(default)]
    pub status: EnrollmentStatus,
    #[serde(default)]
    pub date: String,
}

/// A student together with their placement in one year.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    #[serde(flatten)]
    pub student: Student,
    pub class_id: String,
    pub status: EnrollmentStatus,
}

fn row_to_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        first_name: r.get(1)?,
        last_name: r.get(2)?,
        birth_date: r.get(3)?,
        birth_place: r.get(4)?,
        contact: r.get(5)?,
        gender: r.get(6)?,
    })
}

fn row_to_enrollment(r: &rusqlite::Row<'_>) -> rusqlite::Result<Enrollment> {
    let status: String = r.get(3)?;
    Ok(Enrollment {
        student_id: r.get(0)?,
        year_id: r.get(1)?,
        class_id: r.get(2)?,
        status: EnrollmentStatus::parse(&status).unwrap_or_default(),
        date: r.get(4)?,
    })
}

pub fn list_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, birth_date, birth_place, contact, gender
         FROM students
         ORDER BY last_name, first_name",
    )?;
    let rows = stmt
        .query_map([], row_to_student)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, id: &str) -> anyhow::Result<Option<Student>> {
    let s = conn
        .query_row(
            "SELECT id, first_name, last_name, birth_date, birth_place, contact, gender
             FROM students WHERE id = ?",
            [id],
            row_to_student,
        )
        .optional()?;
    Ok(s)
}

pub fn student_exists(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    row_exists(conn, "SELECT 1 FROM students WHERE id = ?", [id])
}

/// Inserts or overwrites a student. An empty id gets a fresh one.
pub fn upsert_student(conn: &Connection, student: &Student) -> anyhow::Result<Student> {
    let mut s = student.clone();
    if s.id.trim().is_empty() {
        s.id = new_id();
    }
    conn.execute(
        "INSERT INTO students(id, first_name, last_name, birth_date, birth_place, contact, gender)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           first_name = excluded.first_name,
           last_name = excluded.last_name,
           birth_date = excluded.birth_date,
           birth_place = excluded.birth_place,
           contact = excluded.contact,
           gender = excluded.gender",
        (
            &s.id,
            &s.first_name,
            &s.last_name,
            &s.birth_date,
            &s.birth_place,
            &s.contact,
            &s.gender,
        ),
    )?;
    Ok(s)
}

/// Tables holding rows keyed by a student id, in delete order.
const STUDENT_DEPENDENTS: [&str; 7] = [
    "attendance_entries",
    "class_subject_students",
    "grades",
    "student_fee_activations",
    "student_service_activations",
    "payments",
    "enrollments",
];

/// Removes the student and every row that references it, atomically.
/// Returns false when the student did not exist.
pub fn delete_student(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    if !student_exists(conn, id)? {
        return Ok(false);
    }
    let tx = conn.unchecked_transaction()?;
    for table in STUDENT_DEPENDENTS {
        let sql = format!("DELETE FROM {} WHERE student_id = ?", table);
        tx.execute(&sql, [id])
            .with_context(|| format!("failed to delete from {}", table))?;
    }
    tx.execute("DELETE FROM students WHERE id = ?", [id])
        .context("failed to delete from students")?;
    tx.commit()?;
    Ok(true)
}

pub fn list_enrollments(conn: &Connection, year_id: &str) -> anyhow::Result<Vec<Enrollment>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, year_id, class_id, status, date
         FROM enrollments
         WHERE year_id = ?
         ORDER BY class_id, student_id",
    )?;
    let rows = stmt
        .query_map([year_id], row_to_enrollment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn enrollment_for(
    conn: &Connection,
    student_id: &str,
    year_id: &str,
) -> anyhow::Result<Option<Enrollment>> {
    let e = conn
        .query_row(
            "SELECT student_id, year_id, class_id, status, date
             FROM enrollments WHERE student_id = ? AND year_id = ?",
            (student_id, year_id),
            row_to_enrollment,
        )
        .optional()?;
    Ok(e)
}

fn enrollment_id(student_id: &str, year_id: &str) -> String {
    format!("enrollment_{}_{}", student_id, year_id)
}

/// Places a student in a class for a year, replacing any existing placement
/// for that year.
pub fn enroll(
    conn: &Connection,
    student_id: &str,
    class_id: &str,
    year_id: &str,
) -> anyhow::Result<Enrollment> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO enrollments(id, student_id, class_id, year_id, status, date)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, year_id) DO UPDATE SET
           class_id = excluded.class_id,
           status = excluded.status,
           date = excluded.date",
        (
            enrollment_id(student_id, year_id),
            student_id,
            class_id,
            year_id,
            EnrollmentStatus::Active.as_str(),
            &now,
        ),
    )?;
    Ok(Enrollment {
        student_id: student_id.to_string(),
        year_id: year_id.to_string(),
        class_id: class_id.to_string(),
        status: EnrollmentStatus::Active,
        date: now,
    })
}

pub fn set_enrollment_status(
    conn: &Connection,
    student_id: &str,
    year_id: &str,
    status: EnrollmentStatus,
) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE enrollments SET status = ? WHERE student_id = ? AND year_id = ?",
        (status.as_str(), student_id, year_id),
    )?;
    Ok(n > 0)
}

/// Replaces the whole enrollment list of a year.
pub fn save_enrollments(
    conn: &Connection,
    year_id: &str,
    list: &[Enrollment],
) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM enrollments WHERE year_id = ?", [year_id])?;
    let now = now_rfc3339();
    let mut written = 0usize;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO enrollments(id, student_id, class_id, year_id, status, date)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, year_id) DO UPDATE SET
               class_id = excluded.class_id,
               status = excluded.status,
               date = excluded.date",
        )?;
        for e in list {
            let date = if e.date.trim().is_empty() { &now } else { &e.date };
            written += stmt.execute((
                enrollment_id(&e.student_id, year_id),
                &e.student_id,
                &e.class_id,
                year_id,
                e.status.as_str(),
                date,
            ))?;
        }
    }
    tx.commit()?;
    Ok(written)
}

pub fn enrollment_history(conn: &Connection, student_id: &str) -> anyhow::Result<Vec<Enrollment>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, year_id, class_id, status, date
         FROM enrollments
         WHERE student_id = ?
         ORDER BY year_id",
    )?;
    let rows = stmt
        .query_map([student_id], row_to_enrollment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Students enrolled in `year_id`, optionally restricted to one class.
pub fn roster(
    conn: &Connection,
    year_id: &str,
    class_id: Option<&str>,
) -> anyhow::Result<Vec<RosterEntry>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.first_name, s.last_name, s.birth_date, s.birth_place, s.contact, s.gender,
                e.class_id, e.status
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.year_id = ?1 AND (?2 IS NULL OR e.class_id = ?2)
         ORDER BY s.last_name, s.first_name",
    )?;
    let rows = stmt
        .query_map((year_id, class_id), |r| {
            let status: String = r.get(8)?;
            Ok(RosterEntry {
                student: row_to_student(r)?,
                class_id: r.get(7)?,
                status: EnrollmentStatus::parse(&status).unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
