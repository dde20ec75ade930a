use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{new_id, now_rfc3339};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Semester {
    Premier,
    Deuxieme,
}

impl Semester {
    pub fn as_str(self) -> &'static str {
        match self {
            Semester::Premier => "premier",
            Semester::Deuxieme => "deuxieme",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "premier" | "1" => Some(Semester::Premier),
            "deuxieme" | "2" => Some(Semester::Deuxieme),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanguageTrack {
    LV1,
    LV2,
}

impl LanguageTrack {
    pub fn as_str(self) -> &'static str {
        match self {
            LanguageTrack::LV1 => "LV1",
            LanguageTrack::LV2 => "LV2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LV1" => Some(LanguageTrack::LV1),
            "LV2" => Some(LanguageTrack::LV2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub coefficient: f64,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub language_type: Option<LanguageTrack>,
    #[serde(default)]
    pub student_ids: Vec<String>,
}

impl Subject {
    pub fn takes(&self, student_id: &str) -> bool {
        self.student_ids.iter().any(|s| s == student_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSubjects {
    pub id: String,
    pub class_id: String,
    pub semester: Semester,
    pub subjects: Vec<Subject>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    #[serde(default)]
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub class_id: String,
    pub semester: Semester,
    #[serde(default)]
    pub devoir1: Option<f64>,
    #[serde(default)]
    pub devoir2: Option<f64>,
    #[serde(default)]
    pub composition: Option<f64>,
    #[serde(default)]
    pub created_at: String,
}

fn load_subjects(conn: &Connection, config_id: &str) -> anyhow::Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT subject_id, name, coefficient, is_optional, language_track
         FROM class_subject_items
         WHERE config_id = ?
         ORDER BY sort_order",
    )?;
    let mut subjects = stmt
        .query_map([config_id], |r| {
            let track: Option<String> = r.get(4)?;
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                coefficient: r.get(2)?,
                is_optional: r.get::<_, i64>(3)? != 0,
                language_type: track.as_deref().and_then(LanguageTrack::parse),
                student_ids: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT subject_id, student_id
         FROM class_subject_students
         WHERE config_id = ?
         ORDER BY student_id",
    )?;
    let pairs = stmt
        .query_map([config_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut by_subject: HashMap<String, Vec<String>> = HashMap::new();
    for (subject_id, student_id) in pairs {
        by_subject.entry(subject_id).or_default().push(student_id);
    }
    for s in &mut subjects {
        if let Some(ids) = by_subject.remove(&s.id) {
            s.student_ids = ids;
        }
    }
    Ok(subjects)
}

pub fn list_class_subjects(conn: &Connection, year_id: &str) -> anyhow::Result<Vec<ClassSubjects>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, semester, created_at
         FROM class_subjects
         WHERE year_id = ?
         ORDER BY class_id, semester",
    )?;
    let heads = stmt
        .query_map([year_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(heads.len());
    for (id, class_id, semester, created_at) in heads {
        let Some(semester) = Semester::parse(&semester) else {
            tracing::warn!(config_id = %id, "skipping class subjects with unknown semester");
            continue;
        };
        let subjects = load_subjects(conn, &id)?;
        out.push(ClassSubjects {
            id,
            class_id,
            semester,
            subjects,
            created_at,
        });
    }
    Ok(out)
}

pub fn get_class_subjects(
    conn: &Connection,
    year_id: &str,
    class_id: &str,
    semester: Semester,
) -> anyhow::Result<Option<ClassSubjects>> {
    let head = conn
        .query_row(
            "SELECT id, created_at FROM class_subjects
             WHERE year_id = ? AND class_id = ? AND semester = ?",
            (year_id, class_id, semester.as_str()),
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
        )
        .optional()?;
    let Some((id, created_at)) = head else {
        return Ok(None);
    };
    let subjects = load_subjects(conn, &id)?;
    Ok(Some(ClassSubjects {
        id,
        class_id: class_id.to_string(),
        semester,
        subjects,
        created_at,
    }))
}

/// Replaces the subject list of one (class, semester) in a year.
pub fn save_class_subjects(
    conn: &Connection,
    year_id: &str,
    class_id: &str,
    semester: Semester,
    subjects: &[Subject],
) -> anyhow::Result<ClassSubjects> {
    let tx = conn.unchecked_transaction()?;
    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM class_subjects WHERE year_id = ? AND class_id = ? AND semester = ?",
            (year_id, class_id, semester.as_str()),
            |r| r.get(0),
        )
        .optional()?;
    let config_id = match existing {
        Some(id) => {
            tx.execute("DELETE FROM class_subject_students WHERE config_id = ?", [&id])
                .context("failed to delete from class_subject_students")?;
            tx.execute("DELETE FROM class_subject_items WHERE config_id = ?", [&id])
                .context("failed to delete from class_subject_items")?;
            id
        }
        None => {
            let id = new_id();
            tx.execute(
                "INSERT INTO class_subjects(id, year_id, class_id, semester, created_at)
                 VALUES(?, ?, ?, ?, ?)",
                (&id, year_id, class_id, semester.as_str(), now_rfc3339()),
            )
            .context("failed to insert class_subjects")?;
            id
        }
    };

    {
        let mut item_stmt = tx.prepare(
            "INSERT INTO class_subject_items(config_id, subject_id, name, coefficient, is_optional, language_track, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
        )?;
        let mut student_stmt = tx.prepare(
            "INSERT OR IGNORE INTO class_subject_students(config_id, subject_id, student_id)
             VALUES(?, ?, ?)",
        )?;
        for (i, s) in subjects.iter().enumerate() {
            let subject_id = if s.id.trim().is_empty() {
                new_id()
            } else {
                s.id.clone()
            };
            item_stmt
                .execute((
                    &config_id,
                    &subject_id,
                    s.name.trim(),
                    s.coefficient,
                    s.is_optional as i64,
                    s.language_type.map(LanguageTrack::as_str),
                    i as i64,
                ))
                .context("failed to insert class_subject_items")?;
            for student_id in &s.student_ids {
                student_stmt
                    .execute((&config_id, &subject_id, student_id))
                    .context("failed to insert class_subject_students")?;
            }
        }
    }
    tx.commit()?;

    get_class_subjects(conn, year_id, class_id, semester)?
        .context("class subjects vanished after save")
}

fn row_to_grade(r: &rusqlite::Row<'_>) -> rusqlite::Result<Grade> {
    let semester: String = r.get(4)?;
    Ok(Grade {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        class_id: r.get(3)?,
        semester: Semester::parse(&semester).unwrap_or(Semester::Premier),
        devoir1: r.get(5)?,
        devoir2: r.get(6)?,
        composition: r.get(7)?,
        created_at: r.get(8)?,
    })
}

pub fn list_grades(
    conn: &Connection,
    year_id: &str,
    class_id: Option<&str>,
    semester: Option<Semester>,
) -> anyhow::Result<Vec<Grade>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, subject_id, class_id, semester, devoir1, devoir2, composition, created_at
         FROM grades
         WHERE year_id = ?1
           AND (?2 IS NULL OR class_id = ?2)
           AND (?3 IS NULL OR semester = ?3)
         ORDER BY class_id, semester, student_id, subject_id",
    )?;
    let rows = stmt
        .query_map((year_id, class_id, semester.map(Semester::as_str)), row_to_grade)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Writes the components of one (student, subject, class, semester) cell.
pub fn upsert_grade(conn: &Connection, year_id: &str, grade: &Grade) -> anyhow::Result<Grade> {
    let id = if grade.id.trim().is_empty() {
        new_id()
    } else {
        grade.id.clone()
    };
    conn.execute(
        "INSERT INTO grades(id, year_id, student_id, subject_id, class_id, semester, devoir1, devoir2, composition, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(year_id, student_id, subject_id, class_id, semester) DO UPDATE SET
           devoir1 = excluded.devoir1,
           devoir2 = excluded.devoir2,
           composition = excluded.composition",
        (
            &id,
            year_id,
            &grade.student_id,
            &grade.subject_id,
            &grade.class_id,
            grade.semester.as_str(),
            grade.devoir1,
            grade.devoir2,
            grade.composition,
            now_rfc3339(),
        ),
    )?;
    let stored = conn
        .query_row(
            "SELECT id, student_id, subject_id, class_id, semester, devoir1, devoir2, composition, created_at
             FROM grades
             WHERE year_id = ? AND student_id = ? AND subject_id = ? AND class_id = ? AND semester = ?",
            (
                year_id,
                &grade.student_id,
                &grade.subject_id,
                &grade.class_id,
                grade.semester.as_str(),
            ),
            row_to_grade,
        )
        .context("grade vanished after upsert")?;
    Ok(stored)
}

pub fn delete_grade(conn: &Connection, year_id: &str, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute(
        "DELETE FROM grades WHERE year_id = ? AND id = ?",
        (year_id, id),
    )?;
    Ok(n > 0)
}

/// Replaces every grade of a year.
pub fn save_grades(conn: &Connection, year_id: &str, grades: &[Grade]) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM grades WHERE year_id = ?", [year_id])?;
    let now = now_rfc3339();
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO grades(id, year_id, student_id, subject_id, class_id, semester, devoir1, devoir2, composition, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for g in grades {
            let id = if g.id.trim().is_empty() { new_id() } else { g.id.clone() };
            let created_at = if g.created_at.is_empty() { &now } else { &g.created_at };
            stmt.execute((
                &id,
                year_id,
                &g.student_id,
                &g.subject_id,
                &g.class_id,
                g.semester.as_str(),
                g.devoir1,
                g.devoir2,
                g.composition,
                created_at,
            ))?;
        }
    }
    tx.commit()?;
    Ok(grades.len())
}
