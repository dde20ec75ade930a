use anyhow::Context;
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default)]
pub struct CloneOptions {
    /// Also copy the source year's classes and their subject configuration
    /// (without student lists).
    pub classes: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneSummary {
    pub fees_per_class: usize,
    pub extra_fees: usize,
    pub services: usize,
    pub attendance_settings: usize,
    pub classes: usize,
    pub class_subjects: usize,
    pub purged: usize,
}

/// Tables whose rows for the destination year are dropped after cloning, so a
/// new year always starts with empty rosters.
const ROSTER_TABLES: [&str; 5] = [
    "enrollments",
    "teacher_assignments",
    "student_fee_activations",
    "student_service_activations",
    "payments",
];

/// Per-year configuration replaced wholesale by a clone.
const CONFIG_TABLES: [&str; 4] = ["fees_per_class", "extra_fees", "services", "attendance_settings"];

/// Replaces the configuration of `to` with a copy of `from`, then purges the
/// rosters of `to`.
///
/// All phases share one transaction. Same or empty ids are a no-op.
pub fn clone_year_data(
    conn: &Connection,
    from: &str,
    to: &str,
    options: CloneOptions,
) -> anyhow::Result<CloneSummary> {
    let mut summary = CloneSummary::default();
    if from.is_empty() || to.is_empty() || from == to {
        return Ok(summary);
    }

    let tx = conn
        .unchecked_transaction()
        .context("failed to begin clone transaction")?;

    for table in CONFIG_TABLES {
        let sql = format!("DELETE FROM {} WHERE year_id = ?", table);
        tx.execute(&sql, [to])
            .with_context(|| format!("failed to clear {}", table))?;
    }
    summary.fees_per_class = tx
        .execute(
            "INSERT INTO fees_per_class(year_id, class_id, inscription, mensualite)
             SELECT ?, class_id, inscription, mensualite FROM fees_per_class WHERE year_id = ?",
            (to, from),
        )
        .context("failed to copy fees_per_class")?;
    summary.extra_fees = tx
        .execute(
            "INSERT INTO extra_fees(id, year_id, name, amount)
             SELECT id, ?, name, amount FROM extra_fees WHERE year_id = ?",
            (to, from),
        )
        .context("failed to copy extra_fees")?;
    summary.services = tx
        .execute(
            "INSERT INTO services(id, year_id, name, amount)
             SELECT id, ?, name, amount FROM services WHERE year_id = ?",
            (to, from),
        )
        .context("failed to copy services")?;
    summary.attendance_settings = tx
        .execute(
            "INSERT INTO attendance_settings(year_id, lock_future_days, specials)
             SELECT ?, lock_future_days, specials FROM attendance_settings WHERE year_id = ?",
            (to, from),
        )
        .context("failed to copy attendance_settings")?;

    if options.classes {
        summary.classes = tx
            .execute(
                "INSERT OR IGNORE INTO classes(id, year_id, name, level, capacity, main_teacher_id)
                 SELECT id, ?, name, level, capacity, main_teacher_id FROM classes WHERE year_id = ?",
                (to, from),
            )
            .context("failed to copy classes")?;
        summary.class_subjects = clone_class_subjects(&tx, from, to)?;
    }

    for table in ROSTER_TABLES {
        let sql = format!("DELETE FROM {} WHERE year_id = ?", table);
        summary.purged += tx
            .execute(&sql, [to])
            .with_context(|| format!("failed to purge {}", table))?;
    }

    tx.commit().context("failed to commit clone")?;
    Ok(summary)
}

fn clone_class_subjects(conn: &Connection, from: &str, to: &str) -> anyhow::Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, semester FROM class_subjects WHERE year_id = ? ORDER BY class_id, semester",
    )?;
    let configs = stmt
        .query_map([from], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let now = chrono::Utc::now().to_rfc3339();
    let mut copied = 0usize;
    for (src_id, class_id, semester) in configs {
        let dst_id = format!("{}_{}_{}", to, class_id, semester);
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO class_subjects(id, year_id, class_id, semester, created_at)
                 VALUES(?, ?, ?, ?, ?)",
                (&dst_id, to, &class_id, &semester, &now),
            )
            .context("failed to copy class_subjects")?;
        if inserted == 0 {
            continue;
        }
        conn.execute(
            "INSERT INTO class_subject_items(config_id, subject_id, name, coefficient, is_optional, language_track, sort_order)
             SELECT ?, subject_id, name, coefficient, is_optional, language_track, sort_order
             FROM class_subject_items WHERE config_id = ?",
            (&dst_id, &src_id),
        )
        .context("failed to copy class_subject_items")?;
        copied += 1;
    }
    Ok(copied)
}
