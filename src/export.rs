//! CSV rendering of attendance sessions.

use anyhow::Context;
use std::path::{Path, PathBuf};

pub const ATTENDANCE_HEADER: [&str; 8] = [
    "date",
    "classId",
    "scheduleBlockId",
    "studentId",
    "firstName",
    "lastName",
    "status",
    "comment",
];

#[derive(Debug, Clone)]
pub struct AttendanceCsvRow<'a> {
    pub date: &'a str,
    pub class_id: &'a str,
    pub schedule_block_id: &'a str,
    pub student_id: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub status: &'a str,
    pub comment: &'a str,
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn line<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    fields.into_iter().map(quote).collect::<Vec<_>>().join(",")
}

/// Every field quoted, rows joined by `\n`, no trailing newline.
pub fn attendance_csv(rows: &[AttendanceCsvRow<'_>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(line(ATTENDANCE_HEADER));
    for r in rows {
        lines.push(line([
            r.date,
            r.class_id,
            r.schedule_block_id,
            r.student_id,
            r.first_name,
            r.last_name,
            r.status,
            r.comment,
        ]));
    }
    lines.join("\n")
}

pub fn attendance_file_name(class_id: &str, schedule_block_id: &str, date: &str) -> String {
    format!("attendance_{}_{}_{}.csv", class_id, schedule_block_id, date)
}

pub fn write_export(path: &Path, contents: &str) -> anyhow::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.to_string_lossy()))?;
    }
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
    Ok(path.to_path_buf())
}
