use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBlock {
    #[serde(default)]
    pub id: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub subject: String,
    pub teacher_id: String,
    pub class_id: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub created_at: String,
}

fn row_to_block(r: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleBlock> {
    Ok(ScheduleBlock {
        id: r.get(0)?,
        day: r.get(1)?,
        start_time: r.get(2)?,
        end_time: r.get(3)?,
        subject: r.get(4)?,
        teacher_id: r.get(5)?,
        class_id: r.get(6)?,
        color: r.get(7)?,
        created_at: r.get(8)?,
    })
}

pub fn list_blocks(
    conn: &Connection,
    year_id: &str,
    class_id: Option<&str>,
    teacher_id: Option<&str>,
) -> anyhow::Result<Vec<ScheduleBlock>> {
    let mut stmt = conn.prepare(
        "SELECT id, day, start_time, end_time, subject, teacher_id, class_id, color, created_at
         FROM schedules
         WHERE year_id = ?1
           AND (?2 IS NULL OR class_id = ?2)
           AND (?3 IS NULL OR teacher_id = ?3)
         ORDER BY day, start_time",
    )?;
    let rows = stmt
        .query_map((year_id, class_id, teacher_id), row_to_block)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_block(conn: &Connection, year_id: &str, id: &str) -> anyhow::Result<Option<ScheduleBlock>> {
    let b = conn
        .query_row(
            "SELECT id, day, start_time, end_time, subject, teacher_id, class_id, color, created_at
             FROM schedules WHERE year_id = ? AND id = ?",
            (year_id, id),
            row_to_block,
        )
        .optional()?;
    Ok(b)
}

pub fn insert_block(conn: &Connection, year_id: &str, block: &ScheduleBlock) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO schedules(id, year_id, day, start_time, end_time, subject, teacher_id, class_id, color, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &block.id,
            year_id,
            &block.day,
            &block.start_time,
            &block.end_time,
            &block.subject,
            &block.teacher_id,
            &block.class_id,
            &block.color,
            &block.created_at,
        ),
    )?;
    Ok(())
}

pub fn update_block(conn: &Connection, year_id: &str, block: &ScheduleBlock) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE schedules
         SET day = ?, start_time = ?, end_time = ?, subject = ?, teacher_id = ?, class_id = ?, color = ?
         WHERE id = ? AND year_id = ?",
        (
            &block.day,
            &block.start_time,
            &block.end_time,
            &block.subject,
            &block.teacher_id,
            &block.class_id,
            &block.color,
            &block.id,
            year_id,
        ),
    )?;
    Ok(n > 0)
}

pub fn delete_block(conn: &Connection, year_id: &str, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute(
        "DELETE FROM schedules WHERE id = ? AND year_id = ?",
        (id, year_id),
    )?;
    Ok(n > 0)
}
