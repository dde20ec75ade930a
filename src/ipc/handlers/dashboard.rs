use crate::ipc::helpers::{db, require_db, respond, year_scope, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::repo::classes::list_classes;
use crate::repo::payments::total_collected;
use rusqlite::Connection;
use serde_json::json;

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<i64, HandlerErr> {
    conn.query_row(sql, params, |r| r.get::<_, i64>(0))
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn summary(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let students = count(conn, "SELECT COUNT(*) FROM students", [])?;
    let enrolled = count(
        conn,
        "SELECT COUNT(DISTINCT student_id) FROM enrollments WHERE year_id = ?",
        [&year_id],
    )?;
    let teachers = count(conn, "SELECT COUNT(*) FROM teachers", [])?;
    let assigned = count(
        conn,
        "SELECT COUNT(DISTINCT teacher_id) FROM teacher_assignments WHERE year_id = ?",
        [&year_id],
    )?;
    let classes = list_classes(conn, &year_id).map_err(db("db_query_failed"))?;
    let capacity = classes.iter().fold(0i64, |acc, c| acc.saturating_add(c.capacity));
    let collected = total_collected(conn, &year_id).map_err(db("db_query_failed"))?;
    Ok(json!({
        "yearId": year_id,
        "students": students,
        "enrolledStudents": enrolled,
        "teachers": teachers,
        "assignedTeachers": assigned,
        "classes": classes.len(),
        "totalCapacity": capacity,
        "totalCollected": collected,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "dashboard.summary" => summary(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
