use crate::ipc::helpers::{
    db, get_opt_str, get_required, get_required_str, require_db, respond, to_value, year_scope,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::repo::classes::class_exists;
use crate::repo::students::{self, Enrollment, EnrollmentStatus, Student};
use rusqlite::Connection;
use serde_json::json;

fn require_student(conn: &Connection, id: &str) -> Result<Student, HandlerErr> {
    students::get_student(conn, id)
        .map_err(db("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))
}

fn parse_status(params: &serde_json::Value) -> Result<Option<EnrollmentStatus>, HandlerErr> {
    match get_opt_str(params, "status") {
        None => Ok(None),
        Some(s) => EnrollmentStatus::parse(&s)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown status: {}", s))),
    }
}

fn list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let all = students::list_students(conn).map_err(db("db_query_failed"))?;
    Ok(json!({ "students": to_value(all)? }))
}

fn get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(params, "id")?;
    let student = require_student(conn, &id)?;
    let history = students::enrollment_history(conn, &id).map_err(db("db_query_failed"))?;
    Ok(json!({
        "student": to_value(student)?,
        "enrollments": to_value(history)?,
    }))
}

fn upsert(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut student: Student = get_required(params, "student")?;
    student.first_name = student.first_name.trim().to_string();
    student.last_name = student.last_name.trim().to_string();
    if student.first_name.is_empty() || student.last_name.is_empty() {
        return Err(HandlerErr::bad_params("firstName and lastName are required"));
    }
    let saved = students::upsert_student(conn, &student).map_err(db("db_insert_failed"))?;
    Ok(json!({ "student": to_value(saved)? }))
}

fn delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(params, "id")?;
    if !students::delete_student(conn, &id).map_err(db("db_delete_failed"))? {
        return Err(HandlerErr::not_found("student not found"));
    }
    tracing::info!(student_id = %id, "student deleted");
    Ok(json!({ "ok": true }))
}

fn roster(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let class_id = get_opt_str(params, "classId");
    let rows = students::roster(conn, &year_id, class_id.as_deref()).map_err(db("db_query_failed"))?;
    Ok(json!({ "yearId": year_id, "students": to_value(rows)? }))
}

fn enrollments_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let rows = students::list_enrollments(conn, &year_id).map_err(db("db_query_failed"))?;
    Ok(json!({ "yearId": year_id, "enrollments": to_value(rows)? }))
}

fn enrollments_for_student(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let e = students::enrollment_for(conn, &student_id, &year_id).map_err(db("db_query_failed"))?;
    Ok(json!({ "enrollment": to_value(e)? }))
}

fn enroll(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let class_id = get_required_str(params, "classId")?;
    require_student(conn, &student_id)?;
    if !class_exists(conn, &year_id, &class_id).map_err(db("db_query_failed"))? {
        return Err(HandlerErr::not_found("class not found"));
    }
    let mut e = students::enroll(conn, &student_id, &class_id, &year_id).map_err(db("db_insert_failed"))?;
    if let Some(status) = parse_status(params)? {
        students::set_enrollment_status(conn, &student_id, &year_id, status)
            .map_err(db("db_update_failed"))?;
        e.status = status;
    }
    Ok(json!({ "enrollment": to_value(e)? }))
}

fn enrollments_save_all(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let list: Vec<Enrollment> = get_required(params, "enrollments")?;
    for e in &list {
        if e.student_id.trim().is_empty() || e.class_id.trim().is_empty() {
            return Err(HandlerErr::bad_params("enrollments need studentId and classId"));
        }
        if !students::student_exists(conn, &e.student_id).map_err(db("db_query_failed"))? {
            return Err(HandlerErr::not_found("student not found")
                .with_details(json!({ "studentId": e.student_id })));
        }
    }
    let written = students::save_enrollments(conn, &year_id, &list).map_err(db("db_tx_failed"))?;
    Ok(json!({ "yearId": year_id, "saved": written }))
}

fn enrollments_history(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let rows = students::enrollment_history(conn, &student_id).map_err(db("db_query_failed"))?;
    Ok(json!({ "enrollments": to_value(rows)? }))
}

fn enrollments_set_status(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let status = parse_status(params)?.ok_or_else(|| HandlerErr::bad_params("missing status"))?;
    if !students::set_enrollment_status(conn, &student_id, &year_id, status)
        .map_err(db("db_update_failed"))?
    {
        return Err(HandlerErr::not_found("enrollment not found"));
    }
    Ok(json!({ "studentId": student_id, "yearId": year_id, "status": status }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => list(state),
        "students.get" => get(state, &req.params),
        "students.upsert" => upsert(state, &req.params),
        "students.delete" => delete(state, &req.params),
        "students.roster" => roster(state, &req.params),
        "enrollments.list" => enrollments_list(state, &req.params),
        "enrollments.forStudent" => enrollments_for_student(state, &req.params),
        "enrollments.enroll" => enroll(state, &req.params),
        "enrollments.saveAll" => enrollments_save_all(state, &req.params),
        "enrollments.history" => enrollments_history(state, &req.params),
        "enrollments.setStatus" => enrollments_set_status(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
