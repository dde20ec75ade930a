use crate::ipc::helpers::{
    db, get_required, get_required_bool, get_required_str, get_string_list, require_db, respond,
    to_value, year_scope, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::repo::teachers::{self, Teacher};
use serde_json::json;

fn list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let all = teachers::list_teachers(conn).map_err(db("db_query_failed"))?;
    Ok(json!({ "teachers": to_value(all)? }))
}

fn get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let id = get_required_str(params, "id")?;
    let teacher = teachers::get_teacher(conn, &id)
        .map_err(db("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("teacher not found"))?;
    let assigned = teachers::is_teacher_assigned(conn, &id, &year_id).map_err(db("db_query_failed"))?;
    Ok(json!({ "teacher": to_value(teacher)?, "assigned": assigned, "yearId": year_id }))
}

fn upsert(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut teacher: Teacher = get_required(params, "teacher")?;
    teacher.first_name = teacher.first_name.trim().to_string();
    teacher.last_name = teacher.last_name.trim().to_string();
    if teacher.first_name.is_empty() || teacher.last_name.is_empty() {
        return Err(HandlerErr::bad_params("firstName and lastName are required"));
    }
    let saved = teachers::upsert_teacher(conn, &teacher).map_err(db("db_insert_failed"))?;
    Ok(json!({ "teacher": to_value(saved)? }))
}

fn delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(params, "id")?;
    if !teachers::delete_teacher(conn, &id).map_err(db("db_delete_failed"))? {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    tracing::info!(teacher_id = %id, "teacher deleted");
    Ok(json!({ "ok": true }))
}

fn assigned(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let ids = teachers::assigned_teacher_ids(conn, &year_id).map_err(db("db_query_failed"))?;
    Ok(json!({ "yearId": year_id, "teacherIds": ids }))
}

fn set_assigned(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let teacher_id = get_required_str(params, "teacherId")?;
    let assigned = get_required_bool(params, "assigned")?;
    if !teachers::teacher_exists(conn, &teacher_id).map_err(db("db_query_failed"))? {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    teachers::set_teacher_assigned(conn, &teacher_id, assigned, &year_id)
        .map_err(db("db_update_failed"))?;
    Ok(json!({ "teacherId": teacher_id, "yearId": year_id, "assigned": assigned }))
}

fn save_assigned(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let ids = get_string_list(params, "teacherIds")?;
    for id in &ids {
        if !teachers::teacher_exists(conn, id).map_err(db("db_query_failed"))? {
            return Err(HandlerErr::not_found("teacher not found").with_details(json!({ "teacherId": id })));
        }
    }
    let saved = teachers::save_assigned_teacher_ids(conn, &ids, &year_id).map_err(db("db_tx_failed"))?;
    Ok(json!({ "yearId": year_id, "saved": saved }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teachers.list" => list(state),
        "teachers.get" => get(state, &req.params),
        "teachers.upsert" => upsert(state, &req.params),
        "teachers.delete" => delete(state, &req.params),
        "teachers.assigned" => assigned(state, &req.params),
        "teachers.setAssigned" => set_assigned(state, &req.params),
        "teachers.saveAssigned" => save_assigned(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
