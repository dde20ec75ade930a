use crate::ipc::helpers::{
    db, get_required, get_required_str, require_db, respond, to_value, year_scope, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::repo::classes::{self, ClassInput};
use crate::repo::non_empty;
use crate::repo::teachers::teacher_exists;
use rusqlite::Connection;
use serde_json::json;

fn validate(conn: &Connection, mut input: ClassInput) -> Result<ClassInput, HandlerErr> {
    input.name = input.name.trim().to_string();
    if input.name.is_empty() {
        return Err(HandlerErr::bad_params("class name is required"));
    }
    if matches!(input.capacity, Some(c) if c < 1) {
        return Err(HandlerErr::bad_params("capacity must be at least 1"));
    }
    input.level = non_empty(input.level);
    input.main_teacher_id = non_empty(input.main_teacher_id);
    if let Some(t) = &input.main_teacher_id {
        if !teacher_exists(conn, t).map_err(db("db_query_failed"))? {
            return Err(HandlerErr::not_found("teacher not found"));
        }
    }
    Ok(input)
}

fn list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let rows = classes::list_classes(conn, &year_id).map_err(db("db_query_failed"))?;
    Ok(json!({ "yearId": year_id, "classes": to_value(rows)? }))
}

fn create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let input = validate(conn, get_required(params, "class")?)?;
    if let Some(id) = input.id.as_deref().filter(|s| !s.trim().is_empty()) {
        if classes::class_exists(conn, &year_id, id).map_err(db("db_query_failed"))? {
            return Err(HandlerErr::bad_params("class id already exists in this year"));
        }
    }
    let created = classes::create_class(conn, &year_id, &input).map_err(db("db_insert_failed"))?;
    Ok(json!({ "class": to_value(created)? }))
}

fn update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let id = get_required_str(params, "id")?;
    let input = validate(conn, get_required(params, "class")?)?;
    if !classes::update_class(conn, &year_id, &id, &input).map_err(db("db_update_failed"))? {
        return Err(HandlerErr::not_found("class not found"));
    }
    let updated = classes::get_class(conn, &year_id, &id).map_err(db("db_query_failed"))?;
    Ok(json!({ "class": to_value(updated)? }))
}

fn delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let id = get_required_str(params, "id")?;
    if !classes::delete_class(conn, &year_id, &id).map_err(db("db_delete_failed"))? {
        return Err(HandlerErr::not_found("class not found"));
    }
    tracing::info!(class_id = %id, year_id = %year_id, "class deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.list" => list(state, &req.params),
        "classes.create" => create(state, &req.params),
        "classes.update" => update(state, &req.params),
        "classes.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
