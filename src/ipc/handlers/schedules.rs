use crate::ipc::helpers::{
    db, get_opt_str, get_required, get_required_str, require_db, respond, to_value, year_scope,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::repo::classes::class_exists;
use crate::repo::schedules::{self, ScheduleBlock};
use crate::repo::teachers::teacher_exists;
use crate::repo::{new_id, now_rfc3339};
use crate::schedule::{find_conflicts, parse_hhmm, Conflicts, Slot};
use rusqlite::Connection;
use serde_json::json;

const DEFAULT_COLOR: &str = "#3b82f6";

/// Normalizes a block and returns its (start, end) in minutes.
fn validate(block: &mut ScheduleBlock) -> Result<(u32, u32), HandlerErr> {
    block.day = block.day.trim().to_string();
    block.subject = block.subject.trim().to_string();
    block.teacher_id = block.teacher_id.trim().to_string();
    block.class_id = block.class_id.trim().to_string();
    if block.day.is_empty() || block.subject.is_empty() {
        return Err(HandlerErr::bad_params("day and subject are required"));
    }
    if block.teacher_id.is_empty() || block.class_id.is_empty() {
        return Err(HandlerErr::bad_params("teacherId and classId are required"));
    }
    let start = parse_hhmm(&block.start_time)
        .ok_or_else(|| HandlerErr::bad_params("startTime must be HH:MM"))?;
    let end = parse_hhmm(&block.end_time)
        .ok_or_else(|| HandlerErr::bad_params("endTime must be HH:MM"))?;
    if start >= end {
        return Err(HandlerErr::bad_params("startTime must be before endTime"));
    }
    if block.color.trim().is_empty() {
        block.color = DEFAULT_COLOR.to_string();
    }
    Ok((start, end))
}

fn conflicts_for(
    conn: &Connection,
    year_id: &str,
    block: &ScheduleBlock,
    start: u32,
    end: u32,
    exclude_id: Option<&str>,
) -> Result<Conflicts, HandlerErr> {
    let existing = schedules::list_blocks(conn, year_id, None, None).map_err(db("db_query_failed"))?;
    let slot = Slot {
        day: &block.day,
        start,
        end,
        teacher_id: &block.teacher_id,
        class_id: &block.class_id,
    };
    Ok(find_conflicts(&slot, &existing, exclude_id))
}

/// Teacher overlap is reported ahead of class overlap.
fn reject_conflicts(c: Conflicts) -> Result<(), HandlerErr> {
    if let Some(b) = c.teacher {
        return Err(HandlerErr::new("teacher_conflict", "teacher already teaches at this time")
            .with_details(json!({ "block": to_value(b)? })));
    }
    if let Some(b) = c.class {
        return Err(HandlerErr::new("class_conflict", "class already has a lesson at this time")
            .with_details(json!({ "block": to_value(b)? })));
    }
    Ok(())
}

fn check_references(conn: &Connection, year_id: &str, block: &ScheduleBlock) -> Result<(), HandlerErr> {
    if !teacher_exists(conn, &block.teacher_id).map_err(db("db_query_failed"))? {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    if !class_exists(conn, year_id, &block.class_id).map_err(db("db_query_failed"))? {
        return Err(HandlerErr::not_found("class not found"));
    }
    Ok(())
}

fn list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let class_id = get_opt_str(params, "classId");
    let teacher_id = get_opt_str(params, "teacherId");
    let rows = schedules::list_blocks(conn, &year_id, class_id.as_deref(), teacher_id.as_deref())
        .map_err(db("db_query_failed"))?;
    Ok(json!({ "yearId": year_id, "blocks": to_value(rows)? }))
}

fn create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let mut block: ScheduleBlock = get_required(params, "block")?;
    let (start, end) = validate(&mut block)?;
    check_references(conn, &year_id, &block)?;
    reject_conflicts(conflicts_for(conn, &year_id, &block, start, end, None)?)?;

    block.id = new_id();
    block.created_at = now_rfc3339();
    schedules::insert_block(conn, &year_id, &block).map_err(db("db_insert_failed"))?;
    Ok(json!({ "block": to_value(block)? }))
}

fn update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let mut block: ScheduleBlock = get_required(params, "block")?;
    if block.id.trim().is_empty() {
        return Err(HandlerErr::bad_params("missing block.id"));
    }
    let Some(current) = schedules::get_block(conn, &year_id, &block.id).map_err(db("db_query_failed"))? else {
        return Err(HandlerErr::not_found("schedule block not found"));
    };
    let (start, end) = validate(&mut block)?;
    check_references(conn, &year_id, &block)?;
    reject_conflicts(conflicts_for(conn, &year_id, &block, start, end, Some(&current.id))?)?;

    block.created_at = current.created_at;
    schedules::update_block(conn, &year_id, &block).map_err(db("db_update_failed"))?;
    Ok(json!({ "block": to_value(block)? }))
}

fn delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let id = get_required_str(params, "id")?;
    if !schedules::delete_block(conn, &year_id, &id).map_err(db("db_delete_failed"))? {
        return Err(HandlerErr::not_found("schedule block not found"));
    }
    Ok(json!({ "ok": true }))
}

fn check_conflicts(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let mut block: ScheduleBlock = get_required(params, "block")?;
    let (start, end) = validate(&mut block)?;
    let exclude = get_opt_str(params, "excludeId")
        .or_else(|| Some(block.id.trim().to_string()).filter(|s| !s.is_empty()));
    let c = conflicts_for(conn, &year_id, &block, start, end, exclude.as_deref())?;
    Ok(json!({
        "ok": c.is_empty(),
        "teacherConflict": to_value(c.teacher)?,
        "classConflict": to_value(c.class)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "schedules.list" => list(state, &req.params),
        "schedules.create" => create(state, &req.params),
        "schedules.update" => update(state, &req.params),
        "schedules.delete" => delete(state, &req.params),
        "schedules.checkConflicts" => check_conflicts(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
