use crate::ipc::helpers::{
    db, get_bool, get_opt_str, get_required_bool, get_required_str, notify_active_year,
    require_db, respond, to_value, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::year_clone::{clone_year_data, CloneOptions};
use crate::years::{self, AcademicYear};
use serde_json::json;

fn require_year(conn: &rusqlite::Connection, id: &str) -> Result<AcademicYear, HandlerErr> {
    years::get_year(conn, id)
        .map_err(db("db_query_failed"))?
        .ok_or_else(|| HandlerErr::not_found("year not found"))
}

fn list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let all = years::list_years(conn).map_err(db("db_query_failed"))?;
    Ok(json!({
        "years": to_value(all)?,
        "activeYearId": state.years.peek(),
    }))
}

fn active(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let id = state
        .years
        .active_year_id(conn)
        .map_err(db("db_query_failed"))?;
    let year = require_year(conn, &id)?;
    Ok(json!({ "year": to_value(year)? }))
}

fn set_active(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = get_required_str(params, "yearId")?;
    let conn = require_db(state)?;
    require_year(conn, &year_id)?;
    let before = state.years.peek().map(str::to_string);
    notify_active_year(state, &year_id);
    Ok(json!({
        "yearId": year_id,
        "changed": before.as_deref() != Some(year_id.as_str()),
    }))
}

fn create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let target = match params.get("startYear").and_then(|v| v.as_i64()) {
        Some(start) => {
            let start = i32::try_from(start)
                .ok()
                .filter(|s| (1900..=9998).contains(s))
                .ok_or_else(|| HandlerErr::bad_params("startYear out of range"))?;
            AcademicYear::starting(start)
        }
        None => years::next_year(conn, years::today()).map_err(db("db_query_failed"))?,
    };
    let source = match get_opt_str(params, "cloneFrom") {
        Some(id) => Some(require_year(conn, &id)?.id),
        None => years::list_years(conn)
            .map_err(db("db_query_failed"))?
            .into_iter()
            .filter(|y| y.id != target.id)
            .last()
            .map(|y| y.id),
    };
    let clone_classes = get_bool(params, "cloneClasses")?.unwrap_or(false);
    let activate = get_bool(params, "activate")?.unwrap_or(true);

    let created = years::insert_year_if_missing(conn, &target).map_err(db("db_insert_failed"))?;
    if created {
        tracing::info!(year_id = %target.id, "academic year created");
    }

    // Only a freshly created year is seeded; an existing one keeps its rosters.
    let mut cloned = false;
    let mut summary = None;
    if let (true, Some(from)) = (created, source.as_deref()) {
        match clone_year_data(conn, from, &target.id, CloneOptions { classes: clone_classes }) {
            Ok(s) => {
                cloned = true;
                summary = Some(s);
            }
            Err(e) => {
                tracing::error!(from, to = %target.id, error = %format!("{e:#}"), "year clone failed");
            }
        }
    }

    if activate {
        notify_active_year(state, &target.id);
    }
    Ok(json!({
        "year": to_value(&target)?,
        "created": created,
        "clonedFrom": source.filter(|_| cloned),
        "cloned": cloned,
        "summary": to_value(summary)?,
        "activeYearId": state.years.peek(),
    }))
}

fn set_closed(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let year_id = get_required_str(params, "yearId")?;
    let closed = get_required_bool(params, "closed")?;
    if !years::set_year_closed(conn, &year_id, closed).map_err(db("db_update_failed"))? {
        return Err(HandlerErr::not_found("year not found"));
    }
    Ok(json!({ "yearId": year_id, "closed": closed }))
}

fn clone(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let from = get_required_str(params, "fromYearId")?;
    let to = get_required_str(params, "toYearId")?;
    require_year(conn, &from)?;
    require_year(conn, &to)?;
    let options = CloneOptions {
        classes: get_bool(params, "classes")?.unwrap_or(false),
    };
    let summary = clone_year_data(conn, &from, &to, options).map_err(db("db_tx_failed"))?;
    tracing::info!(from = %from, to = %to, "year data cloned");
    Ok(json!({ "summary": to_value(summary)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "years.list" => list(state),
        "years.active" => active(state),
        "years.setActive" => set_active(state, &req.params),
        "years.create" => create(state, &req.params),
        "years.setClosed" => set_closed(state, &req.params),
        "years.clone" => clone(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
