//! Shared plumbing for method handlers: parameter extraction, workspace and
//! year resolution, error shaping.

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::ipc::error::{err, event, ok};
use crate::ipc::types::AppState;
use crate::years;

pub const ACTIVE_YEAR_CHANGED: &str = "year.activeChanged";

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Maps store errors to a fixed code, e.g. `.map_err(db("db_query_failed"))`.
pub fn db(code: &'static str) -> impl Fn(anyhow::Error) -> HandlerErr {
    move |e| HandlerErr::new(code, format!("{e:#}"))
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => {
            if e.code != "not_found" {
                tracing::warn!(code = e.code, message = %e.message, "request rejected");
            }
            e.response(id)
        }
    }
}

pub fn to_value<T: Serialize>(v: T) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(v).map_err(|e| HandlerErr::new("bad_json", e.to_string()))
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_bool(params: &serde_json::Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

pub fn get_required_bool(params: &serde_json::Value, key: &str) -> Result<bool, HandlerErr> {
    get_bool(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Deserializes `params[key]` into `T`.
pub fn get_required<T: DeserializeOwned>(params: &serde_json::Value, key: &str) -> Result<T, HandlerErr> {
    let Some(v) = params.get(key).filter(|v| !v.is_null()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    serde_json::from_value(v.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid {}: {}", key, e)))
}

pub fn get_string_list(params: &serde_json::Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let list: Vec<String> = get_required(params, key)?;
    Ok(list
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Year a request operates on: `params.yearId` when given (must exist),
/// otherwise the active year.
pub fn year_scope(state: &mut AppState, params: &serde_json::Value) -> Result<String, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    if let Some(year_id) = get_opt_str(params, "yearId") {
        let found = years::get_year(conn, &year_id).map_err(db("db_query_failed"))?;
        if found.is_none() {
            return Err(HandlerErr::not_found("year not found"));
        }
        return Ok(year_id);
    }
    state
        .years
        .active_year_id(conn)
        .map_err(db("db_query_failed"))
}

/// Switches the active year and queues the change notification.
pub fn notify_active_year(state: &mut AppState, year_id: &str) {
    if state.years.set_active(year_id) {
        tracing::info!(year_id, "active year changed");
        state
            .events
            .push(event(ACTIVE_YEAR_CHANGED, json!({ "yearId": year_id })));
    }
}

/// ISO `YYYY-MM-DD` check.
pub fn parse_date(s: &str, key: &str) -> Result<chrono::NaiveDate, HandlerErr> {
    let day = s.get(..10).unwrap_or(s);
    chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}
