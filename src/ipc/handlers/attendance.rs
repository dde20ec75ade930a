use crate::calc;
use crate::export::{self, AttendanceCsvRow};
use crate::ipc::helpers::{
    db, get_opt_str, get_required, get_required_bool, get_required_str, parse_date, require_db,
    respond, to_value, year_scope, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::repo::attendance::{self, AttendanceEntry, AttendanceRecord, AttendanceSettings};
use crate::repo::classes::class_exists;
use crate::repo::new_id;
use crate::repo::schedules;
use crate::repo::students::{self, RosterEntry};
use crate::years;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Identifies one session: a class, a timetable block, a day.
struct SessionKey {
    class_id: String,
    schedule_block_id: String,
    date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRow {
    student_id: String,
    first_name: String,
    last_name: String,
    status: attendance::AttendanceStatus,
    comment: String,
}

fn session_key(params: &serde_json::Value) -> Result<SessionKey, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let schedule_block_id = get_required_str(params, "scheduleBlockId")?;
    let date = parse_date(&get_required_str(params, "date")?, "date")?;
    Ok(SessionKey {
        class_id,
        schedule_block_id,
        date: date.format("%Y-%m-%d").to_string(),
    })
}

fn check_session(conn: &Connection, year_id: &str, key: &SessionKey) -> Result<(), HandlerErr> {
    if !class_exists(conn, year_id, &key.class_id).map_err(db("db_query_failed"))? {
        return Err(HandlerErr::not_found("class not found"));
    }
    let block = schedules::get_block(conn, year_id, &key.schedule_block_id)
        .map_err(db("db_query_failed"))?;
    match block {
        Some(b) if b.class_id == key.class_id => Ok(()),
        Some(_) => Err(HandlerErr::bad_params("schedule block belongs to another class")),
        None => Err(HandlerErr::not_found("schedule block not found")),
    }
}

/// Roster of the session's class with recorded statuses; students without
/// an entry are present.
fn session_rows(roster: &[RosterEntry], record: Option<&AttendanceRecord>) -> Vec<SessionRow> {
    let recorded: HashMap<&str, &AttendanceEntry> = record
        .map(|r| r.entries.iter().map(|e| (e.student_id.as_str(), e)).collect())
        .unwrap_or_default();
    roster
        .iter()
        .map(|r| {
            let entry = recorded.get(r.student.id.as_str());
            SessionRow {
                student_id: r.student.id.clone(),
                first_name: r.student.first_name.clone(),
                last_name: r.student.last_name.clone(),
                status: entry.map(|e| e.status).unwrap_or_default(),
                comment: entry.map(|e| e.comment.clone()).unwrap_or_default(),
            }
        })
        .collect()
}

fn load_session(
    conn: &Connection,
    year_id: &str,
    key: &SessionKey,
) -> Result<(Option<AttendanceRecord>, Vec<SessionRow>), HandlerErr> {
    check_session(conn, year_id, key)?;
    let roster = students::roster(conn, year_id, Some(&key.class_id)).map_err(db("db_query_failed"))?;
    let record = attendance::get_record(conn, year_id, &key.class_id, &key.schedule_block_id, &key.date)
        .map_err(db("db_query_failed"))?;
    let rows = session_rows(&roster, record.as_ref());
    Ok((record, rows))
}

fn session(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let key = session_key(params)?;
    let (record, rows) = load_session(conn, &year_id, &key)?;
    let settings = attendance::load_settings(conn, &year_id).map_err(db("db_query_failed"))?;
    let counts = calc::count_attendance(rows.iter().map(|r| r.status));
    Ok(json!({
        "id": attendance::record_id(&key.class_id, &key.schedule_block_id, &key.date),
        "date": key.date,
        "classId": key.class_id,
        "scheduleBlockId": key.schedule_block_id,
        "saved": record.is_some(),
        "locked": record.as_ref().map(|r| r.locked).unwrap_or(false),
        "special": to_value(settings.special_for(&key.date, &key.class_id))?,
        "students": to_value(&rows)?,
        "counts": to_value(counts)?,
        "percentages": to_value(counts.percentages())?,
    }))
}

fn save(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let key = session_key(params)?;
    let entries: Vec<AttendanceEntry> = get_required(params, "entries")?;
    let (record, rows) = load_session(conn, &year_id, &key)?;

    let in_year = years::get_year(conn, &year_id)
        .map_err(db("db_query_failed"))?
        .map(|y| y.contains_date(&key.date))
        .unwrap_or(false);
    if !in_year {
        return Err(HandlerErr::bad_params("date is outside the academic year"));
    }
    if record.as_ref().map(|r| r.locked).unwrap_or(false) {
        return Err(HandlerErr::new("locked", "attendance session is locked"));
    }
    let settings = attendance::load_settings(conn, &year_id).map_err(db("db_query_failed"))?;
    if settings.lock_future_days {
        let day = parse_date(&key.date, "date")?;
        if day > years::today() {
            return Err(HandlerErr::new("future_locked", "cannot record attendance for a future date"));
        }
    }

    let enrolled: HashSet<&str> = rows.iter().map(|r| r.student_id.as_str()).collect();
    let mut by_student: HashMap<String, AttendanceEntry> = HashMap::new();
    for e in entries {
        if !enrolled.contains(e.student_id.as_str()) {
            return Err(HandlerErr::bad_params("student is not enrolled in this class")
                .with_details(json!({ "studentId": e.student_id })));
        }
        by_student.insert(e.student_id.clone(), e);
    }
    let full: Vec<AttendanceEntry> = rows
        .iter()
        .map(|r| {
            by_student.remove(&r.student_id).unwrap_or_else(|| AttendanceEntry {
                student_id: r.student_id.clone(),
                status: Default::default(),
                comment: String::new(),
            })
        })
        .collect();

    let id = attendance::save_record(conn, &year_id, &key.class_id, &key.schedule_block_id, &key.date, &full)
        .map_err(db("db_tx_failed"))?;
    let counts = calc::count_attendance(full.iter().map(|e| e.status));
    Ok(json!({
        "id": id,
        "saved": full.len(),
        "counts": to_value(counts)?,
    }))
}

fn set_locked(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let key = session_key(params)?;
    let locked = get_required_bool(params, "locked")?;
    let changed = attendance::set_locked(conn, &year_id, &key.class_id, &key.schedule_block_id, &key.date, locked)
        .map_err(db("db_update_failed"))?;
    if !changed {
        return Err(HandlerErr::not_found("attendance session not found"));
    }
    Ok(json!({
        "id": attendance::record_id(&key.class_id, &key.schedule_block_id, &key.date),
        "locked": locked,
    }))
}

fn export_csv(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let key = session_key(params)?;
    let (_, rows) = load_session(conn, &year_id, &key)?;

    let csv_rows: Vec<AttendanceCsvRow<'_>> = rows
        .iter()
        .map(|r| AttendanceCsvRow {
            date: &key.date,
            class_id: &key.class_id,
            schedule_block_id: &key.schedule_block_id,
            student_id: &r.student_id,
            first_name: &r.first_name,
            last_name: &r.last_name,
            status: r.status.as_str(),
            comment: &r.comment,
        })
        .collect();
    let csv = export::attendance_csv(&csv_rows);

    let out_path = match get_opt_str(params, "outPath") {
        Some(p) => PathBuf::from(p),
        None => {
            let Some(ws) = state.workspace.as_ref() else {
                return Err(HandlerErr::new("no_workspace", "select a workspace first"));
            };
            ws.join("exports").join(export::attendance_file_name(
                &key.class_id,
                &key.schedule_block_id,
                &key.date,
            ))
        }
    };
    let written = export::write_export(&out_path, &csv)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;
    tracing::info!(path = %written.display(), rows = rows.len(), "attendance exported");
    Ok(json!({
        "path": written.to_string_lossy(),
        "rows": rows.len(),
    }))
}

fn student_summary(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let Some(year) = years::get_year(conn, &year_id).map_err(db("db_query_failed"))? else {
        return Err(HandlerErr::not_found("year not found"));
    };
    let statuses = attendance::student_statuses(conn, &year_id, &student_id, &year.start_date, &year.end_date)
        .map_err(db("db_query_failed"))?;
    let counts = calc::count_attendance(statuses.into_iter().map(|(_, s)| s));
    Ok(json!({
        "studentId": student_id,
        "yearId": year_id,
        "counts": to_value(counts)?,
        "total": counts.total(),
        "percentages": to_value(counts.percentages())?,
    }))
}

fn settings_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let settings = attendance::load_settings(conn, &year_id).map_err(db("db_query_failed"))?;
    Ok(json!({ "yearId": year_id, "settings": to_value(settings)? }))
}

fn settings_save(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let mut settings: AttendanceSettings = get_required(params, "settings")?;
    for special in &mut settings.specials {
        special.date = parse_date(&special.date, "specials.date")?
            .format("%Y-%m-%d")
            .to_string();
        if !special.applies_to_all && special.class_ids.is_empty() {
            return Err(HandlerErr::bad_params("special day needs classIds or appliesToAll"));
        }
        if special.id.trim().is_empty() {
            special.id = new_id();
        }
    }
    attendance::save_settings(conn, &year_id, &settings).map_err(db("db_update_failed"))?;
    Ok(json!({ "yearId": year_id, "settings": to_value(settings)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.session" => session(state, &req.params),
        "attendance.save" => save(state, &req.params),
        "attendance.setLocked" => set_locked(state, &req.params),
        "attendance.exportCsv" => export_csv(state, &req.params),
        "attendance.studentSummary" => student_summary(state, &req.params),
        "attendance.settingsGet" => settings_get(state, &req.params),
        "attendance.settingsSave" => settings_save(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
