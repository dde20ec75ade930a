use crate::calc;
use crate::ipc::helpers::{
    db, get_opt_str, get_required, get_required_str, require_db, respond, to_value, year_scope,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::repo::classes::class_exists;
use crate::repo::grades::{self, Grade, Semester, Subject};
use crate::repo::students;
use rusqlite::Connection;
use serde_json::json;

const COEFFICIENT_MIN: f64 = 0.5;
const COEFFICIENT_MAX: f64 = 10.0;

fn parse_semester(raw: &str) -> Result<Semester, HandlerErr> {
    Semester::parse(raw).ok_or_else(|| HandlerErr::bad_params(format!("unknown semester: {}", raw)))
}

fn required_semester(params: &serde_json::Value) -> Result<Semester, HandlerErr> {
    parse_semester(&get_required_str(params, "semester")?)
}

fn require_class(conn: &Connection, year_id: &str, class_id: &str) -> Result<(), HandlerErr> {
    if !class_exists(conn, year_id, class_id).map_err(db("db_query_failed"))? {
        return Err(HandlerErr::not_found("class not found"));
    }
    Ok(())
}

fn validate_grade(g: &Grade) -> Result<(), HandlerErr> {
    if g.student_id.trim().is_empty() || g.subject_id.trim().is_empty() || g.class_id.trim().is_empty() {
        return Err(HandlerErr::bad_params("grade needs studentId, subjectId and classId"));
    }
    for (name, v) in [
        ("devoir1", g.devoir1),
        ("devoir2", g.devoir2),
        ("composition", g.composition),
    ] {
        if let Some(v) = v {
            if !v.is_finite() || !(0.0..=calc::GRADE_MAX).contains(&v) {
                return Err(HandlerErr::bad_params(format!("{} must be between 0 and 20", name))
                    .with_details(json!({ "studentId": g.student_id, "subjectId": g.subject_id })));
            }
        }
    }
    Ok(())
}

fn validate_subject(s: &Subject) -> Result<(), HandlerErr> {
    if s.name.trim().is_empty() {
        return Err(HandlerErr::bad_params("subject name is required"));
    }
    if !s.coefficient.is_finite() || !(COEFFICIENT_MIN..=COEFFICIENT_MAX).contains(&s.coefficient) {
        return Err(HandlerErr::bad_params("coefficient must be between 0.5 and 10")
            .with_details(json!({ "subject": s.name })));
    }
    Ok(())
}

fn subjects_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let rows = grades::list_class_subjects(conn, &year_id).map_err(db("db_query_failed"))?;
    Ok(json!({ "yearId": year_id, "classSubjects": to_value(rows)? }))
}

fn subjects_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let class_id = get_required_str(params, "classId")?;
    let semester = required_semester(params)?;
    let cfg = grades::get_class_subjects(conn, &year_id, &class_id, semester)
        .map_err(db("db_query_failed"))?;
    Ok(json!({ "classSubjects": to_value(cfg)? }))
}

fn subjects_save(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let class_id = get_required_str(params, "classId")?;
    let semester = required_semester(params)?;
    let subjects: Vec<Subject> = get_required(params, "subjects")?;
    for s in &subjects {
        validate_subject(s)?;
    }
    require_class(conn, &year_id, &class_id)?;
    for id in subjects.iter().flat_map(|s| &s.student_ids) {
        if !students::student_exists(conn, id).map_err(db("db_query_failed"))? {
            return Err(HandlerErr::not_found("student not found").with_details(json!({ "studentId": id })));
        }
    }
    let saved = grades::save_class_subjects(conn, &year_id, &class_id, semester, &subjects)
        .map_err(db("db_tx_failed"))?;
    Ok(json!({ "classSubjects": to_value(saved)? }))
}

fn list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let class_id = get_opt_str(params, "classId");
    let semester = get_opt_str(params, "semester")
        .map(|s| parse_semester(&s))
        .transpose()?;
    let rows = grades::list_grades(conn, &year_id, class_id.as_deref(), semester)
        .map_err(db("db_query_failed"))?;
    Ok(json!({ "yearId": year_id, "grades": to_value(rows)? }))
}

fn upsert(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let grade: Grade = get_required(params, "grade")?;
    validate_grade(&grade)?;
    if !students::student_exists(conn, &grade.student_id).map_err(db("db_query_failed"))? {
        return Err(HandlerErr::not_found("student not found"));
    }
    let stored = grades::upsert_grade(conn, &year_id, &grade).map_err(db("db_insert_failed"))?;
    Ok(json!({ "grade": to_value(stored)? }))
}

fn delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let id = get_required_str(params, "id")?;
    if !grades::delete_grade(conn, &year_id, &id).map_err(db("db_delete_failed"))? {
        return Err(HandlerErr::not_found("grade not found"));
    }
    Ok(json!({ "ok": true }))
}

fn save_all(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let list: Vec<Grade> = get_required(params, "grades")?;
    for g in &list {
        validate_grade(g)?;
    }
    let saved = grades::save_grades(conn, &year_id, &list).map_err(db("db_tx_failed"))?;
    Ok(json!({ "yearId": year_id, "saved": saved }))
}

fn averages(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let class_id = get_required_str(params, "classId")?;
    let semester = required_semester(params)?;
    require_class(conn, &year_id, &class_id)?;

    let cfg = grades::get_class_subjects(conn, &year_id, &class_id, semester)
        .map_err(db("db_query_failed"))?;
    let Some(cfg) = cfg else {
        return Ok(json!({ "classId": class_id, "semester": semester, "ranking": [] }));
    };
    let roster = students::roster(conn, &year_id, Some(&class_id)).map_err(db("db_query_failed"))?;
    let all = grades::list_grades(conn, &year_id, Some(&class_id), Some(semester))
        .map_err(db("db_query_failed"))?;

    let entries = roster
        .into_iter()
        .map(|r| {
            let avg = calc::student_average(&cfg.subjects, &all, &r.student.id, &class_id, semester);
            (r.student.id.clone(), r.student.display_name(), avg)
        })
        .collect();
    let ranking = calc::class_ranking(entries);
    Ok(json!({
        "classId": class_id,
        "semester": semester,
        "ranking": to_value(ranking)?,
    }))
}

fn student_average(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let class_id = match get_opt_str(params, "classId") {
        Some(c) => Some(c),
        None => students::enrollment_for(conn, &student_id, &year_id)
            .map_err(db("db_query_failed"))?
            .map(|e| e.class_id),
    };
    let Some(class_id) = class_id else {
        return Ok(json!({
            "studentId": student_id,
            "classId": null,
            "averages": to_value(calc::year_averages(None, None))?,
        }));
    };

    let all = grades::list_grades(conn, &year_id, Some(&class_id), None).map_err(db("db_query_failed"))?;
    let mut per_semester = [None, None];
    for (slot, semester) in per_semester.iter_mut().zip([Semester::Premier, Semester::Deuxieme]) {
        let cfg = grades::get_class_subjects(conn, &year_id, &class_id, semester)
            .map_err(db("db_query_failed"))?;
        *slot = cfg.and_then(|c| calc::student_average(&c.subjects, &all, &student_id, &class_id, semester));
    }
    let [premier, deuxieme] = per_semester;
    Ok(json!({
        "studentId": student_id,
        "classId": class_id,
        "averages": to_value(calc::year_averages(premier, deuxieme))?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.subjectsList" => subjects_list(state, &req.params),
        "grades.subjectsGet" => subjects_get(state, &req.params),
        "grades.subjectsSave" => subjects_save(state, &req.params),
        "grades.list" => list(state, &req.params),
        "grades.upsert" => upsert(state, &req.params),
        "grades.delete" => delete(state, &req.params),
        "grades.saveAll" => save_all(state, &req.params),
        "grades.averages" => averages(state, &req.params),
        "grades.studentAverage" => student_average(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
