use crate::calc;
use crate::ipc::helpers::{
    db, get_opt_str, get_required, get_required_bool, get_required_str, get_string_list,
    require_db, respond, to_value, year_scope, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::repo::classes::class_exists;
use crate::repo::now_rfc3339;
use crate::repo::payments::{
    self, Catalog, CatalogItem, FeeConfig, Payment, PaymentFilter, PaymentType,
};
use crate::repo::students;
use rusqlite::Connection;
use serde_json::json;

/// Largest amount accepted for a fee, catalog item or payment.
const MAX_AMOUNT: i64 = 1_000_000_000_000;

fn check_amount(key: &str, v: i64) -> Result<i64, HandlerErr> {
    if v < 0 {
        return Err(HandlerErr::bad_params(format!("{} must not be negative", key)));
    }
    if v > MAX_AMOUNT {
        return Err(HandlerErr::bad_params(format!("{} must not exceed {}", key, MAX_AMOUNT)));
    }
    Ok(v)
}

fn valid_month(m: &str) -> bool {
    m.len() == 2 && matches!(m.parse::<u8>(), Ok(1..=12))
}

fn required_month(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let month = get_required_str(params, "month")?;
    if !valid_month(&month) {
        return Err(HandlerErr::bad_params("month must be \"01\"..\"12\""));
    }
    Ok(month)
}

fn opt_month(params: &serde_json::Value) -> Result<Option<String>, HandlerErr> {
    match get_opt_str(params, "month") {
        Some(m) if !valid_month(&m) => Err(HandlerErr::bad_params("month must be \"01\"..\"12\"")),
        other => Ok(other),
    }
}

fn required_type(params: &serde_json::Value) -> Result<PaymentType, HandlerErr> {
    let raw = get_required_str(params, "type")?;
    PaymentType::parse(&raw).ok_or_else(|| HandlerErr::bad_params(format!("unknown payment type: {}", raw)))
}

fn required_amount(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    let v = params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key)))?;
    check_amount(key, v)
}

fn require_student(conn: &Connection, id: &str) -> Result<(), HandlerErr> {
    if !students::student_exists(conn, id).map_err(db("db_query_failed"))? {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(())
}

fn require_item(conn: &Connection, catalog: Catalog, year_id: &str, id: &str) -> Result<CatalogItem, HandlerErr> {
    payments::get_catalog_item(conn, catalog, year_id, id)
        .map_err(db("db_query_failed"))?
        .ok_or_else(|| match catalog {
            Catalog::ExtraFees => HandlerErr::not_found("extra fee not found"),
            Catalog::Services => HandlerErr::not_found("service not found"),
        })
}

fn fees_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let fees = payments::fees_map(conn, &year_id).map_err(db("db_query_failed"))?;
    Ok(json!({ "yearId": year_id, "fees": to_value(fees)? }))
}

fn fees_set_for_class(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let class_id = get_required_str(params, "classId")?;
    let fees = FeeConfig {
        inscription: required_amount(params, "inscription")?,
        mensualite: required_amount(params, "mensualite")?,
    };
    if !class_exists(conn, &year_id, &class_id).map_err(db("db_query_failed"))? {
        return Err(HandlerErr::not_found("class not found"));
    }
    payments::set_class_fees(conn, &year_id, &class_id, fees).map_err(db("db_update_failed"))?;
    Ok(json!({ "classId": class_id, "fees": to_value(fees)? }))
}

fn catalog_list(state: &mut AppState, params: &serde_json::Value, catalog: Catalog) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let items = payments::list_catalog(conn, catalog, &year_id).map_err(db("db_query_failed"))?;
    Ok(json!({ "yearId": year_id, "items": to_value(items)? }))
}

fn catalog_save(state: &mut AppState, params: &serde_json::Value, catalog: Catalog) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let items: Vec<CatalogItem> = get_required(params, "items")?;
    for item in &items {
        if item.name.trim().is_empty() {
            return Err(HandlerErr::bad_params("item name is required"));
        }
        check_amount("amount", item.amount).map_err(|e| e.with_details(json!({ "name": item.name })))?;
    }
    let saved = payments::save_catalog(conn, catalog, &year_id, &items).map_err(db("db_tx_failed"))?;
    Ok(json!({ "yearId": year_id, "items": to_value(saved)? }))
}

fn activations_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let fees = payments::list_fee_activations(conn, &year_id).map_err(db("db_query_failed"))?;
    let services = payments::list_service_activations(conn, &year_id).map_err(db("db_query_failed"))?;
    Ok(json!({
        "yearId": year_id,
        "fees": to_value(fees)?,
        "services": to_value(services)?,
    }))
}

fn activations_set_fee(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let fee_id = get_required_str(params, "extraFeeId")?;
    let active = get_required_bool(params, "active")?;
    require_student(conn, &student_id)?;
    require_item(conn, Catalog::ExtraFees, &year_id, &fee_id)?;
    payments::set_fee_active(conn, &year_id, &student_id, &fee_id, active).map_err(db("db_update_failed"))?;
    Ok(json!({ "studentId": student_id, "extraFeeId": fee_id, "active": active }))
}

fn activations_bulk_set_fee(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let ids = get_string_list(params, "studentIds")?;
    let fee_id = get_required_str(params, "extraFeeId")?;
    let active = get_required_bool(params, "active")?;
    require_item(conn, Catalog::ExtraFees, &year_id, &fee_id)?;
    for id in &ids {
        require_student(conn, id)?;
    }
    let n = payments::bulk_set_fee_active(conn, &year_id, &ids, &fee_id, active).map_err(db("db_tx_failed"))?;
    Ok(json!({ "updated": n, "active": active }))
}

fn activations_set_service(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let service_id = get_required_str(params, "serviceId")?;
    let month = required_month(params)?;
    let active = get_required_bool(params, "active")?;
    require_student(conn, &student_id)?;
    require_item(conn, Catalog::Services, &year_id, &service_id)?;
    payments::set_service_active(conn, &year_id, &student_id, &service_id, &month, active)
        .map_err(db("db_update_failed"))?;
    Ok(json!({
        "studentId": student_id,
        "serviceId": service_id,
        "month": month,
        "active": active,
    }))
}

fn activations_bulk_set_service(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let ids = get_string_list(params, "studentIds")?;
    let service_id = get_required_str(params, "serviceId")?;
    let month = required_month(params)?;
    let active = get_required_bool(params, "active")?;
    require_item(conn, Catalog::Services, &year_id, &service_id)?;
    for id in &ids {
        require_student(conn, id)?;
    }
    let n = payments::bulk_set_service_active(conn, &year_id, &ids, &service_id, &month, active)
        .map_err(db("db_tx_failed"))?;
    Ok(json!({ "updated": n, "month": month, "active": active }))
}

fn list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let student_id = get_opt_str(params, "studentId");
    let rows = payments::list_payments(conn, &year_id, student_id.as_deref()).map_err(db("db_query_failed"))?;
    Ok(json!({ "yearId": year_id, "payments": to_value(rows)? }))
}

fn add(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let mut p: Payment = get_required(params, "payment")?;

    if p.amount <= 0 {
        return Err(HandlerErr::bad_params("amount must be positive"));
    }
    check_amount("amount", p.amount)?;
    p.method = crate::repo::non_empty(p.method);
    if p.method.is_none() {
        return Err(HandlerErr::bad_params("payment method is required"));
    }
    p.month = crate::repo::non_empty(p.month);
    p.item_id = crate::repo::non_empty(p.item_id);
    p.class_id = crate::repo::non_empty(p.class_id);
    if p.kind.needs_month() {
        match p.month.as_deref() {
            Some(m) if valid_month(m) => {}
            _ => return Err(HandlerErr::bad_params("month must be \"01\"..\"12\"")),
        }
    }
    if p.kind.needs_item() && p.item_id.is_none() {
        return Err(HandlerErr::bad_params("itemId is required"));
    }
    require_student(conn, &p.student_id)?;
    match p.kind {
        PaymentType::Frais => {
            require_item(conn, Catalog::ExtraFees, &year_id, p.item_id.as_deref().unwrap_or_default())?;
        }
        PaymentType::Service => {
            require_item(conn, Catalog::Services, &year_id, p.item_id.as_deref().unwrap_or_default())?;
        }
        PaymentType::Inscription | PaymentType::Mensualite => {}
    }
    if p.class_id.is_none() {
        p.class_id = students::enrollment_for(conn, &p.student_id, &year_id)
            .map_err(db("db_query_failed"))?
            .map(|e| e.class_id);
    }
    if p.date.trim().is_empty() {
        p.date = now_rfc3339();
    }

    let stored = payments::add_payment(conn, &year_id, &p).map_err(db("db_insert_failed"))?;
    tracing::info!(student_id = %stored.student_id, kind = stored.kind.as_str(), amount = stored.amount, "payment recorded");
    Ok(json!({ "payment": to_value(stored)? }))
}

struct LineQuery {
    kind: PaymentType,
    class_id: Option<String>,
    month: Option<String>,
    item_id: Option<String>,
}

fn line_query(params: &serde_json::Value) -> Result<LineQuery, HandlerErr> {
    let kind = required_type(params)?;
    let month = opt_month(params)?;
    let item_id = get_opt_str(params, "itemId");
    if kind.needs_month() && month.is_none() {
        return Err(HandlerErr::bad_params("missing month"));
    }
    if kind.needs_item() && item_id.is_none() {
        return Err(HandlerErr::bad_params("missing itemId"));
    }
    Ok(LineQuery {
        kind,
        class_id: get_opt_str(params, "classId"),
        month,
        item_id,
    })
}

fn standing_for(
    conn: &Connection,
    year_id: &str,
    student_id: &str,
    q: &LineQuery,
    class_id: Option<&str>,
) -> Result<(bool, calc::PaymentStanding), HandlerErr> {
    let filter = PaymentFilter {
        student_id,
        kind: q.kind,
        class_id: match q.kind {
            PaymentType::Inscription | PaymentType::Mensualite => class_id,
            PaymentType::Frais | PaymentType::Service => None,
        },
        month: q.month.as_deref(),
        item_id: q.item_id.as_deref(),
    };
    let list = payments::payments_matching(conn, year_id, &filter).map_err(db("db_query_failed"))?;
    let due = payments::due_amount(conn, year_id, q.kind, class_id, q.item_id.as_deref())
        .map_err(db("db_query_failed"))?;
    Ok((due.is_some(), calc::payment_standing(due.unwrap_or(0), &list)))
}

fn sum_paid(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let q = line_query(params)?;
    let filter = PaymentFilter {
        student_id: &student_id,
        kind: q.kind,
        class_id: q.class_id.as_deref(),
        month: q.month.as_deref(),
        item_id: q.item_id.as_deref(),
    };
    let list = payments::payments_matching(conn, &year_id, &filter).map_err(db("db_query_failed"))?;
    Ok(to_value(calc::sum_paid(&list))?)
}

fn status(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let q = line_query(params)?;
    let class_id = match q.class_id.clone() {
        Some(c) => Some(c),
        None => students::enrollment_for(conn, &student_id, &year_id)
            .map_err(db("db_query_failed"))?
            .map(|e| e.class_id),
    };
    let (configured, standing) = standing_for(conn, &year_id, &student_id, &q, class_id.as_deref())?;
    let mut out = to_value(standing)?;
    out["configured"] = json!(configured);
    Ok(out)
}

fn tracking(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year_id = year_scope(state, params)?;
    let conn = require_db(state)?;
    let q = line_query(params)?;
    let roster = students::roster(conn, &year_id, q.class_id.as_deref()).map_err(db("db_query_failed"))?;

    let mut rows = Vec::with_capacity(roster.len());
    let (mut total_due, mut total_paid) = (0i64, 0i64);
    for r in roster {
        let applies = match (q.kind, q.item_id.as_deref(), q.month.as_deref()) {
            (PaymentType::Frais, Some(item), _) => {
                payments::is_fee_active(conn, &year_id, &r.student.id, item).map_err(db("db_query_failed"))?
            }
            (PaymentType::Service, Some(item), Some(month)) => {
                payments::is_service_active(conn, &year_id, &r.student.id, item, month)
                    .map_err(db("db_query_failed"))?
            }
            _ => true,
        };
        if !applies {
            continue;
        }
        let (_, standing) = standing_for(conn, &year_id, &r.student.id, &q, Some(&r.class_id))?;
        total_due = total_due.saturating_add(standing.due);
        total_paid = total_paid.saturating_add(standing.paid);
        let mut row = to_value(&standing)?;
        row["studentId"] = json!(r.student.id);
        row["name"] = json!(r.student.display_name());
        row["classId"] = json!(r.class_id);
        rows.push(row);
    }
    Ok(json!({
        "yearId": year_id,
        "type": q.kind,
        "rows": rows,
        "totalDue": total_due,
        "totalPaid": total_paid,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "fees.get" => fees_get(state, &req.params),
        "fees.setForClass" => fees_set_for_class(state, &req.params),
        "extraFees.list" => catalog_list(state, &req.params, Catalog::ExtraFees),
        "extraFees.save" => catalog_save(state, &req.params, Catalog::ExtraFees),
        "services.list" => catalog_list(state, &req.params, Catalog::Services),
        "services.save" => catalog_save(state, &req.params, Catalog::Services),
        "activations.list" => activations_list(state, &req.params),
        "activations.setFee" => activations_set_fee(state, &req.params),
        "activations.bulkSetFee" => activations_bulk_set_fee(state, &req.params),
        "activations.setService" => activations_set_service(state, &req.params),
        "activations.bulkSetService" => activations_bulk_set_service(state, &req.params),
        "payments.list" => list(state, &req.params),
        "payments.add" => add(state, &req.params),
        "payments.sumPaid" => sum_paid(state, &req.params),
        "payments.status" => status(state, &req.params),
        "payments.tracking" => tracking(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
