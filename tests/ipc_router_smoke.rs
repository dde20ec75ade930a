use serde_json::json;

mod test_support;
use test_support::{
    error_code, open_with_year, read_json_line, request, request_err, request_ok, send_raw,
    spawn_sidecar, str_at,
};

#[test]
fn every_method_family_is_routed() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "health", "health", json!({}));
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let early = request_err(&mut stdin, &mut reader, "early", "classes.list", json!({}));
    assert_eq!(error_code(&early), "no_workspace");

    let (_ws, year_id) = open_with_year(&mut stdin, &mut reader, "ecoled-smoke", 2024);
    let health = request_ok(&mut stdin, &mut reader, "health-2", "health", json!({}));
    assert_eq!(str_at(&health, "/activeYearId"), year_id);

    let methods = [
        "years.list",
        "years.active",
        "years.setActive",
        "years.create",
        "years.setClosed",
        "years.clone",
        "students.list",
        "students.get",
        "students.upsert",
        "students.delete",
        "students.roster",
        "enrollments.list",
        "enrollments.forStudent",
        "enrollments.enroll",
        "enrollments.saveAll",
        "enrollments.history",
        "enrollments.setStatus",
        "teachers.list",
        "teachers.get",
        "teachers.upsert",
        "teachers.delete",
        "teachers.assigned",
        "teachers.setAssigned",
        "teachers.saveAssigned",
        "classes.list",
        "classes.create",
        "classes.update",
        "classes.delete",
        "grades.subjectsList",
        "grades.subjectsGet",
        "grades.subjectsSave",
        "grades.list",
        "grades.upsert",
        "grades.delete",
        "grades.saveAll",
        "grades.averages",
        "grades.studentAverage",
        "schedules.list",
        "schedules.create",
        "schedules.update",
        "schedules.delete",
        "schedules.checkConflicts",
        "attendance.session",
        "attendance.save",
        "attendance.setLocked",
        "attendance.exportCsv",
        "attendance.studentSummary",
        "attendance.settingsGet",
        "attendance.settingsSave",
        "fees.get",
        "fees.setForClass",
        "extraFees.list",
        "extraFees.save",
        "services.list",
        "services.save",
        "activations.list",
        "activations.setFee",
        "activations.bulkSetFee",
        "activations.setService",
        "activations.bulkSetService",
        "payments.list",
        "payments.add",
        "payments.sumPaid",
        "payments.status",
        "payments.tracking",
        "dashboard.summary",
    ];
    for (i, method) in methods.iter().enumerate() {
        // Empty params: the call may fail validation but must be routed.
        let resp = request(&mut stdin, &mut reader, &format!("m{}", i), method, json!({}));
        if resp.get("ok").and_then(|v| v.as_bool()) == Some(false) {
            let code = resp
                .pointer("/error/code")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            assert_ne!(code, "not_implemented", "{} was not routed", method);
        }
    }

    let unknown = request_err(&mut stdin, &mut reader, "unknown", "reports.render", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    send_raw(&mut stdin, "{ not json");
    let bad = read_json_line(&mut reader);
    assert_eq!(bad.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(bad.pointer("/error/code").and_then(|v| v.as_str()), Some("bad_json"));

    // The loop keeps serving after a malformed line.
    let _ = request_ok(&mut stdin, &mut reader, "after", "health", json!({}));

    let _ = child.kill();
}

#[test]
fn missing_required_params_are_bad_params() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_with_year(&mut stdin, &mut reader, "ecoled-params", 2024);

    for (i, method) in ["students.get", "classes.update", "payments.status", "attendance.session"]
        .iter()
        .enumerate()
    {
        let e = request_err(&mut stdin, &mut reader, &format!("p{}", i), method, json!({}));
        assert_eq!(error_code(&e), "bad_params", "{}", method);
    }

    let bad_path = request_err(
        &mut stdin,
        &mut reader,
        "select",
        "workspace.select",
        json!({ "path": "/proc/ecoled-cannot-exist/ws" }),
    );
    assert_eq!(error_code(&bad_path), "db_open_failed");

    let _ = child.kill();
}
