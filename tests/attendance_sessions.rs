use chrono::{Datelike, Duration, Local};
use serde_json::json;

mod test_support;
use test_support::{
    array_at, create_student, error_code, open_with_year, request_err, request_ok, spawn_sidecar,
    str_at,
};
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};

struct Fixture {
    class_id: String,
    block_id: String,
    awa: String,
    omar: String,
}

fn setup(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Fixture {
    let _ = request_ok(
        stdin,
        reader,
        "class",
        "classes.create",
        json!({ "class": { "id": "6a", "name": "6ème A", "capacity": 40 } }),
    );
    let teacher = request_ok(
        stdin,
        reader,
        "teacher",
        "teachers.upsert",
        json!({ "teacher": { "firstName": "Aliou", "lastName": "Camara" } }),
    );
    let teacher_id = str_at(&teacher, "/teacher/id").to_string();
    let block = request_ok(
        stdin,
        reader,
        "block",
        "schedules.create",
        json!({ "block": {
            "day": "Lundi", "startTime": "08:00", "endTime": "10:00",
            "subject": "SVT", "teacherId": teacher_id, "classId": "6a"
        }}),
    );
    let block_id = str_at(&block, "/block/id").to_string();

    let awa = create_student(stdin, reader, "awa", "Awa", "Diop");
    let omar = create_student(stdin, reader, "omar", "Omar", "Sall");
    for (i, sid) in [&awa, &omar].into_iter().enumerate() {
        let _ = request_ok(
            stdin,
            reader,
            &format!("enroll-{}", i),
            "enrollments.enroll",
            json!({ "studentId": sid, "classId": "6a" }),
        );
    }
    Fixture {
        class_id: "6a".to_string(),
        block_id,
        awa,
        omar,
    }
}

#[test]
fn session_save_lock_and_export() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (workspace, _year) = open_with_year(&mut stdin, &mut reader, "ecoled-attendance", 2024);
    let f = setup(&mut stdin, &mut reader);
    let key = json!({ "classId": f.class_id, "scheduleBlockId": f.block_id, "date": "2024-10-07" });

    let fresh = request_ok(&mut stdin, &mut reader, "fresh", "attendance.session", key.clone());
    assert_eq!(fresh.get("saved").and_then(|v| v.as_bool()), Some(false));
    let statuses: Vec<&str> = array_at(&fresh, "/students").iter().map(|r| str_at(r, "/status")).collect();
    assert_eq!(statuses, vec!["present", "present"]);

    let mut save = key.clone();
    save["entries"] = json!([
        { "studentId": f.awa, "status": "late", "comment": "bus \"Ligne 4\" en retard" }
    ]);
    let saved = request_ok(&mut stdin, &mut reader, "save", "attendance.save", save.clone());
    assert_eq!(saved.get("saved").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(saved.pointer("/counts/retard").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(saved.pointer("/counts/present").and_then(|v| v.as_u64()), Some(1));

    let session = request_ok(&mut stdin, &mut reader, "session", "attendance.session", key.clone());
    assert_eq!(session.get("saved").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(str_at(&session, "/students/0/studentId"), f.awa);
    assert_eq!(str_at(&session, "/students/0/status"), "retard");
    assert_eq!(session.pointer("/percentages/retard").and_then(|v| v.as_u64()), Some(50));

    let export = request_ok(&mut stdin, &mut reader, "export", "attendance.exportCsv", key.clone());
    let path = str_at(&export, "/path").to_string();
    assert!(path.starts_with(&*workspace.join("exports").to_string_lossy()));
    let csv = std::fs::read_to_string(&path).expect("read export");
    let lines: Vec<&str> = csv.split('\n').collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "\"date\",\"classId\",\"scheduleBlockId\",\"studentId\",\"firstName\",\"lastName\",\"status\",\"comment\""
    );
    assert_eq!(
        lines[1],
        format!(
            "\"2024-10-07\",\"6a\",\"{}\",\"{}\",\"Awa\",\"Diop\",\"retard\",\"bus \"\"Ligne 4\"\" en retard\"",
            f.block_id, f.awa
        )
    );
    assert!(lines[2].ends_with("\"present\",\"\""));
    assert!(!csv.ends_with('\n'));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "lock",
        "attendance.setLocked",
        json!({ "classId": f.class_id, "scheduleBlockId": f.block_id, "date": "2024-10-07", "locked": true }),
    );
    let locked = request_err(&mut stdin, &mut reader, "save-locked", "attendance.save", save.clone());
    assert_eq!(error_code(&locked), "locked");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "unlock",
        "attendance.setLocked",
        json!({ "classId": f.class_id, "scheduleBlockId": f.block_id, "date": "2024-10-07", "locked": false }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "save-again", "attendance.save", save);

    let mut absent = key.clone();
    absent["date"] = json!("2024-10-14");
    absent["entries"] = json!([{ "studentId": f.awa, "status": "absent" }]);
    let _ = request_ok(&mut stdin, &mut reader, "absent", "attendance.save", absent);

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "summary",
        "attendance.studentSummary",
        json!({ "studentId": f.awa }),
    );
    assert_eq!(summary.get("total").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(summary.pointer("/counts/absent").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(summary.pointer("/counts/retard").and_then(|v| v.as_u64()), Some(1));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "summary-omar",
        "attendance.studentSummary",
        json!({ "studentId": f.omar }),
    );
    assert_eq!(summary.pointer("/counts/present").and_then(|v| v.as_u64()), Some(2));

    let _ = child.kill();
}

#[test]
fn save_rejects_strangers_and_dates_outside_the_year() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_with_year(&mut stdin, &mut reader, "ecoled-attendance-bad", 2024);
    let f = setup(&mut stdin, &mut reader);
    let stranger = create_student(&mut stdin, &mut reader, "stranger", "Pape", "Niang");

    let outside = request_err(
        &mut stdin,
        &mut reader,
        "outside",
        "attendance.save",
        json!({
            "classId": f.class_id, "scheduleBlockId": f.block_id, "date": "2025-09-02",
            "entries": []
        }),
    );
    assert_eq!(error_code(&outside), "bad_params");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "stranger",
        "attendance.save",
        json!({
            "classId": f.class_id, "scheduleBlockId": f.block_id, "date": "2024-10-07",
            "entries": [{ "studentId": stranger, "status": "absent" }]
        }),
    );
    assert_eq!(error_code(&e), "bad_params");

    let missing = request_err(
        &mut stdin,
        &mut reader,
        "lock-missing",
        "attendance.setLocked",
        json!({ "classId": f.class_id, "scheduleBlockId": f.block_id, "date": "2024-11-04", "locked": true }),
    );
    assert_eq!(error_code(&missing), "not_found");

    let bad_block = request_err(
        &mut stdin,
        &mut reader,
        "bad-block",
        "attendance.session",
        json!({ "classId": f.class_id, "scheduleBlockId": "nope", "date": "2024-10-07" }),
    );
    assert_eq!(error_code(&bad_block), "not_found");

    let _ = child.kill();
}

#[test]
fn unpadded_dates_address_the_same_session() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_with_year(&mut stdin, &mut reader, "ecoled-attendance-dates", 2024);
    let f = setup(&mut stdin, &mut reader);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "save",
        "attendance.save",
        json!({
            "classId": f.class_id, "scheduleBlockId": f.block_id, "date": "2024-10-07",
            "entries": [{ "studentId": f.awa, "status": "absent" }]
        }),
    );
    let session = request_ok(
        &mut stdin,
        &mut reader,
        "session",
        "attendance.session",
        json!({ "classId": f.class_id, "scheduleBlockId": f.block_id, "date": "2024-10-7" }),
    );
    assert_eq!(session.get("saved").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(str_at(&session, "/date"), "2024-10-07");
    assert_eq!(str_at(&session, "/students/0/status"), "absent");

    // Compared as text, "2025-3-07" would sort after the end of the year.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "save-march",
        "attendance.save",
        json!({
            "classId": f.class_id, "scheduleBlockId": f.block_id, "date": "2025-3-07",
            "entries": [{ "studentId": f.omar, "status": "renvoi" }]
        }),
    );
    let march = request_ok(
        &mut stdin,
        &mut reader,
        "session-march",
        "attendance.session",
        json!({ "classId": f.class_id, "scheduleBlockId": f.block_id, "date": "2025-03-07" }),
    );
    assert_eq!(march.get("saved").and_then(|v| v.as_bool()), Some(true));

    let settings = request_ok(
        &mut stdin,
        &mut reader,
        "settings",
        "attendance.settingsSave",
        json!({ "settings": {
            "lockFutureDays": false,
            "specials": [{ "date": "2024-12-2", "type": "holiday", "appliesToAll": true }]
        }}),
    );
    assert_eq!(str_at(&settings, "/settings/specials/0/date"), "2024-12-02");
    let holiday = request_ok(
        &mut stdin,
        &mut reader,
        "session-holiday",
        "attendance.session",
        json!({ "classId": f.class_id, "scheduleBlockId": f.block_id, "date": "2024-12-02" }),
    );
    assert_eq!(str_at(&holiday, "/special/type"), "holiday");

    let _ = child.kill();
}

#[test]
fn future_days_lock_and_special_days() {
    let ahead = Local::now().date_naive() + Duration::days(3);
    let start = if ahead.month() >= 9 { ahead.year() } else { ahead.year() - 1 };
    let date = ahead.format("%Y-%m-%d").to_string();

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_with_year(&mut stdin, &mut reader, "ecoled-attendance-future", start);
    let f = setup(&mut stdin, &mut reader);

    let settings = request_ok(
        &mut stdin,
        &mut reader,
        "settings",
        "attendance.settingsSave",
        json!({ "settings": {
            "lockFutureDays": true,
            "specials": [{ "date": date, "type": "holiday", "appliesToAll": false, "classIds": ["6a"] }]
        }}),
    );
    assert!(!str_at(&settings, "/settings/specials/0/id").is_empty());

    let key = json!({
        "classId": f.class_id, "scheduleBlockId": f.block_id, "date": date,
        "entries": [{ "studentId": f.omar, "status": "absent" }]
    });
    let e = request_err(&mut stdin, &mut reader, "future", "attendance.save", key.clone());
    assert_eq!(error_code(&e), "future_locked");

    let session = request_ok(&mut stdin, &mut reader, "session", "attendance.session", key);
    assert_eq!(str_at(&session, "/special/type"), "holiday");

    let fetched = request_ok(&mut stdin, &mut reader, "get", "attendance.settingsGet", json!({}));
    assert_eq!(
        fetched.pointer("/settings/lockFutureDays").and_then(|v| v.as_bool()),
        Some(true)
    );

    let invalid = request_err(
        &mut stdin,
        &mut reader,
        "invalid",
        "attendance.settingsSave",
        json!({ "settings": {
            "lockFutureDays": false,
            "specials": [{ "date": date, "type": "celebration", "appliesToAll": false, "classIds": [] }]
        }}),
    );
    assert_eq!(error_code(&invalid), "bad_params");

    let _ = child.kill();
}
