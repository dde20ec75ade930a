use serde_json::json;

mod test_support;
use test_support::{
    array_at, create_class, create_student, error_code, open_with_year, request_err, request_ok,
    spawn_sidecar, str_at,
};

fn student_ids(rows: &[serde_json::Value], key: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.get(key).and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}

#[test]
fn deleting_a_student_removes_every_dependent_row() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (_ws, year_id) = open_with_year(&mut stdin, &mut reader, "ecoled-cascade", 2024);

    let class_id = create_class(&mut stdin, &mut reader, "class", "CE1");
    let gone = create_student(&mut stdin, &mut reader, "s1", "Ibrahima", "Ba");
    let kept = create_student(&mut stdin, &mut reader, "s2", "Khady", "Ndiaye");
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "teacher",
        "teachers.upsert",
        json!({ "teacher": { "firstName": "Ousmane", "lastName": "Sarr" } }),
    );
    let teacher_id = str_at(&teacher, "/teacher/id").to_string();

    for (i, sid) in [&gone, &kept].into_iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("enroll-{}", i),
            "enrollments.enroll",
            json!({ "studentId": sid, "classId": class_id }),
        );
    }

    let fees = request_ok(
        &mut stdin,
        &mut reader,
        "extra",
        "extraFees.save",
        json!({ "items": [{ "name": "Cantine", "amount": 3000 }] }),
    );
    let fee_id = str_at(&fees, "/items/0/id").to_string();
    let services = request_ok(
        &mut stdin,
        &mut reader,
        "services",
        "services.save",
        json!({ "items": [{ "name": "Transport", "amount": 7500 }] }),
    );
    let service_id = str_at(&services, "/items/0/id").to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "bulk-fee",
        "activations.bulkSetFee",
        json!({ "studentIds": [gone, kept], "extraFeeId": fee_id, "active": true }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "bulk-service",
        "activations.bulkSetService",
        json!({ "studentIds": [gone, kept], "serviceId": service_id, "month": "10", "active": true }),
    );

    for (i, sid) in [&gone, &kept].into_iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("pay-{}", i),
            "payments.add",
            json!({ "payment": {
                "studentId": sid,
                "type": "mensualite",
                "month": "10",
                "amount": 10000,
                "method": "Wave",
                "date": "2024-10-05T10:00:00Z"
            }}),
        );
    }

    let subjects = request_ok(
        &mut stdin,
        &mut reader,
        "subjects",
        "grades.subjectsSave",
        json!({
            "classId": class_id,
            "semester": "premier",
            "subjects": [{ "name": "Maths", "coefficient": 2, "studentIds": [gone, kept] }]
        }),
    );
    let subject_id = str_at(&subjects, "/classSubjects/subjects/0/id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "grades",
        "grades.saveAll",
        json!({ "grades": [
            { "studentId": gone, "subjectId": subject_id, "classId": class_id, "semester": "premier", "devoir1": 12 },
            { "studentId": kept, "subjectId": subject_id, "classId": class_id, "semester": "premier", "devoir1": 14 }
        ]}),
    );

    let block = request_ok(
        &mut stdin,
        &mut reader,
        "block",
        "schedules.create",
        json!({ "block": {
            "day": "Lundi", "startTime": "08:00", "endTime": "09:00",
            "subject": "Maths", "teacherId": teacher_id, "classId": class_id
        }}),
    );
    let block_id = str_at(&block, "/block/id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "attendance",
        "attendance.save",
        json!({
            "classId": class_id,
            "scheduleBlockId": block_id,
            "date": "2024-10-07",
            "entries": [{ "studentId": gone, "status": "absent" }]
        }),
    );

    let _ = request_ok(&mut stdin, &mut reader, "delete", "students.delete", json!({ "id": gone }));

    let missing = request_err(&mut stdin, &mut reader, "get", "students.get", json!({ "id": gone }));
    assert_eq!(error_code(&missing), "not_found");
    let again = request_err(&mut stdin, &mut reader, "delete-again", "students.delete", json!({ "id": gone }));
    assert_eq!(error_code(&again), "not_found");

    let params = json!({ "yearId": year_id });
    let enrollments = request_ok(&mut stdin, &mut reader, "e", "enrollments.list", params.clone());
    assert_eq!(student_ids(array_at(&enrollments, "/enrollments"), "studentId"), vec![kept.clone()]);

    let activations = request_ok(&mut stdin, &mut reader, "a", "activations.list", params.clone());
    assert_eq!(student_ids(array_at(&activations, "/fees"), "studentId"), vec![kept.clone()]);
    assert_eq!(student_ids(array_at(&activations, "/services"), "studentId"), vec![kept.clone()]);

    let payments = request_ok(&mut stdin, &mut reader, "p", "payments.list", params.clone());
    assert_eq!(student_ids(array_at(&payments, "/payments"), "studentId"), vec![kept.clone()]);

    let grades = request_ok(&mut stdin, &mut reader, "g", "grades.list", params.clone());
    assert_eq!(student_ids(array_at(&grades, "/grades"), "studentId"), vec![kept.clone()]);

    let cfg = request_ok(
        &mut stdin,
        &mut reader,
        "cfg",
        "grades.subjectsGet",
        json!({ "classId": class_id, "semester": "premier" }),
    );
    let members: Vec<String> = array_at(&cfg, "/classSubjects/subjects/0/studentIds")
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    assert_eq!(members, vec![kept.clone()]);

    let session = request_ok(
        &mut stdin,
        &mut reader,
        "session",
        "attendance.session",
        json!({ "classId": class_id, "scheduleBlockId": block_id, "date": "2024-10-07" }),
    );
    assert_eq!(student_ids(array_at(&session, "/students"), "studentId"), vec![kept.clone()]);
    assert_eq!(session.pointer("/counts/absent").and_then(|v| v.as_i64()), Some(0));

    let remaining = request_ok(&mut stdin, &mut reader, "list", "students.list", json!({}));
    assert_eq!(student_ids(array_at(&remaining, "/students"), "id"), vec![kept]);

    let _ = child.kill();
}

#[test]
fn enrolling_requires_existing_student_and_class() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_with_year(&mut stdin, &mut reader, "ecoled-enroll", 2024);
    let class_id = create_class(&mut stdin, &mut reader, "class", "CP");
    let student_id = create_student(&mut stdin, &mut reader, "s", "Aminata", "Kane");

    let no_student = request_err(
        &mut stdin,
        &mut reader,
        "no-student",
        "enrollments.enroll",
        json!({ "studentId": "nope", "classId": class_id }),
    );
    assert_eq!(error_code(&no_student), "not_found");

    let no_class = request_err(
        &mut stdin,
        &mut reader,
        "no-class",
        "enrollments.enroll",
        json!({ "studentId": student_id, "classId": "nope" }),
    );
    assert_eq!(error_code(&no_class), "not_found");

    let blank = request_err(
        &mut stdin,
        &mut reader,
        "blank",
        "students.upsert",
        json!({ "student": { "firstName": "  ", "lastName": "Kane" } }),
    );
    assert_eq!(error_code(&blank), "bad_params");

    let enrolled = request_ok(
        &mut stdin,
        &mut reader,
        "ok",
        "enrollments.enroll",
        json!({ "studentId": student_id, "classId": class_id }),
    );
    assert_eq!(str_at(&enrolled, "/enrollment/classId"), class_id);

    let got = request_ok(&mut stdin, &mut reader, "get", "students.get", json!({ "id": student_id }));
    assert_eq!(str_at(&got, "/student/lastName"), "Kane");
    assert_eq!(array_at(&got, "/enrollments").len(), 1);

    let classes = request_ok(&mut stdin, &mut reader, "classes", "classes.list", json!({}));
    assert_eq!(
        classes.pointer("/classes/0/studentCount").and_then(|v| v.as_i64()),
        Some(1)
    );

    let _ = child.kill();
}

#[test]
fn deleting_a_class_keeps_payments() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_with_year(&mut stdin, &mut reader, "ecoled-class-delete", 2024);
    let class_id = create_class(&mut stdin, &mut reader, "class", "CM2 B");
    let student_id = create_student(&mut stdin, &mut reader, "s", "Youssou", "Mane");
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "teacher",
        "teachers.upsert",
        json!({ "teacher": { "firstName": "Rama", "lastName": "Toure" } }),
    );
    let teacher_id = str_at(&teacher, "/teacher/id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "enroll",
        "enrollments.enroll",
        json!({ "studentId": student_id, "classId": class_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "block",
        "schedules.create",
        json!({ "block": {
            "day": "Mercredi", "startTime": "08:00", "endTime": "09:00",
            "subject": "Dessin", "teacherId": teacher_id, "classId": class_id
        }}),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "pay",
        "payments.add",
        json!({ "payment": {
            "studentId": student_id, "type": "inscription", "amount": 25000, "method": "Espèces"
        }}),
    );

    let _ = request_ok(&mut stdin, &mut reader, "delete", "classes.delete", json!({ "id": class_id }));

    let classes = request_ok(&mut stdin, &mut reader, "classes", "classes.list", json!({}));
    assert!(array_at(&classes, "/classes").is_empty());
    let enrollments = request_ok(&mut stdin, &mut reader, "e", "enrollments.list", json!({}));
    assert!(array_at(&enrollments, "/enrollments").is_empty());
    let blocks = request_ok(&mut stdin, &mut reader, "b", "schedules.list", json!({}));
    assert!(array_at(&blocks, "/blocks").is_empty());
    let payments = request_ok(&mut stdin, &mut reader, "p", "payments.list", json!({}));
    assert_eq!(array_at(&payments, "/payments").len(), 1);

    let gone = request_err(&mut stdin, &mut reader, "again", "classes.delete", json!({ "id": class_id }));
    assert_eq!(error_code(&gone), "not_found");

    let _ = child.kill();
}

#[test]
fn deleting_a_teacher_drops_attendance_of_their_blocks() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_with_year(&mut stdin, &mut reader, "ecoled-teacher-delete", 2024);
    let class_id = create_class(&mut stdin, &mut reader, "class", "4ème A");
    let student_id = create_student(&mut stdin, &mut reader, "s", "Seynabou", "Diagne");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "enroll",
        "enrollments.enroll",
        json!({ "studentId": student_id, "classId": class_id }),
    );

    let mut blocks = Vec::new();
    for (i, (first, start, end)) in [("Assane", "08:00", "09:00"), ("Coumba", "10:00", "11:00")]
        .into_iter()
        .enumerate()
    {
        let teacher = request_ok(
            &mut stdin,
            &mut reader,
            &format!("teacher-{}", i),
            "teachers.upsert",
            json!({ "teacher": { "firstName": first, "lastName": "Gaye" } }),
        );
        let teacher_id = str_at(&teacher, "/teacher/id").to_string();
        let block = request_ok(
            &mut stdin,
            &mut reader,
            &format!("block-{}", i),
            "schedules.create",
            json!({ "block": {
                "day": "Mardi", "startTime": start, "endTime": end,
                "subject": "Anglais", "teacherId": teacher_id, "classId": class_id
            }}),
        );
        let block_id = str_at(&block, "/block/id").to_string();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("attendance-{}", i),
            "attendance.save",
            json!({
                "classId": class_id,
                "scheduleBlockId": block_id,
                "date": "2024-10-08",
                "entries": [{ "studentId": student_id, "status": "absent" }]
            }),
        );
        blocks.push((teacher_id, block_id));
    }

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "before",
        "attendance.studentSummary",
        json!({ "studentId": student_id }),
    );
    assert_eq!(before.get("total").and_then(|v| v.as_u64()), Some(2));

    let _ = request_ok(&mut stdin, &mut reader, "delete", "teachers.delete", json!({ "id": blocks[0].0 }));

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "after",
        "attendance.studentSummary",
        json!({ "studentId": student_id }),
    );
    assert_eq!(after.get("total").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(after.pointer("/counts/absent").and_then(|v| v.as_u64()), Some(1));

    let kept = request_ok(
        &mut stdin,
        &mut reader,
        "kept",
        "attendance.session",
        json!({ "classId": class_id, "scheduleBlockId": blocks[1].1, "date": "2024-10-08" }),
    );
    assert_eq!(kept.get("saved").and_then(|v| v.as_bool()), Some(true));

    let remaining = request_ok(&mut stdin, &mut reader, "blocks", "schedules.list", json!({}));
    assert_eq!(array_at(&remaining, "/blocks").len(), 1);

    let _ = child.kill();
}
