use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "ecole.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Global registries (not year-scoped).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            birth_date TEXT,
            birth_place TEXT,
            contact TEXT,
            gender TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            subject TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            closed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT NOT NULL,
            year_id TEXT NOT NULL,
            name TEXT NOT NULL,
            level TEXT,
            capacity INTEGER,
            main_teacher_id TEXT,
            PRIMARY KEY(id, year_id),
            FOREIGN KEY(year_id) REFERENCES academic_years(id),
            FOREIGN KEY(main_teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            year_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            date TEXT NOT NULL,
            UNIQUE(student_id, year_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student_year ON enrollments(student_id, year_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_class_year ON enrollments(class_id, year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_assignments(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            year_id TEXT NOT NULL,
            class_id TEXT,
            subject_id TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_assignments_year ON teacher_assignments(teacher_id, year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fees_per_class(
            year_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            inscription INTEGER NOT NULL DEFAULT 0,
            mensualite INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(year_id, class_id),
            FOREIGN KEY(year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS extra_fees(
            id TEXT NOT NULL,
            year_id TEXT NOT NULL,
            name TEXT NOT NULL,
            amount INTEGER NOT NULL,
            PRIMARY KEY(id, year_id),
            FOREIGN KEY(year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS services(
            id TEXT NOT NULL,
            year_id TEXT NOT NULL,
            name TEXT NOT NULL,
            amount INTEGER NOT NULL,
            PRIMARY KEY(id, year_id),
            FOREIGN KEY(year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_fee_activations(
            student_id TEXT NOT NULL,
            year_id TEXT NOT NULL,
            extra_fee_id TEXT NOT NULL,
            PRIMARY KEY(student_id, year_id, extra_fee_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_service_activations(
            student_id TEXT NOT NULL,
            year_id TEXT NOT NULL,
            service_id TEXT NOT NULL,
            month TEXT NOT NULL,
            PRIMARY KEY(student_id, year_id, service_id, month),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id TEXT PRIMARY KEY,
            year_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            type TEXT NOT NULL,
            class_id TEXT,
            month TEXT,
            item_id TEXT,
            method TEXT,
            amount INTEGER NOT NULL,
            date TEXT NOT NULL,
            FOREIGN KEY(year_id) REFERENCES academic_years(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_student_year ON payments(student_id, year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_settings(
            year_id TEXT PRIMARY KEY,
            lock_future_days INTEGER NOT NULL DEFAULT 0,
            specials TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY(year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            year_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            schedule_block_id TEXT NOT NULL,
            date TEXT NOT NULL,
            locked INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE(year_id, class_id, schedule_block_id, date),
            FOREIGN KEY(year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_entries(
            record_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL,
            comment TEXT NOT NULL DEFAULT '',
            PRIMARY KEY(record_id, student_id),
            FOREIGN KEY(record_id) REFERENCES attendance_records(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_entries_student ON attendance_entries(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedules(
            id TEXT PRIMARY KEY,
            year_id TEXT NOT NULL,
            day TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            subject TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            color TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(year_id) REFERENCES academic_years(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_year_day ON schedules(year_id, day)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subjects(
            id TEXT PRIMARY KEY,
            year_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            semester TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(year_id, class_id, semester),
            FOREIGN KEY(year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subject_items(
            config_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            name TEXT NOT NULL,
            coefficient REAL NOT NULL,
            is_optional INTEGER NOT NULL DEFAULT 0,
            language_track TEXT,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(config_id, subject_id),
            FOREIGN KEY(config_id) REFERENCES class_subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subject_students(
            config_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(config_id, subject_id, student_id),
            FOREIGN KEY(config_id, subject_id) REFERENCES class_subject_items(config_id, subject_id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            year_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            semester TEXT NOT NULL,
            devoir1 REAL,
            devoir2 REAL,
            composition REAL,
            created_at TEXT NOT NULL,
            UNIQUE(year_id, student_id, subject_id, class_id, semester),
            FOREIGN KEY(year_id) REFERENCES academic_years(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_class_semester ON grades(year_id, class_id, semester)",
        [],
    )?;

    Ok(conn)
}
