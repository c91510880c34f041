use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::calc::{AcademicSettings, EvaluationTypeWeights, GradeScale};

pub const GRADE_SCALE_KEY: &str = "setup.gradeScale";
pub const ACADEMIC_KEY: &str = "setup.academic";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("bulletin.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            active INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    ensure_students_matricule(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS periods(
            id TEXT PRIMARY KEY,
            school_year_id TEXT NOT NULL,
            name TEXT NOT NULL,
            period_number INTEGER NOT NULL,
            FOREIGN KEY(school_year_id) REFERENCES school_years(id),
            UNIQUE(school_year_id, period_number)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            category_name TEXT,
            default_coefficient TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subject_configs(
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            professor_name TEXT,
            coefficient TEXT,
            PRIMARY KEY(class_id, subject_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    ensure_class_subject_weekly_hours(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluation_type_weights(
            type TEXT PRIMARY KEY,
            weight TEXT NOT NULL
        )",
        [],
    )?;

    // Append-only: a correction inserts a higher revision, never UPDATEs.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluations(
            id TEXT NOT NULL,
            revision INTEGER NOT NULL,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            type TEXT NOT NULL,
            value TEXT NOT NULL,
            base TEXT NOT NULL,
            title TEXT,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY(id, revision),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(period_id) REFERENCES periods(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_class_period ON evaluations(class_id, period_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_conduct(
            student_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            absences_justified INTEGER NOT NULL DEFAULT 0,
            absences_unjustified INTEGER NOT NULL DEFAULT 0,
            lates INTEGER NOT NULL DEFAULT 0,
            attendance_rate TEXT,
            conduct TEXT,
            decision_override TEXT,
            PRIMARY KEY(student_id, period_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(period_id) REFERENCES periods(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS report_cards(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            school_year_id TEXT NOT NULL,
            period_number INTEGER NOT NULL,
            card_json TEXT NOT NULL,
            closed_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(period_id) REFERENCES periods(id),
            UNIQUE(student_id, period_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_report_cards_student_year ON report_cards(student_id, school_year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    seed_defaults(conn)?;
    Ok(())
}

fn seed_defaults(conn: &Connection) -> anyhow::Result<()> {
    for (kind, weight) in EvaluationTypeWeights::defaults().0 {
        conn.execute(
            "INSERT OR IGNORE INTO evaluation_type_weights(type, weight) VALUES(?, ?)",
            (kind.label(), weight.to_string()),
        )?;
    }
    if settings_get_json(conn, GRADE_SCALE_KEY)?.is_none() {
        settings_set_json(conn, GRADE_SCALE_KEY, &serde_json::to_value(GradeScale::default())?)?;
    }
    if settings_get_json(conn, ACADEMIC_KEY)?.is_none() {
        settings_set_json(
            conn,
            ACADEMIC_KEY,
            &serde_json::to_value(AcademicSettings::default())?,
        )?;
    }
    Ok(())
}

fn ensure_students_matricule(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "matricule")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN matricule TEXT", [])?;
    Ok(())
}

fn ensure_class_subject_weekly_hours(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "class_subject_configs", "weekly_hours")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE class_subject_configs ADD COLUMN weekly_hours INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
