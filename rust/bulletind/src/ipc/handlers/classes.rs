use crate::calc::{ConfigurationProvider, EvaluationStore};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    calc_err, db_conn, given_or_new_id, optional_bool, optional_i64, optional_str, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{display_name, SqliteStore};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.conn() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id AND s.active = 1) AS student_count,
           (SELECT COUNT(*) FROM class_subject_configs cs WHERE cs.class_id = c.id) AS subject_count
         FROM classes c
         ORDER BY c.name, c.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let student_count: i64 = row.get(2)?;
            let subject_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "studentCount": student_count,
                "subjectCount": subject_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match given_or_new_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name) VALUES(?, ?)",
        (&class_id, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(&req.id, json!({ "classId": class_id, "name": name }))
}

fn class_exists(conn: &rusqlite::Connection, class_id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let last_name = match required_str(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let matricule = match optional_str(req, "matricule") {
        Ok(v) => v.filter(|s| !s.is_empty()),
        Err(e) => return e,
    };
    let active = match optional_bool(req, "active") {
        Ok(v) => v.unwrap_or(true),
        Err(e) => return e,
    };
    let student_id = match given_or_new_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let sort_order: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_id = ?",
        [&class_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if let Err(e) = conn.execute(
        "INSERT INTO students(id, class_id, last_name, first_name, matricule, active, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &class_id,
            &last_name,
            &first_name,
            &matricule,
            active as i64,
            sort_order,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "displayName": display_name(&last_name, &first_name),
            "sortOrder": sort_order
        }),
    )
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).roster(&class_id) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => calc_err(req, e),
    }
}

fn handle_years_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year_id = match given_or_new_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = conn.execute(
        "INSERT INTO school_years(id, name) VALUES(?, ?)",
        (&year_id, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "school_years" })),
        );
    }
    ok(&req.id, json!({ "schoolYearId": year_id, "name": name }))
}

fn handle_periods_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let school_year_id = match required_str(req, "schoolYearId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_number = match optional_i64(req, "periodNumber") {
        Ok(Some(n)) if n >= 1 => n,
        Ok(_) => {
            return err(
                &req.id,
                "bad_params",
                "periodNumber must be an integer >= 1",
                None,
            )
        }
        Err(e) => return e,
    };
    let period_id = match given_or_new_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let year_exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM school_years WHERE id = ?",
            [&school_year_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if year_exists.is_none() {
        return err(&req.id, "not_found", "school year not found", None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO periods(id, school_year_id, name, period_number) VALUES(?, ?, ?, ?)",
        (&period_id, &school_year_id, &name, period_number),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "periods", "periodNumber": period_number })),
        );
    }
    ok(
        &req.id,
        json!({ "periodId": period_id, "name": name, "periodNumber": period_number }),
    )
}

fn handle_periods_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let school_year_id = match required_str(req, "schoolYearId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).year_periods(&school_year_id) {
        Ok(periods) => ok(&req.id, json!({ "periods": periods })),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "years.create" => Some(handle_years_create(state, req)),
        "periods.create" => Some(handle_periods_create(state, req)),
        "periods.list" => Some(handle_periods_list(state, req)),
        _ => None,
    }
}
