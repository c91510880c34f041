use crate::calc::{validate_evaluation, EvaluationStore, EvaluationType, GradeEvaluation};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    calc_err, db_conn, given_or_new_id, optional_str, required_decimal, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use tracing::debug;

fn parse_evaluation(req: &Request) -> Result<GradeEvaluation, Value> {
    let raw_type = required_str(req, "type")?;
    let Some(kind) = EvaluationType::parse(&raw_type) else {
        return Err(err(
            &req.id,
            "bad_params",
            format!("unknown evaluation type: {}", raw_type),
            Some(json!({ "type": raw_type })),
        ));
    };
    Ok(GradeEvaluation {
        id: given_or_new_id(req)?,
        student_id: required_str(req, "studentId")?,
        subject_id: required_str(req, "subjectId")?,
        class_id: required_str(req, "classId")?,
        period_id: required_str(req, "periodId")?,
        kind,
        value: required_decimal(req, "value")?,
        base: required_decimal(req, "base")?,
        title: optional_str(req, "title")?.filter(|s| !s.is_empty()),
    })
}

/// Referential checks the schema alone does not express: the student must
/// belong to the class and the subject must be taught there.
fn check_references(conn: &Connection, e: &GradeEvaluation) -> rusqlite::Result<Option<&'static str>> {
    let student_in_class: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND class_id = ?",
            (&e.student_id, &e.class_id),
            |r| r.get(0),
        )
        .optional()?;
    if student_in_class.is_none() {
        return Ok(Some("student is not on the roster of this class"));
    }
    let subject_in_class: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM class_subject_configs WHERE class_id = ? AND subject_id = ?",
            (&e.class_id, &e.subject_id),
            |r| r.get(0),
        )
        .optional()?;
    if subject_in_class.is_none() {
        return Ok(Some("subject is not taught in this class"));
    }
    let period: Option<i64> = conn
        .query_row("SELECT 1 FROM periods WHERE id = ?", [&e.period_id], |r| {
            r.get(0)
        })
        .optional()?;
    if period.is_none() {
        return Ok(Some("period not found"));
    }
    Ok(None)
}

fn handle_evaluations_record(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let evaluation = match parse_evaluation(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = validate_evaluation(&evaluation) {
        return err(&req.id, "bad_params", e.to_string(), Some(e.details()));
    }
    match check_references(conn, &evaluation) {
        Ok(None) => {}
        Ok(Some(msg)) => {
            return err(
                &req.id,
                "bad_params",
                msg,
                Some(json!({
                    "studentId": evaluation.student_id,
                    "subjectId": evaluation.subject_id,
                    "classId": evaluation.class_id,
                    "periodId": evaluation.period_id
                })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let revision: i64 = match tx.query_row(
        "SELECT COALESCE(MAX(revision), 0) + 1 FROM evaluations WHERE id = ?",
        [&evaluation.id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "INSERT INTO evaluations(id, revision, student_id, subject_id, class_id, period_id,
                                 type, value, base, title, recorded_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &evaluation.id,
            revision,
            &evaluation.student_id,
            &evaluation.subject_id,
            &evaluation.class_id,
            &evaluation.period_id,
            evaluation.kind.label(),
            evaluation.value.to_string(),
            evaluation.base.to_string(),
            &evaluation.title,
            Utc::now().to_rfc3339(),
        ),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "evaluations" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    debug!(evaluation_id = %evaluation.id, revision, "evaluation recorded");
    ok(
        &req.id,
        json!({ "evaluationId": evaluation.id, "revision": revision }),
    )
}

fn handle_evaluations_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match required_str(req, "periodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).evaluations(&class_id, &period_id) {
        Ok(evaluations) => ok(&req.id, json!({ "evaluations": evaluations })),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "evaluations.record" => Some(handle_evaluations_record(state, req)),
        "evaluations.list" => Some(handle_evaluations_list(state, req)),
        _ => None,
    }
}
