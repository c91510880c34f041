use crate::calc::Decision;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_decimal, optional_i64, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use rust_decimal::Decimal;
use serde_json::{json, Value};

fn non_negative(req: &Request, key: &str) -> Result<i64, Value> {
    let n = optional_i64(req, key)?.unwrap_or(0);
    if n < 0 {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must be >= 0", key),
            None,
        ));
    }
    Ok(n)
}

fn handle_conduct_set(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match required_str(req, "periodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let absences_justified = match non_negative(req, "absencesJustified") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let absences_unjustified = match non_negative(req, "absencesUnjustified") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lates = match non_negative(req, "lates") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let attendance_rate = match optional_decimal(req, "attendanceRate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if attendance_rate.is_some_and(|r| r < Decimal::ZERO || r > Decimal::ONE_HUNDRED) {
        return err(
            &req.id,
            "bad_params",
            "attendanceRate must be in 0..=100",
            None,
        );
    }
    let conduct = match optional_str(req, "conduct") {
        Ok(v) => v.filter(|s| !s.is_empty()),
        Err(e) => return e,
    };
    let decision_override = match optional_str(req, "decisionOverride") {
        Ok(None) => None,
        Ok(Some(raw)) => match Decision::parse(&raw) {
            Some(d) => Some(d),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "decisionOverride must be one of: Admis, Conditionnel, Redouble",
                    Some(json!({ "decisionOverride": raw })),
                )
            }
        },
        Err(e) => return e,
    };

    if let Err(e) = conn.execute(
        "INSERT INTO student_conduct(student_id, period_id, absences_justified,
                                     absences_unjustified, lates, attendance_rate,
                                     conduct, decision_override)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, period_id) DO UPDATE SET
           absences_justified = excluded.absences_justified,
           absences_unjustified = excluded.absences_unjustified,
           lates = excluded.lates,
           attendance_rate = excluded.attendance_rate,
           conduct = excluded.conduct,
           decision_override = excluded.decision_override",
        (
            &student_id,
            &period_id,
            absences_justified,
            absences_unjustified,
            lates,
            attendance_rate.map(|r| r.to_string()),
            &conduct,
            decision_override.map(Decision::label),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "student_conduct" })),
        );
    }

    ok(
        &req.id,
        json!({ "studentId": student_id, "periodId": period_id }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "conduct.set" => Some(handle_conduct_set(state, req)),
        _ => None,
    }
}
