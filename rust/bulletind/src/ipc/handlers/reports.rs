use crate::calc::{self, CalcError, ClassSnapshot, ReportCard};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{calc_err, db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

fn load_snapshot(conn: &Connection, class_id: &str, period_id: &str) -> Result<ClassSnapshot, CalcError> {
    let store = SqliteStore::new(conn);
    ClassSnapshot::load(&store, &store, class_id, period_id)
}

fn compute_cards(conn: &Connection, class_id: &str, period_id: &str) -> Result<Vec<ReportCard>, CalcError> {
    let snapshot = load_snapshot(conn, class_id, period_id)?;
    calc::compute_class_report_cards(&snapshot)
}

fn handle_reportcards_compute(state: &mut AppState, req: &Request) -> Value {
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

    match compute_cards(conn, &class_id, &period_id) {
        Ok(cards) => ok(&req.id, json!({ "reportCards": cards })),
        Err(e) => calc_err(req, e),
    }
}

fn handle_reportcards_subject_ranking(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match required_str(req, "periodId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let ranking = load_snapshot(conn, &class_id, &period_id)
        .and_then(|snapshot| calc::compute_subject_ranking(&snapshot, &subject_id));
    match ranking {
        Ok(entries) => ok(
            &req.id,
            json!({ "subjectId": subject_id, "ranking": entries }),
        ),
        Err(e) => calc_err(req, e),
    }
}

fn handle_reportcards_close(state: &mut AppState, req: &Request) -> Value {
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

    let already: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM report_cards WHERE class_id = ? AND period_id = ?",
        (&class_id, &period_id),
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if already > 0 {
        return err(
            &req.id,
            "already_closed",
            "report cards for this class and period are already archived",
            Some(json!({ "classId": class_id, "periodId": period_id })),
        );
    }

    let cards = match compute_cards(conn, &class_id, &period_id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    let closed_at = Utc::now().to_rfc3339();
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for card in &cards {
        let card_json = match serde_json::to_string(card) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "serialize_failed", e.to_string(), None),
        };
        if let Err(e) = tx.execute(
            "INSERT INTO report_cards(id, class_id, student_id, period_id, school_year_id,
                                      period_number, card_json, closed_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &card.id,
                &card.class_id,
                &card.student_id,
                &card.period_id,
                &card.school_year_id,
                card.period_number,
                &card_json,
                &closed_at,
            ),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "report_cards", "reportCardId": card.id })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    info!(class_id = %class_id, period_id = %period_id, cards = cards.len(), "period closed");
    ok(
        &req.id,
        json!({ "closed": cards.len(), "reportCards": cards }),
    )
}

fn handle_reportcards_history(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let school_year_id = match required_str(req, "schoolYearId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let before_period_id = match optional_str(req, "beforePeriodId") {
        Ok(v) => v.filter(|s| !s.is_empty()),
        Err(e) => return e,
    };

    match SqliteStore::new(conn).closed_report_cards(
        &student_id,
        &school_year_id,
        before_period_id.as_deref(),
    ) {
        Ok(cards) => ok(&req.id, json!({ "reportCards": cards })),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "reportcards.compute" => Some(handle_reportcards_compute(state, req)),
        "reportcards.subjectRanking" => Some(handle_reportcards_subject_ranking(state, req)),
        "reportcards.close" => Some(handle_reportcards_close(state, req)),
        "reportcards.history" => Some(handle_reportcards_history(state, req)),
        _ => None,
    }
}
