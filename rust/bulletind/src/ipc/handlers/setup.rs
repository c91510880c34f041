use crate::calc::{
    validate_scale, validate_settings, validate_weights, AcademicSettings, CalcError,
    ConfigurationProvider, EvaluationType, EvaluationTypeWeights, GradeLevel, GradeScale,
};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    calc_err, db_conn, decimal_from_value, given_or_new_id, optional_decimal, optional_i64,
    optional_str, required_decimal, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use tracing::info;

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_decimal(v: &Value, key: &str) -> Result<Decimal, String> {
    decimal_from_value(v).ok_or_else(|| format!("{} must be a number", key))
}

fn parse_nullable_decimal(v: &Value, key: &str) -> Result<Option<Decimal>, String> {
    if v.is_null() {
        return Ok(None);
    }
    parse_decimal(v, key).map(Some)
}

fn parse_grade_levels(v: &Value) -> Result<Vec<GradeLevel>, String> {
    let items = v
        .as_array()
        .ok_or_else(|| "gradeLevels must be an array".to_string())?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let name = item
                .get("name")
                .and_then(|n| n.as_str())
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .ok_or_else(|| format!("gradeLevels[{}].name is required", i))?;
            let min_value = item
                .get("minValue")
                .ok_or_else(|| format!("gradeLevels[{}].minValue is required", i))
                .and_then(|m| parse_decimal(m, "minValue"))?;
            let max_value = item
                .get("maxValue")
                .ok_or_else(|| format!("gradeLevels[{}].maxValue is required", i))
                .and_then(|m| parse_decimal(m, "maxValue"))?;
            let description = item
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string();
            Ok(GradeLevel {
                name,
                min_value,
                max_value,
                description,
            })
        })
        .collect()
}

fn apply_scale_patch(scale: &mut GradeScale, patch: &Map<String, Value>) -> Result<(), String> {
    for (k, v) in patch {
        match k.as_str() {
            "minGrade" => scale.min_grade = parse_decimal(v, k)?,
            "maxGrade" => scale.max_grade = parse_decimal(v, k)?,
            "passingGrade" => scale.passing_grade = parse_nullable_decimal(v, k)?,
            "decimalPrecision" => {
                let n = v
                    .as_u64()
                    .filter(|n| *n <= 10)
                    .ok_or_else(|| "decimalPrecision must be an integer in 0..=10".to_string())?;
                scale.decimal_precision = n as u32;
            }
            "gradeLevels" => scale.grade_levels = parse_grade_levels(v)?,
            _ => return Err(format!("unknown gradeScale field: {}", k)),
        }
    }
    Ok(())
}

fn apply_academic_patch(
    settings: &mut AcademicSettings,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    for (k, v) in patch {
        match k.as_str() {
            "autoPromoteStudents" => settings.auto_promote_students = parse_bool(v, k)?,
            "showRankOnReportCard" => settings.show_rank_on_report_card = parse_bool(v, k)?,
            "showClassAverageOnReportCard" => {
                settings.show_class_average_on_report_card = parse_bool(v, k)?
            }
            "attendanceRequired" => {
                let rate = parse_nullable_decimal(v, k)?;
                if let Some(r) = rate {
                    if r < Decimal::ZERO || r > Decimal::ONE_HUNDRED {
                        return Err("attendanceRequired must be in 0..=100".into());
                    }
                }
                settings.attendance_required = rate;
            }
            "trendEpsilon" => settings.trend_epsilon = parse_decimal(v, k)?,
            "honorRoll" => {
                let obj = v
                    .as_object()
                    .ok_or_else(|| "honorRoll must be an object".to_string())?;
                for (hk, hv) in obj {
                    match hk.as_str() {
                        "honneur" => settings.honor_roll.honneur = parse_decimal(hv, hk)?,
                        "encouragement" => {
                            settings.honor_roll.encouragement = parse_decimal(hv, hk)?
                        }
                        "felicitations" => {
                            settings.honor_roll.felicitations = parse_decimal(hv, hk)?
                        }
                        _ => return Err(format!("unknown honorRoll field: {}", hk)),
                    }
                }
            }
            _ => return Err(format!("unknown academic field: {}", k)),
        }
    }
    Ok(())
}

fn patch_object(req: &Request) -> Result<&Map<String, Value>, Value> {
    req.params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| err(&req.id, "bad_params", "patch must be an object", None))
}

fn handle_grade_scale_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).grade_scale() {
        Ok(scale) => ok(&req.id, json!(scale)),
        Err(e) => calc_err(req, e),
    }
}

fn handle_grade_scale_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match patch_object(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut scale = match SqliteStore::new(conn).grade_scale() {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    if let Err(msg) = apply_scale_patch(&mut scale, patch) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = validate_scale(&scale) {
        return calc_err(req, CalcError::Config(e));
    }
    if let Err(e) = db::settings_set_json(conn, db::GRADE_SCALE_KEY, &json!(scale)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    info!(levels = scale.grade_levels.len(), "grade scale updated");
    ok(&req.id, json!(scale))
}

fn handle_academic_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).academic_settings() {
        Ok(settings) => ok(&req.id, json!(settings)),
        Err(e) => calc_err(req, e),
    }
}

fn handle_academic_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match patch_object(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut settings = match SqliteStore::new(conn).academic_settings() {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    if let Err(msg) = apply_academic_patch(&mut settings, patch) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = validate_settings(&settings) {
        return calc_err(req, CalcError::Config(e));
    }
    if let Err(e) = db::settings_set_json(conn, db::ACADEMIC_KEY, &json!(settings)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!(settings))
}

fn weights_json(weights: &EvaluationTypeWeights) -> Value {
    let map: Map<String, Value> = weights
        .0
        .iter()
        .map(|(kind, w)| (kind.label().to_string(), json!(w)))
        .collect();
    Value::Object(map)
}

fn handle_weights_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).evaluation_type_weights() {
        Ok(w) => ok(&req.id, json!({ "weights": weights_json(&w) })),
        Err(e) => calc_err(req, e),
    }
}

fn handle_weights_set(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(obj) = req.params.get("weights").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "weights must be an object", None);
    };

    let mut weights = EvaluationTypeWeights::default();
    for (label, raw) in obj {
        let Some(kind) = EvaluationType::parse(label) else {
            return err(
                &req.id,
                "bad_params",
                format!("unknown evaluation type: {}", label),
                None,
            );
        };
        let Some(w) = decimal_from_value(raw) else {
            return err(
                &req.id,
                "bad_params",
                format!("weight for {} must be a number", label),
                None,
            );
        };
        weights.0.insert(kind, w);
    }
    if let Err(e) = validate_weights(&weights) {
        return calc_err(req, CalcError::Config(e));
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for (kind, w) in &weights.0 {
        if let Err(e) = tx.execute(
            "INSERT INTO evaluation_type_weights(type, weight) VALUES(?, ?)
             ON CONFLICT(type) DO UPDATE SET weight = excluded.weight",
            (kind.label(), w.to_string()),
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    handle_weights_get(state, req)
}

fn handle_subjects_upsert(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let category_name = match optional_str(req, "categoryName") {
        Ok(v) => v.filter(|s| !s.is_empty()),
        Err(e) => return e,
    };
    let default_coefficient = match required_decimal(req, "defaultCoefficient") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if default_coefficient < Decimal::ZERO {
        return err(
            &req.id,
            "bad_params",
            "defaultCoefficient must be >= 0",
            None,
        );
    }
    let subject_id = match given_or_new_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, name, code, category_name, default_coefficient)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           code = excluded.code,
           category_name = excluded.category_name,
           default_coefficient = excluded.default_coefficient",
        (
            &subject_id,
            &name,
            &code,
            &category_name,
            default_coefficient.to_string(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }
    ok(&req.id, json!({ "subjectId": subject_id }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).all_subjects() {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => calc_err(req, e),
    }
}

fn handle_class_subjects_set(state: &mut AppState, req: &Request) -> Value {
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
    let professor_name = match optional_str(req, "professorName") {
        Ok(v) => v.filter(|s| !s.is_empty()),
        Err(e) => return e,
    };
    let coefficient = match optional_decimal(req, "coefficient") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if coefficient.is_some_and(|c| c < Decimal::ZERO) {
        return err(&req.id, "bad_params", "coefficient must be >= 0", None);
    }
    let weekly_hours = match optional_i64(req, "weeklyHours") {
        Ok(v) => v.unwrap_or(0),
        Err(e) => return e,
    };

    if let Err(e) = conn.execute(
        "INSERT INTO class_subject_configs(class_id, subject_id, professor_name, coefficient, weekly_hours)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(class_id, subject_id) DO UPDATE SET
           professor_name = excluded.professor_name,
           coefficient = excluded.coefficient,
           weekly_hours = excluded.weekly_hours",
        (
            &class_id,
            &subject_id,
            &professor_name,
            coefficient.map(|c| c.to_string()),
            weekly_hours,
        ),
    ) {
        // Unknown class or subject ids fail the foreign keys.
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "class_subject_configs" })),
        );
    }
    ok(&req.id, json!({ "classId": class_id, "subjectId": subject_id }))
}

fn handle_class_subjects_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).class_subject_configs(&class_id) {
        Ok(configs) => ok(&req.id, json!({ "classSubjects": configs })),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.gradeScale.get" => Some(handle_grade_scale_get(state, req)),
        "setup.gradeScale.update" => Some(handle_grade_scale_update(state, req)),
        "setup.academic.get" => Some(handle_academic_get(state, req)),
        "setup.academic.update" => Some(handle_academic_update(state, req)),
        "setup.evaluationWeights.get" => Some(handle_weights_get(state, req)),
        "setup.evaluationWeights.set" => Some(handle_weights_set(state, req)),
        "subjects.upsert" => Some(handle_subjects_upsert(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "classSubjects.set" => Some(handle_class_subjects_set(state, req)),
        "classSubjects.list" => Some(handle_class_subjects_list(state, req)),
        _ => None,
    }
}
