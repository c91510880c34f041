#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join("bulletin.sqlite3")
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with_args(&[])
}

pub fn spawn_sidecar_with_args(args: &[&str]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_bulletind");
    let mut child = Command::new(exe)
        .args(args)
        .env_remove("BULLETIND_WORKSPACE")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn bulletind");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Error code of a failed response; panics when the call succeeded.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    assert!(value.get("result").is_none(), "failed call leaked a result");
    value.get("error").cloned().expect("error object")
}

pub fn num(v: &serde_json::Value) -> f64 {
    v.as_f64()
        .unwrap_or_else(|| panic!("expected a number, got {}", v))
}

pub fn assert_num(v: &serde_json::Value, expected: f64) {
    let got = num(v);
    assert!(
        (got - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        got
    );
}

pub fn card_for<'a>(cards: &'a serde_json::Value, student_id: &str) -> &'a serde_json::Value {
    cards
        .as_array()
        .expect("reportCards array")
        .iter()
        .find(|c| c["studentId"] == json!(student_id))
        .unwrap_or_else(|| panic!("no card for {}", student_id))
}

pub fn subject_block<'a>(card: &'a serde_json::Value, subject_id: &str) -> &'a serde_json::Value {
    card["subjects"]
        .as_array()
        .expect("subjects array")
        .iter()
        .find(|s| s["subjectId"] == json!(subject_id))
        .unwrap_or_else(|| panic!("no subject block {}", subject_id))
}

/// Opens `workspace` and creates class `c1` with year `y1` (periods p1..p3),
/// subjects `math` (coef 4) and `fran` (coef 2), and students s1..s4.
pub fn seed_class(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) {
    let _ = request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-class",
        "classes.create",
        json!({ "id": "c1", "name": "6e A" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-year",
        "years.create",
        json!({ "id": "y1", "name": "2025-2026" }),
    );
    for n in 1..=3 {
        let _ = request_ok(
            stdin,
            reader,
            &format!("seed-period-{n}"),
            "periods.create",
            json!({
                "id": format!("p{n}"),
                "schoolYearId": "y1",
                "name": format!("Trimestre {n}"),
                "periodNumber": n
            }),
        );
    }
    seed_subjects(stdin, reader, false);
    for (i, (last, first)) in [("Ba", "Aminata"), ("Coulibaly", "Moussa"), ("Diop", "Fatou"), ("Sow", "Ousmane")]
        .iter()
        .enumerate()
    {
        let _ = request_ok(
            stdin,
            reader,
            &format!("seed-student-{i}"),
            "students.create",
            json!({
                "id": format!("s{}", i + 1),
                "classId": "c1",
                "lastName": last,
                "firstName": first
            }),
        );
    }
}

pub fn seed_subjects(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, reversed: bool) {
    let mut subjects = vec![
        ("math", "Mathématiques", "MATH", "Sciences", 4, Some("M. Traoré")),
        ("fran", "Français", "FR", "Lettres", 2, None),
    ];
    if reversed {
        subjects.reverse();
    }
    for (id, name, code, category, coef, professor) in subjects {
        let _ = request_ok(
            stdin,
            reader,
            &format!("seed-subject-{id}"),
            "subjects.upsert",
            json!({
                "id": id,
                "name": name,
                "code": code,
                "categoryName": category,
                "defaultCoefficient": coef
            }),
        );
        let _ = request_ok(
            stdin,
            reader,
            &format!("seed-class-subject-{id}"),
            "classSubjects.set",
            json!({
                "classId": "c1",
                "subjectId": id,
                "professorName": professor,
                "weeklyHours": 4
            }),
        );
    }
}

pub fn record(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    eval_id: &str,
    student_id: &str,
    subject_id: &str,
    period_id: &str,
    kind: &str,
    value: f64,
    base: f64,
) {
    let _ = request_ok(
        stdin,
        reader,
        &format!("rec-{eval_id}"),
        "evaluations.record",
        json!({
            "id": eval_id,
            "studentId": student_id,
            "subjectId": subject_id,
            "classId": "c1",
            "periodId": period_id,
            "type": kind,
            "value": value,
            "base": base
        }),
    );
}
