use serde_json::json;

mod test_support;
use test_support::{
    assert_num, card_for, request_err, request_ok, seed_class, spawn_sidecar, subject_block,
    temp_dir,
};

#[test]
fn rerecording_an_evaluation_appends_a_revision_that_supersedes_the_old_one() {
    let workspace = temp_dir("bulletind-revisions");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed_class(&mut stdin, &mut reader, &workspace);

    let mark = |value: f64| {
        json!({
            "id": "e1",
            "studentId": "s1",
            "subjectId": "math",
            "classId": "c1",
            "periodId": "p1",
            "type": "Devoir",
            "value": value,
            "base": 20,
            "title": "Devoir 1"
        })
    };
    let first = request_ok(&mut stdin, &mut reader, "1", "evaluations.record", mark(8.0));
    assert_eq!(first["revision"], json!(1));
    let second = request_ok(&mut stdin, &mut reader, "2", "evaluations.record", mark(12.0));
    assert_eq!(second["evaluationId"], json!("e1"));
    assert_eq!(second["revision"], json!(2));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "evaluations.list",
        json!({ "classId": "c1", "periodId": "p1" }),
    );
    let evaluations = listed["evaluations"].as_array().expect("evaluations");
    assert_eq!(evaluations.len(), 1);
    assert_num(&evaluations[0]["value"], 12.0);
    assert_eq!(evaluations[0]["title"], json!("Devoir 1"));

    let cards = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reportcards.compute",
        json!({ "classId": "c1", "periodId": "p1" }),
    );
    let s1 = card_for(&cards["reportCards"], "s1");
    assert_num(&subject_block(s1, "math")["average"], 12.0);

    // Both revisions are still on disk.
    let conn = rusqlite::Connection::open(test_support::db_path(&workspace)).expect("open db");
    let revisions: i64 = conn
        .query_row("SELECT COUNT(*) FROM evaluations WHERE id = 'e1'", [], |r| r.get(0))
        .expect("count revisions");
    assert_eq!(revisions, 2);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn generated_ids_are_returned_to_the_caller() {
    let workspace = temp_dir("bulletind-generated-id");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed_class(&mut stdin, &mut reader, &workspace);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "evaluations.record",
        json!({
            "studentId": "s2",
            "subjectId": "fran",
            "classId": "c1",
            "periodId": "p1",
            "type": "composition",
            "value": "15.5",
            "base": 20
        }),
    );
    let id = res["evaluationId"].as_str().expect("generated id");
    assert!(!id.is_empty());
    assert_eq!(res["revision"], json!(1));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn setup_settings_round_trip_and_drive_the_computation() {
    let workspace = temp_dir("bulletind-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed_class(&mut stdin, &mut reader, &workspace);

    let scale = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.gradeScale.update",
        json!({ "patch": { "passingGrade": 12, "decimalPrecision": 1 } }),
    );
    assert_num(&scale["passingGrade"], 12.0);
    assert_eq!(scale["decimalPrecision"], json!(1));
    let fetched = request_ok(&mut stdin, &mut reader, "2", "setup.gradeScale.get", json!({}));
    assert_eq!(scale, fetched);

    let academic = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.academic.update",
        json!({ "patch": { "showRankOnReportCard": false } }),
    );
    assert_eq!(academic["showRankOnReportCard"], json!(false));

    let bad = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "setup.academic.update",
        json!({ "patch": { "attendanceRequired": 150 } }),
    );
    assert_eq!(bad["code"], json!("bad_params"));

    let weights = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "setup.evaluationWeights.set",
        json!({ "weights": { "Devoir": 1, "Composition": 3 } }),
    );
    assert_num(&weights["weights"]["Composition"], 3.0);
    let negative = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "setup.evaluationWeights.set",
        json!({ "weights": { "Devoir": -1 } }),
    );
    assert_eq!(negative["code"], json!("config_error"));

    // (11*1 + 13*3) / 4 = 12.5, then one decimal.
    for (id, kind, value) in [("e1", "Devoir", 11.0), ("e2", "Composition", 13.0)] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "evaluations.record",
            json!({
                "id": id,
                "studentId": "s1",
                "subjectId": "math",
                "classId": "c1",
                "periodId": "p1",
                "type": kind,
                "value": value,
                "base": 20
            }),
        );
    }
    // 11.95 rounds to 12.0 at one decimal, which meets the passing grade.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "e3",
        "evaluations.record",
        json!({
            "id": "e3",
            "studentId": "s2",
            "subjectId": "math",
            "classId": "c1",
            "periodId": "p1",
            "type": "Devoir",
            "value": 11.95,
            "base": 20
        }),
    );

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "reportcards.compute",
        json!({ "classId": "c1", "periodId": "p1" }),
    );
    let cards = &res["reportCards"];
    let s1 = card_for(cards, "s1");
    assert_num(&s1["generalAverage"], 12.5);
    assert_eq!(s1["decision"], json!("Admis"));
    assert_eq!(s1["display"]["showRank"], json!(false));
    let s2 = card_for(cards, "s2");
    assert_num(&s2["generalAverage"], 12.0);
    assert_eq!(s2["decision"], json!("Admis"));

    drop(stdin);
    let _ = child.wait();
}
