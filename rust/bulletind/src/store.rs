use rusqlite::{types::Type, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::calc::{
    AcademicSettings, CalcError, ClassInfo, ClassSubjectConfig, ConfigurationProvider, Decision,
    EvaluationStore, EvaluationType, EvaluationTypeWeights, GradeEvaluation, GradeScale,
    IntegrityError, Period, ReportCard, Student, StudentConduct, Subject,
};
use crate::db;

/// Decimals live in TEXT columns so they come back exactly as written.
pub fn decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(raw.trim())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn opt_decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Decimal::from_str(s.trim())
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub fn display_name(last_name: &str, first_name: &str) -> String {
    format!("{} {}", last_name.trim(), first_name.trim())
        .trim()
        .to_string()
}

/// Read side of the workspace database, seen through the engine's provider
/// traits.
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn setting<T: serde::de::DeserializeOwned + Default>(&self, key: &str) -> Result<T, CalcError> {
        let raw = db::settings_get_json(self.conn, key).map_err(|e| CalcError::Store(e.to_string()))?;
        match raw {
            Some(v) => serde_json::from_value(v)
                .map_err(|e| CalcError::Store(format!("setting {key} is malformed: {e}"))),
            None => Ok(T::default()),
        }
    }

    pub fn all_subjects(&self) -> Result<Vec<Subject>, CalcError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, code, category_name, default_coefficient
             FROM subjects
             ORDER BY name, id",
        )?;
        let rows = stmt
            .query_map([], subject_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Archived cards of a student for one school year, oldest period first.
    /// With `before_period_id`, only periods numbered strictly below it.
    pub fn closed_report_cards(
        &self,
        student_id: &str,
        school_year_id: &str,
        before_period_id: Option<&str>,
    ) -> Result<Vec<ReportCard>, CalcError> {
        let before_number: Option<i64> = match before_period_id {
            Some(pid) => Some(self.period(pid)?.period_number),
            None => None,
        };
        let mut stmt = self.conn.prepare(
            "SELECT card_json
             FROM report_cards
             WHERE student_id = ?1
               AND school_year_id = ?2
               AND (?3 IS NULL OR period_number < ?3)
             ORDER BY period_number, period_id",
        )?;
        let raw = stmt
            .query_map((student_id, school_year_id, before_number), |r| {
                r.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        raw.iter()
            .map(|s| {
                serde_json::from_str::<ReportCard>(s)
                    .map_err(|e| CalcError::Store(format!("archived report card is malformed: {e}")))
            })
            .collect()
    }
}

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        name: r.get(1)?,
        code: r.get(2)?,
        category_name: r.get(3)?,
        default_coefficient: decimal_col(r, 4)?,
    })
}

fn period_from_row(r: &Row<'_>) -> rusqlite::Result<Period> {
    Ok(Period {
        id: r.get(0)?,
        school_year_id: r.get(1)?,
        name: r.get(2)?,
        period_number: r.get(3)?,
    })
}

impl ConfigurationProvider for SqliteStore<'_> {
    fn class_info(&self, class_id: &str) -> Result<ClassInfo, CalcError> {
        self.conn
            .query_row(
                "SELECT id, name FROM classes WHERE id = ?",
                [class_id],
                |r| {
                    Ok(ClassInfo {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| CalcError::not_found("class", class_id))
    }

    fn period(&self, period_id: &str) -> Result<Period, CalcError> {
        self.conn
            .query_row(
                "SELECT id, school_year_id, name, period_number FROM periods WHERE id = ?",
                [period_id],
                period_from_row,
            )
            .optional()?
            .ok_or_else(|| CalcError::not_found("period", period_id))
    }

    fn year_periods(&self, school_year_id: &str) -> Result<Vec<Period>, CalcError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, school_year_id, name, period_number
             FROM periods
             WHERE school_year_id = ?
             ORDER BY period_number",
        )?;
        let rows = stmt
            .query_map([school_year_id], period_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn subjects(&self, class_id: &str) -> Result<Vec<Subject>, CalcError> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.name, s.code, s.category_name, s.default_coefficient
             FROM subjects s
             JOIN class_subject_configs c ON c.subject_id = s.id
             WHERE c.class_id = ?
             ORDER BY s.id",
        )?;
        let rows = stmt
            .query_map([class_id], subject_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn class_subject_configs(&self, class_id: &str) -> Result<Vec<ClassSubjectConfig>, CalcError> {
        let mut stmt = self.conn.prepare(
            "SELECT class_id, subject_id, professor_name, coefficient, weekly_hours
             FROM class_subject_configs
             WHERE class_id = ?
             ORDER BY subject_id",
        )?;
        let rows = stmt
            .query_map([class_id], |r| {
                Ok(ClassSubjectConfig {
                    class_id: r.get(0)?,
                    subject_id: r.get(1)?,
                    professor_name: r.get(2)?,
                    coefficient: opt_decimal_col(r, 3)?,
                    weekly_hours: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn grade_scale(&self) -> Result<GradeScale, CalcError> {
        self.setting(db::GRADE_SCALE_KEY)
    }

    fn academic_settings(&self) -> Result<AcademicSettings, CalcError> {
        self.setting(db::ACADEMIC_KEY)
    }

    fn evaluation_type_weights(&self) -> Result<EvaluationTypeWeights, CalcError> {
        let mut stmt = self
            .conn
            .prepare("SELECT type, weight FROM evaluation_type_weights ORDER BY type")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, decimal_col(r, 1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut weights = EvaluationTypeWeights::default();
        for (label, weight) in rows {
            // Rows for types this build does not know are ignored; evaluations
            // of such types are rejected on their own.
            if let Some(kind) = EvaluationType::parse(&label) {
                weights.0.insert(kind, weight);
            }
        }
        Ok(weights)
    }
}

impl EvaluationStore for SqliteStore<'_> {
    fn roster(&self, class_id: &str) -> Result<Vec<Student>, CalcError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, class_id, last_name, first_name, matricule, active, sort_order
             FROM students
             WHERE class_id = ?
             ORDER BY sort_order, id",
        )?;
        let rows = stmt
            .query_map([class_id], |r| {
                let last_name: String = r.get(2)?;
                let first_name: String = r.get(3)?;
                let active: i64 = r.get(5)?;
                Ok(Student {
                    id: r.get(0)?,
                    class_id: r.get(1)?,
                    display_name: display_name(&last_name, &first_name),
                    matricule: r.get(4)?,
                    active: active != 0,
                    sort_order: r.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn evaluations(&self, class_id: &str, period_id: &str) -> Result<Vec<GradeEvaluation>, CalcError> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id, e.student_id, e.subject_id, e.class_id, e.period_id,
                    e.type, e.value, e.base, e.title
             FROM evaluations e
             WHERE e.class_id = ?1
               AND e.period_id = ?2
               AND e.revision = (SELECT MAX(r.revision) FROM evaluations r WHERE r.id = e.id)
             ORDER BY e.id",
        )?;
        let rows = stmt
            .query_map((class_id, period_id), |r| {
                Ok((
                    r.get::<_, String>(5)?,
                    GradeEvaluation {
                        id: r.get(0)?,
                        student_id: r.get(1)?,
                        subject_id: r.get(2)?,
                        class_id: r.get(3)?,
                        period_id: r.get(4)?,
                        kind: EvaluationType::Devoir,
                        value: decimal_col(r, 6)?,
                        base: decimal_col(r, 7)?,
                        title: r.get(8)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(label, mut e)| match EvaluationType::parse(&label) {
                Some(kind) => {
                    e.kind = kind;
                    Ok(e)
                }
                None => Err(IntegrityError::UnmappedEvaluationType {
                    evaluation_id: e.id,
                    kind: label,
                }
                .into()),
            })
            .collect()
    }

    fn conduct(&self, class_id: &str, period_id: &str) -> Result<Vec<StudentConduct>, CalcError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.student_id, c.period_id, c.absences_justified, c.absences_unjustified,
                    c.lates, c.attendance_rate, c.conduct, c.decision_override
             FROM student_conduct c
             JOIN students s ON s.id = c.student_id
             WHERE s.class_id = ?1 AND c.period_id = ?2
             ORDER BY c.student_id",
        )?;
        let rows = stmt
            .query_map((class_id, period_id), |r| {
                let decision_override: Option<String> = r.get(7)?;
                Ok(StudentConduct {
                    student_id: r.get(0)?,
                    period_id: r.get(1)?,
                    absences_justified: r.get(2)?,
                    absences_unjustified: r.get(3)?,
                    lates: r.get(4)?,
                    attendance_rate: opt_decimal_col(r, 5)?,
                    conduct: r.get(6)?,
                    decision_override: decision_override.as_deref().and_then(Decision::parse),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn prior_report_cards(
        &self,
        student_id: &str,
        school_year_id: &str,
        before_period_id: &str,
    ) -> Result<Vec<ReportCard>, CalcError> {
        self.closed_report_cards(student_id, school_year_id, Some(before_period_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn.execute("INSERT INTO classes(id, name) VALUES('c1', '6e A')", [])
            .expect("class");
        conn.execute(
            "INSERT INTO students(id, class_id, last_name, first_name, matricule, active, sort_order)
             VALUES('s1', 'c1', 'Diallo', 'Awa', 'M-01', 1, 0),
                   ('s2', 'c1', 'Kone', 'Ibrahim', NULL, 0, 1)",
            [],
        )
        .expect("students");
        conn.execute("INSERT INTO school_years(id, name) VALUES('y1', '2025-2026')", [])
            .expect("year");
        conn.execute(
            "INSERT INTO periods(id, school_year_id, name, period_number)
             VALUES('p2', 'y1', 'Trimestre 2', 2), ('p1', 'y1', 'Trimestre 1', 1)",
            [],
        )
        .expect("periods");
        conn.execute(
            "INSERT INTO subjects(id, name, code, category_name, default_coefficient)
             VALUES('math', 'Mathematiques', 'MATH', 'Sciences', '4')",
            [],
        )
        .expect("subject");
        conn.execute(
            "INSERT INTO class_subject_configs(class_id, subject_id, professor_name, coefficient, weekly_hours)
             VALUES('c1', 'math', 'M. Traore', NULL, 5)",
            [],
        )
        .expect("config");
        conn
    }

    fn insert_eval(conn: &Connection, id: &str, revision: i64, value: &str, kind: &str) {
        conn.execute(
            "INSERT INTO evaluations(id, revision, student_id, subject_id, class_id, period_id,
                                     type, value, base, title, recorded_at)
             VALUES(?, ?, 's1', 'math', 'c1', 'p1', ?, ?, '20', NULL, '2025-11-01T00:00:00Z')",
            (id, revision, kind, value),
        )
        .expect("evaluation");
    }

    #[test]
    fn evaluations_return_latest_revision_only() {
        let conn = seeded();
        insert_eval(&conn, "e1", 1, "12", "Devoir");
        insert_eval(&conn, "e1", 2, "14.5", "Devoir");
        insert_eval(&conn, "e2", 1, "9", "Composition");
        let store = SqliteStore::new(&conn);
        let evals = store.evaluations("c1", "p1").expect("evaluations");
        assert_eq!(evals.len(), 2);
        assert_eq!(evals[0].id, "e1");
        assert_eq!(evals[0].value, dec!(14.5));
        assert_eq!(evals[1].kind, EvaluationType::Composition);
    }

    #[test]
    fn unknown_stored_type_is_an_integrity_error() {
        let conn = seeded();
        insert_eval(&conn, "e1", 1, "12", "Interro");
        let store = SqliteStore::new(&conn);
        let e = store.evaluations("c1", "p1").expect_err("must fail");
        assert_eq!(e.code(), "data_integrity");
    }

    #[test]
    fn roster_includes_inactive_with_display_names() {
        let conn = seeded();
        let roster = SqliteStore::new(&conn).roster("c1").expect("roster");
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].display_name, "Diallo Awa");
        assert_eq!(roster[0].matricule.as_deref(), Some("M-01"));
        assert!(!roster[1].active);
    }

    #[test]
    fn config_reads_defaults_and_class_subjects() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        assert_eq!(store.grade_scale().expect("scale"), GradeScale::default());
        assert_eq!(
            store.evaluation_type_weights().expect("weights"),
            EvaluationTypeWeights::defaults()
        );
        let configs = store.class_subject_configs("c1").expect("configs");
        assert_eq!(configs[0].coefficient, None);
        assert_eq!(configs[0].weekly_hours, 5);
        let periods = store.year_periods("y1").expect("periods");
        assert_eq!(periods[0].id, "p1");
        assert!(matches!(
            store.class_info("nope"),
            Err(CalcError::NotFound { .. })
        ));
    }

    #[test]
    fn bad_decimal_text_surfaces_as_store_error() {
        let conn = seeded();
        insert_eval(&conn, "e1", 1, "twelve", "Devoir");
        let e = SqliteStore::new(&conn)
            .evaluations("c1", "p1")
            .expect_err("must fail");
        assert_eq!(e.code(), "db_query_failed");
    }
}
