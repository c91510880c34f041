use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

/// A record that should never have reached the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrityError {
    #[error("evaluation {evaluation_id} has non-positive base {base}")]
    NonPositiveBase {
        evaluation_id: String,
        student_id: String,
        subject_id: String,
        base: Decimal,
    },
    #[error("evaluation {evaluation_id} has value {value} outside [0, {base}]")]
    ValueOutOfRange {
        evaluation_id: String,
        student_id: String,
        subject_id: String,
        value: Decimal,
        base: Decimal,
    },
    #[error("evaluation {evaluation_id} has type {kind} with no configured weight")]
    UnmappedEvaluationType { evaluation_id: String, kind: String },
    #[error("subject {subject_id} has negative coefficient {coefficient}")]
    NegativeCoefficient {
        subject_id: String,
        coefficient: Decimal,
    },
    #[error("evaluation {evaluation_id} references subject {subject_id} which is not taught in class {class_id}")]
    UnknownSubject {
        evaluation_id: String,
        subject_id: String,
        class_id: String,
    },
    #[error("evaluation {evaluation_id} overflows decimal arithmetic when normalised and weighted")]
    MarkOverflow {
        evaluation_id: String,
        student_id: String,
        subject_id: String,
    },
    #[error("student {student_id} overflows decimal arithmetic when weighting subject {subject_id} by its coefficient")]
    CoefficientOverflow {
        student_id: String,
        subject_id: String,
    },
    #[error("evaluation {evaluation_id} references student {student_id} who is not on the roster of class {class_id}")]
    UnknownStudent {
        evaluation_id: String,
        student_id: String,
        class_id: String,
    },
}

impl IntegrityError {
    pub fn details(&self) -> serde_json::Value {
        match self {
            IntegrityError::NonPositiveBase {
                evaluation_id,
                student_id,
                subject_id,
                base,
            } => json!({
                "evaluationId": evaluation_id,
                "studentId": student_id,
                "subjectId": subject_id,
                "base": base,
            }),
            IntegrityError::ValueOutOfRange {
                evaluation_id,
                student_id,
                subject_id,
                value,
                base,
            } => json!({
                "evaluationId": evaluation_id,
                "studentId": student_id,
                "subjectId": subject_id,
                "value": value,
                "base": base,
            }),
            IntegrityError::UnmappedEvaluationType {
                evaluation_id,
                kind,
            } => json!({ "evaluationId": evaluation_id, "type": kind }),
            IntegrityError::NegativeCoefficient {
                subject_id,
                coefficient,
            } => json!({ "subjectId": subject_id, "coefficient": coefficient }),
            IntegrityError::UnknownSubject {
                evaluation_id,
                subject_id,
                class_id,
            } => json!({
                "evaluationId": evaluation_id,
                "subjectId": subject_id,
                "classId": class_id,
            }),
            IntegrityError::MarkOverflow {
                evaluation_id,
                student_id,
                subject_id,
            } => json!({
                "evaluationId": evaluation_id,
                "studentId": student_id,
                "subjectId": subject_id,
            }),
            IntegrityError::CoefficientOverflow {
                student_id,
                subject_id,
            } => json!({ "studentId": student_id, "subjectId": subject_id }),
            IntegrityError::UnknownStudent {
                evaluation_id,
                student_id,
                class_id,
            } => json!({
                "evaluationId": evaluation_id,
                "studentId": student_id,
                "classId": class_id,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("grade scale has no passing grade")]
    MissingPassingGrade,
    #[error("grade scale range [{min}, {max}] is empty")]
    InvalidScale { min: Decimal, max: Decimal },
    #[error("passing grade {passing} is outside the scale [{min}, {max}]")]
    PassingGradeOutOfRange {
        passing: Decimal,
        min: Decimal,
        max: Decimal,
    },
    #[error("decimal precision {0} is larger than 10")]
    PrecisionTooLarge(u32),
    #[error("no grade levels are configured")]
    NoGradeLevels,
    #[error("grade level {name} has an empty interval [{min}, {max})")]
    EmptyGradeLevel {
        name: String,
        min: Decimal,
        max: Decimal,
    },
    #[error("grade levels leave a gap between {from} and {to}")]
    GradeLevelGap { from: Decimal, to: Decimal },
    #[error("grade levels {first} and {second} overlap")]
    GradeLevelOverlap { first: String, second: String },
    #[error("no grade level contains {0}")]
    NoGradeLevelFor(Decimal),
    #[error("evaluation type {kind} has negative weight {weight}")]
    NegativeTypeWeight { kind: String, weight: Decimal },
    #[error("trend epsilon {0} is negative")]
    NegativeTrendEpsilon(Decimal),
}

impl ConfigError {
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ConfigError::GradeLevelGap { from, to } => Some(json!({ "from": from, "to": to })),
            ConfigError::GradeLevelOverlap { first, second } => {
                Some(json!({ "first": first, "second": second }))
            }
            ConfigError::NoGradeLevelFor(v) => Some(json!({ "value": v })),
            ConfigError::NegativeTypeWeight { kind, weight } => {
                Some(json!({ "type": kind, "weight": weight }))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CalcError {
    #[error("data integrity: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error("store query failed: {0}")]
    Store(String),
}

impl CalcError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        CalcError::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CalcError::Integrity(_) => "data_integrity",
            CalcError::Config(_) => "config_error",
            CalcError::NotFound { .. } => "not_found",
            CalcError::Store(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CalcError::Integrity(e) => Some(e.details()),
            CalcError::Config(e) => e.details(),
            CalcError::NotFound { what, id } => Some(json!({ "what": what, "id": id })),
            CalcError::Store(_) => None,
        }
    }
}

impl From<rusqlite::Error> for CalcError {
    fn from(e: rusqlite::Error) -> Self {
        CalcError::Store(e.to_string())
    }
}
