use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EvaluationType {
    Devoir,
    Composition,
}

impl EvaluationType {
    pub fn label(self) -> &'static str {
        match self {
            EvaluationType::Devoir => "Devoir",
            EvaluationType::Composition => "Composition",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devoir" => Some(EvaluationType::Devoir),
            "composition" => Some(EvaluationType::Composition),
            _ => None,
        }
    }
}

impl fmt::Display for EvaluationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One recorded mark. `value` is on the evaluation's own `base`, not on the
/// grade scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEvaluation {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub class_id: String,
    pub period_id: String,
    #[serde(rename = "type")]
    pub kind: EvaluationType,
    pub value: Decimal,
    pub base: Decimal,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTypeWeights(pub BTreeMap<EvaluationType, Decimal>);

impl EvaluationTypeWeights {
    pub fn get(&self, kind: EvaluationType) -> Option<Decimal> {
        self.0.get(&kind).copied()
    }

    pub fn defaults() -> Self {
        let mut map = BTreeMap::new();
        map.insert(EvaluationType::Devoir, dec!(1));
        map.insert(EvaluationType::Composition, dec!(2));
        Self(map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub category_name: Option<String>,
    pub default_coefficient: Decimal,
}

/// Per-class overrides. A `None` coefficient means the subject default applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSubjectConfig {
    pub class_id: String,
    pub subject_id: String,
    #[serde(default)]
    pub professor_name: Option<String>,
    #[serde(default)]
    pub coefficient: Option<Decimal>,
    pub weekly_hours: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeLevel {
    pub name: String,
    pub min_value: Decimal,
    pub max_value: Decimal,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeScale {
    pub min_grade: Decimal,
    pub max_grade: Decimal,
    #[serde(default)]
    pub passing_grade: Option<Decimal>,
    #[serde(default = "default_precision")]
    pub decimal_precision: u32,
    #[serde(default)]
    pub grade_levels: Vec<GradeLevel>,
}

fn default_precision() -> u32 {
    2
}

impl Default for GradeScale {
    fn default() -> Self {
        let band = |name: &str, min: Decimal, max: Decimal| GradeLevel {
            name: name.to_string(),
            min_value: min,
            max_value: max,
            description: String::new(),
        };
        Self {
            min_grade: dec!(0),
            max_grade: dec!(20),
            passing_grade: Some(dec!(10)),
            decimal_precision: 2,
            grade_levels: vec![
                band("Insuffisant", dec!(0), dec!(10)),
                band("Passable", dec!(10), dec!(12)),
                band("Assez Bien", dec!(12), dec!(14)),
                band("Bien", dec!(14), dec!(16)),
                band("Très Bien", dec!(16), dec!(18)),
                band("Excellent", dec!(18), dec!(20)),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HonorRoll {
    pub honneur: Decimal,
    pub encouragement: Decimal,
    pub felicitations: Decimal,
}

impl Default for HonorRoll {
    fn default() -> Self {
        Self {
            honneur: dec!(12),
            encouragement: dec!(14),
            felicitations: dec!(16),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcademicSettings {
    pub auto_promote_students: bool,
    /// Minimum attendance rate (percent) for an unconditional pass.
    pub attendance_required: Option<Decimal>,
    pub trend_epsilon: Decimal,
    pub honor_roll: HonorRoll,
    pub show_rank_on_report_card: bool,
    pub show_class_average_on_report_card: bool,
}

impl Default for AcademicSettings {
    fn default() -> Self {
        Self {
            auto_promote_students: false,
            attendance_required: Some(dec!(75)),
            trend_epsilon: dec!(0.05),
            honor_roll: HonorRoll::default(),
            show_rank_on_report_card: true,
            show_class_average_on_report_card: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub id: String,
    pub school_year_id: String,
    pub name: String,
    pub period_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub display_name: String,
    pub matricule: Option<String>,
    pub active: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: String,
    pub name: String,
}

/// Attendance and behaviour inputs for one student in one period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentConduct {
    pub student_id: String,
    pub period_id: String,
    pub absences_justified: i64,
    pub absences_unjustified: i64,
    pub lates: i64,
    pub attendance_rate: Option<Decimal>,
    pub conduct: Option<String>,
    pub decision_override: Option<Decision>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub student_id: String,
    pub subject_id: String,
    pub period_id: String,
    pub average: Option<Decimal>,
    pub evaluation_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSummary {
    pub type_name: String,
    pub mark: Decimal,
    pub weight: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Admis,
    Conditionnel,
    Redouble,
}

impl Decision {
    pub fn label(self) -> &'static str {
        match self {
            Decision::Admis => "Admis",
            Decision::Conditionnel => "Conditionnel",
            Decision::Redouble => "Redouble",
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Decision::Admis => "Passe en classe supérieure (Admis)",
            Decision::Conditionnel => "Admis sous condition (Conditionnel)",
            Decision::Redouble => "Redouble",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admis" => Some(Decision::Admis),
            "conditionnel" => Some(Decision::Conditionnel),
            "redouble" => Some(Decision::Redouble),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardSubject {
    pub subject_id: String,
    pub name: String,
    pub category: String,
    pub professor: String,
    pub evaluations: Vec<EvaluationSummary>,
    pub average: Option<Decimal>,
    pub coefficient: Decimal,
    pub total: Option<Decimal>,
    pub total_coefficient: Decimal,
    pub class_average: Option<Decimal>,
    pub min_average: Option<Decimal>,
    pub max_average: Option<Decimal>,
    pub rank: Option<u32>,
    pub appreciation: Option<String>,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayFlags {
    pub show_rank: bool,
    pub show_class_average: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub matricule: Option<String>,
    pub class_id: String,
    pub class_name: String,
    pub period_id: String,
    pub period_name: String,
    pub period_number: i64,
    pub school_year_id: String,
    pub status: CardStatus,
    pub subjects: Vec<ReportCardSubject>,
    pub general_average: Option<Decimal>,
    pub total_coefficient: Decimal,
    pub annual_average: Option<Decimal>,
    pub rank: Option<u32>,
    pub total_students: u32,
    pub class_average: Option<Decimal>,
    pub min_average: Option<Decimal>,
    pub max_average: Option<Decimal>,
    pub appreciation_generale: Option<String>,
    pub decision: Option<Decision>,
    pub decision_text: Option<String>,
    pub trend: Trend,
    pub history_averages: Vec<Option<Decimal>>,
    pub tableau_honneur: bool,
    pub tableau_encouragement: bool,
    pub tableau_felicitations: bool,
    pub abs_justifiees: i64,
    pub abs_injustifiees: i64,
    pub retards: i64,
    pub conduite: String,
    pub display: DisplayFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub student_id: String,
    pub display_name: String,
    pub average: Option<Decimal>,
    pub rank: Option<u32>,
}
