use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

use super::decision::{validate_scale, validate_settings, validate_weights};
use super::error::{CalcError, IntegrityError};
use super::model::{
    AcademicSettings, ClassInfo, ClassSubjectConfig, EvaluationTypeWeights, GradeEvaluation,
    GradeScale, Period, ReportCard, Student, StudentConduct, Subject,
};
use super::student::effective_coefficient;
use super::subject::validate_evaluation;
use super::trend::PriorPeriod;

/// Read-only configuration source. Implementations may cache; the engine
/// queries each method at most once per batch.
pub trait ConfigurationProvider {
    fn class_info(&self, class_id: &str) -> Result<ClassInfo, CalcError>;
    fn period(&self, period_id: &str) -> Result<Period, CalcError>;
    fn year_periods(&self, school_year_id: &str) -> Result<Vec<Period>, CalcError>;
    fn subjects(&self, class_id: &str) -> Result<Vec<Subject>, CalcError>;
    fn class_subject_configs(&self, class_id: &str) -> Result<Vec<ClassSubjectConfig>, CalcError>;
    fn grade_scale(&self) -> Result<GradeScale, CalcError>;
    fn academic_settings(&self) -> Result<AcademicSettings, CalcError>;
    fn evaluation_type_weights(&self) -> Result<EvaluationTypeWeights, CalcError>;
}

pub trait EvaluationStore {
    fn roster(&self, class_id: &str) -> Result<Vec<Student>, CalcError>;
    fn evaluations(&self, class_id: &str, period_id: &str) -> Result<Vec<GradeEvaluation>, CalcError>;
    fn conduct(&self, class_id: &str, period_id: &str) -> Result<Vec<StudentConduct>, CalcError>;
    fn prior_report_cards(
        &self,
        student_id: &str,
        school_year_id: &str,
        before_period_id: &str,
    ) -> Result<Vec<ReportCard>, CalcError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassSubject {
    pub subject: Subject,
    pub coefficient: Decimal,
    pub professor: String,
}

/// Everything one batch run reads, resolved and sorted up front.
#[derive(Debug, Clone)]
pub struct ClassSnapshot {
    pub class: ClassInfo,
    pub period: Period,
    pub year_periods: Vec<Period>,
    /// Active students, ordered by (sort order, id).
    pub students: Vec<Student>,
    /// Ordered by subject id.
    pub subjects: Vec<ClassSubject>,
    /// Keyed by (student id, subject id); each list ordered by evaluation id.
    pub evaluations: BTreeMap<(String, String), Vec<GradeEvaluation>>,
    pub weights: EvaluationTypeWeights,
    pub scale: GradeScale,
    pub settings: AcademicSettings,
    pub conduct: BTreeMap<String, StudentConduct>,
    pub priors: BTreeMap<String, Vec<PriorPeriod>>,
}

impl ClassSnapshot {
    /// Queries both providers once and validates configuration before
    /// anything is computed. Evaluations of inactive students are dropped;
    /// evaluations pointing outside the class are integrity errors.
    pub fn load<C, S>(
        config: &C,
        store: &S,
        class_id: &str,
        period_id: &str,
    ) -> Result<Self, CalcError>
    where
        C: ConfigurationProvider + ?Sized,
        S: EvaluationStore + ?Sized,
    {
        let scale = config.grade_scale()?;
        validate_scale(&scale)?;
        let settings = config.academic_settings()?;
        validate_settings(&settings)?;
        let weights = config.evaluation_type_weights()?;
        validate_weights(&weights)?;

        let class = config.class_info(class_id)?;
        let period = config.period(period_id)?;
        let mut year_periods = config.year_periods(&period.school_year_id)?;
        year_periods.sort_by(|a, b| {
            a.period_number
                .cmp(&b.period_number)
                .then_with(|| a.id.cmp(&b.id))
        });

        let configs: BTreeMap<String, ClassSubjectConfig> = config
            .class_subject_configs(class_id)?
            .into_iter()
            .map(|c| (c.subject_id.clone(), c))
            .collect();
        let mut subjects = config
            .subjects(class_id)?
            .into_iter()
            .map(|subject| {
                let cfg = configs.get(&subject.id);
                let coefficient = effective_coefficient(&subject, cfg)?;
                Ok(ClassSubject {
                    professor: cfg
                        .and_then(|c| c.professor_name.clone())
                        .unwrap_or_default(),
                    coefficient,
                    subject,
                })
            })
            .collect::<Result<Vec<_>, CalcError>>()?;
        subjects.sort_by(|a, b| a.subject.id.cmp(&b.subject.id));

        let roster = store.roster(class_id)?;
        let all_ids: BTreeSet<String> = roster.iter().map(|s| s.id.clone()).collect();
        let mut students: Vec<Student> = roster.into_iter().filter(|s| s.active).collect();
        students.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));
        let active_ids: BTreeSet<&str> = students.iter().map(|s| s.id.as_str()).collect();
        let subject_ids: BTreeSet<&str> = subjects.iter().map(|s| s.subject.id.as_str()).collect();

        let mut evaluations: BTreeMap<(String, String), Vec<GradeEvaluation>> = BTreeMap::new();
        for e in store.evaluations(class_id, period_id)? {
            validate_evaluation(&e)?;
            if !all_ids.contains(&e.student_id) {
                return Err(IntegrityError::UnknownStudent {
                    evaluation_id: e.id,
                    student_id: e.student_id,
                    class_id: class_id.to_string(),
                }
                .into());
            }
            if !subject_ids.contains(e.subject_id.as_str()) {
                return Err(IntegrityError::UnknownSubject {
                    evaluation_id: e.id,
                    subject_id: e.subject_id,
                    class_id: class_id.to_string(),
                }
                .into());
            }
            if weights.get(e.kind).is_none() {
                return Err(IntegrityError::UnmappedEvaluationType {
                    evaluation_id: e.id,
                    kind: e.kind.label().to_string(),
                }
                .into());
            }
            if !active_ids.contains(e.student_id.as_str()) {
                continue;
            }
            evaluations
                .entry((e.student_id.clone(), e.subject_id.clone()))
                .or_default()
                .push(e);
        }
        for list in evaluations.values_mut() {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }

        let conduct: BTreeMap<String, StudentConduct> = store
            .conduct(class_id, period_id)?
            .into_iter()
            .map(|c| (c.student_id.clone(), c))
            .collect();

        let mut priors = BTreeMap::new();
        for s in &students {
            let cards = store.prior_report_cards(&s.id, &period.school_year_id, &period.id)?;
            priors.insert(
                s.id.clone(),
                cards.iter().map(PriorPeriod::from).collect::<Vec<_>>(),
            );
        }

        Ok(Self {
            class,
            period,
            year_periods,
            students,
            subjects,
            evaluations,
            weights,
            scale,
            settings,
            conduct,
            priors,
        })
    }

    pub fn evaluations_for(&self, student_id: &str, subject_id: &str) -> Vec<&GradeEvaluation> {
        self.evaluations
            .get(&(student_id.to_string(), subject_id.to_string()))
            .map(|list| list.iter().collect())
            .unwrap_or_default()
    }

    pub fn is_final_period(&self) -> bool {
        self.year_periods
            .iter()
            .map(|p| p.period_number)
            .max()
            .map(|last| last == self.period.period_number)
            .unwrap_or(true)
    }

    pub fn subject(&self, subject_id: &str) -> Option<&ClassSubject> {
        self.subjects.iter().find(|s| s.subject.id == subject_id)
    }
}
