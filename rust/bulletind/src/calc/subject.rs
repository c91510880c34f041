use rust_decimal::Decimal;

use super::error::{CalcError, IntegrityError};
use super::model::{
    EvaluationSummary, EvaluationTypeWeights, GradeEvaluation, GradeScale, SubjectAverage,
};
use super::round_half_up;

/// Rejects rows that violate `base > 0` and `0 <= value <= base`.
pub fn validate_evaluation(e: &GradeEvaluation) -> Result<(), IntegrityError> {
    if e.base <= Decimal::ZERO {
        return Err(IntegrityError::NonPositiveBase {
            evaluation_id: e.id.clone(),
            student_id: e.student_id.clone(),
            subject_id: e.subject_id.clone(),
            base: e.base,
        });
    }
    if e.value < Decimal::ZERO || e.value > e.base {
        return Err(IntegrityError::ValueOutOfRange {
            evaluation_id: e.id.clone(),
            student_id: e.student_id.clone(),
            subject_id: e.subject_id.clone(),
            value: e.value,
            base: e.base,
        });
    }
    Ok(())
}

fn type_weight(e: &GradeEvaluation, weights: &EvaluationTypeWeights) -> Result<Decimal, IntegrityError> {
    weights
        .get(e.kind)
        .ok_or_else(|| IntegrityError::UnmappedEvaluationType {
            evaluation_id: e.id.clone(),
            kind: e.kind.label().to_string(),
        })
}

fn mark_overflow(e: &GradeEvaluation) -> IntegrityError {
    IntegrityError::MarkOverflow {
        evaluation_id: e.id.clone(),
        student_id: e.student_id.clone(),
        subject_id: e.subject_id.clone(),
    }
}

/// Mark expressed on the scale maximum (20 on the default scale). Unrounded.
pub fn normalized_mark(e: &GradeEvaluation, max_grade: Decimal) -> Result<Decimal, IntegrityError> {
    e.value
        .checked_mul(max_grade)
        .and_then(|scaled| scaled.checked_div(e.base))
        .ok_or_else(|| mark_overflow(e))
}

fn sorted_by_id<'a>(evaluations: &[&'a GradeEvaluation]) -> Vec<&'a GradeEvaluation> {
    let mut sorted = evaluations.to_vec();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    sorted
}

/// Weighted mean of one student's evaluations in one subject.
///
/// Every mark is normalised to the scale maximum and multiplied by its type
/// weight; the sum is divided by the sum of weights used. Rounding happens
/// once, on the final value. No evaluations (or only zero-weight ones) leaves
/// the average undefined.
pub fn subject_average(
    student_id: &str,
    subject_id: &str,
    period_id: &str,
    evaluations: &[&GradeEvaluation],
    weights: &EvaluationTypeWeights,
    scale: &GradeScale,
) -> Result<SubjectAverage, CalcError> {
    let mut weighted_sum = Decimal::ZERO;
    let mut weight_total = Decimal::ZERO;

    let sorted = sorted_by_id(evaluations);
    for &e in &sorted {
        validate_evaluation(e)?;
        let w = type_weight(e, weights)?;
        let mark = normalized_mark(e, scale.max_grade)?;
        weighted_sum = mark
            .checked_mul(w)
            .and_then(|points| weighted_sum.checked_add(points))
            .ok_or_else(|| mark_overflow(e))?;
        weight_total = weight_total.checked_add(w).ok_or_else(|| mark_overflow(e))?;
    }

    let average = if weight_total > Decimal::ZERO {
        let mean = weighted_sum
            .checked_div(weight_total)
            .ok_or_else(|| IntegrityError::MarkOverflow {
                evaluation_id: sorted.last().map(|e| e.id.clone()).unwrap_or_default(),
                student_id: student_id.to_string(),
                subject_id: subject_id.to_string(),
            })?;
        Some(round_half_up(mean, scale.decimal_precision))
    } else {
        None
    };

    Ok(SubjectAverage {
        student_id: student_id.to_string(),
        subject_id: subject_id.to_string(),
        period_id: period_id.to_string(),
        average,
        evaluation_count: evaluations.len(),
    })
}

pub fn evaluation_summaries(
    evaluations: &[&GradeEvaluation],
    weights: &EvaluationTypeWeights,
    scale: &GradeScale,
) -> Result<Vec<EvaluationSummary>, CalcError> {
    sorted_by_id(evaluations)
        .into_iter()
        .map(|e| {
            validate_evaluation(e)?;
            Ok(EvaluationSummary {
                type_name: e.kind.label().to_string(),
                mark: round_half_up(normalized_mark(e, scale.max_grade)?, scale.decimal_precision),
                weight: type_weight(e, weights)?,
            })
        })
        .collect()
}
