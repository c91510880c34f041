use rust_decimal::Decimal;

use super::error::IntegrityError;
use super::model::{ClassSubjectConfig, Subject};
use super::round_half_up;

/// Class override if one is set, else the subject default. Negative values
/// are rejected from either source.
pub fn effective_coefficient(
    subject: &Subject,
    config: Option<&ClassSubjectConfig>,
) -> Result<Decimal, IntegrityError> {
    let coefficient = config
        .and_then(|c| c.coefficient)
        .unwrap_or(subject.default_coefficient);
    if coefficient < Decimal::ZERO {
        return Err(IntegrityError::NegativeCoefficient {
            subject_id: subject.id.clone(),
            coefficient,
        });
    }
    Ok(coefficient)
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedSubject {
    pub subject_id: String,
    pub average: Option<Decimal>,
    pub coefficient: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentAggregate {
    pub general_average: Option<Decimal>,
    pub total_coefficient: Decimal,
    pub total_points: Decimal,
}

/// Coefficient-weighted mean of the subjects that have an average.
/// Subjects without one stay out of the denominator.
/// Overflow of the weighted sum is reported against the subject that
/// caused it.
pub fn general_average(
    student_id: &str,
    subjects: &[WeightedSubject],
    precision: u32,
) -> Result<StudentAggregate, IntegrityError> {
    let overflow = |s: &WeightedSubject| IntegrityError::CoefficientOverflow {
        student_id: student_id.to_string(),
        subject_id: s.subject_id.clone(),
    };

    let mut total_points = Decimal::ZERO;
    let mut total_coefficient = Decimal::ZERO;
    let mut last_counted = None;
    for s in subjects {
        let Some(avg) = s.average else {
            continue;
        };
        total_points = avg
            .checked_mul(s.coefficient)
            .and_then(|points| total_points.checked_add(points))
            .ok_or_else(|| overflow(s))?;
        total_coefficient = total_coefficient
            .checked_add(s.coefficient)
            .ok_or_else(|| overflow(s))?;
        last_counted = Some(s);
    }

    let general_average = match last_counted {
        Some(last) if total_coefficient > Decimal::ZERO => {
            let mean = total_points
                .checked_div(total_coefficient)
                .ok_or_else(|| overflow(last))?;
            Some(round_half_up(mean, precision))
        }
        _ => None,
    };

    Ok(StudentAggregate {
        general_average,
        total_coefficient,
        total_points,
    })
}
