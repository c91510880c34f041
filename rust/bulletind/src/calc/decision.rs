use rust_decimal::Decimal;

use super::error::ConfigError;
use super::model::{
    AcademicSettings, Decision, EvaluationTypeWeights, GradeLevel, GradeScale, StudentConduct,
};

/// Static checks run before any computation starts.
pub fn validate_scale(scale: &GradeScale) -> Result<(), ConfigError> {
    if scale.min_grade >= scale.max_grade {
        return Err(ConfigError::InvalidScale {
            min: scale.min_grade,
            max: scale.max_grade,
        });
    }
    let Some(passing) = scale.passing_grade else {
        return Err(ConfigError::MissingPassingGrade);
    };
    if passing < scale.min_grade || passing > scale.max_grade {
        return Err(ConfigError::PassingGradeOutOfRange {
            passing,
            min: scale.min_grade,
            max: scale.max_grade,
        });
    }
    if scale.decimal_precision > 10 {
        return Err(ConfigError::PrecisionTooLarge(scale.decimal_precision));
    }
    validate_grade_levels(scale)
}

fn validate_grade_levels(scale: &GradeScale) -> Result<(), ConfigError> {
    if scale.grade_levels.is_empty() {
        return Err(ConfigError::NoGradeLevels);
    }
    for level in &scale.grade_levels {
        if level.min_value >= level.max_value {
            return Err(ConfigError::EmptyGradeLevel {
                name: level.name.clone(),
                min: level.min_value,
                max: level.max_value,
            });
        }
    }

    let mut levels: Vec<&GradeLevel> = scale.grade_levels.iter().collect();
    levels.sort_by(|a, b| {
        a.min_value
            .cmp(&b.min_value)
            .then_with(|| a.name.cmp(&b.name))
    });

    // Marks are normalised onto [0, max_grade], so the bands have to start at
    // zero even when the scale's nominal minimum is higher.
    let floor = Decimal::ZERO.min(scale.min_grade);
    let first = levels[0];
    if first.min_value > floor {
        return Err(ConfigError::GradeLevelGap {
            from: floor,
            to: first.min_value,
        });
    }
    for pair in levels.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if next.min_value > prev.max_value {
            return Err(ConfigError::GradeLevelGap {
                from: prev.max_value,
                to: next.min_value,
            });
        }
        if next.min_value < prev.max_value {
            return Err(ConfigError::GradeLevelOverlap {
                first: prev.name.clone(),
                second: next.name.clone(),
            });
        }
    }
    let last = levels[levels.len() - 1];
    if last.max_value < scale.max_grade {
        return Err(ConfigError::GradeLevelGap {
            from: last.max_value,
            to: scale.max_grade,
        });
    }
    Ok(())
}

pub fn validate_weights(weights: &EvaluationTypeWeights) -> Result<(), ConfigError> {
    for (kind, weight) in &weights.0 {
        if *weight < Decimal::ZERO {
            return Err(ConfigError::NegativeTypeWeight {
                kind: kind.label().to_string(),
                weight: *weight,
            });
        }
    }
    Ok(())
}

pub fn validate_settings(settings: &AcademicSettings) -> Result<(), ConfigError> {
    if settings.trend_epsilon < Decimal::ZERO {
        return Err(ConfigError::NegativeTrendEpsilon(settings.trend_epsilon));
    }
    Ok(())
}

fn band_contains(level: &GradeLevel, value: Decimal, max_grade: Decimal) -> bool {
    (level.min_value <= value && value < level.max_value)
        || (value == max_grade && level.max_value == max_grade)
}

/// The band whose `[min, max)` interval holds `value`. The top of the scale
/// belongs to the band that ends on it.
pub fn grade_level(scale: &GradeScale, value: Decimal) -> Result<&GradeLevel, ConfigError> {
    let mut matches = scale
        .grade_levels
        .iter()
        .filter(|l| band_contains(l, value, scale.max_grade));
    let Some(first) = matches.next() else {
        return Err(ConfigError::NoGradeLevelFor(value));
    };
    if let Some(second) = matches.next() {
        return Err(ConfigError::GradeLevelOverlap {
            first: first.name.clone(),
            second: second.name.clone(),
        });
    }
    Ok(first)
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub general_average: Option<Decimal>,
    pub annual_average: Option<Decimal>,
    pub is_final_period: bool,
    pub conduct: Option<&'a StudentConduct>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HonorFlags {
    pub honneur: bool,
    pub encouragement: bool,
    pub felicitations: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub decision: Option<Decision>,
    pub appreciation: Option<String>,
    pub honor: HonorFlags,
}

fn honor_flags(average: Option<Decimal>, settings: &AcademicSettings) -> HonorFlags {
    let Some(avg) = average else {
        return HonorFlags::default();
    };
    let roll = &settings.honor_roll;
    HonorFlags {
        honneur: avg >= roll.honneur && avg < roll.encouragement,
        encouragement: avg >= roll.encouragement && avg < roll.felicitations,
        felicitations: avg >= roll.felicitations,
    }
}

fn below_attendance(conduct: Option<&StudentConduct>, settings: &AcademicSettings) -> bool {
    match (
        conduct.and_then(|c| c.attendance_rate),
        settings.attendance_required,
    ) {
        (Some(rate), Some(required)) => rate < required,
        _ => false,
    }
}

/// Pass/fail decision, appreciation band and honor rolls for one student.
///
/// On the year's final period with `autoPromoteStudents` on, the annual
/// average decides (falling back to the period average when there is no
/// history). An explicit override in the conduct record always wins.
pub fn decide(
    input: DecisionInput<'_>,
    scale: &GradeScale,
    settings: &AcademicSettings,
) -> Result<DecisionOutcome, ConfigError> {
    let passing = scale.passing_grade.ok_or(ConfigError::MissingPassingGrade)?;

    let metric = if settings.auto_promote_students && input.is_final_period {
        input.annual_average.or(input.general_average)
    } else {
        input.general_average
    };

    let computed = metric.map(|m| {
        if m < passing {
            Decision::Redouble
        } else if below_attendance(input.conduct, settings) {
            Decision::Conditionnel
        } else {
            Decision::Admis
        }
    });
    let decision = input
        .conduct
        .and_then(|c| c.decision_override)
        .or(computed);

    let appreciation = input
        .general_average
        .map(|avg| grade_level(scale, avg).map(|l| l.name.clone()))
        .transpose()?;

    Ok(DecisionOutcome {
        decision,
        appreciation,
        honor: honor_flags(input.general_average, settings),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(general: Option<Decimal>) -> DecisionInput<'static> {
        DecisionInput {
            general_average: general,
            annual_average: None,
            is_final_period: false,
            conduct: None,
        }
    }

    fn band(name: &str, min: Decimal, max: Decimal) -> GradeLevel {
        GradeLevel {
            name: name.into(),
            min_value: min,
            max_value: max,
            description: String::new(),
        }
    }

    #[test]
    fn default_scale_is_valid() {
        assert_eq!(validate_scale(&GradeScale::default()), Ok(()));
    }

    #[test]
    fn every_value_on_the_scale_hits_exactly_one_band() {
        let scale = GradeScale::default();
        let mut v = dec!(0);
        while v <= dec!(20) {
            assert!(grade_level(&scale, v).is_ok(), "no single band for {v}");
            v += dec!(0.01);
        }
        assert_eq!(grade_level(&scale, dec!(20)).map(|l| l.name.as_str()), Ok("Excellent"));
        assert_eq!(grade_level(&scale, dec!(10)).map(|l| l.name.as_str()), Ok("Passable"));
        assert_eq!(grade_level(&scale, dec!(9.99)).map(|l| l.name.as_str()), Ok("Insuffisant"));
    }

    #[test]
    fn gap_between_bands_is_a_config_error() {
        let scale = GradeScale {
            grade_levels: vec![band("Bas", dec!(0), dec!(10)), band("Haut", dec!(11), dec!(20))],
            ..GradeScale::default()
        };
        assert_eq!(
            validate_scale(&scale),
            Err(ConfigError::GradeLevelGap {
                from: dec!(10),
                to: dec!(11)
            })
        );
        assert_eq!(
            grade_level(&scale, dec!(10.5)),
            Err(ConfigError::NoGradeLevelFor(dec!(10.5)))
        );
    }

    #[test]
    fn bands_must_reach_down_to_zero_even_with_a_raised_minimum() {
        let scale = GradeScale {
            min_grade: dec!(5),
            grade_levels: vec![band("Bas", dec!(5), dec!(10)), band("Haut", dec!(10), dec!(20))],
            ..GradeScale::default()
        };
        assert_eq!(
            validate_scale(&scale),
            Err(ConfigError::GradeLevelGap {
                from: dec!(0),
                to: dec!(5)
            })
        );

        let covered = GradeScale {
            min_grade: dec!(5),
            grade_levels: vec![band("Bas", dec!(0), dec!(10)), band("Haut", dec!(10), dec!(20))],
            ..GradeScale::default()
        };
        assert_eq!(validate_scale(&covered), Ok(()));
        assert_eq!(grade_level(&covered, dec!(3)).map(|l| l.name.as_str()), Ok("Bas"));
    }

    #[test]
    fn overlapping_bands_are_a_config_error() {
        let scale = GradeScale {
            grade_levels: vec![band("Bas", dec!(0), dec!(12)), band("Haut", dec!(10), dec!(20))],
            ..GradeScale::default()
        };
        assert!(matches!(
            validate_scale(&scale),
            Err(ConfigError::GradeLevelOverlap { .. })
        ));
        assert!(matches!(
            grade_level(&scale, dec!(11)),
            Err(ConfigError::GradeLevelOverlap { .. })
        ));
    }

    #[test]
    fn bands_not_reaching_the_top_leave_a_gap() {
        let scale = GradeScale {
            grade_levels: vec![band("Tout", dec!(0), dec!(19))],
            ..GradeScale::default()
        };
        assert_eq!(
            validate_scale(&scale),
            Err(ConfigError::GradeLevelGap {
                from: dec!(19),
                to: dec!(20)
            })
        );
    }

    #[test]
    fn missing_passing_grade_is_rejected() {
        let scale = GradeScale {
            passing_grade: None,
            ..GradeScale::default()
        };
        assert_eq!(validate_scale(&scale), Err(ConfigError::MissingPassingGrade));
        assert_eq!(
            decide(input(Some(dec!(12))), &scale, &AcademicSettings::default()),
            Err(ConfigError::MissingPassingGrade)
        );
    }

    #[test]
    fn pass_and_fail_against_passing_grade() {
        let scale = GradeScale::default();
        let settings = AcademicSettings::default();
        let pass = decide(input(Some(dec!(10))), &scale, &settings).expect("decide");
        assert_eq!(pass.decision, Some(Decision::Admis));
        assert_eq!(pass.appreciation.as_deref(), Some("Passable"));
        let fail = decide(input(Some(dec!(9.99))), &scale, &settings).expect("decide");
        assert_eq!(fail.decision, Some(Decision::Redouble));
    }

    #[test]
    fn low_attendance_makes_pass_conditional() {
        let conduct = StudentConduct {
            attendance_rate: Some(dec!(60)),
            ..StudentConduct::default()
        };
        let out = decide(
            DecisionInput {
                conduct: Some(&conduct),
                ..input(Some(dec!(15)))
            },
            &GradeScale::default(),
            &AcademicSettings::default(),
        )
        .expect("decide");
        assert_eq!(out.decision, Some(Decision::Conditionnel));
    }

    #[test]
    fn override_wins() {
        let conduct = StudentConduct {
            decision_override: Some(Decision::Admis),
            ..StudentConduct::default()
        };
        let out = decide(
            DecisionInput {
                conduct: Some(&conduct),
                ..input(Some(dec!(8)))
            },
            &GradeScale::default(),
            &AcademicSettings::default(),
        )
        .expect("decide");
        assert_eq!(out.decision, Some(Decision::Admis));
    }

    #[test]
    fn auto_promotion_uses_annual_average_on_final_period() {
        let settings = AcademicSettings {
            auto_promote_students: true,
            ..AcademicSettings::default()
        };
        let final_input = DecisionInput {
            general_average: Some(dec!(9)),
            annual_average: Some(dec!(11)),
            is_final_period: true,
            conduct: None,
        };
        let out = decide(final_input, &GradeScale::default(), &settings).expect("decide");
        assert_eq!(out.decision, Some(Decision::Admis));
        // Appreciation still describes the period.
        assert_eq!(out.appreciation.as_deref(), Some("Insuffisant"));

        let mid_year = DecisionInput {
            is_final_period: false,
            ..final_input
        };
        let out = decide(mid_year, &GradeScale::default(), &settings).expect("decide");
        assert_eq!(out.decision, Some(Decision::Redouble));
    }

    #[test]
    fn no_average_means_no_decision() {
        let out = decide(input(None), &GradeScale::default(), &AcademicSettings::default())
            .expect("decide");
        assert_eq!(out.decision, None);
        assert_eq!(out.appreciation, None);
        assert_eq!(out.honor, HonorFlags::default());
    }

    #[test]
    fn honor_rolls_follow_thresholds() {
        let settings = AcademicSettings::default();
        let scale = GradeScale::default();
        let h = decide(input(Some(dec!(12.5))), &scale, &settings).expect("decide").honor;
        assert!(h.honneur && !h.encouragement && !h.felicitations);
        let e = decide(input(Some(dec!(14))), &scale, &settings).expect("decide").honor;
        assert!(!e.honneur && e.encouragement && !e.felicitations);
        let f = decide(input(Some(dec!(16))), &scale, &settings).expect("decide").honor;
        assert!(f.felicitations && !f.encouragement);
    }
}
