use rayon::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, debug_span, info, info_span, warn};

use super::decision::{decide, grade_level, DecisionInput};
use super::error::{CalcError, IntegrityError};
use super::model::{
    CardStatus, DisplayFlags, EvaluationSummary, RankedEntry, ReportCard, ReportCardSubject,
    Student, SubjectAverage, Trend,
};
use super::ranking::{rank_metric, MetricRanking};
use super::round_half_up;
use super::snapshot::ClassSnapshot;
use super::student::{general_average, StudentAggregate, WeightedSubject};
use super::subject::{evaluation_summaries, subject_average};
use super::trend::{annual_average, track};

#[derive(Debug)]
struct SubjectWork {
    average: SubjectAverage,
    summaries: Vec<EvaluationSummary>,
}

/// Phase 1 output for one student. `subjects` is aligned with
/// `ClassSnapshot::subjects`.
#[derive(Debug)]
struct StudentWork<'a> {
    student: &'a Student,
    subjects: Vec<SubjectWork>,
    aggregate: StudentAggregate,
}

#[derive(Debug)]
struct ClassRanking {
    general: MetricRanking,
    subjects: BTreeMap<String, MetricRanking>,
}

fn student_work<'a>(
    snapshot: &ClassSnapshot,
    student: &'a Student,
) -> Result<StudentWork<'a>, CalcError> {
    let mut subjects = Vec::with_capacity(snapshot.subjects.len());
    let mut weighted = Vec::with_capacity(snapshot.subjects.len());
    for cs in &snapshot.subjects {
        let evals = snapshot.evaluations_for(&student.id, &cs.subject.id);
        let average = subject_average(
            &student.id,
            &cs.subject.id,
            &snapshot.period.id,
            &evals,
            &snapshot.weights,
            &snapshot.scale,
        )?;
        let summaries = evaluation_summaries(&evals, &snapshot.weights, &snapshot.scale)?;
        weighted.push(WeightedSubject {
            subject_id: cs.subject.id.clone(),
            average: average.average,
            coefficient: cs.coefficient,
        });
        subjects.push(SubjectWork { average, summaries });
    }
    let aggregate = general_average(&student.id, &weighted, snapshot.scale.decimal_precision)?;
    Ok(StudentWork {
        student,
        subjects,
        aggregate,
    })
}

fn rank_class(snapshot: &ClassSnapshot, work: &[StudentWork<'_>]) -> ClassRanking {
    let precision = snapshot.scale.decimal_precision;
    let general = rank_metric(
        work.iter()
            .map(|w| (w.student.id.as_str(), w.aggregate.general_average)),
        precision,
    );
    let subjects = snapshot
        .subjects
        .iter()
        .enumerate()
        .map(|(i, cs)| {
            let ranking = rank_metric(
                work.iter()
                    .map(|w| (w.student.id.as_str(), w.subjects[i].average.average)),
                precision,
            );
            (cs.subject.id.clone(), ranking)
        })
        .collect();
    ClassRanking { general, subjects }
}

fn assemble_card(
    snapshot: &ClassSnapshot,
    work: &StudentWork<'_>,
    ranking: &ClassRanking,
) -> Result<ReportCard, CalcError> {
    let scale = &snapshot.scale;
    let settings = &snapshot.settings;
    let student = work.student;
    let general = work.aggregate.general_average;

    let subject_averages: BTreeMap<String, Option<Decimal>> = snapshot
        .subjects
        .iter()
        .zip(&work.subjects)
        .map(|(cs, sw)| (cs.subject.id.clone(), sw.average.average))
        .collect();
    let priors = snapshot
        .priors
        .get(&student.id)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let trends = track(
        &snapshot.year_periods,
        &snapshot.period,
        general,
        &subject_averages,
        priors,
        settings.trend_epsilon,
    );

    let mut subjects = Vec::with_capacity(snapshot.subjects.len());
    for (cs, sw) in snapshot.subjects.iter().zip(&work.subjects) {
        let average = sw.average.average;
        let subject_ranking = ranking.subjects.get(&cs.subject.id);
        let stats = subject_ranking.map(|r| r.stats.clone()).unwrap_or_default();
        let appreciation = average
            .map(|avg| grade_level(scale, avg).map(|l| l.name.clone()))
            .transpose()?;
        let total = average
            .map(|a| {
                a.checked_mul(cs.coefficient)
                    .map(|t| round_half_up(t, scale.decimal_precision))
                    .ok_or_else(|| IntegrityError::CoefficientOverflow {
                        student_id: student.id.clone(),
                        subject_id: cs.subject.id.clone(),
                    })
            })
            .transpose()?;
        subjects.push(ReportCardSubject {
            subject_id: cs.subject.id.clone(),
            name: cs.subject.name.clone(),
            category: cs
                .subject
                .category_name
                .clone()
                .unwrap_or_else(|| "Général".to_string()),
            professor: cs.professor.clone(),
            evaluations: sw.summaries.clone(),
            average,
            coefficient: cs.coefficient,
            total,
            total_coefficient: if average.is_some() {
                cs.coefficient
            } else {
                Decimal::ZERO
            },
            class_average: stats.class_average,
            min_average: stats.min_average,
            max_average: stats.max_average,
            rank: subject_ranking.and_then(|r| r.rank_of(&student.id)),
            appreciation,
            trend: trends
                .subjects
                .get(&cs.subject.id)
                .copied()
                .unwrap_or(Trend::Stable),
        });
    }

    let is_final = snapshot.is_final_period();
    let annual = if is_final {
        annual_average(&trends.history_averages, scale.decimal_precision)
    } else {
        None
    };
    let conduct = snapshot.conduct.get(&student.id);
    let outcome = decide(
        DecisionInput {
            general_average: general,
            annual_average: annual,
            is_final_period: is_final,
            conduct,
        },
        scale,
        settings,
    )?;

    let stats = &ranking.general.stats;
    Ok(ReportCard {
        id: format!("{}:{}", snapshot.period.id, student.id),
        student_id: student.id.clone(),
        student_name: student.display_name.clone(),
        matricule: student.matricule.clone(),
        class_id: snapshot.class.id.clone(),
        class_name: snapshot.class.name.clone(),
        period_id: snapshot.period.id.clone(),
        period_name: snapshot.period.name.clone(),
        period_number: snapshot.period.period_number,
        school_year_id: snapshot.period.school_year_id.clone(),
        status: if general.is_some() {
            CardStatus::Complete
        } else {
            CardStatus::Incomplete
        },
        subjects,
        general_average: general,
        total_coefficient: work.aggregate.total_coefficient,
        annual_average: annual,
        rank: ranking.general.rank_of(&student.id),
        total_students: stats.ranked_count,
        class_average: stats.class_average,
        min_average: stats.min_average,
        max_average: stats.max_average,
        appreciation_generale: outcome.appreciation,
        decision: outcome.decision,
        decision_text: outcome.decision.map(|d| d.text().to_string()),
        trend: trends.general,
        history_averages: trends.history_averages,
        tableau_honneur: outcome.honor.honneur,
        tableau_encouragement: outcome.honor.encouragement,
        tableau_felicitations: outcome.honor.felicitations,
        abs_justifiees: conduct.map(|c| c.absences_justified).unwrap_or(0),
        abs_injustifiees: conduct.map(|c| c.absences_unjustified).unwrap_or(0),
        retards: conduct.map(|c| c.lates).unwrap_or(0),
        conduite: conduct
            .and_then(|c| c.conduct.clone())
            .unwrap_or_else(|| "Bonne".to_string()),
        display: DisplayFlags {
            show_rank: settings.show_rank_on_report_card,
            show_class_average: settings.show_class_average_on_report_card,
        },
    })
}

/// Builds one report card per active student of the snapshot's class.
///
/// Phase 1 (subject and general averages) runs per student in parallel and
/// must finish for the whole class before Phase 2 ranks it; Phase 3 then
/// assembles cards in parallel against the shared ranking. Any integrity or
/// configuration error aborts the whole batch.
pub fn compute_class_report_cards(snapshot: &ClassSnapshot) -> Result<Vec<ReportCard>, CalcError> {
    let span = info_span!(
        "report_cards",
        class_id = %snapshot.class.id,
        period_id = %snapshot.period.id
    );
    let _guard = span.enter();

    let work: Vec<StudentWork<'_>> = {
        let _phase = debug_span!("phase1").entered();
        snapshot
            .students
            .par_iter()
            .map(|s| student_work(snapshot, s))
            .collect::<Result<Vec<_>, CalcError>>()
            .inspect_err(|e| warn!(code = e.code(), error = %e, "report card batch aborted"))?
    };
    debug!(students = work.len(), "phase1 complete");

    let ranking = {
        let _phase = debug_span!("rank").entered();
        rank_class(snapshot, &work)
    };
    debug!(ranked = ranking.general.stats.ranked_count, "rank complete");

    let cards: Vec<ReportCard> = {
        let _phase = debug_span!("phase3").entered();
        work.par_iter()
            .map(|w| assemble_card(snapshot, w, &ranking))
            .collect::<Result<Vec<_>, CalcError>>()
            .inspect_err(|e| warn!(code = e.code(), error = %e, "report card batch aborted"))?
    };

    info!(
        cards = cards.len(),
        ranked = ranking.general.stats.ranked_count,
        "report cards computed"
    );
    Ok(cards)
}

/// Competition ranking of the class on a single subject. Students without
/// evaluations come last, unranked.
pub fn compute_subject_ranking(
    snapshot: &ClassSnapshot,
    subject_id: &str,
) -> Result<Vec<RankedEntry>, CalcError> {
    if snapshot.subject(subject_id).is_none() {
        return Err(CalcError::not_found("subject", subject_id));
    }

    let averages: Vec<(&Student, SubjectAverage)> = snapshot
        .students
        .par_iter()
        .map(|s| {
            let evals = snapshot.evaluations_for(&s.id, subject_id);
            subject_average(
                &s.id,
                subject_id,
                &snapshot.period.id,
                &evals,
                &snapshot.weights,
                &snapshot.scale,
            )
            .map(|avg| (s, avg))
        })
        .collect::<Result<_, _>>()?;

    let ranking = rank_metric(
        averages
            .iter()
            .map(|(s, avg)| (s.id.as_str(), avg.average)),
        snapshot.scale.decimal_precision,
    );

    let mut entries: Vec<RankedEntry> = averages
        .into_iter()
        .map(|(s, avg)| RankedEntry {
            student_id: s.id.clone(),
            display_name: s.display_name.clone(),
            average: avg.average,
            rank: ranking.rank_of(&s.id),
        })
        .collect();
    entries.sort_by(|a, b| match (a.rank, b.rank) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.student_id.cmp(&b.student_id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.student_id.cmp(&b.student_id),
    });
    Ok(entries)
}
