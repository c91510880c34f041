use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::model::{Period, ReportCard, Trend};
use super::{mean, round_half_up};

/// What the tracker needs from one closed period's report card.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorPeriod {
    pub period_id: String,
    pub period_number: i64,
    pub general_average: Option<Decimal>,
    pub subject_averages: BTreeMap<String, Option<Decimal>>,
}

impl From<&ReportCard> for PriorPeriod {
    fn from(card: &ReportCard) -> Self {
        Self {
            period_id: card.period_id.clone(),
            period_number: card.period_number,
            general_average: card.general_average,
            subject_averages: card
                .subjects
                .iter()
                .map(|s| (s.subject_id.clone(), s.average))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendReport {
    pub general: Trend,
    pub subjects: BTreeMap<String, Trend>,
    pub history_averages: Vec<Option<Decimal>>,
}

pub fn trend_between(current: Option<Decimal>, previous: Option<Decimal>, epsilon: Decimal) -> Trend {
    let (Some(current), Some(previous)) = (current, previous) else {
        return Trend::Stable;
    };
    let delta = current - previous;
    if delta.abs() < epsilon {
        Trend::Stable
    } else if delta > Decimal::ZERO {
        Trend::Up
    } else {
        Trend::Down
    }
}

/// Priors strictly before `current`, oldest first, one per period.
fn ordered_priors<'a>(current: &Period, priors: &'a [PriorPeriod]) -> Vec<&'a PriorPeriod> {
    let mut out: Vec<&PriorPeriod> = priors
        .iter()
        .filter(|p| p.period_number < current.period_number)
        .collect();
    out.sort_by(|a, b| {
        a.period_number
            .cmp(&b.period_number)
            .then_with(|| a.period_id.cmp(&b.period_id))
    });
    out.dedup_by(|later, earlier| later.period_number == earlier.period_number);
    out
}

fn most_recent<F>(priors: &[&PriorPeriod], pick: F) -> Option<Decimal>
where
    F: Fn(&PriorPeriod) -> Option<Decimal>,
{
    priors.iter().rev().find_map(|p| pick(*p))
}

/// One slot per period of the year up to and including `current`, oldest
/// first; periods without a closed card are `None`.
pub fn history_averages(
    year_periods: &[Period],
    current: &Period,
    current_average: Option<Decimal>,
    priors: &[&PriorPeriod],
) -> Vec<Option<Decimal>> {
    let mut numbers: Vec<i64> = year_periods
        .iter()
        .map(|p| p.period_number)
        .filter(|n| *n < current.period_number)
        .collect();
    numbers.sort_unstable();
    numbers.dedup();

    let mut slots: Vec<Option<Decimal>> = numbers
        .iter()
        .map(|n| {
            priors
                .iter()
                .find(|p| p.period_number == *n)
                .and_then(|p| p.general_average)
        })
        .collect();
    slots.push(current_average);
    slots
}

pub fn track(
    year_periods: &[Period],
    current: &Period,
    general_average: Option<Decimal>,
    subject_averages: &BTreeMap<String, Option<Decimal>>,
    priors: &[PriorPeriod],
    epsilon: Decimal,
) -> TrendReport {
    let ordered = ordered_priors(current, priors);

    let general = trend_between(
        general_average,
        most_recent(&ordered, |p| p.general_average),
        epsilon,
    );
    let subjects = subject_averages
        .iter()
        .map(|(subject_id, avg)| {
            let previous = most_recent(&ordered, |p| {
                p.subject_averages.get(subject_id).copied().flatten()
            });
            (subject_id.clone(), trend_between(*avg, previous, epsilon))
        })
        .collect();

    TrendReport {
        general,
        subjects,
        history_averages: history_averages(year_periods, current, general_average, &ordered),
    }
}

/// Mean of the populated history slots; only meaningful on the final period.
pub fn annual_average(history: &[Option<Decimal>], precision: u32) -> Option<Decimal> {
    let values: Vec<Decimal> = history.iter().flatten().copied().collect();
    mean(&values).map(|m| round_half_up(m, precision))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn period(n: i64) -> Period {
        Period {
            id: format!("p{n}"),
            school_year_id: "y1".into(),
            name: format!("Trimestre {n}"),
            period_number: n,
        }
    }

    fn prior(n: i64, general: Option<Decimal>, math: Option<Decimal>) -> PriorPeriod {
        let mut subject_averages = BTreeMap::new();
        subject_averages.insert("math".to_string(), math);
        PriorPeriod {
            period_id: format!("p{n}"),
            period_number: n,
            general_average: general,
            subject_averages,
        }
    }

    fn subjects(math: Option<Decimal>) -> BTreeMap<String, Option<Decimal>> {
        let mut m = BTreeMap::new();
        m.insert("math".to_string(), math);
        m
    }

    #[test]
    fn first_period_is_stable_with_single_slot() {
        let year = [period(1), period(2), period(3)];
        let report = track(
            &year,
            &period(1),
            Some(dec!(13.33)),
            &subjects(Some(dec!(14))),
            &[],
            dec!(0.05),
        );
        assert_eq!(report.general, Trend::Stable);
        assert_eq!(report.subjects.get("math"), Some(&Trend::Stable));
        assert_eq!(report.history_averages, vec![Some(dec!(13.33))]);
    }

    #[test]
    fn compares_against_most_recent_non_null_prior() {
        let year = [period(1), period(2), period(3)];
        let priors = [
            prior(1, Some(dec!(12)), Some(dec!(15))),
            prior(2, None, None),
        ];
        let report = track(
            &year,
            &period(3),
            Some(dec!(13)),
            &subjects(Some(dec!(14))),
            &priors,
            dec!(0.05),
        );
        assert_eq!(report.general, Trend::Up);
        assert_eq!(report.subjects.get("math"), Some(&Trend::Down));
        assert_eq!(
            report.history_averages,
            vec![Some(dec!(12)), None, Some(dec!(13))]
        );
    }

    #[test]
    fn missing_prior_period_leaves_null_slot() {
        let year = [period(1), period(2)];
        let report = track(&year, &period(2), Some(dec!(11)), &subjects(None), &[], dec!(0.05));
        assert_eq!(report.history_averages, vec![None, Some(dec!(11))]);
        assert_eq!(report.general, Trend::Stable);
    }

    #[test]
    fn changes_below_epsilon_are_stable() {
        assert_eq!(trend_between(Some(dec!(12.04)), Some(dec!(12)), dec!(0.05)), Trend::Stable);
        assert_eq!(trend_between(Some(dec!(12.05)), Some(dec!(12)), dec!(0.05)), Trend::Up);
        assert_eq!(trend_between(Some(dec!(11.9)), Some(dec!(12)), dec!(0.05)), Trend::Down);
        assert_eq!(trend_between(None, Some(dec!(12)), dec!(0.05)), Trend::Stable);
    }

    #[test]
    fn priors_from_later_periods_are_ignored() {
        let year = [period(1), period(2), period(3)];
        let priors = [prior(3, Some(dec!(19)), Some(dec!(19)))];
        let report = track(
            &year,
            &period(2),
            Some(dec!(10)),
            &subjects(Some(dec!(10))),
            &priors,
            dec!(0.05),
        );
        assert_eq!(report.general, Trend::Stable);
        assert_eq!(report.history_averages, vec![None, Some(dec!(10))]);
    }

    #[test]
    fn annual_average_skips_empty_slots() {
        let history = vec![Some(dec!(12)), None, Some(dec!(13.5))];
        assert_eq!(annual_average(&history, 2), Some(dec!(12.75)));
        assert_eq!(annual_average(&[None, None], 2), None);
    }
}
