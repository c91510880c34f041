use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::{mean, round_half_up};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassStats {
    pub class_average: Option<Decimal>,
    pub min_average: Option<Decimal>,
    pub max_average: Option<Decimal>,
    pub ranked_count: u32,
}

/// Ranks and statistics for one metric (general average or one subject).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRanking {
    pub ranks: BTreeMap<String, u32>,
    pub stats: ClassStats,
}

impl MetricRanking {
    pub fn rank_of(&self, student_id: &str) -> Option<u32> {
        self.ranks.get(student_id).copied()
    }
}

/// Competition ranking ("1, 1, 3, 4") over the students that have a value.
///
/// Values are compared exactly as given, so callers pass the rounded,
/// displayed averages. Equal values are ordered by student id so the
/// iteration order of the input never shows through.
pub fn rank_metric<'a, I>(values: I, precision: u32) -> MetricRanking
where
    I: IntoIterator<Item = (&'a str, Option<Decimal>)>,
{
    let mut ranked: Vec<(&str, Decimal)> = values
        .into_iter()
        .filter_map(|(id, v)| v.map(|v| (id, v)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut ranks = BTreeMap::new();
    let mut current_rank = 0_u32;
    let mut previous: Option<Decimal> = None;
    for (position, (id, value)) in ranked.iter().enumerate() {
        if previous != Some(*value) {
            current_rank = position as u32 + 1;
            previous = Some(*value);
        }
        ranks.insert(id.to_string(), current_rank);
    }

    let values: Vec<Decimal> = ranked.iter().map(|(_, v)| *v).collect();
    let stats = ClassStats {
        class_average: mean(&values).map(|m| round_half_up(m, precision)),
        min_average: values.iter().min().copied(),
        max_average: values.iter().max().copied(),
        ranked_count: values.len() as u32,
    };

    MetricRanking { ranks, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ties_share_rank_and_next_rank_skips() {
        let r = rank_metric(
            [
                ("a", Some(dec!(16.0))),
                ("b", Some(dec!(14.0))),
                ("c", Some(dec!(14.0))),
                ("d", Some(dec!(12.0))),
            ],
            2,
        );
        assert_eq!(r.rank_of("a"), Some(1));
        assert_eq!(r.rank_of("b"), Some(2));
        assert_eq!(r.rank_of("c"), Some(2));
        assert_eq!(r.rank_of("d"), Some(4));
    }

    #[test]
    fn tie_at_top_gives_one_one_three() {
        let r = rank_metric(
            [
                ("x", Some(dec!(15))),
                ("y", Some(dec!(15.00))),
                ("z", Some(dec!(11))),
            ],
            2,
        );
        assert_eq!(r.rank_of("x"), Some(1));
        assert_eq!(r.rank_of("y"), Some(1));
        assert_eq!(r.rank_of("z"), Some(3));
    }

    #[test]
    fn students_without_value_are_not_ranked_or_counted() {
        let r = rank_metric(
            [
                ("a", Some(dec!(10))),
                ("b", None),
                ("c", Some(dec!(13))),
            ],
            2,
        );
        assert_eq!(r.rank_of("b"), None);
        assert_eq!(r.rank_of("c"), Some(1));
        assert_eq!(r.stats.ranked_count, 2);
        assert_eq!(r.stats.class_average, Some(dec!(11.5)));
        assert_eq!(r.stats.min_average, Some(dec!(10)));
        assert_eq!(r.stats.max_average, Some(dec!(13)));
    }

    #[test]
    fn empty_class_has_no_stats() {
        let r = rank_metric([("a", None), ("b", None)], 2);
        assert!(r.ranks.is_empty());
        assert_eq!(r.stats, ClassStats::default());
    }

    #[test]
    fn higher_average_always_ranks_better() {
        let input: Vec<(String, Option<Decimal>)> = [
            dec!(9.5),
            dec!(17.25),
            dec!(12),
            dec!(12),
            dec!(3),
            dec!(17.25),
            dec!(11.99),
        ]
        .iter()
        .enumerate()
        .map(|(i, v)| (format!("s{i}"), Some(*v)))
        .collect();
        let r = rank_metric(input.iter().map(|(id, v)| (id.as_str(), *v)), 2);
        for (ia, va) in &input {
            for (ib, vb) in &input {
                let (ra, rb) = (r.rank_of(ia).unwrap(), r.rank_of(ib).unwrap());
                if va > vb {
                    assert!(ra < rb, "{ia} ({va:?}) should outrank {ib} ({vb:?})");
                } else if va == vb {
                    assert_eq!(ra, rb);
                }
            }
        }
    }

    #[test]
    fn class_average_is_rounded() {
        let r = rank_metric(
            [("a", Some(dec!(10))), ("b", Some(dec!(10))), ("c", Some(dec!(11)))],
            2,
        );
        assert_eq!(r.stats.class_average, Some(dec!(10.33)));
    }
}
