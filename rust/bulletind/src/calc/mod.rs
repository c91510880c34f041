//! Report-card computation engine.
//!
//! Everything under this module is a pure function of a [`ClassSnapshot`]:
//! no I/O, no clocks, no hash-order dependence.

mod assemble;
mod decision;
mod error;
mod model;
mod ranking;
mod snapshot;
mod student;
mod subject;
mod trend;

pub use assemble::{compute_class_report_cards, compute_subject_ranking};
pub use decision::{validate_scale, validate_settings, validate_weights};
pub use error::{CalcError, IntegrityError};
pub use model::*;
pub use snapshot::{ClassSnapshot, ConfigurationProvider, EvaluationStore};
pub use subject::validate_evaluation;

use rust_decimal::{Decimal, RoundingStrategy};

/// Round half-up to `dp` places. Averages are never negative, so
/// away-from-zero is the same as half-up here.
pub fn round_half_up(x: Decimal, dp: u32) -> Decimal {
    x.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().copied().sum();
    Some(sum / Decimal::from(values.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_half_up_rounds_midpoints_up() {
        assert_eq!(round_half_up(dec!(14.665), 2), dec!(14.67));
        assert_eq!(round_half_up(dec!(14.664), 2), dec!(14.66));
        assert_eq!(round_half_up(dec!(12.5), 0), dec!(13));
        assert_eq!(round_half_up(dec!(44) / dec!(3), 2), dec!(14.67));
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[dec!(12), dec!(14)]), Some(dec!(13)));
    }
}
