//! Property test: the incrementally maintained cross-lever sums match a full
//! recomputation over the qualifying levers.

use gambit_core::RunningStats;
use proptest::prelude::*;

const TOLERANCE: f64 = 1e-6;

fn recompute(stats: &RunningStats) -> (f64, f64, f64, usize, usize) {
    let mut mean_sum = 0.0;
    let mut square_mean_sum = 0.0;
    let mut sigma_sum = 0.0;
    let mut observed = 0;
    let mut twice = 0;
    for index in 0..stats.lever_count() {
        if let Some(mean) = stats.mean(index) {
            observed += 1;
            mean_sum += mean;
            square_mean_sum += mean * mean;
        }
        if let Some(sigma) = stats.sigma(index) {
            twice += 1;
            sigma_sum += sigma;
        }
    }
    (mean_sum, square_mean_sum, sigma_sum, observed, twice)
}

proptest! {
    #[test]
    fn incremental_sums_match_recomputation(
        levers in 1usize..6,
        observations in prop::collection::vec((0usize..6, 0.0f64..10.0), 0..200),
    ) {
        let mut stats = RunningStats::new(levers);
        let mut accepted = 0u64;
        for (index, reward) in observations {
            if stats.observe(index, reward) {
                accepted += 1;
            }
        }

        let (mean_sum, square_mean_sum, sigma_sum, observed, twice) = recompute(&stats);
        prop_assert_eq!(stats.round_index(), accepted);
        prop_assert_eq!(stats.observed_lever_count(), observed);
        prop_assert_eq!(stats.twice_observed_lever_count(), twice);
        prop_assert!((stats.lever_mean_sum() - mean_sum).abs() < TOLERANCE);
        prop_assert!((stats.lever_square_mean_sum() - square_mean_sum).abs() < TOLERANCE);
        prop_assert!((stats.lever_sigma_sum() - sigma_sum).abs() < TOLERANCE);
    }
}

proptest! {
    #[test]
    fn bulk_observations_keep_sums_consistent(
        levers in 1usize..5,
        batches in prop::collection::vec((0usize..5, 0.0f64..5.0, 0u64..50), 0..60),
    ) {
        let mut stats = RunningStats::new(levers);
        let mut accepted = 0u64;
        for (index, reward, n) in batches {
            if stats.observe_n(index, reward, n) {
                accepted += n;
            }
        }

        let (mean_sum, square_mean_sum, sigma_sum, observed, twice) = recompute(&stats);
        prop_assert_eq!(stats.round_index(), accepted);
        prop_assert_eq!(stats.observed_lever_count(), observed);
        prop_assert_eq!(stats.twice_observed_lever_count(), twice);
        prop_assert!((stats.lever_mean_sum() - mean_sum).abs() < TOLERANCE);
        prop_assert!((stats.lever_square_mean_sum() - square_mean_sum).abs() < TOLERANCE);
        prop_assert!((stats.lever_sigma_sum() - sigma_sum).abs() < TOLERANCE);
    }
}
