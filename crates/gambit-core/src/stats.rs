use serde::{Deserialize, Serialize};

/// Per-lever reward aggregates plus incrementally maintained cross-lever sums.
///
/// The cross-lever sums (`lever_mean_sum`, `lever_square_mean_sum`,
/// `lever_sigma_sum`) always equal what a full recomputation over the
/// qualifying levers would yield, up to floating point rounding.
///
/// Only the per-lever sums are serialized; the cross-lever aggregates are
/// rebuilt from them on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "StatsRecord", try_from = "StatsRecord")]
pub struct RunningStats {
    reward_sums: Vec<f64>,
    reward_square_sums: Vec<f64>,
    counts: Vec<u64>,
    round_index: u64,
    /// Sum of the means of levers observed at least once.
    lever_mean_sum: f64,
    lever_square_mean_sum: f64,
    observed_lever_count: usize,
    /// Sum of the sigmas of levers observed at least twice.
    lever_sigma_sum: f64,
    twice_observed_lever_count: usize,
}

#[derive(Serialize, Deserialize)]
struct StatsRecord {
    reward_sums: Vec<f64>,
    reward_square_sums: Vec<f64>,
    counts: Vec<u64>,
}

impl From<RunningStats> for StatsRecord {
    fn from(stats: RunningStats) -> Self {
        Self {
            reward_sums: stats.reward_sums,
            reward_square_sums: stats.reward_square_sums,
            counts: stats.counts,
        }
    }
}

impl TryFrom<StatsRecord> for RunningStats {
    type Error = String;

    fn try_from(record: StatsRecord) -> Result<Self, Self::Error> {
        let n = record.counts.len();
        if record.reward_sums.len() != n || record.reward_square_sums.len() != n {
            return Err(format!(
                "per-lever arrays differ in length: {} counts, {} sums, {} square sums",
                n,
                record.reward_sums.len(),
                record.reward_square_sums.len()
            ));
        }
        let mut stats = Self::new(n);
        for index in 0..n {
            stats.absorb(
                index,
                record.counts[index],
                record.reward_sums[index],
                record.reward_square_sums[index],
            );
        }
        Ok(stats)
    }
}

/// Read-only view of one lever's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeverSummary {
    pub index: usize,
    pub count: u64,
    pub reward_sum: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigma: Option<f64>,
}

impl RunningStats {
    #[must_use]
    pub fn new(lever_count: usize) -> Self {
        let mut stats = Self::default();
        stats.reset(lever_count);
        stats
    }

    /// Zeroes everything and resizes the per-lever arrays.
    pub fn reset(&mut self, lever_count: usize) {
        self.reward_sums = vec![0.0; lever_count];
        self.reward_square_sums = vec![0.0; lever_count];
        self.counts = vec![0; lever_count];
        self.round_index = 0;
        self.lever_mean_sum = 0.0;
        self.lever_square_mean_sum = 0.0;
        self.observed_lever_count = 0;
        self.lever_sigma_sum = 0.0;
        self.twice_observed_lever_count = 0;
    }

    #[must_use]
    pub fn lever_count(&self) -> usize {
        self.counts.len()
    }

    /// Records a reward for `index`. Returns `false` (and changes nothing)
    /// when the index is out of range.
    pub fn observe(&mut self, index: usize, reward: f64) -> bool {
        self.absorb(index, 1, reward, reward * reward)
    }

    /// Records `n` observations of the same `reward` in one step.
    ///
    /// Equivalent to `n` calls of [`RunningStats::observe`] up to floating
    /// point rounding.
    #[allow(clippy::cast_precision_loss)]
    pub fn observe_n(&mut self, index: usize, reward: f64, n: u64) -> bool {
        let n_f = n as f64;
        self.absorb(index, n, n_f * reward, n_f * reward * reward)
    }

    /// Adds `n` observations with the given reward and squared-reward sums.
    fn absorb(&mut self, index: usize, n: u64, sum: f64, square_sum: f64) -> bool {
        if index >= self.counts.len() {
            return false;
        }
        if n == 0 {
            return true;
        }

        let before = self.counts[index];
        let after = before.saturating_add(n);
        if before == 0 {
            self.observed_lever_count += 1;
        }
        if before < 2 && after >= 2 {
            self.twice_observed_lever_count += 1;
        }

        // retract the lever's previous contribution
        if let Some(mean) = self.mean(index) {
            self.lever_mean_sum -= mean;
            self.lever_square_mean_sum -= mean * mean;
        }
        if let Some(sigma) = self.sigma(index) {
            self.lever_sigma_sum -= sigma;
        }

        self.reward_sums[index] += sum;
        self.reward_square_sums[index] += square_sum;
        self.counts[index] = after;
        self.round_index = self.round_index.saturating_add(n);

        if let Some(mean) = self.mean(index) {
            self.lever_mean_sum += mean;
            self.lever_square_mean_sum += mean * mean;
        }
        if let Some(sigma) = self.sigma(index) {
            self.lever_sigma_sum += sigma;
        }

        true
    }

    /// Number of observations recorded for `index` (0 when out of range).
    #[must_use]
    pub fn count(&self, index: usize) -> u64 {
        self.counts.get(index).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn reward_sum(&self, index: usize) -> f64 {
        self.reward_sums.get(index).copied().unwrap_or(0.0)
    }

    /// Empirical reward mean, `None` for a never-observed lever.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self, index: usize) -> Option<f64> {
        match self.count(index) {
            0 => None,
            n => Some(self.reward_sums[index] / n as f64),
        }
    }

    /// `reward_sum / max(count, 1)`: zero for unobserved levers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_or_zero(&self, index: usize) -> f64 {
        self.reward_sum(index) / self.count(index).max(1) as f64
    }

    /// Empirical standard deviation, `None` below two observations.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sigma(&self, index: usize) -> Option<f64> {
        let n = self.count(index);
        if n < 2 {
            return None;
        }
        let n = n as f64;
        let mean = self.reward_sums[index] / n;
        let variance = self.reward_square_sums[index] / n - mean * mean;
        // rounding can push a zero variance slightly negative
        Some(variance.max(0.0).sqrt())
    }

    /// Total number of observations so far.
    #[must_use]
    pub fn round_index(&self) -> u64 {
        self.round_index
    }

    #[must_use]
    pub fn observed_lever_count(&self) -> usize {
        self.observed_lever_count
    }

    #[must_use]
    pub fn twice_observed_lever_count(&self) -> usize {
        self.twice_observed_lever_count
    }

    #[must_use]
    pub fn lever_mean_sum(&self) -> f64 {
        self.lever_mean_sum
    }

    #[must_use]
    pub fn lever_square_mean_sum(&self) -> f64 {
        self.lever_square_mean_sum
    }

    #[must_use]
    pub fn lever_sigma_sum(&self) -> f64 {
        self.lever_sigma_sum
    }

    /// Average of the means of the observed levers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_mean(&self) -> Option<f64> {
        (self.observed_lever_count > 0)
            .then(|| self.lever_mean_sum / self.observed_lever_count as f64)
    }

    /// Variance of the per-lever means across the observed levers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_variance(&self) -> Option<f64> {
        let average = self.average_mean()?;
        let square = self.lever_square_mean_sum / self.observed_lever_count as f64;
        Some((square - average * average).max(0.0))
    }

    /// Average sigma of the levers observed at least twice.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_sigma(&self) -> Option<f64> {
        (self.twice_observed_lever_count > 0)
            .then(|| self.lever_sigma_sum / self.twice_observed_lever_count as f64)
    }

    /// First lever (in index order) maximizing [`RunningStats::mean_or_zero`].
    #[must_use]
    pub fn greedy_index(&self) -> usize {
        let mut best = 0;
        let mut best_mean = f64::NEG_INFINITY;
        for index in 0..self.lever_count() {
            let mean = self.mean_or_zero(index);
            if mean > best_mean {
                best_mean = mean;
                best = index;
            }
        }
        best
    }

    /// First lever with the smallest observation count.
    #[must_use]
    pub fn least_observed_index(&self) -> usize {
        self.counts
            .iter()
            .enumerate()
            .min_by_key(|&(index, &count)| (count, index))
            .map_or(0, |(index, _)| index)
    }

    /// First lever that has never been observed.
    #[must_use]
    pub fn first_unobserved(&self) -> Option<usize> {
        self.counts.iter().position(|&count| count == 0)
    }

    /// All levers without an observation, in index order.
    #[must_use]
    pub fn unobserved_levers(&self) -> Vec<usize> {
        self.counts
            .iter()
            .enumerate()
            .filter_map(|(index, &count)| (count == 0).then_some(index))
            .collect()
    }

    #[must_use]
    pub fn summary(&self, index: usize) -> LeverSummary {
        LeverSummary {
            index,
            count: self.count(index),
            reward_sum: self.reward_sum(index),
            mean: self.mean(index),
            sigma: self.sigma(index),
        }
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<LeverSummary> {
        (0..self.lever_count()).map(|i| self.summary(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_sigma_follow_observation_count() {
        let mut stats = RunningStats::new(2);
        assert_eq!(stats.mean(0), None);
        assert_eq!(stats.sigma(0), None);

        stats.observe(0, 1.0);
        assert_eq!(stats.mean(0), Some(1.0));
        assert_eq!(stats.sigma(0), None);

        stats.observe(0, 3.0);
        assert_eq!(stats.mean(0), Some(2.0));
        assert!((stats.sigma(0).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(stats.round_index(), 2);
        assert_eq!(stats.observed_lever_count(), 1);
        assert_eq!(stats.twice_observed_lever_count(), 1);
    }

    #[test]
    fn out_of_range_observation_is_ignored() {
        let mut stats = RunningStats::new(1);
        assert!(!stats.observe(3, 1.0));
        assert_eq!(stats.round_index(), 0);
        assert_eq!(stats.count(3), 0);
    }

    #[test]
    fn greedy_and_least_observed_prefer_lowest_index_on_ties() {
        let mut stats = RunningStats::new(3);
        assert_eq!(stats.greedy_index(), 0);
        assert_eq!(stats.least_observed_index(), 0);

        stats.observe(0, 0.0);
        stats.observe(2, 1.0);
        assert_eq!(stats.greedy_index(), 2);
        assert_eq!(stats.least_observed_index(), 1);
        assert_eq!(stats.first_unobserved(), Some(1));
        assert_eq!(stats.unobserved_levers(), vec![1]);
    }

    #[test]
    fn constant_rewards_have_zero_sigma() {
        let mut stats = RunningStats::new(1);
        for _ in 0..10 {
            stats.observe(0, 0.1);
        }
        assert_eq!(stats.sigma(0), Some(0.0));
        assert_eq!(stats.average_sigma(), Some(0.0));
    }

    #[test]
    fn reset_resizes_and_clears() {
        let mut stats = RunningStats::new(2);
        stats.observe(1, 5.0);
        stats.reset(4);
        assert_eq!(stats.lever_count(), 4);
        assert_eq!(stats.round_index(), 0);
        assert_eq!(stats.average_mean(), None);
        assert!(stats.lever_mean_sum().abs() < f64::EPSILON);
    }

    #[test]
    fn bulk_observation_matches_repeated_ones() {
        let mut one_by_one = RunningStats::new(2);
        let mut bulk = RunningStats::new(2);
        for _ in 0..7 {
            one_by_one.observe(0, 0.0);
        }
        for _ in 0..3 {
            one_by_one.observe(0, 1.0);
        }
        one_by_one.observe(1, 2.0);
        bulk.observe_n(0, 0.0, 7);
        bulk.observe_n(0, 1.0, 3);
        bulk.observe_n(1, 2.0, 1);
        bulk.observe_n(1, 9.0, 0);

        assert_eq!(bulk.round_index(), one_by_one.round_index());
        assert_eq!(bulk.count(0), 10);
        assert_eq!(bulk.observed_lever_count(), 2);
        assert_eq!(bulk.twice_observed_lever_count(), 1);
        assert!((bulk.sigma(0).unwrap() - one_by_one.sigma(0).unwrap()).abs() < 1e-12);
        assert!((bulk.lever_mean_sum() - one_by_one.lever_mean_sum()).abs() < 1e-12);
        assert!(!bulk.observe_n(5, 1.0, 3));
    }

    #[test]
    fn bulk_observation_of_huge_counts_is_immediate() {
        let mut stats = RunningStats::new(1);
        stats.observe_n(0, 0.0, 1_000_000_000_000);
        stats.observe_n(0, 1.0, 1_000_000);
        assert_eq!(stats.round_index(), 1_000_001_000_000);
        assert!(stats.mean(0).unwrap() > 0.0);
    }

    #[test]
    fn serde_round_trip_rebuilds_aggregates() {
        let mut stats = RunningStats::new(3);
        for (index, reward) in [(0, 1.0), (0, 0.0), (1, 0.5), (0, 1.0)] {
            stats.observe(index, reward);
        }
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("lever_mean_sum").is_none());

        let back: RunningStats = serde_json::from_value(json).unwrap();
        assert_eq!(back.lever_count(), 3);
        assert_eq!(back.round_index(), 4);
        assert_eq!(back.observed_lever_count(), 2);
        assert_eq!(back.twice_observed_lever_count(), 1);
        assert!((back.lever_mean_sum() - stats.lever_mean_sum()).abs() < 1e-12);
        assert!((back.lever_sigma_sum() - stats.lever_sigma_sum()).abs() < 1e-12);
    }

    #[test]
    fn ragged_record_is_rejected() {
        let json = serde_json::json!({
            "reward_sums": [1.0, 2.0],
            "reward_square_sums": [1.0],
            "counts": [1, 2],
        });
        assert!(serde_json::from_value::<RunningStats>(json).is_err());
    }

    #[test]
    fn summary_serializes_without_missing_estimates() {
        let mut stats = RunningStats::new(1);
        stats.observe(0, 1.0);
        let json = serde_json::to_value(stats.summary(0)).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["mean"], 1.0);
        assert!(json.get("sigma").is_none());
    }
}
