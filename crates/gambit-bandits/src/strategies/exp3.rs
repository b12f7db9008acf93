use gambit_core::{RunningStats, Strategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{check_len, snapshot_of, unit_left_open};
use crate::Result;

/// Weights beyond this magnitude are considered blown up.
const WEIGHT_LIMIT: f64 = 1e10;

/// Exponential weights for exploration and exploitation (Auer, Cesa-Bianchi,
/// Freund and Schapire, "The nonstochastic multiarmed bandit problem").
///
/// Makes no stochastic assumption about the rewards.
#[derive(Debug)]
pub struct Exp3 {
    gamma: f64,
    weights: Vec<f64>,
    weight_sum: f64,
    /// Selection probabilities of the last `play`.
    probabilities: Vec<f64>,
    stats: RunningStats,
    rng: StdRng,
}

impl Exp3 {
    pub fn new(gamma: f64) -> Result<Self> {
        Self::with_rng(gamma, StdRng::from_entropy())
    }

    pub fn with_rng(gamma: f64, rng: StdRng) -> Result<Self> {
        Ok(Self {
            gamma: unit_left_open("gamma", gamma)?,
            weights: Vec::new(),
            weight_sum: 0.0,
            probabilities: Vec::new(),
            stats: RunningStats::default(),
            rng,
        })
    }

    #[must_use]
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    #[must_use]
    pub fn weight(&self, index: usize) -> Option<f64> {
        self.weights.get(index).copied()
    }

    #[must_use]
    pub fn weight_sum(&self) -> f64 {
        self.weight_sum
    }

    #[must_use]
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Multiplies the weight of `index` by `exp(gamma * reward / (p * K))`
    /// once per observation, with `p` from the last `play`.
    #[allow(clippy::cast_precision_loss)]
    fn reweight(&mut self, index: usize, reward: f64, times: f64) {
        let k = self.weights.len() as f64;
        let p = self.probabilities[index];

        self.weight_sum -= self.weights[index];
        let mut w = self.weights[index] * (times * self.gamma * reward / (p * k)).exp();
        if !w.is_finite() || w.abs() > WEIGHT_LIMIT {
            debug_event!("exp3 weight of lever {index} overflowed, resetting to 1");
            w = 1.0;
        }
        self.weights[index] = w;
        self.weight_sum += w;
    }

    #[allow(clippy::cast_precision_loss)]
    fn refresh_probabilities(&mut self) {
        let k = self.weights.len() as f64;
        for (p, w) in self.probabilities.iter_mut().zip(&self.weights) {
            *p = (1.0 - self.gamma) * w / self.weight_sum + self.gamma / k;
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Exp3State {
    stats: RunningStats,
    weights: Vec<f64>,
    probabilities: Vec<f64>,
}

impl Strategy for Exp3 {
    fn name(&self) -> &'static str {
        "exp3"
    }

    #[allow(clippy::cast_precision_loss)]
    fn set_lever_count(&mut self, lever_count: usize) {
        self.stats.reset(lever_count);
        self.weights = vec![1.0; lever_count];
        self.weight_sum = lever_count as f64;
        self.probabilities = vec![1.0 / lever_count.max(1) as f64; lever_count];
    }

    fn reset(&mut self) {
        self.set_lever_count(self.stats.lever_count());
    }

    fn play(&mut self, _horizon: u32) -> usize {
        let n = self.weights.len();
        if n == 0 {
            return 0;
        }
        self.refresh_probabilities();

        let threshold = self.rng.gen::<f64>();
        let mut cumulative = 0.0;
        for (i, p) in self.probabilities.iter().enumerate() {
            cumulative += p;
            if threshold <= cumulative {
                return i;
            }
        }
        // rounding left the cumulative sum just below one
        n - 1
    }

    fn observe(&mut self, index: usize, reward: f64) {
        if self.stats.observe(index, reward) {
            self.reweight(index, reward, 1.0);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn observe_n(&mut self, index: usize, reward: f64, n: u64) {
        if self.stats.observe_n(index, reward, n) {
            self.reweight(index, reward, n as f64);
        }
    }

    fn stats(&self) -> &RunningStats {
        &self.stats
    }

    fn snapshot(&self) -> Value {
        snapshot_of(&Exp3State {
            stats: self.stats.clone(),
            weights: self.weights.clone(),
            probabilities: self.probabilities.clone(),
        })
    }

    fn load(&mut self, snapshot: Value) -> serde_json::Result<()> {
        let state: Exp3State = serde_json::from_value(snapshot)?;
        check_len("weights", state.weights.len(), &state.stats)?;
        check_len("probabilities", state.probabilities.len(), &state.stats)?;
        self.weight_sum = state.weights.iter().sum();
        self.stats = state.stats;
        self.weights = state.weights;
        self.probabilities = state.probabilities;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp3(gamma: f64, levers: usize) -> Exp3 {
        let mut s = Exp3::with_rng(gamma, StdRng::seed_from_u64(7)).unwrap();
        s.set_lever_count(levers);
        s
    }

    #[test]
    fn rejects_gamma_outside_left_open_unit_interval() {
        assert!(Exp3::new(0.0).is_err());
        assert!(Exp3::new(1.1).is_err());
        assert!(Exp3::new(1.0).is_ok());
    }

    #[test]
    fn probabilities_sum_to_one() {
        let mut s = exp3(0.2, 3);
        s.observe(1, 1.0);
        let _ = s.play(1);
        let total: f64 = s.probabilities().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rewarded_lever_gains_weight() {
        let mut s = exp3(0.5, 2);
        let _ = s.play(1);
        s.observe(0, 1.0);
        assert!(s.weight(0).unwrap() > 1.0);
        assert!((s.weight_sum() - s.weight(0).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weight_beyond_limit_is_reset() {
        let mut s = exp3(0.5, 2);
        let _ = s.play(1);
        // uniform probabilities: exponent = 0.5 * 50 / (0.5 * 2) = 25, e^25 > 1e10
        s.observe(0, 50.0);
        assert!((s.weight(0).unwrap() - 1.0).abs() < f64::EPSILON);
        assert!((s.weight_sum() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn non_finite_weight_is_reset() {
        let mut s = exp3(1.0, 2);
        s.observe(1, f64::INFINITY);
        assert!((s.weight(1).unwrap() - 1.0).abs() < f64::EPSILON);
        s.observe(1, f64::NAN);
        assert!((s.weight(1).unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_levers_play_zero() {
        let mut s = exp3(0.5, 0);
        assert_eq!(s.play(1), 0);
        s.observe(0, 1.0);
        assert_eq!(s.weight(0), None);
    }

    #[test]
    fn snapshot_carries_weights_across_instances() {
        let mut s = exp3(0.3, 3);
        for _ in 0..5 {
            let i = s.play(1);
            s.observe(i, 1.0);
        }
        let mut restored = exp3(0.3, 3);
        restored.load(s.snapshot()).unwrap();
        for i in 0..3 {
            let (a, b) = (s.weight(i).unwrap(), restored.weight(i).unwrap());
            assert!((a - b).abs() <= 1e-12 * a.max(1.0), "{a} vs {b}");
        }
        assert!((s.weight_sum() - restored.weight_sum()).abs() <= 1e-9 * s.weight_sum());
    }

    #[test]
    fn bulk_observation_compounds_the_weight() {
        let mut bulk = exp3(0.5, 2);
        let mut single = exp3(0.5, 2);
        bulk.observe_n(0, 1.0, 3);
        for _ in 0..3 {
            single.observe(0, 1.0);
        }
        let (a, b) = (bulk.weight(0).unwrap(), single.weight(0).unwrap());
        assert!((a - b).abs() <= 1e-9 * b, "{a} vs {b}");
    }

    #[test]
    fn ragged_weights_are_rejected() {
        let mut s = exp3(0.3, 2);
        let mut doc = s.snapshot();
        doc["weights"] = serde_json::json!([1.0]);
        let err = s.load(doc).unwrap_err();
        assert!(err.to_string().contains("weights"), "{err}");
        assert_eq!(s.weight(1), Some(1.0));
    }
}
