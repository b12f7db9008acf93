use gambit_core::{RunningStats, Strategy};
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{check_len, positive, snapshot_of, uniform, unit_open};
use crate::Result;

/// Softmax with a Gibbs distribution (Luce, 1959): lever `i` is pulled with
/// probability proportional to `exp(mean_i / temperature)`.
#[derive(Debug)]
pub struct SoftMax {
    temperature: f64,
    stats: RunningStats,
    rng: StdRng,
}

impl SoftMax {
    pub fn new(temperature: f64) -> Result<Self> {
        Self::with_rng(temperature, StdRng::from_entropy())
    }

    pub fn with_rng(temperature: f64, rng: StdRng) -> Result<Self> {
        Ok(Self {
            temperature: positive("temperature", temperature)?,
            stats: RunningStats::default(),
            rng,
        })
    }

    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Normalized selection probabilities for the current statistics.
    #[must_use]
    pub fn probabilities(&self) -> Vec<f64> {
        let weights = self.weights();
        let total: f64 = weights.iter().sum();
        weights.into_iter().map(|w| w / total).collect()
    }

    fn weights(&self) -> Vec<f64> {
        let n = self.stats.lever_count();
        let means: Vec<f64> = (0..n).map(|i| self.stats.mean_or_zero(i)).collect();
        // shifting by the max mean keeps exp() finite and leaves the ratios intact
        let max = means.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        means
            .iter()
            .map(|m| ((m - max) / self.temperature).exp())
            .collect()
    }
}

impl Strategy for SoftMax {
    fn name(&self) -> &'static str {
        "soft_max"
    }

    fn set_lever_count(&mut self, lever_count: usize) {
        self.stats.reset(lever_count);
    }

    fn reset(&mut self) {
        self.stats.reset(self.stats.lever_count());
    }

    fn play(&mut self, _horizon: u32) -> usize {
        let n = self.stats.lever_count();
        if n == 0 {
            return 0;
        }
        match WeightedIndex::new(self.weights()) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => uniform(&mut self.rng, n),
        }
    }

    fn observe(&mut self, index: usize, reward: f64) {
        self.stats.observe(index, reward);
    }

    fn observe_n(&mut self, index: usize, reward: f64, n: u64) {
        self.stats.observe_n(index, reward, n);
    }

    fn stats(&self) -> &RunningStats {
        &self.stats
    }

    fn snapshot(&self) -> Value {
        snapshot_of(&self.stats)
    }

    fn load(&mut self, snapshot: Value) -> serde_json::Result<()> {
        self.stats = serde_json::from_value(snapshot)?;
        Ok(())
    }
}

/// SoftMix (Cesa-Bianchi and Fischer, 1998): a softmax variant with a
/// decreasing exploration rate `gamma_t` and importance-weighted scores.
#[derive(Debug)]
pub struct SoftMix {
    d: f64,
    scores: Vec<f64>,
    /// `gamma_t` and argmax of the last `play`, reused by `observe`.
    gamma: f64,
    max_index: usize,
    stats: RunningStats,
    rng: StdRng,
}

impl SoftMix {
    pub fn new(d: f64) -> Result<Self> {
        Self::with_rng(d, StdRng::from_entropy())
    }

    pub fn with_rng(d: f64, rng: StdRng) -> Result<Self> {
        Ok(Self {
            d: unit_open("d", d)?,
            scores: Vec::new(),
            gamma: 1.0,
            max_index: 0,
            stats: RunningStats::default(),
            rng,
        })
    }

    #[must_use]
    pub fn d(&self) -> f64 {
        self.d
    }

    #[must_use]
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Exploration rate for the current round:
    /// `min(1, 5 K ln(t - 1) / (d^2 (t - 1)))`, and 1 for `t <= 2`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn current_gamma(&self) -> f64 {
        let t = self.stats.round_index();
        if t <= 2 {
            return 1.0;
        }
        let t = (t - 1) as f64;
        let k = self.stats.lever_count() as f64;
        (5.0 * k * t.ln() / (self.d * self.d * t)).min(1.0)
    }

    /// Importance-weighted score update for `times` equal rewards, using the
    /// `gamma_t` and argmax of the last `play`.
    #[allow(clippy::cast_precision_loss)]
    fn credit(&mut self, index: usize, reward: f64, times: f64) {
        let k = self.scores.len() as f64;
        let share = self.gamma / k;
        let probability = if index == self.max_index {
            1.0 - self.gamma + share
        } else {
            share
        };
        self.scores[index] += times * reward / probability;
    }

    fn argmax(&self) -> usize {
        let mut best = 0;
        let mut max = f64::NEG_INFINITY;
        for (i, &s) in self.scores.iter().enumerate() {
            if s > max {
                max = s;
                best = i;
            }
        }
        best
    }
}

#[derive(Serialize, Deserialize)]
struct SoftMixState {
    stats: RunningStats,
    scores: Vec<f64>,
    gamma: f64,
    max_index: usize,
}

impl Strategy for SoftMix {
    fn name(&self) -> &'static str {
        "soft_mix"
    }

    fn set_lever_count(&mut self, lever_count: usize) {
        self.stats.reset(lever_count);
        self.scores = vec![0.0; lever_count];
        self.gamma = 1.0;
        self.max_index = 0;
    }

    fn reset(&mut self) {
        self.set_lever_count(self.stats.lever_count());
    }

    fn play(&mut self, _horizon: u32) -> usize {
        let n = self.stats.lever_count();
        if n == 0 {
            return 0;
        }
        self.gamma = self.current_gamma();
        self.max_index = self.argmax();

        if self.rng.gen::<f64>() < self.gamma {
            uniform(&mut self.rng, n)
        } else {
            self.max_index
        }
    }

    fn observe(&mut self, index: usize, reward: f64) {
        if self.stats.observe(index, reward) {
            self.credit(index, reward, 1.0);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn observe_n(&mut self, index: usize, reward: f64, n: u64) {
        if self.stats.observe_n(index, reward, n) {
            self.credit(index, reward, n as f64);
        }
    }

    fn stats(&self) -> &RunningStats {
        &self.stats
    }

    fn snapshot(&self) -> Value {
        snapshot_of(&SoftMixState {
            stats: self.stats.clone(),
            scores: self.scores.clone(),
            gamma: self.gamma,
            max_index: self.max_index,
        })
    }

    fn load(&mut self, snapshot: Value) -> serde_json::Result<()> {
        let state: SoftMixState = serde_json::from_value(snapshot)?;
        check_len("scores", state.scores.len(), &state.stats)?;
        self.stats = state.stats;
        self.scores = state.scores;
        self.gamma = state.gamma;
        self.max_index = state.max_index;
        Ok(())
    }
}
