//! The epsilon family: greedy on the empirical mean, with random pulls mixed
//! in according to an exploration schedule.

use gambit_core::{RunningStats, Strategy};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{positive, snapshot_of, uniform, unit_closed};
use crate::Result;

/// Means closer than this to the best one count as tied.
const TIE_TOLERANCE: f64 = 0.0001;

/// Epsilon-greedy with a cold-start sweep.
///
/// Every never-played lever is pulled once, in index order, before any
/// randomness. Afterwards a uniformly random lever is pulled with probability
/// `epsilon`, otherwise the best empirical mean. Ties within
/// `TIE_TOLERANCE` are broken uniformly, so all-zero means do not always
/// favour the same lever.
#[derive(Debug)]
pub struct EpsilonGreedy {
    epsilon: f64,
    stats: RunningStats,
    rng: StdRng,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64) -> Result<Self> {
        Self::with_rng(epsilon, StdRng::from_entropy())
    }

    pub fn with_rng(epsilon: f64, rng: StdRng) -> Result<Self> {
        Ok(Self {
            epsilon: unit_closed("epsilon", epsilon)?,
            stats: RunningStats::default(),
            rng,
        })
    }

    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn tied_greedy(&mut self) -> usize {
        let n = self.stats.lever_count();
        let best = (0..n)
            .map(|i| self.stats.mean_or_zero(i))
            .fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<usize> = (0..n)
            .filter(|&i| (self.stats.mean_or_zero(i) - best).abs() <= TIE_TOLERANCE)
            .collect();
        tied.choose(&mut self.rng).copied().unwrap_or(0)
    }
}

impl Strategy for EpsilonGreedy {
    fn name(&self) -> &'static str {
        "epsilon_greedy"
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
        if let Some(index) = self.stats.first_unobserved() {
            return index;
        }
        if self.rng.gen::<f64>() < self.epsilon || self.stats.round_index() == 0 {
            return uniform(&mut self.rng, n);
        }
        self.tied_greedy()
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

/// The classic 50/50 (A/B/n) split: epsilon-greedy with `epsilon = 1`.
#[derive(Debug)]
pub struct PureLuck(EpsilonGreedy);

impl PureLuck {
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    #[must_use]
    pub fn with_rng(rng: StdRng) -> Self {
        Self(EpsilonGreedy {
            epsilon: 1.0,
            stats: RunningStats::default(),
            rng,
        })
    }
}

impl Default for PureLuck {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for PureLuck {
    fn name(&self) -> &'static str {
        "pure_luck"
    }

    fn set_lever_count(&mut self, lever_count: usize) {
        self.0.set_lever_count(lever_count);
    }

    fn reset(&mut self) {
        self.0.reset();
    }

    fn play(&mut self, horizon: u32) -> usize {
        self.0.play(horizon)
    }

    fn observe(&mut self, index: usize, reward: f64) {
        self.0.observe(index, reward);
    }

    fn observe_n(&mut self, index: usize, reward: f64, n: u64) {
        self.0.observe_n(index, reward, n);
    }

    fn stats(&self) -> &RunningStats {
        self.0.stats()
    }

    fn snapshot(&self) -> Value {
        self.0.snapshot()
    }

    fn load(&mut self, snapshot: Value) -> serde_json::Result<()> {
        self.0.load(snapshot)
    }
}

/// Epsilon-greedy whose exploration rate decays as `epsilon_zero / t`.
///
/// See Auer, Cesa-Bianchi and Fischer, "Finite-time analysis of the
/// multiarmed bandit problem" (2002).
#[derive(Debug)]
pub struct EpsilonDecreasing {
    epsilon_zero: f64,
    stats: RunningStats,
    rng: StdRng,
}

impl EpsilonDecreasing {
    pub fn new(epsilon_zero: f64) -> Result<Self> {
        Self::with_rng(epsilon_zero, StdRng::from_entropy())
    }

    pub fn with_rng(epsilon_zero: f64, rng: StdRng) -> Result<Self> {
        Ok(Self {
            epsilon_zero: positive("epsilon_zero", epsilon_zero)?,
            stats: RunningStats::default(),
            rng,
        })
    }

    #[must_use]
    pub fn epsilon_zero(&self) -> f64 {
        self.epsilon_zero
    }

    /// Exploration probability for the current round.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn current_epsilon(&self) -> f64 {
        let round = self.stats.round_index();
        if round == 0 {
            return 1.0;
        }
        (self.epsilon_zero / round as f64).min(1.0)
    }
}

impl Strategy for EpsilonDecreasing {
    fn name(&self) -> &'static str {
        "epsilon_decreasing"
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
        if self.rng.gen::<f64>() < self.current_epsilon() {
            uniform(&mut self.rng, n)
        } else {
            self.stats.greedy_index()
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

/// Pure exploration for the first `floor(epsilon * horizon)` rounds, pure
/// exploitation afterwards.
///
/// Not horizon-agnostic: the horizon passed to the very first `play` fixes
/// the length of the exploration phase (Even-Dar, Mannor and Mansour, 2002).
#[derive(Debug)]
pub struct EpsilonFirst {
    epsilon: f64,
    remaining_exploration: u64,
    stats: RunningStats,
    rng: StdRng,
}

impl EpsilonFirst {
    pub fn new(epsilon: f64) -> Result<Self> {
        Self::with_rng(epsilon, StdRng::from_entropy())
    }

    pub fn with_rng(epsilon: f64, rng: StdRng) -> Result<Self> {
        Ok(Self {
            epsilon: unit_closed("epsilon", epsilon)?,
            remaining_exploration: 0,
            stats: RunningStats::default(),
            rng,
        })
    }

    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Random rounds left before the strategy turns greedy.
    #[must_use]
    pub fn remaining_exploration(&self) -> u64 {
        self.remaining_exploration
    }
}

#[derive(Serialize, Deserialize)]
struct EpsilonFirstState {
    stats: RunningStats,
    remaining_exploration: u64,
}

impl Strategy for EpsilonFirst {
    fn name(&self) -> &'static str {
        "epsilon_first"
    }

    fn set_lever_count(&mut self, lever_count: usize) {
        self.stats.reset(lever_count);
        self.remaining_exploration = 0;
    }

    fn reset(&mut self) {
        self.set_lever_count(self.stats.lever_count());
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn play(&mut self, horizon: u32) -> usize {
        let n = self.stats.lever_count();
        if n == 0 {
            return 0;
        }
        if self.stats.round_index() == 0 {
            self.remaining_exploration = (self.epsilon * f64::from(horizon)).floor() as u64;
        }
        if self.remaining_exploration > 0 {
            self.remaining_exploration -= 1;
            return uniform(&mut self.rng, n);
        }
        self.stats.greedy_index()
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
        snapshot_of(&EpsilonFirstState {
            stats: self.stats.clone(),
            remaining_exploration: self.remaining_exploration,
        })
    }

    fn load(&mut self, snapshot: Value) -> serde_json::Result<()> {
        let state: EpsilonFirstState = serde_json::from_value(snapshot)?;
        self.stats = state.stats;
        self.remaining_exploration = state.remaining_exploration;
        Ok(())
    }
}

/// Forces the least observed lever with probability
/// `epsilon_zero * 4 / (4 + min_count^2)`, otherwise plays greedily.
#[derive(Debug)]
pub struct LeastTaken {
    epsilon_zero: f64,
    stats: RunningStats,
    rng: StdRng,
}

impl LeastTaken {
    pub fn new(epsilon_zero: f64) -> Result<Self> {
        Self::with_rng(epsilon_zero, StdRng::from_entropy())
    }

    pub fn with_rng(epsilon_zero: f64, rng: StdRng) -> Result<Self> {
        Ok(Self {
            epsilon_zero: positive("epsilon_zero", epsilon_zero)?,
            stats: RunningStats::default(),
            rng,
        })
    }

    #[must_use]
    pub fn epsilon_zero(&self) -> f64 {
        self.epsilon_zero
    }

    /// Probability of forcing the least observed lever this round.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn current_epsilon(&self) -> f64 {
        let least = self.stats.least_observed_index();
        let min_count = self.stats.count(least) as f64;
        self.epsilon_zero * 4.0 / (4.0 + min_count * min_count)
    }
}

impl Strategy for LeastTaken {
    fn name(&self) -> &'static str {
        "least_taken"
    }

    fn set_lever_count(&mut self, lever_count: usize) {
        self.stats.reset(lever_count);
    }

    fn reset(&mut self) {
        self.stats.reset(self.stats.lever_count());
    }

    fn play(&mut self, _horizon: u32) -> usize {
        if self.stats.lever_count() == 0 {
            return 0;
        }
        let least = self.stats.least_observed_index();
        if self.rng.gen::<f64>() < self.current_epsilon() {
            least
        } else {
            self.stats.greedy_index()
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
