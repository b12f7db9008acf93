//! Strategies pricing each lever from a normal approximation of its mean.
//!
//! All three share the same warm-up ([`Bootstrap`]). Levers without a usable
//! spread estimate borrow the cross-lever averages.

use gambit_core::{RunningStats, Strategy};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{positive, random_unobserved, snapshot_of, uniform, unit_open, Bootstrap};
use crate::{gauss, Result};

/// Learning state shared by the three estimation strategies.
#[derive(Serialize, Deserialize)]
struct EstimationState {
    stats: RunningStats,
    bootstrap: Bootstrap,
}

#[allow(clippy::cast_precision_loss)]
fn sqrt_count(stats: &RunningStats, index: usize) -> f64 {
    (stats.count(index).max(1) as f64).sqrt()
}

/// Interval estimation (Kaelbling, 1993).
///
/// Pulls the lever whose `1 - alpha` upper quantile of the estimated mean is
/// highest. Smaller `alpha` means more exploration.
#[derive(Debug)]
pub struct IntervalEstimation {
    alpha: f64,
    bootstrap: Bootstrap,
    stats: RunningStats,
    rng: StdRng,
}

impl IntervalEstimation {
    pub fn new(alpha: f64) -> Result<Self> {
        Self::with_rng(alpha, StdRng::from_entropy())
    }

    pub fn with_rng(alpha: f64, rng: StdRng) -> Result<Self> {
        Ok(Self {
            alpha: unit_open("alpha", alpha)?,
            bootstrap: Bootstrap::default(),
            stats: RunningStats::default(),
            rng,
        })
    }

    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    fn price(&self, mean: f64, sigma: f64, sqrt_count: f64) -> f64 {
        gauss::quantile(mean, sigma / sqrt_count, 1.0 - self.alpha)
    }
}

impl Strategy for IntervalEstimation {
    fn name(&self) -> &'static str {
        "interval_estimation"
    }

    fn set_lever_count(&mut self, lever_count: usize) {
        self.stats.reset(lever_count);
        self.bootstrap.reset();
    }

    fn reset(&mut self) {
        self.set_lever_count(self.stats.lever_count());
    }

    fn play(&mut self, _horizon: u32) -> usize {
        let n = self.stats.lever_count();
        if n == 0 {
            return 0;
        }
        if Bootstrap::pending(&self.stats) {
            return self.bootstrap.play(&mut self.rng, &self.stats);
        }

        let average_sigma = self.stats.average_sigma().unwrap_or(0.0);
        let mut max_price = f64::NEG_INFINITY;
        let mut choice = 0;

        for i in 0..n {
            let Some(mean) = self.stats.mean(i) else {
                continue;
            };
            // a single observation has no sigma of its own
            let sigma = self.stats.sigma(i).unwrap_or(average_sigma);
            let price = self.price(mean, sigma, sqrt_count(&self.stats, i));
            if price > max_price {
                max_price = price;
                choice = i;
            }
        }

        if self.stats.observed_lever_count() < n {
            let average_mean = self.stats.average_mean().unwrap_or(0.0);
            if self.price(average_mean, average_sigma, 1.0) > max_price {
                if let Some(i) = random_unobserved(&mut self.rng, &self.stats) {
                    choice = i;
                }
            }
        }

        self.bootstrap.record(choice);
        choice
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
        snapshot_of(&EstimationState {
            stats: self.stats.clone(),
            bootstrap: self.bootstrap.clone(),
        })
    }

    fn load(&mut self, snapshot: Value) -> serde_json::Result<()> {
        let state: EstimationState = serde_json::from_value(snapshot)?;
        self.stats = state.stats;
        self.bootstrap = state.bootstrap;
        Ok(())
    }
}

/// Gaussian matching, a Thompson-sampling style variant of interval
/// estimation (after Rivest and Yin, 1993).
///
/// Draws one deviate per lever from `Normal(mean, sigma * skew / sqrt(n))`
/// and pulls the lever with the largest draw.
#[derive(Debug)]
pub struct GaussMatch {
    skew: f64,
    bootstrap: Bootstrap,
    stats: RunningStats,
    rng: StdRng,
}

impl GaussMatch {
    pub fn new(skew: f64) -> Result<Self> {
        Self::with_rng(skew, StdRng::from_entropy())
    }

    pub fn with_rng(skew: f64, rng: StdRng) -> Result<Self> {
        Ok(Self {
            skew: positive("skew", skew)?,
            bootstrap: Bootstrap::default(),
            stats: RunningStats::default(),
            rng,
        })
    }

    #[must_use]
    pub fn skew(&self) -> f64 {
        self.skew
    }
}

impl Strategy for GaussMatch {
    fn name(&self) -> &'static str {
        "gauss_match"
    }

    fn set_lever_count(&mut self, lever_count: usize) {
        self.stats.reset(lever_count);
        self.bootstrap.reset();
    }

    fn reset(&mut self) {
        self.set_lever_count(self.stats.lever_count());
    }

    fn play(&mut self, _horizon: u32) -> usize {
        let n = self.stats.lever_count();
        if n == 0 {
            return 0;
        }
        if Bootstrap::pending(&self.stats) {
            return self.bootstrap.play(&mut self.rng, &self.stats);
        }

        let average_mean = self.stats.average_mean().unwrap_or(0.0);
        let average_sigma = self.stats.average_sigma().unwrap_or(0.0);
        let mut max_deviate = f64::NEG_INFINITY;
        let mut choice = 0;

        for i in 0..n {
            let mean = self.stats.mean(i).unwrap_or(average_mean);
            let sigma = self.stats.sigma(i).unwrap_or(average_sigma);
            let sd = sigma * self.skew / sqrt_count(&self.stats, i);
            let deviate = gauss::sample(&mut self.rng, mean, sd);
            if deviate > max_deviate {
                max_deviate = deviate;
                choice = i;
            }
        }

        self.bootstrap.record(choice);
        choice
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
        snapshot_of(&EstimationState {
            stats: self.stats.clone(),
            bootstrap: self.bootstrap.clone(),
        })
    }

    fn load(&mut self, snapshot: Value) -> serde_json::Result<()> {
        let state: EstimationState = serde_json::from_value(snapshot)?;
        self.stats = state.stats;
        self.bootstrap = state.bootstrap;
        Ok(())
    }
}

/// POKER, the "price of knowledge and estimated reward" strategy
/// (Vermorel and Mohri, 2005).
///
/// Each lever is priced as its mean plus the expected long-term gain of
/// discovering that it beats the current best by `delta`, scaled by the
/// horizon.
#[derive(Debug)]
pub struct Poker {
    bootstrap: Bootstrap,
    stats: RunningStats,
    rng: StdRng,
}

impl Poker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    #[must_use]
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            bootstrap: Bootstrap::default(),
            stats: RunningStats::default(),
            rng,
        }
    }

    /// Sigma used for lever `i`: its own when observed twice and non-zero,
    /// the cross-lever average otherwise.
    fn sigma(&self, i: usize, average_sigma: f64) -> f64 {
        match self.stats.sigma(i) {
            Some(sigma) if sigma > 0.0 => sigma,
            _ => average_sigma,
        }
    }
}

impl Default for Poker {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for Poker {
    fn name(&self) -> &'static str {
        "poker"
    }

    fn set_lever_count(&mut self, lever_count: usize) {
        self.stats.reset(lever_count);
        self.bootstrap.reset();
    }

    fn reset(&mut self) {
        self.set_lever_count(self.stats.lever_count());
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn play(&mut self, horizon: u32) -> usize {
        let n = self.stats.lever_count();
        if n == 0 {
            return 0;
        }
        // without any spread the prices below are undefined
        if Bootstrap::pending(&self.stats) || self.stats.lever_sigma_sum() <= 0.0 {
            return self.bootstrap.play(&mut self.rng, &self.stats);
        }

        let mut means: Vec<f64> = (0..n).filter_map(|i| self.stats.mean(i)).collect();
        means.sort_by(f64::total_cmp);
        let k = (means.len() as f64).sqrt().ceil() as usize;
        if k <= 1 {
            let choice = uniform(&mut self.rng, n);
            self.bootstrap.record(choice);
            return choice;
        }

        let top = means[means.len() - 1];
        let delta = (top - means[means.len() - k]) / (k - 1) as f64;
        let horizon = f64::from(horizon);
        let average_sigma = self.stats.average_sigma().unwrap_or(0.0);

        let mut max_price = f64::NEG_INFINITY;
        let mut choice = 0;
        for i in 0..n {
            let Some(mean) = self.stats.mean(i) else {
                continue;
            };
            let sd = self.sigma(i, average_sigma) / (self.stats.count(i) as f64).sqrt();
            let proba = gauss::survival(mean, sd, top + delta);
            let price = mean + horizon * delta * proba;
            if price > max_price {
                max_price = price;
                choice = i;
            }
        }

        let observed = self.stats.observed_lever_count();
        if observed < n {
            let average_mean = self.stats.average_mean().unwrap_or(0.0);
            let unobserved_price = average_mean + horizon * delta / observed as f64;
            if unobserved_price > max_price {
                if let Some(i) = random_unobserved(&mut self.rng, &self.stats) {
                    choice = i;
                }
            }
        }

        self.bootstrap.record(choice);
        choice
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
        snapshot_of(&EstimationState {
            stats: self.stats.clone(),
            bootstrap: self.bootstrap.clone(),
        })
    }

    fn load(&mut self, snapshot: Value) -> serde_json::Result<()> {
        let state: EstimationState = serde_json::from_value(snapshot)?;
        self.stats = state.stats;
        self.bootstrap = state.bootstrap;
        Ok(())
    }
}
