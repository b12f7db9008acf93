//! The strategy library.
//!
//! Every strategy composes a [`RunningStats`] and owns its random source, so
//! two instances never share a generator and a seeded instance is fully
//! reproducible.

mod epsilon;
mod estimation;
mod exp3;
mod softmax;

pub use epsilon::{EpsilonDecreasing, EpsilonFirst, EpsilonGreedy, LeastTaken, PureLuck};
pub use estimation::{GaussMatch, IntervalEstimation, Poker};
pub use exp3::Exp3;
pub use softmax::{SoftMax, SoftMix};

use gambit_core::RunningStats;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{BanditError, Result};

/// Uniform lever in `0..lever_count`, or 0 when there are no levers.
pub(crate) fn uniform<R: Rng + ?Sized>(rng: &mut R, lever_count: usize) -> usize {
    if lever_count == 0 {
        0
    } else {
        rng.gen_range(0..lever_count)
    }
}

/// Uniformly chosen lever among the never-observed ones.
pub(crate) fn random_unobserved<R: Rng + ?Sized>(
    rng: &mut R,
    stats: &RunningStats,
) -> Option<usize> {
    stats.unobserved_levers().choose(rng).copied()
}

/// Warm-up shared by the estimation strategies: keep replaying the last
/// pulled lever while it has exactly one observation, otherwise pull a random
/// one, until some lever has been observed twice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Bootstrap {
    last_pulled: usize,
}

impl Bootstrap {
    pub(crate) fn pending(stats: &RunningStats) -> bool {
        stats.observed_lever_count() < 1 || stats.twice_observed_lever_count() < 1
    }

    pub(crate) fn play<R: Rng + ?Sized>(&mut self, rng: &mut R, stats: &RunningStats) -> usize {
        if stats.count(self.last_pulled) == 1 {
            return self.last_pulled;
        }
        self.last_pulled = uniform(rng, stats.lever_count());
        self.last_pulled
    }

    pub(crate) fn record(&mut self, index: usize) {
        self.last_pulled = index;
    }

    pub(crate) fn reset(&mut self) {
        self.last_pulled = 0;
    }
}

/// Learning state as JSON. Only maps with non-string keys can fail to
/// serialize, and no strategy state has one.
pub(crate) fn snapshot_of<S: Serialize>(state: &S) -> Value {
    serde_json::to_value(state).unwrap_or(Value::Null)
}

/// Rejects a restored per-lever vector whose length disagrees with the
/// restored statistics.
pub(crate) fn check_len(what: &str, len: usize, stats: &RunningStats) -> serde_json::Result<()> {
    if len == stats.lever_count() {
        Ok(())
    } else {
        Err(serde_json::Error::custom(format!(
            "{what} has {len} entries for {} levers",
            stats.lever_count()
        )))
    }
}

fn invalid(name: &'static str, value: f64, expected: &'static str) -> BanditError {
    BanditError::InvalidParameter {
        name,
        value,
        expected,
    }
}

/// `value` in `[0, 1]`.
pub(crate) fn unit_closed(name: &'static str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(invalid(name, value, "[0, 1]"))
    }
}

/// `value` in `(0, 1)`.
pub(crate) fn unit_open(name: &'static str, value: f64) -> Result<f64> {
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(invalid(name, value, "(0, 1)"))
    }
}

/// `value` in `(0, 1]`.
pub(crate) fn unit_left_open(name: &'static str, value: f64) -> Result<f64> {
    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(invalid(name, value, "(0, 1]"))
    }
}

/// `value` in `(0, +inf)`, finite.
pub(crate) fn positive(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(invalid(name, value, "(0, +inf)"))
    }
}
