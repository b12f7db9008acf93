//! Core traits and running statistics for gambit.
//!
//! A [`Strategy`] decides which lever of a multi-armed bandit to pull next and
//! learns from the rewards it is fed back. Most strategies are built on top of
//! [`RunningStats`], which keeps per-lever aggregates and the cross-lever sums
//! derived from them up to date after every observation.

mod stats;

pub use stats::{LeverSummary, RunningStats};

use std::fmt;

use serde_json::Value;

/// A bandit strategy over a fixed number of interchangeable levers.
///
/// Implementations are not internally synchronized; owners wrap them in a lock
/// when they are shared between threads.
pub trait Strategy: Send + fmt::Debug {
    /// Stable snake_case name of the algorithm.
    fn name(&self) -> &'static str;

    /// Number of levers the strategy currently chooses from.
    fn lever_count(&self) -> usize {
        self.stats().lever_count()
    }

    /// Resizes the lever space. Always performs a full [`Strategy::reset`].
    fn set_lever_count(&mut self, lever_count: usize);

    /// Zeroes every statistic and reallocates per-lever state.
    fn reset(&mut self);

    /// Returns the index of the lever to pull, in `0..lever_count`.
    ///
    /// `horizon` is the caller's estimate of the remaining rounds. With no
    /// levers the strategy returns 0.
    fn play(&mut self, horizon: u32) -> usize;

    /// Records `reward` for a lever previously returned by [`Strategy::play`].
    /// Out-of-range indices are ignored.
    fn observe(&mut self, index: usize, reward: f64);

    /// Records `n` observations of the same reward with no `play` in
    /// between, in constant time. Used to rebuild a strategy from tallies.
    fn observe_n(&mut self, index: usize, reward: f64, n: u64);

    /// Internal learning state (statistics, weights, phase counters) as
    /// JSON. The random source is not part of it.
    fn snapshot(&self) -> Value;

    /// Restores a [`Strategy::snapshot`] taken from an instance with the same
    /// configuration. On error the strategy is left unchanged.
    fn load(&mut self, snapshot: Value) -> Result<(), serde_json::Error>;

    /// Running statistics collected so far.
    fn stats(&self) -> &RunningStats;
}
