#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Banditen-Strategien und der Auswahl-Koordinator.
//!
//! Der [`Coordinator`] verwaltet eine geordnete Liste von [`Choice`]s und genau
//! eine aktive Strategie. Jede Empfehlung (`get_next`) wird sofort als
//! Beobachtung mit Belohnung 0 verbucht; ein später gemeldeter Erfolg
//! (`succeeded`) ist eine zusätzliche, positive Beobachtung.
//!
//! Verfügbare Strategien: [`PureLuck`], [`EpsilonGreedy`],
//! [`EpsilonDecreasing`], [`EpsilonFirst`], [`LeastTaken`],
//! [`IntervalEstimation`], [`GaussMatch`], [`Poker`], [`SoftMax`], [`SoftMix`]
//! und [`Exp3`]. Ausgewählt wird per [`StrategyConfig`].

#[macro_use]
mod log;

mod choice;
mod config;
mod coordinator;
mod error;
mod gauss;
mod persist;
pub mod strategies;

pub use choice::{Choice, Tally};
pub use config::StrategyConfig;
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use error::{BanditError, Result};
pub use persist::SNAPSHOT_VERSION;
pub use strategies::{
    EpsilonDecreasing, EpsilonFirst, EpsilonGreedy, Exp3, GaussMatch, IntervalEstimation,
    LeastTaken, Poker, PureLuck, SoftMax, SoftMix,
};

pub use gambit_core::{LeverSummary, RunningStats, Strategy};
