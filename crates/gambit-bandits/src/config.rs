use gambit_core::Strategy;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::strategies::{
    EpsilonDecreasing, EpsilonFirst, EpsilonGreedy, Exp3, GaussMatch, IntervalEstimation,
    LeastTaken, Poker, PureLuck, SoftMax, SoftMix,
};
use crate::{BanditError, Result};

/// Which strategy a coordinator runs, together with its tunable.
///
/// Persisted with the coordinator configuration; the strategy is rebuilt
/// from it on load before its learning state is restored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    PureLuck,
    EpsilonGreedy { epsilon: f64 },
    EpsilonDecreasing { epsilon_zero: f64 },
    EpsilonFirst { epsilon: f64 },
    LeastTaken { epsilon_zero: f64 },
    IntervalEstimation { alpha: f64 },
    GaussMatch { skew: f64 },
    Poker,
    SoftMax { temperature: f64 },
    SoftMix { d: f64 },
    Exp3 { gamma: f64 },
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::EpsilonGreedy { epsilon: 0.1 }
    }
}

impl StrategyConfig {
    /// Snake-case name, identical to [`Strategy::name`] of the built strategy.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::PureLuck => "pure_luck",
            Self::EpsilonGreedy { .. } => "epsilon_greedy",
            Self::EpsilonDecreasing { .. } => "epsilon_decreasing",
            Self::EpsilonFirst { .. } => "epsilon_first",
            Self::LeastTaken { .. } => "least_taken",
            Self::IntervalEstimation { .. } => "interval_estimation",
            Self::GaussMatch { .. } => "gauss_match",
            Self::Poker => "poker",
            Self::SoftMax { .. } => "soft_max",
            Self::SoftMix { .. } => "soft_mix",
            Self::Exp3 { .. } => "exp3",
        }
    }

    /// Builds a config from a strategy name and an optional tunable, using a
    /// sensible default when `param` is `None`.
    pub fn from_name(name: &str, param: Option<f64>) -> Result<Self> {
        let config = match name.replace('-', "_").as_str() {
            "pure_luck" => Self::PureLuck,
            "epsilon_greedy" => Self::EpsilonGreedy {
                epsilon: param.unwrap_or(0.1),
            },
            "epsilon_decreasing" => Self::EpsilonDecreasing {
                epsilon_zero: param.unwrap_or(1.0),
            },
            "epsilon_first" => Self::EpsilonFirst {
                epsilon: param.unwrap_or(0.1),
            },
            "least_taken" => Self::LeastTaken {
                epsilon_zero: param.unwrap_or(1.0),
            },
            "interval_estimation" => Self::IntervalEstimation {
                alpha: param.unwrap_or(0.05),
            },
            "gauss_match" => Self::GaussMatch {
                skew: param.unwrap_or(1.0),
            },
            "poker" => Self::Poker,
            "soft_max" | "softmax" => Self::SoftMax {
                temperature: param.unwrap_or(0.1),
            },
            "soft_mix" | "softmix" => Self::SoftMix {
                d: param.unwrap_or(0.5),
            },
            "exp3" => Self::Exp3 {
                gamma: param.unwrap_or(0.1),
            },
            _ => return Err(BanditError::UnknownStrategy(name.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the tunable without keeping the built strategy.
    pub fn validate(&self) -> Result<()> {
        self.build_with_rng(StdRng::seed_from_u64(0)).map(|_| ())
    }

    /// Builds the strategy, seeded when `seed` is given and from OS entropy
    /// otherwise. The returned strategy has no levers yet.
    pub fn build(&self, seed: Option<u64>) -> Result<Box<dyn Strategy>> {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        self.build_with_rng(rng)
    }

    pub fn build_with_rng(&self, rng: StdRng) -> Result<Box<dyn Strategy>> {
        Ok(match *self {
            Self::PureLuck => Box::new(PureLuck::with_rng(rng)),
            Self::EpsilonGreedy { epsilon } => Box::new(EpsilonGreedy::with_rng(epsilon, rng)?),
            Self::EpsilonDecreasing { epsilon_zero } => {
                Box::new(EpsilonDecreasing::with_rng(epsilon_zero, rng)?)
            }
            Self::EpsilonFirst { epsilon } => Box::new(EpsilonFirst::with_rng(epsilon, rng)?),
            Self::LeastTaken { epsilon_zero } => Box::new(LeastTaken::with_rng(epsilon_zero, rng)?),
            Self::IntervalEstimation { alpha } => {
                Box::new(IntervalEstimation::with_rng(alpha, rng)?)
            }
            Self::GaussMatch { skew } => Box::new(GaussMatch::with_rng(skew, rng)?),
            Self::Poker => Box::new(Poker::with_rng(rng)),
            Self::SoftMax { temperature } => Box::new(SoftMax::with_rng(temperature, rng)?),
            Self::SoftMix { d } => Box::new(SoftMix::with_rng(d, rng)?),
            Self::Exp3 { gamma } => Box::new(Exp3::with_rng(gamma, rng)?),
        })
    }
}
