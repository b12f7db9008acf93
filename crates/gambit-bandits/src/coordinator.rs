use std::sync::Arc;

use gambit_core::{LeverSummary, Strategy};
use gambit_significance::{ContingencyTable, SignificanceService};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{BanditError, Choice, Result, StrategyConfig};

/// Everything needed to (re)build a coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub name: String,
    pub strategy: StrategyConfig,
    /// Remaining-rounds estimate passed to every `play`.
    #[serde(default = "default_horizon")]
    pub horizon: u32,
    /// Reward fed to the strategy for a reported success.
    #[serde(default = "default_success_reward")]
    pub success_reward: f64,
    /// Seeds the strategy's random source; OS entropy when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_horizon() -> u32 {
    1
}

fn default_success_reward() -> f64 {
    1.0
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            name: "gambit".to_string(),
            strategy: StrategyConfig::default(),
            horizon: default_horizon(),
            success_reward: default_success_reward(),
            seed: None,
        }
    }
}

impl CoordinatorConfig {
    #[must_use]
    pub fn with_strategy(strategy: StrategyConfig) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.success_reward.is_finite() || self.success_reward <= 0.0 {
            return Err(BanditError::InvalidParameter {
                name: "success_reward",
                value: self.success_reward,
                expected: "(0, +inf)",
            });
        }
        self.strategy.validate()
    }
}

/// State guarded by the coordinator-wide lock.
#[derive(Debug)]
pub(crate) struct State<T> {
    pub(crate) config: CoordinatorConfig,
    /// Position in this list is the lever index.
    pub(crate) choices: Vec<Arc<Choice<T>>>,
    pub(crate) epoch_start: OffsetDateTime,
}

/// Owns the choices and the one active strategy, and turns strategy lever
/// indices into choices.
///
/// Two locks are involved: the coordinator lock over the choice list and the
/// strategy binding, and the strategy lock over `play`/`observe`. They are
/// always taken in that order. Tallies are atomics and can be read without
/// either lock.
///
/// Any change to the set of choices restarts the experiment: every tally and
/// every strategy statistic goes back to zero.
#[derive(Debug)]
pub struct Coordinator<T> {
    pub(crate) state: Mutex<State<T>>,
    pub(crate) strategy: Mutex<Box<dyn Strategy>>,
}

impl<T> Coordinator<T> {
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;
        let mut strategy = config.strategy.build(config.seed)?;
        strategy.set_lever_count(0);
        Ok(Self::from_parts(
            State {
                config,
                choices: Vec::new(),
                epoch_start: OffsetDateTime::now_utc(),
            },
            strategy,
        ))
    }

    pub(crate) fn from_parts(state: State<T>, strategy: Box<dyn Strategy>) -> Self {
        Self {
            state: Mutex::new(state),
            strategy: Mutex::new(strategy),
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.state.lock().config.name.clone()
    }

    #[must_use]
    pub fn config(&self) -> CoordinatorConfig {
        self.state.lock().config.clone()
    }

    /// When the current experiment (tallies and statistics) started.
    #[must_use]
    pub fn epoch_start(&self) -> OffsetDateTime {
        self.state.lock().epoch_start
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().choices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the choices in lever order.
    #[must_use]
    pub fn choices(&self) -> Vec<Arc<Choice<T>>> {
        self.state.lock().choices.clone()
    }

    #[must_use]
    pub fn lever_count(&self) -> usize {
        let _state = self.state.lock();
        self.strategy.lock().lever_count()
    }

    /// Name of the active strategy.
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.lock().name()
    }

    /// The strategy's running statistics per lever.
    #[must_use]
    pub fn lever_summaries(&self) -> Vec<LeverSummary> {
        let _state = self.state.lock();
        self.strategy.lock().stats().summaries()
    }

    /// Appends a choice at the next lever index and restarts the experiment.
    ///
    /// Every tally and statistic is zeroed and a new epoch begins, but the
    /// existing choices keep their ids. Only [`Coordinator::reset_stats`]
    /// issues new ids.
    pub fn add_choice(&self, value: T) -> Arc<Choice<T>> {
        let mut state = self.state.lock();
        let choice = Arc::new(Choice::new(value, state.choices.len()));
        state.choices.push(Arc::clone(&choice));
        self.restart(&mut state, false);
        debug_event!("added choice {}, {} levers", choice.id(), state.choices.len());
        choice
    }

    /// Removes the choice with `id` and restarts the experiment. Returns the
    /// removed choice, or `None` when no choice has that id.
    ///
    /// The survivors keep their ids and are renumbered to contiguous lever
    /// indices, with their tallies zeroed as in [`Coordinator::add_choice`].
    pub fn remove_choice(&self, id: Uuid) -> Option<Arc<Choice<T>>> {
        let mut state = self.state.lock();
        let position = state.choices.iter().position(|c| c.id() == id)?;
        let removed = state.choices.remove(position);
        self.restart(&mut state, false);
        debug_event!("removed choice {id}, {} levers", state.choices.len());
        Some(removed)
    }

    /// Asks the strategy for the next choice.
    ///
    /// The display itself is recorded as a zero-reward observation before the
    /// choice is returned.
    pub fn get_next(&self) -> Result<Arc<Choice<T>>> {
        let state = self.state.lock();
        if state.choices.is_empty() {
            return Err(BanditError::NoChoices);
        }

        let index = {
            let mut strategy = self.strategy.lock();
            let index = strategy.play(state.config.horizon);
            if index >= state.choices.len() {
                return Err(BanditError::LeverOutOfRange {
                    index,
                    lever_count: state.choices.len(),
                });
            }
            strategy.observe(index, 0.0);
            index
        };

        let choice = Arc::clone(&state.choices[index]);
        choice.tally().displayed();
        Ok(choice)
    }

    /// Reports a success for a previously displayed choice.
    ///
    /// This is an additional observation on top of the zero-reward one made
    /// at display time, so a successful trial counts twice in the strategy's
    /// statistics.
    pub fn succeeded(&self, choice: &Choice<T>) -> Result<()> {
        let state = self.state.lock();
        let index = choice.index();
        let known = state
            .choices
            .get(index)
            .is_some_and(|c| std::ptr::eq(Arc::as_ptr(c), choice));
        if !known {
            return Err(BanditError::UnknownChoice(choice.id()));
        }
        if !choice.tally().try_succeed() {
            return Err(BanditError::SuccessExceedsDisplays(choice.id()));
        }
        self.strategy
            .lock()
            .observe(index, state.config.success_reward);
        Ok(())
    }

    /// Zeroes every tally and statistic, gives each choice a fresh id and
    /// starts a new epoch.
    pub fn reset_stats(&self) {
        let mut state = self.state.lock();
        self.restart(&mut state, true);
    }

    /// Two-tailed chi-square p-value comparing choice 0 against choice 1.
    ///
    /// `None` unless there are exactly two choices with non-zero success and
    /// failure counts, and when the service fails. The service is not called
    /// in the first case.
    pub fn significance_p(&self, service: &dyn SignificanceService) -> Option<f64> {
        let table = {
            let state = self.state.lock();
            match state.choices.as_slice() {
                [a, b] => ContingencyTable::new(a.success(), a.failure(), b.success(), b.failure()),
                _ => return None,
            }
        };
        if table.has_empty_cell() {
            return None;
        }
        match service.two_tailed_p(&table) {
            Ok(p) => Some(p),
            Err(e) => {
                warn_event!("significance query failed: {e}");
                None
            }
        }
    }

    fn restart(&self, state: &mut State<T>, renew_ids: bool) {
        for (index, choice) in state.choices.iter().enumerate() {
            choice.set_index(index);
            choice.tally().clear();
            if renew_ids {
                choice.renew_id();
            }
        }
        state.epoch_start = OffsetDateTime::now_utc();
        self.strategy.lock().set_lever_count(state.choices.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(strategy: StrategyConfig) -> Coordinator<&'static str> {
        Coordinator::new(CoordinatorConfig {
            seed: Some(42),
            ..CoordinatorConfig::with_strategy(strategy)
        })
        .unwrap()
    }

    #[test]
    fn empty_coordinator_has_nothing_to_offer() {
        let c = coordinator(StrategyConfig::default());
        assert!(matches!(c.get_next(), Err(BanditError::NoChoices)));
        assert_eq!(c.lever_count(), 0);
    }

    #[test]
    fn display_is_observed_with_zero_reward() {
        let c = coordinator(StrategyConfig::PureLuck);
        c.add_choice("a");
        let shown = c.get_next().unwrap();
        assert_eq!(shown.total(), 1);
        let summary = c.lever_summaries()[0];
        assert_eq!(summary.count, 1);
        assert!(summary.reward_sum.abs() < f64::EPSILON);
    }

    #[test]
    fn success_adds_a_second_observation() {
        let c = coordinator(StrategyConfig::PureLuck);
        let a = c.add_choice("a");
        let shown = c.get_next().unwrap();
        c.succeeded(&shown).unwrap();
        assert_eq!((a.total(), a.success()), (1, 1));
        let summary = c.lever_summaries()[0];
        assert_eq!(summary.count, 2);
        assert!((summary.reward_sum - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn success_without_display_is_rejected() {
        let c = coordinator(StrategyConfig::PureLuck);
        let a = c.add_choice("a");
        assert!(matches!(
            c.succeeded(&a),
            Err(BanditError::SuccessExceedsDisplays(_))
        ));
        assert_eq!(c.lever_summaries()[0].count, 0);
    }

    #[test]
    fn removed_choice_cannot_succeed() {
        let c = coordinator(StrategyConfig::PureLuck);
        let a = c.add_choice("a");
        c.add_choice("b");
        c.get_next().unwrap();
        c.remove_choice(a.id()).unwrap();
        assert!(matches!(c.succeeded(&a), Err(BanditError::UnknownChoice(_))));
    }

    #[test]
    fn reset_renews_ids_and_epoch() {
        let c = coordinator(StrategyConfig::default());
        let a = c.add_choice("a");
        let before_id = a.id();
        let before_epoch = c.epoch_start();
        c.get_next().unwrap();
        c.reset_stats();
        assert_ne!(a.id(), before_id);
        assert!(c.epoch_start() >= before_epoch);
        assert_eq!(a.total(), 0);
        assert_eq!(c.lever_summaries()[0].count, 0);
    }

    #[test]
    fn invalid_success_reward_is_rejected() {
        let config = CoordinatorConfig {
            success_reward: 0.0,
            ..CoordinatorConfig::default()
        };
        assert!(Coordinator::<u8>::new(config).is_err());
    }
}
