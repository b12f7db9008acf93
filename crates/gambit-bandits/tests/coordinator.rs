//! Coordinator behaviour across structural changes, persistence, concurrency
//! and significance queries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use gambit_bandits::{BanditError, Coordinator, CoordinatorConfig, StrategyConfig};
use gambit_significance::{ContingencyTable, SignificanceError, SignificanceService};

fn seeded(strategy: StrategyConfig) -> CoordinatorConfig {
    CoordinatorConfig {
        name: "test".into(),
        seed: Some(17),
        ..CoordinatorConfig::with_strategy(strategy)
    }
}

#[test]
fn lever_count_tracks_choices_after_every_change() {
    let c = Coordinator::new(seeded(StrategyConfig::default())).unwrap();
    let mut added = Vec::new();
    for value in ["a", "b", "c", "d"] {
        added.push(c.add_choice(value));
        assert_eq!(c.lever_count(), c.len());
    }
    c.remove_choice(added[1].id()).unwrap();
    assert_eq!(c.lever_count(), 3);
    c.remove_choice(added[0].id()).unwrap();
    assert_eq!(c.lever_count(), 2);
    for (index, choice) in c.choices().iter().enumerate() {
        assert_eq!(choice.index(), index);
    }
    assert_eq!(c.choices()[0].value(), &"c");
}

#[test]
fn remove_of_unknown_id_changes_nothing() {
    let c = Coordinator::new(seeded(StrategyConfig::default())).unwrap();
    c.add_choice(1);
    c.get_next().unwrap();
    assert!(c.remove_choice(uuid::Uuid::new_v4()).is_none());
    assert_eq!(c.choices()[0].total(), 1);
}

#[test]
fn epsilon_greedy_visits_fresh_levers_in_index_order() {
    for epsilon in [0.0, 0.5, 1.0] {
        let c = Coordinator::new(seeded(StrategyConfig::EpsilonGreedy { epsilon })).unwrap();
        for value in 0..5 {
            c.add_choice(value);
        }
        for expected in 0..5 {
            assert_eq!(c.get_next().unwrap().index(), expected);
        }
    }
}

#[test]
fn remove_resets_all_survivors() {
    let c = Coordinator::new(seeded(StrategyConfig::PureLuck)).unwrap();
    let a = c.add_choice("a");
    let b = c.add_choice("b");
    let d = c.add_choice("d");
    for _ in 0..30 {
        let shown = c.get_next().unwrap();
        c.succeeded(&shown).unwrap();
        c.get_next().unwrap();
    }
    assert!(a.total() + b.total() + d.total() > 0);

    c.remove_choice(b.id()).unwrap();
    for survivor in c.choices() {
        assert_eq!((survivor.total(), survivor.success()), (0, 0));
    }
    assert!(c.lever_summaries().iter().all(|s| s.count == 0));
    assert_eq!((a.index(), d.index()), (0, 1));
}

#[test]
fn add_resets_existing_tallies() {
    let c = Coordinator::new(seeded(StrategyConfig::default())).unwrap();
    let a = c.add_choice("a");
    c.get_next().unwrap();
    assert_eq!(a.total(), 1);
    c.add_choice("b");
    assert_eq!(a.total(), 0);
}

#[test]
fn save_load_round_trip_preserves_choices() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");

    let c = Coordinator::new(seeded(StrategyConfig::SoftMix { d: 0.5 })).unwrap();
    for value in ["hello", "hi", "hey"] {
        c.add_choice(value.to_string());
    }
    for round in 0..60 {
        let shown = c.get_next().unwrap();
        if round % 3 == 0 {
            c.succeeded(&shown).unwrap();
        }
    }
    c.save(&path).unwrap();

    let loaded = Coordinator::<String>::load(&path).unwrap();
    assert_eq!(loaded.lever_count(), 3);
    assert_eq!(loaded.config(), c.config());
    assert_eq!(loaded.epoch_start(), c.epoch_start());
    for (before, after) in c.choices().iter().zip(loaded.choices()) {
        assert_eq!(before.value(), after.value());
        assert_eq!(before.id(), after.id());
        assert_eq!(before.total(), after.total());
        assert_eq!(before.success(), after.success());
        assert_eq!(before.index(), after.index());
    }
    let shown: u64 = loaded.choices().iter().map(|c| c.total()).sum();
    assert_eq!(shown, 60);
}

#[test]
fn structural_changes_keep_ids() {
    let c = Coordinator::new(seeded(StrategyConfig::default())).unwrap();
    let a = c.add_choice("a");
    let b = c.add_choice("b");
    let (a_id, b_id) = (a.id(), b.id());

    let d = c.add_choice("d");
    assert_eq!((a.id(), b.id()), (a_id, b_id));
    c.remove_choice(a_id).unwrap();
    assert_eq!(b.id(), b_id);
    let ids: Vec<_> = c.choices().iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec![b_id, d.id()]);

    c.reset_stats();
    assert_ne!(b.id(), b_id);
}

#[test]
fn load_resumes_an_unfinished_exploration_phase() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let config = CoordinatorConfig {
        horizon: 100,
        ..seeded(StrategyConfig::EpsilonFirst { epsilon: 0.5 })
    };
    let c = Coordinator::new(config).unwrap();
    for value in ["a", "b", "c", "d"] {
        c.add_choice(value.to_string());
    }
    for _ in 0..10 {
        c.get_next().unwrap();
    }
    c.save(&path).unwrap();

    // 40 exploration rounds remain, so the next 30 displays stay random
    let loaded = Coordinator::<String>::load(&path).unwrap();
    let mut visited = std::collections::BTreeSet::new();
    for _ in 0..30 {
        visited.insert(loaded.get_next().unwrap().index());
    }
    assert!(visited.len() > 1, "{visited:?}");
}

#[test]
fn load_restores_order_dependent_weights() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let c = Coordinator::new(seeded(StrategyConfig::Exp3 { gamma: 0.3 })).unwrap();
    for value in ["a", "b", "c"] {
        c.add_choice(value.to_string());
    }
    for round in 0..90 {
        let shown = c.get_next().unwrap();
        if shown.index() == 2 || round % 7 == 0 {
            c.succeeded(&shown).unwrap();
        }
    }
    c.save(&path).unwrap();
    let first: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();

    let loaded = Coordinator::<String>::load(&path).unwrap();
    assert_eq!(loaded.lever_summaries(), c.lever_summaries());
    loaded.save(&path).unwrap();
    let second: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    for field in ["weights", "probabilities"] {
        let before = first["strategy_state"][field].as_array().unwrap();
        let after = second["strategy_state"][field].as_array().unwrap();
        assert_eq!(before.len(), 3);
        for (x, y) in before.iter().zip(after) {
            let (x, y) = (x.as_f64().unwrap(), y.as_f64().unwrap());
            assert!((x - y).abs() <= 1e-12 * x.abs().max(1.0), "{field}: {x} vs {y}");
        }
    }
}

#[test]
fn failed_save_keeps_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let c = Coordinator::new(seeded(StrategyConfig::default())).unwrap();
    c.add_choice("kept".to_string());
    c.save(&path).unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    // a directory in place of the parent makes the save fail
    let blocked = path.join("child.json");
    let err = c.save(&blocked).unwrap_err();
    assert!(matches!(err, BanditError::Io { .. }));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn reload_replaces_state_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let saved = Coordinator::new(seeded(StrategyConfig::Poker)).unwrap();
    saved.add_choice(10u32);
    saved.add_choice(20u32);
    saved.get_next().unwrap();
    saved.save(&path).unwrap();

    let c = Coordinator::new(seeded(StrategyConfig::default())).unwrap();
    c.add_choice(99u32);
    c.reload(&path).unwrap();
    assert_eq!(c.len(), 2);
    assert_eq!(c.lever_count(), 2);
    assert_eq!(c.strategy_name(), "poker");

    c.reload(dir.path().join("missing.json")).unwrap();
    assert!(c.is_empty());
    assert_eq!(c.lever_count(), 0);
}

#[test]
fn concurrent_callers_keep_tallies_consistent() {
    let c = Arc::new(Coordinator::new(seeded(StrategyConfig::Exp3 { gamma: 0.3 })).unwrap());
    for value in 0..3 {
        c.add_choice(value);
    }

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let c = Arc::clone(&c);
            thread::spawn(move || {
                for round in 0..250 {
                    let shown = c.get_next().unwrap();
                    if (round + worker) % 4 == 0 {
                        c.succeeded(&shown).unwrap();
                    }
                    for choice in c.choices() {
                        assert!(choice.success() <= choice.total());
                    }
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let total: u64 = c.choices().iter().map(|c| c.total()).sum();
    let success: u64 = c.choices().iter().map(|c| c.success()).sum();
    assert_eq!(total, 8 * 250);
    let observations: u64 = c.lever_summaries().iter().map(|s| s.count).sum();
    assert_eq!(observations, total + success);
}

#[derive(Default)]
struct CountingService {
    calls: AtomicUsize,
    fail: bool,
}

impl SignificanceService for CountingService {
    fn two_tailed_p(&self, _table: &ContingencyTable) -> gambit_significance::Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(SignificanceError::MissingPValue)
        } else {
            Ok(0.25)
        }
    }
}

fn two_choice_experiment() -> Coordinator<&'static str> {
    let c = Coordinator::new(seeded(StrategyConfig::PureLuck)).unwrap();
    c.add_choice("a");
    c.add_choice("b");
    c
}

#[test]
fn significance_with_empty_cell_skips_the_service() {
    let c = two_choice_experiment();
    let service = CountingService::default();
    assert_eq!(c.significance_p(&service), None);

    // displays only: both success cells stay zero
    for _ in 0..20 {
        c.get_next().unwrap();
    }
    assert_eq!(c.significance_p(&service), None);
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn significance_queries_service_with_full_table() {
    let c = two_choice_experiment();
    let service = CountingService::default();
    let mut round = 0;
    while c.choices().iter().any(|ch| ch.success() == 0 || ch.failure() == 0) {
        let shown = c.get_next().unwrap();
        if round % 2 == 0 {
            c.succeeded(&shown).unwrap();
        }
        round += 1;
        assert!(round < 10_000);
    }
    assert_eq!(c.significance_p(&service), Some(0.25));
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);

    let failing = CountingService {
        fail: true,
        ..CountingService::default()
    };
    assert_eq!(c.significance_p(&failing), None);
}

#[test]
fn significance_needs_exactly_two_choices() {
    let c = two_choice_experiment();
    c.add_choice("c");
    let service = CountingService::default();
    assert_eq!(c.significance_p(&service), None);
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_strategy_name_is_an_error() {
    assert!(matches!(
        StrategyConfig::from_name("thompson", None),
        Err(BanditError::UnknownStrategy(_))
    ));
}
