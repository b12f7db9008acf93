//! Two headline variants with hidden click-through rates, picked by
//! interval estimation, followed by an offline significance check.
//!
//! `cargo run -p gambit-bandits --example two_variants`

use gambit_bandits::{Coordinator, CoordinatorConfig, StrategyConfig};
use gambit_significance::LocalChiSquare;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bandit = Coordinator::new(CoordinatorConfig {
        name: "headlines".into(),
        seed: Some(42),
        ..CoordinatorConfig::with_strategy(StrategyConfig::IntervalEstimation { alpha: 0.05 })
    })?;
    bandit.add_choice("Ten things you missed");
    bandit.add_choice("What changed this week");

    let hidden_rates = [0.04, 0.07];
    let mut visitors = StdRng::seed_from_u64(7);
    for _ in 0..5_000 {
        let shown = bandit.get_next()?;
        if visitors.gen::<f64>() < hidden_rates[shown.index()] {
            bandit.succeeded(&shown)?;
        }
    }

    for choice in bandit.choices() {
        println!(
            "{:<24} shown {:>5}  clicks {:>4}  ratio {:.4}",
            choice.value(),
            choice.total(),
            choice.success(),
            choice.ratio().unwrap_or(0.0),
        );
    }
    match bandit.significance_p(&LocalChiSquare::default()) {
        Some(p) => println!("two-tailed p = {p:.4}"),
        None => println!("not enough data for a significance test"),
    }
    Ok(())
}
