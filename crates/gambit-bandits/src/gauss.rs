//! Normal-distribution helpers that tolerate a degenerate spread.
//!
//! A zero, negative or non-finite standard deviation collapses the
//! distribution onto its mean instead of failing.

use rand::Rng;
use rand_distr::Distribution;
use statrs::distribution::{ContinuousCDF, Normal};

fn normal(mean: f64, sd: f64) -> Option<Normal> {
    if !mean.is_finite() || !sd.is_finite() || sd <= 0.0 {
        return None;
    }
    Normal::new(mean, sd).ok()
}

/// Value below which a fraction `p` of `Normal(mean, sd)` lies.
pub(crate) fn quantile(mean: f64, sd: f64, p: f64) -> f64 {
    normal(mean, sd).map_or(mean, |n| n.inverse_cdf(p))
}

/// `P(X > x)` for `X ~ Normal(mean, sd)`.
pub(crate) fn survival(mean: f64, sd: f64, x: f64) -> f64 {
    match normal(mean, sd) {
        Some(n) => n.sf(x),
        None if mean > x => 1.0,
        None => 0.0,
    }
}

/// One deviate from `Normal(mean, sd)`.
pub(crate) fn sample<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    if !sd.is_finite() || sd <= 0.0 {
        return mean;
    }
    rand_distr::Normal::new(mean, sd).map_or(mean, |n| n.sample(rng))
}
