#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Two-tailed chi-square significance for two-choice experiments.
//!
//! The coordinator compares the (success, failure) counts of two choices as a
//! 2x2 contingency table. The p-value itself comes from a
//! [`SignificanceService`]: either the remote contingency calculator
//! ([`GraphPadClient`]) or the offline [`LocalChiSquare`].

mod error;
mod graphpad;
mod local;

pub use error::{Result, SignificanceError};
pub use graphpad::{parse_p_value, GraphPadClient, DEFAULT_ENDPOINT};
pub use local::LocalChiSquare;

use serde::{Deserialize, Serialize};

/// Success/failure counts of two variants, `a` and `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContingencyTable {
    pub success_a: u64,
    pub failure_a: u64,
    pub success_b: u64,
    pub failure_b: u64,
}

impl ContingencyTable {
    #[must_use]
    pub fn new(success_a: u64, failure_a: u64, success_b: u64, failure_b: u64) -> Self {
        Self {
            success_a,
            failure_a,
            success_b,
            failure_b,
        }
    }

    /// Cells in row-major order: `[a, b, c, d]`.
    #[must_use]
    pub fn cells(&self) -> [u64; 4] {
        [self.success_a, self.failure_a, self.success_b, self.failure_b]
    }

    /// A table with any zero cell carries no usable signal.
    #[must_use]
    pub fn has_empty_cell(&self) -> bool {
        self.cells().contains(&0)
    }
}

/// Computes a two-tailed p-value in `[0, 1]` for a contingency table.
pub trait SignificanceService {
    fn two_tailed_p(&self, table: &ContingencyTable) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_detection() {
        assert!(!ContingencyTable::new(1, 2, 3, 4).has_empty_cell());
        assert!(ContingencyTable::new(0, 2, 3, 4).has_empty_cell());
        assert!(ContingencyTable::new(1, 2, 3, 0).has_empty_cell());
    }
}
