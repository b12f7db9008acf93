use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::{ContingencyTable, Result, SignificanceError, SignificanceService};

/// Offline Pearson chi-square test on a 2x2 table (one degree of freedom).
///
/// With `yates` set, each `|observed - expected|` is reduced by up to 0.5,
/// which matches the remote calculator's "chi-square with Yates" mode.
#[derive(Debug, Clone, Copy)]
pub struct LocalChiSquare {
    pub yates: bool,
}

impl Default for LocalChiSquare {
    fn default() -> Self {
        Self { yates: true }
    }
}

impl LocalChiSquare {
    #[allow(clippy::cast_precision_loss)]
    fn statistic(&self, table: &ContingencyTable) -> f64 {
        let [a, b, c, d] = table.cells().map(|cell| cell as f64);
        let n = a + b + c + d;
        let rows = [a + b, c + d];
        let cols = [a + c, b + d];
        let observed = [[a, b], [c, d]];

        let mut statistic = 0.0;
        for (r, row_total) in rows.iter().enumerate() {
            for (k, col_total) in cols.iter().enumerate() {
                let expected = row_total * col_total / n;
                let mut diff = (observed[r][k] - expected).abs();
                if self.yates {
                    diff -= diff.min(0.5);
                }
                statistic += diff * diff / expected;
            }
        }
        statistic
    }
}

impl SignificanceService for LocalChiSquare {
    fn two_tailed_p(&self, table: &ContingencyTable) -> Result<f64> {
        if table.has_empty_cell() {
            return Err(SignificanceError::EmptyCell);
        }
        let chi = ChiSquared::new(1.0).map_err(|e| SignificanceError::Statistics(e.to_string()))?;
        Ok(chi.sf(self.statistic(table)).clamp(0.0, 1.0))
    }
}
