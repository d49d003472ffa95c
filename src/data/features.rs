use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Number of lagged values fed to every model.
pub const LAG_FEATURES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaggedRow {
    pub year: i32,
    pub value: f64,
    pub lag1: f64,
    pub lag2: f64,
}

impl LaggedRow {
    pub fn features(&self) -> [f64; LAG_FEATURES] {
        [self.lag1, self.lag2]
    }
}

/// Shifts a year-sorted series by one and two positions. The first two
/// points have no complete lag history and produce no row.
pub fn build_lag_rows(series: &[(i32, f64)]) -> Vec<LaggedRow> {
    series
        .windows(3)
        .map(|w| LaggedRow {
            year: w[2].0,
            value: w[2].1,
            lag1: w[1].1,
            lag2: w[0].1,
        })
        .collect()
}

/// Feature matrix `[lag1, lag2]` per row and the matching target vector.
pub fn design_matrix(rows: &[LaggedRow]) -> (DMatrix<f64>, DVector<f64>) {
    let x = DMatrix::from_fn(rows.len(), LAG_FEATURES, |i, j| rows[i].features()[j]);
    let y = DVector::from_iterator(rows.len(), rows.iter().map(|r| r.value));
    (x, y)
}

/// Single-row feature matrix for one prediction.
pub fn feature_row(lag1: f64, lag2: f64) -> DMatrix<f64> {
    DMatrix::from_row_slice(1, LAG_FEATURES, &[lag1, lag2])
}
