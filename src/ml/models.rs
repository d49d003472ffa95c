use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{RegressionTree, SplitStrategy, TreeParams};
use crate::data::feature_row;
use crate::error::MLError;

/// Common surface of every per-category model.
pub trait Regressor {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<(), MLError>;

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, MLError>;

    /// Prediction for a single `[lag1, lag2]` input.
    fn predict_one(&self, lag1: f64, lag2: f64) -> Result<f64, MLError> {
        let out = self.predict(&feature_row(lag1, lag2))?;
        if !out[0].is_finite() {
            return Err(MLError::NonFinite("prediction"));
        }
        Ok(out[0])
    }
}

fn check_training_data(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<(), MLError> {
    if x.nrows() != y.len() {
        return Err(MLError::DimensionMismatch {
            rows: x.nrows(),
            targets: y.len(),
        });
    }
    if x.nrows() == 0 {
        return Err(MLError::InsufficientData("no training rows".to_string()));
    }
    if !x.iter().all(|v| v.is_finite()) {
        return Err(MLError::NonFinite("training features"));
    }
    if !y.iter().all(|v| v.is_finite()) {
        return Err(MLError::NonFinite("training targets"));
    }
    Ok(())
}

// Ridge regression with an unpenalised intercept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub alpha: f64,
    coefficients: Option<Vec<f64>>,
    intercept: f64,
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            coefficients: None,
            intercept: 0.0,
        }
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_deref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for RidgeRegression {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<(), MLError> {
        check_training_data(x, y)?;

        let x_mean: Vec<f64> = x.column_iter().map(|col| col.mean()).collect();
        let y_mean = y.mean();

        // Center features and target so the intercept is not penalised
        let xc = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] - x_mean[j]);
        let yc = y.add_scalar(-y_mean);

        // (Xc^T * Xc + alpha * I)^-1 * Xc^T * yc
        let xt = xc.transpose();
        let gram = &xt * &xc + DMatrix::identity(x.ncols(), x.ncols()) * self.alpha;
        let xty = &xt * &yc;

        let Some(gram_inv) = gram.try_inverse() else {
            return Err(MLError::TrainingError("Matrix is not invertible".to_string()));
        };
        let weights = gram_inv * xty;

        self.intercept = y_mean
            - x_mean
                .iter()
                .zip(weights.iter())
                .map(|(m, w)| m * w)
                .sum::<f64>();
        self.coefficients = Some(weights.iter().copied().collect());
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, MLError> {
        let coefficients = self.coefficients.as_ref().ok_or(MLError::NotFitted)?;
        let w = DVector::from_column_slice(coefficients);
        Ok(x * w + DVector::from_element(x.nrows(), self.intercept))
    }
}

/// Averaged ensemble of extremely randomised trees (no bootstrap).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraTreesRegressor {
    pub n_estimators: usize,
    pub seed: u64,
    trees: Vec<RegressionTree>,
}

impl ExtraTreesRegressor {
    pub fn new(n_estimators: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            seed,
            trees: Vec::new(),
        }
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for ExtraTreesRegressor {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<(), MLError> {
        check_training_data(x, y)?;

        let targets = y.as_slice();
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let features: Vec<usize> = (0..x.ncols()).collect();
        let params = TreeParams {
            strategy: SplitStrategy::Random,
            ..TreeParams::default()
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        self.trees = (0..self.n_estimators.max(1))
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.gen());
                RegressionTree::fit(x, targets, &rows, &features, &params, &mut tree_rng)
            })
            .collect();

        debug!("Fitted {} extra trees on {} rows", self.trees.len(), x.nrows());
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, MLError> {
        if self.trees.is_empty() {
            return Err(MLError::NotFitted);
        }
        let n = self.trees.len() as f64;
        Ok(DVector::from_fn(x.nrows(), |row, _| {
            self.trees.iter().map(|t| t.predict_row(x, row)).sum::<f64>() / n
        }))
    }
}

/// Squared-error gradient boosting over depth-limited trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub lambda: f64,
    pub seed: u64,
    base_score: Option<f64>,
    trees: Vec<RegressionTree>,
}

impl GradientBoostingRegressor {
    pub fn new(
        n_estimators: usize,
        max_depth: usize,
        learning_rate: f64,
        subsample: f64,
        colsample_bytree: f64,
        seed: u64,
    ) -> Self {
        Self {
            n_estimators,
            max_depth,
            learning_rate,
            subsample,
            colsample_bytree,
            lambda: 1.0,
            seed,
            base_score: None,
            trees: Vec::new(),
        }
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn sample_size(fraction: f64, total: usize) -> usize {
        ((fraction.clamp(0.0, 1.0) * total as f64).floor() as usize).clamp(1, total)
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<(), MLError> {
        check_training_data(x, y)?;

        let n = x.nrows();
        let base = y.mean();
        let params = TreeParams {
            max_depth: Some(self.max_depth),
            lambda: self.lambda,
            strategy: SplitStrategy::Best,
            ..TreeParams::default()
        };
        let row_count = Self::sample_size(self.subsample, n);
        let col_count = Self::sample_size(self.colsample_bytree, x.ncols());

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut predictions = vec![base; n];
        let mut residuals = vec![0.0; n];
        let mut trees = Vec::with_capacity(self.n_estimators);

        for _ in 0..self.n_estimators {
            for i in 0..n {
                residuals[i] = y[i] - predictions[i];
            }

            let mut rows = sample(&mut rng, n, row_count).into_vec();
            rows.sort_unstable();
            let mut features = sample(&mut rng, x.ncols(), col_count).into_vec();
            features.sort_unstable();

            let tree = RegressionTree::fit(x, &residuals, &rows, &features, &params, &mut rng);
            for (i, p) in predictions.iter_mut().enumerate() {
                *p += self.learning_rate * tree.predict_row(x, i);
            }
            trees.push(tree);
        }

        debug!("Fitted {} boosting rounds on {} rows", trees.len(), n);
        self.base_score = Some(base);
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, MLError> {
        let base = self.base_score.ok_or(MLError::NotFitted)?;
        Ok(DVector::from_fn(x.nrows(), |row, _| {
            base + self.learning_rate
                * self.trees.iter().map(|t| t.predict_row(x, row)).sum::<f64>()
        }))
    }
}

/// A fitted or unfitted model of any supported kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    ExtraTrees(ExtraTreesRegressor),
    GradientBoosting(GradientBoostingRegressor),
    Ridge(RidgeRegression),
}

impl Model {
    pub fn name(&self) -> &'static str {
        match self {
            Model::ExtraTrees(_) => "ExtraTreesRegressor",
            Model::GradientBoosting(_) => "GradientBoostingRegressor",
            Model::Ridge(_) => "Ridge",
        }
    }
}

impl Regressor for Model {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<(), MLError> {
        match self {
            Model::ExtraTrees(m) => m.fit(x, y),
            Model::GradientBoosting(m) => m.fit(x, y),
            Model::Ridge(m) => m.fit(x, y),
        }
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, MLError> {
        match self {
            Model::ExtraTrees(m) => m.predict(x),
            Model::GradientBoosting(m) => m.predict(x),
            Model::Ridge(m) => m.predict(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data() -> (DMatrix<f64>, DVector<f64>) {
        let lag1 = [120.0, 340.0, 560.0, 210.0, 880.0, 470.0, 650.0, 300.0, 990.0, 150.0];
        let lag2 = [400.0, 110.0, 720.0, 530.0, 260.0, 940.0, 380.0, 810.0, 170.0, 600.0];
        let x = DMatrix::from_fn(10, 2, |i, j| if j == 0 { lag1[i] } else { lag2[i] });
        let y = DVector::from_fn(10, |i, _| 2.0 * lag1[i] + lag2[i] + 5.0);
        (x, y)
    }

    fn trending_data() -> (DMatrix<f64>, DVector<f64>) {
        let series: Vec<f64> = (0..14)
            .map(|i| 3000.0 - 80.0 * i as f64 + 15.0 * ((i % 3) as f64))
            .collect();
        let rows = series.len() - 2;
        let x = DMatrix::from_fn(rows, 2, |i, j| series[i + 1 - j]);
        let y = DVector::from_fn(rows, |i, _| series[i + 2]);
        (x, y)
    }

    #[test]
    fn ridge_recovers_linear_relation() {
        let (x, y) = linear_data();
        let mut model = RidgeRegression::new(1.0);
        model.fit(&x, &y).unwrap();

        let coefficients = model.coefficients().unwrap();
        assert!((coefficients[0] - 2.0).abs() < 1e-3);
        assert!((coefficients[1] - 1.0).abs() < 1e-3);

        let predicted = model.predict_one(500.0, 500.0).unwrap();
        assert!((predicted - 1505.0).abs() < 0.5);
    }

    #[test]
    fn ridge_penalty_shrinks_weights() {
        let (x, y) = linear_data();
        let mut light = RidgeRegression::new(1.0);
        let mut heavy = RidgeRegression::new(1e7);
        light.fit(&x, &y).unwrap();
        heavy.fit(&x, &y).unwrap();

        assert!(heavy.coefficients().unwrap()[0].abs() < light.coefficients().unwrap()[0].abs());
    }

    #[test]
    fn unfitted_models_refuse_to_predict() {
        let x = feature_row(1.0, 2.0);
        assert!(matches!(RidgeRegression::new(1.0).predict(&x), Err(MLError::NotFitted)));
        assert!(matches!(ExtraTreesRegressor::new(10, 42).predict(&x), Err(MLError::NotFitted)));
        assert!(matches!(
            GradientBoostingRegressor::new(10, 3, 0.1, 0.9, 0.9, 42).predict(&x),
            Err(MLError::NotFitted)
        ));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let x = DMatrix::zeros(3, 2);
        let y = DVector::zeros(2);
        let err = RidgeRegression::new(1.0).fit(&x, &y).unwrap_err();
        assert!(matches!(err, MLError::DimensionMismatch { rows: 3, targets: 2 }));
    }

    #[test]
    fn non_finite_training_data_is_rejected() {
        let (mut x, y) = linear_data();
        x[(4, 1)] = f64::NAN;
        for mut model in [
            Model::Ridge(RidgeRegression::new(1.0)),
            Model::ExtraTrees(ExtraTreesRegressor::new(10, 42)),
            Model::GradientBoosting(GradientBoostingRegressor::new(10, 3, 0.1, 0.9, 0.9, 42)),
        ] {
            let err = model.fit(&x, &y).unwrap_err();
            assert!(matches!(err, MLError::NonFinite("training features")));
        }

        let (x, mut y) = linear_data();
        y[0] = f64::INFINITY;
        let err = RidgeRegression::new(1.0).fit(&x, &y).unwrap_err();
        assert!(matches!(err, MLError::NonFinite("training targets")));
    }

    #[test]
    fn extra_trees_interpolate_training_rows() {
        let (x, y) = trending_data();
        let mut model = ExtraTreesRegressor::new(50, 42);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.tree_count(), 50);
        let predicted = model.predict(&x).unwrap();
        for i in 0..y.len() {
            assert!((predicted[i] - y[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn extra_trees_stay_within_target_range() {
        let (x, y) = trending_data();
        let mut model = ExtraTreesRegressor::new(100, 7);
        model.fit(&x, &y).unwrap();

        let (lo, hi) = (y.min(), y.max());
        for (lag1, lag2) in [(0.0, 0.0), (1e6, 1e6), (2500.0, 2600.0)] {
            let p = model.predict_one(lag1, lag2).unwrap();
            assert!(p >= lo - 1e-9 && p <= hi + 1e-9);
        }
    }

    #[test]
    fn seeded_fits_are_deterministic() {
        let (x, y) = trending_data();

        let mut a = ExtraTreesRegressor::new(30, 42);
        let mut b = ExtraTreesRegressor::new(30, 42);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_one(2000.0, 2100.0).unwrap(), b.predict_one(2000.0, 2100.0).unwrap());

        let mut a = GradientBoostingRegressor::new(50, 3, 0.1, 0.9, 0.9, 42);
        let mut b = GradientBoostingRegressor::new(50, 3, 0.1, 0.9, 0.9, 42);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_one(2000.0, 2100.0).unwrap(), b.predict_one(2000.0, 2100.0).unwrap());
    }

    #[test]
    fn boosting_reduces_training_error() {
        let (x, y) = trending_data();
        let mut model = GradientBoostingRegressor::new(400, 4, 0.05, 0.9, 0.9, 42);
        model.fit(&x, &y).unwrap();

        let predicted = model.predict(&x).unwrap();
        let mean = y.mean();
        let variance: f64 = y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / y.len() as f64;
        let mse: f64 = predicted
            .iter()
            .zip(y.iter())
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / y.len() as f64;

        assert_eq!(model.tree_count(), 400);
        assert!(mse < 0.1 * variance, "mse {} variance {}", mse, variance);
    }

    #[test]
    fn model_enum_serializes_with_kind_tag() {
        let (x, y) = linear_data();
        let mut model = Model::Ridge(RidgeRegression::new(1.0));
        model.fit(&x, &y).unwrap();

        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["kind"], "ridge");

        let restored: Model = serde_json::from_value(json).unwrap();
        assert_eq!(restored.name(), "Ridge");
        assert_eq!(
            restored.predict_one(300.0, 200.0).unwrap(),
            model.predict_one(300.0, 200.0).unwrap()
        );
    }
}
