use serde::{Deserialize, Serialize};

use super::models::{ExtraTreesRegressor, GradientBoostingRegressor, Model, RidgeRegression};
use crate::data::Category;

const SEED: u64 = 42;

/// Model kind and hyperparameters assigned to a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    ExtraTrees {
        n_estimators: usize,
        seed: u64,
    },
    GradientBoosting {
        n_estimators: usize,
        max_depth: usize,
        learning_rate: f64,
        subsample: f64,
        colsample_bytree: f64,
        seed: u64,
    },
    Ridge {
        alpha: f64,
    },
}

impl ModelSpec {
    fn extra_trees(n_estimators: usize) -> Self {
        ModelSpec::ExtraTrees {
            n_estimators,
            seed: SEED,
        }
    }

    fn boosting(n_estimators: usize, max_depth: usize) -> Self {
        ModelSpec::GradientBoosting {
            n_estimators,
            max_depth,
            learning_rate: 0.05,
            subsample: 0.9,
            colsample_bytree: 0.9,
            seed: SEED,
        }
    }

    /// High-volume, volatile categories get tree ensembles; the
    /// low-frequency ones a ridge fit.
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Robbery => Self::extra_trees(600),
            Category::PropertyCrime => Self::boosting(800, 5),
            Category::TheftUnder5000 => Self::boosting(800, 5),
            Category::MotorVehicleTheft => Self::extra_trees(700),
            Category::Mischief => Self::extra_trees(700),
            Category::DrugViolations => Self::boosting(600, 4),
            Category::AggravatedSexualAssault
            | Category::ParentalAbduction
            | Category::CriminalHarassment => ModelSpec::Ridge { alpha: 1.0 },
        }
    }

    /// A fresh, unfitted model.
    pub fn build(&self) -> Model {
        match *self {
            ModelSpec::ExtraTrees { n_estimators, seed } => {
                Model::ExtraTrees(ExtraTreesRegressor::new(n_estimators, seed))
            }
            ModelSpec::GradientBoosting {
                n_estimators,
                max_depth,
                learning_rate,
                subsample,
                colsample_bytree,
                seed,
            } => Model::GradientBoosting(GradientBoostingRegressor::new(
                n_estimators,
                max_depth,
                learning_rate,
                subsample,
                colsample_bytree,
                seed,
            )),
            ModelSpec::Ridge { alpha } => Model::Ridge(RidgeRegression::new(alpha)),
        }
    }
}
