pub mod catalog;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod trainer;
pub mod tree;

pub use catalog::ModelSpec;
pub use metrics::EvaluationMetrics;
pub use models::{ExtraTreesRegressor, GradientBoostingRegressor, Model, Regressor, RidgeRegression};
pub use repository::{ModelMetadata, ModelRepository};
pub use trainer::{Trainer, TrainingSummary, MIN_TRAINING_ROWS};
