use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::catalog::ModelSpec;
use super::metrics::EvaluationMetrics;
use super::models::{Model, Regressor};
use super::repository::{ModelMetadata, ModelRepository};
use crate::data::{build_lag_rows, design_matrix, Category, Dataset, LaggedRow};

/// Fewest lagged rows a model is fitted on.
pub const MIN_TRAINING_ROWS: usize = 2;

/// Offline trainer: one model per category, fitted on all history.
pub struct Trainer<'a> {
    dataset: &'a Dataset,
    repository: &'a ModelRepository,
    evaluate_from: Option<i32>,
}

#[derive(Debug, Default)]
pub struct TrainingSummary {
    pub trained: BTreeMap<String, ModelMetadata>,
    pub skipped: Vec<Category>,
}

impl<'a> Trainer<'a> {
    pub fn new(dataset: &'a Dataset, repository: &'a ModelRepository) -> Self {
        Self {
            dataset,
            repository,
            evaluate_from: None,
        }
    }

    /// Score a throwaway model on rows from `year` onward before the final fit.
    pub fn with_evaluation(mut self, year: Option<i32>) -> Self {
        self.evaluate_from = year;
        self
    }

    pub fn train_all(&self) -> Result<TrainingSummary> {
        info!(
            "Training {} categories for {}",
            Category::ALL.len(),
            self.dataset.region()
        );

        let mut summary = TrainingSummary::default();

        for category in Category::ALL {
            match self.train_category(category)? {
                Some(metadata) => {
                    info!("Trained and saved {} -> {}", category, metadata.auto_model);
                    summary.trained.insert(category.to_string(), metadata);
                }
                None => summary.skipped.push(category),
            }
        }

        self.repository.save_summary(&summary.trained)?;
        info!(
            "Training finished: {} trained, {} skipped, artifacts in {}",
            summary.trained.len(),
            summary.skipped.len(),
            self.repository.dir().display()
        );
        Ok(summary)
    }

    /// Returns `None` when the category has too little history to fit.
    pub fn train_category(&self, category: Category) -> Result<Option<ModelMetadata>> {
        let series = self.dataset.series(category);
        if series.is_empty() {
            warn!("No rows for {}", category);
            return Ok(None);
        }

        let rows = build_lag_rows(&series);
        if rows.len() < MIN_TRAINING_ROWS {
            warn!(
                "Only {} lagged rows for {}, need {}; skipping",
                rows.len(),
                category,
                MIN_TRAINING_ROWS
            );
            return Ok(None);
        }

        let spec = ModelSpec::for_category(category);
        let metrics = self
            .evaluate_from
            .and_then(|year| self.evaluate(category, &spec, &rows, year));

        let mut model = spec.build();
        let (x, y) = design_matrix(&rows);
        if let Err(e) = model.fit(&x, &y) {
            warn!("Fitting {} failed, skipping: {}", category, e);
            return Ok(None);
        }

        self.repository.save_model(category, &model)?;

        let metadata = ModelMetadata {
            violation: category,
            place: self.dataset.region().to_string(),
            train_years: rows.iter().map(|r| r.year).collect(),
            last_observed_year: rows.last().map(|r| r.year),
            auto_model: model.name().to_string(),
            params: spec,
            trained_at: Utc::now(),
            metrics,
        };
        self.repository.save_metadata(&metadata)?;

        Ok(Some(metadata))
    }

    fn evaluate(
        &self,
        category: Category,
        spec: &ModelSpec,
        rows: &[LaggedRow],
        holdout_from: i32,
    ) -> Option<EvaluationMetrics> {
        let (train, test): (Vec<LaggedRow>, Vec<LaggedRow>) =
            rows.iter().partition(|r| r.year < holdout_from);
        if train.is_empty() || test.is_empty() {
            warn!(
                "Cannot evaluate {} with holdout from {}: {} train rows, {} test rows",
                category,
                holdout_from,
                train.len(),
                test.len()
            );
            return None;
        }

        let mut model: Model = spec.build();
        let (x_train, y_train) = design_matrix(&train);
        if let Err(e) = model.fit(&x_train, &y_train) {
            warn!("Evaluation fit failed for {}: {}", category, e);
            return None;
        }

        let (x_test, y_test) = design_matrix(&test);
        let predicted = match model.predict(&x_test) {
            Ok(p) => p,
            Err(e) => {
                warn!("Evaluation predict failed for {}: {}", category, e);
                return None;
            }
        };

        let metrics = EvaluationMetrics::compute(
            y_test.as_slice(),
            predicted.as_slice(),
            test.iter().map(|r| r.year).collect(),
        );
        info!(
            "{}: holdout mae {:.1}, rmse {:.1}, r2 {:?}",
            category, metrics.mae, metrics.rmse, metrics.r2
        );
        Some(metrics)
    }
}
