use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::data::{build_lag_rows, design_matrix, Category, Dataset};
use crate::ml::{Model, ModelMetadata, ModelRepository, ModelSpec, Regressor, MIN_TRAINING_ROWS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub years: Vec<i32>,
    pub actual: Vec<f64>,
    pub last_observed_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub year: i32,
    pub yhat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub forecast: Vec<ForecastPoint>,
    pub from_year: Option<i32>,
    pub to_year: Option<i32>,
}

impl Forecast {
    fn unavailable() -> Self {
        Self {
            forecast: Vec::new(),
            from_year: None,
            to_year: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearPrediction {
    pub year: i32,
    pub yhat: Option<f64>,
    pub actual: Option<f64>,
    pub train_upto_year: Option<i32>,
}

/// Read-only query service over the regional dataset and the persisted
/// per-category models. Built once at startup and shared behind an `Arc`.
pub struct ForecastStore {
    dataset: Dataset,
    models: HashMap<Category, Model>,
    metadata: HashMap<Category, ModelMetadata>,
}

impl ForecastStore {
    pub fn new(
        dataset: Dataset,
        models: HashMap<Category, Model>,
        metadata: HashMap<Category, ModelMetadata>,
    ) -> Self {
        Self {
            dataset,
            models,
            metadata,
        }
    }

    /// Loads the dataset and every persisted model. A dataset that cannot be
    /// read aborts startup; missing models only degrade their category.
    pub fn open(config: &Config) -> Result<Self> {
        let dataset = Dataset::load(&config.data.path, &config.data.region)
            .with_context(|| format!("failed to load dataset {}", config.data.path.display()))?;

        let repository = ModelRepository::new(&config.models.dir);
        let (models, metadata) = repository.load_all();

        info!(
            "Forecast store ready: {} observations, {} models",
            dataset.len(),
            models.len()
        );
        Ok(Self::new(dataset, models, metadata))
    }

    pub fn region(&self) -> &str {
        self.dataset.region()
    }

    pub fn categories(&self) -> &'static [Category] {
        &Category::ALL
    }

    pub fn metadata(&self, category: Category) -> Option<&ModelMetadata> {
        self.metadata.get(&category)
    }

    pub fn has_model(&self, category: Category) -> bool {
        self.models.contains_key(&category)
    }

    pub fn historical_series(&self, category: Category) -> HistoricalSeries {
        let (years, actual): (Vec<i32>, Vec<f64>) =
            self.dataset.series(category).into_iter().unzip();
        HistoricalSeries {
            last_observed_year: years.last().copied(),
            years,
            actual,
        }
    }

    /// Rolls the persisted model forward one year at a time, feeding each
    /// prediction back in as the next year's lag.
    pub fn forecast_to_year(&self, category: Category, target_year: i32) -> Forecast {
        let series = self.dataset.series(category);
        let Some(&(last_year, _)) = series.last() else {
            debug!("No data for {}, empty forecast", category);
            return Forecast::unavailable();
        };
        let Some(model) = self.models.get(&category) else {
            warn!("No model loaded for {}, empty forecast", category);
            return Forecast::unavailable();
        };

        let Some(from_year) = last_year.checked_add(1) else {
            warn!("Last observed year {} for {} cannot be advanced", last_year, category);
            return Forecast::unavailable();
        };
        let mut values: Vec<f64> = series.into_iter().map(|(_, v)| v).collect();
        let mut forecast = Vec::new();

        for year in from_year..=target_year {
            let n = values.len();
            if n < 2 {
                break;
            }
            let yhat = match model.predict_one(values[n - 1], values[n - 2]) {
                Ok(p) => p.max(0.0),
                Err(e) => {
                    warn!("Forecast for {} stopped at {}: {}", category, year, e);
                    break;
                }
            };
            values.push(yhat);
            forecast.push(ForecastPoint { year, yhat });
        }

        Forecast {
            forecast,
            from_year: Some(from_year),
            to_year: Some(target_year),
        }
    }

    /// Backtest a single year: fit a fresh model on rows up to `year - 1`
    /// and predict `year` from the two observed years before it.
    pub fn predict_specific_year(&self, category: Category, year: i32) -> YearPrediction {
        let actual = self.dataset.value(category, year);
        let mut result = YearPrediction {
            year,
            yhat: None,
            actual,
            train_upto_year: None,
        };

        let Some((min_year, last_year)) = self.dataset.year_range(category) else {
            return result;
        };
        if year <= min_year || year > last_year {
            debug!("{} is outside {}..={} for {}", year, min_year, last_year, category);
            return result;
        }

        let cutoff = year - 1;
        let rows: Vec<_> = build_lag_rows(&self.dataset.series(category))
            .into_iter()
            .filter(|r| r.year <= cutoff)
            .collect();
        if rows.len() < MIN_TRAINING_ROWS {
            debug!("Only {} rows up to {} for {}", rows.len(), cutoff, category);
            return result;
        }

        result.train_upto_year = Some(cutoff);
        let (Some(lag1), Some(lag2)) = (
            self.dataset.value(category, year - 1),
            self.dataset.value(category, year - 2),
        ) else {
            return result;
        };

        // Fresh instance per call; the persisted model is never refitted
        let mut model = ModelSpec::for_category(category).build();
        let (x, y) = design_matrix(&rows);
        let yhat = model
            .fit(&x, &y)
            .and_then(|_| model.predict_one(lag1, lag2));

        match yhat {
            Ok(p) => result.yhat = Some(p.max(0.0)),
            Err(e) => warn!("Backtest for {} in {} failed: {}", category, year, e),
        }
        result
    }
}
