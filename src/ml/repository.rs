use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::catalog::ModelSpec;
use super::metrics::EvaluationMetrics;
use super::models::Model;
use crate::data::Category;
use crate::error::MLError;

/// Sidecar written next to each persisted model. Introspection only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub violation: Category,
    pub place: String,
    pub train_years: Vec<i32>,
    pub last_observed_year: Option<i32>,
    pub auto_model: String,
    pub params: ModelSpec,
    pub trained_at: DateTime<Utc>,
    pub metrics: Option<EvaluationMetrics>,
}

/// Directory of `model_{slug}.json` / `meta_{slug}.json` pairs.
#[derive(Debug, Clone)]
pub struct ModelRepository {
    dir: PathBuf,
}

impl ModelRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self, category: Category) -> PathBuf {
        self.dir.join(format!("model_{}.json", category.slug()))
    }

    pub fn metadata_path(&self, category: Category) -> PathBuf {
        self.dir.join(format!("meta_{}.json", category.slug()))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join("summary.json")
    }

    pub fn save_model(&self, category: Category, model: &Model) -> Result<(), MLError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.model_path(category);
        fs::write(&path, serde_json::to_vec(model)?)?;
        debug!("Saved model for {} to {}", category, path.display());
        Ok(())
    }

    pub fn save_metadata(&self, metadata: &ModelMetadata) -> Result<(), MLError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.metadata_path(metadata.violation);
        fs::write(&path, serde_json::to_string_pretty(metadata)?)?;
        Ok(())
    }

    pub fn save_summary(&self, summary: &BTreeMap<String, ModelMetadata>) -> Result<(), MLError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.summary_path(), serde_json::to_string_pretty(summary)?)?;
        Ok(())
    }

    /// `Ok(None)` when no model has been saved for the category.
    pub fn load_model(&self, category: Category) -> Result<Option<Model>, MLError> {
        read_json(&self.model_path(category))
    }

    pub fn load_metadata(&self, category: Category) -> Result<Option<ModelMetadata>, MLError> {
        read_json(&self.metadata_path(category))
    }

    /// Loads every model and metadata file present. Unreadable files are
    /// logged and treated as absent.
    pub fn load_all(&self) -> (HashMap<Category, Model>, HashMap<Category, ModelMetadata>) {
        info!("Loading models from {}", self.dir.display());

        let mut models = HashMap::new();
        let mut metadata = HashMap::new();

        for category in Category::ALL {
            match self.load_model(category) {
                Ok(Some(model)) => {
                    models.insert(category, model);
                }
                Ok(None) => warn!("No model found for {}", category),
                Err(e) => warn!("Failed to load model for {}: {}", category, e),
            }
            match self.load_metadata(category) {
                Ok(Some(meta)) => {
                    metadata.insert(category, meta);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to load metadata for {}: {}", category, e),
            }
        }

        info!("Loaded {} of {} models", models.len(), Category::ALL.len());
        (models, metadata)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, MLError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&content)?))
}
