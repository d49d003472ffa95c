use anyhow::Result;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;
use crate::data::Category;
use crate::error::ApiError;
use crate::ml::ModelMetadata;
use crate::store::{ForecastPoint, ForecastStore};

#[derive(Clone)]
pub struct ApiServer {
    store: Arc<ForecastStore>,
    limits: ApiConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViolationsResponse {
    pub place: String,
    pub violations: Vec<Category>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoricalResponse {
    pub violation: Category,
    pub years: Vec<i32>,
    pub actual: Vec<f64>,
    pub last_observed_year: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub violation: Category,
    pub from_year: Option<i32>,
    pub to_year: Option<i32>,
    pub forecast: Vec<ForecastPoint>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictYearResponse {
    pub violation: Category,
    pub year: i32,
    pub yhat: Option<f64>,
    pub actual: Option<f64>,
    pub train_upto_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ViolationParams {
    pub violation: String,
}

#[derive(Debug, Deserialize)]
pub struct ForecastParams {
    pub violation: String,
    pub horizon: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct PredictYearParams {
    pub violation: String,
    pub year: i32,
}

impl ApiServer {
    pub fn new(store: Arc<ForecastStore>, limits: ApiConfig) -> Self {
        Self { store, limits }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(health))
            .route("/api/v1/violations", get(list_violations))
            .route("/api/v1/historical", get(historical))
            .route("/api/v1/forecast", get(forecast))
            .route("/api/v1/predict_year", get(predict_year))
            .route("/api/v1/metadata", get(metadata))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.clone())
    }

    pub async fn start(&self, host: &str, port: u16) -> Result<()> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
        info!("Forecast API listening on http://{}:{}", host, port);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received, stopping API server...");
    }
}

fn parse_violation(raw: &str) -> Result<Category, ApiError> {
    raw.parse::<Category>()
        .map_err(|_| ApiError::UnknownViolation(raw.to_string()))
}

fn check_range(name: &'static str, value: i32, min: i32, max: i32) -> Result<i32, ApiError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

// API Handlers
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn list_violations(State(server): State<ApiServer>) -> Json<ViolationsResponse> {
    Json(ViolationsResponse {
        place: server.store.region().to_string(),
        violations: server.store.categories().to_vec(),
    })
}

pub async fn historical(
    State(server): State<ApiServer>,
    query: Result<Query<ViolationParams>, QueryRejection>,
) -> Result<Json<HistoricalResponse>, ApiError> {
    let Query(params) = query?;
    let violation = parse_violation(&params.violation)?;
    let series = server.store.historical_series(violation);

    Ok(Json(HistoricalResponse {
        violation,
        years: series.years,
        actual: series.actual,
        last_observed_year: series.last_observed_year,
    }))
}

pub async fn forecast(
    State(server): State<ApiServer>,
    query: Result<Query<ForecastParams>, QueryRejection>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let Query(params) = query?;
    let violation = parse_violation(&params.violation)?;
    let limits = &server.limits;
    let horizon = check_range(
        "horizon",
        params.horizon.unwrap_or(limits.default_horizon),
        limits.horizon_min,
        limits.horizon_max,
    )?;

    let result = server.store.forecast_to_year(violation, horizon);

    Ok(Json(ForecastResponse {
        violation,
        from_year: result.from_year,
        to_year: result.to_year,
        forecast: result.forecast,
    }))
}

pub async fn predict_year(
    State(server): State<ApiServer>,
    query: Result<Query<PredictYearParams>, QueryRejection>,
) -> Result<Json<PredictYearResponse>, ApiError> {
    let Query(params) = query?;
    let violation = parse_violation(&params.violation)?;
    let limits = &server.limits;
    let year = check_range("year", params.year, limits.predict_year_min, limits.predict_year_max)?;

    // The backtest refits a model, keep it off the async workers
    let store = server.store.clone();
    let result = tokio::task::spawn_blocking(move || store.predict_specific_year(violation, year))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(PredictYearResponse {
        violation,
        year: result.year,
        yhat: result.yhat,
        actual: result.actual,
        train_upto_year: result.train_upto_year,
    }))
}

pub async fn metadata(
    State(server): State<ApiServer>,
    query: Result<Query<ViolationParams>, QueryRejection>,
) -> Result<Json<ModelMetadata>, ApiError> {
    let Query(params) = query?;
    let violation = parse_violation(&params.violation)?;
    server
        .store
        .metadata(violation)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(violation.to_string()))
}
