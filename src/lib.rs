//! Historical crime-incident series and lag-based forecasts for a fixed set
//! of Ontario crime categories.
//!
//! The offline [`ml::Trainer`] fits one model per [`data::Category`] and
//! persists it through [`ml::ModelRepository`]; the [`store::ForecastStore`]
//! loads those artifacts once and answers history, recursive forecast and
//! single-year backtest queries, exposed over HTTP by [`web::ApiServer`].

pub mod config;
pub mod data;
pub mod error;
pub mod ml;
pub mod store;
pub mod web;
