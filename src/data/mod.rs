pub mod category;
pub mod dataset;
pub mod features;

pub use category::{Category, UnknownCategory};
pub use dataset::{Dataset, Observation};
pub use features::{build_lag_rows, design_matrix, feature_row, LaggedRow};
