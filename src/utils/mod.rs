// src/utils/mod.rs

pub mod chart;
pub mod data_processing;

pub use chart::{render_prediction_chart, PredictionChart};
pub use data_processing::{daily_returns, histogram};
