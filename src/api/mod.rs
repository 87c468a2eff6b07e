// src/api/mod.rs

use std::sync::Arc;

use actix_web::web;

use crate::models::InferenceService;
use crate::services::MarketDataProvider;

/// Application state shared by every worker. Nothing in it is mutated after startup.
pub struct AppState {
    pub provider: Arc<dyn MarketDataProvider>,
    pub inference: InferenceService,
    pub default_symbol: String,
}

/// Re-export handlers
pub mod handlers;

pub use handlers::{daily_return, stock_data, stock_info, stock_prediction, stock_price};

/// Registers the five GET endpoints.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/stock_data", web::get().to(stock_data))
        .route("/daily_return", web::get().to(daily_return))
        .route("/stock_prediction", web::get().to(stock_prediction))
        .route("/stock_price", web::get().to(stock_price))
        .route("/stock_info", web::get().to(stock_info));
}
