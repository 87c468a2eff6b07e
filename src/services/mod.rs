// src/services/mod.rs

pub mod yahoo;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::{DailyBar, StockInfo};

/// Source of market data consumed by the request handlers.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily bars in `[start, end]`, ascending by date with gaps dropped.
    async fn daily_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, AppError>;

    /// Close of the most recent trading session.
    async fn latest_close(&self, symbol: &str) -> Result<f64, AppError>;

    async fn stock_info(&self, symbol: &str) -> Result<StockInfo, AppError>;
}

pub use yahoo::YahooFinanceClient;
