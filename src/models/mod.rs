// src/models/mod.rs

pub mod inference;
pub mod network;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// One trading day as reported by the market data provider.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub close: f64,
    pub adjusted_close: f64,
}

/// Which price column of a [`DailyBar`] a series is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Close,
    AdjustedClose,
}

impl DailyBar {
    pub fn price(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Close => self.close,
            PriceField::AdjustedClose => self.adjusted_close,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Projects bars onto a single price column, keeping date order.
pub fn price_series(bars: &[DailyBar], field: PriceField) -> Vec<PricePoint> {
    bars.iter()
        .map(|bar| PricePoint {
            date: bar.date,
            value: bar.price(field),
        })
        .collect()
}

/// `{x, y}` pair consumed by the charting frontend.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChartPoint<X> {
    pub x: X,
    pub y: f64,
}

/// Histogram bucket of daily returns.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistogramBin {
    pub x: f64,
    pub y: u64,
}

/// Snapshot of descriptive fields, copied verbatim from the provider.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct StockInfo {
    pub symbol: Option<String>,
    pub company_name: Option<String>,
    pub closing_price: Option<Number>,
    pub market_cap: Option<Number>,
    pub volume: Option<Number>,
    pub average_volume: Option<Number>,
    pub profit_margin: Option<Number>,
    #[serde(rename = "EBITDA")]
    pub ebitda: Option<Number>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PriceQuote {
    pub price: f64,
}

// Re-export inference components
pub use inference::InferenceService;
pub use network::{LstmRegressor, ModelError, SequenceModel};
