// src/api/handlers.rs

use actix_web::{web, HttpResponse};
use chrono::{Local, Months, NaiveDate};
use log::{debug, info};
use serde::Deserialize;

use crate::api::AppState;
use crate::error::AppError;
use crate::models::{price_series, ChartPoint, DailyBar, PriceField, PriceQuote};
use crate::utils::data_processing::HISTOGRAM_BINS;
use crate::utils::{daily_returns, histogram, render_prediction_chart, PredictionChart};

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub stock_name: Option<String>,
}

impl StockQuery {
    /// The requested symbol; blank values count as absent.
    fn symbol(&self) -> Option<&str> {
        self.stock_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn symbol_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.symbol().unwrap_or(default)
    }

    fn required_symbol(&self) -> Result<&str, AppError> {
        self.symbol().ok_or(AppError::MissingSymbol)
    }
}

/// Same calendar day one year back through today.
fn one_year_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today.checked_sub_months(Months::new(12)).unwrap_or(today);
    (start, today)
}

async fn last_year_of_bars(state: &AppState, symbol: &str) -> Result<Vec<DailyBar>, AppError> {
    let (start, end) = one_year_window(Local::now().date_naive());
    let bars = state.provider.daily_history(symbol, start, end).await?;
    debug!("{} bars for {} between {} and {}", bars.len(), symbol, start, end);
    Ok(bars)
}

/// GET /stock_data: adjusted closes for the last year.
pub async fn stock_data(
    data: web::Data<AppState>,
    query: web::Query<StockQuery>,
) -> Result<HttpResponse, AppError> {
    let symbol = query.symbol_or(&data.default_symbol);
    let bars = last_year_of_bars(&data, symbol).await?;

    let points: Vec<ChartPoint<String>> = price_series(&bars, PriceField::AdjustedClose)
        .into_iter()
        .map(|point| ChartPoint {
            x: point.date.format("%Y-%m-%d").to_string(),
            y: point.value,
        })
        .collect();

    Ok(HttpResponse::Ok().json(points))
}

/// GET /daily_return: histogram of daily percent changes.
pub async fn daily_return(
    data: web::Data<AppState>,
    query: web::Query<StockQuery>,
) -> Result<HttpResponse, AppError> {
    let symbol = query.symbol_or(&data.default_symbol);
    let bars = last_year_of_bars(&data, symbol).await?;

    let prices: Vec<f64> = price_series(&bars, PriceField::AdjustedClose)
        .iter()
        .map(|point| point.value)
        .collect();
    let returns = daily_returns(&prices);
    let bins = histogram(&returns, HISTOGRAM_BINS);

    Ok(HttpResponse::Ok().json(bins))
}

/// GET /stock_prediction: PNG of the close series with the model's held-out predictions.
pub async fn stock_prediction(
    data: web::Data<AppState>,
    query: web::Query<StockQuery>,
) -> Result<HttpResponse, AppError> {
    let symbol = query.symbol_or(&data.default_symbol).to_string();
    let bars = last_year_of_bars(&data, &symbol).await?;
    let series = price_series(&bars, PriceField::Close);
    let inference = data.inference.clone();

    // Inference and rasterizing are CPU bound.
    let png = web::block(move || -> Result<Vec<u8>, AppError> {
        let prices: Vec<f64> = series.iter().map(|p| p.value).collect();
        let forecast = inference.forecast(&prices)?;
        info!(
            "Predicted {} of {} points for {}",
            forecast.predictions.len(),
            prices.len(),
            symbol
        );
        let chart = PredictionChart::new(&symbol, &series, &forecast);
        Ok(render_prediction_chart(&chart)?)
    })
    .await??;

    Ok(HttpResponse::Ok().content_type("image/png").body(png))
}

/// GET /stock_price: last close. `stock_name` is required.
pub async fn stock_price(
    data: web::Data<AppState>,
    query: web::Query<StockQuery>,
) -> Result<HttpResponse, AppError> {
    let symbol = query.required_symbol()?;
    let price = data.provider.latest_close(symbol).await?;
    Ok(HttpResponse::Ok().json(PriceQuote { price }))
}

/// GET /stock_info: descriptive snapshot. `stock_name` is required.
pub async fn stock_info(
    data: web::Data<AppState>,
    query: web::Query<StockQuery>,
) -> Result<HttpResponse, AppError> {
    let symbol = query.required_symbol()?;
    let info = data.provider.stock_info(symbol).await?;
    Ok(HttpResponse::Ok().json(info))
}
