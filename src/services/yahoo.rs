// src/services/yahoo.rs

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Number, Value};

use crate::error::AppError;
use crate::models::{DailyBar, StockInfo};
use crate::services::MarketDataProvider;

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const SUMMARY_MODULES: &str = "price,summaryDetail,financialData,defaultKeyStatistics";

/// Visiting this host sets the session cookie the crumb is bound to.
const CONSENT_URL: &str = "https://fc.yahoo.com";

// Define the structure for the chart API response
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    error: Option<ProviderErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    code: String,
    description: Option<String>,
}

impl ProviderErrorBody {
    fn into_error(self) -> AppError {
        match self.description {
            Some(description) if !description.is_empty() => AppError::Provider(description),
            _ => AppError::Provider(self.code),
        }
    }
}

// Auth failures arrive in a separate envelope: {"finance": {"error": {..}}}
#[derive(Debug, Deserialize)]
struct FinanceResponse {
    finance: FinanceEnvelope,
}

#[derive(Debug, Deserialize)]
struct FinanceEnvelope {
    error: Option<ProviderErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    gmtoffset: Option<i64>,
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteIndicator>,
    #[serde(default)]
    adjclose: Vec<AdjCloseIndicator>,
}

#[derive(Debug, Deserialize)]
struct QuoteIndicator {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseIndicator {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance chart and quote-summary client.
pub struct YahooFinanceClient {
    client: Client,
    base_url: Url,
    // quoteSummary crumb for the current cookie session
    crumb: Mutex<Option<String>>,
}

impl YahooFinanceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let base_url =
            Url::parse(base_url).map_err(|e| AppError::Provider(format!("Invalid provider URL {}: {}", base_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .cookie_store(true)
            .build()?;

        Ok(YahooFinanceClient {
            client,
            base_url,
            crumb: Mutex::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Provider(format!("Provider URL {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url, query: &[(&str, String)]) -> Result<(StatusCode, String), AppError> {
        debug!("GET {} {:?}", url, query);
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// Crumb required by quoteSummary. Fetched once per cookie session and cached.
    async fn crumb(&self) -> Result<String, AppError> {
        if let Some(crumb) = self.cached_crumb() {
            return Ok(crumb);
        }

        // The consent host answers with an error page; only its cookie matters.
        if let Err(e) = self.client.get(CONSENT_URL).send().await {
            debug!("Cookie request to {} failed: {}", CONSENT_URL, e);
        }

        let url = self.endpoint(&["v1", "test", "getcrumb"])?;
        let (status, body) = self.get(url, &[]).await?;
        let crumb = parse_crumb(status, &body)?;
        debug!("Obtained quoteSummary crumb");
        self.remember_crumb(Some(crumb.clone()));
        Ok(crumb)
    }

    fn cached_crumb(&self) -> Option<String> {
        self.crumb.lock().ok().and_then(|crumb| crumb.clone())
    }

    fn remember_crumb(&self, crumb: Option<String>) {
        if let Ok(mut cached) = self.crumb.lock() {
            *cached = crumb;
        }
    }

    async fn fetch_chart(&self, symbol: &str, query: &[(&str, String)]) -> Result<ChartResult, AppError> {
        let url = self.endpoint(&["v8", "finance", "chart", symbol])?;
        let (status, body) = self.get(url, query).await?;
        parse_chart(symbol, status, &body)
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceClient {
    async fn daily_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, AppError> {
        let period_end = end.checked_add_days(Days::new(1)).unwrap_or(end);
        let query = [
            ("period1", unix_seconds(start).to_string()),
            ("period2", unix_seconds(period_end).to_string()),
            ("interval", "1d".to_string()),
            ("events", "history".to_string()),
            ("includeAdjustedClose", "true".to_string()),
        ];

        let result = self.fetch_chart(symbol, &query).await?;
        let bars: Vec<DailyBar> = bars_from_chart(&result)
            .into_iter()
            .filter(|bar| bar.date >= start && bar.date <= end)
            .collect();

        if bars.is_empty() {
            return Err(AppError::NoData(symbol.to_string()));
        }
        debug!("Fetched {} daily bars for {} ({} to {})", bars.len(), symbol, start, end);
        Ok(bars)
    }

    async fn latest_close(&self, symbol: &str) -> Result<f64, AppError> {
        let query = [("range", "1d".to_string()), ("interval", "1d".to_string())];
        let result = self.fetch_chart(symbol, &query).await?;
        last_close(&result).ok_or_else(|| AppError::NoData(symbol.to_string()))
    }

    async fn stock_info(&self, symbol: &str) -> Result<StockInfo, AppError> {
        let url = self.endpoint(&["v10", "finance", "quoteSummary", symbol])?;
        let crumb = self.crumb().await?;
        let (mut status, mut body) = self.get(url.clone(), &summary_query(&crumb)).await?;

        // An expired session gets one fresh cookie and crumb.
        if status == StatusCode::UNAUTHORIZED {
            debug!("Crumb rejected for {}; starting a new session", symbol);
            self.remember_crumb(None);
            let crumb = self.crumb().await?;
            (status, body) = self.get(url, &summary_query(&crumb)).await?;
        }
        parse_quote_summary(symbol, status, &body)
    }
}

fn unix_seconds(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

fn summary_query(crumb: &str) -> [(&'static str, String); 2] {
    [
        ("modules", SUMMARY_MODULES.to_string()),
        ("crumb", crumb.to_string()),
    ]
}

fn finance_error(body: &str) -> Option<AppError> {
    let response: FinanceResponse = serde_json::from_str(body).ok()?;
    response.finance.error.map(ProviderErrorBody::into_error)
}

/// The getcrumb body is the bare crumb as plain text.
fn parse_crumb(status: StatusCode, body: &str) -> Result<String, AppError> {
    if let Some(error) = finance_error(body) {
        return Err(error);
    }
    let crumb = body.trim();
    if !status.is_success() || crumb.is_empty() || crumb.contains(['<', '{', ' ']) {
        return Err(AppError::Provider(format!(
            "Provider did not issue a session crumb ({})",
            status
        )));
    }
    Ok(crumb.to_string())
}

fn parse_chart(symbol: &str, status: StatusCode, body: &str) -> Result<ChartResult, AppError> {
    if let Some(error) = finance_error(body) {
        return Err(error);
    }
    let response: ChartResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) if status.is_success() => return Err(e.into()),
        Err(_) => return Err(unexpected_status(symbol, status)),
    };

    if let Some(error) = response.chart.error {
        return Err(error.into_error());
    }
    if !status.is_success() {
        return Err(unexpected_status(symbol, status));
    }

    response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| AppError::NoData(symbol.to_string()))
}

fn unexpected_status(symbol: &str, status: StatusCode) -> AppError {
    AppError::Provider(format!("Provider returned {} for {}", status, symbol))
}

/// Rows with a missing close or adjusted close are dropped. Dates are taken in
/// the exchange's local time, sorted, and de-duplicated (last row wins).
fn bars_from_chart(result: &ChartResult) -> Vec<DailyBar> {
    let offset = result.meta.as_ref().and_then(|m| m.gmtoffset).unwrap_or(0);
    let closes = result
        .indicators
        .quote
        .first()
        .map(|q| q.close.as_slice())
        .unwrap_or(&[]);
    let adjusted = result.indicators.adjclose.first().map(|a| a.adjclose.as_slice());

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (idx, &ts) in result.timestamp.iter().enumerate() {
        let close = closes.get(idx).copied().flatten();
        let adjusted_close = match adjusted {
            Some(values) => values.get(idx).copied().flatten(),
            None => close,
        };
        let (Some(close), Some(adjusted_close)) = (close, adjusted_close) else {
            continue;
        };
        if !close.is_finite() || !adjusted_close.is_finite() {
            continue;
        }
        let Some(moment) = DateTime::from_timestamp(ts + offset, 0) else {
            continue;
        };

        bars.push(DailyBar {
            date: moment.date_naive(),
            close,
            adjusted_close,
        });
    }

    bars.sort_by_key(|bar| bar.date);
    let mut unique: Vec<DailyBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match unique.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => unique.push(bar),
        }
    }
    unique
}

fn last_close(result: &ChartResult) -> Option<f64> {
    result
        .indicators
        .quote
        .first()
        .and_then(|q| q.close.iter().rev().find_map(|c| c.filter(|v| v.is_finite())))
        .or_else(|| result.meta.as_ref().and_then(|m| m.regular_market_price))
}

fn parse_quote_summary(symbol: &str, status: StatusCode, body: &str) -> Result<StockInfo, AppError> {
    if let Some(error) = finance_error(body) {
        return Err(error);
    }
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) if status.is_success() => return Err(e.into()),
        Err(_) => return Err(unexpected_status(symbol, status)),
    };

    let summary = &value["quoteSummary"];
    if !summary["error"].is_null() {
        let error: ProviderErrorBody = serde_json::from_value(summary["error"].clone())?;
        return Err(error.into_error());
    }
    if !status.is_success() {
        return Err(unexpected_status(symbol, status));
    }

    summary["result"]
        .get(0)
        .map(stock_info_from_summary)
        .ok_or_else(|| AppError::NoData(symbol.to_string()))
}

/// Picks the snapshot fields out of the summary modules; absent fields stay `None`.
fn stock_info_from_summary(result: &Value) -> StockInfo {
    let price = &result["price"];
    let detail = &result["summaryDetail"];
    let financial = &result["financialData"];
    let statistics = &result["defaultKeyStatistics"];

    StockInfo {
        symbol: text(&price["symbol"]),
        company_name: text(&price["longName"]),
        closing_price: number(&price["regularMarketPreviousClose"])
            .or_else(|| number(&detail["previousClose"])),
        market_cap: number(&price["marketCap"]).or_else(|| number(&detail["marketCap"])),
        volume: number(&detail["volume"]),
        average_volume: number(&detail["averageVolume"]),
        profit_margin: number(&financial["profitMargins"])
            .or_else(|| number(&statistics["profitMargins"])),
        ebitda: number(&financial["ebitda"]),
    }
}

// Summary values arrive either bare or as {"raw": .., "fmt": ".."}.
fn number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::Object(map) => match map.get("raw") {
            Some(Value::Number(n)) => Some(n.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}
