// src/utils/data_processing.rs

use crate::models::HistogramBin;

/// Number of past observations fed to the model for one prediction.
pub const WINDOW_SIZE: usize = 60;
/// Share of the series treated as training context and excluded from the overlay.
pub const TRAIN_RATIO: f64 = 0.95;
/// Number of buckets in the daily return histogram.
pub const HISTOGRAM_BINS: usize = 50;

/// Linear min-max scaler onto `[0, 1]`, fit on a single series.
///
/// A scaler only exists once it has been fit, so `transform` and
/// `inverse_transform` can never run against an unfitted state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScaler {
    min: f64,
    scale: f64,
}

impl MinMaxScaler {
    /// Fits the scaler on the observed range. Returns `None` for an empty series.
    pub fn fit(series: &[f64]) -> Option<Self> {
        let (min, max) = series.iter().fold(None, |acc: Option<(f64, f64)>, &x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
        })?;

        // Constant series: keep a unit scale so transform yields 0.
        let range = max - min;
        let scale = if range.abs() < f64::EPSILON { 1.0 } else { range };

        Some(MinMaxScaler { min, scale })
    }

    pub fn transform(&self, x: f64) -> f64 {
        (x - self.min) / self.scale
    }

    pub fn inverse_transform(&self, y: f64) -> f64 {
        y * self.scale + self.min
    }

    pub fn transform_all(&self, series: &[f64]) -> Vec<f64> {
        series.iter().map(|&x| self.transform(x)).collect()
    }

    pub fn inverse_transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&y| self.inverse_transform(y)).collect()
    }
}

/// Builds `(window, next value)` pairs of length `window_size`.
///
/// A series with fewer than `window_size + 1` points yields no windows.
pub fn make_windows(scaled: &[f64], window_size: usize) -> Vec<(Vec<f64>, f64)> {
    if window_size == 0 || scaled.len() <= window_size {
        return Vec::new();
    }

    (window_size..scaled.len())
        .map(|i| (scaled[i - window_size..i].to_vec(), scaled[i]))
        .collect()
}

/// Partition of a series into training context and a held-out tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastSplit {
    pub len: usize,
    pub training_len: usize,
    pub window_size: usize,
}

impl ForecastSplit {
    pub fn new(len: usize, window_size: usize, train_ratio: f64) -> Self {
        let training_len = ((len as f64 * train_ratio).ceil() as usize).min(len);
        ForecastSplit {
            len,
            training_len,
            window_size,
        }
    }

    /// Index where the inference input starts: the held-out tail plus
    /// `window_size` points of leading context.
    pub fn inference_start(&self) -> Option<usize> {
        self.training_len.checked_sub(self.window_size)
    }

    pub fn held_out_len(&self) -> usize {
        self.len - self.training_len
    }
}

/// Percent change between consecutive prices, dropping non-finite results.
pub fn daily_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .filter(|r| r.is_finite())
        .collect()
}

/// Equal-width histogram over the observed range of `values`.
///
/// Bin edges are `lo + k * width` with the last edge pinned to the maximum,
/// and a value is assigned by comparing it against those edges, so values on
/// a boundary land where numpy's `histogram` puts them. The last bin is closed
/// on the right. A constant input widens the range to `[v - 0.5, v + 0.5]`;
/// an empty input produces no bins.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if bins == 0 || values.is_empty() {
        return Vec::new();
    }

    let mut lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (hi - lo).abs() < f64::EPSILON {
        lo -= 0.5;
        hi += 0.5;
    }
    let edges = bin_edges(lo, hi, bins);
    let norm = bins as f64 / (hi - lo);

    let mut counts = vec![0u64; bins];
    for &v in &values {
        let mut idx = (((v - lo) * norm) as usize).min(bins - 1);
        if v < edges[idx] {
            idx = idx.saturating_sub(1);
        } else if idx + 1 < bins && v >= edges[idx + 1] {
            idx += 1;
        }
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            x: round_to(0.5 * (edges[i] + edges[i + 1]), 3),
            y: count,
        })
        .collect()
}

/// `bins + 1` evenly spaced edges from `lo` to exactly `hi`.
fn bin_edges(lo: f64, hi: f64, bins: usize) -> Vec<f64> {
    let step = (hi - lo) / bins as f64;
    let mut edges: Vec<f64> = (0..=bins).map(|k| k as f64 * step + lo).collect();
    edges[bins] = hi;
    edges
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
