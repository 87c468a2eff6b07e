// src/utils/chart.rs

use chrono::{Duration, NaiveDate};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::prelude::*;
use thiserror::Error;

use crate::models::inference::Forecast;
use crate::models::PricePoint;

pub const CHART_WIDTH: u32 = 1000;
pub const CHART_HEIGHT: u32 = 600;

const TRAIN_COLOR: RGBColor = RGBColor(31, 119, 180);
const VALID_COLOR: RGBColor = RGBColor(255, 127, 14);
const PREDICTION_COLOR: RGBColor = RGBColor(44, 160, 44);

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Nothing to plot")]
    EmptySeries,

    #[error("Chart drawing error: {0}")]
    Draw(String),

    #[error("PNG encoding error: {0}")]
    Encode(#[from] image::ImageError),
}

/// Series shown on the prediction chart.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionChart {
    pub title: String,
    pub train: Vec<PricePoint>,
    pub valid: Vec<PricePoint>,
    pub predictions: Vec<PricePoint>,
}

impl PredictionChart {
    /// Splits `series` at the forecast's training length and dates the predictions
    /// against the held-out points.
    pub fn new(symbol: &str, series: &[PricePoint], forecast: &Forecast) -> Self {
        let split = forecast.training_len.min(series.len());
        let (train, valid) = series.split_at(split);
        let predictions = valid
            .iter()
            .zip(forecast.predictions.iter())
            .map(|(point, &value)| PricePoint {
                date: point.date,
                value,
            })
            .collect();

        PredictionChart {
            title: chart_title(symbol),
            train: train.to_vec(),
            valid: valid.to_vec(),
            predictions,
        }
    }

    fn points(&self) -> impl Iterator<Item = &PricePoint> {
        self.train
            .iter()
            .chain(self.valid.iter())
            .chain(self.predictions.iter())
    }

    fn bounds(&self) -> Option<((NaiveDate, NaiveDate), (f64, f64))> {
        let first = self.points().next()?;
        let (mut start, mut end) = (first.date, first.date);
        let (mut min_value, mut max_value) = (first.value, first.value);
        for p in self.points() {
            start = start.min(p.date);
            end = end.max(p.date);
            min_value = min_value.min(p.value);
            max_value = max_value.max(p.value);
        }

        if start == end {
            end += Duration::days(1);
        }
        let y_range = if (max_value - min_value).abs() < f64::EPSILON {
            // If all values are the same, set a default range
            (min_value - 1.0, max_value + 1.0)
        } else {
            let pad = (max_value - min_value) * 0.05;
            (min_value - pad, max_value + pad)
        };

        Some(((start, end), y_range))
    }
}

/// Title names the symbol without its exchange suffix.
pub fn chart_title(symbol: &str) -> String {
    let name = symbol.split('.').next().unwrap_or(symbol);
    format!("Predictions for {}", name)
}

/// Draws the chart into memory and returns PNG bytes.
pub fn render_prediction_chart(chart: &PredictionChart) -> Result<Vec<u8>, ChartError> {
    let ((start, end), (y_min, y_max)) = chart.bounds().ok_or(ChartError::EmptySeries)?;
    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];

    {
        let root_area =
            BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root_area.fill(&WHITE).map_err(draw_error)?;

        let mut ctx = ChartBuilder::on(&root_area)
            .caption(&chart.title, ("sans-serif", 28))
            .margin(15)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(start..end, y_min..y_max)
            .map_err(draw_error)?;

        ctx.configure_mesh()
            .x_desc("Date")
            .y_desc("Close Price")
            .x_label_formatter(&|d: &NaiveDate| d.format("%Y-%m").to_string())
            .draw()
            .map_err(draw_error)?;

        for (series, label, color) in [
            (&chart.train, "Train", TRAIN_COLOR),
            (&chart.valid, "Val", VALID_COLOR),
            (&chart.predictions, "Predictions", PREDICTION_COLOR),
        ] {
            if series.is_empty() {
                continue;
            }
            ctx.draw_series(LineSeries::new(
                series.iter().map(|p| (p.date, p.value)),
                &color,
            ))
            .map_err(draw_error)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        }

        ctx.configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(draw_error)?;

        root_area.present().map_err(draw_error)?;
    }

    encode_png(&buffer, CHART_WIDTH, CHART_HEIGHT)
}

/// Encodes a packed RGB buffer as PNG.
pub fn encode_png(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ChartError> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(rgb, width, height, ColorType::Rgb8)?;
    Ok(png)
}

fn draw_error<E: std::error::Error + Send + Sync>(e: DrawingAreaErrorKind<E>) -> ChartError {
    ChartError::Draw(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn series(n: usize) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| PricePoint {
                date: start + Duration::days(i as i64),
                value: 100.0 + i as f64,
            })
            .collect()
    }

    #[test]
    fn title_drops_exchange_suffix() {
        assert_eq!(chart_title("RELIANCE.NS"), "Predictions for RELIANCE");
        assert_eq!(chart_title("^NSEBANK"), "Predictions for ^NSEBANK");
    }

    #[test]
    fn predictions_are_dated_against_held_out_points() {
        let points = series(10);
        let forecast = Forecast {
            training_len: 7,
            predictions: vec![1.0, 2.0, 3.0],
        };
        let chart = PredictionChart::new("AAPL", &points, &forecast);

        assert_eq!(chart.train.len(), 7);
        assert_eq!(chart.valid.len(), 3);
        assert_eq!(chart.predictions.len(), 3);
        assert_eq!(chart.predictions[0].date, points[7].date);
        assert_eq!(chart.predictions[2].value, 3.0);
    }

    #[test]
    fn missing_predictions_leave_only_history() {
        let points = series(20);
        let forecast = Forecast {
            training_len: 19,
            predictions: Vec::new(),
        };
        let chart = PredictionChart::new("AAPL", &points, &forecast);
        assert_eq!(chart.train.len() + chart.valid.len(), 20);
        assert!(chart.predictions.is_empty());
    }

    #[test]
    fn bounds_pad_flat_series() {
        let mut points = series(1);
        points[0].value = 50.0;
        let chart = PredictionChart::new("X", &points, &Forecast { training_len: 1, predictions: Vec::new() });
        let ((start, end), (lo, hi)) = chart.bounds().unwrap();
        assert_eq!(end - start, Duration::days(1));
        assert_eq!((lo, hi), (49.0, 51.0));
    }

    #[test]
    fn empty_chart_is_an_error() {
        let chart = PredictionChart::new("X", &[], &Forecast { training_len: 0, predictions: Vec::new() });
        assert!(matches!(render_prediction_chart(&chart), Err(ChartError::EmptySeries)));
    }

    #[test]
    fn encodes_rgb_buffer_as_png() {
        let rgb = vec![255u8; 4 * 3 * 3];
        let png = encode_png(&rgb, 4, 3).unwrap();
        assert_eq!(png[..8], PNG_SIGNATURE);
    }

    #[test]
    fn renders_prediction_chart_to_png() {
        let points = series(120);
        let forecast = Forecast {
            training_len: 114,
            predictions: (0..6).map(|i| 215.0 + i as f64).collect(),
        };
        let chart = PredictionChart::new("INFY.NS", &points, &forecast);
        let png = render_prediction_chart(&chart).unwrap();
        assert_eq!(png[..8], PNG_SIGNATURE);
    }
}
