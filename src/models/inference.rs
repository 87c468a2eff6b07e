// src/models/inference.rs

use std::sync::Arc;

use log::{debug, warn};

use crate::models::{ModelError, SequenceModel};
use crate::utils::data_processing::{make_windows, ForecastSplit, MinMaxScaler, TRAIN_RATIO};

/// Predictions for the held-out tail of a price series.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    /// Number of leading points treated as training context.
    pub training_len: usize,
    /// One price per held-out point, empty when the series is too short.
    pub predictions: Vec<f64>,
}

/// Inference front for the model loaded at startup. Cloning shares the model.
#[derive(Clone)]
pub struct InferenceService {
    model: Arc<dyn SequenceModel>,
}

impl InferenceService {
    pub fn new(model: Arc<dyn SequenceModel>) -> Self {
        InferenceService { model }
    }

    pub fn window_size(&self) -> usize {
        self.model.window_size()
    }

    /// Runs the model over each window and maps the outputs back to prices.
    pub fn predict(&self, windows: &[Vec<f64>], scaler: &MinMaxScaler) -> Result<Vec<f64>, ModelError> {
        let outputs = windows
            .iter()
            .map(|window| self.model.predict(window))
            .collect::<Result<Vec<f64>, ModelError>>()?;
        Ok(scaler.inverse_transform_all(&outputs))
    }

    /// Scales `prices`, splits off the held-out tail and predicts every point of it.
    pub fn forecast(&self, prices: &[f64]) -> Result<Forecast, ModelError> {
        let window_size = self.window_size();
        let split = ForecastSplit::new(prices.len(), window_size, TRAIN_RATIO);

        let scaler = match MinMaxScaler::fit(prices) {
            Some(scaler) => scaler,
            None => {
                return Ok(Forecast {
                    training_len: 0,
                    predictions: Vec::new(),
                })
            }
        };

        let windows: Vec<Vec<f64>> = match split.inference_start() {
            Some(start) => {
                let scaled = scaler.transform_all(&prices[start..]);
                make_windows(&scaled, window_size)
                    .into_iter()
                    .map(|(window, _)| window)
                    .collect()
            }
            None => Vec::new(),
        };

        if windows.is_empty() {
            warn!(
                "Series of {} points is too short for a {}-point window; skipping predictions",
                prices.len(),
                window_size
            );
        }
        debug!(
            "Forecasting {} of {} held-out points after {} training points",
            windows.len(),
            split.held_out_len(),
            split.training_len
        );

        let predictions = self.predict(&windows, &scaler)?;
        Ok(Forecast {
            training_len: split.training_len,
            predictions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::network::tests::tiny_model_json;
    use crate::models::LstmRegressor;
    use crate::utils::data_processing::WINDOW_SIZE;

    /// Always predicts the last value of the window.
    struct Persistence {
        window_size: usize,
    }

    impl SequenceModel for Persistence {
        fn window_size(&self) -> usize {
            self.window_size
        }

        fn predict(&self, window: &[f64]) -> Result<f64, ModelError> {
            window.last().copied().ok_or(ModelError::WindowLength {
                expected: self.window_size,
                actual: 0,
            })
        }
    }

    fn service(window_size: usize) -> InferenceService {
        InferenceService::new(Arc::new(Persistence { window_size }))
    }

    #[test]
    fn forecast_covers_the_held_out_tail() {
        let prices: Vec<f64> = (0..250).map(|i| 1000.0 + i as f64).collect();
        let forecast = service(WINDOW_SIZE).forecast(&prices).unwrap();

        assert_eq!(forecast.training_len, 238);
        assert_eq!(forecast.predictions.len(), 12);
        // Persistence predicts yesterday's price, in price units.
        for (k, predicted) in forecast.predictions.iter().enumerate() {
            let expected = prices[forecast.training_len + k - 1];
            assert!((predicted - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn short_series_produce_no_predictions() {
        let prices: Vec<f64> = (0..40).map(|i| 50.0 + i as f64).collect();
        let forecast = service(WINDOW_SIZE).forecast(&prices).unwrap();
        assert_eq!(forecast.training_len, 38);
        assert!(forecast.predictions.is_empty());

        let empty = service(WINDOW_SIZE).forecast(&[]).unwrap();
        assert_eq!(empty.training_len, 0);
        assert!(empty.predictions.is_empty());
    }

    #[test]
    fn predict_inverse_scales_model_output() {
        let scaler = MinMaxScaler::fit(&[100.0, 200.0]).unwrap();
        let windows = vec![vec![0.0, 0.5], vec![0.5, 1.0]];
        let prices = service(2).predict(&windows, &scaler).unwrap();
        assert_eq!(prices, vec![150.0, 200.0]);
    }

    #[test]
    fn lstm_forecast_is_repeatable() {
        let model = LstmRegressor::from_json(&tiny_model_json(WINDOW_SIZE)).unwrap();
        let service = InferenceService::new(Arc::new(model));
        let prices: Vec<f64> = (0..300).map(|i| 200.0 + (i as f64 / 7.0).sin() * 15.0).collect();

        let first = service.forecast(&prices).unwrap();
        let second = service.forecast(&prices).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.predictions.len(), 300 - 285);
    }
}
