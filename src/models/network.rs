use log::debug;
use ndarray::{s, Array1, Array2};
use serde::Deserialize;
use thiserror::Error;

use crate::utils::data_processing::WINDOW_SIZE;

/// A frozen regressor mapping a window of normalized prices to the next one.
pub trait SequenceModel: Send + Sync {
    /// Number of values the model expects per window.
    fn window_size(&self) -> usize;

    fn predict(&self, window: &[f64]) -> Result<f64, ModelError>;
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read model file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid model shape: {0}")]
    Shape(String),

    #[error("Expected a window of {expected} values, got {actual}")]
    WindowLength { expected: usize, actual: usize },
}

/// Activation applied by a dense layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => relu(x),
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
        }
    }
}

/// On-disk layout of an exported model. Matrices are row-major, Keras layout.
#[derive(Debug, Deserialize)]
struct ModelFile {
    #[serde(default = "default_window_size")]
    window_size: usize,
    layers: Vec<LayerSpec>,
}

fn default_window_size() -> usize {
    WINDOW_SIZE
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum LayerSpec {
    Lstm {
        units: usize,
        kernel: Vec<Vec<f64>>,
        recurrent_kernel: Vec<Vec<f64>>,
        bias: Vec<f64>,
        #[serde(default)]
        return_sequences: bool,
    },
    Dense {
        kernel: Vec<Vec<f64>>,
        bias: Vec<f64>,
        #[serde(default)]
        activation: Activation,
    },
}

/// LSTM layer with gates ordered input, forget, cell, output.
#[derive(Debug, Clone)]
struct LstmLayer {
    units: usize,
    kernel: Array2<f64>,
    recurrent_kernel: Array2<f64>,
    bias: Array1<f64>,
    return_sequences: bool,
}

#[derive(Debug, Clone)]
struct DenseLayer {
    kernel: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

#[derive(Debug, Clone)]
enum Layer {
    Lstm(LstmLayer),
    Dense(DenseLayer),
}

enum Signal {
    Sequence(Vec<Array1<f64>>),
    Vector(Array1<f64>),
}

/// Stacked LSTM followed by dense layers, producing one scalar per window.
#[derive(Debug, Clone)]
pub struct LstmRegressor {
    window_size: usize,
    layers: Vec<Layer>,
}

impl LstmRegressor {
    /// Loads the network weights from a JSON file.
    pub fn load_from_file(path: &str) -> Result<Self, ModelError> {
        let data = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ModelError> {
        let file: ModelFile = serde_json::from_str(data)?;
        Self::from_spec(file)
    }

    fn from_spec(file: ModelFile) -> Result<Self, ModelError> {
        if file.window_size != WINDOW_SIZE {
            return Err(ModelError::Shape(format!(
                "window_size must be {}, got {}",
                WINDOW_SIZE, file.window_size
            )));
        }
        if file.layers.is_empty() {
            return Err(ModelError::Shape("model has no layers".into()));
        }

        // Input is a sequence of single prices.
        let mut width = 1;
        let mut sequence = true;
        let mut layers = Vec::with_capacity(file.layers.len());

        for (idx, spec) in file.layers.into_iter().enumerate() {
            match spec {
                LayerSpec::Lstm {
                    units,
                    kernel,
                    recurrent_kernel,
                    bias,
                    return_sequences,
                } => {
                    if !sequence {
                        return Err(ModelError::Shape(format!(
                            "layer {}: lstm must receive a sequence",
                            idx
                        )));
                    }
                    let gates = 4 * units;
                    let kernel = to_matrix(kernel, idx, "kernel")?;
                    let recurrent_kernel = to_matrix(recurrent_kernel, idx, "recurrent_kernel")?;
                    expect_dim(idx, "kernel", kernel.dim(), (width, gates))?;
                    expect_dim(idx, "recurrent_kernel", recurrent_kernel.dim(), (units, gates))?;
                    expect_len(idx, "bias", bias.len(), gates)?;

                    layers.push(Layer::Lstm(LstmLayer {
                        units,
                        kernel,
                        recurrent_kernel,
                        bias: Array1::from(bias),
                        return_sequences,
                    }));
                    width = units;
                    sequence = return_sequences;
                }
                LayerSpec::Dense {
                    kernel,
                    bias,
                    activation,
                } => {
                    if sequence {
                        return Err(ModelError::Shape(format!(
                            "layer {}: dense must follow an lstm without return_sequences",
                            idx
                        )));
                    }
                    let units = bias.len();
                    let kernel = to_matrix(kernel, idx, "kernel")?;
                    expect_dim(idx, "kernel", kernel.dim(), (width, units))?;

                    layers.push(Layer::Dense(DenseLayer {
                        kernel,
                        bias: Array1::from(bias),
                        activation,
                    }));
                    width = units;
                }
            }
        }

        if sequence || width != 1 {
            return Err(ModelError::Shape(format!(
                "model must end in a single output, got width {}",
                width
            )));
        }

        Ok(LstmRegressor {
            window_size: file.window_size,
            layers,
        })
    }
}

impl SequenceModel for LstmRegressor {
    fn window_size(&self) -> usize {
        self.window_size
    }

    fn predict(&self, window: &[f64]) -> Result<f64, ModelError> {
        if window.len() != self.window_size {
            return Err(ModelError::WindowLength {
                expected: self.window_size,
                actual: window.len(),
            });
        }

        let mut signal = Signal::Sequence(window.iter().map(|&x| Array1::from(vec![x])).collect());
        for layer in &self.layers {
            signal = match (layer, signal) {
                (Layer::Lstm(lstm), Signal::Sequence(steps)) => lstm.forward(&steps),
                (Layer::Dense(dense), Signal::Vector(v)) => Signal::Vector(dense.forward(&v)),
                _ => return Err(ModelError::Shape("layer received an unexpected input".into())),
            };
        }

        match signal {
            Signal::Vector(out) if out.len() == 1 => {
                debug!("Model output for window: {:.6}", out[0]);
                Ok(out[0])
            }
            _ => Err(ModelError::Shape("model did not produce a scalar".into())),
        }
    }
}

impl LstmLayer {
    fn forward(&self, steps: &[Array1<f64>]) -> Signal {
        let u = self.units;
        let mut h = Array1::<f64>::zeros(u);
        let mut c = Array1::<f64>::zeros(u);
        let mut outputs = Vec::with_capacity(if self.return_sequences { steps.len() } else { 0 });

        for x in steps {
            let z = x.dot(&self.kernel) + h.dot(&self.recurrent_kernel) + &self.bias;
            let i = z.slice(s![0..u]).mapv(sigmoid);
            let f = z.slice(s![u..2 * u]).mapv(sigmoid);
            let g = z.slice(s![2 * u..3 * u]).mapv(f64::tanh);
            let o = z.slice(s![3 * u..4 * u]).mapv(sigmoid);

            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f64::tanh);

            if self.return_sequences {
                outputs.push(h.clone());
            }
        }

        if self.return_sequences {
            Signal::Sequence(outputs)
        } else {
            Signal::Vector(h)
        }
    }
}

impl DenseLayer {
    fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        let activation = self.activation;
        (input.dot(&self.kernel) + &self.bias).mapv(|x| activation.apply(x))
    }
}

fn to_matrix(rows: Vec<Vec<f64>>, layer: usize, name: &str) -> Result<Array2<f64>, ModelError> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != n_cols) {
        return Err(ModelError::Shape(format!("layer {}: {} rows differ in length", layer, name)));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n_rows, n_cols), flat)
        .map_err(|e| ModelError::Shape(format!("layer {}: {}: {}", layer, name, e)))
}

fn expect_dim(
    layer: usize,
    name: &str,
    actual: (usize, usize),
    expected: (usize, usize),
) -> Result<(), ModelError> {
    if actual != expected {
        return Err(ModelError::Shape(format!(
            "layer {}: {} is {:?}, expected {:?}",
            layer, name, actual, expected
        )));
    }
    Ok(())
}

fn expect_len(layer: usize, name: &str, actual: usize, expected: usize) -> Result<(), ModelError> {
    if actual != expected {
        return Err(ModelError::Shape(format!(
            "layer {}: {} has {} values, expected {}",
            layer, name, actual, expected
        )));
    }
    Ok(())
}

/// Activation functions

/// ReLU activation function
fn relu(x: f64) -> f64 {
    if x > 0.0 { x } else { 0.0 }
}

/// Sigmoid activation function
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One-unit LSTM whose cell candidate follows the input, then an identity head.
    pub(crate) fn tiny_model_json(window_size: usize) -> String {
        format!(
            r#"{{
                "window_size": {window_size},
                "layers": [
                    {{"type": "lstm", "units": 1,
                      "kernel": [[0.0, 0.0, 1.0, 0.0]],
                      "recurrent_kernel": [[0.0, 0.0, 0.0, 0.0]],
                      "bias": [0.0, 0.0, 0.0, 0.0]}},
                    {{"type": "dense", "kernel": [[1.0]], "bias": [0.0]}}
                ]
            }}"#
        )
    }

    #[test]
    fn output_follows_the_cell_recurrence() {
        let model = LstmRegressor::from_json(&tiny_model_json(WINDOW_SIZE)).unwrap();
        let window: Vec<f64> = (0..WINDOW_SIZE).map(|i| i as f64 / WINDOW_SIZE as f64).collect();

        // Zero gate weights leave i, f and o at sigmoid(0) = 0.5; g = tanh(x).
        let mut c = 0.0;
        for &x in &window {
            c = 0.5 * c + 0.5 * x.tanh();
        }
        let expected = 0.5 * c.tanh();

        let out = model.predict(&window).unwrap();
        assert!((out - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_weights_output_dense_bias() {
        let json = r#"{
            "window_size": 60,
            "layers": [
                {"type": "lstm", "units": 2,
                 "kernel": [[0,0,0,0,0,0,0,0]],
                 "recurrent_kernel": [[0,0,0,0,0,0,0,0],[0,0,0,0,0,0,0,0]],
                 "bias": [0,0,0,0,0,0,0,0],
                 "return_sequences": true},
                {"type": "lstm", "units": 1,
                 "kernel": [[0,0,0,0],[0,0,0,0]],
                 "recurrent_kernel": [[0,0,0,0]],
                 "bias": [0,0,0,0]},
                {"type": "dense", "kernel": [[2.0, 0.0]], "bias": [0.25, -1.0], "activation": "relu"},
                {"type": "dense", "kernel": [[1.0], [1.0]], "bias": [0.0]}
            ]
        }"#;
        let model = LstmRegressor::from_json(json).unwrap();
        assert_eq!(model.window_size(), WINDOW_SIZE);
        assert_eq!(model.predict(&[0.3; WINDOW_SIZE]).unwrap(), 0.25);
    }

    #[test]
    fn other_window_sizes_are_rejected_at_load() {
        for size in [0, 1, 30, 61] {
            match LstmRegressor::from_json(&tiny_model_json(size)) {
                Err(ModelError::Shape(message)) => assert!(message.contains("window_size"), "{}", message),
                other => panic!("window_size {} accepted: {:?}", size, other),
            }
        }
    }

    #[test]
    fn inference_is_deterministic() {
        let model = LstmRegressor::from_json(&tiny_model_json(WINDOW_SIZE)).unwrap();
        let window: Vec<f64> = (0..WINDOW_SIZE).map(|i| (i as f64 / 10.0).sin().abs()).collect();
        let first = model.predict(&window).unwrap();
        for _ in 0..5 {
            assert_eq!(model.predict(&window).unwrap(), first);
        }
    }

    #[test]
    fn wrong_window_length_is_rejected() {
        let model = LstmRegressor::from_json(&tiny_model_json(WINDOW_SIZE)).unwrap();
        match model.predict(&[0.5; 10]) {
            Err(ModelError::WindowLength { expected, actual }) => {
                assert_eq!(expected, WINDOW_SIZE);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn mismatched_shapes_fail_at_load() {
        let bad_bias = r#"{"layers": [
            {"type": "lstm", "units": 1, "kernel": [[0,0,0,0]],
             "recurrent_kernel": [[0,0,0,0]], "bias": [0,0,0]},
            {"type": "dense", "kernel": [[1.0]], "bias": [0.0]}
        ]}"#;
        assert!(matches!(LstmRegressor::from_json(bad_bias), Err(ModelError::Shape(_))));

        let sequence_output = r#"{"layers": [
            {"type": "lstm", "units": 1, "kernel": [[0,0,0,0]],
             "recurrent_kernel": [[0,0,0,0]], "bias": [0,0,0,0], "return_sequences": true}
        ]}"#;
        assert!(matches!(LstmRegressor::from_json(sequence_output), Err(ModelError::Shape(_))));

        let wide_output = r#"{"layers": [
            {"type": "lstm", "units": 1, "kernel": [[0,0,0,0]],
             "recurrent_kernel": [[0,0,0,0]], "bias": [0,0,0,0]},
            {"type": "dense", "kernel": [[1.0, 1.0]], "bias": [0.0, 0.0]}
        ]}"#;
        assert!(matches!(LstmRegressor::from_json(wide_output), Err(ModelError::Shape(_))));

        assert!(matches!(LstmRegressor::from_json("not json"), Err(ModelError::Parse(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = LstmRegressor::load_from_file("does/not/exist.json").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.json"));
    }
}
