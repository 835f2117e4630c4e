//! Stockout classifiers
//!
//! Feed-forward MLP implemented in pure Rust, plus a logistic-regression
//! baseline. Both expose the same `Classifier` capability so the trainer
//! never depends on a concrete model family.
//!
//! Architecture (default): Input(6) → Linear(64) → ReLU → Dropout(0.2)
//! → Linear(32) → ReLU → Dropout(0.2) → Linear(1) → Sigmoid

use super::dataset::Sample;
use super::features::{FeatureVector, FEATURE_COUNT};
use crate::error::{PipelineError, PipelineResult, Stage};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Mean loss and flat gradient over one mini-batch
#[derive(Debug, Clone)]
pub struct BatchGradients {
    pub loss: f64,
    pub gradients: Vec<f64>,
}

/// Binary classifier trainable by first-order optimization
///
/// `parameters`, `update` and `batch_gradients` all use the same flat
/// parameter layout.
pub trait Classifier: Clone + Send + Sync {
    /// Stockout probability in [0, 1]; deterministic for fixed parameters
    fn predict_proba(&self, features: &FeatureVector) -> f64;

    fn parameters(&self) -> Vec<f64>;

    fn parameter_count(&self) -> usize {
        self.parameters().len()
    }

    /// Add `delta` to the parameters
    fn update(&mut self, delta: &[f64]);

    /// Binary cross-entropy and its gradient. Stochastic regularization is
    /// only applied when a training RNG is supplied.
    fn batch_gradients(&self, batch: &[Sample], training_rng: Option<&mut ChaCha8Rng>)
        -> BatchGradients;
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// BCE computed from the logit, finite for any finite logit
pub fn bce_with_logit(logit: f64, target: f64) -> f64 {
    logit.max(0.0) - logit * target + (-logit.abs()).exp().ln_1p()
}

/// BCE on a probability, clamped away from 0 and 1
pub fn bce(probability: f64, target: f64) -> f64 {
    let p = probability.clamp(1e-7, 1.0 - 1e-7);
    -(target * p.ln() + (1.0 - target) * (1.0 - p).ln())
}

/// Fully connected layer, weights stored `[outputs x inputs]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dense {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl Dense {
    /// Uniform(-1/sqrt(fan_in), 1/sqrt(fan_in)) for weights and bias
    fn init(inputs: usize, outputs: usize, rng: &mut ChaCha8Rng) -> Self {
        let bound = 1.0 / (inputs as f64).sqrt();
        let weights = (0..outputs)
            .map(|_| (0..inputs).map(|_| rng.random_range(-bound..bound)).collect())
            .collect();
        let bias = (0..outputs).map(|_| rng.random_range(-bound..bound)).collect();
        Self { weights, bias }
    }

    fn zeros_like(other: &Dense) -> Self {
        Self {
            weights: other.weights.iter().map(|r| vec![0.0; r.len()]).collect(),
            bias: vec![0.0; other.bias.len()],
        }
    }

    fn inputs(&self) -> usize {
        self.weights.first().map(|r| r.len()).unwrap_or(0)
    }

    fn outputs(&self) -> usize {
        self.bias.len()
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect()
    }

    fn is_valid(&self) -> bool {
        let inputs = self.inputs();
        inputs > 0
            && self.weights.len() == self.bias.len()
            && self.weights.iter().all(|r| r.len() == inputs)
            && self
                .weights
                .iter()
                .flatten()
                .chain(&self.bias)
                .all(|v| v.is_finite())
    }
}

fn flatten(layers: &[Dense]) -> Vec<f64> {
    let mut out = Vec::new();
    for layer in layers {
        for row in &layer.weights {
            out.extend_from_slice(row);
        }
        out.extend_from_slice(&layer.bias);
    }
    out
}

fn add_flat(layers: &mut [Dense], delta: &[f64]) {
    let mut it = delta.iter().copied();
    for layer in layers {
        for w in layer.weights.iter_mut().flatten() {
            *w += it.next().unwrap_or(0.0);
        }
        for b in &mut layer.bias {
            *b += it.next().unwrap_or(0.0);
        }
    }
}

/// Multilayer perceptron with ReLU hidden layers and a sigmoid output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpClassifier {
    /// Hidden layers followed by the single-unit output layer
    layers: Vec<Dense>,
    /// Probability of zeroing a hidden activation during training
    dropout: f64,
}

impl MlpClassifier {
    /// Create a network with random weights drawn from `seed`
    pub fn new(hidden_sizes: &[usize], dropout: f64, seed: u64) -> PipelineResult<Self> {
        if hidden_sizes.is_empty() || hidden_sizes.contains(&0) {
            return Err(PipelineError::data(
                Stage::Train,
                "MLP needs at least one hidden layer and no empty layers",
            ));
        }
        if !(0.0..1.0).contains(&dropout) {
            return Err(PipelineError::data(
                Stage::Train,
                format!("dropout must be in [0, 1), got {dropout}"),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut layers = Vec::with_capacity(hidden_sizes.len() + 1);
        let mut inputs = FEATURE_COUNT;
        for &width in hidden_sizes {
            layers.push(Dense::init(inputs, width, &mut rng));
            inputs = width;
        }
        layers.push(Dense::init(inputs, 1, &mut rng));

        Ok(Self { layers, dropout })
    }

    pub fn hidden_sizes(&self) -> Vec<usize> {
        self.layers[..self.layers.len().saturating_sub(1)]
            .iter()
            .map(Dense::outputs)
            .collect()
    }

    pub fn dropout(&self) -> f64 {
        self.dropout
    }

    fn logit(&self, x: &[f64]) -> f64 {
        let Some((output, hidden)) = self.layers.split_last() else {
            return 0.0;
        };
        let mut a = x.to_vec();
        for layer in hidden {
            a = layer.forward(&a);
            for v in &mut a {
                *v = v.max(0.0);
            }
        }
        output.forward(&a).first().copied().unwrap_or(0.0)
    }

    /// Shape and value check for networks that come from outside
    pub fn is_valid(&self) -> bool {
        let Some(first) = self.layers.first() else {
            return false;
        };
        let chained = self
            .layers
            .windows(2)
            .all(|pair| pair[0].outputs() == pair[1].inputs());
        self.layers.len() >= 2
            && first.inputs() == FEATURE_COUNT
            && self.layers.last().map(Dense::outputs) == Some(1)
            && chained
            && self.layers.iter().all(Dense::is_valid)
            && (0.0..1.0).contains(&self.dropout)
    }
}

impl Classifier for MlpClassifier {
    fn predict_proba(&self, features: &FeatureVector) -> f64 {
        sigmoid(self.logit(&features.values))
    }

    fn parameters(&self) -> Vec<f64> {
        flatten(&self.layers)
    }

    fn update(&mut self, delta: &[f64]) {
        debug_assert_eq!(delta.len(), self.parameter_count());
        add_flat(&mut self.layers, delta);
    }

    fn batch_gradients(
        &self,
        batch: &[Sample],
        mut training_rng: Option<&mut ChaCha8Rng>,
    ) -> BatchGradients {
        let mut grads: Vec<Dense> = self.layers.iter().map(Dense::zeros_like).collect();
        let hidden_count = self.layers.len() - 1;
        let keep_scale = 1.0 / (1.0 - self.dropout);
        let mut total_loss = 0.0;

        for sample in batch {
            // Forward pass, caching each layer's input, pre-activation and dropout mask
            let mut inputs: Vec<Vec<f64>> = vec![sample.features.values.to_vec()];
            let mut pre_activations: Vec<Vec<f64>> = Vec::with_capacity(hidden_count);
            let mut masks: Vec<Vec<f64>> = Vec::with_capacity(hidden_count);

            for layer in &self.layers[..hidden_count] {
                let z = layer.forward(&inputs[inputs.len() - 1]);
                let mask: Vec<f64> = match training_rng.as_deref_mut() {
                    Some(rng) if self.dropout > 0.0 => z
                        .iter()
                        .map(|_| if rng.random_bool(self.dropout) { 0.0 } else { keep_scale })
                        .collect(),
                    _ => vec![1.0; z.len()],
                };
                let a = z.iter().zip(&mask).map(|(v, m)| v.max(0.0) * m).collect();
                pre_activations.push(z);
                masks.push(mask);
                inputs.push(a);
            }

            let logit = self.layers[hidden_count]
                .forward(&inputs[hidden_count])
                .first()
                .copied()
                .unwrap_or(0.0);
            let target = sample.target();
            total_loss += bce_with_logit(logit, target);

            // Backward pass (sigmoid + BCE gives p - y at the logit)
            let mut delta = vec![sigmoid(logit) - target];
            for l in (0..self.layers.len()).rev() {
                let input = &inputs[l];
                for (i, d) in delta.iter().enumerate() {
                    grads[l].bias[i] += d;
                    for (g, x) in grads[l].weights[i].iter_mut().zip(input) {
                        *g += d * x;
                    }
                }
                if l == 0 {
                    break;
                }

                let mut prev = vec![0.0; input.len()];
                for (row, d) in self.layers[l].weights.iter().zip(&delta) {
                    for (p, w) in prev.iter_mut().zip(row) {
                        *p += w * d;
                    }
                }
                // Through the dropout mask and ReLU of the hidden layer below
                for (j, p) in prev.iter_mut().enumerate() {
                    if pre_activations[l - 1][j] <= 0.0 {
                        *p = 0.0;
                    } else {
                        *p *= masks[l - 1][j];
                    }
                }
                delta = prev;
            }
        }

        let n = batch.len().max(1) as f64;
        let mut gradients = flatten(&grads);
        for g in &mut gradients {
            *g /= n;
        }

        BatchGradients {
            loss: total_loss / n,
            gradients,
        }
    }
}

/// Logistic regression over the six features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticClassifier {
    weights: [f64; FEATURE_COUNT],
    bias: f64,
}

impl LogisticClassifier {
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let bound = 1.0 / (FEATURE_COUNT as f64).sqrt();
        let mut weights = [0.0; FEATURE_COUNT];
        for w in &mut weights {
            *w = rng.random_range(-bound..bound);
        }
        Self { weights, bias: 0.0 }
    }

    fn logit(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + self.bias
    }

    pub fn is_valid(&self) -> bool {
        self.weights.iter().all(|w| w.is_finite()) && self.bias.is_finite()
    }
}

impl Classifier for LogisticClassifier {
    fn predict_proba(&self, features: &FeatureVector) -> f64 {
        sigmoid(self.logit(&features.values))
    }

    fn parameters(&self) -> Vec<f64> {
        let mut params = self.weights.to_vec();
        params.push(self.bias);
        params
    }

    fn update(&mut self, delta: &[f64]) {
        for (w, d) in self.weights.iter_mut().zip(delta) {
            *w += d;
        }
        if let Some(d) = delta.get(FEATURE_COUNT) {
            self.bias += d;
        }
    }

    fn batch_gradients(&self, batch: &[Sample], _training_rng: Option<&mut ChaCha8Rng>) -> BatchGradients {
        let mut gradients = vec![0.0; FEATURE_COUNT + 1];
        let mut total_loss = 0.0;
        for sample in batch {
            let logit = self.logit(&sample.features.values);
            let target = sample.target();
            total_loss += bce_with_logit(logit, target);
            let d = sigmoid(logit) - target;
            for (g, x) in gradients.iter_mut().zip(sample.features.values) {
                *g += d * x;
            }
            gradients[FEATURE_COUNT] += d;
        }

        let n = batch.len().max(1) as f64;
        for g in &mut gradients {
            *g /= n;
        }
        BatchGradients {
            loss: total_loss / n,
            gradients,
        }
    }
}

/// Model family selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Mlp,
    Logistic,
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mlp" => Ok(Self::Mlp),
            "logistic" => Ok(Self::Logistic),
            other => Err(format!("unknown model kind '{other}' (expected mlp or logistic)")),
        }
    }
}

/// Model hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub hidden_sizes: Vec<usize>,
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Mlp,
            hidden_sizes: vec![64, 32],
            dropout: 0.2,
        }
    }
}

/// The concrete classifier the pipeline trains, persists and serves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StockoutModel {
    Mlp(MlpClassifier),
    Logistic(LogisticClassifier),
}

impl StockoutModel {
    pub fn from_config(config: &ModelConfig, seed: u64) -> PipelineResult<Self> {
        Ok(match config.kind {
            ModelKind::Mlp => Self::Mlp(MlpClassifier::new(&config.hidden_sizes, config.dropout, seed)?),
            ModelKind::Logistic => Self::Logistic(LogisticClassifier::new(seed)),
        })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Mlp(_) => ModelKind::Mlp,
            Self::Logistic(_) => ModelKind::Logistic,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Self::Mlp(m) => m.is_valid(),
            Self::Logistic(m) => m.is_valid(),
        }
    }
}

impl Classifier for StockoutModel {
    fn predict_proba(&self, features: &FeatureVector) -> f64 {
        match self {
            Self::Mlp(m) => m.predict_proba(features),
            Self::Logistic(m) => m.predict_proba(features),
        }
    }

    fn parameters(&self) -> Vec<f64> {
        match self {
            Self::Mlp(m) => m.parameters(),
            Self::Logistic(m) => m.parameters(),
        }
    }

    fn update(&mut self, delta: &[f64]) {
        match self {
            Self::Mlp(m) => m.update(delta),
            Self::Logistic(m) => m.update(delta),
        }
    }

    fn batch_gradients(&self, batch: &[Sample], training_rng: Option<&mut ChaCha8Rng>) -> BatchGradients {
        match self {
            Self::Mlp(m) => m.batch_gradients(batch, training_rng),
            Self::Logistic(m) => m.batch_gradients(batch, training_rng),
        }
    }
}
