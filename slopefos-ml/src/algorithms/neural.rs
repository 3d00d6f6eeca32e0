//! Multi-layer perceptron regressor.
//!
//! ReLU hidden layers, a linear output unit, squared-error loss with an L2
//! penalty, and mini-batch Adam. With early stopping enabled a slice of the
//! training rows is held out and the weights with the best validation R²
//! are kept.

use super::{Regressor, check_features, check_training_data};
use crate::error::MlError;
use crate::training::metrics::r2_score;
use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use slopefos_core::config::MlpParams;

const BETA_1: f64 = 0.9;
const BETA_2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
/// Fewer rows than this trains without a validation hold-out.
const MIN_ROWS_FOR_VALIDATION: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpRegressor {
    layers: Layers,
    epochs_run: usize,
    best_validation_r2: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Layers {
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
}

struct Adam {
    step: i32,
    learning_rate: f64,
    m_w: Vec<Array2<f64>>,
    v_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    v_b: Vec<Array1<f64>>,
}

impl Layers {
    /// Glorot-uniform initialization.
    fn init(sizes: &[usize], rng: &mut ChaCha8Rng) -> Self {
        let mut weights = Vec::with_capacity(sizes.len() - 1);
        let mut biases = Vec::with_capacity(sizes.len() - 1);
        for pair in sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
            weights.push(Array2::from_shape_fn((fan_in, fan_out), |_| {
                rng.gen_range(-bound..bound)
            }));
            biases.push(Array1::from_shape_fn(fan_out, |_| rng.gen_range(-bound..bound)));
        }
        Self { weights, biases }
    }

    /// Activations of every layer, input first.
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let last = self.weights.len() - 1;
        let mut activations = Vec::with_capacity(self.weights.len() + 1);
        activations.push(x.clone());
        for (l, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let mut z = activations[l].dot(w) + b;
            if l < last {
                z.mapv_inplace(|v| v.max(0.0));
            }
            activations.push(z);
        }
        activations
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut activations = self.forward(x);
        let output = activations.pop().unwrap_or_else(|| Array2::zeros((x.nrows(), 1)));
        output.column(0).to_owned()
    }

    /// Gradients of the penalized squared error for one batch.
    fn gradients(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        alpha: f64,
    ) -> (Vec<Array2<f64>>, Vec<Array1<f64>>, f64) {
        let m = x.nrows() as f64;
        let activations = self.forward(x);
        let n_layers = self.weights.len();
        let output = &activations[n_layers];
        let mut delta = output - &y.view().insert_axis(Axis(1));
        let loss = delta.mapv(|d| d * d).sum() / (2.0 * m);

        let mut grad_w = vec![Array2::zeros((0, 0)); n_layers];
        let mut grad_b = vec![Array1::zeros(0); n_layers];
        for l in (0..n_layers).rev() {
            grad_w[l] = (activations[l].t().dot(&delta) + &self.weights[l] * alpha) / m;
            grad_b[l] = delta.sum_axis(Axis(0)) / m;
            if l > 0 {
                let mut back = delta.dot(&self.weights[l].t());
                Zip::from(&mut back)
                    .and(&activations[l])
                    .for_each(|d, &a| {
                        if a <= 0.0 {
                            *d = 0.0;
                        }
                    });
                delta = back;
            }
        }
        (grad_w, grad_b, loss)
    }
}

impl Adam {
    fn new(layers: &Layers, learning_rate: f64) -> Self {
        Self {
            step: 0,
            learning_rate,
            m_w: layers.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            v_w: layers.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            m_b: layers.biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect(),
            v_b: layers.biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect(),
        }
    }

    fn update(&mut self, layers: &mut Layers, grad_w: &[Array2<f64>], grad_b: &[Array1<f64>]) {
        self.step += 1;
        let lr = self.learning_rate * (1.0 - BETA_2.powi(self.step)).sqrt()
            / (1.0 - BETA_1.powi(self.step));
        for l in 0..layers.weights.len() {
            adam_step(&mut layers.weights[l], &grad_w[l], &mut self.m_w[l], &mut self.v_w[l], lr);
            adam_step(&mut layers.biases[l], &grad_b[l], &mut self.m_b[l], &mut self.v_b[l], lr);
        }
    }
}

fn adam_step<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr: f64,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = BETA_1 * *m + (1.0 - BETA_1) * g;
            *v = BETA_2 * *v + (1.0 - BETA_2) * g * g;
            *p -= lr * *m / (v.sqrt() + ADAM_EPSILON);
        });
}

fn validate(params: &MlpParams) -> Result<(), MlError> {
    if params.hidden_layers.is_empty() || params.hidden_layers.contains(&0) {
        return Err(MlError::training(
            "hidden layers must be non-empty and every layer needs at least one unit",
        ));
    }
    if !(params.learning_rate > 0.0 && params.learning_rate.is_finite()) {
        return Err(MlError::training(format!(
            "learning rate must be positive, got {}",
            params.learning_rate
        )));
    }
    if params.alpha < 0.0 {
        return Err(MlError::training("alpha must be non-negative"));
    }
    if params.batch_size == 0 || params.max_iter == 0 {
        return Err(MlError::training("batch_size and max_iter must be at least 1"));
    }
    let fraction = params.validation_fraction;
    if params.early_stopping && !(fraction > 0.0 && fraction < 1.0) {
        return Err(MlError::training(format!(
            "validation_fraction must be in (0, 1), got {fraction}"
        )));
    }
    Ok(())
}

impl MlpRegressor {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &MlpParams) -> Result<Self, MlError> {
        check_training_data(x, y)?;
        validate(params)?;

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let mut sizes = Vec::with_capacity(params.hidden_layers.len() + 2);
        sizes.push(x.ncols());
        sizes.extend_from_slice(&params.hidden_layers);
        sizes.push(1);
        let mut layers = Layers::init(&sizes, &mut rng);
        let mut adam = Adam::new(&layers, params.learning_rate);

        let n = x.nrows();
        let mut order: Vec<usize> = (0..n).collect();
        let n_val = ((n as f64 * params.validation_fraction).ceil() as usize).max(1);
        let (mut train_rows, validation) =
            if params.early_stopping && n >= MIN_ROWS_FOR_VALIDATION && n_val < n {
                order.shuffle(&mut rng);
                let (val, train) = order.split_at(n_val);
                let x_val = x.select(Axis(0), val);
                let y_val = y.select(Axis(0), val);
                (train.to_vec(), Some((x_val, y_val)))
            } else {
                (order, None)
            };

        let batch_size = params.batch_size.min(train_rows.len());
        let mut best_loss = f64::INFINITY;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_layers: Option<Layers> = None;
        let mut stale_epochs = 0;
        let mut epochs_run = 0;

        for _ in 0..params.max_iter {
            epochs_run += 1;
            train_rows.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for batch in train_rows.chunks(batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb = y.select(Axis(0), batch);
                let (grad_w, grad_b, loss) = layers.gradients(&xb, &yb, params.alpha);
                adam.update(&mut layers, &grad_w, &grad_b);
                epoch_loss += loss * batch.len() as f64;
            }
            epoch_loss /= train_rows.len() as f64;
            if !epoch_loss.is_finite() {
                return Err(MlError::training("MLP loss diverged"));
            }

            let improved = match &validation {
                Some((x_val, y_val)) => {
                    let score = r2_score(y_val, &layers.predict(x_val));
                    let improved = score > best_score + params.tol;
                    if score > best_score {
                        best_score = score;
                        best_layers = Some(layers.clone());
                    }
                    improved
                }
                None => {
                    let improved = epoch_loss < best_loss - params.tol;
                    best_loss = best_loss.min(epoch_loss);
                    improved
                }
            };
            if improved {
                stale_epochs = 0;
            } else {
                stale_epochs += 1;
                if stale_epochs > params.n_iter_no_change {
                    break;
                }
            }
        }

        if let Some(best) = best_layers {
            layers = best;
        }
        tracing::debug!(
            epochs = epochs_run,
            validation_r2 = validation.as_ref().map(|_| best_score),
            "MLP training finished"
        );
        Ok(Self {
            layers,
            epochs_run,
            best_validation_r2: validation.map(|_| best_score),
        })
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs_run
    }

    pub fn best_validation_r2(&self) -> Option<f64> {
        self.best_validation_r2
    }
}

impl Regressor for MlpRegressor {
    fn n_features(&self) -> usize {
        self.layers.weights.first().map_or(0, |w| w.nrows())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        check_features(self.n_features(), x)?;
        Ok(self.layers.predict(x))
    }
}
