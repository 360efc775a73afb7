//! Softmax regression backend
//!
//! A small multinomial logistic regression trained with mini-batch gradient
//! descent on standardized features. It exists so the workbench runs end to
//! end without an external service; any `ClassifierBackend` can replace it.

use super::classifier::{BackendError, ClassifierBackend, ClassifierModel, FitRequest};
use super::types::EpochProgress;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

const DEFAULT_SEED: u64 = 42;

/// Reference trainable classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxBackend;

impl SoftmaxBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClassifierBackend for SoftmaxBackend {
    fn name(&self) -> &'static str {
        "softmax"
    }

    async fn fit(
        &self,
        request: FitRequest,
        progress: mpsc::UnboundedSender<EpochProgress>,
    ) -> Result<Box<dyn ClassifierModel>, BackendError> {
        let model = tokio::task::spawn_blocking(move || train_softmax(&request, &progress))
            .await
            .map_err(|e| BackendError::Training(format!("training task panicked: {e}")))??;
        Ok(Box::new(model))
    }

    fn load(&self, blob: &[u8]) -> Result<Box<dyn ClassifierModel>, BackendError> {
        let model: SoftmaxModel =
            serde_json::from_slice(blob).map_err(|e| BackendError::InvalidModel(e.to_string()))?;
        model.validate()?;
        Ok(Box::new(model))
    }
}

/// Trained softmax regression weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftmaxModel {
    pub num_classes: usize,
    pub input_len: usize,
    /// Row-major `num_classes x input_len`
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    pub feature_mean: Vec<f32>,
    pub feature_std: Vec<f32>,
}

impl SoftmaxModel {
    fn validate(&self) -> Result<(), BackendError> {
        if self.num_classes == 0 || self.input_len == 0 {
            return Err(BackendError::InvalidModel("empty model".to_string()));
        }
        if self.weights.len() != self.num_classes * self.input_len {
            return Err(BackendError::InvalidModel("weights length mismatch".to_string()));
        }
        if self.bias.len() != self.num_classes {
            return Err(BackendError::InvalidModel("bias length mismatch".to_string()));
        }
        if self.feature_mean.len() != self.input_len || self.feature_std.len() != self.input_len {
            return Err(BackendError::InvalidModel(
                "normalization length mismatch".to_string(),
            ));
        }
        Ok(())
    }

    fn normalize(&self, input: &[f32]) -> Vec<f32> {
        input
            .iter()
            .zip(self.feature_mean.iter().zip(&self.feature_std))
            .map(|(x, (mean, std))| (x - mean) / std.max(1e-6))
            .collect()
    }

    fn probabilities(&self, normalized: &[f32], out: &mut [f32]) {
        for (c, logit) in out.iter_mut().enumerate() {
            let row = &self.weights[c * self.input_len..(c + 1) * self.input_len];
            *logit = self.bias[c] + row.iter().zip(normalized).map(|(w, x)| w * x).sum::<f32>();
        }
        softmax_inplace(out);
    }
}

impl ClassifierModel for SoftmaxModel {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict(&self, input: &[f32]) -> Result<Vec<f32>, BackendError> {
        if input.len() != self.input_len {
            return Err(BackendError::Prediction(format!(
                "expected {} inputs, got {}",
                self.input_len,
                input.len()
            )));
        }
        let mut probs = vec![0.0; self.num_classes];
        self.probabilities(&self.normalize(input), &mut probs);
        Ok(probs)
    }

    fn save(&self) -> Result<Vec<u8>, BackendError> {
        serde_json::to_vec(self).map_err(|e| BackendError::InvalidModel(e.to_string()))
    }
}

fn train_softmax(
    request: &FitRequest,
    progress: &mpsc::UnboundedSender<EpochProgress>,
) -> Result<SoftmaxModel, BackendError> {
    let n = request.inputs.len();
    if n == 0 {
        return Err(BackendError::Training("empty training set".to_string()));
    }
    if request.class_indices.len() != n {
        return Err(BackendError::Training(
            "mismatched inputs/class indices".to_string(),
        ));
    }
    let classes = request.num_classes;
    if classes == 0 {
        return Err(BackendError::Training("no classes".to_string()));
    }
    if let Some(bad) = request.class_indices.iter().find(|&&y| y >= classes) {
        return Err(BackendError::Training(format!("class index {bad} out of range")));
    }
    let d = request.inputs[0].len();
    if request.inputs.iter().any(|row| row.len() != d) {
        return Err(BackendError::Training("inconsistent input row length".to_string()));
    }

    // Hold out the tail of the (already shuffled) set for validation
    let hp = &request.hyperparameters;
    let n_val = ((n as f32) * hp.validation_split_ratio).floor() as usize;
    let n_val = if n_val >= n { 0 } else { n_val };
    let n_train = n - n_val;

    let (mean, std) = feature_mean_std(&request.inputs[..n_train], d);
    let mut model = SoftmaxModel {
        num_classes: classes,
        input_len: d,
        weights: vec![0.0; classes * d],
        bias: vec![0.0; classes],
        feature_mean: mean,
        feature_std: std,
    };

    let mut rng = StdRng::seed_from_u64(hp.seed.unwrap_or(DEFAULT_SEED));
    for w in &mut model.weights {
        *w = (rng.random::<f32>() - 0.5) * 0.01;
    }

    let normalized: Vec<Vec<f32>> = request.inputs.iter().map(|row| model.normalize(row)).collect();
    let mut indices: Vec<usize> = (0..n_train).collect();
    let mut probs = vec![0.0f32; classes];
    let batch_size = hp.batch_size.max(1);

    for epoch_index in 0..hp.epochs {
        indices.shuffle(&mut rng);
        let mut loss_sum = 0.0f32;

        for batch in indices.chunks(batch_size) {
            let mut d_w = vec![0.0f32; model.weights.len()];
            let mut d_b = vec![0.0f32; classes];

            for &idx in batch {
                let x = &normalized[idx];
                let y = request.class_indices[idx];
                model.probabilities(x, &mut probs);
                loss_sum -= probs[y].max(1e-7).ln();

                for c in 0..classes {
                    let target = if c == y { 1.0 } else { 0.0 };
                    let dz = probs[c] - target;
                    d_b[c] += dz;
                    let base = c * d;
                    for i in 0..d {
                        d_w[base + i] += dz * x[i];
                    }
                }
            }

            let scale = hp.learning_rate / batch.len() as f32;
            for (w, g) in model.weights.iter_mut().zip(&d_w) {
                *w -= scale * g;
            }
            for (b, g) in model.bias.iter_mut().zip(&d_b) {
                *b -= scale * g;
            }
        }

        let training_accuracy = accuracy(&model, &normalized[..n_train], &request.class_indices[..n_train]);
        let validation_accuracy = (n_val > 0)
            .then(|| accuracy(&model, &normalized[n_train..], &request.class_indices[n_train..]))
            .flatten();

        let _ = progress.send(EpochProgress {
            epoch_index,
            total_epochs: hp.epochs,
            loss: Some(loss_sum / n_train as f32),
            training_accuracy,
            validation_accuracy,
        });
    }

    Ok(model)
}

fn accuracy(model: &SoftmaxModel, rows: &[Vec<f32>], labels: &[usize]) -> Option<f32> {
    if rows.is_empty() {
        return None;
    }
    let mut probs = vec![0.0f32; model.num_classes];
    let correct = rows
        .iter()
        .zip(labels)
        .filter(|&(row, &y)| {
            model.probabilities(row, &mut probs);
            crate::recognition::argmax(&probs).map(|(i, _)| i) == Some(y)
        })
        .count();
    Some(correct as f32 / rows.len() as f32)
}

fn feature_mean_std(rows: &[Vec<f32>], d: usize) -> (Vec<f32>, Vec<f32>) {
    let mut mean = vec![0.0f32; d];
    for row in rows {
        for i in 0..d {
            mean[i] += row[i];
        }
    }
    let n = rows.len().max(1) as f32;
    for v in &mut mean {
        *v /= n;
    }

    let mut std = vec![0.0f32; d];
    for row in rows {
        for i in 0..d {
            let diff = row[i] - mean[i];
            std[i] += diff * diff;
        }
    }
    for v in &mut std {
        *v = (*v / n).sqrt();
    }
    (mean, std)
}

fn softmax_inplace(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum == 0.0 || !sum.is_finite() {
        let uniform = 1.0 / values.len() as f32;
        values.iter_mut().for_each(|v| *v = uniform);
        return;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}
