//! Categorical cross-entropy with optional per-class weights

use burn::{
    nn::loss::CrossEntropyLossConfig,
    tensor::{activation::log_softmax, backend::Backend, Int, Tensor, TensorData},
};

/// Cross-entropy on logits.
///
/// With class weights every sample's negative log-likelihood is scaled by the
/// weight of its true class and the batch loss is the plain mean, so a
/// balanced dataset with unit weights gives the unweighted loss.
#[derive(Debug, Clone, Default)]
pub struct ClassificationLoss {
    class_weights: Option<Vec<f32>>,
}

impl ClassificationLoss {
    pub fn new(class_weights: Option<Vec<f32>>) -> Self {
        Self { class_weights }
    }

    /// Scalar loss for `logits` [batch, classes] and `targets` [batch]
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        match &self.class_weights {
            Some(weights) => weighted_cross_entropy(logits, targets, weights),
            None => CrossEntropyLossConfig::new()
                .init(&logits.device())
                .forward(logits, targets),
        }
    }

    /// Loss without class weights, used for validation
    pub fn unweighted<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, targets)
    }
}

fn weighted_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    class_weights: &[f32],
) -> Tensor<B, 1> {
    let device = logits.device();
    let [batch_size, _num_classes] = logits.dims();

    let log_probs = log_softmax(logits, 1);

    // log probability of the target class per sample
    let targets_2d = targets.clone().reshape([batch_size, 1]);
    let nll: Tensor<B, 1> = log_probs.gather(1, targets_2d).reshape([batch_size]).neg();

    let weights = Tensor::<B, 1>::from_floats(
        TensorData::new(class_weights.to_vec(), [class_weights.len()]),
        &device,
    );
    let sample_weights = weights.select(0, targets);

    (nll * sample_weights).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn batch() -> (Tensor<TestBackend, 2>, Tensor<TestBackend, 1, Int>) {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats(
            [[2.0, 0.5, -1.0], [0.1, 0.2, 0.3], [-0.5, 1.5, 0.0]],
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0, 2, 1], &device);
        (logits, targets)
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem()
    }

    #[test]
    fn test_unit_weights_match_unweighted() {
        let (logits, targets) = batch();
        let plain = scalar(ClassificationLoss::new(None).forward(logits.clone(), targets.clone()));
        let weighted = scalar(ClassificationLoss::new(Some(vec![1.0; 3])).forward(logits, targets));

        assert!((plain - weighted).abs() < 1e-5);
    }

    #[test]
    fn test_weights_scale_per_sample() {
        let (logits, targets) = batch();
        let unweighted = ClassificationLoss::new(None);

        // per-sample losses via single-row batches
        let per_sample: Vec<f64> = (0..3)
            .map(|i| {
                let row = logits.clone().slice([i..i + 1, 0..3]);
                let target = targets.clone().slice([i..i + 1]);
                scalar(unweighted.forward(row, target))
            })
            .collect();

        let weights = vec![2.0f32, 0.5, 3.0];
        let loss = scalar(ClassificationLoss::new(Some(weights.clone())).forward(logits, targets));

        // targets are [0, 2, 1]
        let expected =
            (weights[0] as f64 * per_sample[0] + weights[2] as f64 * per_sample[1] + weights[1] as f64 * per_sample[2]) / 3.0;
        assert!((loss - expected).abs() < 1e-4);
    }

    #[test]
    fn test_unweighted_ignores_weights() {
        let (logits, targets) = batch();
        let loss = ClassificationLoss::new(Some(vec![5.0, 5.0, 5.0]));
        let plain = scalar(ClassificationLoss::default().forward(logits.clone(), targets.clone()));

        assert!((scalar(loss.unweighted(logits, targets)) - plain).abs() < 1e-6);
    }
}
