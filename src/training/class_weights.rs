//! Class weights for imbalance compensation

use crate::utils::error::{Result, TrainError};

/// `weight(c) = (1 / n_c) * (total / n_classes)` for every label `c`.
///
/// Scaling by `total / n_classes` keeps the weighted loss at the magnitude of
/// the unweighted one: every class contributes `n_c * weight(c) = total /
/// n_classes`. `counts[c]` is the number of training samples with label `c`.
pub fn compute_class_weights(counts: &[usize]) -> Result<Vec<f32>> {
    if counts.is_empty() {
        return Err(TrainError::Dataset("No classes to weight".to_string()));
    }
    if let Some(label) = counts.iter().position(|&n| n == 0) {
        return Err(TrainError::Dataset(format!(
            "Class {} has no training samples; cannot compute its weight",
            label
        )));
    }

    let total: usize = counts.iter().sum();
    let scale = total as f64 / counts.len() as f64;

    Ok(counts
        .iter()
        .map(|&n| ((1.0 / n as f64) * scale) as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_class_example() {
        let weights = compute_class_weights(&[100, 900]).unwrap();
        assert!((weights[0] - 5.0).abs() < 1e-6);
        assert!((weights[1] - 0.5556).abs() < 1e-4);
    }

    #[test]
    fn test_every_class_contributes_equally() {
        let counts = [30usize, 270, 500];
        let weights = compute_class_weights(&counts).unwrap();
        let total: usize = counts.iter().sum();
        let share = total as f64 / counts.len() as f64;

        let mut sum_of_shares = 0.0;
        for (&n, &w) in counts.iter().zip(&weights) {
            assert!((n as f64 * w as f64 - share).abs() < 1e-3);
            sum_of_shares += n as f64 * w as f64 / share;
        }
        assert!((sum_of_shares - counts.len() as f64).abs() < 1e-4);
    }

    #[test]
    fn test_inverse_to_frequency() {
        let weights = compute_class_weights(&[10, 20, 40]).unwrap();
        assert!((weights[0] / weights[1] - 2.0).abs() < 1e-5);
        assert!((weights[1] / weights[2] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_balanced_dataset_gives_unit_weights() {
        let weights = compute_class_weights(&[50, 50, 50]).unwrap();
        assert!(weights.iter().all(|&w| (w - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_empty_class_is_an_error() {
        assert!(matches!(compute_class_weights(&[10, 0]), Err(TrainError::Dataset(_))));
        assert!(compute_class_weights(&[]).is_err());
    }
}
