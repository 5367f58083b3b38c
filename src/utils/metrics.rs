//! Metrics for evaluating the X-ray classifier
//!
//! Each epoch is summarised by an [`EpochMetrics`] value with:
//! - Accuracy (argmax)
//! - Macro-averaged one-vs-rest ROC AUC
//! - Macro-averaged F1-score
//! - Precision and recall of the COVID-19 class
//!
//! AUC and F1 are macro-averaged so the small COVID-19 class weighs as much as
//! the large ones. Precision and recall are only reported for COVID-19.

use serde::{Deserialize, Serialize};

/// Probability above which the positive class counts as predicted
pub const POSITIVE_THRESHOLD: f32 = 0.5;

/// Metrics tracked per epoch, in plotting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Loss,
    Accuracy,
    Auc,
    F1Score,
    PrecisionCovid19,
    RecallCovid19,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Loss,
        Metric::Accuracy,
        Metric::Auc,
        Metric::F1Score,
        Metric::PrecisionCovid19,
        Metric::RecallCovid19,
    ];

    /// Name used in logs and plot file names
    pub fn name(self) -> &'static str {
        match self {
            Metric::Loss => "loss",
            Metric::Accuracy => "accuracy",
            Metric::Auc => "auc",
            Metric::F1Score => "f1-score",
            Metric::PrecisionCovid19 => "precision_covid19",
            Metric::RecallCovid19 => "recall_covid19",
        }
    }

    /// Whether values live in [0, 1]
    pub fn is_ratio(self) -> bool {
        !matches!(self, Metric::Loss)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Metric values for one split over one epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub loss: f64,
    pub accuracy: f64,
    pub auc: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub precision_covid19: f64,
    pub recall_covid19: f64,
}

impl EpochMetrics {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Loss => self.loss,
            Metric::Accuracy => self.accuracy,
            Metric::Auc => self.auc,
            Metric::F1Score => self.f1_score,
            Metric::PrecisionCovid19 => self.precision_covid19,
            Metric::RecallCovid19 => self.recall_covid19,
        }
    }
}

/// Collects softmax outputs, labels and batch losses over an epoch
#[derive(Debug, Clone)]
pub struct MetricAccumulator {
    num_classes: usize,
    positive_class: usize,
    /// Row-major `[samples, num_classes]`
    probabilities: Vec<f32>,
    labels: Vec<usize>,
    /// Sum of `batch loss * batch size`
    loss_sum: f64,
}

impl MetricAccumulator {
    pub fn new(num_classes: usize, positive_class: usize) -> Self {
        Self {
            num_classes,
            positive_class,
            probabilities: Vec::new(),
            labels: Vec::new(),
            loss_sum: 0.0,
        }
    }

    /// Add one batch: flattened `[batch, num_classes]` probabilities, labels and the batch loss
    pub fn update(&mut self, probabilities: &[f32], labels: &[usize], loss: f64) {
        debug_assert_eq!(probabilities.len(), labels.len() * self.num_classes);
        self.probabilities.extend_from_slice(probabilities);
        self.labels.extend_from_slice(labels);
        self.loss_sum += loss * labels.len() as f64;
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Per-sample mean loss; each batch counts by its size
    pub fn mean_loss(&self) -> f64 {
        if self.labels.is_empty() {
            0.0
        } else {
            self.loss_sum / self.labels.len() as f64
        }
    }

    /// Running argmax accuracy
    pub fn accuracy(&self) -> f64 {
        self.confusion_matrix().accuracy()
    }

    fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.probabilities.chunks(self.num_classes.max(1))
    }

    fn predictions(&self) -> Vec<usize> {
        self.rows().map(argmax).collect()
    }

    pub fn confusion_matrix(&self) -> ConfusionMatrix {
        ConfusionMatrix::from_predictions(&self.predictions(), &self.labels, self.num_classes)
    }

    /// Summarise the epoch
    pub fn compute(&self) -> EpochMetrics {
        if self.is_empty() {
            return EpochMetrics {
                loss: self.mean_loss(),
                ..Default::default()
            };
        }

        let cm = self.confusion_matrix();
        let f1_score = (0..self.num_classes)
            .map(|c| ClassMetrics::from_confusion_matrix(&cm, c).f1)
            .sum::<f64>()
            / self.num_classes as f64;

        let (precision_covid19, recall_covid19) = self.thresholded_precision_recall();

        EpochMetrics {
            loss: self.mean_loss(),
            accuracy: cm.accuracy(),
            auc: self.macro_auc(),
            f1_score,
            precision_covid19,
            recall_covid19,
        }
    }

    fn macro_auc(&self) -> f64 {
        let aucs: Vec<f64> = (0..self.num_classes)
            .filter_map(|c| {
                let scores: Vec<f32> = self.rows().map(|row| row[c]).collect();
                let positives: Vec<bool> = self.labels.iter().map(|&l| l == c).collect();
                roc_auc(&scores, &positives)
            })
            .collect();

        if aucs.is_empty() {
            0.0
        } else {
            aucs.iter().sum::<f64>() / aucs.len() as f64
        }
    }

    fn thresholded_precision_recall(&self) -> (f64, f64) {
        let c = self.positive_class;
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fne = 0usize;

        for (row, &label) in self.rows().zip(self.labels.iter()) {
            let predicted = row.get(c).map_or(false, |&p| p > POSITIVE_THRESHOLD);
            match (predicted, label == c) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, true) => fne += 1,
                (false, false) => {}
            }
        }

        (ratio(tp, tp + fp), ratio(tp, tp + fne))
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &p)| {
            if p > best.1 {
                (i, p)
            } else {
                best
            }
        })
        .0
}

/// Area under the ROC curve via the rank-sum statistic (ties get average ranks).
///
/// Returns `None` when only one of the two groups is present.
pub fn roc_auc(scores: &[f32], positives: &[bool]) -> Option<f64> {
    let n_pos = positives.iter().filter(|&&p| p).count();
    let n_neg = positives.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0f64;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks start..end (0-based) share their mean 1-based rank
        let avg_rank = (start + end + 1) as f64 / 2.0;
        let pos_in_group = order[start..end].iter().filter(|&&i| positives[i]).count();
        rank_sum_pos += avg_rank * pos_in_group as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// Precision = TP / (TP + FP)
    pub precision: f64,
    /// Recall = TP / (TP + FN)
    pub recall: f64,
    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,
    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // predicted as this class but actually other classes
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // actually this class but predicted as other classes
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support: true_positives + false_negatives,
        }
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,
    /// Row = actual, column = predicted, row-major
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }
        cm
    }

    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Render with class names as row/column headers
    pub fn display(&self, class_names: &[String]) -> String {
        let name = |i: usize| {
            let n = class_names.get(i).map(String::as_str).unwrap_or("?");
            n.chars().take(10).collect::<String>()
        };

        let mut output = String::from("Confusion matrix (rows=actual, cols=predicted):\n");
        output.push_str(&format!("{:>12}", ""));
        for col in 0..self.num_classes {
            output.push_str(&format!("{:>12}", name(col)));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            output.push_str(&format!("{:>12}", name(row)));
            for col in 0..self.num_classes {
                output.push_str(&format!("{:>12}", self.get(row, col)));
            }
            output.push('\n');
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
        let ground_truth = vec![0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 3);

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(2, 2), 3);
        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!((cm.accuracy() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_class_metrics() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 0, 1, 1], &[0, 0, 1, 1, 0], 2);
        let class0 = ClassMetrics::from_confusion_matrix(&cm, 0);

        assert_eq!(class0.true_positives, 2);
        assert_eq!(class0.false_positives, 1);
        assert_eq!(class0.false_negatives, 1);
        assert!((class0.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((class0.recall - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(class0.support, 3);
    }

    #[test]
    fn test_roc_auc_perfect_and_inverted() {
        let positives = [false, false, true, true];
        assert_eq!(roc_auc(&[0.1, 0.2, 0.8, 0.9], &positives), Some(1.0));
        assert_eq!(roc_auc(&[0.9, 0.8, 0.2, 0.1], &positives), Some(0.0));
    }

    #[test]
    fn test_roc_auc_ties_count_half() {
        let auc = roc_auc(&[0.5, 0.5], &[true, false]).unwrap();
        assert!((auc - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_roc_auc_single_group() {
        assert_eq!(roc_auc(&[0.3, 0.7], &[true, true]), None);
    }

    #[test]
    fn test_perfect_predictions() {
        // classes: 0 = covid-19, 1 = normal
        let mut acc = MetricAccumulator::new(2, 0);
        acc.update(&[0.9, 0.1, 0.2, 0.8, 0.7, 0.3], &[0, 1, 0], 0.25);
        acc.update(&[0.1, 0.9], &[1], 0.75);

        let m = acc.compute();
        // batches weigh by their size: (0.25 * 3 + 0.75) / 4
        assert!((m.loss - 0.375).abs() < 1e-9);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.auc, 1.0);
        assert_eq!(m.f1_score, 1.0);
        assert_eq!(m.precision_covid19, 1.0);
        assert_eq!(m.recall_covid19, 1.0);
    }

    #[test]
    fn test_covid_precision_recall_use_threshold() {
        // three classes, covid-19 is label 1
        let probabilities = [
            0.2, 0.45, 0.35, // covid, argmax-correct but below threshold
            0.1, 0.8, 0.1, // covid, detected
            0.3, 0.6, 0.1, // not covid, false positive
            0.7, 0.2, 0.1, // not covid, true negative
        ];
        let mut acc = MetricAccumulator::new(3, 1);
        acc.update(&probabilities, &[1, 1, 0, 0], 1.0);

        let m = acc.compute();
        assert!((m.precision_covid19 - 0.5).abs() < 1e-9);
        assert!((m.recall_covid19 - 0.5).abs() < 1e-9);
        assert!((m.accuracy - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_macro_f1_counts_every_class() {
        // class 2 never appears and is never predicted
        let mut acc = MetricAccumulator::new(3, 0);
        acc.update(&[0.9, 0.1, 0.0, 0.1, 0.9, 0.0], &[0, 1], 0.0);

        let m = acc.compute();
        assert!((m.f1_score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = MetricAccumulator::new(2, 0);
        assert!(acc.is_empty());
        assert_eq!(acc.compute(), EpochMetrics::default());
    }

    #[test]
    fn test_metric_names() {
        let names: Vec<&str> = Metric::ALL.iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec!["loss", "accuracy", "auc", "f1-score", "precision_covid19", "recall_covid19"]
        );
    }
}
