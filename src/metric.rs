use crate::errors::SaplingError;
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

fn ratio(numerator: usize, denominator: usize) -> f64 {
    numerator as f64 / denominator as f64
}

fn check_lengths(expected: usize, provided: usize) -> Result<(), SaplingError> {
    if expected != provided {
        return Err(SaplingError::ShapeMismatch("predictions".to_string(), expected, provided));
    }
    Ok(())
}

/// One-vs-rest counts for a single class label. Ratios whose denominator
/// is zero are NaN.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub label: i32,
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    /// Positive predictive value.
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// True positive rate.
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// Negative predictive value.
    pub fn npv(&self) -> f64 {
        ratio(self.true_negatives, self.true_negatives + self.false_negatives)
    }

    /// False discovery rate.
    pub fn fdr(&self) -> f64 {
        ratio(self.false_positives, self.true_positives + self.false_positives)
    }
}

impl Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Label {}", self.label)?;
        writeln!(f, "\t{:>30} = {}", "True Positives", self.true_positives)?;
        writeln!(f, "\t{:>30} = {}", "True Negatives", self.true_negatives)?;
        writeln!(f, "\t{:>30} = {}", "False Positives", self.false_positives)?;
        writeln!(f, "\t{:>30} = {}", "False Negatives", self.false_negatives)?;
        writeln!(f, "\t{:>30} = {:.4}", "Precision", self.precision())?;
        writeln!(f, "\t{:>30} = {:.4}", "Accuracy", self.accuracy())
    }
}

/// Per label evaluation of a classifier's predictions.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClassificationReport {
    matrices: Vec<ConfusionMatrix>,
    correct: usize,
    total: usize,
}

impl ClassificationReport {
    /// Build a one-vs-rest confusion matrix for every label seen in either
    /// sequence. Labels are ordered by first occurrence in `y_true`, then in `y_pred`.
    ///
    /// * `y_true` - The given labels.
    /// * `y_pred` - The predicted labels, one per given label.
    pub fn evaluate(y_true: &[i32], y_pred: &[i32]) -> Result<Self, SaplingError> {
        check_lengths(y_true.len(), y_pred.len())?;
        let mut labels: Vec<i32> = Vec::new();
        for label in y_true.iter().chain(y_pred) {
            if !labels.contains(label) {
                labels.push(*label);
            }
        }

        let matrices = labels
            .iter()
            .map(|&label| {
                let mut m = ConfusionMatrix {
                    label,
                    true_positives: 0,
                    true_negatives: 0,
                    false_positives: 0,
                    false_negatives: 0,
                };
                for (t, p) in y_true.iter().zip(y_pred) {
                    match (*t == label, *p == label) {
                        (true, true) => m.true_positives += 1,
                        (true, false) => m.false_negatives += 1,
                        (false, true) => m.false_positives += 1,
                        (false, false) => m.true_negatives += 1,
                    }
                }
                m
            })
            .collect();

        Ok(ClassificationReport {
            matrices,
            correct: y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count(),
            total: y_true.len(),
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = i32> + '_ {
        self.matrices.iter().map(|m| m.label)
    }

    pub fn matrices(&self) -> &[ConfusionMatrix] {
        &self.matrices
    }

    /// The confusion matrix of a label, if it was seen.
    pub fn matrix(&self, label: i32) -> Option<&ConfusionMatrix> {
        self.matrices.iter().find(|m| m.label == label)
    }

    /// Fraction of all predictions that are correct.
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }
}

impl Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for m in &self.matrices {
            write!(f, "{}", m)?;
        }
        writeln!(f, "Overall accuracy = {:.4}", self.accuracy())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum RegressionMetric {
    RootMeanSquaredError,
    MeanAbsoluteError,
}

impl FromStr for RegressionMetric {
    type Err = SaplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RootMeanSquaredError" => Ok(RegressionMetric::RootMeanSquaredError),
            "MeanAbsoluteError" => Ok(RegressionMetric::MeanAbsoluteError),
            _ => Err(SaplingError::ParseString(
                s.to_string(),
                "RegressionMetric".to_string(),
                items_to_strings(vec!["RootMeanSquaredError", "MeanAbsoluteError"]),
            )),
        }
    }
}

impl RegressionMetric {
    /// Evaluate predictions against the given values, in double precision.
    pub fn calculate(&self, y: &[f32], yhat: &[f32]) -> Result<f64, SaplingError> {
        check_lengths(y.len(), yhat.len())?;
        let errors = y.iter().zip(yhat).map(|(y_, yhat_)| f64::from(*y_) - f64::from(*yhat_));
        let n = y.len() as f64;
        Ok(match self {
            RegressionMetric::RootMeanSquaredError => (errors.map(|e| e * e).sum::<f64>() / n).sqrt(),
            RegressionMetric::MeanAbsoluteError => errors.map(f64::abs).sum::<f64>() / n,
        })
    }
}
