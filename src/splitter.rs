//! Splitter
//!
//! Scoring of candidate splits. For every attribute, the distinct values seen
//! among the active samples of a node are the candidate thresholds; each is
//! scored by the size weighted impurity (classification) or deviation
//! (regression) of the two children it would create, lower being better.
use crate::bitset::Bitset;
use crate::config::{SplitCriterion, TrainConfig};
use crate::data::Matrix;
use crate::errors::SaplingError;
use crate::node::{Comparison, LeafValue};
use crate::utils::mean;
use hashbrown::{HashMap, HashSet};

/// The best split found for a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitInfo {
    pub feature: usize,
    pub threshold: f32,
    pub comparison: Comparison,
    pub score: f64,
}

/// Impurity measures for class labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impurity {
    Entropy,
    Gini,
    Misclassification,
}

/// Deviation measures for continuous labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deviation {
    Squared,
    Absolute,
}

impl TryFrom<SplitCriterion> for Impurity {
    type Error = SaplingError;

    fn try_from(criterion: SplitCriterion) -> Result<Self, SaplingError> {
        match criterion {
            SplitCriterion::Entropy => Ok(Impurity::Entropy),
            SplitCriterion::Gini => Ok(Impurity::Gini),
            SplitCriterion::Error => Ok(Impurity::Misclassification),
            other => Err(SaplingError::InvalidParameter(
                "criterion".to_string(),
                "Entropy, Gini, or Error for a classifier".to_string(),
                other.to_string(),
            )),
        }
    }
}

impl TryFrom<SplitCriterion> for Deviation {
    type Error = SaplingError;

    fn try_from(criterion: SplitCriterion) -> Result<Self, SaplingError> {
        match criterion {
            SplitCriterion::MeanSquaredError => Ok(Deviation::Squared),
            SplitCriterion::AbsoluteError => Ok(Deviation::Absolute),
            other => Err(SaplingError::InvalidParameter(
                "criterion".to_string(),
                "MeanSquaredError or AbsoluteError for a regressor".to_string(),
                other.to_string(),
            )),
        }
    }
}

/// Impurity of a set of samples, given the number of samples of each class.
/// Classes with a zero count contribute nothing.
pub fn impurity(kind: Impurity, counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    let proportions = counts.iter().filter(|c| **c > 0).map(|c| *c as f64 / n);
    match kind {
        Impurity::Entropy => -proportions.map(|p| p * p.log2()).sum::<f64>(),
        Impurity::Gini => 1.0 - proportions.map(|p| p * p).sum::<f64>(),
        Impurity::Misclassification => 1.0 - proportions.fold(0.0, f64::max),
    }
}

/// Average squared or absolute deviation of the values from their mean.
pub fn deviation(kind: Deviation, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let avg = values.iter().sum::<f64>() / n;
    let total: f64 = match kind {
        Deviation::Squared => values.iter().map(|v| (v - avg) * (v - avg)).sum(),
        Deviation::Absolute => values.iter().map(|v| (v - avg).abs()).sum(),
    };
    total / n
}

/// Attribute values compare by exact equality, so both zeros share a key.
#[inline]
fn value_key(v: f32) -> u32 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

/// Distinct values of an attribute among the active samples, in the order
/// they are first seen scanning the samples by ascending index.
/// NaN never equals itself, so every NaN is its own distinct value.
pub fn distinct_values(data: &Matrix<f32>, feature: usize, active: &Bitset) -> Vec<f32> {
    let mut seen = HashSet::new();
    let mut values = Vec::new();
    for i in active {
        let v = *data.get(i, feature);
        if v.is_nan() || seen.insert(value_key(v)) {
            values.push(v);
        }
    }
    values
}

/// Distinct labels among the active samples with their counts, in the order
/// they are first seen scanning the samples by ascending index.
pub fn distinct_labels(labels: &[i32], active: &Bitset) -> Vec<(i32, usize)> {
    let mut slots: HashMap<i32, usize> = HashMap::new();
    let mut counts: Vec<(i32, usize)> = Vec::new();
    for i in active {
        let label = labels[i];
        let slot = *slots.entry(label).or_insert_with(|| {
            counts.push((label, 0));
            counts.len() - 1
        });
        counts[slot].1 += 1;
    }
    counts
}

/// Candidate thresholds of an attribute, and whether it is split on
/// equality or on a threshold at this node.
pub fn candidate_thresholds(
    data: &Matrix<f32>,
    feature: usize,
    active: &Bitset,
    discrete_threshold: usize,
) -> (Comparison, Vec<f32>) {
    let values = distinct_values(data, feature, active);
    let comparison = if values.len() <= discrete_threshold {
        Comparison::Discrete
    } else {
        Comparison::Continuous
    };
    (comparison, values)
}

/// Split the active samples into the left and right children of a split.
pub fn partition(data: &Matrix<f32>, active: &Bitset, split: &SplitInfo) -> (Bitset, Bitset) {
    let mut left = Bitset::new(active.capacity());
    let mut right = Bitset::new(active.capacity());
    for i in active {
        if split
            .comparison
            .goes_right(*data.get(i, split.feature), split.threshold)
        {
            right.set(i);
        } else {
            left.set(i);
        }
    }
    (left, right)
}

/// Visit every attribute and each of its candidate thresholds, keeping the
/// lowest score. Ties keep the first candidate found, so attributes are
/// favoured by ascending index, then by threshold enumeration order.
/// `score` returns `None` for a split that leaves a child empty.
fn search<F>(data: &Matrix<f32>, active: &Bitset, discrete_threshold: usize, mut score: F) -> Option<SplitInfo>
where
    F: FnMut(usize, f32, Comparison) -> Option<f64>,
{
    let mut best: Option<SplitInfo> = None;
    for feature in 0..data.cols {
        let (comparison, thresholds) = candidate_thresholds(data, feature, active, discrete_threshold);
        // A single distinct value can not separate anything.
        if thresholds.len() < 2 {
            continue;
        }
        for threshold in thresholds {
            let Some(s) = score(feature, threshold, comparison) else {
                continue;
            };
            if best.map_or(true, |b| s < b.score) {
                best = Some(SplitInfo {
                    feature,
                    threshold,
                    comparison,
                    score: s,
                });
            }
        }
    }
    best
}

/// Size weighted score of two children.
#[inline]
fn weighted(n_left: usize, score_left: f64, n_right: usize, score_right: f64) -> f64 {
    let n = (n_left + n_right) as f64;
    (n_left as f64 / n) * score_left + (n_right as f64 / n) * score_right
}

/// Splitter trait, implemented for each kind of label.
pub trait Splitter: Sync {
    /// Whether the node should become a leaf regardless of depth.
    fn is_pure(&self, active: &Bitset) -> bool;
    /// The value a leaf holding the active samples predicts.
    fn leaf_value(&self, active: &Bitset) -> LeafValue;
    /// The best valid split of the active samples, if there is one.
    fn best_split(&self, data: &Matrix<f32>, active: &Bitset) -> Option<SplitInfo>;
}

/// Splitter for class labels.
pub struct ClassificationSplitter<'a> {
    pub labels: &'a [i32],
    pub impurity: Impurity,
    pub discrete_threshold: usize,
}

impl<'a> ClassificationSplitter<'a> {
    pub fn new(labels: &'a [i32], config: &TrainConfig) -> Result<Self, SaplingError> {
        Ok(ClassificationSplitter {
            labels,
            impurity: Impurity::try_from(config.criterion)?,
            discrete_threshold: config.discrete_threshold,
        })
    }
}

impl Splitter for ClassificationSplitter<'_> {
    fn is_pure(&self, active: &Bitset) -> bool {
        let mut it = active.iter().map(|i| self.labels[i]);
        match it.next() {
            Some(first) => it.all(|l| l == first),
            None => true,
        }
    }

    fn leaf_value(&self, active: &Bitset) -> LeafValue {
        let mut most_common: Option<(i32, usize)> = None;
        for (label, count) in distinct_labels(self.labels, active) {
            if most_common.map_or(true, |(_, c)| count > c) {
                most_common = Some((label, count));
            }
        }
        LeafValue::Class(most_common.map_or(0, |(label, _)| label))
    }

    fn best_split(&self, data: &Matrix<f32>, active: &Bitset) -> Option<SplitInfo> {
        let parent = distinct_labels(self.labels, active);
        let slot_of: HashMap<i32, usize> = parent.iter().enumerate().map(|(s, (l, _))| (*l, s)).collect();
        let parent_counts: Vec<usize> = parent.iter().map(|(_, c)| *c).collect();
        let samples: Vec<(usize, usize)> = active.iter().map(|i| (i, slot_of[&self.labels[i]])).collect();
        let n = active.count();

        let mut right_counts = vec![0_usize; parent_counts.len()];
        let mut left_counts = vec![0_usize; parent_counts.len()];

        search(data, active, self.discrete_threshold, |feature, threshold, comparison| {
            right_counts.iter_mut().for_each(|c| *c = 0);
            let mut n_right = 0;
            for &(i, slot) in &samples {
                if comparison.goes_right(*data.get(i, feature), threshold) {
                    right_counts[slot] += 1;
                    n_right += 1;
                }
            }
            let n_left = n - n_right;
            if n_left == 0 || n_right == 0 {
                return None;
            }
            for ((l, p), r) in left_counts.iter_mut().zip(&parent_counts).zip(&right_counts) {
                *l = p - r;
            }
            Some(weighted(
                n_left,
                impurity(self.impurity, &left_counts, n_left),
                n_right,
                impurity(self.impurity, &right_counts, n_right),
            ))
        })
    }
}

/// Splitter for continuous labels.
pub struct RegressionSplitter<'a> {
    pub values: &'a [f32],
    pub deviation: Deviation,
    pub discrete_threshold: usize,
}

impl<'a> RegressionSplitter<'a> {
    pub fn new(values: &'a [f32], config: &TrainConfig) -> Result<Self, SaplingError> {
        Ok(RegressionSplitter {
            values,
            deviation: Deviation::try_from(config.criterion)?,
            discrete_threshold: config.discrete_threshold,
        })
    }
}

impl Splitter for RegressionSplitter<'_> {
    // Regression nodes only stop on depth, or when no split is left.
    fn is_pure(&self, _active: &Bitset) -> bool {
        false
    }

    fn leaf_value(&self, active: &Bitset) -> LeafValue {
        LeafValue::Value(mean(active.iter().map(|i| self.values[i])) as f32)
    }

    fn best_split(&self, data: &Matrix<f32>, active: &Bitset) -> Option<SplitInfo> {
        let mut left = Vec::with_capacity(active.count());
        let mut right = Vec::with_capacity(active.count());

        search(data, active, self.discrete_threshold, |feature, threshold, comparison| {
            left.clear();
            right.clear();
            for i in active {
                let y = f64::from(self.values[i]);
                if comparison.goes_right(*data.get(i, feature), threshold) {
                    right.push(y);
                } else {
                    left.push(y);
                }
            }
            if left.is_empty() || right.is_empty() {
                return None;
            }
            Some(weighted(
                left.len(),
                deviation(self.deviation, &left),
                right.len(),
                deviation(self.deviation, &right),
            ))
        })
    }
}
