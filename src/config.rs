//! Training Configuration
//!
//! Defines the configuration used to grow a decision tree: the kind of tree,
//! the split criterion, and the stopping and parallelism limits, along with
//! the JSON persistence shared by the configuration and the tree itself.
use crate::errors::SaplingError;
use crate::utils::{items_to_strings, validate_min_parameter};
use log::warn;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::{self, Display};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// The kind of tree to grow.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum TreeType {
    /// Predict discrete class labels.
    Classifier,
    /// Predict continuous values.
    Regressor,
}

/// Criterion used to score a candidate split. Lower scores are better.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum SplitCriterion {
    /// Shannon entropy of the class proportions, in bits.
    Entropy,
    /// Gini impurity of the class proportions.
    Gini,
    /// Misclassification rate of the majority class.
    Error,
    /// Mean squared deviation from the mean of the values.
    MeanSquaredError,
    /// Mean absolute deviation from the mean of the values.
    AbsoluteError,
}

impl TreeType {
    /// Criteria that may be used with this kind of tree.
    pub fn criteria(&self) -> &'static [SplitCriterion] {
        match self {
            TreeType::Classifier => &[SplitCriterion::Entropy, SplitCriterion::Gini, SplitCriterion::Error],
            TreeType::Regressor => &[SplitCriterion::MeanSquaredError, SplitCriterion::AbsoluteError],
        }
    }

    pub(crate) fn code(&self) -> u32 {
        match self {
            TreeType::Classifier => 0,
            TreeType::Regressor => 1,
        }
    }

    pub(crate) fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(TreeType::Classifier),
            1 => Some(TreeType::Regressor),
            _ => None,
        }
    }
}

impl SplitCriterion {
    pub(crate) fn code(&self) -> u32 {
        match self {
            SplitCriterion::Entropy => 0,
            SplitCriterion::Gini => 1,
            SplitCriterion::Error => 2,
            SplitCriterion::MeanSquaredError => 3,
            SplitCriterion::AbsoluteError => 4,
        }
    }

    pub(crate) fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(SplitCriterion::Entropy),
            1 => Some(SplitCriterion::Gini),
            2 => Some(SplitCriterion::Error),
            3 => Some(SplitCriterion::MeanSquaredError),
            4 => Some(SplitCriterion::AbsoluteError),
            _ => None,
        }
    }
}

impl FromStr for TreeType {
    type Err = SaplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Classifier" => Ok(TreeType::Classifier),
            "Regressor" => Ok(TreeType::Regressor),
            _ => Err(SaplingError::ParseString(
                s.to_string(),
                "TreeType".to_string(),
                items_to_strings(vec!["Classifier", "Regressor"]),
            )),
        }
    }
}

impl FromStr for SplitCriterion {
    type Err = SaplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Entropy" => Ok(SplitCriterion::Entropy),
            "Gini" => Ok(SplitCriterion::Gini),
            "Error" => Ok(SplitCriterion::Error),
            "MeanSquaredError" => Ok(SplitCriterion::MeanSquaredError),
            "AbsoluteError" => Ok(SplitCriterion::AbsoluteError),
            _ => Err(SaplingError::ParseString(
                s.to_string(),
                "SplitCriterion".to_string(),
                items_to_strings(vec!["Entropy", "Gini", "Error", "MeanSquaredError", "AbsoluteError"]),
            )),
        }
    }
}

impl Display for TreeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Display for SplitCriterion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Configuration used to train a [`DecisionTree`](crate::tree::DecisionTree).
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct TrainConfig {
    /// Grow a classification or a regression tree.
    pub tree_type: TreeType,
    /// Criterion used to score splits, it must be valid for `tree_type`.
    pub criterion: SplitCriterion,
    /// An attribute with at most this many distinct values at a node is split
    /// on equality with one of them, otherwise on a greater-than threshold.
    pub discrete_threshold: usize,
    /// Maximum number of splits on any path from the root to a leaf.
    /// A value of zero produces a single leaf.
    pub max_depth: usize,
    /// Maximum number of threads growing subtrees at once, including the calling thread.
    pub max_workers: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            tree_type: TreeType::Classifier,
            criterion: SplitCriterion::Entropy,
            discrete_threshold: 5,
            max_depth: 8,
            max_workers: 1,
        }
    }
}

impl TrainConfig {
    /// Default configuration for a regression tree.
    pub fn regressor() -> Self {
        TrainConfig {
            tree_type: TreeType::Regressor,
            criterion: SplitCriterion::MeanSquaredError,
            ..Default::default()
        }
    }

    /// Check the configuration, before any training starts.
    pub fn validate(&self) -> Result<(), SaplingError> {
        let result = self.check();
        if let Err(e) = &result {
            warn!("Rejected training configuration: {}", e);
        }
        result
    }

    fn check(&self) -> Result<(), SaplingError> {
        let valid = self.tree_type.criteria();
        if !valid.contains(&self.criterion) {
            let options: Vec<String> = valid.iter().map(|c| c.to_string()).collect();
            return Err(SaplingError::InvalidParameter(
                "criterion".to_string(),
                format!("one of {} for a {}", options.join(", "), self.tree_type),
                self.criterion.to_string(),
            ));
        }
        validate_min_parameter(self.discrete_threshold, 2, "discrete_threshold")?;
        validate_min_parameter(self.max_workers, 1, "max_workers")?;
        Ok(())
    }

    // Set methods for parameters

    /// Set the kind of tree.
    /// * `tree_type` - Classifier or Regressor.
    pub fn set_tree_type(mut self, tree_type: TreeType) -> Self {
        self.tree_type = tree_type;
        self
    }

    /// Set the split criterion.
    /// * `criterion` - The criterion used to score candidate splits.
    pub fn set_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the discrete threshold.
    /// * `discrete_threshold` - Largest number of distinct values for an attribute
    ///   to be split on equality.
    pub fn set_discrete_threshold(mut self, discrete_threshold: usize) -> Self {
        self.discrete_threshold = discrete_threshold;
        self
    }

    /// Set the maximum depth.
    pub fn set_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the maximum number of worker threads.
    pub fn set_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }
}

/// IO
pub trait ModelIO: Serialize + DeserializeOwned + Sized {
    /// Save as a json object to a file.
    ///
    /// * `path` - Path to save to.
    fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), SaplingError> {
        fs::write(path, self.json_dump()?).map_err(|e| SaplingError::UnableToWrite(e.to_string()))
    }

    /// Dump as a json object
    fn json_dump(&self) -> Result<String, SaplingError> {
        serde_json::to_string(self).map_err(|e| SaplingError::UnableToWrite(e.to_string()))
    }

    /// Load from Json string
    ///
    /// * `json_str` - String object, which can be serialized to json.
    fn from_json(json_str: &str) -> Result<Self, SaplingError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| SaplingError::UnableToRead(e.to_string()))
    }

    /// Load from a path to a json object.
    ///
    /// * `path` - Path to load from.
    fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, SaplingError> {
        let json_str = fs::read_to_string(path).map_err(|e| SaplingError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ModelIO for TrainConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = TrainConfig::default();
        assert_eq!(config.tree_type, TreeType::Classifier);
        assert_eq!(config.criterion, SplitCriterion::Entropy);
        assert_eq!(config.discrete_threshold, 5);
        assert_eq!(config.max_depth, 8);
        assert_eq!(config.max_workers, 1);
        assert!(config.validate().is_ok());
        assert!(TrainConfig::regressor().validate().is_ok());
    }

    #[test]
    fn test_invalid_combinations() {
        let config = TrainConfig::default().set_criterion(SplitCriterion::MeanSquaredError);
        assert!(matches!(config.validate(), Err(SaplingError::InvalidParameter(..))));
        let config = TrainConfig::regressor().set_criterion(SplitCriterion::Gini);
        assert!(config.validate().is_err());
        let config = TrainConfig::default().set_discrete_threshold(1);
        assert!(config.validate().is_err());
        let config = TrainConfig::default().set_max_workers(0);
        assert!(config.validate().is_err());
        let config = TrainConfig::default().set_max_depth(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse() {
        assert_eq!("Gini".parse::<SplitCriterion>().unwrap(), SplitCriterion::Gini);
        assert_eq!("Regressor".parse::<TreeType>().unwrap(), TreeType::Regressor);
        let err = "Variance".parse::<SplitCriterion>().unwrap_err();
        assert!(matches!(err, SaplingError::ParseString(..)));
    }

    #[test]
    fn test_codes() {
        for c in [
            SplitCriterion::Entropy,
            SplitCriterion::Gini,
            SplitCriterion::Error,
            SplitCriterion::MeanSquaredError,
            SplitCriterion::AbsoluteError,
        ] {
            assert_eq!(SplitCriterion::from_code(c.code()), Some(c));
        }
        assert_eq!(TreeType::from_code(7), None);
    }

    #[test]
    fn test_config_io_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.json");
        let config = TrainConfig::regressor().set_max_depth(3).set_max_workers(4);
        config.save_json(&file_path).unwrap();
        let config2 = TrainConfig::load_json(&file_path).unwrap();
        assert_eq!(config, config2);
    }
}
