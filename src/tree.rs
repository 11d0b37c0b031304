use crate::codec;
use crate::config::{ModelIO, TrainConfig, TreeType};
use crate::data::{Labels, Matrix};
use crate::errors::SaplingError;
use crate::grower::{Grower, WorkerBudget};
use crate::node::{Decision, LeafValue, Node, NodeRecord};
use crate::splitter::{ClassificationSplitter, RegressionSplitter, Splitter};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::{self, Display};
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Decision Tree object
///
/// A binary decision tree, trained either as a classifier on integer class
/// labels or as a regressor on continuous values. The tree keeps the
/// configuration it is trained with, an optional name for every attribute,
/// and the root of the last successful training run.
#[derive(Deserialize, Clone, PartialEq, Debug)]
#[serde(try_from = "SavedTree")]
pub struct DecisionTree {
    config: TrainConfig,
    num_features: usize,
    feature_names: Option<Vec<Option<String>>>,
    root: Option<Node>,
}

/// JSON form of a tree, with the nodes as a flat preorder listing.
#[derive(Serialize, Deserialize)]
struct SavedTree {
    config: TrainConfig,
    num_features: usize,
    feature_names: Option<Vec<Option<String>>>,
    nodes: Vec<NodeRecord>,
}

impl Serialize for DecisionTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SavedTree {
            config: self.config,
            num_features: self.num_features,
            feature_names: self.feature_names.clone(),
            nodes: self.root.iter().flat_map(Node::walk).map(|(n, _)| n.record()).collect(),
        }
        .serialize(serializer)
    }
}

impl TryFrom<SavedTree> for DecisionTree {
    type Error = SaplingError;

    fn try_from(saved: SavedTree) -> Result<Self, Self::Error> {
        let root = if saved.nodes.is_empty() {
            None
        } else {
            let root = Node::from_preorder(&saved.nodes)
                .ok_or_else(|| SaplingError::InvalidModel("the nodes do not form a single tree".to_string()))?;
            Some(root)
        };
        DecisionTree::from_parts(saved.config, saved.num_features, saved.feature_names, root)
    }
}

fn check_feature_names(num_features: usize, feature_names: &Option<Vec<Option<String>>>) -> Result<(), SaplingError> {
    match feature_names {
        Some(names) if names.len() != num_features => Err(SaplingError::ShapeMismatch(
            "feature names".to_string(),
            num_features,
            names.len(),
        )),
        _ => Ok(()),
    }
}

impl DecisionTree {
    /// Create an untrained tree with the default configuration.
    ///
    /// * `num_features` - Number of attributes of every sample.
    /// * `feature_names` - Optional name of each attribute, any of which may be missing.
    pub fn new(num_features: usize, feature_names: Option<Vec<Option<String>>>) -> Result<Self, SaplingError> {
        check_feature_names(num_features, &feature_names)?;
        Ok(DecisionTree {
            config: TrainConfig::default(),
            num_features,
            feature_names,
            root: None,
        })
    }

    /// Assemble a tree from its parts, checking they agree with each other.
    pub(crate) fn from_parts(
        config: TrainConfig,
        num_features: usize,
        feature_names: Option<Vec<Option<String>>>,
        root: Option<Node>,
    ) -> Result<Self, SaplingError> {
        check_feature_names(num_features, &feature_names)?;
        for (node, _) in root.iter().flat_map(Node::walk) {
            match (node, config.tree_type) {
                (Node::Split { feature, .. }, _) if *feature >= num_features => {
                    return Err(SaplingError::InvalidModel(format!(
                        "split on attribute {} of a tree with {} attributes",
                        feature, num_features
                    )));
                }
                (Node::Leaf { value: value @ LeafValue::Value(_) }, TreeType::Classifier)
                | (Node::Leaf { value: value @ LeafValue::Class(_) }, TreeType::Regressor) => {
                    return Err(SaplingError::InvalidModel(format!(
                        "{} tree with a leaf holding {}",
                        config.tree_type, value
                    )));
                }
                _ => {}
            }
        }
        Ok(DecisionTree {
            config,
            num_features,
            feature_names,
            root,
        })
    }

    /// Set the configuration on the tree.
    /// * `config` - The configuration used by the next call to fit.
    pub fn set_config(mut self, config: TrainConfig) -> Self {
        self.configure(config);
        self
    }

    /// Replace the configuration used by the next call to fit. The configuration
    /// is validated when training starts. A trained tree of a different type
    /// than the new configuration is discarded.
    pub fn configure(&mut self, config: TrainConfig) {
        if self.root.is_some() && config.tree_type != self.config.tree_type {
            warn!(
                "Discarding trained {} tree, the configuration now describes a {}.",
                self.config.tree_type, config.tree_type
            );
            self.root = None;
        }
        self.config = config;
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Change the attributes the tree is trained on. Forgets the trained tree.
    pub fn set_features(
        &mut self,
        num_features: usize,
        feature_names: Option<Vec<Option<String>>>,
    ) -> Result<(), SaplingError> {
        check_feature_names(num_features, &feature_names)?;
        self.num_features = num_features;
        self.feature_names = feature_names;
        self.root = None;
        Ok(())
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn feature_names(&self) -> Option<&[Option<String>]> {
        self.feature_names.as_deref()
    }

    /// Name of attribute `feature`, if one was given.
    pub fn feature_name(&self, feature: usize) -> Option<&str> {
        self.feature_names
            .as_ref()
            .and_then(|names| names.get(feature))
            .and_then(|name| name.as_deref())
    }

    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    pub fn is_trained(&self) -> bool {
        self.root.is_some()
    }

    /// Forget the trained tree.
    pub fn reset(&mut self) {
        self.root = None;
    }

    /// Fit the tree on a provided dataset. The configuration is validated
    /// first. On any error the previously trained tree is left as it was.
    ///
    /// * `data` - Row major matrix with one row per sample, and `num_features` columns.
    /// * `labels` - Class labels for a classifier, or values for a regressor, one per row.
    pub fn fit(&mut self, data: &Matrix<f32>, labels: Labels) -> Result<(), SaplingError> {
        self.config.validate()?;
        if data.cols != self.num_features {
            return Err(SaplingError::ShapeMismatch(
                "attribute count".to_string(),
                self.num_features,
                data.cols,
            ));
        }
        if data.data.len() != data.rows * data.cols {
            return Err(SaplingError::ShapeMismatch(
                "matrix buffer".to_string(),
                data.rows * data.cols,
                data.data.len(),
            ));
        }
        if labels.len() != data.rows {
            return Err(SaplingError::ShapeMismatch("labels".to_string(), data.rows, labels.len()));
        }
        if data.rows == 0 {
            return Err(SaplingError::EmptyData);
        }

        info!(
            "Training {} on {} rows and {} attributes, criterion {}, max depth {}, max workers {}.",
            self.config.tree_type,
            data.rows,
            data.cols,
            self.config.criterion,
            self.config.max_depth,
            self.config.max_workers
        );
        let start = Instant::now();

        let root = match (self.config.tree_type, labels) {
            (TreeType::Classifier, Labels::Classes(y)) => {
                let splitter = ClassificationSplitter::new(y, &self.config)?;
                self.grow(data, &splitter)
            }
            (TreeType::Regressor, Labels::Values(y)) => {
                let splitter = RegressionSplitter::new(y, &self.config)?;
                self.grow(data, &splitter)
            }
            (tree_type, labels) => {
                return Err(SaplingError::LabelTypeMismatch(
                    tree_type.to_string(),
                    labels.kind().to_string(),
                ))
            }
        };

        info!(
            "Trained in {:.3} s: {} nodes, {} leaves, depth {}.",
            start.elapsed().as_secs_f32(),
            root.n_nodes(),
            root.n_leaves(),
            root.depth()
        );
        self.root = Some(root);
        Ok(())
    }

    fn grow<S: Splitter>(&self, data: &Matrix<f32>, splitter: &S) -> Node {
        let budget = WorkerBudget::new(self.config.max_workers);
        let grower = Grower {
            data,
            splitter,
            max_depth: self.config.max_depth,
            budget: &budget,
        };
        grower.grow_root()
    }

    fn untrained_value(&self) -> LeafValue {
        warn!("Predicting with an untrained decision tree, returning zero.");
        match self.config.tree_type {
            TreeType::Classifier => LeafValue::Class(0),
            TreeType::Regressor => LeafValue::Value(0.0),
        }
    }

    /// Rows may carry extra trailing values, never fewer than `num_features`.
    fn check_width(&self, width: usize) {
        assert!(
            width >= self.num_features,
            "row has {} values, the tree has {} attributes",
            width,
            self.num_features
        );
    }

    /// Predict one sample. An untrained tree predicts zero.
    ///
    /// * `row` - The attribute values of the sample.
    ///
    /// # Panics
    ///
    /// Panics if `row` has fewer than `num_features` values.
    pub fn predict(&self, row: &[f32]) -> LeafValue {
        self.check_width(row.len());
        match &self.root {
            Some(root) => root.predict(row),
            None => self.untrained_value(),
        }
    }

    /// Predict the class label of one sample.
    pub fn predict_class(&self, row: &[f32]) -> i32 {
        self.predict(row).as_class()
    }

    /// Predict the value of one sample.
    pub fn predict_value(&self, row: &[f32]) -> f32 {
        self.predict(row).as_value()
    }

    fn predict_rows<T, F>(&self, data: &Matrix<f32>, parallel: bool, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(LeafValue) -> T + Sync + Send,
    {
        self.check_width(data.cols);
        if parallel {
            (0..data.rows)
                .into_par_iter()
                .map(|r| f(self.predict(data.get_row(r))))
                .collect()
        } else {
            data.row_iter().map(|row| f(self.predict(row))).collect()
        }
    }

    /// Predict the class label of every row of the data.
    ///
    /// * `data` - Row major matrix with at least `num_features` columns.
    /// * `parallel` - Predict the rows in parallel.
    ///
    /// # Panics
    ///
    /// Panics if `data` has fewer than `num_features` columns.
    pub fn predict_classes(&self, data: &Matrix<f32>, parallel: bool) -> Vec<i32> {
        self.predict_rows(data, parallel, |v| v.as_class())
    }

    /// Predict the value of every row of the data. Panics under the same
    /// condition as [`DecisionTree::predict_classes`].
    ///
    /// * `data` - Row major matrix with at least `num_features` columns.
    /// * `parallel` - Predict the rows in parallel.
    pub fn predict_values(&self, data: &Matrix<f32>, parallel: bool) -> Vec<f32> {
        self.predict_rows(data, parallel, |v| v.as_value())
    }

    /// The decisions made routing a sample to its leaf, named after the
    /// attributes where names are known.
    ///
    /// # Panics
    ///
    /// Panics if `row` has fewer than `num_features` values.
    pub fn decision_path(&self, row: &[f32]) -> Vec<Decision> {
        self.check_width(row.len());
        let Some(root) = &self.root else {
            return Vec::new();
        };
        let (mut path, _) = root.decision_path(row);
        for d in path.iter_mut() {
            d.name = self.feature_name(d.feature).map(String::from);
        }
        path
    }

    /// Predict one sample, logging every decision made on the way to its leaf.
    pub fn predict_verbose(&self, row: &[f32]) -> LeafValue {
        for decision in self.decision_path(row) {
            info!("{}", decision);
        }
        self.predict(row)
    }

    pub fn n_nodes(&self) -> usize {
        self.root.as_ref().map_or(0, Node::n_nodes)
    }

    pub fn n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, Node::n_leaves)
    }

    /// Number of splits on the longest path from the root to a leaf.
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, Node::depth)
    }

    /// Encode the tree in the portable binary model format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SaplingError> {
        codec::to_bytes(self)
    }

    /// Decode a tree from the portable binary model format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SaplingError> {
        codec::from_bytes(bytes)
    }

    /// Save the tree to a binary model file.
    ///
    /// * `path` - Path to save the tree to.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SaplingError> {
        let bytes = self.to_bytes()?;
        fs::write(&path, bytes).map_err(|e| SaplingError::UnableToWrite(e.to_string()))?;
        info!("Saved decision tree to {}.", path.as_ref().display());
        Ok(())
    }

    /// Load a tree from a binary model file.
    ///
    /// * `path` - Path to load the tree from.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SaplingError> {
        let bytes = fs::read(path).map_err(|e| SaplingError::UnableToRead(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl ModelIO for DecisionTree {}

impl Display for DecisionTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.root {
            Some(root) => {
                writeln!(
                    f,
                    "{} ({}), {} attributes, depth {}:",
                    self.config.tree_type,
                    self.config.criterion,
                    self.num_features,
                    root.depth()
                )?;
                write!(f, "{}", root)
            }
            None => writeln!(f, "{} (untrained), {} attributes", self.config.tree_type, self.num_features),
        }
    }
}
