// Modules
pub mod bitset;
pub mod codec;
pub mod config;
pub mod data;
pub mod errors;
pub mod grower;
pub mod metric;
pub mod node;
pub mod splitter;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use config::{ModelIO, SplitCriterion, TrainConfig, TreeType};
pub use data::{Labels, Matrix};
pub use errors::SaplingError;
pub use node::{Decision, LeafValue, Node, NodeRecord};
pub use tree::DecisionTree;
