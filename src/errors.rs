//! Errors
//!
//! Custom error types used throughout the `sapling` crate.
use thiserror::Error;

/// Errors that can occur while configuring, training, or persisting a decision tree.
#[derive(Debug, Error)]
pub enum SaplingError {
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// First value names the mismatched quantity, second is expected, third is what was passed.
    #[error("Shape mismatch for {0}, expected {1} but {2} provided.")]
    ShapeMismatch(String, usize, usize),
    /// The labels do not match the kind of tree being trained.
    #[error("A {0} tree cannot be trained on {1} labels.")]
    LabelTypeMismatch(String, String),
    /// No rows were passed to fit.
    #[error("Unable to train on an empty dataset.")]
    EmptyData,
    /// Unable to write model to file.
    #[error("Unable to write model to file: {0}")]
    UnableToWrite(String),
    /// Unable to read model from file.
    #[error("Unable to read model from a file {0}")]
    UnableToRead(String),
    /// The model bytes could be read, but do not describe a valid tree.
    #[error("Invalid model: {0}")]
    InvalidModel(String),
}
