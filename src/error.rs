use core::fmt;

/// Result alias for `mixclass`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by training, classification, and region generation.
///
/// Only structural misuse is reported here. Numerical trouble (singular
/// covariances, empty clusters, negative eigenvalues) is absorbed where it
/// occurs.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A training set (or one label's share of it) had no samples.
    EmptyTrainingSet {
        /// Label whose sample set was empty, when known.
        label: Option<i32>,
    },

    /// Sample, mean, or covariance dimensionality disagreement.
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Training was requested with zero distinct labels.
    NoClasses,

    /// A non-finite matrix reached the decomposer, or the solver failed.
    DegenerateInput {
        /// What was wrong with the input.
        reason: &'static str,
    },

    /// Shape mismatch between parallel inputs (string description).
    ShapeMismatch {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// A projection axis does not exist in the feature space.
    AxisOutOfRange {
        /// Requested axis.
        axis: usize,
        /// Feature-space dimensionality.
        dim: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// Generic error with message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyTrainingSet { label: Some(label) } => {
                write!(f, "no training samples for label {label}")
            }
            Error::EmptyTrainingSet { label: None } => write!(f, "empty training set"),
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::NoClasses => write!(f, "no classes to train"),
            Error::DegenerateInput { reason } => write!(f, "degenerate input: {reason}"),
            Error::ShapeMismatch { expected, actual } => {
                write!(f, "shape mismatch: expected {expected}, actual {actual}")
            }
            Error::AxisOutOfRange { axis, dim } => {
                write!(f, "axis {axis} out of range for {dim}-dimensional data")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::Other(msg) => write!(f, "{msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
