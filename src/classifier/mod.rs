//! Multi-class classification on top of per-class Gaussian mixtures.
//!
//! A classifier family is chosen with [`ClassifierKind`], trained from flat
//! `(sample, label)` rows, and queried through the [`Classifier`] trait.
//!
//! ## Label handling
//!
//! Labels are arbitrary `i32` values. Training assigns each distinct label an
//! internal index in the order it first appears; [`LabelMap`] holds both
//! directions of that mapping and is fixed once training returns.
//!
//! ## Responses
//!
//! | Classes | `classify` output | `predict` rule |
//! |---------|-------------------|----------------|
//! | 2 | `[LL(pos) - LL(neg)]` | positive iff response > threshold |
//! | otherwise | one LL per class | arg-max, ties to lowest index |
//!
//! ```rust
//! use mixclass::classifier::{Classifier, ClassifierKind};
//! use mixclass::config::GmmParams;
//!
//! let data = vec![
//!     vec![0.0, 0.1], vec![0.2, -0.1], vec![-0.1, 0.0],
//!     vec![5.0, 5.1], vec![5.2, 4.9], vec![4.9, 5.0],
//! ];
//! let labels = vec![0, 0, 0, 1, 1, 1];
//!
//! let kind = ClassifierKind::Gmm(GmmParams::new(1).with_seed(7));
//! let model = kind.train(&data, &labels).unwrap();
//! assert_eq!(model.predict(&[5.0, 5.0]).unwrap(), 1);
//! ```

mod gmm;
mod labels;
mod traits;

pub use gmm::{ClassModel, GmmClassifier};
pub use labels::LabelMap;
pub use traits::Classifier;

use crate::config::GmmParams;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported classifier families and their hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassifierKind {
    /// One Gaussian mixture per class.
    Gmm(GmmParams),
}

impl Default for ClassifierKind {
    fn default() -> Self {
        ClassifierKind::Gmm(GmmParams::default())
    }
}

impl ClassifierKind {
    /// Train a classifier of this family.
    pub fn train(&self, data: &[Vec<f64>], labels: &[i32]) -> Result<Box<dyn Classifier>> {
        match self {
            ClassifierKind::Gmm(params) => {
                Ok(Box::new(GmmClassifier::train(params, data, labels)?))
            }
        }
    }
}

impl FromStr for ClassifierKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gmm" => Ok(ClassifierKind::Gmm(GmmParams::default())),
            _ => Err(Error::Other(format!("unknown classifier kind: {s}"))),
        }
    }
}

/// Per-sample outcome of scoring a classifier against known labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Whether each sample was predicted correctly, in input order.
    pub correct: Vec<bool>,
    /// Fraction of correct predictions (0 for an empty set).
    pub accuracy: f64,
}

impl Evaluation {
    /// Number of correctly predicted samples.
    pub fn n_correct(&self) -> usize {
        self.correct.iter().filter(|&&c| c).count()
    }
}

/// Predict every sample and compare against `labels`.
pub fn evaluate<C>(classifier: &C, data: &[Vec<f64>], labels: &[i32]) -> Result<Evaluation>
where
    C: Classifier + ?Sized,
{
    if data.len() != labels.len() {
        return Err(Error::ShapeMismatch {
            expected: format!("{} labels", data.len()),
            actual: format!("{} labels", labels.len()),
        });
    }
    let correct = data
        .iter()
        .zip(labels)
        .map(|(sample, &label)| classifier.predict(sample).map(|p| p == label))
        .collect::<Result<Vec<_>>>()?;
    let accuracy = if correct.is_empty() {
        0.0
    } else {
        correct.iter().filter(|&&c| c).count() as f64 / correct.len() as f64
    };
    Ok(Evaluation { correct, accuracy })
}
