//! Classifier traits.

use super::labels::LabelMap;
use crate::error::Result;

/// A trained classifier.
///
/// Implementations are immutable once trained and can be queried from many
/// threads at once.
pub trait Classifier: Send + Sync {
    /// Raw responses for `sample`.
    ///
    /// One value (a decision statistic) for two-class models, otherwise one
    /// score per internal class index.
    fn classify(&self, sample: &[f64]) -> Result<Vec<f64>>;

    /// Predicted external label for `sample`.
    fn predict(&self, sample: &[f64]) -> Result<i32>;

    /// Label ↔ index tables fixed at training time.
    fn labels(&self) -> &LabelMap;

    /// Human readable description of the model and its hyperparameters.
    fn name(&self) -> String;
}
