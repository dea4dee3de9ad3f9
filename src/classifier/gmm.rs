//! Per-class Gaussian mixture classifier.
//!
//! Training fits one [`GaussianMixture`] per distinct label. Classification
//! compares the class-conditional log-likelihoods:
//!
//! - **Two classes**: a single response, the log-likelihood ratio
//!   `ln P(x | positive) - ln P(x | negative)`. The positive label is chosen
//!   with [`GmmParams::positive_label`]; without it the class at internal
//!   index 1 is positive. The prediction is positive iff the response is
//!   strictly above [`GmmParams::threshold`].
//! - **One or more than two classes**: one log-likelihood per internal
//!   index; the prediction is the arg-max, ties going to the lowest index.

use super::labels::LabelMap;
use super::traits::Classifier;
use crate::config::GmmParams;
use crate::error::{Error, Result};
use crate::mixture::GaussianMixture;
use log::debug;
use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A class label paired with the mixture fitted to its samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassModel {
    /// External class label.
    pub label: i32,
    /// Mixture fitted to this label's samples.
    pub mixture: GaussianMixture,
}

/// Trained multi-class Gaussian mixture classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct GmmClassifier {
    classes: Vec<ClassModel>,
    labels: LabelMap,
    positive: usize,
    params: GmmParams,
}

impl GmmClassifier {
    /// Train from flat samples and their labels.
    ///
    /// Internal indices follow the order in which labels first appear in
    /// `labels`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoClasses`] if `data` is empty.
    /// - [`Error::ShapeMismatch`] if `data` and `labels` differ in length.
    /// - Anything [`GmmClassifier::train_grouped`] reports.
    pub fn train(params: &GmmParams, data: &[Vec<f64>], labels: &[i32]) -> Result<Self> {
        if data.len() != labels.len() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} labels", data.len()),
                actual: format!("{} labels", labels.len()),
            });
        }

        let mut slot: HashMap<i32, usize> = HashMap::new();
        let mut groups: Vec<(i32, Vec<Vec<f64>>)> = Vec::new();
        for (sample, &label) in data.iter().zip(labels) {
            let i = *slot.entry(label).or_insert_with(|| {
                groups.push((label, Vec::new()));
                groups.len() - 1
            });
            groups[i].1.push(sample.clone());
        }

        Self::train_grouped(params, &groups)
    }

    /// Train from samples already grouped by label.
    ///
    /// Group order fixes the internal class indices.
    ///
    /// # Errors
    ///
    /// - [`Error::NoClasses`] if `groups` is empty.
    /// - [`Error::EmptyTrainingSet`] if a group has no samples.
    /// - [`Error::InvalidParameter`] if a label appears twice, or the
    ///   positive label was not trained.
    /// - [`Error::DimensionMismatch`] if samples disagree in length.
    pub fn train_grouped(params: &GmmParams, groups: &[(i32, Vec<Vec<f64>>)]) -> Result<Self> {
        if groups.is_empty() {
            return Err(Error::NoClasses);
        }
        let labels = LabelMap::from_encounter_order(groups.iter().map(|(label, _)| *label));
        if labels.len() != groups.len() {
            return Err(Error::InvalidParameter {
                name: "groups",
                message: "each label may appear in only one group",
            });
        }

        let dim = groups[0].1.first().map_or(0, Vec::len);
        for (label, samples) in groups {
            if samples.is_empty() {
                return Err(Error::EmptyTrainingSet {
                    label: Some(*label),
                });
            }
            if let Some(bad) = samples.iter().find(|s| s.len() != dim) {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    found: bad.len(),
                });
            }
        }

        debug!(
            "training {} classes with {} ({} features)",
            groups.len(),
            params.algo_string(),
            dim
        );

        let fit_class = |(index, (label, samples)): (usize, &(i32, Vec<Vec<f64>>))| {
            params.trainer(index).fit(samples).map(|mixture| ClassModel {
                label: *label,
                mixture,
            })
        };

        #[cfg(feature = "parallel")]
        let classes = groups
            .par_iter()
            .enumerate()
            .map(fit_class)
            .collect::<Result<Vec<_>>>()?;
        #[cfg(not(feature = "parallel"))]
        let classes = groups
            .iter()
            .enumerate()
            .map(fit_class)
            .collect::<Result<Vec<_>>>()?;

        Self::assemble(params, classes, labels)
    }

    /// Assemble a classifier from already-fitted class mixtures.
    ///
    /// # Errors
    ///
    /// - [`Error::NoClasses`] if `classes` is empty.
    /// - [`Error::InvalidParameter`] for repeated labels or an untrained
    ///   positive label.
    /// - [`Error::DimensionMismatch`] if mixtures disagree in dimension.
    pub fn from_parts(params: &GmmParams, classes: Vec<ClassModel>) -> Result<Self> {
        if classes.is_empty() {
            return Err(Error::NoClasses);
        }
        let labels = LabelMap::from_encounter_order(classes.iter().map(|c| c.label));
        if labels.len() != classes.len() {
            return Err(Error::InvalidParameter {
                name: "classes",
                message: "each label may appear only once",
            });
        }
        let dim = classes[0].mixture.dim();
        if let Some(bad) = classes.iter().find(|c| c.mixture.dim() != dim) {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found: bad.mixture.dim(),
            });
        }
        Self::assemble(params, classes, labels)
    }

    fn assemble(params: &GmmParams, classes: Vec<ClassModel>, labels: LabelMap) -> Result<Self> {
        let positive = match params.positive_label {
            Some(label) => labels.index_of(label).ok_or(Error::InvalidParameter {
                name: "positive_label",
                message: "positive label was not among the trained labels",
            })?,
            None => 1.min(classes.len() - 1),
        };
        Ok(Self {
            classes,
            labels,
            positive,
            params: params.clone(),
        })
    }

    /// Trained classes, in internal index order.
    pub fn classes(&self) -> &[ClassModel] {
        &self.classes
    }

    /// Number of trained classes.
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Feature dimensionality.
    pub fn dim(&self) -> usize {
        self.classes[0].mixture.dim()
    }

    /// Hyperparameters the model was trained with.
    pub fn params(&self) -> &GmmParams {
        &self.params
    }

    /// Internal index of the positive class (two-class models).
    pub fn positive_index(&self) -> usize {
        self.positive
    }

    /// Two-class decision threshold.
    pub fn threshold(&self) -> f64 {
        self.params.threshold
    }

    /// Per-class log-likelihoods of `sample`, in internal index order.
    pub fn log_likelihoods(&self, sample: &[f64]) -> Result<Vec<f64>> {
        self.classes
            .iter()
            .map(|c| c.mixture.log_likelihood(sample))
            .collect()
    }

    /// Internal class index selected by `responses` from [`Self::classify`].
    pub fn decide(&self, responses: &[f64]) -> usize {
        if self.is_binary() {
            return match responses.first() {
                Some(&r) if r > self.params.threshold => self.positive,
                _ => 1 - self.positive,
            };
        }
        let mut best = 0;
        for (i, &r) in responses.iter().enumerate().skip(1) {
            if r > responses[best] {
                best = i;
            }
        }
        best
    }

    fn is_binary(&self) -> bool {
        self.classes.len() == 2
    }
}

impl Classifier for GmmClassifier {
    fn classify(&self, sample: &[f64]) -> Result<Vec<f64>> {
        let ll = self.log_likelihoods(sample)?;
        if self.is_binary() {
            Ok(vec![ll[self.positive] - ll[1 - self.positive]])
        } else {
            Ok(ll)
        }
    }

    fn predict(&self, sample: &[f64]) -> Result<i32> {
        let responses = self.classify(sample)?;
        Ok(self.classes[self.decide(&responses)].label)
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn name(&self) -> String {
        self.params.algo_string()
    }
}
