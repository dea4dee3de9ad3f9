//! Classifier hyperparameters and their persistence.
//!
//! [`GmmParams`] is a plain value: it can be serialized with serde, stored
//! in any key-value [`SettingsStore`], or written as
//! `classificationOptions:<key> <value>` lines. The store itself is supplied
//! by the caller; this crate never touches the filesystem.

use crate::mixture::{CovarianceShape, InitStrategy, MixtureTrainer, MAX_COMPONENTS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;

/// Settings key for the number of components per class.
pub const COUNT_KEY: &str = "gmmCount";
/// Settings key for the covariance shape index.
pub const COVARIANCE_KEY: &str = "gmmCovariance";
/// Settings key for the initialization strategy index.
pub const INIT_KEY: &str = "gmmInit";
/// Settings key for the two-class decision threshold.
pub const THRESHOLD_KEY: &str = "gmmThreshold";

/// Section prefix used by [`GmmParams::write_params`].
const PARAMS_SECTION: &str = "classificationOptions";

/// A generic key-value settings collaborator.
pub trait SettingsStore {
    /// Store `value` under `key`, replacing any previous value.
    fn set_value(&mut self, key: &str, value: f64);

    /// Value stored under `key`, if any.
    fn value(&self, key: &str) -> Option<f64>;
}

impl SettingsStore for HashMap<String, f64> {
    fn set_value(&mut self, key: &str, value: f64) {
        self.insert(key.to_string(), value);
    }

    fn value(&self, key: &str) -> Option<f64> {
        self.get(key).copied()
    }
}

impl SettingsStore for BTreeMap<String, f64> {
    fn set_value(&mut self, key: &str, value: f64) {
        self.insert(key.to_string(), value);
    }

    fn value(&self, key: &str) -> Option<f64> {
        self.get(key).copied()
    }
}

/// Hyperparameters of the per-class Gaussian mixture classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmmParams {
    /// Mixture components fitted per class.
    pub n_components: usize,
    /// Covariance shape of every mixture.
    pub covariance_shape: CovarianceShape,
    /// How EM is seeded.
    pub init: InitStrategy,
    /// Two-class decision threshold on the log-likelihood ratio.
    pub threshold: f64,
    /// Label treated as positive in the two-class case.
    ///
    /// `None` means the class with internal index 1.
    pub positive_label: Option<i32>,
    /// Maximum EM iterations per mixture.
    pub max_iter: usize,
    /// Relative log-likelihood tolerance for EM.
    pub tol: f64,
    /// Covariance regularization factor.
    pub reg_covar: f64,
    /// Seed for reproducible training.
    pub seed: Option<u64>,
}

impl Default for GmmParams {
    fn default() -> Self {
        Self {
            n_components: 1,
            covariance_shape: CovarianceShape::Full,
            init: InitStrategy::KMeans,
            threshold: 0.0,
            positive_label: None,
            max_iter: 100,
            tol: 1e-5,
            reg_covar: 1e-6,
            seed: None,
        }
    }
}

impl GmmParams {
    /// Parameters with `n_components` components per class.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            ..Self::default()
        }
    }

    /// Set the covariance shape.
    pub fn with_shape(mut self, shape: CovarianceShape) -> Self {
        self.covariance_shape = shape;
        self
    }

    /// Set the initialization strategy.
    pub fn with_init(mut self, init: InitStrategy) -> Self {
        self.init = init;
        self
    }

    /// Set the two-class decision threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Choose which label counts as positive in the two-class case.
    pub fn with_positive_label(mut self, label: i32) -> Self {
        self.positive_label = Some(label);
        self
    }

    /// Set maximum EM iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Trainer for the class at internal index `class_index`.
    ///
    /// Each class gets its own seed so classes can be trained in any order
    /// (or in parallel) with the same result.
    pub fn trainer(&self, class_index: usize) -> MixtureTrainer {
        let trainer = MixtureTrainer::new(self.n_components)
            .with_shape(self.covariance_shape)
            .with_init(self.init)
            .with_max_iter(self.max_iter)
            .with_tol(self.tol)
            .with_reg_covar(self.reg_covar);
        match self.seed {
            Some(seed) => trainer.with_seed(seed.wrapping_add(class_index as u64)),
            None => trainer,
        }
    }

    /// Short description, e.g. `"GMM 3 Ful K-M"`.
    pub fn algo_string(&self) -> String {
        format!(
            "GMM {} {} {}",
            self.n_components,
            self.covariance_shape.tag(),
            self.init.tag()
        )
    }

    /// Write the persisted hyperparameters into `store`.
    pub fn save_options<S: SettingsStore + ?Sized>(&self, store: &mut S) {
        store.set_value(COUNT_KEY, self.n_components as f64);
        store.set_value(COVARIANCE_KEY, self.covariance_shape.index() as f64);
        store.set_value(INIT_KEY, self.init.index() as f64);
        store.set_value(THRESHOLD_KEY, self.threshold);
    }

    /// Read hyperparameters from `store`.
    ///
    /// Missing keys and out-of-range values leave the current value alone.
    /// Component counts must lie in `1..=MAX_COMPONENTS`.
    pub fn load_options<S: SettingsStore + ?Sized>(&mut self, store: &S) {
        for key in [COUNT_KEY, COVARIANCE_KEY, INIT_KEY, THRESHOLD_KEY] {
            if let Some(value) = store.value(key) {
                self.apply(key, value);
            }
        }
    }

    /// Write one `classificationOptions:<key> <value>` line per parameter.
    pub fn write_params<W: io::Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "{PARAMS_SECTION}:{COUNT_KEY} {}", self.n_components)?;
        writeln!(
            out,
            "{PARAMS_SECTION}:{COVARIANCE_KEY} {}",
            self.covariance_shape.index()
        )?;
        writeln!(out, "{PARAMS_SECTION}:{INIT_KEY} {}", self.init.index())?;
        writeln!(out, "{PARAMS_SECTION}:{THRESHOLD_KEY} {}", self.threshold)?;
        Ok(())
    }

    /// Apply one parameter line, matching `name` by key suffix.
    ///
    /// Returns `false` if `name` is not a known key or `value` is unusable.
    pub fn load_param(&mut self, name: &str, value: f64) -> bool {
        [COUNT_KEY, COVARIANCE_KEY, INIT_KEY, THRESHOLD_KEY]
            .into_iter()
            .find(|key| name.ends_with(key))
            .is_some_and(|key| self.apply(key, value))
    }

    fn apply(&mut self, key: &str, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match key {
            COUNT_KEY if (1.0..=MAX_COMPONENTS as f64).contains(&value) => {
                self.n_components = value as usize;
                true
            }
            COVARIANCE_KEY if value >= 0.0 => CovarianceShape::from_index(value as usize)
                .map(|shape| self.covariance_shape = shape)
                .is_some(),
            INIT_KEY if value >= 0.0 => InitStrategy::from_index(value as usize)
                .map(|init| self.init = init)
                .is_some(),
            THRESHOLD_KEY => {
                self.threshold = value;
                true
            }
            _ => false,
        }
    }
}
