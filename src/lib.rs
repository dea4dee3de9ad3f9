//! # mixclass
//!
//! Multi-class classification with one Gaussian mixture per label, plus the
//! confidence-region geometry needed to draw each mixture component.
//!
//! - [`mixture`]: Gaussian mixture densities and their EM trainer.
//! - [`classifier`]: per-class training and likelihood-based decisions.
//! - [`region`]: ellipse / ellipsoid descriptors for 2D and 3D projections.
//! - [`linalg`]: the guarded symmetric eigendecomposition everything uses.
//! - [`config`]: hyperparameters and key-value persistence.
//!
//! The `parallel` feature trains classes, assigns k-means points, and builds
//! regions with rayon. Trained models are immutable and `Send + Sync`.

pub mod classifier;
pub mod config;
/// Error types used across `mixclass`.
pub mod error;
pub mod linalg;
pub mod mixture;
pub mod region;


pub use classifier::{evaluate, Classifier, ClassifierKind, Evaluation, GmmClassifier, LabelMap};
pub use config::{GmmParams, SettingsStore};
pub use error::{Error, Result};
pub use mixture::{CovarianceShape, GaussianComponent, GaussianMixture, InitStrategy, MixtureTrainer};
pub use region::{ComponentRegion, Ellipse, Ellipsoid, Region, View};
