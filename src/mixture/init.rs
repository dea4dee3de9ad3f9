//! Starting points for EM.
//!
//! The strategy only picks where the component means start; EM refines them
//! afterwards. All randomness comes from the trainer's RNG so a seeded
//! trainer is fully reproducible.

use super::kmeans::Kmeans;
use crate::error::{Error, Result};
use log::{log_enabled, trace, Level};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Perturbation applied to randomly drawn means, as a fraction of each
/// dimension's standard deviation.
const RANDOM_JITTER: f64 = 0.1;

/// How component means are seeded before EM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InitStrategy {
    /// Uniformly drawn samples plus a small Gaussian perturbation.
    Random,
    /// Evenly spaced along the diagonal of the data's bounding box.
    Uniform,
    /// Centroids of a k-means clustering.
    #[default]
    KMeans,
}

impl InitStrategy {
    /// All strategies, in settings-index order.
    pub const ALL: [InitStrategy; 3] = [
        InitStrategy::Random,
        InitStrategy::Uniform,
        InitStrategy::KMeans,
    ];

    /// Stable index used by settings stores.
    pub fn index(self) -> usize {
        match self {
            InitStrategy::Random => 0,
            InitStrategy::Uniform => 1,
            InitStrategy::KMeans => 2,
        }
    }

    /// Inverse of [`InitStrategy::index`].
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Three-letter tag used in algorithm descriptions.
    pub fn tag(self) -> &'static str {
        match self {
            InitStrategy::Random => "Rnd",
            InitStrategy::Uniform => "Uni",
            InitStrategy::KMeans => "K-M",
        }
    }

    /// Initial means, one per row (`k × d`).
    pub(crate) fn initial_means<R: Rng>(
        self,
        data: ArrayView2<'_, f64>,
        k: usize,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let n = data.nrows();
        if n == 0 {
            return Err(Error::EmptyTrainingSet { label: None });
        }
        match self {
            InitStrategy::Random => Ok(random_means(data, k, rng)),
            InitStrategy::Uniform => Ok(uniform_means(data, k)),
            InitStrategy::KMeans => {
                let fit = Kmeans::new(k).fit_with_rng(data, rng)?;
                if log_enabled!(Level::Trace) {
                    let mut sizes = vec![0usize; k];
                    for &label in &fit.labels {
                        sizes[label] += 1;
                    }
                    trace!(
                        "k-means seeding: {} iterations, cluster sizes {:?}",
                        fit.iterations,
                        sizes
                    );
                }
                Ok(fit.centroids)
            }
        }
    }
}

fn random_means<R: Rng>(data: ArrayView2<'_, f64>, k: usize, rng: &mut R) -> Array2<f64> {
    let n = data.nrows();
    let std_dev = data.std_axis(Axis(0), 0.0);
    let mut means = Array2::zeros((k, data.ncols()));

    for mut row in means.rows_mut() {
        let idx = rng.random_range(0..n);
        row.assign(&data.row(idx));
        for (v, &sd) in row.iter_mut().zip(std_dev.iter()) {
            // Normal::new only fails for a non-finite or negative spread.
            if let Ok(noise) = Normal::new(0.0, sd * RANDOM_JITTER) {
                *v += noise.sample(rng);
            }
        }
    }
    means
}

fn uniform_means(data: ArrayView2<'_, f64>, k: usize) -> Array2<f64> {
    let lo: Array1<f64> = data.fold_axis(Axis(0), f64::INFINITY, |&m, &v| m.min(v));
    let hi: Array1<f64> = data.fold_axis(Axis(0), f64::NEG_INFINITY, |&m, &v| m.max(v));
    let span = &hi - &lo;

    let mut means = Array2::zeros((k, data.ncols()));
    for (i, mut row) in means.rows_mut().into_iter().enumerate() {
        let t = (i as f64 + 0.5) / k as f64;
        row.assign(&(&lo + &(&span * t)));
    }
    means
}
