//! K-means clustering, used to seed mixture means.
//!
//! Partitions data into k clusters by minimizing **within-cluster sum of
//! squares**:
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ ||xᵢ - μₖ||²
//! ```
//!
//! # Lloyd's Algorithm
//!
//! 1. Initialize k centroids with k-means++
//! 2. **Assign**: each point → nearest centroid
//! 3. **Update**: each centroid → mean of its assigned points
//! 4. Repeat until the centroids stop moving
//!
//! ## K-means++ Initialization
//!
//! 1. Choose the first centroid uniformly at random
//! 2. Choose each next centroid with probability proportional to D(x)²
//!    (squared distance to the nearest existing centroid)
//!
//! When every remaining point coincides with a chosen centroid (duplicate
//! data, or k > n) the next centroid is drawn uniformly instead.

use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// K-means clustering over `f64` rows.
#[derive(Debug, Clone)]
pub(crate) struct Kmeans {
    /// Number of clusters.
    k: usize,
    /// Maximum iterations.
    max_iter: usize,
    /// Convergence tolerance (squared centroid shift).
    tol: f64,
}

/// Result of a k-means run.
#[derive(Debug, Clone)]
pub(crate) struct KmeansFit {
    /// Final centroids, one per row.
    pub(crate) centroids: Array2<f64>,
    /// Cluster index of every input row.
    pub(crate) labels: Vec<usize>,
    /// Lloyd iterations performed.
    pub(crate) iterations: usize,
}

impl Kmeans {
    /// Create a new K-means clusterer.
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 100,
            tol: 1e-8,
        }
    }

    /// Cluster `data` (one sample per row) drawing all randomness from `rng`.
    pub(crate) fn fit_with_rng<R: Rng>(
        &self,
        data: ArrayView2<'_, f64>,
        rng: &mut R,
    ) -> Result<KmeansFit> {
        let n = data.nrows();
        if n == 0 {
            return Err(Error::EmptyTrainingSet { label: None });
        }
        if self.k == 0 {
            return Err(Error::InvalidParameter {
                name: "k",
                message: "must be > 0",
            });
        }

        let mut centroids = self.init_centroids(data, rng);
        let mut labels = vec![0usize; n];
        let mut iterations = 0;

        for _iter in 0..self.max_iter {
            iterations += 1;

            // Assignment step - parallel when feature enabled
            #[cfg(feature = "parallel")]
            {
                let centroids_ref = &centroids;
                labels.par_iter_mut().enumerate().for_each(|(i, label)| {
                    *label = nearest(data.row(i), centroids_ref);
                });
            }

            #[cfg(not(feature = "parallel"))]
            for (i, label) in labels.iter_mut().enumerate() {
                *label = nearest(data.row(i), &centroids);
            }

            // Update step
            let d = data.ncols();
            let mut new_centroids = Array2::zeros((self.k, d));
            let mut counts = vec![0usize; self.k];

            for (i, &k) in labels.iter().enumerate() {
                let mut row = new_centroids.row_mut(k);
                row += &data.row(i);
                counts[k] += 1;
            }

            for (k, &count) in counts.iter().enumerate() {
                if count > 0 {
                    new_centroids.row_mut(k).mapv_inplace(|v| v / count as f64);
                } else {
                    // Empty cluster: reinitialize randomly
                    let idx = rng.random_range(0..n);
                    new_centroids.row_mut(k).assign(&data.row(idx));
                }
            }

            let shift: f64 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();

            centroids = new_centroids;

            if shift <= self.tol {
                break;
            }
        }

        Ok(KmeansFit {
            centroids,
            labels,
            iterations,
        })
    }

    /// Initialize centroids using k-means++.
    fn init_centroids<R: Rng>(&self, data: ArrayView2<'_, f64>, rng: &mut R) -> Array2<f64> {
        let n = data.nrows();
        let mut centroids = Array2::zeros((self.k, data.ncols()));

        // First centroid: random point
        let first = rng.random_range(0..n);
        centroids.row_mut(0).assign(&data.row(first));

        // Remaining centroids: k-means++ selection
        for i in 1..self.k {
            let distances: Vec<f64> = data
                .rows()
                .into_iter()
                .map(|point| {
                    (0..i)
                        .map(|c| squared_distance(point, centroids.row(c)))
                        .fold(f64::MAX, f64::min)
                })
                .collect();

            // Sample proportional to squared distance
            let total: f64 = distances.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                let idx = rng.random_range(0..n);
                centroids.row_mut(i).assign(&data.row(idx));
                continue;
            }

            let threshold = rng.random::<f64>() * total;
            let mut cumsum = 0.0;
            let mut selected = n - 1;

            for (j, &d) in distances.iter().enumerate() {
                cumsum += d;
                if cumsum >= threshold {
                    selected = j;
                    break;
                }
            }

            centroids.row_mut(i).assign(&data.row(selected));
        }

        centroids
    }
}

/// Index of the centroid closest to `point`; ties go to the lower index.
fn nearest(point: ArrayView1<'_, f64>, centroids: &Array2<f64>) -> usize {
    let mut best_cluster = 0;
    let mut best_dist = f64::MAX;
    for (k, centroid) in centroids.rows().into_iter().enumerate() {
        let dist = squared_distance(point, centroid);
        if dist < best_dist {
            best_dist = dist;
            best_cluster = k;
        }
    }
    best_cluster
}

/// Compute squared Euclidean distance.
fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
