//! EM fitting of a single Gaussian mixture.
//!
//! # The EM Algorithm
//!
//! Direct maximum-likelihood optimization is intractable (sum inside log).
//! EM alternates two closed-form steps:
//!
//! **E-step**: compute responsibilities (soft assignments):
//! ```text
//! γₙₖ = P(z=k | xₙ) = πₖ × N(xₙ | μₖ, Σₖ) / Σⱼ πⱼ × N(xₙ | μⱼ, Σⱼ)
//! ```
//!
//! **M-step**: re-estimate parameters from the responsibilities:
//! - Nₖ = Σₙ γₙₖ
//! - πₖ = Nₖ / N
//! - μₖ = Σₙ γₙₖ xₙ / Nₖ
//! - Σₖ = Σₙ γₙₖ (xₙ - μₖ)(xₙ - μₖ)ᵀ / Nₖ + reg·I, then constrained to the
//!   covariance shape
//!
//! # Stopping
//!
//! EM stops when the total log-likelihood improves by less than
//! `tol · max(|LL|, 1)` between iterations, or after `max_iter` M-steps.
//!
//! # Failure Modes
//!
//! - **Local optima**: EM converges to a local maximum; initialization matters
//! - **Singular covariance**: duplicate points collapse a component; the
//!   diagonal regularization keeps every covariance positive-definite
//! - **Empty component**: a component that loses all responsibility is
//!   re-seeded at a random sample instead of being left undefined

use super::init::InitStrategy;
use super::{logsumexp, CovarianceShape, GaussianComponent, GaussianMixture};
use crate::error::{Error, Result};
use log::{debug, trace, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Responsibility mass below which a component counts as empty.
const MIN_RESPONSIBILITY: f64 = 1e-8;

/// Largest mixture a trainer will allocate.
pub const MAX_COMPONENTS: usize = 1 << 16;

/// Fits one Gaussian mixture with EM.
#[derive(Debug, Clone)]
pub struct MixtureTrainer {
    /// Number of components.
    n_components: usize,
    /// Covariance constraint shared by all components.
    shape: CovarianceShape,
    /// How means are seeded.
    init: InitStrategy,
    /// Maximum EM iterations.
    max_iter: usize,
    /// Relative log-likelihood tolerance.
    tol: f64,
    /// Diagonal regularization, relative to the mean data variance.
    reg_covar: f64,
    /// Random seed.
    seed: Option<u64>,
}

impl MixtureTrainer {
    /// Create a trainer for a mixture with `n_components` components.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            shape: CovarianceShape::Full,
            init: InitStrategy::KMeans,
            max_iter: 100,
            tol: 1e-5,
            reg_covar: 1e-6,
            seed: None,
        }
    }

    /// Set the covariance shape.
    pub fn with_shape(mut self, shape: CovarianceShape) -> Self {
        self.shape = shape;
        self
    }

    /// Set the initialization strategy.
    pub fn with_init(mut self, init: InitStrategy) -> Self {
        self.init = init;
        self
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the relative convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the covariance regularization factor.
    pub fn with_reg_covar(mut self, reg_covar: f64) -> Self {
        self.reg_covar = reg_covar;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Maximum EM iterations.
    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    /// Fit a mixture to `samples`, running EM to convergence.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyTrainingSet`] if `samples` is empty.
    /// - [`Error::DimensionMismatch`] if samples have different lengths.
    /// - [`Error::InvalidParameter`] for zero components, more than
    ///   [`MAX_COMPONENTS`], or zero features.
    /// - [`Error::DegenerateInput`] if a sample has a non-finite value.
    pub fn fit(&self, samples: &[Vec<f64>]) -> Result<GaussianMixture> {
        self.fit_array(samples_to_array(samples)?.view())
    }

    /// Fit a mixture to `data`, one sample per row.
    pub fn fit_array(&self, data: ArrayView2<'_, f64>) -> Result<GaussianMixture> {
        let mut run = self.start_array(data)?;
        while run.iteration() < self.max_iter {
            if run.step()? {
                break;
            }
        }
        debug!(
            "EM finished after {} iterations (converged: {}, log-likelihood: {:.6})",
            run.iteration(),
            run.converged(),
            run.log_likelihood()
        );
        Ok(run.finish())
    }

    /// Initialize EM without iterating; drive it with [`EmRun::step`].
    pub fn start(&self, samples: &[Vec<f64>]) -> Result<EmRun> {
        self.start_array(samples_to_array(samples)?.view())
    }

    /// Array form of [`MixtureTrainer::start`].
    pub fn start_array(&self, data: ArrayView2<'_, f64>) -> Result<EmRun> {
        if self.n_components == 0 {
            return Err(Error::InvalidParameter {
                name: "n_components",
                message: "must be > 0",
            });
        }
        if self.n_components > MAX_COMPONENTS {
            return Err(Error::InvalidParameter {
                name: "n_components",
                message: "exceeds MAX_COMPONENTS",
            });
        }
        let (n, d) = data.dim();
        if n == 0 {
            return Err(Error::EmptyTrainingSet { label: None });
        }
        if d == 0 {
            return Err(Error::InvalidParameter {
                name: "samples",
                message: "samples must have at least one feature",
            });
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(Error::DegenerateInput {
                reason: "training samples contain non-finite values",
            });
        }

        let mut rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        let data = data.to_owned();
        let (_, pooled) = weighted_moments(&data, &Array1::from_elem(n, 1.0), n as f64);
        let scale = pooled.diag().sum() / d as f64;
        let reg = if scale > 0.0 && scale.is_finite() {
            self.reg_covar * scale
        } else {
            self.reg_covar
        };
        let pooled = pooled + Array2::<f64>::eye(d) * reg;

        debug!(
            "EM start: {} samples, {} features, {} components, {:?} covariance, {:?} init",
            n, d, self.n_components, self.shape, self.init
        );

        let means = self
            .init
            .initial_means(data.view(), self.n_components, &mut rng)?;
        let weight = 1.0 / self.n_components as f64;
        let components = means
            .rows()
            .into_iter()
            .map(|m| GaussianComponent::constrained(self.shape, m.to_owned(), pooled.clone(), weight))
            .collect::<Result<Vec<_>>>()?;
        let mixture = GaussianMixture::new(self.shape, components)?;

        Ok(EmRun {
            data,
            shape: self.shape,
            tol: self.tol,
            reg,
            pooled,
            rng,
            mixture,
            log_likelihood: f64::NEG_INFINITY,
            iteration: 0,
            converged: false,
            reseeded: false,
        })
    }
}

/// An EM fit in progress.
///
/// Created by [`MixtureTrainer::start`]. Each [`EmRun::step`] performs one
/// E-step and, unless the log-likelihood has converged, one M-step. Callers
/// that need their own cap (wall clock, cancellation) check
/// [`EmRun::iteration`] between steps.
#[derive(Debug, Clone)]
pub struct EmRun {
    data: Array2<f64>,
    shape: CovarianceShape,
    tol: f64,
    reg: f64,
    pooled: Array2<f64>,
    rng: StdRng,
    mixture: GaussianMixture,
    log_likelihood: f64,
    iteration: usize,
    converged: bool,
    reseeded: bool,
}

impl EmRun {
    /// M-steps completed so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Total log-likelihood from the most recent E-step.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Whether the log-likelihood has stopped improving.
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Diagonal regularization added to every covariance.
    pub fn regularization(&self) -> f64 {
        self.reg
    }

    /// Current mixture parameters.
    pub fn mixture(&self) -> &GaussianMixture {
        &self.mixture
    }

    /// Consume the run and return the fitted mixture.
    pub fn finish(self) -> GaussianMixture {
        self.mixture
    }

    /// Run one EM iteration. Returns `true` once converged.
    pub fn step(&mut self) -> Result<bool> {
        if self.converged {
            return Ok(true);
        }

        let (resp, ll) = self.expectation();
        let previous = self.log_likelihood;
        self.log_likelihood = ll;
        trace!("EM iteration {}: log-likelihood {:.6}", self.iteration, ll);

        if previous.is_finite() && !self.reseeded {
            let improvement = ll - previous;
            if improvement.abs() <= self.tol * ll.abs().max(1.0) {
                self.converged = true;
                return Ok(true);
            }
        }

        self.maximization(&resp)?;
        self.iteration += 1;
        Ok(false)
    }

    /// Responsibilities (`n × k`) and total log-likelihood.
    fn expectation(&self) -> (Array2<f64>, f64) {
        let n = self.data.nrows();
        let k = self.mixture.n_components();
        let posterior = |i: usize| {
            let log_probs = self.mixture.weighted_log_densities(self.data.row(i));
            let log_sum = logsumexp(&log_probs);
            let row: Vec<f64> = log_probs.iter().map(|lp| (lp - log_sum).exp()).collect();
            (row, log_sum)
        };

        #[cfg(feature = "parallel")]
        let rows: Vec<(Vec<f64>, f64)> = (0..n).into_par_iter().map(posterior).collect();
        #[cfg(not(feature = "parallel"))]
        let rows: Vec<(Vec<f64>, f64)> = (0..n).map(posterior).collect();

        let mut resp = Array2::zeros((n, k));
        let mut total = 0.0;
        for (i, (row, log_sum)) in rows.into_iter().enumerate() {
            for (c, r) in row.into_iter().enumerate() {
                resp[[i, c]] = r;
            }
            total += log_sum;
        }
        (resp, total)
    }

    fn maximization(&mut self, resp: &Array2<f64>) -> Result<()> {
        let n = self.data.nrows();
        let d = self.data.ncols();
        let mut components = Vec::with_capacity(resp.ncols());
        self.reseeded = false;

        for (c, r) in resp.axis_iter(Axis(1)).enumerate() {
            let nk = r.sum();
            if !(nk > MIN_RESPONSIBILITY) {
                let idx = self.rng.random_range(0..n);
                warn!(
                    "EM component {} collapsed (mass {:.3e}); re-seeding at sample {}",
                    c, nk, idx
                );
                self.reseeded = true;
                components.push(GaussianComponent::constrained(
                    self.shape,
                    self.data.row(idx).to_owned(),
                    self.pooled.clone(),
                    1.0 / n as f64,
                )?);
                continue;
            }

            let (mean, scatter) = weighted_moments(&self.data, &r.to_owned(), nk);
            let covariance = scatter + Array2::<f64>::eye(d) * self.reg;
            components.push(GaussianComponent::constrained(
                self.shape,
                mean,
                covariance,
                nk / n as f64,
            )?);
        }

        self.mixture = GaussianMixture::new(self.shape, components)?;
        Ok(())
    }
}

/// Weighted mean and scatter matrix, both normalized by `total`.
fn weighted_moments(
    data: &Array2<f64>,
    weights: &Array1<f64>,
    total: f64,
) -> (Array1<f64>, Array2<f64>) {
    let mean = data.t().dot(weights) / total;
    let diff = data - &mean.view().insert_axis(Axis(0));
    let weighted = &diff * &weights.view().insert_axis(Axis(1));
    let scatter = weighted.t().dot(&diff) / total;
    (mean, scatter)
}

/// Stack samples into an `n × d` array, checking they share a length.
pub(crate) fn samples_to_array(samples: &[Vec<f64>]) -> Result<Array2<f64>> {
    let first = samples
        .first()
        .ok_or(Error::EmptyTrainingSet { label: None })?;
    let d = first.len();

    let mut flat: Vec<f64> = Vec::with_capacity(samples.len() * d);
    for point in samples {
        if point.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: point.len(),
            });
        }
        flat.extend(point);
    }
    Array2::from_shape_vec((samples.len(), d), flat).map_err(|e| Error::Other(e.to_string()))
}
