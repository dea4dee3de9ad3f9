//! Gaussian mixture models.
//!
//! A mixture models a density as a weighted sum of Gaussians:
//!
//! ```text
//! P(x) = Σₖ πₖ × N(x | μₖ, Σₖ)
//! ```
//!
//! Where:
//! - πₖ = mixing weight of component k (weights sum to 1)
//! - μₖ = mean of component k
//! - Σₖ = covariance of component k
//!
//! ## Covariance shapes
//!
//! | Shape | Stored | Parameters per component |
//! |-------|--------|--------------------------|
//! | [`CovarianceShape::Full`] | D×D matrix | D(D+1)/2 |
//! | [`CovarianceShape::Diagonal`] | D variances | D |
//! | [`CovarianceShape::Spherical`] | one variance | 1 |
//!
//! All components of a mixture share a shape. Diagonal and spherical
//! storage is expanded to a full matrix only when asked for through
//! [`GaussianMixture::covariance`].
//!
//! ## Evaluation
//!
//! [`GaussianMixture::log_likelihood`] combines component log-densities with
//! log-sum-exp, so a sample far from every component still gets a finite
//! (very negative) score instead of `ln(0)`.
//!
//! Mixtures are produced by [`MixtureTrainer`] and are immutable afterwards.

mod init;
mod kmeans;
mod trainer;

pub use init::InitStrategy;
pub use trainer::{EmRun, MixtureTrainer, MAX_COMPONENTS};

use crate::error::{Error, Result};
use crate::linalg::decompose;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Smallest variance used when evaluating a density.
///
/// Trained covariances are regularized well above this; it only keeps
/// hand-built degenerate components from producing `ln(0)`.
const VARIANCE_FLOOR: f64 = f64::MIN_POSITIVE;

/// Structural constraint on the covariance matrices of a mixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CovarianceShape {
    /// Unconstrained symmetric matrix.
    #[default]
    Full,
    /// Off-diagonal entries forced to zero.
    Diagonal,
    /// One variance replicated on the diagonal.
    Spherical,
}

impl CovarianceShape {
    /// All shapes, in settings-index order.
    pub const ALL: [CovarianceShape; 3] = [
        CovarianceShape::Full,
        CovarianceShape::Diagonal,
        CovarianceShape::Spherical,
    ];

    /// Stable index used by settings stores.
    pub fn index(self) -> usize {
        match self {
            CovarianceShape::Full => 0,
            CovarianceShape::Diagonal => 1,
            CovarianceShape::Spherical => 2,
        }
    }

    /// Inverse of [`CovarianceShape::index`].
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Three-letter tag used in algorithm descriptions.
    pub fn tag(self) -> &'static str {
        match self {
            CovarianceShape::Full => "Ful",
            CovarianceShape::Diagonal => "Dia",
            CovarianceShape::Spherical => "Sph",
        }
    }
}

/// Covariance storage for one component.
#[derive(Debug, Clone, PartialEq)]
enum Covariance {
    Full(Array2<f64>),
    Diagonal(Array1<f64>),
    Spherical(f64),
}

impl Covariance {
    fn shape(&self) -> CovarianceShape {
        match self {
            Covariance::Full(_) => CovarianceShape::Full,
            Covariance::Diagonal(_) => CovarianceShape::Diagonal,
            Covariance::Spherical(_) => CovarianceShape::Spherical,
        }
    }

    fn to_full(&self, dim: usize) -> Array2<f64> {
        match self {
            Covariance::Full(m) => m.clone(),
            Covariance::Diagonal(v) => Array2::from_diag(v),
            Covariance::Spherical(s) => Array2::eye(dim) * *s,
        }
    }
}

/// Precomputed pieces of the log-density.
///
/// For a full covariance `Σ = V diag(λ) Vᵀ` the Mahalanobis term is
/// `Σᵢ (vᵢ · (x - μ))² / λᵢ`; diagonal and spherical shapes skip the basis.
#[derive(Debug, Clone, PartialEq)]
struct Density {
    basis: Option<Array2<f64>>,
    inv_variances: Array1<f64>,
    log_norm: f64,
}

impl Density {
    fn from_variances(basis: Option<Array2<f64>>, variances: &Array1<f64>) -> Self {
        let d = variances.len() as f64;
        let mut log_det = 0.0;
        let inv_variances = variances.mapv(|v| {
            let v = v.max(VARIANCE_FLOOR);
            log_det += v.ln();
            1.0 / v
        });
        let log_norm = -0.5 * (d * (2.0 * std::f64::consts::PI).ln() + log_det);
        Self {
            basis,
            inv_variances,
            log_norm,
        }
    }

    fn log_density(&self, mean: &Array1<f64>, x: &ArrayView1<'_, f64>) -> f64 {
        let diff = x - mean;
        let mahalanobis: f64 = match &self.basis {
            Some(basis) => basis
                .t()
                .dot(&diff)
                .iter()
                .zip(self.inv_variances.iter())
                .map(|(p, iv)| p * p * iv)
                .sum(),
            None => diff
                .iter()
                .zip(self.inv_variances.iter())
                .map(|(p, iv)| p * p * iv)
                .sum(),
        };
        self.log_norm - 0.5 * mahalanobis
    }
}

/// One weighted Gaussian of a mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianComponent {
    mean: Array1<f64>,
    covariance: Covariance,
    weight: f64,
    density: Density,
}

impl GaussianComponent {
    /// Component with an unconstrained covariance matrix.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if `covariance` is not `D×D` for a
    ///   mean of length `D`.
    /// - [`Error::DegenerateInput`] if `covariance` has non-finite entries.
    pub fn full(mean: Array1<f64>, covariance: Array2<f64>, weight: f64) -> Result<Self> {
        let d = mean.len();
        for found in [covariance.nrows(), covariance.ncols()] {
            if found != d {
                return Err(Error::DimensionMismatch { expected: d, found });
            }
        }
        let eig = decompose(covariance.view())?;
        let density = Density::from_variances(Some(eig.vectors), &eig.values);
        Ok(Self {
            mean,
            covariance: Covariance::Full(covariance),
            weight,
            density,
        })
    }

    /// Component with per-dimension variances and zero correlation.
    pub fn diagonal(mean: Array1<f64>, variances: Array1<f64>, weight: f64) -> Result<Self> {
        if variances.len() != mean.len() {
            return Err(Error::DimensionMismatch {
                expected: mean.len(),
                found: variances.len(),
            });
        }
        if variances.iter().any(|v| !v.is_finite()) {
            return Err(Error::DegenerateInput {
                reason: "variances contain non-finite entries",
            });
        }
        let density = Density::from_variances(None, &variances);
        Ok(Self {
            mean,
            covariance: Covariance::Diagonal(variances),
            weight,
            density,
        })
    }

    /// Component with a single isotropic variance.
    pub fn spherical(mean: Array1<f64>, variance: f64, weight: f64) -> Result<Self> {
        if !variance.is_finite() {
            return Err(Error::DegenerateInput {
                reason: "variance is non-finite",
            });
        }
        let density = Density::from_variances(None, &Array1::from_elem(mean.len(), variance));
        Ok(Self {
            mean,
            covariance: Covariance::Spherical(variance),
            weight,
            density,
        })
    }

    /// Build a component of the given shape from a full scatter matrix,
    /// discarding what the shape does not keep.
    pub(crate) fn constrained(
        shape: CovarianceShape,
        mean: Array1<f64>,
        scatter: Array2<f64>,
        weight: f64,
    ) -> Result<Self> {
        match shape {
            CovarianceShape::Full => Self::full(mean, scatter, weight),
            CovarianceShape::Diagonal => Self::diagonal(mean, scatter.diag().to_owned(), weight),
            CovarianceShape::Spherical => {
                let d = scatter.nrows().max(1) as f64;
                Self::spherical(mean, scatter.diag().sum() / d, weight)
            }
        }
    }

    /// Feature dimensionality.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Mean vector.
    pub fn mean(&self) -> ArrayView1<'_, f64> {
        self.mean.view()
    }

    /// Covariance expanded to a full `D×D` matrix.
    pub fn covariance(&self) -> Array2<f64> {
        self.covariance.to_full(self.dim())
    }

    /// Mixing weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Covariance shape this component is stored with.
    pub fn shape(&self) -> CovarianceShape {
        self.covariance.shape()
    }

    /// Log-density `ln N(x | μ, Σ)`, without the weight.
    ///
    /// The caller is responsible for `x` having length [`Self::dim`].
    pub fn log_density(&self, x: ArrayView1<'_, f64>) -> f64 {
        self.density.log_density(&self.mean, &x)
    }
}

/// A weighted set of Gaussian components over a fixed feature space.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    dim: usize,
    shape: CovarianceShape,
    components: Vec<GaussianComponent>,
}

impl GaussianMixture {
    /// Assemble a mixture from components.
    ///
    /// Weights are normalized to sum to one. When they sum to zero, every
    /// component gets the same weight.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] for no components, a component stored
    ///   with a different shape, or a negative/non-finite weight.
    /// - [`Error::DimensionMismatch`] if component dimensions disagree.
    pub fn new(shape: CovarianceShape, mut components: Vec<GaussianComponent>) -> Result<Self> {
        let first = components.first().ok_or(Error::InvalidParameter {
            name: "components",
            message: "mixture needs at least one component",
        })?;
        let dim = first.dim();

        for c in &components {
            if c.dim() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    found: c.dim(),
                });
            }
            if c.shape() != shape {
                return Err(Error::InvalidParameter {
                    name: "components",
                    message: "component covariance shape differs from mixture shape",
                });
            }
            if !c.weight.is_finite() || c.weight < 0.0 {
                return Err(Error::InvalidParameter {
                    name: "weight",
                    message: "must be finite and >= 0",
                });
            }
        }

        let total: f64 = components.iter().map(|c| c.weight).sum();
        let k = components.len() as f64;
        for c in &mut components {
            c.weight = if total > 0.0 { c.weight / total } else { 1.0 / k };
        }

        Ok(Self {
            dim,
            shape,
            components,
        })
    }

    /// Feature dimensionality.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Covariance shape shared by all components.
    pub fn shape(&self) -> CovarianceShape {
        self.shape
    }

    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// All components, in order.
    pub fn components(&self) -> &[GaussianComponent] {
        &self.components
    }

    /// Mean of component `i`.
    pub fn mean(&self, i: usize) -> Option<ArrayView1<'_, f64>> {
        self.components.get(i).map(GaussianComponent::mean)
    }

    /// Covariance of component `i`, expanded to `D×D`.
    pub fn covariance(&self, i: usize) -> Option<Array2<f64>> {
        self.components.get(i).map(GaussianComponent::covariance)
    }

    /// Mixing weight of component `i`.
    pub fn weight(&self, i: usize) -> Option<f64> {
        self.components.get(i).map(GaussianComponent::weight)
    }

    /// `ln P(x)` under the mixture.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if `sample.len() != self.dim()`.
    pub fn log_likelihood(&self, sample: &[f64]) -> Result<f64> {
        let x = self.check_sample(sample)?;
        Ok(logsumexp(&self.weighted_log_densities(x)))
    }

    /// Posterior probability of each component having generated `sample`.
    pub fn responsibilities(&self, sample: &[f64]) -> Result<Vec<f64>> {
        let x = self.check_sample(sample)?;
        let log_probs = self.weighted_log_densities(x);
        let log_sum = logsumexp(&log_probs);
        Ok(log_probs.iter().map(|lp| (lp - log_sum).exp()).collect())
    }

    /// `ln πₖ + ln N(x | μₖ, Σₖ)` for every component.
    pub(crate) fn weighted_log_densities(&self, x: ArrayView1<'_, f64>) -> Vec<f64> {
        self.components
            .iter()
            .map(|c| c.weight.ln() + c.log_density(x))
            .collect()
    }

    fn check_sample<'a>(&self, sample: &'a [f64]) -> Result<ArrayView1<'a, f64>> {
        if sample.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                found: sample.len(),
            });
        }
        Ok(ArrayView1::from(sample))
    }
}

/// Log-sum-exp for numerical stability.
pub(crate) fn logsumexp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val.is_infinite() {
        return max_val;
    }
    max_val
        + values
            .iter()
            .map(|&v| (v - max_val).exp())
            .sum::<f64>()
            .ln()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ndarray::array;

    const LN_2PI: f64 = 1.837_877_066_409_345_3;

    #[test]
    fn test_standard_normal_log_density() {
        let c = GaussianComponent::full(array![0.0, 0.0], Array2::eye(2), 1.0).unwrap();
        let lp = c.log_density(array![0.0, 0.0].view());
        assert!((lp + LN_2PI).abs() < 1e-12);

        let lp = c.log_density(array![1.0, 0.0].view());
        assert!((lp + LN_2PI + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_shapes_agree_on_isotropic_gaussian() {
        let mean = array![1.0, -2.0, 0.5];
        let full = GaussianComponent::full(mean.clone(), Array2::eye(3) * 2.0, 1.0).unwrap();
        let diag = GaussianComponent::diagonal(mean.clone(), Array1::from_elem(3, 2.0), 1.0).unwrap();
        let sph = GaussianComponent::spherical(mean, 2.0, 1.0).unwrap();

        let x = array![0.3, -1.0, 2.0];
        let a = full.log_density(x.view());
        let b = diag.log_density(x.view());
        let c = sph.log_density(x.view());
        assert!((a - b).abs() < 1e-10);
        assert!((b - c).abs() < 1e-12);
    }

    #[test]
    fn test_correlated_log_density() {
        // Σ = [[2, 1], [1, 2]], det = 3, Σ⁻¹ = [[2, -1], [-1, 2]] / 3.
        let cov = array![[2.0, 1.0], [1.0, 2.0]];
        let c = GaussianComponent::full(array![0.0, 0.0], cov, 1.0).unwrap();
        let x = array![1.0, 0.0];
        let expected = -LN_2PI - 0.5 * 3.0f64.ln() - 0.5 * (2.0 / 3.0);
        assert!((c.log_density(x.view()) - expected).abs() < 1e-10);
    }

    #[test]
    fn test_covariance_expansion() {
        let diag = GaussianComponent::diagonal(array![0.0, 0.0], array![1.0, 4.0], 1.0).unwrap();
        assert_eq!(diag.covariance(), array![[1.0, 0.0], [0.0, 4.0]]);

        let sph = GaussianComponent::spherical(array![0.0, 0.0], 3.0, 1.0).unwrap();
        assert_eq!(sph.covariance(), array![[3.0, 0.0], [0.0, 3.0]]);

        let cov = array![[2.0, 0.5], [0.5, 1.0]];
        let full = GaussianComponent::full(array![0.0, 0.0], cov.clone(), 1.0).unwrap();
        assert_eq!(full.covariance(), cov);
    }

    #[test]
    fn test_mixture_normalizes_weights() {
        let a = GaussianComponent::spherical(array![0.0], 1.0, 3.0).unwrap();
        let b = GaussianComponent::spherical(array![5.0], 1.0, 1.0).unwrap();
        let gmm = GaussianMixture::new(CovarianceShape::Spherical, vec![a, b]).unwrap();

        assert!((gmm.weight(0).unwrap() - 0.75).abs() < 1e-12);
        assert!((gmm.weight(1).unwrap() - 0.25).abs() < 1e-12);
        assert!(gmm.weight(2).is_none());
        assert_eq!(gmm.mean(1).unwrap()[0], 5.0);
    }

    #[test]
    fn test_mixture_log_likelihood_is_logsumexp() {
        let a = GaussianComponent::spherical(array![0.0], 1.0, 0.5).unwrap();
        let b = GaussianComponent::spherical(array![2.0], 1.0, 0.5).unwrap();
        let gmm = GaussianMixture::new(CovarianceShape::Spherical, vec![a.clone(), b.clone()]).unwrap();

        let x = [1.0];
        let direct = (0.5 * a.log_density(array![1.0].view()).exp()
            + 0.5 * b.log_density(array![1.0].view()).exp())
        .ln();
        assert!((gmm.log_likelihood(&x).unwrap() - direct).abs() < 1e-12);
    }

    #[test]
    fn test_log_likelihood_far_sample_is_finite() {
        let a = GaussianComponent::spherical(array![0.0, 0.0], 1e-3, 1.0).unwrap();
        let gmm = GaussianMixture::new(CovarianceShape::Spherical, vec![a]).unwrap();
        let ll = gmm.log_likelihood(&[1e3, 1e3]).unwrap();
        assert!(ll.is_finite());
        assert!(ll < -1e6);
    }

    #[test]
    fn test_responsibilities_sum_to_one() {
        let a = GaussianComponent::diagonal(array![0.0, 0.0], array![1.0, 1.0], 1.0).unwrap();
        let b = GaussianComponent::diagonal(array![4.0, 4.0], array![1.0, 2.0], 1.0).unwrap();
        let gmm = GaussianMixture::new(CovarianceShape::Diagonal, vec![a, b]).unwrap();

        let r = gmm.responsibilities(&[0.5, 0.2]).unwrap();
        assert!((r.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(r[0] > r[1]);
    }

    #[test]
    fn test_mixture_dimension_mismatch() {
        let a = GaussianComponent::spherical(array![0.0, 0.0], 1.0, 1.0).unwrap();
        let gmm = GaussianMixture::new(CovarianceShape::Spherical, vec![a]).unwrap();
        assert_eq!(
            gmm.log_likelihood(&[0.0, 0.0, 0.0]),
            Err(Error::DimensionMismatch {
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn test_mixture_rejects_inconsistent_components() {
        let a = GaussianComponent::spherical(array![0.0, 0.0], 1.0, 1.0).unwrap();
        let b = GaussianComponent::spherical(array![0.0], 1.0, 1.0).unwrap();
        assert!(GaussianMixture::new(CovarianceShape::Spherical, vec![a.clone(), b]).is_err());

        let c = GaussianComponent::diagonal(array![0.0, 0.0], array![1.0, 1.0], 1.0).unwrap();
        assert!(GaussianMixture::new(CovarianceShape::Spherical, vec![a.clone(), c]).is_err());

        let neg = GaussianComponent::spherical(array![0.0, 0.0], 1.0, -1.0).unwrap();
        assert!(GaussianMixture::new(CovarianceShape::Spherical, vec![a, neg]).is_err());

        assert!(GaussianMixture::new(CovarianceShape::Full, vec![]).is_err());
    }

    #[test]
    fn test_component_rejects_bad_covariance() {
        assert!(matches!(
            GaussianComponent::full(array![0.0, 0.0], Array2::eye(3), 1.0),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(matches!(
            GaussianComponent::full(array![0.0], array![[f64::NAN]], 1.0),
            Err(Error::DegenerateInput { .. })
        ));
    }

    #[test]
    fn test_shape_index_round_trip() {
        for shape in CovarianceShape::ALL {
            assert_eq!(CovarianceShape::from_index(shape.index()), Some(shape));
        }
        assert_eq!(CovarianceShape::from_index(3), None);
    }

    #[test]
    fn test_logsumexp() {
        assert_eq!(logsumexp(&[]), f64::NEG_INFINITY);
        assert_eq!(logsumexp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]), f64::NEG_INFINITY);
        let v = logsumexp(&[1000.0, 1000.0]);
        assert!((v - (1000.0 + 2.0f64.ln())).abs() < 1e-9);
    }
}
