//! Confidence-region geometry for mixture components.
//!
//! A component `N(μ, Σ)` is drawn by projecting it onto two or three feature
//! axes and describing the resulting ellipse or ellipsoid. Nothing here
//! renders; the descriptors are handed to whatever draws them.
//!
//! ## Ellipse (2D)
//!
//! With `a = Σ[x][x]`, `b = Σ[y][x]`, `c = Σ[y][y]`, the lower-triangular
//! factor
//!
//! ```text
//! L = | √a       0            |
//!     | b/√a     √(ca - b²)/√a |
//! ```
//!
//! satisfies `L·Lᵀ = [[a, b], [b, c]]`. The boundary at level `σ` is the
//! image under `L` of the circle of radius `σ`. Radii and angle come from the
//! closed-form eigenpairs of the 2×2 matrix `L·Lᵀ`.
//!
//! Degenerate inputs:
//!
//! | Condition | Result |
//! |-----------|--------|
//! | `a ≤ 0` | `L00 = L10 = 0`, `L11 = √max(c, 0)` |
//! | `ca - b² < 0` | `L11 = 0` |
//! | non-finite mean entry | component skipped (`None`) |
//! | non-finite `a`, `b` or `c` | [`Error::DegenerateInput`] |
//!
//! ## Ellipsoid (3D)
//!
//! The covariance restricted to the chosen axes is decomposed with
//! [`crate::linalg::decompose`]. Radii are `σ·√λ` (largest first) and the
//! orientation columns are the matching eigenvectors, each renormalized.
//! A plane view embedded in 3D gets a flat third axis of radius
//! [`FLAT_RADIUS`] along unit Z, with its center at `z = 0`.

use crate::classifier::GmmClassifier;
use crate::error::{Error, Result};
use crate::linalg;
use ndarray::{Array2, ArrayView1, ArrayView2};
use std::f64::consts::PI;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Third radius of an ellipsoid drawn for a plane view.
pub const FLAT_RADIUS: f64 = 0.001;

/// Boundary resolution used by renderers that do not pick their own.
pub const DEFAULT_SEGMENTS: usize = 64;

/// A 2D confidence ellipse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    /// Projected mean.
    pub center: [f64; 2],
    /// Semi-axis lengths, major first.
    pub radii: [f64; 2],
    /// Angle of the major axis from the x axis, in radians.
    pub angle: f64,
    /// Lower-triangular factor `σ·L`, row-major.
    pub factor: [[f64; 2]; 2],
}

impl Ellipse {
    /// Rotation whose first column is the major axis.
    pub fn orientation(&self) -> [[f64; 2]; 2] {
        let (s, c) = self.angle.sin_cos();
        [[c, -s], [s, c]]
    }

    /// `segments` points on the boundary, counter-clockwise from `θ = 0`.
    pub fn boundary(&self, segments: usize) -> Vec<[f64; 2]> {
        let [[l00, _], [l10, l11]] = self.factor;
        (0..segments)
            .map(|i| {
                let theta = 2.0 * PI * i as f64 / segments as f64;
                let (y, x) = theta.sin_cos();
                [
                    self.center[0] + l00 * x,
                    self.center[1] + l10 * x + l11 * y,
                ]
            })
            .collect()
    }
}

/// A 3D confidence ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Projected mean.
    pub center: [f64; 3],
    /// Semi-axis lengths, largest first.
    pub radii: [f64; 3],
    /// Row-major 3×3 matrix; column `i` is the unit direction of `radii[i]`.
    pub orientation: [[f64; 3]; 3],
}

/// Descriptor for one component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    /// Plane view.
    Ellipse(Ellipse),
    /// Space view.
    Ellipsoid(Ellipsoid),
}

/// Feature axes a model is projected onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Two axes, drawn as ellipses.
    Plane {
        /// Horizontal axis.
        x: usize,
        /// Vertical axis.
        y: usize,
    },
    /// Up to three axes, drawn as ellipsoids.
    Space {
        /// First axis.
        x: usize,
        /// Second axis.
        y: usize,
        /// Depth axis; `None` flattens the ellipsoid onto the x-y plane.
        z: Option<usize>,
    },
}

/// A region tagged with the class and component it was drawn for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentRegion {
    /// External class label.
    pub label: i32,
    /// Component index within the class mixture.
    pub component: usize,
    /// The geometry.
    pub region: Region,
}

/// Confidence ellipse of `N(mean, cov)` projected onto axes `x` and `y`.
///
/// Returns `Ok(None)` when any entry of the mean is not finite.
///
/// # Errors
///
/// - [`Error::DimensionMismatch`] if `cov` is not `D×D` for `D = mean.len()`.
/// - [`Error::AxisOutOfRange`] if `x` or `y` is `>= D`.
/// - [`Error::DegenerateInput`] if the projected covariance is not finite.
pub fn ellipse(
    mean: ArrayView1<'_, f64>,
    cov: ArrayView2<'_, f64>,
    x: usize,
    y: usize,
    sigma: f64,
) -> Result<Option<Ellipse>> {
    check_axes(mean, cov, &[x, y])?;
    if !mean.iter().all(|v| v.is_finite()) {
        return Ok(None);
    }
    let center = [mean[x], mean[y]];

    let (a, b, c) = (cov[[x, x]], cov[[y, x]], cov[[y, y]]);
    if ![a, b, c].iter().all(|v| v.is_finite()) {
        return Err(Error::DegenerateInput {
            reason: "projected covariance contains non-finite entries",
        });
    }
    let (l00, l10, l11) = if a > 0.0 {
        let root = a.sqrt();
        let disc = (c * a - b * b).max(0.0);
        (root, finite_or_zero(b / root), disc.sqrt() / root)
    } else {
        (0.0, 0.0, c.max(0.0).sqrt())
    };
    let factor = [
        [sigma * l00, 0.0],
        [finite_or_zero(sigma * l10), finite_or_zero(sigma * l11)],
    ];

    // Eigenpairs of F·Fᵀ = [[p, q], [q, r]].
    let [[f00, _], [f10, f11]] = factor;
    let p = f00 * f00;
    let q = f00 * f10;
    let r = f10 * f10 + f11 * f11;
    let mid = 0.5 * (p + r);
    let half = (0.25 * (p - r) * (p - r) + q * q).sqrt();
    let major = linalg::clamp_eigenvalue(mid + half).sqrt();
    let minor = linalg::clamp_eigenvalue(mid - half).sqrt();
    let angle = 0.5 * (2.0 * q).atan2(p - r);

    Ok(Some(Ellipse {
        center,
        radii: [major, minor],
        angle,
        factor,
    }))
}

/// Confidence ellipsoid of `N(mean, cov)` on axes `x`, `y` and optional `z`.
///
/// Returns `Ok(None)` when any entry of the mean is not finite.
///
/// # Errors
///
/// - [`Error::DimensionMismatch`] if `cov` is not `D×D` for `D = mean.len()`.
/// - [`Error::AxisOutOfRange`] if an axis is `>= D`.
/// - [`Error::DegenerateInput`] if the restricted covariance is not finite.
pub fn ellipsoid(
    mean: ArrayView1<'_, f64>,
    cov: ArrayView2<'_, f64>,
    x: usize,
    y: usize,
    z: Option<usize>,
    sigma: f64,
) -> Result<Option<Ellipsoid>> {
    let axes: Vec<usize> = [Some(x), Some(y), z].into_iter().flatten().collect();
    check_axes(mean, cov, &axes)?;
    if !mean.iter().all(|v| v.is_finite()) {
        return Ok(None);
    }

    let n = axes.len();
    let restricted = Array2::from_shape_fn((n, n), |(i, j)| cov[[axes[i], axes[j]]]);
    let eigen = linalg::decompose(restricted.view())?;

    let mut center = [0.0; 3];
    let mut radii = [FLAT_RADIUS; 3];
    let mut orientation = [[0.0; 3]; 3];
    orientation[2][2] = 1.0;
    for (slot, &axis) in axes.iter().enumerate() {
        center[slot] = mean[axis];
    }

    // Largest eigenvalue first.
    for col in 0..n {
        let k = n - 1 - col;
        radii[col] = sigma * eigen.values[k].sqrt();
        let v = eigen.vectors.column(k);
        let norm = v.dot(&v).sqrt();
        if norm > 0.0 {
            for row in 0..n {
                orientation[row][col] = v[row] / norm;
            }
        } else {
            orientation[col][col] = 1.0;
        }
    }

    Ok(Some(Ellipsoid {
        center,
        radii,
        orientation,
    }))
}

/// Label, component index, mean and expanded covariance of one component.
type Job<'a> = (i32, usize, ArrayView1<'a, f64>, Array2<f64>);

/// Regions for every component of every class, in class then component order.
///
/// Components with a non-finite mean are left out.
pub fn regions(model: &GmmClassifier, view: View, sigma: f64) -> Result<Vec<ComponentRegion>> {
    let jobs: Vec<Job<'_>> = model
        .classes()
        .iter()
        .flat_map(|class| {
            class
                .mixture
                .components()
                .iter()
                .enumerate()
                .map(move |(i, comp)| (class.label, i, comp.mean(), comp.covariance()))
        })
        .collect();

    let describe = |(label, component, mean, cov): &Job<'_>| -> Result<Option<ComponentRegion>> {
        let region = match view {
            View::Plane { x, y } => {
                ellipse(mean.view(), cov.view(), x, y, sigma)?.map(Region::Ellipse)
            }
            View::Space { x, y, z } => {
                ellipsoid(mean.view(), cov.view(), x, y, z, sigma)?.map(Region::Ellipsoid)
            }
        };
        Ok(region.map(|region| ComponentRegion {
            label: *label,
            component: *component,
            region,
        }))
    };

    #[cfg(feature = "parallel")]
    let described = jobs
        .par_iter()
        .map(describe)
        .collect::<Result<Vec<Option<ComponentRegion>>>>()?;
    #[cfg(not(feature = "parallel"))]
    let described = jobs
        .iter()
        .map(describe)
        .collect::<Result<Vec<Option<ComponentRegion>>>>()?;

    Ok(described.into_iter().flatten().collect())
}

fn check_axes(mean: ArrayView1<'_, f64>, cov: ArrayView2<'_, f64>, axes: &[usize]) -> Result<()> {
    let dim = mean.len();
    if cov.nrows() != dim || cov.ncols() != dim {
        return Err(Error::DimensionMismatch {
            expected: dim,
            found: if cov.nrows() != dim {
                cov.nrows()
            } else {
                cov.ncols()
            },
        });
    }
    match axes.iter().find(|&&axis| axis >= dim) {
        Some(&axis) => Err(Error::AxisOutOfRange { axis, dim }),
        None => Ok(()),
    }
}

#[inline]
fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::classifier::ClassModel;
    use crate::config::GmmParams;
    use crate::mixture::{CovarianceShape, GaussianComponent, GaussianMixture};
    use ndarray::{array, Array1};
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_axis_aligned_ellipse() {
        let mean = array![1.0, -2.0];
        let cov = array![[4.0, 0.0], [0.0, 1.0]];
        let e = ellipse(mean.view(), cov.view(), 0, 1, 1.0).unwrap().unwrap();

        assert_eq!(e.center, [1.0, -2.0]);
        assert!((e.radii[0] - 2.0).abs() < EPS);
        assert!((e.radii[1] - 1.0).abs() < EPS);
        assert!(e.angle.abs() < EPS);

        let pts = e.boundary(4);
        assert_eq!(pts.len(), 4);
        assert!((pts[0][0] - 3.0).abs() < EPS && (pts[0][1] + 2.0).abs() < EPS);
        assert!((pts[1][0] - 1.0).abs() < EPS && (pts[1][1] + 1.0).abs() < EPS);
    }

    #[test]
    fn test_correlated_ellipse() {
        let mean = array![0.0, 0.0];
        let cov = array![[2.0, 1.0], [1.0, 2.0]];
        let e = ellipse(mean.view(), cov.view(), 0, 1, 2.0).unwrap().unwrap();

        assert!((e.radii[0] - 2.0 * 3f64.sqrt()).abs() < EPS);
        assert!((e.radii[1] - 2.0).abs() < EPS);
        assert!((e.angle - PI / 4.0).abs() < EPS);

        let rot = e.orientation();
        assert!((rot[0][0] - rot[1][0]).abs() < EPS);
    }

    #[test]
    fn test_boundary_lies_on_sigma_contour() {
        let mean = array![0.5, 0.5];
        let cov = array![[3.0, -1.2], [-1.2, 1.5]];
        let sigma = 2.0;
        let e = ellipse(mean.view(), cov.view(), 0, 1, sigma).unwrap().unwrap();

        let det = 3.0 * 1.5 - 1.2 * 1.2;
        let inv = [[1.5 / det, 1.2 / det], [1.2 / det, 3.0 / det]];
        for [px, py] in e.boundary(DEFAULT_SEGMENTS) {
            let (dx, dy) = (px - 0.5, py - 0.5);
            let m = dx * (inv[0][0] * dx + inv[0][1] * dy) + dy * (inv[1][0] * dx + inv[1][1] * dy);
            assert!((m.sqrt() - sigma).abs() < 1e-9);
        }
    }

    #[test]
    fn test_degenerate_ellipse_clamps() {
        let mean = array![0.0, 0.0];

        let zero_x = array![[0.0, 0.0], [0.0, 4.0]];
        let e = ellipse(mean.view(), zero_x.view(), 0, 1, 1.0).unwrap().unwrap();
        assert!((e.radii[0] - 2.0).abs() < EPS);
        assert_eq!(e.radii[1], 0.0);

        let indefinite = array![[1.0, 2.0], [2.0, 1.0]];
        let e = ellipse(mean.view(), indefinite.view(), 0, 1, 1.0).unwrap().unwrap();
        assert!(e.radii.iter().all(|r| r.is_finite() && *r >= 0.0));
        assert_eq!(e.factor[1][1], 0.0);

        let negative = array![[-1.0, 0.0], [0.0, -1.0]];
        let e = ellipse(mean.view(), negative.view(), 0, 1, 1.0).unwrap().unwrap();
        assert_eq!(e.radii, [0.0, 0.0]);
    }

    #[test]
    fn test_non_finite_mean_is_skipped() {
        let cov = Array2::<f64>::eye(3);
        let mean = array![f64::NAN, 0.0, 0.0];
        assert_eq!(ellipse(mean.view(), cov.view(), 0, 1, 1.0).unwrap(), None);
        assert_eq!(
            ellipsoid(mean.view(), cov.view(), 0, 1, Some(2), 1.0).unwrap(),
            None
        );
        // A NaN off the drawn axes still marks the component as unusable.
        assert_eq!(ellipse(mean.view(), cov.view(), 1, 2, 1.0).unwrap(), None);
        assert_eq!(
            ellipsoid(mean.view(), cov.view(), 1, 2, None, 1.0).unwrap(),
            None
        );
    }

    #[test]
    fn test_non_finite_covariance_is_rejected() {
        let mean = array![0.0, 0.0];
        for cov in [
            array![[f64::INFINITY, 0.0], [0.0, 1.0]],
            array![[1.0, f64::NAN], [f64::NAN, 1.0]],
            array![[1.0, 0.0], [0.0, f64::NEG_INFINITY]],
        ] {
            assert!(matches!(
                ellipse(mean.view(), cov.view(), 0, 1, 1.0),
                Err(Error::DegenerateInput { .. })
            ));
            assert!(matches!(
                ellipsoid(mean.view(), cov.view(), 0, 1, None, 1.0),
                Err(Error::DegenerateInput { .. })
            ));
        }
    }

    #[test]
    fn test_axis_and_shape_errors() {
        let mean = array![0.0, 0.0];
        let cov = Array2::<f64>::eye(2);
        assert_eq!(
            ellipse(mean.view(), cov.view(), 0, 2, 1.0),
            Err(Error::AxisOutOfRange { axis: 2, dim: 2 })
        );
        assert_eq!(
            ellipsoid(mean.view(), cov.view(), 0, 1, Some(5), 1.0),
            Err(Error::AxisOutOfRange { axis: 5, dim: 2 })
        );
        let wide = Array2::<f64>::eye(3);
        assert!(matches!(
            ellipse(mean.view(), wide.view(), 0, 1, 1.0),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_ellipsoid_axis_aligned() {
        let mean = array![1.0, 2.0, 3.0, 4.0];
        let cov = Array2::from_diag(&array![1.0, 9.0, 4.0, 100.0]);
        let e = ellipsoid(mean.view(), cov.view(), 0, 1, Some(2), 1.0)
            .unwrap()
            .unwrap();

        assert_eq!(e.center, [1.0, 2.0, 3.0]);
        assert!((e.radii[0] - 3.0).abs() < EPS);
        assert!((e.radii[1] - 2.0).abs() < EPS);
        assert!((e.radii[2] - 1.0).abs() < EPS);
        // Major axis is the y feature.
        assert!((e.orientation[1][0].abs() - 1.0).abs() < EPS);
        assert!((e.orientation[2][1].abs() - 1.0).abs() < EPS);
        assert!((e.orientation[0][2].abs() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_ellipsoid_plane_embedding() {
        let mean = array![5.0, 6.0];
        let cov = array![[2.0, 1.0], [1.0, 2.0]];
        let e = ellipsoid(mean.view(), cov.view(), 0, 1, None, 1.0)
            .unwrap()
            .unwrap();

        assert_eq!(e.center, [5.0, 6.0, 0.0]);
        assert_eq!(e.radii[2], FLAT_RADIUS);
        assert_eq!(e.orientation[0][2], 0.0);
        assert_eq!(e.orientation[1][2], 0.0);
        assert_eq!(e.orientation[2][2], 1.0);
        assert_eq!(e.orientation[2][0], 0.0);
        assert_eq!(e.orientation[2][1], 0.0);
        assert!((e.radii[0] - 3f64.sqrt()).abs() < 1e-9);
        assert!((e.radii[1] - 1.0).abs() < 1e-9);
    }

    fn model() -> GmmClassifier {
        let comp = |m: Array1<f64>| GaussianComponent::spherical(m, 1.0, 1.0).unwrap();
        let a = GaussianMixture::new(
            CovarianceShape::Spherical,
            vec![comp(array![0.0, 0.0, 0.0]), comp(array![1.0, 1.0, 1.0])],
        )
        .unwrap();
        let b = GaussianMixture::new(CovarianceShape::Spherical, vec![comp(array![5.0, 5.0, 5.0])])
            .unwrap();
        GmmClassifier::from_parts(
            &GmmParams::default(),
            vec![
                ClassModel { label: 4, mixture: a },
                ClassModel { label: -1, mixture: b },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_regions_tags_every_component() {
        let model = model();
        let plane = regions(&model, View::Plane { x: 0, y: 2 }, 2.0).unwrap();
        let tags: Vec<(i32, usize)> = plane.iter().map(|r| (r.label, r.component)).collect();
        assert_eq!(tags, vec![(4, 0), (4, 1), (-1, 0)]);
        assert!(plane
            .iter()
            .all(|r| matches!(r.region, Region::Ellipse(e) if (e.radii[0] - 2.0).abs() < EPS)));

        let space = regions(&model, View::Space { x: 0, y: 1, z: Some(2) }, 1.0).unwrap();
        assert_eq!(space.len(), 3);
        assert!(matches!(space[2].region, Region::Ellipsoid(e) if e.center == [5.0, 5.0, 5.0]));

        assert_eq!(
            regions(&model, View::Plane { x: 0, y: 3 }, 1.0),
            Err(Error::AxisOutOfRange { axis: 3, dim: 3 })
        );
    }

    #[test]
    fn test_regions_skip_component_with_hidden_nan() {
        let comp = |m: Array1<f64>| GaussianComponent::spherical(m, 1.0, 1.0).unwrap();
        let mixture = GaussianMixture::new(
            CovarianceShape::Spherical,
            vec![comp(array![0.0, 0.0, f64::NAN]), comp(array![2.0, 2.0, 2.0])],
        )
        .unwrap();
        let model = GmmClassifier::from_parts(
            &GmmParams::default(),
            vec![ClassModel { label: 3, mixture }],
        )
        .unwrap();

        for view in [
            View::Plane { x: 0, y: 1 },
            View::Space { x: 0, y: 1, z: None },
        ] {
            let found = regions(&model, view, 1.0).unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!((found[0].label, found[0].component), (3, 1));
        }
    }

    proptest! {
        #[test]
        fn prop_ellipse_matches_ellipsoid(
            a in -3.0f64..3.0, b in -3.0f64..3.0, c in -3.0f64..3.0, d in -3.0f64..3.0,
            sigma in 0.5f64..3.0,
        ) {
            // M·Mᵀ is a valid covariance.
            let cov = array![[a * a + b * b, a * c + b * d], [a * c + b * d, c * c + d * d]];
            prop_assume!(cov[[0, 0]] > 1e-3);
            let mean = array![0.0, 0.0];

            let e = ellipse(mean.view(), cov.view(), 0, 1, sigma).unwrap().unwrap();
            let s = ellipsoid(mean.view(), cov.view(), 0, 1, None, sigma).unwrap().unwrap();

            for i in 0..2 {
                prop_assert!(e.radii[i].is_finite() && e.radii[i] >= 0.0);
                let (re, rs) = (e.radii[i] * e.radii[i], s.radii[i] * s.radii[i]);
                prop_assert!((re - rs).abs() < 1e-6 * (1.0 + s.radii[0] * s.radii[0]));
            }
            prop_assert!(e.radii[0] >= e.radii[1]);
        }
    }
}
