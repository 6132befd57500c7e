//! Foreground-probability kernels around a centroid.
//!
//! Both kernels map an embedded point to a membership probability in `(0, 1]`
//! that decreases monotonically with distance from the centroid:
//!
//! ```text
//! gaussian:     p(x) = exp(-||x - c||² / (2σ²))
//! ellipsoidal:  p(x) = exp(-Σ_k (x_k - c_k)² / (2σ_k²))
//! ```
//!
//! The kernels do not guard the bandwidth: `σ = 0` divides by zero. Margins
//! coming out of a network must go through [`clamp_margin`] first, which the
//! losses and the decoder in this crate do.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::util;
use crate::error::{Error, Result};

/// Smallest bandwidth handed to a kernel.
pub const MIN_MARGIN: f32 = 1e-6;

/// Kernel shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kernel {
    /// Isotropic Gaussian with one scalar bandwidth.
    #[default]
    Gaussian,
    /// Axis-aligned anisotropic Gaussian with one bandwidth per embedding dimension.
    Ellipsoidal,
}

impl Kernel {
    /// Number of bandwidth components this kernel expects for `dim`-dimensional embeddings.
    pub fn bandwidth_len(self, dim: usize) -> usize {
        match self {
            Kernel::Gaussian => 1,
            Kernel::Ellipsoidal => dim,
        }
    }

    /// Validates a bandwidth vector against the embedding dimension.
    pub fn check_bandwidth(self, dim: usize, sigma_len: usize) -> Result<()> {
        let expected = self.bandwidth_len(dim);
        if sigma_len != expected {
            return Err(Error::DimensionMismatch {
                expected,
                found: sigma_len,
            });
        }
        Ok(())
    }

    /// Foreground probability of `x` for a kernel at `centroid` with bandwidth `sigma`.
    #[inline]
    pub fn density(self, x: &[f32], centroid: &[f32], sigma: &[f32]) -> f32 {
        match self {
            Kernel::Gaussian => {
                let s = sigma[0];
                (-util::squared_euclidean(x, centroid) / (2.0 * s * s)).exp()
            }
            Kernel::Ellipsoidal => {
                let z: f32 = x
                    .iter()
                    .zip(centroid)
                    .zip(sigma)
                    .map(|((xk, ck), sk)| {
                        let d = xk - ck;
                        d * d / (2.0 * sk * sk)
                    })
                    .sum();
                (-z).exp()
            }
        }
    }

    /// Evaluates [`Kernel::density`] over every point.
    pub fn densities(self, points: &[Vec<f32>], centroid: &[f32], sigma: &[f32]) -> Vec<f32> {
        points
            .iter()
            .map(|x| self.density(x, centroid, sigma))
            .collect()
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kernel::Gaussian => "gaussian",
            Kernel::Ellipsoidal => "ellipsoidal",
        })
    }
}

impl FromStr for Kernel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gaussian" => Ok(Kernel::Gaussian),
            "ellipsoidal" | "bivariate" => Ok(Kernel::Ellipsoidal),
            other => Err(Error::UnknownVariant {
                kind: "kernel",
                name: other.to_string(),
            }),
        }
    }
}

/// A claimed cluster: kernel centre and bandwidth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sphere {
    /// Kernel centre in embedding space.
    pub centroid: Vec<f32>,
    /// Bandwidth (one component, or one per dimension).
    pub sigma: Vec<f32>,
}

impl Sphere {
    /// Membership probability of `x` under `kernel`.
    pub fn density(&self, kernel: Kernel, x: &[f32]) -> f32 {
        kernel.density(x, &self.centroid, &self.sigma)
    }
}

/// Raises every bandwidth component to at least [`MIN_MARGIN`].
///
/// NaN components are replaced by the floor as well.
pub fn clamp_margin(sigma: &[f32]) -> Vec<f32> {
    sigma
        .iter()
        .map(|&s| if s.is_nan() || s < MIN_MARGIN { MIN_MARGIN } else { s })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_is_one_at_centroid_and_decreasing() {
        let c = [1.0, 1.0];
        let s = [0.5];
        let k = Kernel::Gaussian;
        assert_eq!(k.density(&c, &c, &s), 1.0);

        let near = k.density(&[1.1, 1.0], &c, &s);
        let far = k.density(&[2.0, 1.0], &c, &s);
        assert!(near < 1.0 && near > far && far > 0.0);

        // exp(-1 / (2 * 0.25)) = exp(-2)
        assert!((far - (-2.0f32).exp()).abs() < 1e-6);
    }

    #[test]
    fn ellipsoidal_respects_axis_bandwidths() {
        let c = [0.0, 0.0];
        let s = [1.0, 0.1];
        let k = Kernel::Ellipsoidal;
        let along_wide = k.density(&[0.5, 0.0], &c, &s);
        let along_narrow = k.density(&[0.0, 0.5], &c, &s);
        assert!(along_wide > along_narrow);
        assert!((along_wide - (-0.125f32).exp()).abs() < 1e-6);
    }

    #[test]
    fn ellipsoidal_with_equal_axes_matches_gaussian() {
        let c = [0.2, -0.4, 1.0];
        let x = [0.5, 0.1, 0.7];
        let g = Kernel::Gaussian.density(&x, &c, &[0.3]);
        let e = Kernel::Ellipsoidal.density(&x, &c, &[0.3, 0.3, 0.3]);
        assert!((g - e).abs() < 1e-6);
    }

    #[test]
    fn densities_evaluate_every_point() {
        let points = vec![vec![0.0], vec![0.5], vec![1.0]];
        let p = Kernel::Gaussian.densities(&points, &[0.0], &[0.5]);
        assert_eq!(p.len(), 3);
        assert_eq!(p[0], 1.0);
        // exp(-0.25 / 0.5), exp(-1 / 0.5)
        assert!((p[1] - (-0.5f32).exp()).abs() < 1e-6);
        assert!((p[2] - (-2.0f32).exp()).abs() < 1e-6);
    }

    #[test]
    fn zero_bandwidth_is_not_guarded() {
        let p = Kernel::Gaussian.density(&[0.0], &[0.0], &[0.0]);
        assert!(p.is_nan());
        let p = Kernel::Gaussian.density(&[0.0], &[0.0], &clamp_margin(&[0.0]));
        assert_eq!(p, 1.0);
    }

    #[test]
    fn bandwidth_shape_is_checked() {
        assert!(Kernel::Gaussian.check_bandwidth(16, 1).is_ok());
        assert!(Kernel::Gaussian.check_bandwidth(16, 16).is_err());
        assert!(Kernel::Ellipsoidal.check_bandwidth(16, 16).is_ok());
        assert!(Kernel::Ellipsoidal.check_bandwidth(16, 1).is_err());
    }

    #[test]
    fn parses_names() {
        assert_eq!("gaussian".parse::<Kernel>().unwrap(), Kernel::Gaussian);
        assert_eq!("bivariate".parse::<Kernel>().unwrap(), Kernel::Ellipsoidal);
        assert!("cauchy".parse::<Kernel>().is_err());
    }
}
