// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gaussian messages: a complex mean plus a precision (inverse variance),
//! interpreted as an unnormalised diagonal complex-Gaussian factor over a
//! shared 2D variable.

use ndarray::{prelude::*, Zip};
use rand::Rng;

use super::EpError;
use crate::{
    c64,
    constants::PRECISION_QUOTIENT_FLOOR,
    math::{harmonic_precision, Fft2},
    ptycho::Patch,
};

/// The precision of a message: one value shared by every pixel, or a full
/// per-pixel field. Messages in the diffraction domain are scalar; messages
/// inside the object belief are per-pixel.
#[derive(Clone, Debug)]
pub enum Precision {
    Scalar(f64),
    Array(Array2<f64>),
}

impl Precision {
    pub fn is_scalar(&self) -> bool {
        matches!(self, Precision::Scalar(_))
    }

    /// Collapse to a scalar via the harmonic mean of the variances.
    pub(crate) fn harmonic_scalar(&self) -> f64 {
        match self {
            Precision::Scalar(p) => *p,
            Precision::Array(p) => harmonic_precision(p),
        }
    }
}

#[derive(Clone, Debug)]
pub struct UncertainArray {
    pub mean: Array2<c64>,
    pub precision: Precision,
}

impl UncertainArray {
    /// A message whose pixels share one precision.
    pub fn from_scalar_precision(
        mean: Array2<c64>,
        precision: f64,
    ) -> Result<UncertainArray, EpError> {
        if precision < 0.0 {
            return Err(EpError::NegativePrecision(precision));
        }
        Ok(UncertainArray {
            mean,
            precision: Precision::Scalar(precision),
        })
    }

    /// A message with per-pixel precision; the precision field must match
    /// the mean's shape and be non-negative everywhere.
    pub fn from_array_precision(
        mean: Array2<c64>,
        precision: Array2<f64>,
    ) -> Result<UncertainArray, EpError> {
        if mean.dim() != precision.dim() {
            return Err(EpError::ShapeMismatch {
                node: "UA",
                op: "construction",
                lhs: mean.dim(),
                rhs: precision.dim(),
            });
        }
        if let Some(&p) = precision.iter().find(|p| **p < 0.0) {
            return Err(EpError::NegativePrecision(p));
        }
        Ok(UncertainArray {
            mean,
            precision: Precision::Array(precision),
        })
    }

    /// Zero mean at unit precision, scalar or per-pixel.
    pub fn zeros(shape: (usize, usize), scalar_precision: bool) -> UncertainArray {
        let precision = if scalar_precision {
            Precision::Scalar(1.0)
        } else {
            Precision::Array(Array2::ones(shape))
        };
        UncertainArray {
            mean: Array2::zeros(shape),
            precision,
        }
    }

    /// Standard complex-normal mean at unit scalar precision.
    pub fn normal<R: Rng>(shape: (usize, usize), rng: &mut R) -> UncertainArray {
        UncertainArray {
            mean: crate::rng::complex_normal(rng, shape, 1.0),
            precision: Precision::Scalar(1.0),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.mean.dim()
    }

    fn check_operands(&self, other: &UncertainArray, op: &'static str) -> Result<(), EpError> {
        if self.precision.is_scalar() != other.precision.is_scalar() {
            return Err(EpError::PrecisionKindMismatch { op });
        }
        if self.shape() != other.shape() {
            return Err(EpError::ShapeMismatch {
                node: "UA",
                op,
                lhs: self.shape(),
                rhs: other.shape(),
            });
        }
        Ok(())
    }

    /// mean · precision, the numerator of the Gaussian product form.
    pub(crate) fn weighted_mean(&self) -> Array2<c64> {
        match &self.precision {
            Precision::Scalar(p) => self.mean.mapv(|m| m * *p),
            Precision::Array(p) => {
                let mut out = self.mean.clone();
                Zip::from(&mut out).and(p).for_each(|m, &p| *m = *m * p);
                out
            }
        }
    }

    /// Product of two Gaussian factors over the same variable:
    /// precisions add, means combine precision-weighted.
    pub fn product(&self, other: &UncertainArray) -> Result<UncertainArray, EpError> {
        self.check_operands(other, "product")?;
        let numerator = self.weighted_mean() + other.weighted_mean();
        match (&self.precision, &other.precision) {
            (Precision::Scalar(a), Precision::Scalar(b)) => {
                let precision = a + b;
                Ok(UncertainArray {
                    mean: numerator.mapv(|n| n / precision),
                    precision: Precision::Scalar(precision),
                })
            }
            (Precision::Array(a), Precision::Array(b)) => {
                let precision = a + b;
                let mut mean = numerator;
                Zip::from(&mut mean)
                    .and(&precision)
                    .for_each(|m, &p| *m = *m / p);
                Ok(UncertainArray {
                    mean,
                    precision: Precision::Array(precision),
                })
            }
            _ => Err(EpError::PrecisionKindMismatch { op: "product" }),
        }
    }

    /// Quotient of Gaussian factors: precisions subtract, floored at 1.0 so
    /// that message cancellation can never leave a non-positive precision.
    pub fn quotient(&self, other: &UncertainArray) -> Result<UncertainArray, EpError> {
        self.check_operands(other, "quotient")?;
        let numerator = self.weighted_mean() - other.weighted_mean();
        match (&self.precision, &other.precision) {
            (Precision::Scalar(a), Precision::Scalar(b)) => {
                let precision = (a - b).max(PRECISION_QUOTIENT_FLOOR);
                Ok(UncertainArray {
                    mean: numerator.mapv(|n| n / precision),
                    precision: Precision::Scalar(precision),
                })
            }
            (Precision::Array(a), Precision::Array(b)) => {
                let precision = Zip::from(a)
                    .and(b)
                    .map_collect(|&a, &b| (a - b).max(PRECISION_QUOTIENT_FLOOR));
                let mut mean = numerator;
                Zip::from(&mut mean)
                    .and(&precision)
                    .for_each(|m, &p| *m = *m / p);
                Ok(UncertainArray {
                    mean,
                    precision: Precision::Array(precision),
                })
            }
            _ => Err(EpError::PrecisionKindMismatch { op: "quotient" }),
        }
    }

    /// Convex blend of `self` (the raw message) against `old`: means blend
    /// linearly, precisions blend through their standard deviations.
    pub fn damp_with(&self, old: &UncertainArray, damping: f64) -> Result<UncertainArray, EpError> {
        self.check_operands(old, "damping")?;
        let mean = self.mean.mapv(|m| m * damping) + old.mean.mapv(|m| m * (1.0 - damping));
        let blend = |raw: f64, old: f64| {
            let sigma = damping / raw.sqrt() + (1.0 - damping) / old.sqrt();
            1.0 / (sigma * sigma)
        };
        let precision = match (&self.precision, &old.precision) {
            (Precision::Scalar(a), Precision::Scalar(b)) => Precision::Scalar(blend(*a, *b)),
            (Precision::Array(a), Precision::Array(b)) => {
                Precision::Array(Zip::from(a).and(b).map_collect(|&a, &b| blend(a, b)))
            }
            _ => return Err(EpError::PrecisionKindMismatch { op: "damping" }),
        };
        Ok(UncertainArray { mean, precision })
    }

    /// Downgrade to scalar precision (harmonic mean of the variances).
    pub fn to_scalar_precision(&self) -> UncertainArray {
        UncertainArray {
            mean: self.mean.clone(),
            precision: Precision::Scalar(self.precision.harmonic_scalar()),
        }
    }

    /// Upgrade to per-pixel precision by broadcasting.
    pub fn to_array_precision(&self) -> UncertainArray {
        let precision = match &self.precision {
            Precision::Scalar(p) => Array2::from_elem(self.shape(), *p),
            Precision::Array(p) => p.clone(),
        };
        UncertainArray {
            mean: self.mean.clone(),
            precision: Precision::Array(precision),
        }
    }

    /// Slice out a patch; a scalar precision passes through unchanged.
    pub fn patch(&self, patch: &Patch) -> UncertainArray {
        let mean = self
            .mean
            .slice(s![patch.rows.clone(), patch.cols.clone()])
            .to_owned();
        let precision = match &self.precision {
            Precision::Scalar(p) => Precision::Scalar(*p),
            Precision::Array(p) => Precision::Array(
                p.slice(s![patch.rows.clone(), patch.cols.clone()]).to_owned(),
            ),
        };
        UncertainArray { mean, precision }
    }

    /// Elementwise complex gain: mean' = g·mean, precision' = precision/|g|².
    /// A scalar precision meeting a non-uniform gain is promoted to
    /// per-pixel precision.
    pub fn scaled(&self, gain: &Array2<c64>) -> Result<UncertainArray, EpError> {
        if gain.dim() != self.shape() {
            return Err(EpError::ShapeMismatch {
                node: "UA",
                op: "scaling",
                lhs: self.shape(),
                rhs: gain.dim(),
            });
        }
        let mean = &self.mean * gain;
        let abs2 = gain.mapv(|g| g.norm_sqr());
        let first = abs2[(0, 0)];
        let uniform = abs2.iter().all(|&a| a == first);
        let precision = match &self.precision {
            Precision::Scalar(p) if uniform => Precision::Scalar(p / first),
            Precision::Scalar(p) => Precision::Array(abs2.mapv(|a| p / a)),
            Precision::Array(pr) => {
                Precision::Array(Zip::from(pr).and(&abs2).map_collect(|&p, &a| p / a))
            }
        };
        Ok(UncertainArray { mean, precision })
    }

    /// Overwrite a scalar precision in place (the probe-EM write-back
    /// path).
    pub(crate) fn set_scalar_precision(&mut self, precision: f64) -> Result<(), EpError> {
        match &mut self.precision {
            Precision::Scalar(p) => {
                *p = precision;
                Ok(())
            }
            Precision::Array(_) => Err(EpError::ScalarPrecisionExpected { node: "UA" }),
        }
    }

    pub fn is_finite(&self) -> bool {
        let mean_ok = self.mean.iter().all(|z| z.re.is_finite() && z.im.is_finite());
        let precision_ok = match &self.precision {
            Precision::Scalar(p) => p.is_finite(),
            Precision::Array(p) => p.iter().all(|p| p.is_finite()),
        };
        mean_ok && precision_ok
    }
}

/// Forward FFT lift: orthonormal transform of the mean; the precision
/// collapses to a scalar. Per-pixel variance does not stay diagonal under
/// a unitary mixing, so the harmonic mean is the EP-compatible surrogate.
pub fn fft_ua(fft: &Fft2, ua: &UncertainArray) -> UncertainArray {
    UncertainArray {
        mean: fft.forward(&ua.mean),
        precision: Precision::Scalar(ua.precision.harmonic_scalar()),
    }
}

/// Inverse FFT lift; see [`fft_ua`].
pub fn ifft_ua(fft: &Fft2, ua: &UncertainArray) -> UncertainArray {
    UncertainArray {
        mean: fft.inverse(&ua.mean),
        precision: Precision::Scalar(ua.precision.harmonic_scalar()),
    }
}
