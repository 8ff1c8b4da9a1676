// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The global object belief in Gaussian product form.

use ndarray::{prelude::*, Zip};

use super::{
    uncertain_array::{Precision, UncertainArray},
    EpError,
};
use crate::{c64, ptycho::Patch};

/// A running product of Gaussian factors over the full object, stored as
/// (mean · precision, precision) so that patch contributions can be folded
/// in and removed in O(patch) time without renormalising the global field.
///
/// A fresh accumulator has precision 1 everywhere: the implicit zero-mean,
/// unit-precision Gaussian prior over every pixel.
pub struct AccumulativeUncertainArray {
    numerator: Array2<c64>,
    precision: Array2<f64>,
}

impl AccumulativeUncertainArray {
    pub fn new(shape: (usize, usize)) -> AccumulativeUncertainArray {
        AccumulativeUncertainArray {
            numerator: Array2::zeros(shape),
            precision: Array2::ones(shape),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.numerator.dim()
    }

    fn check_patch(
        &self,
        ua: &UncertainArray,
        patch: &Patch,
        op: &'static str,
    ) -> Result<(), EpError> {
        if ua.shape() != patch.shape() {
            return Err(EpError::ShapeMismatch {
                node: "AUA",
                op,
                lhs: ua.shape(),
                rhs: patch.shape(),
            });
        }
        let (nrows, ncols) = self.shape();
        if patch.rows.end > nrows || patch.cols.end > ncols {
            return Err(EpError::ShapeMismatch {
                node: "AUA",
                op,
                lhs: (patch.rows.end, patch.cols.end),
                rhs: self.shape(),
            });
        }
        Ok(())
    }

    /// Multiply a Gaussian factor into the accumulated product at `patch`.
    pub fn add(&mut self, ua: &UncertainArray, patch: &Patch) -> Result<(), EpError> {
        self.check_patch(ua, patch, "add")?;
        let mut numerator = self
            .numerator
            .slice_mut(s![patch.rows.clone(), patch.cols.clone()]);
        let mut precision = self
            .precision
            .slice_mut(s![patch.rows.clone(), patch.cols.clone()]);
        match &ua.precision {
            Precision::Scalar(p) => {
                Zip::from(&mut numerator)
                    .and(&ua.mean)
                    .for_each(|n, &m| *n = *n + m * *p);
                precision.mapv_inplace(|q| q + p);
            }
            Precision::Array(pa) => {
                Zip::from(&mut numerator)
                    .and(&ua.mean)
                    .and(pa)
                    .for_each(|n, &m, &p| *n = *n + m * p);
                Zip::from(&mut precision).and(pa).for_each(|q, &p| *q += p);
            }
        }
        Ok(())
    }

    /// Remove a factor previously multiplied in at the same `patch`. The
    /// caller must subtract exactly what was added (or a damped previous
    /// version of it); the accumulated precision must stay positive.
    pub fn subtract(&mut self, ua: &UncertainArray, patch: &Patch) -> Result<(), EpError> {
        self.check_patch(ua, patch, "subtract")?;
        let mut numerator = self
            .numerator
            .slice_mut(s![patch.rows.clone(), patch.cols.clone()]);
        let mut precision = self
            .precision
            .slice_mut(s![patch.rows.clone(), patch.cols.clone()]);
        match &ua.precision {
            Precision::Scalar(p) => {
                Zip::from(&mut numerator)
                    .and(&ua.mean)
                    .for_each(|n, &m| *n = *n - m * *p);
                precision.mapv_inplace(|q| q - p);
            }
            Precision::Array(pa) => {
                Zip::from(&mut numerator)
                    .and(&ua.mean)
                    .and(pa)
                    .for_each(|n, &m, &p| *n = *n - m * p);
                Zip::from(&mut precision).and(pa).for_each(|q, &p| *q -= p);
            }
        }
        let min = precision.fold(f64::INFINITY, |acc, &p| acc.min(p));
        if min <= 0.0 {
            return Err(EpError::NonPositivePrecision { min });
        }
        Ok(())
    }

    /// The belief restricted to `patch`, as (mean, per-pixel precision).
    pub fn get_ua(&self, patch: &Patch) -> UncertainArray {
        let precision = self
            .precision
            .slice(s![patch.rows.clone(), patch.cols.clone()])
            .to_owned();
        let mut mean = self
            .numerator
            .slice(s![patch.rows.clone(), patch.cols.clone()])
            .to_owned();
        Zip::from(&mut mean)
            .and(&precision)
            .for_each(|m, &p| *m = *m / p);
        UncertainArray {
            mean,
            precision: Precision::Array(precision),
        }
    }

    /// The full accumulated belief.
    pub fn to_ua(&self) -> UncertainArray {
        self.get_ua(&Patch::full(self.shape()))
    }

    /// The mean of the full belief.
    pub fn mean(&self) -> Array2<c64> {
        let mut mean = self.numerator.clone();
        Zip::from(&mut mean)
            .and(&self.precision)
            .for_each(|m, &p| *m = *m / p);
        mean
    }

    /// The per-pixel precision of the full belief.
    pub fn precision(&self) -> &Array2<f64> {
        &self.precision
    }

    /// Reset to the default state: zero mean, unit precision everywhere.
    pub fn clear(&mut self) {
        self.numerator.fill(c64::new(0.0, 0.0));
        self.precision.fill(1.0);
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.numerator
            .iter()
            .all(|z| z.re.is_finite() && z.im.is_finite())
            && self.precision.iter().all(|p| p.is_finite())
    }
}
