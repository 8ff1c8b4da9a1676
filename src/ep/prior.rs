// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Model priors over the object. The default Gaussian prior is implicit in
//! the belief accumulator's unit baseline; only non-Gaussian priors appear
//! here, as a tagged variant rather than an inheritance tree.

use ndarray::{prelude::*, Zip};

use super::{
    uncertain_array::{Precision, UncertainArray},
    EpError,
};
use crate::{
    c64,
    constants::{MIXTURE_NORM_FLOOR, MIXTURE_VARIANCE_FLOOR},
};

/// An explicit prior factor attached to the object node.
pub enum Prior {
    Sparse(SparsePrior),
}

impl Prior {
    /// Posterior belief under the prior, given the cavity message from the
    /// rest of the graph.
    pub(crate) fn compute_belief(&self, cavity: &UncertainArray) -> Result<UncertainArray, EpError> {
        match self {
            Prior::Sparse(sparse) => sparse.compute_belief(cavity),
        }
    }
}

/// Bernoulli-Gaussian spike-and-slab: each pixel is independently drawn
/// from ρ·N_C(0, 1) + (1 − ρ)·δ₀.
pub struct SparsePrior {
    rho: f64,
}

impl SparsePrior {
    pub fn new(rho: f64) -> Result<SparsePrior, EpError> {
        if !(rho > 0.0 && rho < 1.0) {
            return Err(EpError::InvalidSparsity(rho));
        }
        Ok(SparsePrior { rho })
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Closed-form posterior of the two-component mixture given the cavity
    /// N_C(m, v): slab responsibility from ρ·N_C(m; 0, 1 + v) against
    /// (1 − ρ)·N_C(m; 0, v), then the mixture mean and second moment.
    pub(crate) fn compute_belief(&self, cavity: &UncertainArray) -> Result<UncertainArray, EpError> {
        let cavity = cavity.to_array_precision();
        let cavity_precision = match &cavity.precision {
            Precision::Array(p) => p,
            Precision::Scalar(_) => {
                return Err(EpError::ScalarPrecisionExpected { node: "Prior" })
            }
        };
        let rho = self.rho;

        let mut mean = Array2::from_elem(cavity.shape(), c64::new(0.0, 0.0));
        let mut precision = Array2::zeros(cavity.shape());
        Zip::from(&mut mean)
            .and(&mut precision)
            .and(&cavity.mean)
            .and(cavity_precision)
            .par_for_each(|mean, precision, &m, &pi| {
                let v = 1.0 / pi;
                let v_post = 1.0 / (1.0 + pi);
                let m_post = m * (pi / (1.0 + pi));
                let m2 = m.norm_sqr();

                let slab = rho * (-m2 / (1.0 + v)).exp() / (1.0 + v);
                let spike = (1.0 - rho) * (-m2 / v).exp() / v;
                let norm = slab + spike + MIXTURE_NORM_FLOOR;
                let weight = slab / norm;

                let mu = m_post * weight;
                let second_moment = weight * (m_post.norm_sqr() + v_post);
                let variance = (second_moment - mu.norm_sqr()).max(MIXTURE_VARIANCE_FLOOR);

                *mean = mu;
                *precision = 1.0 / variance;
            });

        UncertainArray::from_array_precision(mean, precision)
    }
}
