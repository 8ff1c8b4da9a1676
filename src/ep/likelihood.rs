// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The amplitude-observation node: y = |z| + noise, handled with a Laplace
//! approximation around the incoming message.

use ndarray::{prelude::*, Zip};

use super::{
    uncertain_array::{Precision, UncertainArray},
    EpError,
};
use crate::{
    c64,
    constants::{AMPLITUDE_FLOOR, DEFAULT_NOISE_PRECISION, LAPLACE_VARIANCE_FLOOR},
};

pub(crate) struct Likelihood {
    /// Observed amplitude, √intensity.
    y: Array2<f64>,
    gamma_w: f64,
    damping: f64,
    pub(crate) msg_from_fft: Option<UncertainArray>,
    pub(crate) belief: Option<UncertainArray>,
    /// Amplitude MSE of the last update, for logging.
    pub(crate) error: f64,
}

impl Likelihood {
    pub(crate) fn new(
        y: Array2<f64>,
        gamma_w: Option<f64>,
        damping: f64,
    ) -> Result<Likelihood, EpError> {
        let gamma_w = gamma_w.unwrap_or(DEFAULT_NOISE_PRECISION);
        if !(gamma_w > 0.0) {
            return Err(EpError::InvalidNoisePrecision(gamma_w));
        }
        if !(damping > 0.0 && damping <= 1.0) {
            return Err(EpError::InvalidDamping(damping));
        }
        Ok(Likelihood {
            y,
            gamma_w,
            damping,
            msg_from_fft: None,
            belief: None,
            error: 0.0,
        })
    }

    /// Laplace fit of the amplitude posterior with the phase held at
    /// arg(z₀). Closed form after Shastri & Schniter (IEEE TSP 2024),
    /// eqs. (38)-(39).
    fn compute_belief(&mut self) -> Result<(), EpError> {
        let msg = self
            .msg_from_fft
            .as_ref()
            .ok_or(EpError::MissingMessage {
                node: "Likelihood",
                slot: "msg_from_fft",
            })?;
        let tau = match &msg.precision {
            Precision::Scalar(tau) => *tau,
            Precision::Array(_) => {
                return Err(EpError::ScalarPrecisionExpected { node: "Likelihood" })
            }
        };
        let v0 = 1.0 / tau;
        let v = 1.0 / self.gamma_w;

        let mut mean = Array2::from_elem(self.y.dim(), c64::new(0.0, 0.0));
        let mut precision = Array2::zeros(self.y.dim());
        Zip::from(&mut mean)
            .and(&mut precision)
            .and(&msg.mean)
            .and(&self.y)
            .par_for_each(|mean, precision, &z0, &y| {
                let amp = z0.norm().max(AMPLITUDE_FLOOR);
                let post_amp = (v0 * y + 2.0 * v * amp) / (v0 + 2.0 * v);
                let post_var = (v0 * (v0 * y + 4.0 * v * amp)) / (2.0 * amp * (v0 + 2.0 * v));
                *mean = z0 / amp * post_amp;
                *precision = 1.0 / post_var.max(LAPLACE_VARIANCE_FLOOR);
            });
        let error = msg
            .mean
            .iter()
            .zip(self.y.iter())
            .map(|(z0, &y)| {
                let diff = z0.norm() - y;
                diff * diff
            })
            .sum::<f64>()
            / self.y.len() as f64;

        self.error = error;
        self.belief = Some(UncertainArray {
            mean,
            precision: Precision::Array(precision),
        });
        Ok(())
    }

    /// One backward step: recompute the belief, divide out the incoming
    /// message and damp against the previous outgoing message. Returns the
    /// replacement for the channel's `msg_from_likelihood`.
    pub(crate) fn backward(&mut self, previous: &UncertainArray) -> Result<UncertainArray, EpError> {
        self.compute_belief()?;
        let (belief, msg) = match (self.belief.as_ref(), self.msg_from_fft.as_ref()) {
            (Some(belief), Some(msg)) => (belief, msg),
            _ => {
                return Err(EpError::MissingMessage {
                    node: "Likelihood",
                    slot: "msg_from_fft",
                })
            }
        };
        let raw = belief.to_scalar_precision().quotient(msg)?;
        raw.damp_with(previous, self.damping)
    }
}
