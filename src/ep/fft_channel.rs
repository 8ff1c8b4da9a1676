// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The FFT factor between the exit-wave and diffraction domains.

use std::sync::Arc;

use ndarray::prelude::*;

use super::{
    likelihood::Likelihood,
    uncertain_array::{fft_ua, ifft_ua, UncertainArray},
    EpError,
};
use crate::{c64, math::Fft2};

/// Connects a probe's exit wave to its amplitude likelihood. Every message
/// crossing this node carries scalar precision: the FFT lift collapses
/// per-pixel precision through the harmonic mean, so the quotient in
/// `forward` always sees two scalar-precision operands.
pub(crate) struct FftChannel {
    fft: Arc<Fft2>,
    pub(crate) likelihood: Likelihood,
    pub(crate) input_belief: Option<UncertainArray>,
    pub(crate) msg_from_likelihood: UncertainArray,
    pub(crate) msg_to_probe: Option<UncertainArray>,
}

impl FftChannel {
    /// The initial likelihood message is the transformed initial exit wave
    /// FFT(P · O₀[patch]) at unit scalar precision.
    pub(crate) fn new(
        fft: Arc<Fft2>,
        likelihood: Likelihood,
        initial_exit_wave: &Array2<c64>,
    ) -> Result<FftChannel, EpError> {
        let z0 = fft.forward(initial_exit_wave);
        let msg_from_likelihood = UncertainArray::from_scalar_precision(z0, 1.0)?;
        Ok(FftChannel {
            fft,
            likelihood,
            input_belief: None,
            msg_from_likelihood,
            msg_to_probe: None,
        })
    }

    /// msg_to_likelihood = FFT(input_belief) / msg_from_likelihood.
    pub(crate) fn forward(&mut self) -> Result<(), EpError> {
        let input = self.input_belief.as_ref().ok_or(EpError::MissingMessage {
            node: "FFTChannel",
            slot: "input_belief",
        })?;
        let output_belief = fft_ua(&self.fft, input);
        self.likelihood.msg_from_fft = Some(output_belief.quotient(&self.msg_from_likelihood)?);
        Ok(())
    }

    /// Let the likelihood compute its damped backward message and store it
    /// as the new msg_from_likelihood.
    pub(crate) fn likelihood_backward(&mut self) -> Result<(), EpError> {
        let new = self.likelihood.backward(&self.msg_from_likelihood)?;
        self.msg_from_likelihood = new;
        Ok(())
    }

    /// msg_to_probe = IFFT(msg_from_likelihood).
    pub(crate) fn backward(&mut self) {
        self.msg_to_probe = Some(ifft_ua(&self.fft, &self.msg_from_likelihood));
    }
}
