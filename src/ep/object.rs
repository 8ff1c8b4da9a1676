// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The object node: the accumulated belief, ownership of the shared probe
//! field, and the per-measurement message schedule.

use std::sync::Arc;

use log::debug;
use ndarray::prelude::*;

use super::{
    accumulator::AccumulativeUncertainArray,
    fft_channel::FftChannel,
    likelihood::Likelihood,
    prior::Prior,
    probe::ProbeField,
    uncertain_array::UncertainArray,
    EpError,
};
use crate::{
    c64,
    math::Fft2,
    ptycho::{DiffractionData, Patch},
};

/// One registered measurement: the object patch it constrains, the channel
/// that owns its likelihood, and the last back-message folded into the
/// belief at that patch.
pub(crate) struct Measurement {
    pub(crate) patch: Patch,
    pub(crate) channel: FftChannel,
    pub(crate) msg_to_object: UncertainArray,
}

pub(crate) struct ObjectNode {
    object_init: Array2<c64>,
    pub(crate) belief: AccumulativeUncertainArray,
    pub(crate) probe: ProbeField,
    fft: Arc<Fft2>,
    pub(crate) measurements: Vec<Measurement>,
    prior: Option<Prior>,
    msg_from_prior: UncertainArray,
    damping: f64,
}

impl ObjectNode {
    pub(crate) fn new(
        object_init: Array2<c64>,
        probe_init: Array2<c64>,
        prior: Option<Prior>,
        damping: f64,
    ) -> ObjectNode {
        let shape = object_init.dim();
        let fft = Arc::new(Fft2::new(probe_init.nrows()));
        ObjectNode {
            belief: AccumulativeUncertainArray::new(shape),
            probe: ProbeField::new(probe_init),
            fft,
            measurements: Vec::new(),
            prior,
            // Unit precision here mirrors the accumulator's baseline, so
            // the prior cavity divides the implicit prior out exactly once.
            msg_from_prior: UncertainArray::zeros(shape, false),
            damping,
            object_init,
        }
    }

    /// Register one measurement: build its likelihood and channel, seed the
    /// initial back-message from the initial object and fold it into the
    /// belief at the measurement's patch.
    pub(crate) fn register(&mut self, diff: &DiffractionData) -> Result<(), EpError> {
        let patch = diff.patch.clone();
        let probe_side = self.probe.side();
        if patch.shape() != (probe_side, probe_side) {
            return Err(EpError::ShapeMismatch {
                node: "Object",
                op: "registration",
                lhs: patch.shape(),
                rhs: (probe_side, probe_side),
            });
        }
        if diff.amplitude.dim() != (probe_side, probe_side) {
            return Err(EpError::ShapeMismatch {
                node: "Object",
                op: "registration",
                lhs: diff.amplitude.dim(),
                rhs: (probe_side, probe_side),
            });
        }

        let likelihood = Likelihood::new(diff.amplitude.clone(), diff.gamma_w, self.damping)?;
        let init_patch = self
            .object_init
            .slice(s![patch.rows.clone(), patch.cols.clone()])
            .to_owned();
        let exit_wave = &init_patch * self.probe.data();
        let channel = FftChannel::new(Arc::clone(&self.fft), likelihood, &exit_wave)?;

        let msg = UncertainArray::from_array_precision(init_patch, Array2::ones(patch.shape()))?;
        self.belief.add(&msg, &patch)?;
        debug!(
            "registered measurement {} at position {:?}",
            self.measurements.len(),
            diff.position
        );
        self.measurements.push(Measurement {
            patch,
            channel,
            msg_to_object: msg,
        });
        Ok(())
    }

    /// One full forward/backward pass through measurement `j`.
    pub(crate) fn sweep(&mut self, j: usize) -> Result<(), EpError> {
        self.forward(j)?;
        self.backward(j)
    }

    /// Dispatch the belief patch for measurement `j` through the probe and
    /// the FFT factor, up to the likelihood.
    pub(crate) fn forward(&mut self, j: usize) -> Result<(), EpError> {
        let patch = self.measurements[j].patch.clone();
        let patch_belief = self.belief.get_ua(&patch);
        let exit_belief = self.probe.forward(&patch_belief);

        let measurement = &mut self.measurements[j];
        measurement.channel.input_belief = Some(exit_belief);
        measurement.channel.forward()
    }

    /// Pull the refreshed message back down the chain (likelihood, inverse
    /// FFT, probe) and swap it into the belief in place of the stored
    /// back-message.
    pub(crate) fn backward(&mut self, j: usize) -> Result<(), EpError> {
        let patch = self.measurements[j].patch.clone();
        let measurement = &mut self.measurements[j];
        measurement.channel.likelihood_backward()?;
        measurement.channel.backward();

        let back = measurement
            .channel
            .msg_to_probe
            .as_ref()
            .ok_or(EpError::MissingMessage {
                node: "FFTChannel",
                slot: "msg_to_probe",
            })?;
        let new_msg = self.probe.backward(back);

        self.belief.subtract(&measurement.msg_to_object, &patch)?;
        self.belief.add(&new_msg, &patch)?;
        measurement.msg_to_object = new_msg;
        Ok(())
    }

    /// EP update of the explicit prior, when one is attached: form the
    /// cavity, compute the prior belief and swap the stored prior message.
    pub(crate) fn prior_forward(&mut self) -> Result<(), EpError> {
        let prior = match self.prior.as_ref() {
            Some(prior) => prior,
            None => return Ok(()),
        };
        let cavity = self.belief.to_ua().quotient(&self.msg_from_prior)?;
        let belief = prior.compute_belief(&cavity)?;
        let msg = belief.quotient(&cavity)?;

        let full = Patch::full(self.belief.shape());
        self.belief.subtract(&self.msg_from_prior, &full)?;
        self.belief.add(&msg, &full)?;
        self.msg_from_prior = msg;
        Ok(())
    }

    pub(crate) fn get_belief(&self) -> UncertainArray {
        self.belief.to_ua()
    }

    pub(crate) fn mean_likelihood_error(&self) -> f64 {
        let total: f64 = self
            .measurements
            .iter()
            .map(|m| m.channel.likelihood.error)
            .sum();
        total / self.measurements.len() as f64
    }

    pub(crate) fn belief_is_finite(&self) -> bool {
        self.belief.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::ptycho::DiffractionData;

    fn flat_measurement(position: (usize, usize), side: usize, bound: usize) -> DiffractionData {
        DiffractionData::new(
            position,
            Array2::from_elem((side, side), 1.0),
            Patch::centred(position, side, bound).unwrap(),
            Some(1e4),
        )
    }

    fn flat_node(object_side: usize, probe_side: usize) -> ObjectNode {
        ObjectNode::new(
            Array2::from_elem((object_side, object_side), c64::new(1.0, 0.0)),
            Array2::from_elem((probe_side, probe_side), c64::new(1.0, 0.0)),
            None,
            0.7,
        )
    }

    #[test]
    fn registration_folds_the_initial_message_into_the_belief() {
        let mut node = flat_node(8, 4);
        node.register(&flat_measurement((4, 4), 4, 8)).unwrap();

        let belief = node.get_belief();
        // Inside the patch: initial message (mean 1, precision 1) against
        // the unit baseline.
        assert_abs_diff_eq!(belief.mean[(4, 4)], c64::new(0.5, 0.0), epsilon = 1e-12);
        // Outside: untouched baseline.
        assert_abs_diff_eq!(belief.mean[(0, 0)], c64::new(0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn registration_rejects_a_mismatched_amplitude() {
        let mut node = flat_node(8, 4);
        let mut diff = flat_measurement((4, 4), 4, 8);
        diff.amplitude = Array2::from_elem((2, 2), 1.0);
        assert!(matches!(
            node.register(&diff),
            Err(EpError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn sweep_keeps_the_belief_finite_and_positive() {
        let mut node = flat_node(8, 4);
        node.register(&flat_measurement((4, 4), 4, 8)).unwrap();
        for _ in 0..3 {
            node.sweep(0).unwrap();
        }
        assert!(node.belief_is_finite());
        assert!(node.belief.precision().iter().all(|&p| p > 0.0));
        assert!(node.mean_likelihood_error().is_finite());
    }

    #[test]
    fn prior_forward_is_a_no_op_without_a_prior() {
        let mut node = flat_node(8, 4);
        node.register(&flat_measurement((4, 4), 4, 8)).unwrap();
        let before = node.get_belief();
        node.prior_forward().unwrap();
        let after = node.get_belief();
        assert_abs_diff_eq!(before.mean, after.mean, epsilon = 1e-12);
    }
}
