// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The expectation-propagation solver: configuration, the message
//! schedule, and the reconstruction outputs.
//!
//! Each iteration runs the prior update (when a prior is attached), then
//! for every measurement j in registration order: dispatch the belief
//! patch, probe forward, FFT forward, likelihood backward, FFT backward,
//! probe backward, absorb the refreshed back-message. Optional EM probe
//! refinement follows, then the per-iteration callback.

mod accumulator;
mod error;
mod fft_channel;
mod likelihood;
mod object;
mod prior;
mod probe;
mod probe_updater;
pub mod uncertain_array;

#[cfg(test)]
mod tests;

pub use accumulator::AccumulativeUncertainArray;
pub use error::EpError;
pub use prior::{Prior, SparsePrior};
pub use probe::ProbeField;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use ndarray::prelude::*;
use vec1::Vec1;

use crate::{
    c64,
    constants::DEFAULT_DAMPING,
    error::PhaseRetrievalError,
    ptycho::{Ptycho, PtychoError},
    rng,
};
use object::ObjectNode;
use uncertain_array::UncertainArray;

/// Which prior the solver attaches to the object. `Gaussian` is the
/// implicit zero-mean unit-precision prior already carried by the belief
/// accumulator; no explicit prior node is created for it.
#[derive(Clone, Debug)]
pub enum PriorKind {
    Gaussian,
    Sparse { sparsity: f64 },
}

/// Solver configuration. Domain violations are rejected at construction.
#[derive(Clone, Debug)]
pub struct EpConfig {
    /// Damping of the likelihood backward message, in (0, 1].
    pub damping: f64,
    pub prior: PriorKind,
    /// Number of EM probe-refinement steps per outer iteration; 0 disables
    /// probe refinement.
    pub n_probe_update: usize,
    /// Seed for the random object initialiser.
    pub seed: Option<u64>,
    /// Initial object; random complex-normal when absent.
    pub initial_object: Option<Array2<c64>>,
    /// Initial probe; the container's probe when absent.
    pub initial_probe: Option<Array2<c64>>,
}

impl Default for EpConfig {
    fn default() -> EpConfig {
        EpConfig {
            damping: DEFAULT_DAMPING,
            prior: PriorKind::Gaussian,
            n_probe_update: 0,
            seed: None,
            initial_object: None,
            initial_probe: None,
        }
    }
}

/// Observer invoked after every iteration with the iteration index, the
/// mean amplitude error across measurements and the current object mean.
pub type IterationCallback = Box<dyn FnMut(usize, f64, ArrayView2<c64>)>;

/// Final solver outputs.
pub struct Reconstruction {
    pub object_mean: Array2<c64>,
    /// Per-pixel posterior precision; σ = 1/√precision is the uncertainty
    /// map.
    pub object_precision: Array2<f64>,
    /// The refined probe, present when EM refinement was enabled.
    pub probe: Option<Array2<c64>>,
    /// Mean amplitude error after each iteration.
    pub errors: Vec<f64>,
}

/// The EP solver over one [`Ptycho`] experiment.
pub struct PtychoEp {
    object: ObjectNode,
    n_probe_update: usize,
    callback: Option<IterationCallback>,
}

impl PtychoEp {
    pub fn new(ptycho: &Ptycho, config: EpConfig) -> Result<PtychoEp, PhaseRetrievalError> {
        let EpConfig {
            damping,
            prior,
            n_probe_update,
            seed,
            initial_object,
            initial_probe,
        } = config;
        if !(damping > 0.0 && damping <= 1.0) {
            return Err(EpError::InvalidDamping(damping).into());
        }

        let probe_init = match initial_probe {
            Some(probe) => {
                if probe.nrows() != probe.ncols() {
                    return Err(PtychoError::NonSquareProbe {
                        rows: probe.nrows(),
                        cols: probe.ncols(),
                    }
                    .into());
                }
                probe
            }
            None => ptycho.probe().ok_or(PtychoError::MissingProbe)?.clone(),
        };

        let object_init = match initial_object {
            Some(object) => {
                if object.nrows() != object.ncols() {
                    return Err(PtychoError::NonSquareObject {
                        rows: object.nrows(),
                        cols: object.ncols(),
                    }
                    .into());
                }
                object
            }
            None => {
                let len = ptycho.object_len().ok_or(PtychoError::MissingObject)?;
                let mut rng = rng::seeded_rng(seed);
                rng::complex_normal(&mut rng, (len, len), 1.0)
            }
        };

        let prior = match prior {
            PriorKind::Gaussian => None,
            PriorKind::Sparse { sparsity } => Some(Prior::Sparse(SparsePrior::new(sparsity)?)),
        };

        let diffs = Vec1::try_from_vec(ptycho.diffraction_data().iter().collect::<Vec<_>>())
            .map_err(|_| EpError::NoMeasurements)?;

        let mut object = ObjectNode::new(object_init, probe_init, prior, damping);
        for &diff in diffs.iter() {
            object.register(diff)?;
        }
        debug!(
            "EP solver ready: {} measurements, damping {damping}, probe EM {n_probe_update}",
            diffs.len()
        );

        Ok(PtychoEp {
            object,
            n_probe_update,
            callback: None,
        })
    }

    /// Install a per-iteration observer.
    pub fn set_callback(&mut self, callback: IterationCallback) {
        self.callback = Some(callback);
    }

    /// Run the EP schedule for `n_iter` iterations. The belief is checked
    /// for non-finite values after every iteration; a NaN anywhere aborts
    /// the run.
    pub fn run(
        &mut self,
        n_iter: usize,
        draw_progress_bar: bool,
    ) -> Result<Reconstruction, EpError> {
        let num_measurements = self.object.measurements.len();
        info!("EP: {n_iter} iterations over {num_measurements} measurements");

        let progress = ProgressBar::with_draw_target(
            Some(n_iter as u64),
            if draw_progress_bar {
                ProgressDrawTarget::stdout()
            } else {
                ProgressDrawTarget::hidden()
            },
        )
        .with_style(
            ProgressStyle::default_bar()
                .template("{msg}: [{wide_bar:.blue}] {pos:4}/{len:4} ({elapsed_precise}<{eta_precise})")
                .unwrap()
                .progress_chars("=> "),
        )
        .with_position(0)
        .with_message("EP iterations");

        let mut errors = Vec::with_capacity(n_iter);
        for iteration in 0..n_iter {
            self.object.prior_forward()?;
            for j in 0..num_measurements {
                self.object.sweep(j)?;
            }
            if self.n_probe_update > 0 {
                probe_updater::refine_probe(&mut self.object, self.n_probe_update)?;
            }
            if !self.object.belief_is_finite() {
                progress.abandon();
                return Err(EpError::NonFiniteBelief { iteration });
            }

            let mean_error = self.object.mean_likelihood_error();
            errors.push(mean_error);
            if let Some(callback) = self.callback.as_mut() {
                let belief = self.object.get_belief();
                callback(iteration, mean_error, belief.mean.view());
            }
            progress.inc(1);
        }
        progress.abandon();

        if let (Some(first), Some(last)) = (errors.first(), errors.last()) {
            info!("EP finished: amplitude error {first:.3e} -> {last:.3e}");
        }

        Ok(Reconstruction {
            object_mean: self.object.belief.mean(),
            object_precision: self.object.belief.precision().clone(),
            probe: (self.n_probe_update > 0).then(|| self.object.probe.data().clone()),
            errors,
        })
    }

    /// The current posterior over the object.
    pub fn object_belief(&self) -> UncertainArray {
        self.object.get_belief()
    }

    /// The current probe field.
    pub fn probe(&self) -> &Array2<c64> {
        self.object.probe.data()
    }
}
