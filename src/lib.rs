// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! An expectation-propagation (EP) engine for ptychographic phase
//! retrieval.
//!
//! Ptychography records far-field intensity patterns while a probe
//! illuminates overlapping patches of a complex-valued object. This crate
//! reconstructs the object (and optionally the probe) by passing Gaussian
//! messages over a factor graph: one global object variable, and per
//! measurement a probe gain factor, an FFT factor and an amplitude
//! likelihood approximated by a Laplace fit.

pub(crate) mod constants;
pub mod ep;
mod error;
pub(crate) mod math;
pub mod ptycho;
pub(crate) mod rng;

// Re-exports.
pub use ep::{
    uncertain_array::{Precision, UncertainArray},
    EpConfig, EpError, PriorKind, PtychoEp, Reconstruction,
};
pub use error::PhaseRetrievalError;
pub use math::Fft2;
pub use ptycho::{DiffractionData, Patch, Ptycho, PtychoError};

/// Double-precision complex scalar used throughout the crate.
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex<f64>;
