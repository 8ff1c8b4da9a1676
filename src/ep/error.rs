// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for the EP factor graph. Messages are tagged with the node
//! whose invariant was breached.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EpError {
    #[error("UA: {op} requires operands of the same precision kind (scalar vs per-pixel)")]
    PrecisionKindMismatch { op: &'static str },

    #[error("{node}: {op} requires matching shapes, got {lhs:?} and {rhs:?}")]
    ShapeMismatch {
        node: &'static str,
        op: &'static str,
        lhs: (usize, usize),
        rhs: (usize, usize),
    },

    #[error("UA: precision must be non-negative, got {0}")]
    NegativePrecision(f64),

    #[error("{node}: a scalar-precision message was expected here")]
    ScalarPrecisionExpected { node: &'static str },

    #[error("AUA: subtraction drove the accumulated precision non-positive (min {min:e})")]
    NonPositivePrecision { min: f64 },

    #[error("Likelihood: damping must lie in (0, 1], got {0}")]
    InvalidDamping(f64),

    #[error("Likelihood: the noise precision must be positive, got {0}")]
    InvalidNoisePrecision(f64),

    #[error("Prior: sparsity must lie in (0, 1), got {0}")]
    InvalidSparsity(f64),

    #[error("{node}: {slot} has not been set")]
    MissingMessage {
        node: &'static str,
        slot: &'static str,
    },

    #[error("Object: no measurements have been registered")]
    NoMeasurements,

    #[error("Object: non-finite belief detected at iteration {iteration}")]
    NonFiniteBelief { iteration: usize },
}
