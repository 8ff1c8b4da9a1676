// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Numerical guards and solver defaults.

All constants are double precision; the message-passing algebra is run
entirely in `f64`.
 */

/// Floor on |P|² when inverting the probe gain, so that dark probe pixels
/// do not blow up the backward message.
pub(crate) const PROBE_ABS2_FLOOR: f64 = 1e-8;

/// Floor on the precision of a Gaussian quotient. Message cancellation can
/// otherwise drive a precision negative.
pub(crate) const PRECISION_QUOTIENT_FLOOR: f64 = 1.0;

/// Floor on |z₀| in the amplitude-likelihood update, where the incoming
/// mean is divided by its own magnitude.
pub(crate) const AMPLITUDE_FLOOR: f64 = 1e-12;

/// Floor on the Laplace posterior variance.
pub(crate) const LAPLACE_VARIANCE_FLOOR: f64 = 1e-12;

/// Floor on the spike-and-slab normalisation constant.
pub(crate) const MIXTURE_NORM_FLOOR: f64 = 1e-8;

/// Floor on the spike-and-slab posterior variance.
pub(crate) const MIXTURE_VARIANCE_FLOOR: f64 = 1e-8;

/// Floor on the per-measurement noise precision refined by the probe EM
/// update.
pub(crate) const NOISE_PRECISION_FLOOR: f64 = 1e-8;

/// Ceiling on the object variance entering the probe EM update.
pub(crate) const OBJECT_VARIANCE_CEILING: f64 = 1e8;

/// Guard against division by zero when projecting onto a measured Fourier
/// amplitude.
pub(crate) const PROJECTOR_EPS: f64 = 1e-7;

/// Default damping of the likelihood backward message.
pub const DEFAULT_DAMPING: f64 = 0.7;

/// Noise precision assumed for measurements that do not carry one.
pub const DEFAULT_NOISE_PRECISION: f64 = 1.0;
