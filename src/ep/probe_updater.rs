// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! EM refinement of the shared probe field, with the object belief held
//! fixed.

use itertools::izip;
use log::debug;
use ndarray::{prelude::*, Zip};

use super::{object::ObjectNode, EpError};
use crate::{
    c64,
    constants::{NOISE_PRECISION_FLOOR, OBJECT_VARIANCE_CEILING},
};

/// Run `n_iter` EM steps: re-estimate the probe from every measurement's
/// back-message weighted by its noise precision, then re-estimate each
/// noise precision from the residual. The refreshed probe is written once
/// into the shared field; each refreshed γ_j is pushed back into its
/// channel's scalar-precision messages.
pub(crate) fn refine_probe(object: &mut ObjectNode, n_iter: usize) -> Result<(), EpError> {
    if n_iter == 0 {
        return Ok(());
    }
    let num = object.measurements.len();
    if num == 0 {
        return Err(EpError::NoMeasurements);
    }
    let side = object.probe.side();

    let object_mean = object.belief.mean();
    let object_precision = object.belief.precision();

    let mut o_mean = Array3::<c64>::zeros((num, side, side));
    let mut o_var = Array3::<f64>::zeros((num, side, side));
    let mut phi = Array3::<c64>::zeros((num, side, side));
    let mut gamma = Array1::<f64>::zeros(num);

    for (j, measurement) in object.measurements.iter().enumerate() {
        let rows = measurement.patch.rows.clone();
        let cols = measurement.patch.cols.clone();
        o_mean
            .slice_mut(s![j, .., ..])
            .assign(&object_mean.slice(s![rows.clone(), cols.clone()]));
        o_var.slice_mut(s![j, .., ..]).assign(
            &object_precision
                .slice(s![rows, cols])
                .mapv(|p| (1.0 / p).min(OBJECT_VARIANCE_CEILING)),
        );
        let back = measurement
            .channel
            .msg_to_probe
            .as_ref()
            .ok_or(EpError::MissingMessage {
                node: "ProbeUpdater",
                slot: "msg_to_probe",
            })?;
        phi.slice_mut(s![j, .., ..]).assign(&back.mean);
        gamma[j] = measurement
            .channel
            .msg_from_likelihood
            .precision
            .harmonic_scalar();
    }

    // Constant across EM iterations while the belief is held fixed.
    let numerator_terms = Zip::from(&o_mean)
        .and(&phi)
        .map_collect(|&o, &f| o.conj() * f);
    let denominator_terms = Zip::from(&o_mean)
        .and(&o_var)
        .map_collect(|&o, &v| o.norm_sqr() + v);

    let mut probe_est = Array2::<c64>::zeros((side, side));
    for _ in 0..n_iter {
        let mut top = Array2::<c64>::zeros((side, side));
        let mut bot = Array2::<f64>::zeros((side, side));
        for (&g, num_j, den_j) in izip!(
            gamma.iter(),
            numerator_terms.outer_iter(),
            denominator_terms.outer_iter()
        ) {
            Zip::from(&mut top).and(&num_j).for_each(|t, &n| *t = *t + n * g);
            Zip::from(&mut bot).and(&den_j).for_each(|b, &d| *b += d * g);
        }
        probe_est = Zip::from(&top).and(&bot).map_collect(|&t, &b| t / b);

        // Adaptive step: each measurement's noise precision from its
        // residual under the new probe.
        for (g, o_j, v_j, phi_j) in izip!(
            gamma.iter_mut(),
            o_mean.outer_iter(),
            o_var.outer_iter(),
            phi.outer_iter()
        ) {
            let mut residual = 0.0;
            Zip::from(&o_j)
                .and(&v_j)
                .and(&phi_j)
                .and(&probe_est)
                .for_each(|&o, &v, &f, &p| {
                    residual += (f - o * p).norm_sqr() + v * p.norm_sqr();
                });
            let mean_residual = residual / (side * side) as f64;
            *g = (1.0 / mean_residual).max(NOISE_PRECISION_FLOOR);
        }
    }

    debug!(
        "probe EM: {n_iter} steps over {num} measurements, gamma range {:e}..{:e}",
        gamma.fold(f64::INFINITY, |a, &g| a.min(g)),
        gamma.fold(f64::NEG_INFINITY, |a, &g| a.max(g)),
    );

    object.probe.set_data(probe_est);
    for (measurement, &g) in object.measurements.iter_mut().zip(gamma.iter()) {
        measurement
            .channel
            .msg_from_likelihood
            .set_scalar_precision(g)?;
        if let Some(msg) = measurement.channel.msg_to_probe.as_mut() {
            msg.set_scalar_precision(g)?;
        }
    }
    Ok(())
}
