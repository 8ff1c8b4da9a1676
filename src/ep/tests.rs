// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Solver-level tests on synthetic data.

use std::{
    cell::Cell,
    f64::consts::{FRAC_PI_2, TAU},
    rc::Rc,
};

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::{object::ObjectNode, probe_updater, EpConfig, EpError, PriorKind, PtychoEp};
use crate::{
    c64,
    ep::uncertain_array::UncertainArray,
    error::PhaseRetrievalError,
    ptycho::{Patch, Ptycho},
    rng,
};

/// A circular aperture of the given radius fraction, the standard probe
/// model for synthetic scans.
fn circular_aperture(side: usize, radius_frac: f64) -> Array2<c64> {
    let centre = (side as f64 - 1.0) / 2.0;
    let radius = radius_frac * side as f64;
    Array2::from_shape_fn((side, side), |(r, c)| {
        let dr = r as f64 - centre;
        let dc = c as f64 - centre;
        if (dr * dr + dc * dc).sqrt() <= radius {
            c64::new(1.0, 0.0)
        } else {
            c64::new(0.0, 0.0)
        }
    })
}

/// A smooth complex test object with amplitude in [0.2, 1.0] and a slowly
/// varying phase.
fn smooth_object(side: usize) -> Array2<c64> {
    Array2::from_shape_fn((side, side), |(r, c)| {
        let x = r as f64 / side as f64;
        let y = c as f64 / side as f64;
        let amp = 0.6 + 0.4 * (TAU * x).sin() * (TAU * y).cos();
        let phase = FRAC_PI_2 * (TAU * (x + y)).sin();
        c64::from_polar(amp, phase)
    })
}

fn grid_positions(first: usize, last: usize, step: usize) -> Vec<(usize, usize)> {
    let mut positions = vec![];
    for row in (first..=last).step_by(step) {
        for col in (first..=last).step_by(step) {
            positions.push((row, col));
        }
    }
    positions
}

fn synthetic_ptycho(
    object: Array2<c64>,
    probe: Array2<c64>,
    positions: &[(usize, usize)],
    gamma_w: f64,
) -> Ptycho {
    let mut ptycho = Ptycho::new();
    ptycho.set_object(object).unwrap();
    ptycho.set_probe(probe).unwrap();
    ptycho
        .forward_and_set_diffraction(positions, Some(gamma_w))
        .unwrap();
    ptycho
}

/// Mean squared error after removing the global phase, which the
/// measurement model cannot determine.
fn phase_aligned_mse(estimate: &Array2<c64>, truth: &Array2<c64>) -> f64 {
    let inner: c64 = estimate
        .iter()
        .zip(truth.iter())
        .map(|(e, t)| e.conj() * *t)
        .sum();
    let rotation = if inner.norm() > 0.0 {
        inner / inner.norm()
    } else {
        c64::new(1.0, 0.0)
    };
    estimate
        .iter()
        .zip(truth.iter())
        .map(|(e, t)| (*e * rotation - *t).norm_sqr())
        .sum::<f64>()
        / truth.len() as f64
}

#[test]
fn noise_free_scan_halves_the_amplitude_error() {
    let positions = grid_positions(8, 56, 8);
    assert_eq!(positions.len(), 49);
    let ptycho = synthetic_ptycho(
        smooth_object(64),
        circular_aperture(16, 0.47),
        &positions,
        1e4,
    );

    let mut solver = PtychoEp::new(
        &ptycho,
        EpConfig {
            damping: 0.7,
            seed: Some(0),
            ..EpConfig::default()
        },
    )
    .unwrap();
    let result = solver.run(100, false).unwrap();

    assert_eq!(result.errors.len(), 100);
    assert!(result.errors.iter().all(|e| e.is_finite()));
    assert!(
        result.errors[99] < 0.5 * result.errors[0],
        "error {} after 100 iterations, started at {}",
        result.errors[99],
        result.errors[0]
    );

    // The posterior carries a usable uncertainty map: strictly positive
    // precision everywhere, well above the prior baseline where the scan
    // looked.
    assert!(result.object_precision.iter().all(|&p| p > 0.0));
    let max_precision = result
        .object_precision
        .iter()
        .fold(f64::MIN, |a, &p| a.max(p));
    assert!(max_precision > 1.0);

    // No probe refinement was requested.
    assert!(result.probe.is_none());
}

#[test]
fn a_single_measurement_is_a_legal_degenerate_case() {
    let ptycho = synthetic_ptycho(
        smooth_object(16),
        circular_aperture(16, 0.47),
        &[(8, 8)],
        1e4,
    );
    let mut solver = PtychoEp::new(
        &ptycho,
        EpConfig {
            seed: Some(2),
            ..EpConfig::default()
        },
    )
    .unwrap();
    let result = solver.run(50, false).unwrap();
    assert_eq!(result.errors.len(), 50);
    assert!(result.errors.iter().all(|e| e.is_finite()));
    assert!(result.object_precision.iter().all(|&p| p > 0.0));
}

#[test]
fn em_update_recovers_the_probe_from_exact_messages() {
    let object_side = 16;
    let probe_side = 8;
    let mut rng = rng::seeded_rng(Some(21));
    let object_truth = rng::complex_normal(&mut rng, (object_side, object_side), 1.0);
    let probe_truth = Array2::from_shape_fn((probe_side, probe_side), |(r, c)| {
        c64::from_polar(
            1.0 + 0.5 * (r as f64 / probe_side as f64).sin(),
            0.4 * c as f64 / probe_side as f64,
        )
    });

    let mut node = ObjectNode::new(
        object_truth.clone(),
        Array2::from_elem((probe_side, probe_side), c64::new(1.0, 0.0)),
        None,
        0.7,
    );
    for &position in &[(4, 4), (4, 12), (12, 4), (12, 12)] {
        let patch = Patch::centred(position, probe_side, object_side).unwrap();
        let diff = crate::ptycho::DiffractionData::new(
            position,
            Array2::from_elem((probe_side, probe_side), 1.0),
            patch,
            Some(1e4),
        );
        node.register(&diff).unwrap();
    }

    // Pin the belief to the truth, and hand every channel the exact exit
    // wave as its back-message.
    let sharp = UncertainArray::from_array_precision(
        object_truth.clone(),
        Array2::from_elem((object_side, object_side), 1e12),
    )
    .unwrap();
    node.belief
        .add(&sharp, &Patch::full((object_side, object_side)))
        .unwrap();
    for measurement in node.measurements.iter_mut() {
        let rows = measurement.patch.rows.clone();
        let cols = measurement.patch.cols.clone();
        let exit_wave = &object_truth.slice(s![rows, cols]) * &probe_truth;
        measurement.channel.msg_to_probe =
            Some(UncertainArray::from_scalar_precision(exit_wave, 1.0).unwrap());
    }

    probe_updater::refine_probe(&mut node, 1).unwrap();
    assert_abs_diff_eq!(node.probe.data(), &probe_truth, epsilon = 1e-6);

    // The residuals are tiny, so the refined noise precisions are large.
    for measurement in node.measurements.iter() {
        assert!(
            measurement
                .channel
                .msg_from_likelihood
                .precision
                .harmonic_scalar()
                > 1.0
        );
    }
}

#[test]
fn probe_refinement_stays_stable_on_consistent_data() {
    let positions = grid_positions(4, 28, 4);
    let ptycho = synthetic_ptycho(smooth_object(32), circular_aperture(8, 0.47), &positions, 1e4);

    let mut solver = PtychoEp::new(
        &ptycho,
        EpConfig {
            n_probe_update: 1,
            seed: Some(3),
            ..EpConfig::default()
        },
    )
    .unwrap();
    let result = solver.run(10, false).unwrap();

    let refined = result.probe.expect("EM was enabled");
    assert_eq!(refined.dim(), (8, 8));
    assert!(refined.iter().all(|z| z.re.is_finite() && z.im.is_finite()));
    assert!(result.errors.iter().all(|e| e.is_finite()));
}

#[test]
fn sparse_prior_beats_the_gaussian_prior_on_a_sparse_object() {
    let side = 32;
    let mut rng = rng::seeded_rng(Some(33));
    let values = rng::complex_normal(&mut rng, (side, side), 1.0);
    let truth = values.mapv(|z| {
        // Roughly 10% of pixels survive.
        if z.norm_sqr() > 2.3 {
            z
        } else {
            c64::new(0.0, 0.0)
        }
    });

    let ptycho = synthetic_ptycho(
        truth.clone(),
        circular_aperture(side, 0.47),
        &[(side / 2, side / 2)],
        1e4,
    );

    let run = |prior: PriorKind| {
        let mut solver = PtychoEp::new(
            &ptycho,
            EpConfig {
                prior,
                seed: Some(5),
                ..EpConfig::default()
            },
        )
        .unwrap();
        solver.run(100, false).unwrap()
    };

    let plain = run(PriorKind::Gaussian);
    let sparse = run(PriorKind::Sparse { sparsity: 0.1 });

    let plain_mse = phase_aligned_mse(&plain.object_mean, &truth);
    let sparse_mse = phase_aligned_mse(&sparse.object_mean, &truth);
    assert!(
        sparse_mse < plain_mse,
        "sparse prior should help: {sparse_mse} vs {plain_mse}"
    );

    // The spike empties the background, so most magnitudes cluster near
    // zero.
    let near_zero = sparse
        .object_mean
        .iter()
        .filter(|z| z.norm() < 0.1)
        .count();
    assert!(
        near_zero * 2 > side * side,
        "only {near_zero} pixels were shrunk towards the spike"
    );
}

#[test]
fn nan_in_the_data_aborts_the_run() {
    let mut ptycho = synthetic_ptycho(
        smooth_object(16),
        circular_aperture(8, 0.47),
        &[(8, 8)],
        1e4,
    );
    let mut diffs = ptycho.diffraction_data().to_vec();
    diffs[0].amplitude[(0, 0)] = f64::NAN;
    ptycho.clear_diffraction_data();
    ptycho.add_diffraction_data_list(diffs);

    let mut solver = PtychoEp::new(
        &ptycho,
        EpConfig {
            seed: Some(8),
            ..EpConfig::default()
        },
    )
    .unwrap();
    assert!(matches!(
        solver.run(3, false),
        Err(EpError::NonFiniteBelief { iteration: 0 })
    ));
}

#[test]
fn the_callback_observes_every_iteration() {
    let ptycho = synthetic_ptycho(
        smooth_object(16),
        circular_aperture(8, 0.47),
        &[(8, 8)],
        1e4,
    );
    let mut solver = PtychoEp::new(
        &ptycho,
        EpConfig {
            seed: Some(9),
            ..EpConfig::default()
        },
    )
    .unwrap();

    let count = Rc::new(Cell::new(0usize));
    let seen = Rc::clone(&count);
    solver.set_callback(Box::new(move |iteration, error, object| {
        assert_eq!(iteration, seen.get());
        assert!(error.is_finite());
        assert_eq!(object.dim(), (16, 16));
        seen.set(seen.get() + 1);
    }));

    let result = solver.run(5, false).unwrap();
    assert_eq!(count.get(), 5);
    assert_eq!(result.errors.len(), 5);
}

#[test]
fn an_empty_registration_is_rejected() {
    let mut ptycho = Ptycho::new();
    ptycho.set_object(smooth_object(16)).unwrap();
    ptycho.set_probe(circular_aperture(8, 0.47)).unwrap();

    let result = PtychoEp::new(&ptycho, EpConfig::default());
    assert!(matches!(
        result,
        Err(PhaseRetrievalError::Ep(EpError::NoMeasurements))
    ));
}

#[test]
fn bad_damping_is_rejected_at_construction() {
    let ptycho = synthetic_ptycho(
        smooth_object(16),
        circular_aperture(8, 0.47),
        &[(8, 8)],
        1e4,
    );
    let result = PtychoEp::new(
        &ptycho,
        EpConfig {
            damping: 0.0,
            ..EpConfig::default()
        },
    );
    assert!(matches!(
        result,
        Err(PhaseRetrievalError::Ep(EpError::InvalidDamping(_)))
    ));
}
