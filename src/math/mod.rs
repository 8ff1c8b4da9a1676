// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Orthonormally-normalised 2D FFTs and small numeric helpers.

use std::sync::Arc;

use ndarray::prelude::*;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::c64;

/// Planned forward/inverse 2D FFTs for square complex arrays of a fixed
/// side length. Plans are built once and shared; the transform is applied
/// as a row pass, a transpose, a second row pass and a transpose back,
/// scaled so that both directions are unitary.
pub struct Fft2 {
    side: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl Fft2 {
    pub fn new(side: usize) -> Fft2 {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(side);
        let inverse = planner.plan_fft_inverse(side);
        Fft2 {
            side,
            forward,
            inverse,
        }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn forward(&self, input: &Array2<c64>) -> Array2<c64> {
        self.transform(input, &self.forward)
    }

    pub fn inverse(&self, input: &Array2<c64>) -> Array2<c64> {
        self.transform(input, &self.inverse)
    }

    fn transform(&self, input: &Array2<c64>, plan: &Arc<dyn Fft<f64>>) -> Array2<c64> {
        assert_eq!(
            input.dim(),
            (self.side, self.side),
            "Fft2 was planned for side {}",
            self.side
        );
        let row_pass = |data: &mut Array2<c64>| {
            data.outer_iter_mut().into_par_iter().for_each(|mut row| {
                plan.process(row.as_slice_mut().unwrap());
            });
        };

        let mut data = input.to_owned();
        row_pass(&mut data);

        // Column pass via a transposed copy; rows of the copy are
        // contiguous again.
        let mut data = data.reversed_axes().as_standard_layout().into_owned();
        row_pass(&mut data);
        let mut data = data.reversed_axes().as_standard_layout().into_owned();

        // Each 1D pass wants a 1/sqrt(side) factor for the orthonormal
        // convention.
        let norm = 1.0 / self.side as f64;
        data.mapv_inplace(|z| z * norm);
        data
    }
}

/// Collapse a per-pixel precision field to one scalar: the inverse of the
/// mean variance.
pub(crate) fn harmonic_precision(precision: &Array2<f64>) -> f64 {
    let mean_variance = precision.mapv(|p| 1.0 / p).mean().unwrap();
    1.0 / mean_variance
}
