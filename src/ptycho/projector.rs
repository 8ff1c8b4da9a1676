// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The Fourier amplitude projector shared by amplitude-constraint engines.

use ndarray::{prelude::*, Zip};

use crate::{c64, constants::PROJECTOR_EPS, math::Fft2};

/// Project an exit wave onto the measured amplitude: replace its Fourier
/// amplitude with `target_amp`, keeping the phase. Returns the projected
/// wave and the mean squared amplitude error before projection.
pub fn project_amplitude(
    exit_wave: &Array2<c64>,
    target_amp: &Array2<f64>,
    fft: &Fft2,
) -> (Array2<c64>, f64) {
    let mut freq_wave = fft.forward(exit_wave);
    let pred_amp = freq_wave.mapv(|z| z.norm());

    let diff = target_amp - &pred_amp;
    let error = diff.mapv(|d| d * d).mean().unwrap();

    Zip::from(&mut freq_wave)
        .and(&pred_amp)
        .and(target_amp)
        .for_each(|z, &pred, &target| {
            *z = *z * (target / (pred + PROJECTOR_EPS));
        });

    (fft.inverse(&freq_wave), error)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::rng;

    #[test]
    fn projection_is_a_fixed_point_on_consistent_data() {
        let side = 8;
        let fft = Fft2::new(side);
        let mut rng = rng::seeded_rng(Some(3));
        let exit_wave = rng::complex_normal(&mut rng, (side, side), 1.0);
        let target = fft.forward(&exit_wave).mapv(|z| z.norm());

        let (projected, error) = project_amplitude(&exit_wave, &target, &fft);
        assert!(error < 1e-12);
        assert_abs_diff_eq!(projected, exit_wave, epsilon = 1e-4);
    }

    #[test]
    fn projection_enforces_the_target_amplitude() {
        let side = 8;
        let fft = Fft2::new(side);
        let mut rng = rng::seeded_rng(Some(4));
        let exit_wave = rng::complex_normal(&mut rng, (side, side), 1.0);
        let target = Array2::from_elem((side, side), 2.0);

        let (projected, error) = project_amplitude(&exit_wave, &target, &fft);
        assert!(error > 0.0);
        let amp = fft.forward(&projected).mapv(|z| z.norm());
        assert_abs_diff_eq!(amp, target, epsilon = 1e-3);
    }
}
