// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The noiseless forward model: exit waves and their far-field amplitudes.

use ndarray::prelude::*;

use super::{DiffractionData, Patch, Ptycho, PtychoError};
use crate::math::Fft2;

/// Generate diffraction amplitudes |FFT(P · O[patch])| for the given scan
/// positions. Phases are discarded; that is the measurement.
pub fn generate_diffraction(
    ptycho: &Ptycho,
    positions: &[(usize, usize)],
    gamma_w: Option<f64>,
) -> Result<Vec<DiffractionData>, PtychoError> {
    let object = ptycho.object().ok_or(PtychoError::MissingObject)?;
    let probe = ptycho.probe().ok_or(PtychoError::MissingProbe)?;
    let side = probe.nrows();
    let bound = object.nrows();
    let fft = Fft2::new(side);

    let mut diffs = Vec::with_capacity(positions.len());
    for &position in positions {
        let patch = Patch::centred(position, side, bound)?;
        let exit_wave = &object.slice(s![patch.rows.clone(), patch.cols.clone()]) * probe;
        let amplitude = fft.forward(&exit_wave).mapv(|z| z.norm());
        diffs.push(DiffractionData {
            position,
            amplitude,
            patch,
            gamma_w,
        });
    }
    Ok(diffs)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::c64;

    #[test]
    fn forward_amplitudes_preserve_energy() {
        let mut ptycho = Ptycho::new();
        ptycho
            .set_object(Array2::from_elem((16, 16), c64::new(1.0, 0.0)))
            .unwrap();
        ptycho
            .set_probe(Array2::from_elem((8, 8), c64::new(1.0, 0.0)))
            .unwrap();

        let diffs = generate_diffraction(&ptycho, &[(8, 8)], None).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].amplitude.dim(), (8, 8));
        assert_eq!(diffs[0].patch, Patch::new(4..12, 4..12));

        // Parseval: the measured intensity carries the exit-wave energy.
        let energy: f64 = diffs[0].intensity().sum();
        assert_abs_diff_eq!(energy, 64.0, epsilon = 1e-8);
    }

    #[test]
    fn forward_needs_object_and_probe() {
        let ptycho = Ptycho::new();
        assert!(matches!(
            generate_diffraction(&ptycho, &[(4, 4)], None),
            Err(PtychoError::MissingObject)
        ));
    }
}
