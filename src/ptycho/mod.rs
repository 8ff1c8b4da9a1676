// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The ptychography data container shared between reconstruction engines:
//! scan geometry, measured diffraction amplitudes and the initial object
//! and probe fields.

mod error;
pub mod forward;
pub mod projector;

pub use error::PtychoError;

use std::ops::Range;

use ndarray::prelude::*;

use crate::c64;

/// The rectangular object region illuminated at one scan position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Patch {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl Patch {
    pub fn new(rows: Range<usize>, cols: Range<usize>) -> Patch {
        Patch { rows, cols }
    }

    /// The patch covering an entire `shape`-sized field.
    pub fn full(shape: (usize, usize)) -> Patch {
        Patch {
            rows: 0..shape.0,
            cols: 0..shape.1,
        }
    }

    /// A `side`-sized patch centred on a scan position, bounds-checked
    /// against a `bound`-sized object.
    pub fn centred(
        position: (usize, usize),
        side: usize,
        bound: usize,
    ) -> Result<Patch, PtychoError> {
        let (row, col) = position;
        let half = side / 2;
        if row < half || col < half || row + (side - half) > bound || col + (side - half) > bound {
            return Err(PtychoError::PatchOutOfBounds {
                row,
                col,
                side,
                bound,
            });
        }
        Ok(Patch {
            rows: row - half..row + (side - half),
            cols: col - half..col + (side - half),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.cols.len())
    }
}

/// One recorded diffraction pattern: the scan position, the measured
/// amplitude (the square root of the recorded intensity), the object patch
/// it constrains, and optionally the noise precision of the measurement.
#[derive(Clone, Debug)]
pub struct DiffractionData {
    pub position: (usize, usize),
    pub amplitude: Array2<f64>,
    pub patch: Patch,
    pub gamma_w: Option<f64>,
}

impl DiffractionData {
    pub fn new(
        position: (usize, usize),
        amplitude: Array2<f64>,
        patch: Patch,
        gamma_w: Option<f64>,
    ) -> DiffractionData {
        DiffractionData {
            position,
            amplitude,
            patch,
            gamma_w,
        }
    }

    /// The recorded intensity (squared amplitude).
    pub fn intensity(&self) -> Array2<f64> {
        self.amplitude.mapv(|a| a * a)
    }

    pub fn side(&self) -> usize {
        self.amplitude.nrows()
    }

    pub fn gamma_w(&self) -> Result<f64, PtychoError> {
        self.gamma_w.ok_or(PtychoError::MissingNoisePrecision {
            row: self.position.0,
            col: self.position.1,
        })
    }
}

/// Container for one ptychography experiment. Engines hold read-only
/// references to it; they never mutate the measured data.
#[derive(Default)]
pub struct Ptycho {
    object: Option<Array2<c64>>,
    probe: Option<Array2<c64>>,
    data: Vec<DiffractionData>,
}

impl Ptycho {
    pub fn new() -> Ptycho {
        Ptycho::default()
    }

    /// Set the (square) complex object field.
    pub fn set_object(&mut self, object: Array2<c64>) -> Result<(), PtychoError> {
        if object.nrows() != object.ncols() {
            return Err(PtychoError::NonSquareObject {
                rows: object.nrows(),
                cols: object.ncols(),
            });
        }
        self.object = Some(object);
        Ok(())
    }

    /// Set the (square) complex probe field.
    pub fn set_probe(&mut self, probe: Array2<c64>) -> Result<(), PtychoError> {
        if probe.nrows() != probe.ncols() {
            return Err(PtychoError::NonSquareProbe {
                rows: probe.nrows(),
                cols: probe.ncols(),
            });
        }
        self.probe = Some(probe);
        Ok(())
    }

    pub fn object(&self) -> Option<&Array2<c64>> {
        self.object.as_ref()
    }

    pub fn probe(&self) -> Option<&Array2<c64>> {
        self.probe.as_ref()
    }

    pub fn object_len(&self) -> Option<usize> {
        self.object.as_ref().map(|o| o.nrows())
    }

    pub fn probe_len(&self) -> Option<usize> {
        self.probe.as_ref().map(|p| p.nrows())
    }

    pub fn add_diffraction_data(&mut self, diff: DiffractionData) {
        self.data.push(diff);
    }

    pub fn add_diffraction_data_list(&mut self, diffs: Vec<DiffractionData>) {
        self.data.extend(diffs);
    }

    pub fn clear_diffraction_data(&mut self) {
        self.data.clear();
    }

    pub fn diffraction_data(&self) -> &[DiffractionData] {
        &self.data
    }

    /// Re-order the measurements by distance from a centre (the object
    /// centre when none is given). Centre-out schedules tend to anchor the
    /// reconstruction faster.
    pub fn sort_by_center_distance(
        &mut self,
        center: Option<(usize, usize)>,
    ) -> Result<(), PtychoError> {
        let (cy, cx) = match center {
            Some(c) => c,
            None => {
                let len = self.object_len().ok_or(PtychoError::MissingObject)?;
                (len / 2, len / 2)
            }
        };
        self.data.sort_by_key(|d| {
            let dy = d.position.0 as i64 - cy as i64;
            let dx = d.position.1 as i64 - cx as i64;
            dy * dy + dx * dx
        });
        Ok(())
    }

    /// Run the noiseless forward model at the given scan positions and
    /// replace the stored measurements with the result.
    pub fn forward_and_set_diffraction(
        &mut self,
        positions: &[(usize, usize)],
        gamma_w: Option<f64>,
    ) -> Result<(), PtychoError> {
        let diffs = forward::generate_diffraction(self, positions, gamma_w)?;
        self.clear_diffraction_data();
        self.add_diffraction_data_list(diffs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_must_be_square() {
        let mut ptycho = Ptycho::new();
        let result = ptycho.set_object(Array2::zeros((4, 6)));
        assert!(matches!(
            result,
            Err(PtychoError::NonSquareObject { rows: 4, cols: 6 })
        ));
    }

    #[test]
    fn centred_patch_has_the_requested_side() {
        let patch = Patch::centred((8, 8), 4, 16).unwrap();
        assert_eq!(patch.rows, 6..10);
        assert_eq!(patch.cols, 6..10);
        assert_eq!(patch.shape(), (4, 4));

        // Odd sides still produce full-sized patches.
        let patch = Patch::centred((8, 8), 5, 16).unwrap();
        assert_eq!(patch.shape(), (5, 5));
    }

    #[test]
    fn centred_patch_is_bounds_checked() {
        assert!(Patch::centred((1, 8), 4, 16).is_err());
        assert!(Patch::centred((8, 15), 4, 16).is_err());
        assert!(Patch::centred((2, 2), 4, 16).is_ok());
    }

    #[test]
    fn sorting_orders_measurements_centre_out() {
        let mut ptycho = Ptycho::new();
        ptycho
            .set_object(Array2::from_elem((16, 16), c64::new(1.0, 0.0)))
            .unwrap();
        for &position in &[(2, 2), (8, 8), (12, 4)] {
            let patch = Patch::centred(position, 4, 16).unwrap();
            ptycho.add_diffraction_data(DiffractionData::new(
                position,
                Array2::zeros((4, 4)),
                patch,
                None,
            ));
        }
        ptycho.sort_by_center_distance(None).unwrap();
        let positions: Vec<_> = ptycho.diffraction_data().iter().map(|d| d.position).collect();
        assert_eq!(positions, vec![(8, 8), (12, 4), (2, 2)]);
    }
}
