// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The elementwise complex-gain factor between the object patch and the
//! exit wave.

use ndarray::{prelude::*, Zip};

use super::uncertain_array::{Precision, UncertainArray};
use crate::{c64, constants::PROBE_ABS2_FLOOR};

/// The illumination field, shared by every measurement, with its cached
/// derived quantities |P|² (floored) and conj(P)/|P|². The caches are
/// recomputed whenever the field changes; the EM updater is the only
/// writer.
pub struct ProbeField {
    data: Array2<c64>,
    abs2: Array2<f64>,
    inv: Array2<c64>,
}

impl ProbeField {
    pub fn new(data: Array2<c64>) -> ProbeField {
        let mut field = ProbeField {
            abs2: Array2::zeros(data.dim()),
            inv: Array2::zeros(data.dim()),
            data,
        };
        field.refresh();
        field
    }

    /// Replace the probe field; |P|² and conj(P)/|P|² are refreshed in the
    /// same call.
    pub fn set_data(&mut self, data: Array2<c64>) {
        self.data = data;
        self.refresh();
    }

    fn refresh(&mut self) {
        self.abs2 = self.data.mapv(|p| p.norm_sqr().max(PROBE_ABS2_FLOOR));
        self.inv = Zip::from(&self.data)
            .and(&self.abs2)
            .map_collect(|&p, &a| p.conj() / a);
    }

    pub fn data(&self) -> &Array2<c64> {
        &self.data
    }

    pub fn side(&self) -> usize {
        self.data.nrows()
    }

    /// Exit-wave lift: the mean picks up the gain P, the precision loses
    /// |P|². The result always carries per-pixel precision.
    pub fn forward(&self, ua: &UncertainArray) -> UncertainArray {
        let mean = &ua.mean * &self.data;
        let precision = match &ua.precision {
            Precision::Scalar(p) => self.abs2.mapv(|a| *p / a),
            Precision::Array(pr) => Zip::from(pr)
                .and(&self.abs2)
                .map_collect(|&p, &a| p / a),
        };
        UncertainArray {
            mean,
            precision: Precision::Array(precision),
        }
    }

    /// Inverse lift back into the object domain: the mean picks up
    /// conj(P)/|P|², the precision regains |P|². This is where a scalar
    /// diffraction-domain precision becomes per-pixel again.
    pub fn backward(&self, ua: &UncertainArray) -> UncertainArray {
        let mean = &ua.mean * &self.inv;
        let precision = match &ua.precision {
            Precision::Scalar(p) => self.abs2.mapv(|a| *p * a),
            Precision::Array(pr) => Zip::from(pr)
                .and(&self.abs2)
                .map_collect(|&p, &a| p * a),
        };
        UncertainArray {
            mean,
            precision: Precision::Array(precision),
        }
    }
}
