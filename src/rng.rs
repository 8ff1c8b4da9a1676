// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Seed-addressable sampling of circularly-symmetric complex Gaussians.

use ndarray::prelude::*;
use ndarray_rand::rand_distr::Normal;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::c64;

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Sample an array of complex Gaussians with the given total variance;
/// each component carries half of it.
pub(crate) fn complex_normal<R: Rng>(
    rng: &mut R,
    shape: (usize, usize),
    variance: f64,
) -> Array2<c64> {
    let component = Normal::new(0.0, (variance / 2.0).sqrt()).unwrap();
    Array2::from_shape_simple_fn(shape, || c64::new(rng.sample(component), rng.sample(component)))
}
