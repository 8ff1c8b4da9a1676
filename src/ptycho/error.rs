// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for the ptychography data container.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtychoError {
    #[error("Ptycho: the object must be square, got {rows}x{cols}")]
    NonSquareObject { rows: usize, cols: usize },

    #[error("Ptycho: the probe must be square, got {rows}x{cols}")]
    NonSquareProbe { rows: usize, cols: usize },

    #[error("Ptycho: no object has been set")]
    MissingObject,

    #[error("Ptycho: no probe has been set")]
    MissingProbe,

    #[error(
        "Ptycho: scan position ({row}, {col}) puts a {side}x{side} patch outside the {bound}x{bound} object"
    )]
    PatchOutOfBounds {
        row: usize,
        col: usize,
        side: usize,
        bound: usize,
    },

    #[error("Ptycho: no noise precision is set for the measurement at ({row}, {col})")]
    MissingNoisePrecision { row: usize, col: usize },
}
