// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The top-level error type.

use thiserror::Error;

use crate::{ep::EpError, ptycho::PtychoError};

#[derive(Error, Debug)]
pub enum PhaseRetrievalError {
    #[error("{0}")]
    Ep(#[from] EpError),

    #[error("{0}")]
    Ptycho(#[from] PtychoError),
}
