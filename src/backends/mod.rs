// SPDX-License-Identifier: GPL-3.0-only

//! Platform collaborators: sensor provider, consent service, spatial locator

pub mod consent;
pub mod locator;
pub mod sensor;
#[cfg(feature = "synthetic")]
pub mod synthetic;
