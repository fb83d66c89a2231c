// Business logic services layer
//
// This module contains the validation logic that is independent of how a
// run is started (single path, pending batch) or how results are shown.

pub mod comparison;
pub mod validation;
