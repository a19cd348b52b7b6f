// =============================================================================
// DifStats Core Library
// =============================================================================
//
// Pure Rust differential item functioning statistics. No Python code here;
// the `difstats` crate wraps this library for Python.
//
// STRUCTURE:
// ----------
//   - dif:       Mantel-Haenszel engine (stratified 2×2 tables, CMH chi-square,
//                common odds ratio, RBG confidence interval, ETS classes)
//   - analysis:  per-item DIF over a response matrix, matched on observed score
//   - inference: chi-square tail probabilities and Wald intervals
//   - error:     error types used throughout the library
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
//   1. Add it to the appropriate module (or create a new one)
//   2. Write tests in that module (see existing tests for examples)
//   3. Re-export public items here so users can access them easily
//   4. Update the Python bindings in the `difstats` crate
//
// =============================================================================

pub mod analysis;
pub mod dif;
pub mod error;
pub mod inference;

// Users can write `use difstats_core::CmhEngine` instead of
// `use difstats_core::dif::CmhEngine`
pub use analysis::{mantel_haenszel_dif, DifAnalysisConfig, ItemDifResult, MatchingScore};
pub use dif::{
    CmhConfig, CmhEngine, CmhSummary, DifDirection, EtsClassification, EtsLevel, FrequencyRecord,
    Group, StratumTable,
};
pub use error::{DifError, Result};
pub use inference::{chi2_sf, confidence_interval_z, z_critical};
