// =============================================================================
// Statistical Distribution Python Bindings
// =============================================================================

use pyo3::prelude::*;

use difstats_core::inference::{chi2_sf, z_critical};

/// Chi-squared survival function: P(X >= x) where X ~ χ²(df)
///
/// Stays accurate far into the tail, where 1 - cdf rounds to zero.
#[pyfunction]
pub fn chi2_sf_py(x: f64, df: f64) -> f64 {
    chi2_sf(x, df)
}

/// Two-sided normal critical value for a confidence level (1.96 for 0.95).
#[pyfunction]
pub fn z_critical_py(confidence: f64) -> f64 {
    z_critical(confidence)
}
