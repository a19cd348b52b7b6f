// =============================================================================
// DifStats Python Bindings
// =============================================================================
//
// This module creates the bridge between Rust and Python using PyO3.
// It wraps the pure Rust code from `difstats-core` and exposes it as
// a Python module that can be imported with `import difstats`.
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
// 1. Implement the logic in `difstats-core` first
// 2. Create a Python wrapper in one of the `*_py` modules
// 3. Add it to the module in the `_difstats` function at the bottom
//
// =============================================================================

use pyo3::prelude::*;

mod analysis_py;
mod cmh_py;
mod inference_py;

use analysis_py::mantel_haenszel_dif_py;
use cmh_py::PyCmhEngine;
use inference_py::{chi2_sf_py, z_critical_py};

// =============================================================================
// Module Registration
// =============================================================================

/// DifStats: Mantel-Haenszel DIF with a Rust backend
///
/// This is the internal Rust module. Users should import from the
/// Python wrapper: `import difstats`
#[pymodule]
fn _difstats(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCmhEngine>()?;

    m.add_function(wrap_pyfunction!(mantel_haenszel_dif_py, m)?)?;

    m.add_function(wrap_pyfunction!(chi2_sf_py, m)?)?;
    m.add_function(wrap_pyfunction!(z_critical_py, m)?)?;

    Ok(())
}
