// =============================================================================
// CMH Engine Python Bindings
// =============================================================================
//
// Wraps `CmhEngine<i64>` as a Python class. Strata are integer matching
// scores; every core error becomes a Python ValueError.
// =============================================================================

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use difstats_core::{CmhConfig, CmhEngine, CmhSummary, DifError, FrequencyRecord};

pub(crate) fn to_py_err(e: DifError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Build the summary dict shared by the engine and the item analysis.
pub(crate) fn summary_to_dict<'py>(
    py: Python<'py>,
    summary: &CmhSummary,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("item", &summary.item)?;
    dict.set_item("chi_square", summary.chi_square)?;
    dict.set_item("p_value", summary.p_value)?;
    dict.set_item("common_odds_ratio", summary.common_odds_ratio)?;
    dict.set_item("confidence_interval", summary.confidence_interval)?;
    dict.set_item("mh_delta", summary.mh_delta)?;
    dict.set_item("mh_delta_se", summary.mh_delta_standard_error)?;
    dict.set_item("delta_interval", summary.delta_interval)?;
    dict.set_item("ets_class", summary.classification.label())?;
    dict.set_item("focal_size", summary.focal_size)?;
    dict.set_item("reference_size", summary.reference_size)?;
    dict.set_item("n_strata", summary.n_strata)?;
    dict.set_item("n_informative_strata", summary.n_informative_strata)?;
    Ok(dict)
}

/// Mantel-Haenszel DIF engine for one item.
///
/// Feed it (stratum, group, score, frequency) observations with
/// `increment`, then ask for the statistics.
#[pyclass(name = "CmhEngine")]
#[derive(Clone)]
pub struct PyCmhEngine {
    inner: CmhEngine<i64>,
}

#[pymethods]
impl PyCmhEngine {
    #[new]
    #[pyo3(signature = (item, focal, reference, continuity_correction=false, confidence_level=0.95, significance_level=0.05))]
    fn new(
        item: &str,
        focal: &str,
        reference: &str,
        continuity_correction: bool,
        confidence_level: f64,
        significance_level: f64,
    ) -> PyResult<Self> {
        let config = CmhConfig {
            continuity_correction,
            confidence_level,
            significance_level,
        };
        let inner = CmhEngine::new(item, focal, reference, config).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Rebuild an engine from `frequency_tables()` rows.
    #[staticmethod]
    #[pyo3(signature = (item, focal, reference, rows, continuity_correction=false, confidence_level=0.95, significance_level=0.05))]
    fn from_frequency_tables(
        item: &str,
        focal: &str,
        reference: &str,
        rows: Vec<(String, String, String, String, String)>,
        continuity_correction: bool,
        confidence_level: f64,
        significance_level: f64,
    ) -> PyResult<Self> {
        let config = CmhConfig {
            continuity_correction,
            confidence_level,
            significance_level,
        };
        let records: Vec<FrequencyRecord> =
            rows.into_iter().map(FrequencyRecord::from_tuple).collect();
        let inner = CmhEngine::from_frequency_records(item, focal, reference, config, &records)
            .map_err(to_py_err)?;
        Ok(Self { inner })
    }

    fn increment(&mut self, stratum: i64, group: &str, score: f64, frequency: f64) -> PyResult<()> {
        self.inner
            .increment(stratum, group, score, frequency)
            .map_err(to_py_err)
    }

    #[getter]
    fn item(&self) -> &str {
        self.inner.item_id()
    }

    #[getter]
    fn n_strata(&self) -> usize {
        self.inner.n_strata()
    }

    /// (focal_right, focal_wrong, reference_right, reference_wrong) or None
    fn stratum(&self, key: i64) -> Option<(f64, f64, f64, f64)> {
        self.inner.stratum(&key).map(|t| {
            (
                t.focal_right(),
                t.focal_wrong(),
                t.reference_right(),
                t.reference_wrong(),
            )
        })
    }

    fn total_focal_size(&self) -> f64 {
        self.inner.total_focal_size()
    }

    fn total_reference_size(&self) -> f64 {
        self.inner.total_reference_size()
    }

    fn cochran_mantel_haenszel(&self) -> PyResult<f64> {
        self.inner.cochran_mantel_haenszel().map_err(to_py_err)
    }

    fn p_value(&self) -> PyResult<f64> {
        self.inner.p_value().map_err(to_py_err)
    }

    fn common_odds_ratio(&self) -> PyResult<f64> {
        self.inner.common_odds_ratio().map_err(to_py_err)
    }

    fn common_odds_ratio_confidence_interval(&self, odds_ratio: f64) -> PyResult<(f64, f64)> {
        self.inner
            .common_odds_ratio_confidence_interval(odds_ratio)
            .map_err(to_py_err)
    }

    fn mh_delta(&self) -> PyResult<f64> {
        self.inner.mh_delta().map_err(to_py_err)
    }

    /// ETS class label, one of A, B+, B-, B, C+, C- or C.
    ///
    /// The engine always reports a direction for B and C; the unsigned
    /// B and C labels come from `EtsClassification::unsigned()`.
    fn ets_classification(&self) -> PyResult<String> {
        self.inner
            .ets_classification()
            .map(|c| c.label().to_string())
            .map_err(to_py_err)
    }

    /// Rows of (item, group, stratum, score, frequency), all strings.
    fn frequency_tables(&self) -> Vec<(String, String, String, String, String)> {
        self.inner
            .frequency_tables()
            .into_iter()
            .map(FrequencyRecord::into_tuple)
            .collect()
    }

    fn summary<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let summary = self.inner.summary().map_err(to_py_err)?;
        summary_to_dict(py, &summary)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn __repr__(&self) -> String {
        format!(
            "CmhEngine(item='{}', focal='{}', reference='{}', n_strata={})",
            self.inner.item_id(),
            self.inner.focal_label(),
            self.inner.reference_label(),
            self.inner.n_strata()
        )
    }
}
