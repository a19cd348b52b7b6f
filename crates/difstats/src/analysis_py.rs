// =============================================================================
// Item DIF Analysis Python Bindings
// =============================================================================

use numpy::{PyReadonlyArray1, PyReadonlyArray2};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use difstats_core::{mantel_haenszel_dif, CmhConfig, DifAnalysisConfig, MatchingScore};

use crate::cmh_py::{summary_to_dict, to_py_err};

/// Mantel-Haenszel DIF for every item of a response matrix.
///
/// # Arguments
/// * `responses` - (n_examinees, n_items) scores, NaN for missing
/// * `groups` - group label per examinee
/// * `item_names` - one name per column
/// * `focal`, `reference` - the two group labels to compare
/// * `weights` - optional frequency weight per examinee
/// * `rest_score` - match on the rest score instead of the total score
///
/// # Returns
/// One dict per item. Items whose statistics are undefined get
/// `{"item": ..., "error": ...}`.
#[pyfunction]
#[pyo3(signature = (responses, groups, item_names, focal, reference, weights=None, rest_score=false, continuity_correction=false))]
#[allow(clippy::too_many_arguments)]
pub fn mantel_haenszel_dif_py<'py>(
    py: Python<'py>,
    responses: PyReadonlyArray2<'py, f64>,
    groups: Vec<String>,
    item_names: Vec<String>,
    focal: &str,
    reference: &str,
    weights: Option<PyReadonlyArray1<'py, f64>>,
    rest_score: bool,
    continuity_correction: bool,
) -> PyResult<Vec<Bound<'py, PyDict>>> {
    let responses_arr = responses.as_array().to_owned();
    let weights_arr = weights.map(|w| w.as_array().to_owned());

    let config = DifAnalysisConfig {
        cmh: CmhConfig {
            continuity_correction,
            ..CmhConfig::default()
        },
        matching: if rest_score {
            MatchingScore::RestScore
        } else {
            MatchingScore::TotalScore
        },
        parallel: true,
    };

    // Release the GIL while the items are analysed
    let results = py
        .allow_threads(|| {
            mantel_haenszel_dif(
                &responses_arr,
                &groups,
                &item_names,
                focal,
                reference,
                weights_arr.as_ref(),
                &config,
            )
        })
        .map_err(to_py_err)?;

    results
        .iter()
        .map(|r| match &r.outcome {
            Ok(summary) => summary_to_dict(py, summary),
            Err(e) => {
                let dict = PyDict::new_bound(py);
                dict.set_item("item", &r.item)?;
                dict.set_item("error", e.to_string())?;
                Ok(dict)
            }
        })
        .collect()
}
