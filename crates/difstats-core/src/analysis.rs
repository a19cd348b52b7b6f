// =============================================================================
// Item-Level DIF Analysis
// =============================================================================
//
// Runs the Mantel-Haenszel procedure on every item of a test.
//
// INPUT
// -----
//   responses  (n_examinees × n_items), item scores; NaN marks a missing
//              response
//   groups     one group label per examinee
//   weights    optional frequency weight per examinee (default 1)
//
// MATCHING
// --------
// Examinees are stratified on their observed score, rounded to the nearest
// integer: either the total over all items or the rest score, which leaves
// the studied item out. Missing responses contribute nothing to the score
// and are not counted for the item.
//
// Examinees in any group other than the focal and reference groups are
// skipped. Each item gets its own engine; one item failing (e.g. no
// informative strata) does not affect the others.
//
// =============================================================================

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dif::{CmhConfig, CmhEngine, CmhSummary, Group};
use crate::error::{DifError, Result};

// =============================================================================
// Configuration
// =============================================================================

/// Which observed score examinees are matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchingScore {
    /// Sum over all items, studied item included (ETS practice).
    TotalScore,
    /// Sum over all items except the studied one.
    RestScore,
}

/// Options for `mantel_haenszel_dif`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifAnalysisConfig {
    pub cmh: CmhConfig,

    /// Default: TotalScore
    pub matching: MatchingScore,

    /// Analyse items on the rayon thread pool.
    /// Default: true
    pub parallel: bool,
}

impl Default for DifAnalysisConfig {
    fn default() -> Self {
        Self {
            cmh: CmhConfig::default(),
            matching: MatchingScore::TotalScore,
            parallel: true,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Outcome for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDifResult {
    pub item: String,
    /// Column index in the response matrix.
    pub index: usize,
    pub outcome: Result<CmhSummary>,
}

impl ItemDifResult {
    pub fn summary(&self) -> Option<&CmhSummary> {
        self.outcome.as_ref().ok()
    }
}

// =============================================================================
// Analysis
// =============================================================================

/// Mantel-Haenszel DIF for every column of `responses`.
///
/// # Errors
/// * `EmptyInput` if there are no examinees or no items
/// * `DimensionMismatch` if `groups`, `weights` or `item_names` do not match
///   the matrix
/// * `InvalidInput` for equal group labels, a bad config, or a negative or
///   non-finite weight
///
/// Per-item statistic failures are returned inside each `ItemDifResult`.
pub fn mantel_haenszel_dif(
    responses: &Array2<f64>,
    groups: &[String],
    item_names: &[String],
    focal_label: &str,
    reference_label: &str,
    weights: Option<&Array1<f64>>,
    config: &DifAnalysisConfig,
) -> Result<Vec<ItemDifResult>> {
    let (n_examinees, n_items) = responses.dim();

    if n_examinees == 0 {
        return Err(DifError::EmptyInput("response matrix has no rows".to_string()));
    }
    if n_items == 0 {
        return Err(DifError::EmptyInput("response matrix has no columns".to_string()));
    }
    if groups.len() != n_examinees {
        return Err(DifError::DimensionMismatch(format!(
            "groups has {} entries but responses has {} rows",
            groups.len(),
            n_examinees
        )));
    }
    if item_names.len() != n_items {
        return Err(DifError::DimensionMismatch(format!(
            "item_names has {} entries but responses has {} columns",
            item_names.len(),
            n_items
        )));
    }
    if let Some(w) = weights {
        if w.len() != n_examinees {
            return Err(DifError::DimensionMismatch(format!(
                "weights has {} entries but responses has {} rows",
                w.len(),
                n_examinees
            )));
        }
        if let Some(bad) = w.iter().find(|&&x| !x.is_finite() || x < 0.0) {
            return Err(DifError::InvalidInput(format!(
                "weights must be finite and non-negative, found {}",
                bad
            )));
        }
    }

    // Validates the labels and config once, before any item is touched.
    let prototype: CmhEngine<i64> =
        CmhEngine::new(String::new(), focal_label, reference_label, config.cmh.clone())?;
    let resolved: Vec<Option<Group>> = groups
        .iter()
        .map(|g| prototype.resolve_group(g).ok())
        .collect();

    let skipped = resolved.iter().filter(|g| g.is_none()).count();
    if skipped > 0 {
        warn!(
            target: "difstats::analysis",
            skipped,
            focal = focal_label,
            reference = reference_label,
            "examinees outside the focal and reference groups were skipped"
        );
    }

    let totals: Array1<f64> = responses.rows().into_iter().map(observed_score).collect();

    debug!(
        target: "difstats::analysis",
        n_examinees,
        n_items,
        matching = ?config.matching,
        "starting Mantel-Haenszel DIF"
    );

    let analyse = |j: usize| -> ItemDifResult {
        let outcome = CmhEngine::<i64>::new(
            item_names[j].clone(),
            focal_label,
            reference_label,
            config.cmh.clone(),
        )
        .and_then(|mut engine| {
            fill_item_engine(
                &mut engine,
                responses,
                &resolved,
                &totals,
                weights,
                j,
                config.matching,
            )?;
            engine.summary()
        });

        ItemDifResult {
            item: item_names[j].clone(),
            index: j,
            outcome,
        }
    };

    let results: Vec<ItemDifResult> = if config.parallel {
        (0..n_items).into_par_iter().map(analyse).collect()
    } else {
        (0..n_items).map(analyse).collect()
    };

    Ok(results)
}

/// Sum of non-missing scores in one row.
fn observed_score(row: ArrayView1<f64>) -> f64 {
    row.iter().filter(|x| !x.is_nan()).sum()
}

fn fill_item_engine(
    engine: &mut CmhEngine<i64>,
    responses: &Array2<f64>,
    groups: &[Option<Group>],
    totals: &Array1<f64>,
    weights: Option<&Array1<f64>>,
    item: usize,
    matching: MatchingScore,
) -> Result<()> {
    for (i, group) in groups.iter().enumerate() {
        let Some(group) = *group else { continue };
        let score = responses[[i, item]];
        if score.is_nan() {
            continue;
        }

        let matching_score = match matching {
            MatchingScore::TotalScore => totals[i],
            MatchingScore::RestScore => totals[i] - score,
        };
        let stratum = matching_score.round() as i64;
        let weight = weights.map_or(1.0, |w| w[i]);

        engine.increment_group(stratum, group, score, weight)?;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dif::EtsLevel;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn labels(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    /// Three anchors and a studied item that is harder for the focal group
    /// at every anchor level. The third anchor is reverse-keyed, so the total
    /// score mixes right and wrong studied answers within a stratum.
    fn dif_data() -> (Array2<f64>, Vec<String>) {
        let mut rows = Vec::new();
        let mut groups = Vec::new();
        for rep in 0..40 {
            let every_fourth = (rep % 4 == 0) as i32 as f64;
            let every_other = (rep % 2 == 0) as i32 as f64;
            for &(g, anchor, studied) in &[
                ("R", 1.0, 1.0),
                ("R", 1.0, 1.0),
                ("R", 1.0, 1.0 - every_fourth),
                ("R", 0.0, 1.0),
                ("R", 0.0, 0.0),
                ("R", 0.0, every_other),
                ("F", 1.0, 0.0),
                ("F", 1.0, 1.0),
                ("F", 1.0, every_fourth),
                ("F", 0.0, 0.0),
                ("F", 0.0, 0.0),
                ("F", 0.0, every_fourth),
            ] {
                rows.push(vec![anchor, anchor, 1.0 - anchor, studied]);
                groups.push(g.to_string());
            }
        }
        let n = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        (Array2::from_shape_vec((n, 4), flat).unwrap(), groups)
    }

    #[test]
    fn test_detects_dif_on_studied_item() {
        let (responses, groups) = dif_data();
        let names = labels(&["a1", "a2", "a3", "studied"]);
        let config = DifAnalysisConfig {
            matching: MatchingScore::RestScore,
            ..DifAnalysisConfig::default()
        };

        let results =
            mantel_haenszel_dif(&responses, &groups, &names, "F", "R", None, &config).unwrap();

        assert_eq!(results.len(), 4);
        let studied = results[3].summary().unwrap();
        assert_eq!(studied.item, "studied");
        assert!(studied.common_odds_ratio > 1.0);
        assert!(studied.p_value < 0.05);
        assert_ne!(studied.classification.level, EtsLevel::A);
    }

    #[test]
    fn test_total_score_matching_detects_dif() {
        let (responses, groups) = dif_data();
        let names = labels(&["a1", "a2", "a3", "studied"]);
        let config = DifAnalysisConfig::default();
        assert_eq!(config.matching, MatchingScore::TotalScore);

        let results =
            mantel_haenszel_dif(&responses, &groups, &names, "F", "R", None, &config).unwrap();

        // strata 1, 2, 3 on the total score
        let studied = results[3].summary().unwrap();
        assert_eq!(studied.n_strata, 3);
        assert_abs_diff_eq!(studied.common_odds_ratio, 42.0, epsilon = 1e-9);
        assert_abs_diff_eq!(studied.chi_square, 79.86894132653067, epsilon = 1e-8);
        assert_eq!(studied.focal_size, 240.0);
        assert_eq!(studied.reference_size, 240.0);
        assert_eq!(studied.classification.to_string(), "C-");
    }

    #[test]
    fn test_parallel_and_serial_agree() {
        let (responses, groups) = dif_data();
        let names = labels(&["a1", "a2", "a3", "studied"]);
        let parallel = DifAnalysisConfig::default();
        let serial = DifAnalysisConfig {
            parallel: false,
            ..DifAnalysisConfig::default()
        };

        let a = mantel_haenszel_dif(&responses, &groups, &names, "F", "R", None, &parallel).unwrap();
        let b = mantel_haenszel_dif(&responses, &groups, &names, "F", "R", None, &serial).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_matches_hand_built_engine() {
        let responses = array![
            [1.0, 1.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [0.0, 0.0],
            [1.0, 1.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [1.0, 1.0],
        ];
        let groups = labels(&["F", "F", "F", "F", "R", "R", "R", "R"]);
        let names = labels(&["i1", "i2"]);
        let config = DifAnalysisConfig {
            parallel: false,
            ..DifAnalysisConfig::default()
        };

        let results =
            mantel_haenszel_dif(&responses, &groups, &names, "F", "R", None, &config).unwrap();

        let mut engine: CmhEngine<i64> =
            CmhEngine::new("i1", "F", "R", CmhConfig::default()).unwrap();
        for i in 0..responses.nrows() {
            let total = responses.row(i).sum().round() as i64;
            engine
                .increment(total, &groups[i], responses[[i, 0]], 1.0)
                .unwrap();
        }

        match (&results[0].outcome, engine.summary()) {
            (Ok(got), Ok(want)) => assert_eq!(got, &want),
            (Err(got), Err(want)) => assert_eq!(got, &want),
            (got, want) => panic!("mismatch: {:?} vs {:?}", got, want),
        }
    }

    #[test]
    fn test_weights_scale_sizes() {
        let (responses, groups) = dif_data();
        let names = labels(&["a1", "a2", "a3", "studied"]);
        let weights = Array1::from_elem(responses.nrows(), 2.0);

        let results = mantel_haenszel_dif(
            &responses,
            &groups,
            &names,
            "F",
            "R",
            Some(&weights),
            &DifAnalysisConfig::default(),
        )
        .unwrap();

        let summary = results[3].summary().unwrap();
        assert_abs_diff_eq!(summary.focal_size, 480.0, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.reference_size, 480.0, epsilon = 1e-12);
    }

    #[test]
    fn test_other_groups_and_missing_are_skipped() {
        let (responses, mut groups) = dif_data();
        groups[0] = "X".to_string();
        let mut responses = responses;
        responses[[1, 3]] = f64::NAN;
        let names = labels(&["a1", "a2", "a3", "studied"]);

        let results = mantel_haenszel_dif(
            &responses,
            &groups,
            &names,
            "F",
            "R",
            None,
            &DifAnalysisConfig::default(),
        )
        .unwrap();

        let summary = results[3].summary().unwrap();
        assert_abs_diff_eq!(summary.reference_size, 238.0, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.focal_size, 240.0, epsilon = 1e-12);
    }

    #[test]
    fn test_item_without_variance_reports_error() {
        // focal and reference examinees never share a stratum
        let responses = array![[1.0], [1.0], [0.0], [0.0]];
        let groups = labels(&["F", "F", "R", "R"]);
        let names = labels(&["only"]);

        let results = mantel_haenszel_dif(
            &responses,
            &groups,
            &names,
            "F",
            "R",
            None,
            &DifAnalysisConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            results[0].outcome,
            Err(DifError::InsufficientData(_))
        ));
        assert!(results[0].summary().is_none());
    }

    #[test]
    fn test_dimension_checks() {
        let responses = array![[1.0, 0.0], [0.0, 1.0]];
        let config = DifAnalysisConfig::default();

        let result = mantel_haenszel_dif(
            &responses,
            &labels(&["F"]),
            &labels(&["i1", "i2"]),
            "F",
            "R",
            None,
            &config,
        );
        assert!(matches!(result, Err(DifError::DimensionMismatch(_))));

        let result = mantel_haenszel_dif(
            &responses,
            &labels(&["F", "R"]),
            &labels(&["i1"]),
            "F",
            "R",
            None,
            &config,
        );
        assert!(matches!(result, Err(DifError::DimensionMismatch(_))));

        let bad_weights = array![1.0, -1.0];
        let result = mantel_haenszel_dif(
            &responses,
            &labels(&["F", "R"]),
            &labels(&["i1", "i2"]),
            "F",
            "R",
            Some(&bad_weights),
            &config,
        );
        assert!(matches!(result, Err(DifError::InvalidInput(_))));
    }

    #[test]
    fn test_empty_input() {
        let responses = Array2::<f64>::zeros((0, 3));
        let result = mantel_haenszel_dif(
            &responses,
            &[],
            &labels(&["a", "b", "c"]),
            "F",
            "R",
            None,
            &DifAnalysisConfig::default(),
        );
        assert!(matches!(result, Err(DifError::EmptyInput(_))));
    }
}
