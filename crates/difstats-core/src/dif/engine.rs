// =============================================================================
// Cochran-Mantel-Haenszel DIF Engine
// =============================================================================
//
// Accumulates stratified 2×2 tables for one item and computes the
// Mantel-Haenszel DIF statistics from them.
//
// NOTATION
// --------
// For stratum i (e.g. examinees with total score i):
//
//     a_i = focal right        b_i = focal wrong
//     c_i = reference right    d_i = reference wrong
//     n_i = a_i + b_i + c_i + d_i
//
// CMH CHI-SQUARE (1 df)
// ---------------------
//     E_i = (a_i + b_i)(a_i + c_i) / n_i
//     V_i = (a_i + b_i)(c_i + d_i)(a_i + c_i)(b_i + d_i) / (n_i² (n_i - 1))
//
//     X² = (|Σ a_i - Σ E_i| - cc)² / Σ V_i        cc = 0.5 or 0
//
// Strata with n_i <= 1 carry no information about association and are
// skipped. Without a continuity correction this matches SAS PROC FREQ.
//
// COMMON ODDS RATIO
// -----------------
// The Mantel-Haenszel estimator, with the reference group in the first row
// (the ETS orientation, alpha > 1 means the item is harder for the focal
// group at matched ability):
//
//     alpha_MH = Σ (c_i b_i / n_i) / Σ (d_i a_i / n_i)
//
// Its log has the Robins-Breslow-Greenland variance. With the reference-first
// table A=c, B=d, C=a, D=b:
//
//     P_i = (A_i + D_i)/n_i    Q_i = (B_i + C_i)/n_i
//     R_i = A_i D_i / n_i      S_i = B_i C_i / n_i
//
//     Var(ln alpha) = Σ P_i R_i / (2 (Σ R_i)²)
//                   + Σ (P_i S_i + Q_i R_i) / (2 Σ R_i Σ S_i)
//                   + Σ Q_i S_i / (2 (Σ S_i)²)
//
// Every statistic is computed from one pass over the strata.
//
// =============================================================================

use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::dif::ets::{classify_ets, odds_ratio_to_delta, EtsClassification, DELTA_SCALE};
use crate::dif::export::{FrequencyRecord, RIGHT_SCORE_LABEL, WRONG_SCORE_LABEL};
use crate::dif::stratum::{validate_observation, Group, StratumTable};
use crate::error::{DifError, Result};
use crate::inference::{chi2_sf, confidence_interval_z};

/// Continuity correction subtracted from |Σ(a - E)| when enabled.
pub const CONTINUITY_CORRECTION: f64 = 0.5;

// =============================================================================
// Configuration
// =============================================================================

/// Options for the CMH statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmhConfig {
    /// Subtract 0.5 from |Σ(a - E)| before squaring.
    /// Default: false (SAS PROC FREQ parity)
    pub continuity_correction: bool,

    /// Confidence level for the common odds ratio interval.
    /// Default: 0.95
    pub confidence_level: f64,

    /// Level at which the chi-square test counts as significant for the
    /// ETS classification.
    /// Default: 0.05
    pub significance_level: f64,
}

impl Default for CmhConfig {
    fn default() -> Self {
        Self {
            continuity_correction: false,
            confidence_level: 0.95,
            significance_level: crate::dif::ets::ETS_SIGNIFICANCE_LEVEL,
        }
    }
}

impl CmhConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(DifError::InvalidInput(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(DifError::InvalidInput(format!(
                "significance_level must be in (0, 1), got {}",
                self.significance_level
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Summary
// =============================================================================

/// Every CMH statistic for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmhSummary {
    pub item: String,
    pub chi_square: f64,
    pub p_value: f64,
    pub common_odds_ratio: f64,
    /// (lower, upper) for the common odds ratio
    pub confidence_interval: (f64, f64),
    /// MH D-DIF, -2.35 ln(alpha_MH)
    pub mh_delta: f64,
    pub mh_delta_standard_error: f64,
    /// (lower, upper) for MH D-DIF
    pub delta_interval: (f64, f64),
    pub classification: EtsClassification,
    pub focal_size: f64,
    pub reference_size: f64,
    pub n_strata: usize,
    /// Strata with n > 1, the ones that enter the chi-square.
    pub n_informative_strata: usize,
}

// =============================================================================
// Pooled sums (one pass over the strata)
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct PooledSums {
    // chi-square
    observed: f64,
    expected: f64,
    variance: f64,
    informative: usize,
    // odds ratio, RBG notation
    r: f64,
    s: f64,
    pr: f64,
    ps_qr: f64,
    qs: f64,
    // sizes
    focal: f64,
    reference: f64,
}

impl PooledSums {
    fn accumulate<'a>(tables: impl Iterator<Item = &'a StratumTable>) -> Self {
        let mut sums = PooledSums::default();

        for t in tables {
            let (a, b, c, d) = (
                t.focal_right(),
                t.focal_wrong(),
                t.reference_right(),
                t.reference_wrong(),
            );
            let n = t.total();

            sums.focal += a + b;
            sums.reference += c + d;

            if n > 1.0 {
                sums.observed += a;
                sums.expected += (a + b) * (a + c) / n;
                sums.variance += (a + b) * (c + d) * (a + c) * (b + d) / (n * n * (n - 1.0));
                sums.informative += 1;
            }

            if n > 0.0 {
                let p = (c + b) / n;
                let q = (d + a) / n;
                let r = c * b / n;
                let s = d * a / n;
                sums.r += r;
                sums.s += s;
                sums.pr += p * r;
                sums.ps_qr += p * s + q * r;
                sums.qs += q * s;
            }
        }

        sums
    }

    fn chi_square(&self, continuity_correction: bool) -> Result<f64> {
        if !(self.variance > 0.0) {
            return Err(DifError::InsufficientData(
                "no stratum with n > 1 and nonzero variance".to_string(),
            ));
        }
        let correction = if continuity_correction {
            CONTINUITY_CORRECTION
        } else {
            0.0
        };
        let numerator = ((self.observed - self.expected).abs() - correction).max(0.0);
        Ok(numerator * numerator / self.variance)
    }

    fn odds_ratio(&self) -> Result<f64> {
        if !(self.s > 0.0) {
            return Err(DifError::InsufficientData(
                "common odds ratio denominator is zero".to_string(),
            ));
        }
        Ok(self.r / self.s)
    }

    fn log_odds_ratio_variance(&self) -> Result<f64> {
        if !(self.r > 0.0 && self.s > 0.0) {
            return Err(DifError::InsufficientData(
                "odds ratio variance needs nonzero concordant and discordant sums".to_string(),
            ));
        }
        Ok(self.pr / (2.0 * self.r * self.r)
            + self.ps_qr / (2.0 * self.r * self.s)
            + self.qs / (2.0 * self.s * self.s))
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Stratified 2×2 accumulator and CMH statistics for one item.
///
/// Strata are keyed by `K` (typically an integer matching score) and kept in
/// first-seen order, which fixes the export order.
#[derive(Debug, Clone)]
pub struct CmhEngine<K = i64> {
    item_id: String,
    focal_label: String,
    reference_label: String,
    config: CmhConfig,
    strata: IndexMap<K, StratumTable>,
}

impl<K> CmhEngine<K>
where
    K: Eq + Hash + Clone,
{
    /// Create an engine for one item.
    ///
    /// Fails with `InvalidInput` if the two group labels are equal or the
    /// config is out of range.
    pub fn new(
        item_id: impl Into<String>,
        focal_label: impl Into<String>,
        reference_label: impl Into<String>,
        config: CmhConfig,
    ) -> Result<Self> {
        let focal_label = focal_label.into();
        let reference_label = reference_label.into();
        if focal_label == reference_label {
            return Err(DifError::InvalidInput(format!(
                "focal and reference labels must differ, both are '{}'",
                focal_label
            )));
        }
        config.validate()?;

        Ok(Self {
            item_id: item_id.into(),
            focal_label,
            reference_label,
            config,
            strata: IndexMap::new(),
        })
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn focal_label(&self) -> &str {
        &self.focal_label
    }

    pub fn reference_label(&self) -> &str {
        &self.reference_label
    }

    pub fn config(&self) -> &CmhConfig {
        &self.config
    }

    /// Map a group label to focal or reference.
    pub fn resolve_group(&self, group: &str) -> Result<Group> {
        if group == self.focal_label {
            Ok(Group::Focal)
        } else if group == self.reference_label {
            Ok(Group::Reference)
        } else {
            Err(DifError::UnknownGroup {
                group: group.to_string(),
                focal: self.focal_label.clone(),
                reference: self.reference_label.clone(),
            })
        }
    }

    /// Add one weighted observation.
    ///
    /// The stratum table is created on first sight of `stratum`. A rejected
    /// increment leaves the engine unchanged (no empty stratum is created).
    pub fn increment(
        &mut self,
        stratum: K,
        group: &str,
        item_score: f64,
        frequency: f64,
    ) -> Result<()> {
        let group = self.resolve_group(group)?;
        self.increment_group(stratum, group, item_score, frequency)
    }

    /// `increment` with the group already resolved.
    pub fn increment_group(
        &mut self,
        stratum: K,
        group: Group,
        item_score: f64,
        frequency: f64,
    ) -> Result<()> {
        validate_observation(item_score, frequency)?;

        let n_strata = self.strata.len();
        let item_id = &self.item_id;
        self.strata
            .entry(stratum)
            .or_insert_with(|| {
                trace!(target: "difstats::cmh", item = %item_id, index = n_strata, "new stratum");
                StratumTable::new()
            })
            .increment(group, item_score, frequency)
    }

    /// Copy of one stratum's table.
    pub fn stratum(&self, key: &K) -> Option<StratumTable> {
        self.strata.get(key).copied()
    }

    /// Strata in first-seen order, as snapshots.
    pub fn strata(&self) -> impl Iterator<Item = (&K, StratumTable)> + '_ {
        self.strata.iter().map(|(k, t)| (k, *t))
    }

    pub fn n_strata(&self) -> usize {
        self.strata.len()
    }

    /// Drop every stratum. Labels and config are kept.
    pub fn reset(&mut self) {
        self.strata.clear();
    }

    fn pooled(&self) -> PooledSums {
        let sums = PooledSums::accumulate(self.strata.values());
        let skipped = self.strata.len() - sums.informative;
        if skipped > 0 {
            debug!(
                target: "difstats::cmh",
                item = %self.item_id,
                skipped,
                "strata with n <= 1 excluded from chi-square"
            );
        }
        sums
    }

    // -------------------------------------------------------------------------
    // Sizes
    // -------------------------------------------------------------------------

    pub fn total_focal_size(&self) -> f64 {
        self.strata.values().map(StratumTable::focal_total).sum()
    }

    pub fn total_reference_size(&self) -> f64 {
        self.strata.values().map(StratumTable::reference_total).sum()
    }

    // -------------------------------------------------------------------------
    // Statistics
    // -------------------------------------------------------------------------

    /// CMH chi-square statistic with 1 degree of freedom.
    ///
    /// Fails with `InsufficientData` when no stratum contributes variance.
    pub fn cochran_mantel_haenszel(&self) -> Result<f64> {
        self.pooled()
            .chi_square(self.config.continuity_correction)
            .map_err(|e| {
                warn!(target: "difstats::cmh", item = %self.item_id, error = %e, "chi-square undefined");
                e
            })
    }

    /// Upper-tail χ²(1) probability of the CMH statistic.
    pub fn p_value(&self) -> Result<f64> {
        let chi_square = self.cochran_mantel_haenszel()?;
        Ok(chi2_sf(chi_square, 1.0))
    }

    /// Mantel-Haenszel common odds ratio (reference odds over focal odds).
    pub fn common_odds_ratio(&self) -> Result<f64> {
        self.pooled().odds_ratio()
    }

    /// Wald interval for `odds_ratio` on the log scale using the RBG variance
    /// of this engine's tables.
    pub fn common_odds_ratio_confidence_interval(&self, odds_ratio: f64) -> Result<(f64, f64)> {
        if !(odds_ratio.is_finite() && odds_ratio > 0.0) {
            return Err(DifError::InvalidInput(format!(
                "odds ratio must be finite and positive, got {}",
                odds_ratio
            )));
        }
        let variance = self.pooled().log_odds_ratio_variance()?;
        Ok(self.odds_ratio_interval(odds_ratio, variance))
    }

    fn odds_ratio_interval(&self, odds_ratio: f64, log_variance: f64) -> (f64, f64) {
        let (lower, upper) = confidence_interval_z(
            odds_ratio.ln(),
            log_variance.sqrt(),
            self.config.confidence_level,
        );
        (lower.exp(), upper.exp())
    }

    /// MH D-DIF on the ETS delta metric, -2.35 ln(alpha_MH).
    pub fn mh_delta(&self) -> Result<f64> {
        Ok(odds_ratio_to_delta(self.common_odds_ratio()?))
    }

    /// Standard error of MH D-DIF, 2.35 × sqrt(Var(ln alpha_MH)).
    pub fn mh_delta_standard_error(&self) -> Result<f64> {
        Ok(DELTA_SCALE * self.pooled().log_odds_ratio_variance()?.sqrt())
    }

    /// ETS A/B/C classification with direction.
    pub fn ets_classification(&self) -> Result<EtsClassification> {
        Ok(self.summary()?.classification)
    }

    /// All statistics from one pass over the strata.
    pub fn summary(&self) -> Result<CmhSummary> {
        let sums = self.pooled();

        let chi_square = sums.chi_square(self.config.continuity_correction)?;
        let p_value = chi2_sf(chi_square, 1.0);
        let common_odds_ratio = sums.odds_ratio()?;
        let log_variance = sums.log_odds_ratio_variance()?;

        let confidence_interval = self.odds_ratio_interval(common_odds_ratio, log_variance);
        let mh_delta = odds_ratio_to_delta(common_odds_ratio);
        // the map to delta is decreasing, so the bounds swap
        let delta_interval = (
            odds_ratio_to_delta(confidence_interval.1),
            odds_ratio_to_delta(confidence_interval.0),
        );
        let classification = classify_ets(
            mh_delta,
            delta_interval,
            p_value,
            self.config.significance_level,
        );

        debug!(
            target: "difstats::cmh",
            item = %self.item_id,
            chi_square,
            p_value,
            common_odds_ratio,
            class = %classification,
            "CMH summary"
        );

        Ok(CmhSummary {
            item: self.item_id.clone(),
            chi_square,
            p_value,
            common_odds_ratio,
            confidence_interval,
            mh_delta,
            mh_delta_standard_error: DELTA_SCALE * log_variance.sqrt(),
            delta_interval,
            classification,
            focal_size: sums.focal,
            reference_size: sums.reference,
            n_strata: self.strata.len(),
            n_informative_strata: sums.informative,
        })
    }
}

// =============================================================================
// Export / replay
// =============================================================================

impl<K> CmhEngine<K>
where
    K: Eq + Hash + Clone + Display,
{
    /// Four records per stratum, in first-seen stratum order and the cell
    /// order focal-right, focal-wrong, reference-right, reference-wrong.
    /// Zero cells are included.
    pub fn frequency_tables(&self) -> Vec<FrequencyRecord> {
        let mut records = Vec::with_capacity(self.strata.len() * 4);

        for (key, table) in &self.strata {
            let stratum = key.to_string();
            for (group, label) in [
                (Group::Focal, &self.focal_label),
                (Group::Reference, &self.reference_label),
            ] {
                for right in [true, false] {
                    records.push(FrequencyRecord {
                        item: self.item_id.clone(),
                        group: label.clone(),
                        stratum: stratum.clone(),
                        score: (if right { RIGHT_SCORE_LABEL } else { WRONG_SCORE_LABEL })
                            .to_string(),
                        frequency: table.cell(group, right).to_string(),
                    });
                }
            }
        }

        records
    }
}

impl<K> CmhEngine<K>
where
    K: Eq + Hash + Clone + FromStr,
{
    /// Rebuild an engine from exported records.
    pub fn from_frequency_records<'a>(
        item_id: impl Into<String>,
        focal_label: impl Into<String>,
        reference_label: impl Into<String>,
        config: CmhConfig,
        records: impl IntoIterator<Item = &'a FrequencyRecord>,
    ) -> Result<Self> {
        let mut engine = Self::new(item_id, focal_label, reference_label, config)?;
        engine.replay_frequency_records(records)?;
        Ok(engine)
    }

    /// Increment this engine with every record.
    ///
    /// All records are parsed and checked before any is applied, so a bad
    /// record leaves the engine unchanged.
    pub fn replay_frequency_records<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a FrequencyRecord>,
    ) -> Result<()> {
        let mut parsed = Vec::new();

        for (row, record) in records.into_iter().enumerate() {
            if record.item != self.item_id {
                return Err(DifError::InvalidRecord(format!(
                    "row {}: item '{}' does not match engine item '{}'",
                    row, record.item, self.item_id
                )));
            }
            let group = self.resolve_group(&record.group)?;
            let stratum = record.stratum.parse::<K>().map_err(|_| {
                DifError::InvalidRecord(format!(
                    "row {}: stratum '{}' cannot be parsed",
                    row, record.stratum
                ))
            })?;
            let score = record.parse_score()?;
            let frequency = record.parse_frequency()?;
            validate_observation(score, frequency)?;
            parsed.push((stratum, group, score, frequency));
        }

        debug!(
            target: "difstats::cmh",
            item = %self.item_id,
            records = parsed.len(),
            "replaying frequency records"
        );

        for (stratum, group, score, frequency) in parsed {
            self.increment_group(stratum, group, score, frequency)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
