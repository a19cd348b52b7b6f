// =============================================================================
// ETS DIF Classification
// =============================================================================
//
// Educational Testing Service sorts items into three DIF tiers using the
// Mantel-Haenszel statistics:
//
//     delta = -2.35 × ln(alpha_MH)          ("MH D-DIF", ETS delta metric)
//
//   A  negligible:  MH chi-square not significant at 0.05, or |delta| < 1.0
//   C  large:       |delta| >= 1.5 and |delta| significantly greater than 1.0
//   B  moderate:    everything else
//
// A "+" suffix marks an item that favors the focal group (delta > 0), "-" one
// that favors the reference group (delta < 0).
//
// References:
//   Zieky, M. (1993). Practical questions in the use of DIF statistics in test
//     development. In Holland & Wainer (Eds.), Differential Item Functioning.
//   Dorans, N. J., & Holland, P. W. (1993). DIF detection and description:
//     Mantel-Haenszel and standardization. Same volume.
//
// ETS reports delta in tenths and applies the cut points to the reported
// value, so |delta| is rounded to one decimal before comparison.
//
// =============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DifError;

/// Multiplier mapping ln(alpha_MH) onto the ETS delta metric.
pub const DELTA_SCALE: f64 = 2.35;

/// Significance level of the MH chi-square test.
pub const ETS_SIGNIFICANCE_LEVEL: f64 = 0.05;

/// |delta| at or above which a significant item is at least B.
pub const ETS_B_THRESHOLD: f64 = 1.0;

/// |delta| at or above which a significant item may be C.
pub const ETS_C_THRESHOLD: f64 = 1.5;

/// Convert a common odds ratio to the ETS delta metric.
pub fn odds_ratio_to_delta(odds_ratio: f64) -> f64 {
    -DELTA_SCALE * odds_ratio.ln()
}

/// Round to tenths, the precision ETS reports delta in.
fn round_to_tenths(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EtsLevel {
    A,
    B,
    C,
}

/// Which group an item favors after matching on ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DifDirection {
    /// delta > 0, reported as "+".
    FavorsFocal,
    /// delta < 0, reported as "-".
    FavorsReference,
}

/// An ETS classification, one of `A, B+, B-, B, C+, C-, C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EtsClassification {
    pub level: EtsLevel,
    /// Always `None` for A.
    pub direction: Option<DifDirection>,
}

impl EtsClassification {
    pub const A: EtsClassification = EtsClassification {
        level: EtsLevel::A,
        direction: None,
    };

    /// Drop the direction, for reports that print only the tier.
    pub fn unsigned(self) -> Self {
        Self {
            level: self.level,
            direction: None,
        }
    }

    pub fn label(&self) -> &'static str {
        match (self.level, self.direction) {
            (EtsLevel::A, _) => "A",
            (EtsLevel::B, Some(DifDirection::FavorsFocal)) => "B+",
            (EtsLevel::B, Some(DifDirection::FavorsReference)) => "B-",
            (EtsLevel::B, None) => "B",
            (EtsLevel::C, Some(DifDirection::FavorsFocal)) => "C+",
            (EtsLevel::C, Some(DifDirection::FavorsReference)) => "C-",
            (EtsLevel::C, None) => "C",
        }
    }
}

impl fmt::Display for EtsClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EtsClassification {
    type Err = DifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (level, direction) = match s.trim() {
            "A" => (EtsLevel::A, None),
            "B+" => (EtsLevel::B, Some(DifDirection::FavorsFocal)),
            "B-" => (EtsLevel::B, Some(DifDirection::FavorsReference)),
            "B" => (EtsLevel::B, None),
            "C+" => (EtsLevel::C, Some(DifDirection::FavorsFocal)),
            "C-" => (EtsLevel::C, Some(DifDirection::FavorsReference)),
            "C" => (EtsLevel::C, None),
            other => {
                return Err(DifError::InvalidInput(format!(
                    "'{}' is not an ETS DIF classification",
                    other
                )))
            }
        };
        Ok(Self { level, direction })
    }
}

/// Classify an item from its MH statistics.
///
/// # Arguments
/// * `delta` - MH D-DIF, `-2.35 × ln(alpha_MH)`
/// * `delta_interval` - confidence interval for delta as (lower, upper)
/// * `p_value` - p-value of the MH chi-square test
/// * `significance_level` - usually `ETS_SIGNIFICANCE_LEVEL`
pub fn classify_ets(
    delta: f64,
    delta_interval: (f64, f64),
    p_value: f64,
    significance_level: f64,
) -> EtsClassification {
    let abs_delta = round_to_tenths(delta.abs());

    // NaN p-values and deltas fall through to A
    if !(p_value < significance_level) || !(abs_delta >= ETS_B_THRESHOLD) {
        return EtsClassification::A;
    }

    let direction = if delta > 0.0 {
        DifDirection::FavorsFocal
    } else {
        DifDirection::FavorsReference
    };

    // |delta| significantly above 1.0: the interval bound nearest zero is
    // itself beyond 1.0 on delta's side.
    let (lower, upper) = delta_interval;
    let beyond_b = match direction {
        DifDirection::FavorsFocal => lower > ETS_B_THRESHOLD,
        DifDirection::FavorsReference => upper < -ETS_B_THRESHOLD,
    };

    let level = if abs_delta >= ETS_C_THRESHOLD && beyond_b {
        EtsLevel::C
    } else {
        EtsLevel::B
    };

    EtsClassification {
        level,
        direction: Some(direction),
    }
}

// =============================================================================
// Tests
// =============================================================================
//
// One case per cut point, on both sides of zero.
// =============================================================================
