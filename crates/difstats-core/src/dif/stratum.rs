// =============================================================================
// Stratum Table: one 2×2 focal/reference × right/wrong table
// =============================================================================
//
// Within a stratum (e.g. one total-score band) every weighted response lands
// in exactly one of four cells:
//
//                     right            wrong
//     focal        focal_right      focal_wrong
//     reference    reference_right  reference_wrong
//
// Counts are weighted, so they are f64. They start at zero and only grow.
//
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{DifError, Result};

/// The two comparison groups, resolved from string labels once at the
/// engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Group {
    Focal,
    Reference,
}

/// Score value treated as a right answer. Anything else is wrong.
pub const RIGHT_SCORE: f64 = 1.0;

/// Accumulated weighted counts for one stratum.
///
/// `StratumTable` is `Copy`: any value handed out by the engine is a
/// snapshot, never a live view into the engine's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StratumTable {
    focal_right: f64,
    focal_wrong: f64,
    reference_right: f64,
    reference_wrong: f64,
}

impl StratumTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `frequency` to the cell selected by `group` and whether
    /// `item_score` is exactly 1.0.
    ///
    /// Fails with `InvalidInput` for a non-finite score or a negative or
    /// non-finite frequency; the table is left unchanged in that case.
    pub fn increment(&mut self, group: Group, item_score: f64, frequency: f64) -> Result<()> {
        validate_observation(item_score, frequency)?;

        let right = item_score == RIGHT_SCORE;
        let cell = match (group, right) {
            (Group::Focal, true) => &mut self.focal_right,
            (Group::Focal, false) => &mut self.focal_wrong,
            (Group::Reference, true) => &mut self.reference_right,
            (Group::Reference, false) => &mut self.reference_wrong,
        };
        *cell += frequency;
        Ok(())
    }

    pub fn focal_right(&self) -> f64 {
        self.focal_right
    }

    pub fn focal_wrong(&self) -> f64 {
        self.focal_wrong
    }

    pub fn reference_right(&self) -> f64 {
        self.reference_right
    }

    pub fn reference_wrong(&self) -> f64 {
        self.reference_wrong
    }

    pub fn focal_total(&self) -> f64 {
        self.focal_right + self.focal_wrong
    }

    pub fn reference_total(&self) -> f64 {
        self.reference_right + self.reference_wrong
    }

    /// Grand total n for this stratum.
    pub fn total(&self) -> f64 {
        self.focal_total() + self.reference_total()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0.0
    }

    /// Count for one (group, right/wrong) cell.
    pub fn cell(&self, group: Group, right: bool) -> f64 {
        match (group, right) {
            (Group::Focal, true) => self.focal_right,
            (Group::Focal, false) => self.focal_wrong,
            (Group::Reference, true) => self.reference_right,
            (Group::Reference, false) => self.reference_wrong,
        }
    }
}

/// Scores must be finite; frequencies finite and non-negative.
pub(crate) fn validate_observation(item_score: f64, frequency: f64) -> Result<()> {
    if !item_score.is_finite() {
        return Err(DifError::InvalidInput(format!(
            "item score must be finite, got {}",
            item_score
        )));
    }
    if !frequency.is_finite() || frequency < 0.0 {
        return Err(DifError::InvalidInput(format!(
            "frequency must be finite and non-negative, got {}",
            frequency
        )));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
