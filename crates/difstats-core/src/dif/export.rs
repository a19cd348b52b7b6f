// =============================================================================
// Frequency Table Export
// =============================================================================
//
// A flat, row-oriented view of an engine's strata. Each row is one cell of one
// stratum table:
//
//     (item id, group label, stratum key, item score, frequency)
//
// All fields are strings so the rows can be written anywhere (CSV, a database
// table, JSON) and parsed back by the consumer. Replaying every row through
// `CmhEngine::increment` rebuilds an engine with identical statistics.
//
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{DifError, Result};

/// Score written for a right-answer cell.
pub const RIGHT_SCORE_LABEL: &str = "1";

/// Score written for a wrong-answer cell.
pub const WRONG_SCORE_LABEL: &str = "0";

/// One exported cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyRecord {
    pub item: String,
    pub group: String,
    pub stratum: String,
    pub score: String,
    pub frequency: String,
}

impl FrequencyRecord {
    /// The record as an ordered 5-tuple of strings.
    pub fn into_tuple(self) -> (String, String, String, String, String) {
        (self.item, self.group, self.stratum, self.score, self.frequency)
    }

    pub fn from_tuple(row: (String, String, String, String, String)) -> Self {
        let (item, group, stratum, score, frequency) = row;
        Self {
            item,
            group,
            stratum,
            score,
            frequency,
        }
    }

    pub fn parse_score(&self) -> Result<f64> {
        self.score.trim().parse::<f64>().map_err(|_| {
            DifError::InvalidRecord(format!("score '{}' is not a number", self.score))
        })
    }

    pub fn parse_frequency(&self) -> Result<f64> {
        self.frequency.trim().parse::<f64>().map_err(|_| {
            DifError::InvalidRecord(format!("frequency '{}' is not a number", self.frequency))
        })
    }
}
