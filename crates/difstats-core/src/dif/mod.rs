// =============================================================================
// Differential Item Functioning: Mantel-Haenszel
// =============================================================================
//
// An item shows DIF when examinees of equal ability but from different groups
// (focal vs reference) have different chances of answering it right. The
// Mantel-Haenszel procedure controls for ability by stratifying on a matching
// score and pooling one 2×2 table per stratum:
//
//   - stratum: the per-stratum 2×2 accumulator
//   - engine:  stratified aggregation, CMH chi-square, common odds ratio,
//              confidence interval, MH D-DIF
//   - ets:     ETS A/B/C severity classification
//   - export:  row-oriented frequency records for round-tripping
//
// =============================================================================

mod engine;
mod ets;
mod export;
mod stratum;

pub use engine::{CmhConfig, CmhEngine, CmhSummary, CONTINUITY_CORRECTION};
pub use ets::{
    classify_ets, odds_ratio_to_delta, DifDirection, EtsClassification, EtsLevel, DELTA_SCALE,
    ETS_B_THRESHOLD, ETS_C_THRESHOLD, ETS_SIGNIFICANCE_LEVEL,
};
pub use export::{FrequencyRecord, RIGHT_SCORE_LABEL, WRONG_SCORE_LABEL};
pub use stratum::{Group, StratumTable, RIGHT_SCORE};
