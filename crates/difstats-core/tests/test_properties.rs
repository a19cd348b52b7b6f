//! Property-based tests for the Mantel-Haenszel engine.

use approx::relative_eq;
use proptest::prelude::*;

use difstats_core::{CmhConfig, CmhEngine};

const FOCAL: &str = "F";
const REFERENCE: &str = "R";

/// (stratum, is_focal, score, frequency)
type Obs = (i64, bool, f64, f64);

/// Strategy: one observation with an integer weight, so cell sums are exact.
fn obs_strategy() -> impl Strategy<Value = Obs> {
    (0..6i64, any::<bool>(), prop::sample::select(vec![0.0, 1.0]), 0..20u32)
        .prop_map(|(k, focal, score, freq)| (k, focal, score, freq as f64))
}

fn build(observations: &[Obs], swap: bool) -> CmhEngine<i64> {
    let (focal, reference) = if swap { (REFERENCE, FOCAL) } else { (FOCAL, REFERENCE) };
    let mut engine = CmhEngine::new("item", focal, reference, CmhConfig::default()).unwrap();
    for &(k, is_focal, score, freq) in observations {
        let group = if is_focal { FOCAL } else { REFERENCE };
        engine.increment(k, group, score, freq).unwrap();
    }
    engine
}

fn close(a: f64, b: f64) -> bool {
    relative_eq!(a, b, epsilon = 1e-12, max_relative = 1e-9)
}

proptest! {
    // 1. Sizes account for every unit of weight supplied
    #[test]
    fn sizes_conserve_total_weight(obs in prop::collection::vec(obs_strategy(), 0..60)) {
        let engine = build(&obs, false);
        let supplied: f64 = obs.iter().map(|o| o.3).sum();
        prop_assert_eq!(engine.total_focal_size() + engine.total_reference_size(), supplied);
    }

    // 2. Accumulation order does not matter
    #[test]
    fn order_invariance(
        obs in prop::collection::vec(obs_strategy(), 1..60),
        seed in any::<u64>(),
    ) {
        let mut shuffled = obs.clone();
        // deterministic Fisher-Yates driven by the seed
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            shuffled.swap(i, (state % (i as u64 + 1)) as usize);
        }

        let a = build(&obs, false);
        let b = build(&shuffled, false);

        for (k, table) in a.strata() {
            prop_assert_eq!(Some(table), b.stratum(k));
        }
        match (a.cochran_mantel_haenszel(), b.cochran_mantel_haenszel()) {
            (Ok(x), Ok(y)) => prop_assert!(close(x, y), "{} vs {}", x, y),
            (Err(x), Err(y)) => prop_assert_eq!(x, y),
            (x, y) => prop_assert!(false, "{:?} vs {:?}", x, y),
        }
        match (a.common_odds_ratio(), b.common_odds_ratio()) {
            (Ok(x), Ok(y)) => prop_assert!(close(x, y), "{} vs {}", x, y),
            (Err(x), Err(y)) => prop_assert_eq!(x, y),
            (x, y) => prop_assert!(false, "{:?} vs {:?}", x, y),
        }
    }

    // 3. Export then replay reproduces the statistics exactly
    #[test]
    fn round_trip(obs in prop::collection::vec(obs_strategy(), 0..60)) {
        let engine = build(&obs, false);
        let records = engine.frequency_tables();
        let rebuilt = CmhEngine::<i64>::from_frequency_records(
            "item", FOCAL, REFERENCE, CmhConfig::default(), &records,
        ).unwrap();

        prop_assert_eq!(rebuilt.n_strata(), engine.n_strata());
        prop_assert_eq!(rebuilt.summary(), engine.summary());
        prop_assert_eq!(rebuilt.cochran_mantel_haenszel(), engine.cochran_mantel_haenszel());
        prop_assert_eq!(rebuilt.common_odds_ratio(), engine.common_odds_ratio());
    }

    // 4. Swapping focal and reference inverts the odds ratio, keeps chi-square
    #[test]
    fn swap_symmetry(obs in prop::collection::vec(obs_strategy(), 1..60)) {
        let engine = build(&obs, false);
        let swapped = build(&obs, true);

        // the pooled variance is symmetric, so both sides succeed or fail together
        match (engine.cochran_mantel_haenszel(), swapped.cochran_mantel_haenszel()) {
            (Ok(x), Ok(y)) => prop_assert!(close(x, y), "{} vs {}", x, y),
            (Err(x), Err(y)) => prop_assert_eq!(x, y),
            (x, y) => prop_assert!(false, "{:?} vs {:?}", x, y),
        }
        // one-sided: the denominator of one orientation is the numerator of the other
        if let (Ok(or), Ok(or_swapped)) = (engine.common_odds_ratio(), swapped.common_odds_ratio()) {
            prop_assert!(close(or * or_swapped, 1.0), "{} × {}", or, or_swapped);
        }
    }

    // 5. The statistic is non-negative and the p-value is a probability
    #[test]
    fn chi_square_and_p_value_in_range(obs in prop::collection::vec(obs_strategy(), 1..60)) {
        let engine = build(&obs, false);
        if let Ok(chi) = engine.cochran_mantel_haenszel() {
            prop_assert!(chi >= 0.0);
            let p = engine.p_value().unwrap();
            prop_assert!((0.0..=1.0).contains(&p), "p = {}", p);
        }
    }

    // 6. The interval brackets the estimate
    #[test]
    fn interval_brackets_odds_ratio(obs in prop::collection::vec(obs_strategy(), 1..60)) {
        let engine = build(&obs, false);
        if let Ok(or) = engine.common_odds_ratio() {
            if let Ok((lower, upper)) = engine.common_odds_ratio_confidence_interval(or) {
                prop_assert!(lower <= or * (1.0 + 1e-12) && or <= upper * (1.0 + 1e-12));
            }
        }
    }
}
