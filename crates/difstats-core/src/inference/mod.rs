// =============================================================================
// Statistical Inference
// =============================================================================
//
// Distribution helpers used by the DIF statistics:
//   - Upper-tail chi-square probabilities (p-values for the CMH test)
//   - Normal critical values and Wald confidence intervals
//
// NUMERICAL NOTE:
// ---------------
// A CMH statistic of ~200 has a p-value around 1e-46. Computing it as
// `1 - cdf(x)` returns exactly 0.0 once the CDF rounds to 1, so p-values are
// taken from the survival function, which statrs evaluates through the
// regularized upper incomplete gamma function Q(k/2, x/2) and keeps full
// relative precision far into the tail.
//
// =============================================================================

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

// =============================================================================
// P-Value Calculation
// =============================================================================

/// Upper-tail probability P(X >= x) where X ~ χ²(df).
///
/// Returns NaN for a non-finite or negative statistic, or a non-positive df.
/// A statistic of exactly zero gives p = 1.
pub fn chi2_sf(x: f64, df: f64) -> f64 {
    if !x.is_finite() || x < 0.0 || !(df > 0.0) {
        return f64::NAN;
    }

    let chi2 = match ChiSquared::new(df) {
        Ok(d) => d,
        Err(_) => return f64::NAN,
    };

    chi2.sf(x)
}

/// Two-sided normal critical value for a confidence level.
///
/// `z_critical(0.95)` is 1.959963984540054.
pub fn z_critical(confidence: f64) -> f64 {
    if !(confidence > 0.0 && confidence < 1.0) {
        return f64::NAN;
    }

    let normal = match Normal::new(0.0, 1.0) {
        Ok(d) => d,
        Err(_) => return f64::NAN,
    };

    let alpha = 1.0 - confidence;
    normal.inverse_cdf(1.0 - alpha / 2.0)
}

// =============================================================================
// Confidence Intervals
// =============================================================================

/// Wald confidence interval using the z-distribution.
///
/// # Arguments
/// * `estimate` - Point estimate (on the scale where it is ~normal, e.g. ln OR)
/// * `std_error` - Standard error of the estimate
/// * `confidence` - Confidence level (e.g., 0.95 for 95% CI)
///
/// # Returns
/// (lower_bound, upper_bound), or (NaN, NaN) when the inputs are unusable.
///
/// For a log-scale estimate, exp() of both bounds gives the interval on the
/// ratio scale.
pub fn confidence_interval_z(estimate: f64, std_error: f64, confidence: f64) -> (f64, f64) {
    if !estimate.is_finite() || !std_error.is_finite() || std_error < 0.0 {
        return (f64::NAN, f64::NAN);
    }

    let margin = z_critical(confidence) * std_error;
    (estimate - margin, estimate + margin)
}

// =============================================================================
// Tests
// =============================================================================
