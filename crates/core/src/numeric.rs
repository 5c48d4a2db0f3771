//! Log-domain helpers

/// Stand-in for `ln(0)` on skipped or impossible components.
pub const LOG_ZERO: f64 = f64::NEG_INFINITY;

/// Largest argument that `exp` accepts without overflowing to infinity.
pub const MAX_EXP_ARG: f64 = 709.0;

/// `ln Σ exp(v)` computed around the maximum value.
///
/// Returns [`LOG_ZERO`] for an empty slice or when every value is `LOG_ZERO`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return LOG_ZERO;
    }
    if max.is_infinite() || max.is_nan() {
        return max;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sum_exp_matches_direct_sum() {
        let values = [0.1_f64.ln(), 0.2_f64.ln(), 0.7_f64.ln()];
        assert!((log_sum_exp(&values) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_log_sum_exp_handles_very_negative_values() {
        // Direct exponentiation underflows to zero here
        let values = [-2000.0, -2001.0];
        let expected = -2000.0 + (1.0 + (-1.0_f64).exp()).ln();
        assert!((log_sum_exp(&values) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_log_sum_exp_empty_and_all_zero() {
        assert_eq!(log_sum_exp(&[]), LOG_ZERO);
        assert_eq!(log_sum_exp(&[LOG_ZERO, LOG_ZERO]), LOG_ZERO);
        assert!((log_sum_exp(&[LOG_ZERO, -3.0]) + 3.0).abs() < 1e-12);
    }
}
