//! Descriptive statistics over aggregate sums.
//!
//! Every function here is total: a zero denominator yields `None`,
//! never a panic, never a silent `0.0`.

use serde::{Deserialize, Serialize};

/// `numerator / denominator × 100`, absent when the denominator is zero.
pub fn percentage(numerator: i64, denominator: i64) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    Some(numerator as f64 / denominator as f64 * 100.0)
}

/// Plain division, absent for a zero or non-finite denominator.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return None;
    }
    Some(numerator / denominator)
}

/// Population standard deviation `sqrt(E[X²] − (E[X])²)`.
///
/// When all values are equal, cancellation can leave the variance a few
/// ulps of `E[X²]` off zero, on either side. That residue clamps to `0.0`,
/// as does a negative variance no deeper than `epsilon`. Any other
/// positive variance is returned as is; anything more negative is absent.
pub fn population_std_dev(mean: f64, mean_of_squares: f64, epsilon: f64) -> Option<f64> {
    let variance = mean_of_squares - mean * mean;
    let rounding = 4.0 * f64::EPSILON * mean_of_squares.abs();
    if variance.abs() <= rounding || (variance < 0.0 && variance >= -epsilon) {
        return Some(0.0);
    }
    if variance > 0.0 {
        Some(variance.sqrt())
    } else {
        log::warn!("population variance {variance} below tolerance {epsilon}");
        None
    }
}

/// Raw sums feeding a population Pearson correlation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PairSums {
    pub n: i64,
    pub sum_x: f64,
    pub sum_y: f64,
    pub sum_xy: f64,
    pub sum_xx: f64,
    pub sum_yy: f64,
}

/// Pearson r from sum-of-products covariance over the full population.
/// Absent for fewer than two pairs or a zero-variance side.
pub fn pearson(s: &PairSums) -> Option<f64> {
    if s.n < 2 {
        return None;
    }
    let n = s.n as f64;
    let mean_x = s.sum_x / n;
    let mean_y = s.sum_y / n;
    let covariance = s.sum_xy / n - mean_x * mean_y;
    let var_x = s.sum_xx / n - mean_x * mean_x;
    let var_y = s.sum_yy / n - mean_y * mean_y;
    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    let r = covariance / (var_x * var_y).sqrt();
    // Rounding can push |r| a hair past 1.
    Some(r.clamp(-1.0, 1.0))
}

/// Trailing moving average. Positions with fewer than `window` values
/// behind them (inclusive) have no average.
pub fn trailing_moving_average(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i + 1 < window {
                None
            } else {
                let slice = &values[i + 1 - window..=i];
                Some(slice.iter().sum::<f64>() / window as f64)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn percentage_of_zero_denominator_is_absent() {
        assert_eq!(percentage(3, 0), None);
        assert!(close(percentage(2, 3).unwrap(), 66.666_666_666_666_67));
        assert_eq!(percentage(0, 5), Some(0.0));
    }

    #[test]
    fn ratio_guards_zero_denominator() {
        assert_eq!(ratio(10.0, 0.0), None);
        assert_eq!(ratio(f64::NAN, 2.0), None);
        assert_eq!(ratio(10.0, 4.0), Some(2.5));
    }

    #[test]
    fn std_dev_of_identical_values_is_zero() {
        // 0.1 is not representable; E[X²] − E[X]² lands a rounding error off zero.
        let values = [0.1_f64; 7];
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let mean_sq = values.iter().map(|v| v * v).sum::<f64>() / n;
        assert_eq!(population_std_dev(mean, mean_sq, 1e-9), Some(0.0));
    }

    #[test]
    fn std_dev_uses_population_formula() {
        // [80, 100, 120]: population variance = 800 / 3.
        let mean = 100.0;
        let mean_sq = (6400.0 + 10000.0 + 14400.0) / 3.0;
        let sd = population_std_dev(mean, mean_sq, 1e-9).unwrap();
        assert!(close(sd, (800.0_f64 / 3.0).sqrt()));
    }

    #[test]
    fn std_dev_keeps_small_spread_of_large_values() {
        // [1_000_000, 1_000_020]: variance 100 on E[X²] ≈ 1e12.
        let mean = 1_000_010.0;
        let mean_sq = (1_000_000.0_f64.powi(2) + 1_000_020.0_f64.powi(2)) / 2.0;
        let sd = population_std_dev(mean, mean_sq, 1e-9).unwrap();
        assert!((sd - 10.0).abs() < 1e-3, "sd = {sd}");
    }

    #[test]
    fn std_dev_beyond_tolerance_is_absent() {
        assert_eq!(population_std_dev(10.0, 50.0, 1e-9), None);
    }

    #[test]
    fn pearson_detects_perfect_linear_relation() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [10.0, 20.0, 30.0, 40.0];
        let mut sums = PairSums::default();
        for (x, y) in xs.iter().zip(ys.iter()) {
            sums.n += 1;
            sums.sum_x += x;
            sums.sum_y += y;
            sums.sum_xy += x * y;
            sums.sum_xx += x * x;
            sums.sum_yy += y * y;
        }
        assert!(close(pearson(&sums).unwrap(), 1.0));
    }

    #[test]
    fn pearson_needs_variance_on_both_sides() {
        let sums = PairSums {
            n: 3,
            sum_x: 6.0,
            sum_y: 15.0,
            sum_xy: 30.0,
            sum_xx: 14.0,
            sum_yy: 75.0,
        };
        // y is constant at 5.
        assert_eq!(pearson(&sums), None);
        assert_eq!(pearson(&PairSums { n: 1, ..sums }), None);
    }

    #[test]
    fn moving_average_leaves_warmup_absent() {
        let ma = trailing_moving_average(&[3.0, 6.0, 9.0, 12.0], 3);
        assert_eq!(ma, vec![None, None, Some(6.0), Some(9.0)]);
    }
}
