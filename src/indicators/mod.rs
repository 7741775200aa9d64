pub mod atr;
pub mod engine;

pub use atr::*;
pub use engine::*;

/// Applies a trailing-window statistic at every position of `values`.
///
/// `f` receives the prefix ending at the current position plus `period`
/// and reads only the last `period` values. Positions with fewer than
/// `period` values yield `None`.
pub fn rolling<F>(values: &[f64], period: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64], usize) -> Option<f64>,
{
    (0..values.len())
        .map(|i| f(&values[..=i], period))
        .collect()
}

/// Shifts a column `n` rows forward, as a lagged view of earlier values.
pub fn lag(values: &[Option<f64>], n: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| if i >= n { values[i - n] } else { None })
        .collect()
}

fn window(values: &[f64], period: usize) -> Option<&[f64]> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(&values[values.len() - period..])
}

pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    let w = window(values, period)?;
    Some(w.iter().sum::<f64>() / period as f64)
}

pub fn highest(values: &[f64], period: usize) -> Option<f64> {
    window(values, period)?
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

pub fn lowest(values: &[f64], period: usize) -> Option<f64> {
    window(values, period)?
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
}

/// Sample standard deviation (n - 1 denominator).
pub fn stddev(values: &[f64], period: usize) -> Option<f64> {
    if period < 2 {
        return None;
    }
    let w = window(values, period)?;
    let mean = sma(values, period)?;
    let variance = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
    Some(variance.sqrt())
}

/// Percentile rank (0-100) of the newest value within its trailing window.
///
/// Ties take the average of the ranks they span.
pub fn percentile_rank(values: &[f64], period: usize) -> Option<f64> {
    let w = window(values, period)?;
    let current = *w.last()?;
    let below = w.iter().filter(|v| **v < current).count() as f64;
    let equal = w.iter().filter(|v| **v == current).count() as f64;
    Some((below + (equal + 1.0) / 2.0) / period as f64 * 100.0)
}

/// `num / den`, or `None` when the quotient is not a finite number.
pub fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        return None;
    }
    let q = num / den;
    q.is_finite().then_some(q)
}

/// Percentage change from `base` to `value`.
pub fn pct_change(value: f64, base: f64) -> Option<f64> {
    ratio(value - base, base).map(|r| r * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_and_extrema_use_trailing_window() {
        let values = [1.0, 5.0, 3.0, 4.0, 2.0];
        assert_eq!(sma(&values, 3), Some(3.0));
        assert_eq!(highest(&values, 3), Some(4.0));
        assert_eq!(lowest(&values, 3), Some(2.0));
        assert_eq!(sma(&values, 6), None);
    }

    #[test]
    fn test_stddev_is_sample_estimator() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let sd = stddev(&values, 8).unwrap();
        assert!((sd - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(stddev(&[1.0], 1), None);
    }

    #[test]
    fn test_percentile_rank_of_newest_value() {
        assert_eq!(percentile_rank(&[1.0, 2.0, 3.0, 4.0], 4), Some(100.0));
        assert_eq!(percentile_rank(&[4.0, 3.0, 2.0, 1.0], 4), Some(25.0));
        // two-way tie at the top: average rank 3.5 of 4
        assert_eq!(percentile_rank(&[1.0, 4.0, 2.0, 4.0], 4), Some(87.5));
        // all equal: average rank (n + 1) / 2
        assert_eq!(percentile_rank(&[7.0; 5], 5), Some(60.0));
        assert_eq!(percentile_rank(&[1.0, 2.0], 3), None);
    }

    #[test]
    fn test_rolling_aligns_with_input() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let out = rolling(&values, 2, sma);
        assert_eq!(out, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
    }

    #[test]
    fn test_lag_shifts_forward() {
        let values = vec![Some(1.0), Some(2.0), Some(3.0)];
        assert_eq!(lag(&values, 2), vec![None, None, Some(1.0)]);
    }

    #[test]
    fn test_ratio_rejects_zero_denominator() {
        assert_eq!(ratio(1.0, 0.0), None);
        assert_eq!(ratio(0.0, 0.0), None);
        assert_eq!(ratio(3.0, 2.0), Some(1.5));
        assert_eq!(pct_change(110.0, 100.0).map(|v| v.round()), Some(10.0));
    }
}
