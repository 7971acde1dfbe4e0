//! Least-squares grade forecasting over an ordered history.
//!
//! Position in the history is the time index `0..n`. A horizon of `h`
//! predicts index `n + h - 1`, so `h = 1` is the period right after the last
//! observation. Predictions are clamped into `[0, 100]`.

use std::collections::BTreeMap;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{Confidence, Forecast, PolynomialForecast, Trend};
use crate::stats::round_to;

pub const TREND_SLOPE_THRESHOLD: f64 = 0.5;
pub const HIGH_CONFIDENCE_R2: f64 = 0.7;
pub const MEDIUM_CONFIDENCE_R2: f64 = 0.4;

const MIN_GRADE: f64 = 0.0;
const MAX_GRADE: f64 = 100.0;

/// Normalized pivots below this are treated as rank deficiency.
const SINGULAR_PIVOT: f64 = 1e-10;

impl Trend {
    pub fn from_slope(slope: f64) -> Trend {
        if slope > TREND_SLOPE_THRESHOLD {
            Trend::Improving
        } else if slope < -TREND_SLOPE_THRESHOLD {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}

impl Confidence {
    pub fn from_r_squared(r_squared: f64) -> Confidence {
        if r_squared > HIGH_CONFIDENCE_R2 {
            Confidence::High
        } else if r_squared > MEDIUM_CONFIDENCE_R2 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl Forecast {
    /// Rounding used at the request boundary: grade and intercept to 2
    /// places, slope and R² to 4.
    pub fn rounded(&self) -> Forecast {
        Forecast {
            predicted_grade: round_to(self.predicted_grade, 2),
            slope: round_to(self.slope, 4),
            intercept: round_to(self.intercept, 2),
            r_squared: round_to(self.r_squared, 4),
            ..self.clone()
        }
    }
}

impl PolynomialForecast {
    pub fn rounded(&self) -> PolynomialForecast {
        PolynomialForecast {
            predicted_grade: round_to(self.predicted_grade, 2),
            coefficients: self.coefficients.iter().map(|c| round_to(*c, 4)).collect(),
            r_squared: round_to(self.r_squared, 4),
            ..self.clone()
        }
    }
}

fn check_horizon(horizon: usize) -> AnalyticsResult<()> {
    if horizon == 0 {
        return Err(AnalyticsError::InvalidArgument(
            "forecast horizon must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Zero-based x of the forecast point, computed in `f64` so no horizon overflows.
fn target_index(len: usize, horizon: usize) -> f64 {
    len as f64 + horizon as f64 - 1.0
}

/// `1 - SS_res / SS_tot`, defined as `0` when every observation is identical.
pub fn r_squared(history: &[f64], fitted: impl Fn(f64) -> f64) -> f64 {
    let Some(first) = history.first() else {
        return 0.0;
    };
    if history.iter().all(|v| v == first) {
        return 0.0;
    }
    let y_mean = history.iter().sum::<f64>() / history.len() as f64;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, y) in history.iter().enumerate() {
        ss_res += (y - fitted(i as f64)).powi(2);
        ss_tot += (y - y_mean).powi(2);
    }
    if ss_tot == 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

/// Linear trend forecast. Needs at least two points.
pub fn linear(history: &[f64], horizon: usize) -> AnalyticsResult<Forecast> {
    check_horizon(horizon)?;
    if history.len() < 2 {
        return Err(AnalyticsError::InsufficientData {
            needed: 2,
            got: history.len(),
        });
    }

    let n = history.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = history.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in history.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    let predicted =
        (slope * target_index(history.len(), horizon) + intercept).clamp(MIN_GRADE, MAX_GRADE);
    let r_squared = r_squared(history, |x| slope * x + intercept);

    Ok(Forecast {
        predicted_grade: predicted,
        slope,
        intercept,
        r_squared,
        trend: Trend::from_slope(slope),
        confidence: Confidence::from_r_squared(r_squared),
        periods_predicted: horizon,
    })
}

/// Polynomial trend forecast of the given degree. Needs `degree + 1` points.
pub fn polynomial(
    history: &[f64],
    degree: usize,
    horizon: usize,
) -> AnalyticsResult<PolynomialForecast> {
    check_horizon(horizon)?;
    if degree == 0 {
        return Err(AnalyticsError::InvalidArgument(
            "polynomial degree must be at least 1".to_string(),
        ));
    }
    if history.len() < degree + 1 {
        return Err(AnalyticsError::InsufficientForDegree {
            needed: degree + 1,
            degree,
            got: history.len(),
        });
    }

    let coefficients = fit_polynomial(history, degree)?;
    let predicted = evaluate_polynomial(&coefficients, target_index(history.len(), horizon))
        .clamp(MIN_GRADE, MAX_GRADE);
    let r_squared = r_squared(history, |x| evaluate_polynomial(&coefficients, x));

    Ok(PolynomialForecast {
        predicted_grade: predicted,
        degree,
        coefficients,
        r_squared,
        confidence: Confidence::from_r_squared(r_squared),
        periods_predicted: horizon,
    })
}

/// Forecasts each named series independently with [`linear`]. Series with
/// fewer than two points are left out of the result.
pub fn forecast_components<'a, I>(
    series: I,
    horizon: usize,
) -> AnalyticsResult<BTreeMap<String, f64>>
where
    I: IntoIterator<Item = (&'a str, &'a [f64])>,
{
    check_horizon(horizon)?;
    let mut predictions = BTreeMap::new();
    for (name, values) in series {
        if values.len() < 2 {
            continue;
        }
        let forecast = linear(values, horizon)?;
        predictions.insert(name.to_string(), forecast.predicted_grade);
    }
    Ok(predictions)
}

/// Horner evaluation; `coefficients[k]` multiplies `x^k`.
pub fn evaluate_polynomial(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Least squares on the Vandermonde design via Householder QR with
/// column scaling.
fn fit_polynomial(history: &[f64], degree: usize) -> AnalyticsResult<Vec<f64>> {
    let rows = history.len();
    let cols = degree + 1;

    let mut a = vec![0.0; rows * cols];
    for i in 0..rows {
        let mut power = 1.0;
        for j in 0..cols {
            a[i * cols + j] = power;
            power *= i as f64;
        }
    }

    let mut scale = vec![0.0; cols];
    for (j, s) in scale.iter_mut().enumerate() {
        *s = (0..rows).map(|i| a[i * cols + j].powi(2)).sum::<f64>().sqrt();
        if *s == 0.0 {
            return Err(AnalyticsError::SingularFit { degree });
        }
        for i in 0..rows {
            a[i * cols + j] /= *s;
        }
    }

    let mut b = history.to_vec();

    for k in 0..cols {
        let norm = (k..rows).map(|i| a[i * cols + k].powi(2)).sum::<f64>().sqrt();
        if norm < SINGULAR_PIVOT {
            return Err(AnalyticsError::SingularFit { degree });
        }
        let alpha = if a[k * cols + k] > 0.0 { -norm } else { norm };

        let mut v: Vec<f64> = (k..rows).map(|i| a[i * cols + k]).collect();
        v[0] -= alpha;
        let v_norm_sq: f64 = v.iter().map(|x| x * x).sum();

        for j in k..cols {
            let dot: f64 = (k..rows).map(|i| v[i - k] * a[i * cols + j]).sum();
            let factor = 2.0 * dot / v_norm_sq;
            for i in k..rows {
                a[i * cols + j] -= factor * v[i - k];
            }
        }
        let dot: f64 = (k..rows).map(|i| v[i - k] * b[i]).sum();
        let factor = 2.0 * dot / v_norm_sq;
        for i in k..rows {
            b[i] -= factor * v[i - k];
        }
    }

    let mut z = vec![0.0; cols];
    for k in (0..cols).rev() {
        let pivot = a[k * cols + k];
        if pivot.abs() < SINGULAR_PIVOT {
            return Err(AnalyticsError::SingularFit { degree });
        }
        let tail: f64 = (k + 1..cols).map(|j| a[k * cols + j] * z[j]).sum();
        z[k] = (b[k] - tail) / pivot;
    }

    Ok(z.iter().zip(&scale).map(|(zk, s)| zk / s).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn recovers_perfect_line() {
        let f = linear(&[10.0, 20.0, 30.0, 40.0], 1).unwrap();
        assert!(close(f.slope, 10.0, 1e-9));
        assert!(close(f.intercept, 10.0, 1e-9));
        assert!(close(f.r_squared, 1.0, 1e-9));
        assert!(close(f.predicted_grade, 50.0, 1e-9));
        assert_eq!(f.trend, Trend::Improving);
        assert_eq!(f.confidence, Confidence::High);
    }

    #[test]
    fn constant_history_is_stable_with_zero_r_squared() {
        let f = linear(&[50.0, 50.0, 50.0, 50.0], 1).unwrap();
        assert!(close(f.slope, 0.0, 1e-12));
        assert_eq!(f.r_squared, 0.0);
        assert_eq!(f.trend, Trend::Stable);
        assert_eq!(f.confidence, Confidence::Low);
        assert!(close(f.predicted_grade, 50.0, 1e-9));
    }

    #[test]
    fn horizon_extends_past_last_point() {
        let f = linear(&[10.0, 20.0, 30.0, 40.0], 3).unwrap();
        assert!(close(f.predicted_grade, 70.0, 1e-9));
        assert_eq!(f.periods_predicted, 3);
    }

    #[test]
    fn prediction_is_clamped() {
        let up = linear(&[80.0, 90.0, 100.0], 2).unwrap();
        assert_eq!(up.predicted_grade, 100.0);
        let down = linear(&[30.0, 15.0, 0.0], 1).unwrap();
        assert_eq!(down.predicted_grade, 0.0);
        assert_eq!(down.trend, Trend::Declining);
    }

    #[test]
    fn linear_rejects_short_history_and_zero_horizon() {
        assert_eq!(
            linear(&[88.0], 1),
            Err(AnalyticsError::InsufficientData { needed: 2, got: 1 })
        );
        assert_eq!(
            linear(&[], 1),
            Err(AnalyticsError::InsufficientData { needed: 2, got: 0 })
        );
        assert!(matches!(
            linear(&[1.0, 2.0], 0),
            Err(AnalyticsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn trend_and_confidence_thresholds() {
        assert_eq!(Trend::from_slope(0.5), Trend::Stable);
        assert_eq!(Trend::from_slope(0.51), Trend::Improving);
        assert_eq!(Trend::from_slope(-0.5), Trend::Stable);
        assert_eq!(Trend::from_slope(-0.51), Trend::Declining);
        assert_eq!(Confidence::from_r_squared(0.7), Confidence::Medium);
        assert_eq!(Confidence::from_r_squared(0.71), Confidence::High);
        assert_eq!(Confidence::from_r_squared(0.4), Confidence::Low);
        assert_eq!(Confidence::from_r_squared(0.41), Confidence::Medium);
    }

    #[test]
    fn noisy_history_has_partial_fit() {
        let f = linear(&[70.0, 78.0, 72.0, 80.0, 75.0], 1).unwrap();
        assert!(f.r_squared > 0.0 && f.r_squared < 1.0);
        assert!(close(f.slope, 1.2, 1e-9));
    }

    #[test]
    fn quadratic_fit_recovers_coefficients() {
        let history: Vec<f64> = (0..5).map(|x| (x * x + 2 * x + 3) as f64).collect();
        let f = polynomial(&history, 2, 1).unwrap();
        assert!(close(f.coefficients[0], 3.0, 1e-8));
        assert!(close(f.coefficients[1], 2.0, 1e-8));
        assert!(close(f.coefficients[2], 1.0, 1e-8));
        assert!(close(f.predicted_grade, 38.0, 1e-7));
        assert!(close(f.r_squared, 1.0, 1e-9));
        assert_eq!(f.confidence, Confidence::High);
    }

    #[test]
    fn degree_one_polynomial_matches_linear() {
        let history = [62.0, 71.0, 69.0, 77.0, 80.0];
        let line = linear(&history, 2).unwrap();
        let poly = polynomial(&history, 1, 2).unwrap();
        assert!(close(poly.coefficients[1], line.slope, 1e-9));
        assert!(close(poly.coefficients[0], line.intercept, 1e-9));
        assert!(close(poly.predicted_grade, line.predicted_grade, 1e-9));
        assert!(close(poly.r_squared, line.r_squared, 1e-9));
    }

    #[test]
    fn polynomial_requires_degree_plus_one_points() {
        assert_eq!(
            polynomial(&[80.0, 85.0], 2, 1),
            Err(AnalyticsError::InsufficientForDegree {
                needed: 3,
                degree: 2,
                got: 2
            })
        );
        assert!(matches!(
            polynomial(&[80.0, 85.0], 0, 1),
            Err(AnalyticsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn exact_interpolation_with_minimum_points() {
        let f = polynomial(&[60.0, 70.0, 90.0], 2, 1).unwrap();
        assert!(close(f.r_squared, 1.0, 1e-9));
        // y = 60 + 5x + 5x^2 reaches 120 at x = 3
        assert!(close(f.predicted_grade, 100.0, 1e-7));
    }

    #[test]
    fn components_skip_short_series() {
        let midterm = [70.0, 75.0, 80.0];
        let finals = [90.0];
        let quizzes: [f64; 0] = [];
        let predictions = forecast_components(
            [
                ("midterm", &midterm[..]),
                ("finals", &finals[..]),
                ("quizzes", &quizzes[..]),
            ],
            1,
        )
        .unwrap();
        assert_eq!(predictions.len(), 1);
        assert!(close(predictions["midterm"], 85.0, 1e-9));
    }

    #[test]
    fn rounding_matches_request_precision() {
        let f = linear(&[61.0, 64.0, 66.0], 1).unwrap().rounded();
        assert_eq!(f.slope, 2.5);
        assert_eq!(f.intercept, 61.17);
        assert_eq!(f.predicted_grade, 68.67);
        assert_eq!(f.r_squared, 0.9868);
    }

    #[test]
    fn very_long_horizon_saturates_at_bounds() {
        let rising = linear(&[60.0, 70.0], usize::MAX).unwrap();
        assert_eq!(rising.predicted_grade, 100.0);
        assert_eq!(rising.periods_predicted, usize::MAX);

        let falling = linear(&[70.0, 60.0], usize::MAX).unwrap();
        assert_eq!(falling.predicted_grade, 0.0);

        let curved = polynomial(&[60.0, 70.0, 85.0], 2, usize::MAX).unwrap();
        assert_eq!(curved.predicted_grade, 100.0);
    }
}
