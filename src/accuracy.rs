use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::AccuracyReport;
use crate::stats::round_to;

/// Error metrics between observed and predicted grades.
///
/// MAPE skips terms whose actual value is exactly zero and reports how many
/// were skipped; it is `None` when no term remains.
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> AnalyticsResult<AccuracyReport> {
    if actual.len() != predicted.len() {
        return Err(AnalyticsError::LengthMismatch {
            actual: actual.len(),
            predicted: predicted.len(),
        });
    }
    if actual.is_empty() {
        return Err(AnalyticsError::EmptySeries);
    }

    let n = actual.len() as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;
    let mut pct_terms = 0usize;

    for (a, p) in actual.iter().zip(predicted) {
        let err = a - p;
        abs_sum += err.abs();
        sq_sum += err * err;
        if *a != 0.0 {
            pct_sum += (err / a).abs();
            pct_terms += 1;
        }
    }

    let mse = sq_sum / n;
    Ok(AccuracyReport {
        mean_absolute_error: abs_sum / n,
        mean_squared_error: mse,
        root_mean_squared_error: mse.sqrt(),
        mean_absolute_percentage_error: (pct_terms > 0)
            .then(|| pct_sum / pct_terms as f64 * 100.0),
        zero_actuals_skipped: actual.len() - pct_terms,
    })
}

impl AccuracyReport {
    pub fn rounded(&self) -> AccuracyReport {
        AccuracyReport {
            mean_absolute_error: round_to(self.mean_absolute_error, 2),
            mean_squared_error: round_to(self.mean_squared_error, 2),
            root_mean_squared_error: round_to(self.root_mean_squared_error, 2),
            mean_absolute_percentage_error: self
                .mean_absolute_percentage_error
                .map(|v| round_to(v, 2)),
            zero_actuals_skipped: self.zero_actuals_skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sequences_have_zero_error() {
        let report = evaluate(&[90.0, 80.0], &[90.0, 80.0]).unwrap();
        assert_eq!(report.mean_absolute_error, 0.0);
        assert_eq!(report.mean_squared_error, 0.0);
        assert_eq!(report.root_mean_squared_error, 0.0);
        assert_eq!(report.mean_absolute_percentage_error, Some(0.0));
        assert_eq!(report.zero_actuals_skipped, 0);
    }

    #[test]
    fn computes_each_metric() {
        let report = evaluate(&[80.0, 50.0], &[90.0, 40.0]).unwrap();
        assert!((report.mean_absolute_error - 10.0).abs() < 1e-12);
        assert!((report.mean_squared_error - 100.0).abs() < 1e-12);
        assert!((report.root_mean_squared_error - 10.0).abs() < 1e-12);
        // (10/80 + 10/50) / 2 * 100
        let mape = report.mean_absolute_percentage_error.unwrap();
        assert!((mape - 16.25).abs() < 1e-9);
    }

    #[test]
    fn zero_actuals_are_skipped_in_mape() {
        let report = evaluate(&[0.0, 50.0], &[5.0, 45.0]).unwrap();
        assert_eq!(report.zero_actuals_skipped, 1);
        assert!((report.mean_absolute_percentage_error.unwrap() - 10.0).abs() < 1e-9);
        assert!((report.mean_absolute_error - 5.0).abs() < 1e-12);

        let all_zero = evaluate(&[0.0, 0.0], &[1.0, 2.0]).unwrap();
        assert_eq!(all_zero.mean_absolute_percentage_error, None);
        assert_eq!(all_zero.zero_actuals_skipped, 2);
    }

    #[test]
    fn rejects_mismatched_or_empty_input() {
        assert_eq!(
            evaluate(&[90.0, 80.0], &[90.0]),
            Err(AnalyticsError::LengthMismatch {
                actual: 2,
                predicted: 1
            })
        );
        assert_eq!(evaluate(&[], &[]), Err(AnalyticsError::EmptySeries));
    }

    #[test]
    fn rounded_report_keeps_two_places() {
        let report = evaluate(&[3.0], &[1.0 / 3.0]).unwrap().rounded();
        assert_eq!(report.mean_absolute_error, 2.67);
        assert_eq!(report.mean_absolute_percentage_error, Some(88.89));

        // |80 - 80.25| and |80 - 80.0| average to an exact binary half
        let tied = evaluate(&[80.0, 80.0], &[80.25, 80.0]).unwrap().rounded();
        assert_eq!(tied.mean_absolute_error, 0.12);
    }
}
