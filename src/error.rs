//! Engine error types and the JSON envelope handed to the request layer.
//!
//! Data-insufficiency conditions are ordinary values here, never panics. The
//! CLI and any other caller pattern-match on [`AnalyticsError`] or wrap a
//! result in an [`Envelope`] for output.

use serde::Serialize;
use thiserror::Error;

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Errors produced by the analytics engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyticsError {
    /// No grade records exist for the requested scope.
    #[error("no grades found for {scope}")]
    NoGrades { scope: String },

    /// No ordered history exists for a student/subject pair.
    #[error("no grade history found for student {student_id} in {subject}")]
    NoHistory { student_id: String, subject: String },

    /// Too few points for a linear fit.
    #[error("need at least {needed} grades for prediction, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Too few points for a polynomial of the requested degree.
    #[error("need at least {needed} points for degree-{degree} polynomial, got {got}")]
    InsufficientForDegree {
        needed: usize,
        degree: usize,
        got: usize,
    },

    #[error("grade lists must be same length (actual {actual}, predicted {predicted})")]
    LengthMismatch { actual: usize, predicted: usize },

    #[error("grade lists must not be empty")]
    EmptySeries,

    /// Malformed call, e.g. a zero horizon or zero degree.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The least-squares design matrix is numerically rank deficient.
    #[error("polynomial fit of degree {degree} is numerically singular")]
    SingularFit { degree: usize },
}

impl AnalyticsError {
    /// Stable machine-readable code for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyticsError::NoGrades { .. } => "no_grades",
            AnalyticsError::NoHistory { .. } => "no_history",
            AnalyticsError::InsufficientData { .. } => "insufficient_data",
            AnalyticsError::InsufficientForDegree { .. } => "insufficient_for_degree",
            AnalyticsError::LengthMismatch { .. } => "length_mismatch",
            AnalyticsError::EmptySeries => "empty_series",
            AnalyticsError::InvalidArgument(_) => "invalid_argument",
            AnalyticsError::SingularFit { .. } => "singular_fit",
        }
    }

    /// Returns `true` for expected conditions caused by missing or short data,
    /// as opposed to a malformed call.
    pub fn is_data_insufficiency(&self) -> bool {
        !matches!(
            self,
            AnalyticsError::InvalidArgument(_) | AnalyticsError::SingularFit { .. }
        )
    }
}

/// Success/failure wrapper serialized for the request layer.
///
/// Serializes as `{"success": true, "data": ...}` or
/// `{"success": false, "error": "...", "kind": "..."}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl<T> From<AnalyticsResult<T>> for Envelope<T> {
    fn from(result: AnalyticsResult<T>) -> Self {
        match result {
            Ok(data) => Envelope {
                success: true,
                data: Some(data),
                error: None,
                kind: None,
            },
            Err(err) => Envelope {
                success: false,
                data: None,
                error: Some(err.to_string()),
                kind: Some(err.kind()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_embed_payload() {
        let err = AnalyticsError::InsufficientForDegree {
            needed: 4,
            degree: 3,
            got: 2,
        };
        assert_eq!(
            err.to_string(),
            "need at least 4 points for degree-3 polynomial, got 2"
        );
        assert_eq!(err.kind(), "insufficient_for_degree");
    }

    #[test]
    fn programming_errors_are_not_data_insufficiency() {
        assert!(AnalyticsError::EmptySeries.is_data_insufficiency());
        assert!(!AnalyticsError::InvalidArgument("horizon".into()).is_data_insufficiency());
        assert!(!AnalyticsError::SingularFit { degree: 5 }.is_data_insufficiency());
    }

    #[test]
    fn envelope_serializes_failure_shape() {
        let result: AnalyticsResult<f64> = Err(AnalyticsError::NoGrades {
            scope: "student S001".to_string(),
        });
        let json = serde_json::to_value(Envelope::from(result)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "no grades found for student S001");
        assert_eq!(json["kind"], "no_grades");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn envelope_serializes_success_shape() {
        let json = serde_json::to_value(Envelope::from(Ok::<_, AnalyticsError>(42.5))).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42.5);
        assert!(json.get("error").is_none());
    }
}
