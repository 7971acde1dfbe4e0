use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub course: String,
}

/// One subject's component scores for a student. `final_grade` stays `None`
/// until the orchestrator memoizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub id: Uuid,
    pub student_id: String,
    pub subject: String,
    pub midterm: f64,
    pub finals: f64,
    pub quizzes: f64,
    pub projects: f64,
    pub final_grade: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(format!("invalid attendance status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub id: Uuid,
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatSummary {
    pub mean: f64,
    pub median: f64,
    pub mode: f64,
    #[serde(rename = "std_deviation")]
    pub std_dev: f64,
    pub variance: f64,
    #[serde(rename = "min_grade")]
    pub min: f64,
    #[serde(rename = "max_grade")]
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Declining => "declining",
        })
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub predicted_grade: f64,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub trend: Trend,
    pub confidence: Confidence,
    pub periods_predicted: usize,
}

/// Polynomial fit result. `coefficients[k]` multiplies `index^k`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolynomialForecast {
    pub predicted_grade: f64,
    pub degree: usize,
    pub coefficients: Vec<f64>,
    pub r_squared: f64,
    pub confidence: Confidence,
    pub periods_predicted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub mean_absolute_error: f64,
    pub mean_squared_error: f64,
    pub root_mean_squared_error: f64,
    /// `None` when every actual value is zero.
    pub mean_absolute_percentage_error: Option<f64>,
    pub zero_actuals_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAnalytics {
    pub student_id: String,
    pub total_subjects: usize,
    #[serde(flatten)]
    pub summary: StatSummary,
    pub attendance_percentage: f64,
    pub gpa: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAnalytics {
    pub subject: String,
    pub total_students: usize,
    #[serde(flatten)]
    pub summary: StatSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortAnalytics {
    pub total_students: usize,
    pub total_grade_records: usize,
    pub total_attendance_records: usize,
    #[serde(flatten)]
    pub summary: StatSummary,
    pub overall_attendance_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentForecast {
    pub student_id: String,
    pub subject: String,
    pub total_records: usize,
    pub past_grades: Vec<f64>,
    #[serde(flatten)]
    pub forecast: Forecast,
    pub component_predictions: std::collections::BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentPolynomialForecast {
    pub student_id: String,
    pub subject: String,
    pub total_records: usize,
    pub past_grades: Vec<f64>,
    #[serde(flatten)]
    pub forecast: PolynomialForecast,
}

/// Row of a forecast sweep across students.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRow {
    pub student_name: String,
    pub student_id: String,
    pub subject: String,
    pub predicted_grade: f64,
    pub trend: Trend,
    pub confidence: Confidence,
}
