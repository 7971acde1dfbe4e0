//! Per-student, per-subject and per-cohort composition of the engine.
//!
//! Every entry point first memoizes missing final grades through the
//! injected [`RecordSource`], then derives its view. Summary statistics are
//! rounded to two decimals here and nowhere else.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::distribution::{self, Distribution};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::forecast;
use crate::grading;
use crate::models::{
    AttendanceEvent, AttendanceStatus, CohortAnalytics, Forecast, ForecastRow, GradeRecord,
    StudentAnalytics, StudentForecast, StudentPolynomialForecast, SubjectAnalytics,
};
use crate::source::RecordSource;
use crate::stats::{self, round_to};

/// 100-point mean folded onto a 4.0 scale.
pub const GPA_DIVISOR: f64 = 25.0;

const DECIMALS: i32 = 2;

pub struct Analyzer<'a, S: RecordSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: RecordSource + ?Sized> Analyzer<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Analyzer { source }
    }

    /// Computes and writes back any missing final grade, returning every
    /// record's final grade in input order.
    pub fn memoize_final_grades(&self, records: &mut [GradeRecord]) -> Vec<f64> {
        records
            .iter_mut()
            .map(|record| match record.final_grade {
                Some(value) => value,
                None => {
                    let value = grading::final_grade_for(record);
                    debug!(grade_id = %record.id, final_grade = value, "memoized final grade");
                    self.source.record_final_grade(record.id, value);
                    record.final_grade = Some(value);
                    value
                }
            })
            .collect()
    }

    #[instrument(skip(self))]
    pub fn student_analytics(&self, student_id: &str) -> AnalyticsResult<StudentAnalytics> {
        let mut records = self.source.grades_for_student(student_id);
        if records.is_empty() {
            return Err(AnalyticsError::NoGrades {
                scope: format!("student {student_id}"),
            });
        }
        let finals = self.memoize_final_grades(&mut records);
        let attendance = self.source.attendance_for_student(student_id);

        Ok(StudentAnalytics {
            student_id: student_id.to_string(),
            total_subjects: records.len(),
            summary: stats::summarize(&finals).rounded(DECIMALS),
            attendance_percentage: round_to(attendance_percentage(&attendance), DECIMALS),
            gpa: round_to(stats::mean(&finals) / GPA_DIVISOR, DECIMALS),
        })
    }

    #[instrument(skip(self))]
    pub fn subject_analytics(&self, subject: &str) -> AnalyticsResult<SubjectAnalytics> {
        let mut records = self.source.grades_for_subject(subject);
        if records.is_empty() {
            return Err(AnalyticsError::NoGrades {
                scope: format!("subject {subject}"),
            });
        }
        let finals = self.memoize_final_grades(&mut records);

        Ok(SubjectAnalytics {
            subject: subject.to_string(),
            total_students: records.len(),
            summary: stats::summarize(&finals).rounded(DECIMALS),
        })
    }

    #[instrument(skip(self))]
    pub fn cohort_analytics(&self) -> AnalyticsResult<CohortAnalytics> {
        let mut records = self.source.all_grades();
        if records.is_empty() {
            return Err(AnalyticsError::NoGrades {
                scope: "cohort".to_string(),
            });
        }
        let finals = self.memoize_final_grades(&mut records);
        let attendance = self.source.all_attendance();

        Ok(CohortAnalytics {
            total_students: self.source.students().len(),
            total_grade_records: records.len(),
            total_attendance_records: attendance.len(),
            summary: stats::summarize(&finals).rounded(DECIMALS),
            overall_attendance_percentage: round_to(
                attendance_percentage(&attendance),
                DECIMALS,
            ),
        })
    }

    pub fn grade_distribution(&self) -> AnalyticsResult<Distribution> {
        let mut records = self.source.all_grades();
        let finals = self.memoize_final_grades(&mut records);
        let distribution = distribution::classify(&finals);
        if distribution.is_empty() {
            return Err(AnalyticsError::NoGrades {
                scope: "cohort".to_string(),
            });
        }
        Ok(distribution)
    }

    /// Linear forecast of one student's final grade in a subject, with each
    /// component series forecast alongside.
    #[instrument(skip(self))]
    pub fn predict_student_grade(
        &self,
        student_id: &str,
        subject: &str,
        horizon: usize,
    ) -> AnalyticsResult<StudentForecast> {
        let (records, finals) = self.history(student_id, subject)?;
        let fit = forecast::linear(&finals, horizon)?;

        let midterm: Vec<f64> = records.iter().map(|r| r.midterm).collect();
        let finals_exam: Vec<f64> = records.iter().map(|r| r.finals).collect();
        let quizzes: Vec<f64> = records.iter().map(|r| r.quizzes).collect();
        let projects: Vec<f64> = records.iter().map(|r| r.projects).collect();
        let components = forecast::forecast_components(
            [
                ("midterm", midterm.as_slice()),
                ("finals", finals_exam.as_slice()),
                ("quizzes", quizzes.as_slice()),
                ("projects", projects.as_slice()),
            ],
            horizon,
        )?;

        Ok(StudentForecast {
            student_id: student_id.to_string(),
            subject: subject.to_string(),
            total_records: records.len(),
            past_grades: finals.iter().map(|v| round_to(*v, DECIMALS)).collect(),
            forecast: fit.rounded(),
            component_predictions: components
                .into_iter()
                .map(|(name, value)| (name, round_to(value, DECIMALS)))
                .collect(),
        })
    }

    #[instrument(skip(self))]
    pub fn predict_student_grade_polynomial(
        &self,
        student_id: &str,
        subject: &str,
        degree: usize,
        horizon: usize,
    ) -> AnalyticsResult<StudentPolynomialForecast> {
        let (records, finals) = self.history(student_id, subject)?;
        let fit = forecast::polynomial(&finals, degree, horizon)?;

        Ok(StudentPolynomialForecast {
            student_id: student_id.to_string(),
            subject: subject.to_string(),
            total_records: records.len(),
            past_grades: finals.iter().map(|v| round_to(*v, DECIMALS)).collect(),
            forecast: fit.rounded(),
        })
    }

    /// Forecasts every student in every subject they have (or only
    /// `subject`). Pairs that cannot be forecast are skipped.
    pub fn predict_all(&self, subject: Option<&str>, horizon: usize) -> Vec<ForecastRow> {
        let mut rows = Vec::new();
        for student in self.source.students() {
            let subjects = match subject {
                Some(s) => vec![s.to_string()],
                None => self.source.subjects_for_student(&student.student_id),
            };
            for subj in subjects {
                match self.predict_student_grade(&student.student_id, &subj, horizon) {
                    Ok(prediction) => rows.push(ForecastRow {
                        student_name: student.name.clone(),
                        student_id: student.student_id.clone(),
                        subject: subj,
                        predicted_grade: prediction.forecast.predicted_grade,
                        trend: prediction.forecast.trend,
                        confidence: prediction.forecast.confidence,
                    }),
                    Err(err) => {
                        debug!(
                            student_id = %student.student_id,
                            subject = %subj,
                            error = %err,
                            "skipping forecast"
                        );
                    }
                }
            }
        }
        rows
    }

    fn history(
        &self,
        student_id: &str,
        subject: &str,
    ) -> AnalyticsResult<(Vec<GradeRecord>, Vec<f64>)> {
        let mut records = self.source.grade_history(student_id, subject);
        if records.is_empty() {
            return Err(AnalyticsError::NoHistory {
                student_id: student_id.to_string(),
                subject: subject.to_string(),
            });
        }
        let finals = self.memoize_final_grades(&mut records);
        Ok((records, finals))
    }
}

/// `100 * present / total`, or `0` with no records.
pub fn attendance_percentage(records: &[AttendanceEvent]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let present = records
        .iter()
        .filter(|r| r.status == AttendanceStatus::Present)
        .count();
    present as f64 / records.len() as f64 * 100.0
}

/// Linear forecast per key over caller-supplied histories.
pub fn batch_predict(
    histories: &BTreeMap<String, Vec<f64>>,
    horizon: usize,
) -> BTreeMap<String, AnalyticsResult<Forecast>> {
    histories
        .iter()
        .map(|(key, grades)| {
            (
                key.clone(),
                forecast::linear(grades, horizon).map(|f| f.rounded()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Student;
    use crate::source::MemoryStore;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn grade(student_id: &str, subject: &str, day: i64, score: f64) -> GradeRecord {
        GradeRecord {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            subject: subject.to_string(),
            midterm: score,
            finals: score,
            quizzes: score,
            projects: score,
            final_grade: None,
            created_at: Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap() + Duration::days(day),
        }
    }

    fn attendance(student_id: &str, day: u32, status: AttendanceStatus) -> AttendanceEvent {
        AttendanceEvent {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            status,
        }
    }

    #[test]
    fn attendance_percentage_handles_empty() {
        assert_eq!(attendance_percentage(&[]), 0.0);
        let records = vec![
            attendance("S001", 1, AttendanceStatus::Present),
            attendance("S001", 2, AttendanceStatus::Absent),
            attendance("S001", 3, AttendanceStatus::Present),
        ];
        assert!((attendance_percentage(&records) - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn student_analytics_rounds_and_folds_gpa() {
        let store = MemoryStore::new(
            vec![],
            vec![
                grade("S001", "Math", 0, 90.0),
                grade("S001", "Physics", 1, 81.0),
                grade("S001", "English", 2, 72.0),
            ],
            vec![
                attendance("S001", 1, AttendanceStatus::Present),
                attendance("S001", 2, AttendanceStatus::Absent),
                attendance("S001", 3, AttendanceStatus::Present),
            ],
        );
        let result = Analyzer::new(&store).student_analytics("S001").unwrap();
        assert_eq!(result.total_subjects, 3);
        assert_eq!(result.summary.mean, 81.0);
        assert_eq!(result.summary.std_dev, 9.0);
        assert_eq!(result.attendance_percentage, 66.67);
        assert_eq!(result.gpa, 3.24);
    }

    #[test]
    fn memoization_writes_back_only_missing_grades() {
        let mut cached = grade("S001", "Math", 0, 70.0);
        cached.final_grade = Some(70.0);
        let fresh = grade("S001", "Math", 1, 90.0);
        let store = MemoryStore::new(vec![], vec![cached, fresh.clone()], vec![]);

        let analyzer = Analyzer::new(&store);
        let mut records = store.all_grades();
        let finals = analyzer.memoize_final_grades(&mut records);

        assert_eq!(finals, vec![70.0, 90.0]);
        let writes = store.take_pending_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].grade_id, fresh.id);
    }

    #[test]
    fn empty_scopes_report_structured_errors() {
        let store = MemoryStore::default();
        let analyzer = Analyzer::new(&store);
        assert_eq!(
            analyzer.student_analytics("S404").unwrap_err().kind(),
            "no_grades"
        );
        assert_eq!(analyzer.subject_analytics("Art").unwrap_err().kind(), "no_grades");
        assert_eq!(analyzer.cohort_analytics().unwrap_err().kind(), "no_grades");
        assert_eq!(analyzer.grade_distribution().unwrap_err().kind(), "no_grades");
        assert_eq!(
            analyzer.predict_student_grade("S404", "Art", 1).unwrap_err().kind(),
            "no_history"
        );
        assert!(analyzer.predict_all(None, 1).is_empty());
    }

    #[test]
    fn single_record_history_is_insufficient() {
        let store = MemoryStore::new(vec![], vec![grade("S001", "Math", 0, 88.0)], vec![]);
        let err = Analyzer::new(&store)
            .predict_student_grade("S001", "Math", 1)
            .unwrap_err();
        assert_eq!(err, AnalyticsError::InsufficientData { needed: 2, got: 1 });
        assert!(err.is_data_insufficiency());
    }

    #[test]
    fn predict_all_skips_unforecastable_pairs() {
        let store = MemoryStore::new(
            vec![Student {
                student_id: "S001".to_string(),
                name: "Alice Johnson".to_string(),
                email: "alice@example.com".to_string(),
                course: "Computer Science".to_string(),
            }],
            vec![
                grade("S001", "Math", 0, 70.0),
                grade("S001", "Math", 1, 80.0),
                grade("S001", "Physics", 0, 75.0),
            ],
            vec![],
        );
        let rows = Analyzer::new(&store).predict_all(None, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject, "Math");
        assert_eq!(rows[0].predicted_grade, 90.0);
        assert_eq!(rows[0].student_name, "Alice Johnson");
    }

    #[test]
    fn batch_predict_reports_per_key() {
        let mut histories = BTreeMap::new();
        histories.insert("S001".to_string(), vec![10.0, 20.0, 30.0, 40.0]);
        histories.insert("S002".to_string(), vec![55.0]);
        let results = batch_predict(&histories, 1);
        assert_eq!(results["S001"].as_ref().unwrap().predicted_grade, 50.0);
        assert_eq!(results["S002"].as_ref().unwrap_err().kind(), "insufficient_data");
    }
}
