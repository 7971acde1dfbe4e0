use std::collections::BTreeSet;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::analytics::Analyzer;
use crate::models::{ForecastRow, SubjectAnalytics, Trend};
use crate::source::RecordSource;

pub fn summarize_by_subject<S: RecordSource + ?Sized>(source: &S) -> Vec<SubjectAnalytics> {
    let analyzer = Analyzer::new(source);
    let subjects: BTreeSet<String> = source.all_grades().into_iter().map(|g| g.subject).collect();

    let mut summaries: Vec<SubjectAnalytics> = subjects
        .iter()
        .filter_map(|subject| analyzer.subject_analytics(subject).ok())
        .collect();

    summaries.sort_by(|a, b| b.summary.mean.total_cmp(&a.summary.mean));
    summaries
}

/// Declining forecasts first, then lowest predicted grade.
pub fn watch_list(mut rows: Vec<ForecastRow>) -> Vec<ForecastRow> {
    rows.sort_by(|a, b| {
        let rank = |t: Trend| match t {
            Trend::Declining => 0,
            Trend::Stable => 1,
            Trend::Improving => 2,
        };
        rank(a.trend)
            .cmp(&rank(b.trend))
            .then(a.predicted_grade.total_cmp(&b.predicted_grade))
    });
    rows
}

pub fn build_report<S: RecordSource + ?Sized>(
    source: &S,
    generated_on: NaiveDate,
    horizon: usize,
) -> String {
    let analyzer = Analyzer::new(source);
    let mut output = String::new();

    let _ = writeln!(output, "# Cohort Performance Report");
    let _ = writeln!(
        output,
        "Generated on {} (forecast horizon {} period(s))",
        generated_on, horizon
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Cohort Summary");

    match analyzer.cohort_analytics() {
        Ok(cohort) => {
            let _ = writeln!(
                output,
                "- {} students, {} grade records, {} attendance records",
                cohort.total_students,
                cohort.total_grade_records,
                cohort.total_attendance_records
            );
            let _ = writeln!(
                output,
                "- mean {:.2}, median {:.2}, std dev {:.2}, range {:.2}-{:.2}",
                cohort.summary.mean,
                cohort.summary.median,
                cohort.summary.std_dev,
                cohort.summary.min,
                cohort.summary.max
            );
            let _ = writeln!(
                output,
                "- overall attendance {:.2}%",
                cohort.overall_attendance_percentage
            );
        }
        Err(err) => {
            let _ = writeln!(output, "No data: {err}.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Distribution");

    match analyzer.grade_distribution() {
        Ok(distribution) => {
            for (grade, count) in distribution.iter() {
                let _ = writeln!(output, "- {}: {}", grade.label(), count);
            }
        }
        Err(_) => {
            let _ = writeln!(output, "No grades recorded.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    let subjects = summarize_by_subject(source);
    if subjects.is_empty() {
        let _ = writeln!(output, "No subjects recorded.");
    } else {
        for subject in subjects.iter() {
            let _ = writeln!(
                output,
                "- {}: {} records (mean {:.2}, std dev {:.2})",
                subject.subject,
                subject.total_students,
                subject.summary.mean,
                subject.summary.std_dev
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Forecast Watch List");

    let rows = watch_list(analyzer.predict_all(None, horizon));
    if rows.is_empty() {
        let _ = writeln!(output, "Not enough grade history to forecast.");
    } else {
        for row in rows.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) predicted {:.2}, {} with {} confidence",
                row.student_name,
                row.student_id,
                row.subject,
                row.predicted_grade,
                row.trend,
                row.confidence
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Confidence;
    use crate::source::MemoryStore;

    fn row(id: &str, predicted: f64, trend: Trend) -> ForecastRow {
        ForecastRow {
            student_name: format!("Student {id}"),
            student_id: id.to_string(),
            subject: "Math".to_string(),
            predicted_grade: predicted,
            trend,
            confidence: Confidence::Medium,
        }
    }

    #[test]
    fn watch_list_puts_declining_first() {
        let rows = watch_list(vec![
            row("S1", 60.0, Trend::Improving),
            row("S2", 85.0, Trend::Declining),
            row("S3", 70.0, Trend::Stable),
            row("S4", 65.0, Trend::Declining),
        ]);
        let ids: Vec<&str> = rows.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["S4", "S2", "S3", "S1"]);
    }

    #[test]
    fn empty_store_renders_placeholders() {
        let store = MemoryStore::default();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let report = build_report(&store, date, 1);
        assert!(report.starts_with("# Cohort Performance Report"));
        assert!(report.contains("No grades recorded."));
        assert!(report.contains("Not enough grade history to forecast."));
    }
}
