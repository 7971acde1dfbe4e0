use crate::models::GradeRecord;

pub const MIDTERM_WEIGHT: f64 = 0.25;
pub const FINALS_WEIGHT: f64 = 0.35;
pub const QUIZZES_WEIGHT: f64 = 0.20;
pub const PROJECTS_WEIGHT: f64 = 0.20;

/// Weighted final grade. Inputs are not clamped.
pub fn final_grade(midterm: f64, finals: f64, quizzes: f64, projects: f64) -> f64 {
    midterm * MIDTERM_WEIGHT
        + finals * FINALS_WEIGHT
        + quizzes * QUIZZES_WEIGHT
        + projects * PROJECTS_WEIGHT
}

pub fn final_grade_for(record: &GradeRecord) -> f64 {
    final_grade(record.midterm, record.finals, record.quizzes, record.projects)
}
