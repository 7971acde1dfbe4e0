//! Record access the orchestrator is injected with.
//!
//! [`MemoryStore`] is the request-scoped snapshot used by the CLI (loaded from
//! Postgres by `db::load_store`) and by tests. Final-grade write-backs go
//! through a single writer lock and are queued so the persistence layer can
//! flush them afterwards.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError, RwLock};

use uuid::Uuid;

use crate::models::{AttendanceEvent, GradeRecord, Student};

pub trait RecordSource {
    fn students(&self) -> Vec<Student>;
    fn grades_for_student(&self, student_id: &str) -> Vec<GradeRecord>;
    fn grades_for_subject(&self, subject: &str) -> Vec<GradeRecord>;
    /// One student's records for a subject, oldest first.
    fn grade_history(&self, student_id: &str, subject: &str) -> Vec<GradeRecord>;
    fn all_grades(&self) -> Vec<GradeRecord>;
    fn attendance_for_student(&self, student_id: &str) -> Vec<AttendanceEvent>;
    fn all_attendance(&self) -> Vec<AttendanceEvent>;
    /// Caches a computed final grade onto the owning record.
    fn record_final_grade(&self, grade_id: Uuid, final_grade: f64);

    fn subjects_for_student(&self, student_id: &str) -> Vec<String> {
        self.grades_for_student(student_id)
            .into_iter()
            .map(|g| g.subject)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalGradeWrite {
    pub grade_id: Uuid,
    pub final_grade: f64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    students: Vec<Student>,
    grades: RwLock<Vec<GradeRecord>>,
    attendance: Vec<AttendanceEvent>,
    pending: Mutex<Vec<FinalGradeWrite>>,
}

impl MemoryStore {
    /// Grades are kept ordered by creation time.
    pub fn new(
        students: Vec<Student>,
        mut grades: Vec<GradeRecord>,
        attendance: Vec<AttendanceEvent>,
    ) -> Self {
        grades.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        MemoryStore {
            students,
            grades: RwLock::new(grades),
            attendance,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Drains the write-backs recorded since the last call.
    pub fn take_pending_writes(&self) -> Vec<FinalGradeWrite> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending)
    }

    fn filter_grades(&self, keep: impl Fn(&GradeRecord) -> bool) -> Vec<GradeRecord> {
        self.grades
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|g| keep(*g))
            .cloned()
            .collect()
    }
}

impl RecordSource for MemoryStore {
    fn students(&self) -> Vec<Student> {
        self.students.clone()
    }

    fn grades_for_student(&self, student_id: &str) -> Vec<GradeRecord> {
        self.filter_grades(|g| g.student_id == student_id)
    }

    fn grades_for_subject(&self, subject: &str) -> Vec<GradeRecord> {
        self.filter_grades(|g| g.subject == subject)
    }

    fn grade_history(&self, student_id: &str, subject: &str) -> Vec<GradeRecord> {
        self.filter_grades(|g| g.student_id == student_id && g.subject == subject)
    }

    fn all_grades(&self) -> Vec<GradeRecord> {
        self.filter_grades(|_| true)
    }

    fn attendance_for_student(&self, student_id: &str) -> Vec<AttendanceEvent> {
        self.attendance
            .iter()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect()
    }

    fn all_attendance(&self) -> Vec<AttendanceEvent> {
        self.attendance.clone()
    }

    fn record_final_grade(&self, grade_id: Uuid, final_grade: f64) {
        let mut grades = self.grades.write().unwrap_or_else(PoisonError::into_inner);
        let Some(record) = grades.iter_mut().find(|g| g.id == grade_id) else {
            return;
        };
        if record.final_grade.map(f64::to_bits) == Some(final_grade.to_bits()) {
            return;
        }
        record.final_grade = Some(final_grade);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FinalGradeWrite {
                grade_id,
                final_grade,
            });
    }
}
