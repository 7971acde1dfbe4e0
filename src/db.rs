use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{AttendanceEvent, AttendanceStatus, GradeRecord, Student};
use crate::source::{FinalGradeWrite, MemoryStore};

/// Which records a request snapshot covers.
#[derive(Debug, Clone)]
pub enum Scope {
    All,
    Student(String),
    Subject(String),
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

type SeedTerm = (f64, f64, f64, f64);

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("S001", "Alice Johnson", "alice@example.com", "Computer Science"),
        ("S002", "Bob Smith", "bob@example.com", "Mathematics"),
        ("S003", "Carol Williams", "carol@example.com", "Physics"),
        ("S004", "David Brown", "david@example.com", "Engineering"),
        ("S005", "Emma Davis", "emma@example.com", "Biology"),
    ];

    for (student_id, name, email, course) in &students {
        upsert_student(pool, student_id, name, email, course).await?;
    }

    let grades: Vec<(&str, &str, [SeedTerm; 3])> = vec![
        ("S001", "Mathematics", [(88.0, 90.0, 85.0, 92.0), (90.0, 92.0, 88.0, 94.0), (93.0, 95.0, 90.0, 96.0)]),
        ("S001", "Computer Science", [(91.0, 89.0, 94.0, 97.0), (92.0, 91.0, 93.0, 98.0), (94.0, 93.0, 95.0, 98.0)]),
        ("S001", "English", [(84.0, 86.0, 80.0, 88.0), (83.0, 85.0, 82.0, 87.0), (85.0, 84.0, 81.0, 89.0)]),
        ("S002", "Mathematics", [(78.0, 75.0, 80.0, 82.0), (74.0, 72.0, 76.0, 80.0), (70.0, 68.0, 73.0, 77.0)]),
        ("S002", "Physics", [(72.0, 70.0, 68.0, 75.0), (73.0, 72.0, 70.0, 76.0), (75.0, 74.0, 71.0, 78.0)]),
        ("S002", "Chemistry", [(65.0, 62.0, 70.0, 68.0), (68.0, 66.0, 72.0, 70.0), (66.0, 64.0, 69.0, 71.0)]),
        ("S003", "Physics", [(81.0, 79.0, 85.0, 83.0), (84.0, 83.0, 86.0, 85.0), (88.0, 86.0, 89.0, 88.0)]),
        ("S003", "Mathematics", [(76.0, 74.0, 78.0, 80.0), (79.0, 78.0, 80.0, 82.0), (81.0, 80.0, 83.0, 85.0)]),
        ("S003", "English", [(70.0, 72.0, 66.0, 75.0), (71.0, 70.0, 68.0, 74.0), (69.0, 71.0, 67.0, 76.0)]),
        ("S004", "Computer Science", [(95.0, 94.0, 92.0, 98.0), (93.0, 92.0, 90.0, 96.0), (90.0, 88.0, 87.0, 93.0)]),
        ("S004", "Physics", [(89.0, 91.0, 86.0, 90.0), (90.0, 92.0, 88.0, 91.0), (91.0, 93.0, 89.0, 92.0)]),
        ("S004", "Chemistry", [(85.0, 83.0, 88.0, 86.0), (86.0, 85.0, 87.0, 88.0), (88.0, 87.0, 90.0, 89.0)]),
        ("S005", "Chemistry", [(58.0, 55.0, 62.0, 65.0), (62.0, 60.0, 66.0, 68.0), (67.0, 65.0, 70.0, 72.0)]),
        ("S005", "English", [(80.0, 78.0, 82.0, 85.0), (79.0, 77.0, 80.0, 84.0), (81.0, 78.0, 81.0, 86.0)]),
        ("S005", "Mathematics", [(63.0, 60.0, 65.0, 70.0), (61.0, 58.0, 64.0, 68.0), (60.0, 55.0, 62.0, 66.0)]),
    ];

    let term_start = Utc
        .with_ymd_and_hms(2024, 1, 15, 9, 0, 0)
        .single()
        .context("invalid seed timestamp")?;

    for (student_id, subject, terms) in grades {
        for (term, (midterm, finals, quizzes, projects)) in terms.into_iter().enumerate() {
            let source_key = format!("seed-{student_id}-{subject}-{term}");
            let created_at = term_start + Duration::days(30 * term as i64);
            insert_grade(
                pool,
                student_id,
                subject,
                [midterm, finals, quizzes, projects],
                created_at,
                &source_key,
            )
            .await?;
        }
    }

    let first_day = NaiveDate::from_ymd_opt(2024, 2, 1).context("invalid date")?;
    for (index, (student_id, ..)) in students.iter().enumerate() {
        for day in 0..30i64 {
            let date = first_day + Duration::days(day);
            let status = if (day * 7 + index as i64 * 3) % 9 == 0 {
                AttendanceStatus::Absent
            } else {
                AttendanceStatus::Present
            };
            let source_key = format!("seed-attendance-{student_id}-{date}");
            insert_attendance(pool, student_id, date, status, &source_key).await?;
        }
    }

    Ok(())
}

async fn upsert_student(
    pool: &PgPool,
    student_id: &str,
    name: &str,
    email: &str,
    course: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_analytics.students (student_id, full_name, email, course)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (student_id) DO UPDATE
        SET full_name = EXCLUDED.full_name, email = EXCLUDED.email, course = EXCLUDED.course
        "#,
    )
    .bind(student_id)
    .bind(name)
    .bind(email)
    .bind(course)
    .execute(pool)
    .await
    .with_context(|| format!("failed to upsert student {student_id}"))?;
    Ok(())
}

async fn insert_grade(
    pool: &PgPool,
    student_id: &str,
    subject: &str,
    [midterm, finals, quizzes, projects]: [f64; 4],
    created_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO student_analytics.grades
        (id, student_id, subject, midterm, finals, quizzes, projects, created_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(subject)
    .bind(midterm)
    .bind(finals)
    .bind(quizzes)
    .bind(projects)
    .bind(created_at)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn insert_attendance(
    pool: &PgPool,
    student_id: &str,
    date: NaiveDate,
    status: AttendanceStatus,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO student_analytics.attendance
        (id, student_id, attended_on, status, source_key)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(date)
    .bind(status.as_str())
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn import_students_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: String,
        full_name: String,
        email: String,
        course: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut upserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        upsert_student(pool, &row.student_id, &row.full_name, &row.email, &row.course).await?;
        upserted += 1;
    }

    info!(count = upserted, path = %csv_path.display(), "imported students");
    Ok(upserted)
}

pub async fn import_grades_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: String,
        subject: String,
        midterm: f64,
        finals: f64,
        quizzes: f64,
        projects: f64,
        recorded_at: Option<DateTime<Utc>>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_grade(
            pool,
            &row.student_id,
            &row.subject,
            [row.midterm, row.finals, row.quizzes, row.projects],
            row.recorded_at.unwrap_or_else(Utc::now),
            &source_key,
        )
        .await
        .with_context(|| format!("failed to import grade {source_key}"))?
        {
            inserted += 1;
        }
    }

    info!(count = inserted, path = %csv_path.display(), "imported grades");
    Ok(inserted)
}

pub async fn import_attendance_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: String,
        date: NaiveDate,
        status: AttendanceStatus,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}-{}", row.student_id, row.date));

        if insert_attendance(pool, &row.student_id, row.date, row.status, &source_key).await? {
            inserted += 1;
        }
    }

    info!(count = inserted, path = %csv_path.display(), "imported attendance");
    Ok(inserted)
}

/// Loads the records a request needs into a [`MemoryStore`] snapshot.
pub async fn load_store(pool: &PgPool, scope: &Scope) -> anyhow::Result<MemoryStore> {
    let mut students_sql = String::from(
        "SELECT st.student_id, st.full_name, st.email, st.course \
         FROM student_analytics.students st",
    );
    let mut grades_sql = String::from(
        "SELECT g.id, g.student_id, g.subject, g.midterm, g.finals, g.quizzes, g.projects, \
         g.final_grade, g.created_at \
         FROM student_analytics.grades g",
    );
    let mut attendance_sql = String::from(
        "SELECT a.id, a.student_id, a.attended_on, a.status \
         FROM student_analytics.attendance a",
    );

    let filter = match scope {
        Scope::All => None,
        Scope::Student(student_id) => {
            students_sql.push_str(" WHERE st.student_id = $1");
            grades_sql.push_str(" WHERE g.student_id = $1");
            attendance_sql.push_str(" WHERE a.student_id = $1");
            Some(student_id.as_str())
        }
        Scope::Subject(subject) => {
            students_sql.push_str(
                " WHERE EXISTS (SELECT 1 FROM student_analytics.grades g \
                 WHERE g.student_id = st.student_id AND g.subject = $1)",
            );
            grades_sql.push_str(" WHERE g.subject = $1");
            Some(subject.as_str())
        }
    };
    // attendance is not meaningful across students of one subject
    let load_attendance = !matches!(scope, Scope::Subject(_));

    students_sql.push_str(" ORDER BY st.student_id");
    grades_sql.push_str(" ORDER BY g.created_at, g.id");
    attendance_sql.push_str(" ORDER BY a.attended_on, a.student_id");

    let mut students_query = sqlx::query(&students_sql);
    let mut grades_query = sqlx::query(&grades_sql);
    let mut attendance_query = sqlx::query(&attendance_sql);
    if let Some(value) = filter {
        students_query = students_query.bind(value);
        grades_query = grades_query.bind(value);
        attendance_query = attendance_query.bind(value);
    }

    let students = students_query
        .fetch_all(pool)
        .await
        .context("failed to load students")?
        .into_iter()
        .map(|row| Student {
            student_id: row.get("student_id"),
            name: row.get("full_name"),
            email: row.get("email"),
            course: row.get("course"),
        })
        .collect::<Vec<_>>();

    let grades = grades_query
        .fetch_all(pool)
        .await
        .context("failed to load grades")?
        .into_iter()
        .map(|row| GradeRecord {
            id: row.get("id"),
            student_id: row.get("student_id"),
            subject: row.get("subject"),
            midterm: row.get("midterm"),
            finals: row.get("finals"),
            quizzes: row.get("quizzes"),
            projects: row.get("projects"),
            final_grade: row.get("final_grade"),
            created_at: row.get("created_at"),
        })
        .collect::<Vec<_>>();

    let attendance_rows = if load_attendance {
        attendance_query
            .fetch_all(pool)
            .await
            .context("failed to load attendance")?
    } else {
        Vec::new()
    };

    let mut attendance = Vec::new();
    for row in attendance_rows {
        let status: String = row.get("status");
        attendance.push(AttendanceEvent {
            id: row.get("id"),
            student_id: row.get("student_id"),
            date: row.get("attended_on"),
            status: status.parse().map_err(anyhow::Error::msg)?,
        });
    }

    debug!(
        students = students.len(),
        grades = grades.len(),
        attendance = attendance.len(),
        ?scope,
        "loaded snapshot"
    );
    Ok(MemoryStore::new(students, grades, attendance))
}

/// Fills a row's final grade only while it is still unset.
const PERSIST_FINAL_GRADE: &str = r#"
    UPDATE student_analytics.grades
    SET final_grade = $1
    WHERE id = $2 AND final_grade IS NULL
"#;

/// Writes memoized final grades back in one transaction.
pub async fn persist_final_grades(
    pool: &PgPool,
    writes: &[FinalGradeWrite],
) -> anyhow::Result<usize> {
    if writes.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut updated = 0usize;
    for write in writes {
        let result = sqlx::query(PERSIST_FINAL_GRADE)
            .bind(write.final_grade)
            .bind(write.grade_id)
            .execute(&mut *tx)
            .await?;
        updated += result.rows_affected() as usize;
    }
    tx.commit().await?;

    debug!(updated, "persisted final grades");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_grade_flush_never_overwrites_a_cached_value() {
        let normalized = PERSIST_FINAL_GRADE.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(normalized.ends_with("WHERE id = $2 AND final_grade IS NULL"));
        assert!(!normalized.contains("IS DISTINCT FROM"));
    }
}
