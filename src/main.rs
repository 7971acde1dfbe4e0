use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use student_analytics::analytics::{self, Analyzer};
use student_analytics::db::{self, Scope};
use student_analytics::{accuracy, forecast, report, AnalyticsResult, Envelope, MemoryStore};

#[derive(Parser)]
#[command(name = "student-analytics")]
#[command(about = "Grade statistics and forecasts for student records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ImportKind {
    Students,
    Grades,
    Attendance,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students, grades and attendance
    Seed,
    /// Import records from a CSV file
    Import {
        #[arg(long, value_enum)]
        kind: ImportKind,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Statistics for one student
    Student {
        #[arg(long)]
        id: String,
    },
    /// Statistics for one subject across students
    Subject {
        #[arg(long)]
        name: String,
    },
    /// Statistics across every record
    Cohort,
    /// Letter-grade distribution across every record
    Distribution,
    /// Forecast a student's next grade in a subject
    Predict {
        #[arg(long)]
        id: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value_t = 1)]
        periods: usize,
        /// Fit a polynomial of this degree instead of a line
        #[arg(long)]
        degree: Option<usize>,
    },
    /// Forecast every student, optionally for one subject
    PredictAll {
        #[arg(long)]
        subject: Option<String>,
        #[arg(long, default_value_t = 1)]
        periods: usize,
    },
    /// Forecast from a comma-separated grade history
    PredictCustom {
        #[arg(long, value_delimiter = ',', required = true)]
        grades: Vec<f64>,
        #[arg(long, default_value_t = 1)]
        periods: usize,
        #[arg(long)]
        degree: Option<usize>,
    },
    /// Forecast each entry of a JSON file mapping student ids to grade lists
    PredictBatch {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value_t = 1)]
        periods: usize,
    },
    /// Compare actual and predicted grades
    Accuracy {
        #[arg(long, value_delimiter = ',', required = true)]
        actual: Vec<f64>,
        #[arg(long, value_delimiter = ',', required = true)]
        predicted: Vec<f64>,
    },
    /// Generate a markdown cohort report
    Report {
        #[arg(long, default_value_t = 1)]
        periods: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("student_analytics=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Flushes final grades memoized while serving a request.
async fn flush(pool: &PgPool, store: &MemoryStore) -> anyhow::Result<()> {
    let writes = store.take_pending_writes();
    let updated = db::persist_final_grades(pool, &writes).await?;
    if updated > 0 {
        info!(updated, "cached final grades");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect().await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&connect().await?).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { kind, csv } => {
            let pool = connect().await?;
            let inserted = match kind {
                ImportKind::Students => db::import_students_csv(&pool, &csv).await?,
                ImportKind::Grades => db::import_grades_csv(&pool, &csv).await?,
                ImportKind::Attendance => db::import_attendance_csv(&pool, &csv).await?,
            };
            println!("Imported {inserted} rows from {}.", csv.display());
        }
        Commands::Student { id } => {
            let pool = connect().await?;
            let store = db::load_store(&pool, &Scope::Student(id.clone())).await?;
            let result = Analyzer::new(&store).student_analytics(&id);
            flush(&pool, &store).await?;
            print_json(&Envelope::from(result))?;
        }
        Commands::Subject { name } => {
            let pool = connect().await?;
            let store = db::load_store(&pool, &Scope::Subject(name.clone())).await?;
            let result = Analyzer::new(&store).subject_analytics(&name);
            flush(&pool, &store).await?;
            print_json(&Envelope::from(result))?;
        }
        Commands::Cohort => {
            let pool = connect().await?;
            let store = db::load_store(&pool, &Scope::All).await?;
            let result = Analyzer::new(&store).cohort_analytics();
            flush(&pool, &store).await?;
            print_json(&Envelope::from(result))?;
        }
        Commands::Distribution => {
            let pool = connect().await?;
            let store = db::load_store(&pool, &Scope::All).await?;
            let result = Analyzer::new(&store).grade_distribution();
            flush(&pool, &store).await?;
            print_json(&Envelope::from(result))?;
        }
        Commands::Predict {
            id,
            subject,
            periods,
            degree,
        } => {
            let pool = connect().await?;
            let store = db::load_store(&pool, &Scope::Student(id.clone())).await?;
            let analyzer = Analyzer::new(&store);
            match degree {
                Some(degree) => {
                    let result =
                        analyzer.predict_student_grade_polynomial(&id, &subject, degree, periods);
                    flush(&pool, &store).await?;
                    print_json(&Envelope::from(result))?;
                }
                None => {
                    let result = analyzer.predict_student_grade(&id, &subject, periods);
                    flush(&pool, &store).await?;
                    print_json(&Envelope::from(result))?;
                }
            }
        }
        Commands::PredictAll { subject, periods } => {
            let pool = connect().await?;
            let scope = match &subject {
                Some(s) => Scope::Subject(s.clone()),
                None => Scope::All,
            };
            let store = db::load_store(&pool, &scope).await?;
            let rows = Analyzer::new(&store).predict_all(subject.as_deref(), periods);
            flush(&pool, &store).await?;
            let result: AnalyticsResult<_> = Ok(rows);
            print_json(&Envelope::from(result))?;
        }
        Commands::PredictCustom {
            grades,
            periods,
            degree,
        } => match degree {
            Some(degree) => {
                let result = forecast::polynomial(&grades, degree, periods).map(|f| f.rounded());
                print_json(&Envelope::from(result))?;
            }
            None => {
                let result = forecast::linear(&grades, periods).map(|f| f.rounded());
                print_json(&Envelope::from(result))?;
            }
        },
        Commands::PredictBatch { input, periods } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let histories: BTreeMap<String, Vec<f64>> =
                serde_json::from_str(&raw).context("expected a map of id to grade list")?;
            let results: BTreeMap<String, Envelope<_>> =
                analytics::batch_predict(&histories, periods)
                    .into_iter()
                    .map(|(key, result)| (key, Envelope::from(result)))
                    .collect();
            print_json(&results)?;
        }
        Commands::Accuracy { actual, predicted } => {
            let result = accuracy::evaluate(&actual, &predicted).map(|r| r.rounded());
            print_json(&Envelope::from(result))?;
        }
        Commands::Report { periods, out } => {
            let pool = connect().await?;
            let store = db::load_store(&pool, &Scope::All).await?;
            let today = chrono::Utc::now().date_naive();
            let markdown = report::build_report(&store, today, periods);
            flush(&pool, &store).await?;
            std::fs::write(&out, markdown)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
