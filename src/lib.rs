//! Grade and attendance analytics: descriptive statistics, letter-grade
//! distribution, regression forecasts and forecast accuracy, composed per
//! student, subject or cohort over an injected [`source::RecordSource`].

pub mod accuracy;
pub mod analytics;
pub mod db;
pub mod distribution;
pub mod error;
pub mod forecast;
pub mod grading;
pub mod models;
pub mod report;
pub mod source;
pub mod stats;

pub use analytics::Analyzer;
pub use error::{AnalyticsError, AnalyticsResult, Envelope};
pub use source::{MemoryStore, RecordSource};
