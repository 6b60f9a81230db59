//! The final report and the notification rendered from it.

use super::{is_high_earner, key, task, AnalysisSummary, Employee};
use crate::context::ResultStore;
use crate::core::{Run, RunStatus};
use crate::errors::BatchflowError;
use crate::notify::{escape_html, MessageRenderer, PlainRenderer, RenderedMessage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Status recorded in every report the pipeline writes.
pub const REPORT_STATUS: &str = "completed_successfully";

/// The two processing branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    /// Employees earning above the threshold.
    HighEarners,
    /// Everyone else.
    RegularEmployees,
}

impl Segment {
    /// Returns the name of the task processing this segment.
    #[must_use]
    pub fn task_name(self) -> &'static str {
        match self {
            Self::HighEarners => task::PROCESS_HIGH_EARNERS,
            Self::RegularEmployees => task::PROCESS_REGULAR_EMPLOYEES,
        }
    }

    /// Returns the output file name.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::HighEarners => "high_earners.csv",
            Self::RegularEmployees => "regular_employees.csv",
        }
    }

    /// Returns true if `employee` belongs to this segment.
    #[must_use]
    pub fn includes(self, employee: &Employee) -> bool {
        match self {
            Self::HighEarners => is_high_earner(employee),
            Self::RegularEmployees => !is_high_earner(employee),
        }
    }
}

/// What a processing task did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    /// The processed segment.
    pub segment: Segment,
    /// Rows written.
    pub processed_records: usize,
    /// Path of the written CSV.
    pub output_file: String,
    /// Mean salary of the segment; absent for an empty segment.
    pub avg_salary: Option<f64>,
    /// Segment employees per department.
    pub departments: BTreeMap<String, usize>,
}

/// The JSON report written at the end of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    /// ISO 8601 creation time.
    pub timestamp: String,
    /// Whole-dataset statistics.
    pub analysis_summary: AnalysisSummary,
    /// Result of the branch that ran.
    pub processing_summary: ProcessingSummary,
    /// Always [`REPORT_STATUS`].
    pub status: String,
}

/// Renders the batch notifications from the run's results.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    plain: PlainRenderer,
    output_dir: PathBuf,
}

impl ReportRenderer {
    /// Creates a renderer with the given subjects.
    #[must_use]
    pub fn new(plain: PlainRenderer, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            plain,
            output_dir: output_dir.into(),
        }
    }

    fn render_success(&self, run: &Run, results: &ResultStore) -> Result<String, BatchflowError> {
        let report: FinalReport = results.fetch_as(task::GENERATE_REPORT, key::FINAL_REPORT)?;
        let summary = &report.analysis_summary;

        let mut body = format!(
            "<html><body><h2>{}</h2>",
            escape_html(self.plain.subject_for(RunStatus::Succeeded))
        );
        let _ = write!(
            body,
            "<p><strong>Finished at:</strong> {}</p>\
             <p><strong>Records processed:</strong> {}</p>\
             <p><strong>Average salary:</strong> {:.2}</p>\
             <p><strong>High earners:</strong> {}</p>\
             <p><strong>Branch:</strong> {} ({} records)</p>",
            escape_html(&report.timestamp),
            summary.total_records,
            summary.avg_salary,
            summary.high_earners,
            report.processing_summary.segment.task_name(),
            report.processing_summary.processed_records,
        );
        body.push_str("<h3>Departments</h3><ul>");
        for (department, count) in &summary.departments {
            let _ = write!(
                body,
                "<li><strong>{}:</strong> {count} employees</li>",
                escape_html(department)
            );
        }
        let _ = write!(
            body,
            "</ul><p><strong>Reports saved in:</strong> {}</p><p>Run {}</p></body></html>",
            escape_html(&self.output_dir.display().to_string()),
            run.run_id()
        );
        Ok(body)
    }

    fn render_failure(&self, run: &Run) -> String {
        let failure = run.first_failure();
        let task = failure.map_or("unknown", |r| r.task.as_str());
        let attempts = failure.map_or(0, |r| r.attempt_count());
        let error = failure.and_then(|r| r.error.as_deref()).unwrap_or("no error recorded");
        let failed_at = run
            .finished_at()
            .map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339());

        let mut body = format!(
            "<html><body><h2 style=\"color: red;\">{}</h2>",
            escape_html(self.plain.subject_for(RunStatus::Failed))
        );
        let _ = write!(
            body,
            "<p><strong>Failed at:</strong> {failed_at}</p>\
             <p><strong>Pipeline:</strong> {}</p>\
             <p><strong>Task:</strong> {}</p>\
             <p><strong>Attempts:</strong> {attempts}</p>\
             <p><strong>Status:</strong> {}</p>\
             <p><strong>Run ID:</strong> {}</p>\
             <p><strong>Last error:</strong> {}</p>",
            escape_html(run.pipeline()),
            escape_html(task),
            run.status(),
            run.run_id(),
            escape_html(error),
        );
        body.push_str(
            "<h3>Recommendations</h3><ul>\
             <li>Check the task log for the full error</li>\
             <li>Make sure the input data is present and well formed</li>\
             <li>Check connectivity to external systems</li>\
             </ul></body></html>",
        );
        body
    }
}

impl MessageRenderer for ReportRenderer {
    fn render(&self, run: &Run, results: &ResultStore) -> Result<RenderedMessage, BatchflowError> {
        let html_body = if run.status() == RunStatus::Succeeded {
            self.render_success(run, results)?
        } else {
            self.render_failure(run)
        };
        Ok(RenderedMessage {
            subject: self.plain.subject_for(run.status()).to_string(),
            html_body,
        })
    }
}
