//! The units of work of the batch pipeline.

use super::{
    count_by, key, mean_salary, task, write_rows, AnalysisSummary, Dataset, Employee, FinalReport,
    ProcessingSummary, Segment, REPORT_STATUS,
};
use crate::context::TaskContext;
use crate::errors::BatchflowError;
use crate::tasks::{BranchDecision, Task};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Dataset facts published by `read_data`.
///
/// Downstream tasks load the rows again from `file_path`; only this summary
/// travels through the result store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataInfo {
    /// Number of data rows.
    pub row_count: usize,
    /// Header columns, in file order.
    pub columns: Vec<String>,
    /// The validated file.
    pub file_path: String,
}

fn reload(ctx: &TaskContext) -> Result<Dataset, BatchflowError> {
    let info: DataInfo = ctx.fetch_as(task::READ_DATA, key::DATA_INFO)?;
    Ok(Dataset::load(&info.file_path)?)
}

/// Loads and validates the input CSV.
#[derive(Debug, Clone)]
pub struct ReadDataTask {
    data_file: PathBuf,
}

impl ReadDataTask {
    /// Creates the task for `data_file`.
    #[must_use]
    pub fn new(data_file: impl Into<PathBuf>) -> Self {
        Self {
            data_file: data_file.into(),
        }
    }
}

#[async_trait]
impl Task for ReadDataTask {
    fn name(&self) -> &str {
        task::READ_DATA
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), BatchflowError> {
        let dataset = Dataset::load(&self.data_file)?;
        let info = DataInfo {
            row_count: dataset.len(),
            columns: dataset.columns().to_vec(),
            file_path: dataset.path().display().to_string(),
        };
        info!(
            file = %info.file_path,
            rows = info.row_count,
            attempt = ctx.attempt(),
            "Loaded dataset"
        );
        ctx.publish_as(key::DATA_INFO, &info)
    }
}

/// Computes salary statistics over the dataset.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeDataTask;

#[async_trait]
impl Task for AnalyzeDataTask {
    fn name(&self) -> &str {
        task::ANALYZE_DATA
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), BatchflowError> {
        let dataset = reload(ctx)?;
        let summary = AnalysisSummary::from_rows(dataset.rows());
        info!(
            total_records = summary.total_records,
            avg_salary = summary.avg_salary,
            high_earners = summary.high_earners,
            needs_processing = summary.needs_processing,
            "Analysis complete"
        );
        ctx.publish_as(key::ANALYSIS_RESULTS, &summary)
    }
}

/// Picks the processing branch from the analysis.
#[derive(Debug, Clone, Default)]
pub struct BranchOnAnalysis;

#[async_trait]
impl BranchDecision for BranchOnAnalysis {
    fn name(&self) -> &str {
        task::BRANCH_ON_ANALYSIS
    }

    async fn decide(&self, ctx: &TaskContext) -> Result<String, BatchflowError> {
        let summary: AnalysisSummary = ctx.fetch_as(task::ANALYZE_DATA, key::ANALYSIS_RESULTS)?;
        let segment = if summary.needs_processing {
            Segment::HighEarners
        } else {
            Segment::RegularEmployees
        };
        info!(
            high_earners = summary.high_earners,
            target = segment.task_name(),
            "Branch selected"
        );
        Ok(segment.task_name().to_string())
    }
}

/// Writes one segment of the dataset to its own CSV.
#[derive(Debug, Clone)]
pub struct ProcessSegmentTask {
    segment: Segment,
    output_dir: PathBuf,
}

impl ProcessSegmentTask {
    /// Creates the task for `segment`, writing into `output_dir`.
    #[must_use]
    pub fn new(segment: Segment, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            segment,
            output_dir: output_dir.into(),
        }
    }

    /// Returns the processed segment.
    #[must_use]
    pub fn segment(&self) -> Segment {
        self.segment
    }
}

#[async_trait]
impl Task for ProcessSegmentTask {
    fn name(&self) -> &str {
        self.segment.task_name()
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), BatchflowError> {
        let dataset = reload(ctx)?;
        let rows: Vec<Employee> = dataset
            .rows()
            .iter()
            .filter(|e| self.segment.includes(e))
            .cloned()
            .collect();

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output_file = self.output_dir.join(self.segment.file_name());
        write_rows(&output_file, &rows)?;

        let summary = ProcessingSummary {
            segment: self.segment,
            processed_records: rows.len(),
            output_file: output_file.display().to_string(),
            avg_salary: mean_salary(&rows),
            departments: count_by(&rows, |e| &e.department),
        };
        info!(
            segment = self.segment.task_name(),
            records = summary.processed_records,
            file = %summary.output_file,
            "Segment processed"
        );
        ctx.publish_as(key::PROCESSING_RESULTS, &summary)
    }
}

/// Combines the analysis and the branch result into the JSON report.
#[derive(Debug, Clone)]
pub struct GenerateReportTask {
    output_dir: PathBuf,
}

impl GenerateReportTask {
    /// Creates the task writing into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl Task for GenerateReportTask {
    fn name(&self) -> &str {
        task::GENERATE_REPORT
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), BatchflowError> {
        let analysis_summary: AnalysisSummary =
            ctx.fetch_as(task::ANALYZE_DATA, key::ANALYSIS_RESULTS)?;
        let processing_summary: ProcessingSummary = ctx.fetch_many_as(
            &[task::PROCESS_HIGH_EARNERS, task::PROCESS_REGULAR_EMPLOYEES],
            key::PROCESSING_RESULTS,
        )?;

        let now = Utc::now();
        let report = FinalReport {
            timestamp: now.to_rfc3339(),
            analysis_summary,
            processing_summary,
            status: REPORT_STATUS.to_string(),
        };

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self
            .output_dir
            .join(format!("final_report_{}.json", now.format("%Y%m%d_%H%M%S")));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&report)?).await?;
        info!(file = %path.display(), "Report written");

        ctx.publish_as(key::FINAL_REPORT, &report)?;
        ctx.publish_as(key::REPORT_FILE, &path.display().to_string())
    }
}

/// Removes `*.tmp` files from the output directory. Never fails.
#[derive(Debug, Clone)]
pub struct CleanupTempFilesTask {
    output_dir: PathBuf,
}

impl CleanupTempFilesTask {
    /// Creates the task for `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

async fn remove_temp_files(dir: &Path) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Nothing to clean up");
            return 0;
        }
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = %path.display(), error = %e, "Could not remove temp file"),
            }
        }
    }
    removed
}

#[async_trait]
impl Task for CleanupTempFilesTask {
    fn name(&self) -> &str {
        task::CLEANUP_TEMP_FILES
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), BatchflowError> {
        let removed = remove_temp_files(&self.output_dir).await;
        info!(removed, dir = %self.output_dir.display(), "Temp files cleaned up");
        ctx.publish_as(key::REMOVED_FILES, &removed)
    }
}
