//! The employee-salary batch pipeline.
//!
//! Reads a CSV of employees, computes salary statistics, processes either the
//! high earners or the regular employees depending on how many high earners
//! there are, writes a JSON report and cleans up temporary files:
//!
//! ```text
//! start -> read_data -> analyze_data -> branch_on_analysis
//!       -> {process_high_earners | process_regular_employees}
//!       -> join_branches -> generate_report -> cleanup_temp_files -> end
//! ```

mod analysis;
mod dataset;
mod pipeline;
mod report;
mod tasks;

pub use analysis::{
    count_by, is_high_earner, mean_salary, AnalysisSummary, HIGH_EARNER_THRESHOLD,
    PROCESSING_MIN_HIGH_EARNERS,
};
pub use dataset::{write_rows, Dataset, Employee, REQUIRED_COLUMNS};
pub use pipeline::{
    batch_channels, batch_engine, batch_graph, batch_notifications, default_retry_policy,
    PIPELINE_NAME,
};
pub use report::{FinalReport, ProcessingSummary, ReportRenderer, Segment, REPORT_STATUS};
pub use tasks::{
    AnalyzeDataTask, BranchOnAnalysis, CleanupTempFilesTask, DataInfo, GenerateReportTask,
    ProcessSegmentTask, ReadDataTask,
};

/// Task names.
pub mod task {
    /// Entry marker.
    pub const START: &str = "start";
    /// Loads and validates the dataset.
    pub const READ_DATA: &str = "read_data";
    /// Computes the analysis summary.
    pub const ANALYZE_DATA: &str = "analyze_data";
    /// Chooses the processing branch.
    pub const BRANCH_ON_ANALYSIS: &str = "branch_on_analysis";
    /// Processes high earners.
    pub const PROCESS_HIGH_EARNERS: &str = "process_high_earners";
    /// Processes everyone else.
    pub const PROCESS_REGULAR_EMPLOYEES: &str = "process_regular_employees";
    /// Fan-in of the two branches.
    pub const JOIN_BRANCHES: &str = "join_branches";
    /// Writes the final report.
    pub const GENERATE_REPORT: &str = "generate_report";
    /// Removes temporary files.
    pub const CLEANUP_TEMP_FILES: &str = "cleanup_temp_files";
    /// Exit marker.
    pub const END: &str = "end";
}

/// Result keys.
pub mod key {
    /// [`super::DataInfo`] published by `read_data`.
    pub const DATA_INFO: &str = "data_info";
    /// [`super::AnalysisSummary`] published by `analyze_data`.
    pub const ANALYSIS_RESULTS: &str = "analysis_results";
    /// [`super::ProcessingSummary`] published by either processing task.
    pub const PROCESSING_RESULTS: &str = "processing_results";
    /// [`super::FinalReport`] published by `generate_report`.
    pub const FINAL_REPORT: &str = "final_report";
    /// Path of the written report file.
    pub const REPORT_FILE: &str = "report_file";
    /// Number of files removed by `cleanup_temp_files`.
    pub const REMOVED_FILES: &str = "removed_files";
}
