//! Assembly of the batch graph, its notifications and its engine.

use super::{
    task, AnalyzeDataTask, BranchOnAnalysis, CleanupTempFilesTask, GenerateReportTask,
    ProcessSegmentTask, ReadDataTask, ReportRenderer, Segment,
};
use crate::config::BatchConfig;
use crate::core::TriggerRule;
use crate::errors::{BatchflowError, PipelineValidationError};
use crate::events::LoggingEventSink;
use crate::notify::{
    Channel, NotificationPlan, Notifier, PlainRenderer, SmtpTransport, SpoolTransport,
};
use crate::pipeline::{PipelineBuilder, PipelineEngine, RetryPolicy, TaskGraph, TaskSpec};
use std::sync::Arc;
use std::time::Duration;

/// Name of the batch pipeline.
pub const PIPELINE_NAME: &str = "batch_data_processing";

const MINUTE: Duration = Duration::from_secs(60);

/// Policy of every task without an override: 4 attempts, exponential from
/// five minutes, capped at thirty.
#[must_use]
pub fn default_retry_policy() -> RetryPolicy {
    RetryPolicy::exponential(4, 5 * MINUTE, 30 * MINUTE)
}

fn with_attempts(attempts: u32, base: Duration) -> RetryPolicy {
    default_retry_policy()
        .with_max_attempts(attempts)
        .with_base_delay(base)
}

/// Builds the batch graph for `config`.
///
/// # Errors
///
/// Returns a validation error if the graph is malformed.
pub fn batch_graph(config: &BatchConfig) -> Result<TaskGraph, PipelineValidationError> {
    let default = default_retry_policy();
    let output_dir = &config.output_dir;

    let segment = |segment: Segment| {
        TaskSpec::new(
            segment.task_name(),
            Arc::new(ProcessSegmentTask::new(segment, output_dir)),
        )
        .with_dependency(task::BRANCH_ON_ANALYSIS)
        .with_retry(with_attempts(3, 3 * MINUTE))
    };

    PipelineBuilder::new(PIPELINE_NAME)
        .with_task_spec(TaskSpec::marker(task::START).with_retry(default.clone()))?
        .with_task_spec(
            TaskSpec::new(task::READ_DATA, Arc::new(ReadDataTask::new(&config.data_file)))
                .with_dependency(task::START)
                .with_retry(with_attempts(3, 2 * MINUTE)),
        )?
        .with_task_spec(
            TaskSpec::new(task::ANALYZE_DATA, Arc::new(AnalyzeDataTask))
                .with_dependency(task::READ_DATA)
                .with_retry(with_attempts(3, 2 * MINUTE)),
        )?
        .with_task_spec(
            TaskSpec::branch(task::BRANCH_ON_ANALYSIS, Arc::new(BranchOnAnalysis))
                .with_dependency(task::ANALYZE_DATA)
                .with_retry(default.clone()),
        )?
        .with_task_spec(segment(Segment::HighEarners))?
        .with_task_spec(segment(Segment::RegularEmployees))?
        .with_task_spec(
            TaskSpec::marker(task::JOIN_BRANCHES)
                .with_dependencies([task::PROCESS_HIGH_EARNERS, task::PROCESS_REGULAR_EMPLOYEES])
                .with_trigger_rule(TriggerRule::AnyUpstreamSucceeded)
                .with_retry(default.clone()),
        )?
        .with_task_spec(
            TaskSpec::new(task::GENERATE_REPORT, Arc::new(GenerateReportTask::new(output_dir)))
                .with_dependency(task::JOIN_BRANCHES)
                .with_retry(with_attempts(2, 5 * MINUTE)),
        )?
        .with_task_spec(
            TaskSpec::new(
                task::CLEANUP_TEMP_FILES,
                Arc::new(CleanupTempFilesTask::new(output_dir)),
            )
            .with_dependency(task::GENERATE_REPORT)
            .with_retry(default.clone().with_max_attempts(2)),
        )?
        .with_task_spec(
            TaskSpec::marker(task::END)
                .with_dependency(task::CLEANUP_TEMP_FILES)
                .with_trigger_rule(TriggerRule::AnyUpstreamSucceeded)
                .with_retry(default),
        )?
        .end_task(task::END)
        .build()
}

/// The default mail channels: the SMTP relay first, then the spool
/// directory.
#[must_use]
pub fn batch_channels(config: &BatchConfig) -> Vec<Channel> {
    let attempts = config.channel_attempts;
    let delay = config.channel_delay();
    vec![
        Channel::new(
            "smtp",
            Arc::new(SmtpTransport::new("smtp").with_timeout(config.smtp_timeout())),
        )
        .with_attempts(attempts, delay),
        Channel::new("spool", Arc::new(SpoolTransport::new("spool", &config.spool_dir)))
            .with_attempts(attempts, delay),
    ]
}

/// Builds the notification plan rendering the batch report.
///
/// # Errors
///
/// Returns `InvalidNotification` if the sender address is malformed.
pub fn batch_notifications(
    config: &BatchConfig,
    channels: Vec<Channel>,
) -> Result<NotificationPlan, BatchflowError> {
    let notifier = Notifier::new(config.smtp.clone(), &config.sender)?;
    let subjects = PlainRenderer::new(&config.success_subject, &config.failure_subject);
    let renderer = ReportRenderer::new(subjects.clone(), &config.output_dir);

    Ok(NotificationPlan::new(notifier, channels, config.recipients.all())
        .with_renderer(Arc::new(renderer))
        .with_fallback_renderer(subjects))
}

/// Builds the engine for `config` with the default channels and logging.
///
/// # Errors
///
/// Returns an error if the graph or the notifier cannot be built.
pub fn batch_engine(config: &BatchConfig) -> Result<PipelineEngine, BatchflowError> {
    let graph = batch_graph(config)?;
    let plan = batch_notifications(config, batch_channels(config))?;
    Ok(PipelineEngine::new(graph)
        .with_notifications(plan)
        .with_event_sink(Arc::new(LoggingEventSink::default())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_graph_shape() {
        let graph = batch_graph(&BatchConfig::default()).unwrap();

        assert_eq!(graph.name(), PIPELINE_NAME);
        assert_eq!(graph.task_count(), 10);
        assert_eq!(graph.end_task(), task::END);
        assert_eq!(graph.execution_order().first().map(String::as_str), Some(task::START));
        assert_eq!(graph.execution_order().last().map(String::as_str), Some(task::END));

        let mut branches = graph.downstream(task::BRANCH_ON_ANALYSIS).to_vec();
        branches.sort();
        assert_eq!(
            branches,
            vec![
                task::PROCESS_HIGH_EARNERS.to_string(),
                task::PROCESS_REGULAR_EMPLOYEES.to_string()
            ]
        );
    }

    #[test]
    fn test_retry_policies() {
        let graph = batch_graph(&BatchConfig::default()).unwrap();
        let attempts = |name: &str| graph.spec(name).map(|s| s.retry.max_attempts);

        assert_eq!(attempts(task::READ_DATA), Some(3));
        assert_eq!(attempts(task::PROCESS_HIGH_EARNERS), Some(3));
        assert_eq!(attempts(task::GENERATE_REPORT), Some(2));
        assert_eq!(attempts(task::CLEANUP_TEMP_FILES), Some(2));
        assert_eq!(attempts(task::BRANCH_ON_ANALYSIS), Some(4));

        let read = &graph.spec(task::READ_DATA).unwrap().retry;
        assert_eq!(read.delay_after(1), Some(2 * MINUTE));
        assert_eq!(read.delay_after(2), Some(4 * MINUTE));
        assert_eq!(read.delay_after(3), None);
    }

    #[test]
    fn test_join_and_end_accept_a_skipped_branch() {
        let graph = batch_graph(&BatchConfig::default()).unwrap();
        for name in [task::JOIN_BRANCHES, task::END] {
            assert_eq!(
                graph.spec(name).map(|s| s.trigger_rule),
                Some(TriggerRule::AnyUpstreamSucceeded)
            );
        }
    }

    #[test]
    fn test_relay_first_then_spool() {
        let config = BatchConfig::default();
        let plan = batch_notifications(&config, batch_channels(&config)).unwrap();
        let names: Vec<&str> = plan.channels().iter().map(Channel::name).collect();
        assert_eq!(names, vec!["smtp", "spool"]);
        assert_eq!(plan.channels()[0].retry().max_attempts, 3);
    }

    #[test]
    fn test_invalid_sender_rejected() {
        let config = BatchConfig {
            sender: "not-an-address".to_string(),
            ..BatchConfig::default()
        };
        assert!(batch_engine(&config).is_err());
    }
}
