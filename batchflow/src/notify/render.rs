//! Turning a finished run into a message.

use crate::context::ResultStore;
use crate::core::{Run, RunStatus, TaskStatus};
use crate::errors::BatchflowError;
use std::fmt::Write as _;

/// Default subject of the success notification.
pub const SUCCESS_SUBJECT: &str = "Batch data processing completed successfully";

/// Default subject of the failure notification.
pub const FAILURE_SUBJECT: &str = "Batch data processing failed";

/// Subject and body produced by a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// The subject line.
    pub subject: String,
    /// The HTML body.
    pub html_body: String,
}

/// Renders the notification for a finished run.
///
/// Renderers see the run's results before the store is discarded.
pub trait MessageRenderer: Send + Sync + std::fmt::Debug {
    /// Renders the message.
    ///
    /// # Errors
    ///
    /// Returns an error if a result the renderer needs is missing or has the
    /// wrong shape.
    fn render(&self, run: &Run, results: &ResultStore) -> Result<RenderedMessage, BatchflowError>;
}

/// Renders a status table of every task; needs no results.
#[derive(Debug, Clone)]
pub struct PlainRenderer {
    success_subject: String,
    failure_subject: String,
}

impl Default for PlainRenderer {
    fn default() -> Self {
        Self::new(SUCCESS_SUBJECT, FAILURE_SUBJECT)
    }
}

impl PlainRenderer {
    /// Creates a renderer with custom subjects.
    #[must_use]
    pub fn new(success_subject: impl Into<String>, failure_subject: impl Into<String>) -> Self {
        Self {
            success_subject: success_subject.into(),
            failure_subject: failure_subject.into(),
        }
    }

    /// Returns the subject for a run status.
    #[must_use]
    pub fn subject_for(&self, status: RunStatus) -> &str {
        if status == RunStatus::Succeeded {
            &self.success_subject
        } else {
            &self.failure_subject
        }
    }

    /// Renders without consulting any results.
    #[must_use]
    pub fn render_run(&self, run: &Run) -> RenderedMessage {
        let mut body = String::new();
        let _ = write!(
            body,
            "<h2>{}</h2><p>Pipeline: {}<br>Run: {}<br>Status: {}</p>",
            escape_html(self.subject_for(run.status())),
            escape_html(run.pipeline()),
            run.run_id(),
            run.status()
        );
        body.push_str("<table><tr><th>Task</th><th>Status</th><th>Attempts</th><th>Detail</th></tr>");
        for record in run.records() {
            let detail = match record.status {
                TaskStatus::Failed => record.error.as_deref().unwrap_or(""),
                TaskStatus::Skipped => record.skip_reason.as_deref().unwrap_or(""),
                _ => "",
            };
            let _ = write!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&record.task),
                record.status,
                record.attempt_count(),
                escape_html(detail)
            );
        }
        body.push_str("</table>");

        RenderedMessage {
            subject: self.subject_for(run.status()).to_string(),
            html_body: body,
        }
    }
}

impl MessageRenderer for PlainRenderer {
    fn render(&self, run: &Run, _results: &ResultStore) -> Result<RenderedMessage, BatchflowError> {
        Ok(self.render_run(run))
    }
}

/// Escapes text for inclusion in HTML.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
