use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::Result;
use crate::params::ParameterProvider;
use crate::platform::types::CallResult;

use super::discovery::Discovery;
use super::executor::{CancelExecutor, StartExecutor};
use super::item::{JobItem, WorkItem};
use super::task::{JobOutcome, Task, TaskResult, TaskTally};

/// The expiration job as seen by a host scheduler.
///
/// The host drives four entry points: [`init`](Self::init) once,
/// [`process`](Self::process) once per task (possibly concurrently), then
/// exactly one of [`on_success`](Self::on_success) or
/// [`on_error`](Self::on_error).
pub struct ExpirationJob {
    parameters: Arc<dyn ParameterProvider>,
    discovery: Discovery,
    start: StartExecutor,
    cancel: CancelExecutor,
    today: NaiveDate,
}

impl ExpirationJob {
    pub fn new(
        parameters: Arc<dyn ParameterProvider>,
        discovery: Discovery,
        start: StartExecutor,
        cancel: CancelExecutor,
        today: NaiveDate,
    ) -> Self {
        Self {
            parameters,
            discovery,
            start,
            cancel,
            today,
        }
    }

    /// Run both discovery scans. Start items come first, then cancel items.
    ///
    /// Any error here means no task may be scheduled for this run.
    pub async fn init(&self) -> Result<Vec<WorkItem>> {
        let params = self.parameters.load().await?;

        let mut items = self
            .discovery
            .discover_start_candidates(&params, self.today)
            .await?;
        let cancels = self
            .discovery
            .discover_cancel_candidates(&params, self.today)
            .await?;

        let starts = items.len();
        items.extend(cancels);

        tracing::info!(
            start_items = starts,
            cancel_items = items.len() - starts,
            "Discovery complete"
        );
        Ok(items)
    }

    /// Attempt every item of a task in order. Item failures are counted, never
    /// propagated.
    pub async fn process(&self, task: &Task) -> TaskResult {
        tracing::info!(task = %task.id, items = task.items.len(), "Processing task");

        let mut tally = TaskTally::default();
        for job_item in &task.items {
            match self.execute_item(job_item).await {
                Ok(()) => tally.record_success(),
                Err(e) => {
                    tracing::error!(task = %task.id, error = %e, "Work item failed");
                    tally.record_failure(e.to_string());
                }
            }
        }

        let attempted = tally.attempted();
        let failed = tally.failed();
        let result = tally.finish(&task.id);
        if failed > 0 {
            tracing::warn!(task = %task.id, attempted, failed, state = %result.state, "Task finished with errors");
        } else {
            tracing::info!(task = %task.id, attempted, state = %result.state, "Task successful");
        }
        result
    }

    async fn execute_item(&self, job_item: &JobItem) -> CallResult<()> {
        let item = job_item.decode()?;
        tracing::debug!(item = %item.description(), "Executing work item");

        match &item {
            WorkItem::Start(start) => self.start.execute(start).await,
            WorkItem::Cancel(cancel) => self.cancel.execute(cancel).await,
        }
    }

    pub fn on_success(&self) {
        tracing::info!("All tasks completed successfully");
    }

    /// Report every failed task. Performs no retries.
    pub fn on_error(&self, outcome: &JobOutcome) {
        tracing::error!(
            failed_tasks = outcome.failed_tasks,
            total_tasks = outcome.total_tasks,
            "Job completed with errors: {} tasks failed out of {}",
            outcome.failed_tasks,
            outcome.total_tasks
        );

        for result in outcome.results.iter().filter(|r| r.failed()) {
            tracing::error!(
                task = %result.task_id,
                state = %result.state,
                error = result.first_error.as_deref().unwrap_or("no error message recorded"),
                "Task failed"
            );
        }
    }
}
