use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::JobConfig;
use crate::error::{AppError, Result};

use super::item::WorkItem;
use super::orchestrator::ExpirationJob;
use super::phase::JobPhase;
use super::task::{JobOutcome, Task, TaskResult};

/// Local host scheduler for an [`ExpirationJob`].
///
/// Partitions the discovered items into tasks and runs them on the tokio
/// runtime with bounded concurrency.
pub struct JobScheduler {
    task_size: usize,
    max_concurrent_tasks: usize,
}

impl JobScheduler {
    pub fn new(task_size: usize, max_concurrent_tasks: usize) -> Self {
        Self {
            task_size: task_size.max(1),
            max_concurrent_tasks: max_concurrent_tasks.max(1),
        }
    }

    pub fn from_config(job: &JobConfig) -> Self {
        Self::new(job.task_size, job.max_concurrent_tasks)
    }

    /// Split items into tasks of at most `task_size`, preserving discovery order.
    pub fn partition(&self, items: &[WorkItem]) -> Result<Vec<Task>> {
        items
            .chunks(self.task_size)
            .enumerate()
            .map(|(n, chunk)| {
                Ok(Task {
                    id: format!("task-{}", n + 1),
                    items: chunk
                        .iter()
                        .map(WorkItem::to_job_item)
                        .collect::<serde_json::Result<_>>()?,
                })
            })
            .collect()
    }

    /// Drive one complete job run.
    ///
    /// Returns `Err` only when initialization fails, in which case no task was
    /// dispatched. Once `shutdown` resolves no further task is started; tasks
    /// never started are reported as pending.
    pub async fn run<F>(&self, job: Arc<ExpirationJob>, shutdown: F) -> Result<JobOutcome>
    where
        F: Future<Output = ()>,
    {
        let mut phase = JobPhase::Initializing;

        let items = job.init().await.map_err(|e| {
            tracing::error!(phase = %phase, error = %e, "Job initialization failed, nothing scheduled");
            e
        })?;
        let tasks = self.partition(&items)?;
        tracing::info!(
            items = items.len(),
            tasks = tasks.len(),
            task_size = self.task_size,
            "Partitioned work items"
        );
        phase.advance(JobPhase::Dispatched);

        let mut results: Vec<TaskResult> = tasks.iter().map(|t| TaskResult::pending(&t.id)).collect();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_tasks));
        let mut running = JoinSet::new();

        phase.advance(JobPhase::PerTaskExecuting);
        tokio::pin!(shutdown);

        for (index, task) in tasks.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::warn!(
                        remaining = results.len() - index,
                        "Shutdown requested, no further tasks will be dispatched"
                    );
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => permit
                    .map_err(|e| AppError::Scheduler(format!("Task semaphore closed: {e}")))?,
            };

            let job = Arc::clone(&job);
            running.spawn(async move {
                let _permit = permit;
                let task_id = task.id.clone();
                let result = match tokio::spawn(async move { job.process(&task).await }).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(task = %task_id, error = %e, "Task aborted");
                        TaskResult::aborted(&task_id, format!("Task aborted: {e}"))
                    }
                };
                (index, result)
            });
        }

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = result,
                Err(e) => tracing::error!(error = %e, "Task runner failed"),
            }
        }

        phase.advance(JobPhase::Aggregating);
        let outcome = JobOutcome::from_results(results);

        if outcome.succeeded() {
            job.on_success();
            phase.advance(JobPhase::CompletedSuccess);
        } else {
            job.on_error(&outcome);
            phase.advance(JobPhase::CompletedWithErrors);
        }

        Ok(outcome)
    }
}
