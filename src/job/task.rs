use std::fmt;

use serde::Serialize;

use super::item::JobItem;

/// A host-scheduled slice of the job's work items.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub items: Vec<JobItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Success,
    ErrorsEncountered,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "PENDING"),
            TaskState::Success => write!(f, "SUCCESS"),
            TaskState::ErrorsEncountered => write!(f, "ERRORS_ENCOUNTERED"),
        }
    }
}

/// Outcome of one task. Produced once by [`TaskTally::finish`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub state: TaskState,
    pub first_error: Option<String>,
}

impl TaskResult {
    /// Result for a task that has not reported yet.
    pub fn pending(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            state: TaskState::Pending,
            first_error: None,
        }
    }

    /// Result for a task that could not run to completion at all.
    pub fn aborted(task_id: &str, error: String) -> Self {
        Self {
            task_id: task_id.to_string(),
            state: TaskState::ErrorsEncountered,
            first_error: Some(error),
        }
    }

    pub fn failed(&self) -> bool {
        self.state != TaskState::Success
    }
}

/// Per-task item counters. Keeps only the first error message.
#[derive(Debug, Default)]
pub struct TaskTally {
    attempted: usize,
    failed: usize,
    first_error: Option<String>,
}

impl TaskTally {
    pub fn record_success(&mut self) {
        self.attempted += 1;
    }

    pub fn record_failure(&mut self, message: String) {
        self.attempted += 1;
        self.failed += 1;
        if self.first_error.is_none() {
            self.first_error = Some(message);
        }
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn finish(self, task_id: &str) -> TaskResult {
        let state = if self.failed > 0 {
            TaskState::ErrorsEncountered
        } else {
            TaskState::Success
        };
        TaskResult {
            task_id: task_id.to_string(),
            state,
            first_error: self.first_error,
        }
    }
}

/// Aggregate over every task of one job run.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub total_tasks: usize,
    pub failed_tasks: usize,
    pub results: Vec<TaskResult>,
}

impl JobOutcome {
    pub fn from_results(results: Vec<TaskResult>) -> Self {
        Self {
            total_tasks: results.len(),
            failed_tasks: results.iter().filter(|r| r.failed()).count(),
            results,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failed_tasks == 0
    }
}
