use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::platform::types::{CallError, CallResult, DocumentVersionId};

const ACTION: &str = "action";

/// Start the notification workflow on a document version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartItem {
    pub document_number: String,
    pub document_version_id: DocumentVersionId,
    pub expiration_date: NaiveDate,
    /// Days before expiration that the task is due. `None` means due on expiration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_due_days: Option<i64>,
}

/// Cancel the open task of an active notification workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelItem {
    pub document_id: String,
    pub task_id: String,
}

/// One unit of batch work. Carries everything its executor needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum WorkItem {
    Start(StartItem),
    Cancel(CancelItem),
}

impl WorkItem {
    pub fn description(&self) -> String {
        match self {
            WorkItem::Start(item) => format!(
                "Start workflow for {} (v{}, expires {})",
                item.document_number, item.document_version_id, item.expiration_date
            ),
            WorkItem::Cancel(item) => {
                format!("Cancel task {} on document {}", item.task_id, item.document_id)
            }
        }
    }

    pub fn to_job_item(&self) -> serde_json::Result<JobItem> {
        serde_json::to_value(self).map(JobItem)
    }
}

/// Wire form of a work item as the host scheduler stores and hands it back.
///
/// Decoding is fallible: the host may carry items written by a different
/// version of the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobItem(pub Value);

impl JobItem {
    pub fn decode(&self) -> CallResult<WorkItem> {
        let action = self.0.get(ACTION).and_then(Value::as_str);

        match action {
            Some("start") | Some("cancel") => serde_json::from_value(self.0.clone())
                .map_err(|e| {
                    CallError::invalid_input(format!(
                        "Malformed {} item: {e}",
                        action.unwrap_or_default()
                    ))
                }),
            Some(other) => Err(CallError::invalid_input(format!(
                "Job item has unrecognized action \"{other}\""
            ))),
            None => Err(CallError::invalid_input("Job item has no associated action.")),
        }
    }
}
