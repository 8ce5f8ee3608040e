use serde_json::Value;

use crate::platform::types::{ActiveWorkflow, CallError, CallResult, ErrorKind, LifecycleAction};
use crate::query::Row;

pub const WORKFLOW_DOCUMENT_ID: &str = "workflow_document_id__v";
pub const WORKFLOW_TASK_ID: &str = "task_id__v";

/// Map a `responseStatus: FAILURE` envelope to a call error. Returns `None`
/// for successful (or warning) responses.
pub fn map_failure(body: &Value) -> Option<CallError> {
    let status = body["responseStatus"].as_str()?;
    if status != "FAILURE" {
        return None;
    }

    let first = &body["errors"][0];
    let kind = first["type"]
        .as_str()
        .map(ErrorKind::from)
        .unwrap_or(ErrorKind::OperationFailed);
    let message = first["message"]
        .as_str()
        .or_else(|| body["responseMessage"].as_str())
        .unwrap_or("Vault returned FAILURE without a message")
        .to_string();

    Some(CallError::new(kind, message))
}

/// Map the `Retrieve User Actions` response.
pub fn map_lifecycle_actions(body: &Value) -> CallResult<Vec<LifecycleAction>> {
    let actions = body["lifecycle_actions__v"].as_array().ok_or_else(|| {
        CallError::operation_failed("Response has no lifecycle_actions__v array")
    })?;

    Ok(actions
        .iter()
        .filter_map(|a| {
            Some(LifecycleAction {
                label: a["label__v"].as_str()?.to_string(),
                name: a["name__v"].as_str()?.to_string(),
            })
        })
        .collect())
}

pub fn map_active_workflow(row: &Row) -> CallResult<ActiveWorkflow> {
    Ok(ActiveWorkflow {
        document_id: row.string(WORKFLOW_DOCUMENT_ID)?,
        task_id: row.string(WORKFLOW_TASK_ID)?,
    })
}

/// Users assigned to `role` in a `Retrieve Document Roles` response.
pub fn map_role_users(body: &Value, role: &str) -> CallResult<Vec<String>> {
    let roles = body["documentRoles"]
        .as_array()
        .ok_or_else(|| CallError::operation_failed("Response has no documentRoles array"))?;

    let users = roles
        .iter()
        .filter(|r| r["name"].as_str() == Some(role))
        .flat_map(|r| r["assignedUsers"].as_array().cloned().unwrap_or_default())
        .filter_map(|u| match u {
            Value::Number(n) => n.as_i64().map(|i| i.to_string()),
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect();

    Ok(users)
}

pub fn map_job_id(body: &Value) -> Option<u64> {
    body["data"]["job_id"].as_u64()
}

pub fn map_next_page(body: &Value) -> Option<String> {
    body["responseDetails"]["next_page"]
        .as_str()
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}
