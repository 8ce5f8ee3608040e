use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::types::*;
use super::vault::mapper;
use super::{ApiTransport, QueryService, RoleResolver};
use crate::query::{field, Predicate, Query, Row};

pub const DEFAULT_API_VERSION: &str = "v21.3";

/// High-level vault operations built on a raw [`ApiTransport`].
///
/// Every method returns a [`CallResult`]; nothing here panics on a remote
/// failure.
#[derive(Clone)]
pub struct VaultApiClient {
    transport: Arc<dyn ApiTransport>,
    api_version: String,
}

impl VaultApiClient {
    pub fn new(transport: Arc<dyn ApiTransport>, api_version: &str) -> Self {
        Self {
            transport,
            api_version: api_version.to_string(),
        }
    }

    fn api_path(&self, rest: &str) -> String {
        format!("/api/{}/{rest}", self.api_version)
    }

    /// Execute the lifecycle action whose menu label is `action_label` on a
    /// document version.
    ///
    /// The machine name is resolved from the actions currently available on the
    /// version; a missing label is an `OPERATION_FAILED` result.
    pub async fn execute_user_action(
        &self,
        version: &DocumentVersionId,
        action_label: &str,
        params: &Params,
    ) -> CallResult<()> {
        let actions_path = self.api_path(&format!("objects/{}/lifecycle_actions", version.path()));

        let body = self
            .transport
            .call(HttpMethod::Get, &actions_path, &Params::new())
            .await?;
        let actions = mapper::map_lifecycle_actions(&body)?;

        let Some(action) = actions.into_iter().find(|a| a.label == action_label) else {
            return Err(CallError::operation_failed(format!(
                "An error occurred accessing Vault API \"Retrieve User Actions\". \
                 Unable to find action \"{action_label}\""
            )));
        };

        tracing::debug!(version = %version, action = %action.name, "Resolved lifecycle action");

        let invoke_path = format!("{actions_path}/{}", urlencoding::encode(&action.name));
        self.transport
            .call(HttpMethod::Put, &invoke_path, params)
            .await?;
        Ok(())
    }

    /// Cancel the given workflow tasks. Returns the platform job id, if any.
    pub async fn cancel_workflow_tasks(&self, task_ids: &[String]) -> CallResult<Option<u64>> {
        if task_ids.is_empty() {
            return Err(CallError::invalid_input("No task ids to cancel"));
        }

        let path = self.api_path("object/workflow/actions/canceltasks");
        let params = vec![("task_ids".to_string(), task_ids.join(","))];

        let body = self.transport.call(HttpMethod::Post, &path, &params).await?;
        Ok(mapper::map_job_id(&body))
    }

    /// Execute a query through the REST query endpoint, following result pages.
    pub async fn execute_query(&self, query: &str) -> CallResult<Vec<Value>> {
        let path = self.api_path("query");
        let params = vec![("q".to_string(), query.to_string())];

        let mut body = self.transport.call(HttpMethod::Post, &path, &params).await?;
        let mut rows = Vec::new();

        loop {
            let data = body.get_mut("data").map(Value::take).unwrap_or(Value::Null);
            match data {
                Value::Array(page) => rows.extend(page),
                Value::Null => {}
                other => {
                    return Err(CallError::operation_failed(format!(
                        "Query response data is not an array: {other}"
                    )))
                }
            }

            let Some(next) = mapper::map_next_page(&body) else {
                break;
            };
            body = self
                .transport
                .call(HttpMethod::Get, &next, &Params::new())
                .await?;
        }

        Ok(rows)
    }

    /// Active workflows with the given name. Not filtered by any date.
    pub async fn list_active_workflows(&self, workflow_name: &str) -> CallResult<Vec<ActiveWorkflow>> {
        let query = Query::select(&[mapper::WORKFLOW_DOCUMENT_ID, mapper::WORKFLOW_TASK_ID])
            .from("workflows")
            .filter(Predicate::Eq(field("workflow_name__v"), workflow_name.into()))
            .filter(Predicate::Eq(field("workflow_status__v"), "Active".into()));

        self.execute_query(&query.to_string())
            .await?
            .into_iter()
            .map(|v| mapper::map_active_workflow(&Row::try_from(v)?))
            .collect()
    }

    /// Set a boolean flag field on a document version.
    pub async fn set_document_flag(&self, version: &DocumentVersionId, flag_field: &str) -> CallResult<()> {
        let path = self.api_path(&format!("objects/{}", version.path()));
        let params = vec![(flag_field.to_string(), "true".to_string())];
        self.transport.call(HttpMethod::Put, &path, &params).await?;
        Ok(())
    }
}

#[async_trait]
impl QueryService for VaultApiClient {
    async fn query(&self, query: &Query) -> CallResult<Vec<Row>> {
        self.execute_query(&query.to_string())
            .await?
            .into_iter()
            .map(Row::try_from)
            .collect()
    }
}

#[async_trait]
impl RoleResolver for VaultApiClient {
    async fn users_in_role(&self, version: &DocumentVersionId, role: &str) -> CallResult<Vec<String>> {
        let path = self.api_path(&format!(
            "objects/{}/roles/{}",
            version.path(),
            urlencoding::encode(role)
        ));
        let body = self.transport.call(HttpMethod::Get, &path, &Params::new()).await?;
        mapper::map_role_users(&body, role)
    }
}
