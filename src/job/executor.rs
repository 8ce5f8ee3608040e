use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta};

use crate::config::JobConfig;
use crate::platform::types::{CallError, CallResult, Params};
use crate::platform::{RoleResolver, VaultApiClient};

use super::item::{CancelItem, StartItem};

/// Due date for the notification task: `offset_days` before expiration, but
/// never earlier than `today`.
pub fn task_due_date(expiration: NaiveDate, offset_days: i64, today: NaiveDate) -> NaiveDate {
    let due = TimeDelta::try_days(offset_days)
        .and_then(|delta| expiration.checked_sub_signed(delta))
        .unwrap_or(today);
    due.max(today)
}

/// Starts the expiration-pending workflow on a document version.
pub struct StartExecutor {
    roles: Arc<dyn RoleResolver>,
    api: VaultApiClient,
    job: Arc<JobConfig>,
    today: NaiveDate,
}

impl StartExecutor {
    pub fn new(roles: Arc<dyn RoleResolver>, api: VaultApiClient, job: Arc<JobConfig>, today: NaiveDate) -> Self {
        Self {
            roles,
            api,
            job,
            today,
        }
    }

    pub async fn execute(&self, item: &StartItem) -> CallResult<()> {
        let doc = &item.document_number;
        tracing::info!(document = %doc, "Starting expiration pending workflow");

        let users = self
            .roles
            .users_in_role(&item.document_version_id, &self.job.role)
            .await?;

        let mut params = Params::new();
        for user in &users {
            tracing::debug!(document = %doc, role = %self.job.role, user = %user, "Found user in role");
            params.push((self.job.user_control_field.clone(), format!("user:{user}")));
        }
        if users.is_empty() {
            tracing::warn!(document = %doc, role = %self.job.role, "No users assigned to role");
        }

        let due = task_due_date(
            item.expiration_date,
            item.task_due_days.unwrap_or(0),
            self.today,
        );
        params.push((self.job.date_control_field.clone(), due.format("%Y-%m-%d").to_string()));

        self.api
            .execute_user_action(&item.document_version_id, &self.job.action_label, &params)
            .await?;

        if self.job.mark_notified {
            self.api
                .set_document_flag(&item.document_version_id, &self.job.notified_flag_field)
                .await
                .map_err(|e| {
                    CallError::new(
                        e.kind,
                        format!("Workflow started but notified flag was not set: {}", e.message),
                    )
                })?;
        }

        tracing::info!(document = %doc, task_due_date = %due, users = users.len(), "Started workflow");
        Ok(())
    }
}

/// Cancels an open workflow task.
pub struct CancelExecutor {
    api: VaultApiClient,
}

impl CancelExecutor {
    pub fn new(api: VaultApiClient) -> Self {
        Self { api }
    }

    pub async fn execute(&self, item: &CancelItem) -> CallResult<()> {
        tracing::info!(document = %item.document_id, task = %item.task_id, "Cancelling expiration pending task");

        let job_id = self
            .api
            .cancel_workflow_tasks(std::slice::from_ref(&item.task_id))
            .await?;

        tracing::info!(document = %item.document_id, job_id = ?job_id, "Cancelled workflow task");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::api::DEFAULT_API_VERSION;
    use crate::platform::types::{DocumentVersionId, ErrorKind, HttpMethod};
    use crate::testing::{FakeVault, InMemoryQueryService, StaticRoles};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn start_item(expiration: NaiveDate) -> StartItem {
        StartItem {
            document_number: "JOB-7".to_string(),
            document_version_id: DocumentVersionId::new("7", 1, 0),
            expiration_date: expiration,
            task_due_days: Some(30),
        }
    }

    fn fixture(roles: StaticRoles) -> (Arc<FakeVault>, StartExecutor) {
        let vault = Arc::new(FakeVault::new(Arc::new(InMemoryQueryService::new())));
        let executor = StartExecutor::new(
            Arc::new(roles),
            VaultApiClient::new(vault.clone(), DEFAULT_API_VERSION),
            Arc::new(JobConfig::default()),
            date(2024, 6, 1),
        );
        (vault, executor)
    }

    #[test]
    fn test_task_due_date_subtracts_offset() {
        assert_eq!(
            task_due_date(date(2024, 8, 1), 30, date(2024, 6, 1)),
            date(2024, 7, 2)
        );
    }

    #[test]
    fn test_task_due_date_is_clamped_to_today() {
        let today = date(2024, 6, 1);
        for (expiration, offset) in [
            (date(2024, 6, 20), 30),
            (date(2024, 6, 1), 1),
            (date(2024, 5, 1), 0),
            (date(2024, 6, 30), i64::MAX),
        ] {
            assert_eq!(task_due_date(expiration, offset, today), today);
        }
        assert_eq!(task_due_date(date(2024, 7, 1), 30, today), today);
    }

    #[tokio::test]
    async fn test_start_passes_users_and_due_date() {
        let roles = StaticRoles::new().with("7_1_0", "project_manager__c", &["61", "62"]);
        let (vault, executor) = fixture(roles);
        vault.add_action("7_1_0", "expiration_pending_autostart", "Objectworkflow__ep");

        executor.execute(&start_item(date(2024, 7, 27))).await.unwrap();

        let invoke = vault
            .calls()
            .into_iter()
            .find(|c| c.method == HttpMethod::Put && c.path.ends_with("/Objectworkflow__ep"))
            .expect("lifecycle action invoked");
        assert_eq!(
            invoke.params,
            vec![
                ("user_control_multiple__c".to_string(), "user:61".to_string()),
                ("user_control_multiple__c".to_string(), "user:62".to_string()),
                ("date_control__c".to_string(), "2024-06-27".to_string()),
            ]
        );
        assert!(vault.flagged("7_1_0"));
    }

    #[tokio::test]
    async fn test_start_fails_when_action_missing() {
        let (vault, executor) = fixture(StaticRoles::new());

        let err = executor.execute(&start_item(date(2024, 7, 27))).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::OperationFailed);
        assert!(err.message.contains("expiration_pending_autostart"));
        assert!(!vault.flagged("7_1_0"));
    }

    #[tokio::test]
    async fn test_start_role_lookup_failure_is_item_failure() {
        let (vault, executor) = fixture(StaticRoles::new().failing());
        vault.add_action("7_1_0", "expiration_pending_autostart", "Objectworkflow__ep");

        assert!(executor.execute(&start_item(date(2024, 7, 27))).await.is_err());
        assert!(vault.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_flag_failure_is_reported() {
        let (vault, executor) = fixture(StaticRoles::new());
        vault.add_action("7_1_0", "expiration_pending_autostart", "Objectworkflow__ep");
        vault.fail_flag_updates();

        let err = executor.execute(&start_item(date(2024, 7, 27))).await.unwrap_err();
        assert!(err.message.starts_with("Workflow started but notified flag was not set"));
    }

    #[tokio::test]
    async fn test_cancel_sends_single_task_id() {
        let vault = Arc::new(FakeVault::new(Arc::new(InMemoryQueryService::new())));
        let executor = CancelExecutor::new(VaultApiClient::new(vault.clone(), DEFAULT_API_VERSION));

        executor
            .execute(&CancelItem {
                document_id: "10".into(),
                task_id: "9010".into(),
            })
            .await
            .unwrap();

        assert_eq!(vault.cancelled_tasks(), vec!["9010".to_string()]);
    }
}
